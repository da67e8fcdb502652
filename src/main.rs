//! Waves: a terminal music player.
//!
//! `main` is the process boundary: it loads configuration, opens the
//! persistence store, builds the initial [`ui::Model`], and hands off to
//! the MVU runtime. Anything that fails here is fatal — `ErrSchema` during
//! database open/migration is the one documented fatal case,
//! but config and model-init failures exit the same way since there is no
//! degraded mode to fall back into.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod external;
pub mod library;
pub mod model;
pub mod navigator;
pub mod player;
pub mod popup;
pub mod queue;
pub mod radio;
pub mod scrobble;
pub mod ui;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let _args = cli::Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("waves=info".parse().unwrap()))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow::anyhow!("failed to start async runtime: {e}"))?;

    runtime.block_on(run())
}

async fn run() -> anyhow::Result<()> {
    let config = config::load();

    let pool = db::init_db(&db::db_url(None))
        .await
        .map_err(|e| anyhow::anyhow!("database init failed: {e}"))?;

    let model = ui::Model::new(pool, config)
        .await
        .map_err(|e| anyhow::anyhow!("model init failed: {e}"))?;

    ui::runtime::run(model).await.map_err(|e| anyhow::anyhow!("{e}"))
}
