//! Command-line surface. There are no subcommands — Waves is a single
//! full-screen terminal application — so this is just `-v`/`--version`
//! plumbing.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "waves", version, about = "A terminal music player", disable_version_flag = true)]
pub struct Cli {
    /// Print version and exit.
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: (),
}
