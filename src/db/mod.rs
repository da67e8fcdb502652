//! Persistence store: connection pool, pragmas, migrations, and the
//! transaction helper every other module builds on.
//!
//! Owns the database handle exclusively — other modules never open their own connection, they take
//! a `&SqlitePool` or go through [`with_tx`].

use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

/// Default database filename, relative to `$XDG_DATA_HOME/waves/`.
pub const DEFAULT_DB_NAME: &str = "waves.db";

/// Directory holding `waves.db`.
pub fn data_dir() -> Option<std::path::PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME")
        && !xdg.is_empty()
    {
        return Some(std::path::PathBuf::from(xdg).join("waves"));
    }
    dirs::home_dir().map(|home| home.join(".local").join("share").join("waves"))
}

pub fn default_db_path() -> std::path::PathBuf {
    data_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(DEFAULT_DB_NAME)
}

pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", default_db_path().display()),
    }
}

/// Open the pool, create the file and parent directory if missing, run
/// migrations, and apply the pragmas spec.md §5 requires.
///
/// Any failure here is `ErrSchema` and is fatal at startup.
pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(path) = db_url.strip_prefix("sqlite:")
        && let Some(parent) = std::path::Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
    }

    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    apply_pragmas(&pool).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    sqlx::query("PRAGMA synchronous = NORMAL").execute(pool).await?;
    Ok(())
}

/// Run `f` inside a transaction, committing on `Ok` and rolling back on
/// `Err`.
pub async fn with_tx<F, T, E>(pool: &SqlitePool, f: F) -> Result<T, E>
where
    F: AsyncFnOnce(&mut Transaction<'_, Sqlite>) -> Result<T, E>,
    E: From<sqlx::Error>,
{
    let mut tx = pool.begin().await.map_err(E::from)?;
    match f(&mut tx).await {
        Ok(value) => {
            tx.commit().await.map_err(E::from)?;
            Ok(value)
        }
        Err(e) => {
            let _ = tx.rollback().await;
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    apply_pragmas(&pool).await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_db_creates_file_and_runs_migrations() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let url = format!("sqlite:{}", db_path.display());

        let pool = init_db(&url).await.expect("init_db should succeed");
        assert!(db_path.exists());

        let favorites: (String,) = sqlx::query_as("SELECT name FROM playlists WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(favorites.0, "Favorites");
    }

    #[tokio::test]
    async fn with_tx_rolls_back_on_error() {
        let pool = test_pool().await;

        #[derive(Debug)]
        struct TestErr;
        impl From<sqlx::Error> for TestErr {
            fn from(_: sqlx::Error) -> Self {
                TestErr
            }
        }

        let result: Result<(), TestErr> = with_tx(&pool, async |tx| {
            sqlx::query("INSERT INTO playlist_folders (parent_id, name) VALUES (NULL, 'x')")
                .execute(&mut **tx)
                .await?;
            Err(TestErr)
        })
        .await;
        assert!(result.is_err());

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM playlist_folders")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn with_tx_commits_on_success() {
        let pool = test_pool().await;

        let id: Result<i64, sqlx::Error> = with_tx(&pool, async |tx| {
            let result = sqlx::query("INSERT INTO playlist_folders (parent_id, name) VALUES (NULL, 'y')")
                .execute(&mut **tx)
                .await?;
            Ok(result.last_insert_rowid())
        })
        .await;

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM playlist_folders")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
        assert!(id.unwrap() > 0);
    }
}
