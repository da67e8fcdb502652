//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for the application.
//! Library modules use specific error types via `thiserror`, while
//! `main` uses `anyhow` only at the process boundary.
//!
//! # Design
//!
//! - [`Error`]: top-level application error enum
//! - Module-specific errors (e.g. [`crate::player::PlayerError`]) convert
//!   in via `#[from]`
//! - All errors implement `std::error::Error` for compatibility

use std::path::PathBuf;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates errors from all subsystems for unified handling. `Schema`
/// is the only variant treated as fatal during startup; everything else
/// is routed to the UI's error popup queue.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database open or migration failure. Fatal at startup.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Playback engine error.
    #[error("Playback error: {0}")]
    Playback(#[from] crate::player::PlayerError),

    /// Radio scheduler error.
    #[error("Radio error: {0}")]
    Radio(#[from] crate::radio::RadioError),

    /// Scrobble pipeline error.
    #[error("Scrobble error: {0}")]
    Scrobble(#[from] crate::scrobble::ScrobbleError),

    /// Navigator source error.
    #[error("Navigator error: {0}")]
    Source(#[from] crate::navigator::SourceError),

    /// Library index error.
    #[error("Library error: {0}")]
    Library(#[from] crate::library::LibraryError),

    /// A lookup that found nothing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Last.fm session missing or expired.
    #[error("Not authenticated with Last.fm")]
    NotAuthenticated,

    /// A cancellation token fired before the operation completed.
    #[error("Cancelled")]
    Cancelled,

    /// SQLite UNIQUE/FOREIGN KEY violation, with the operation that hit it.
    #[error("Constraint violation during {operation}: {source}")]
    Constraint {
        operation: String,
        #[source]
        source: Box<sqlx::Error>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with added context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn not_found_path(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into().display().to_string())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn constraint(operation: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Constraint {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// Add context to an error, in the style of `anyhow::Context` but kept
    /// inside the typed hierarchy so the popup queue can still match on kind.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }

    /// True for errors that should abort the process during initialisation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Schema(_))
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Database(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("library:artist:1");
        assert!(err.to_string().contains("library:artist:1"));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::config("missing api key").context("while authenticating");
        let msg = err.to_string();
        assert!(msg.contains("while authenticating"));
    }

    #[test]
    fn test_result_ext() {
        let result: Result<()> = Err(Error::config("test"));
        let with_ctx = result.with_context("additional context");
        assert!(with_ctx.unwrap_err().to_string().contains("additional context"));
    }

    #[test]
    fn fatal_is_schema_only() {
        assert!(Error::schema("bad migration").is_fatal());
        assert!(!Error::not_found("x").is_fatal());
    }
}
