//! Error types for database operations.
//!
//! Provides a unified error type covering opening, binding, stepping,
//! schema-version reconciliation, and the I/O performed by the bootstrap
//! installer and script loader. Engine failures always keep the underlying
//! [`rusqlite::Error`], so SQLite's own result codes stay reachable through
//! [`DbError::code`] and [`DbError::extended_code`].

use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Boxed error returned by migration callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// No database file exists at the path. Installing one is the bootstrap
    /// installer's job, never the connection's.
    #[error("database file not found: {}", .0.display())]
    MissingFile(PathBuf),

    /// The engine could not open or validate the file (corrupt, not a
    /// database, permission denied).
    #[error("failed to open database '{}': {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// SQL text failed to compile.
    #[error("failed to prepare statement '{sql}': {source}")]
    Prepare {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Parameter index outside `1..=count`.
    #[error("parameter index {index} out of range (statement has {count} parameters)")]
    ParameterOutOfRange { index: usize, count: usize },

    /// The engine rejected a bound value.
    #[error("failed to bind parameter {index}: {source}")]
    Bind {
        index: usize,
        #[source]
        source: rusqlite::Error,
    },

    /// Stepping returned something other than a row or completion.
    #[error("step failed: {0}")]
    Step(#[source] rusqlite::Error),

    /// Column index outside `0..count`.
    #[error("column index {index} out of range (row has {count} columns)")]
    ColumnOutOfRange { index: usize, count: usize },

    /// The installed database is newer than the application understands.
    #[error("database schema version {installed} is newer than expected version {expected}")]
    VersionSkew { installed: u32, expected: u32 },

    /// The migration callback failed; the transaction was rolled back and the
    /// stored version is unchanged.
    #[error("migration from version {from} to {to} failed: {source}")]
    Migration {
        from: u32,
        to: u32,
        #[source]
        source: BoxError,
    },

    /// A schema version outside `0..=i32::MAX`, the range `PRAGMA user_version`
    /// can hold. Reported for negative stored versions and for expected
    /// versions too large to store.
    #[error("invalid schema version: {0} (must be between 0 and 2147483647)")]
    InvalidSchemaVersion(i64),

    /// The bundled seed database to install from does not exist.
    #[error("seed database not found: {}", .0.display())]
    SeedMissing(PathBuf),

    /// Any other SQLite operation failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DbError {
    /// Returns the underlying engine error, if this failure came from SQLite.
    pub fn engine_error(&self) -> Option<&rusqlite::Error> {
        match self {
            Self::Open { source, .. }
            | Self::Prepare { source, .. }
            | Self::Bind { source, .. }
            | Self::Step(source)
            | Self::Sqlite(source) => Some(source),
            Self::Migration { source, .. } => source
                .downcast_ref::<DbError>()
                .and_then(DbError::engine_error)
                .or_else(|| source.downcast_ref::<rusqlite::Error>()),
            _ => None,
        }
    }

    /// Returns SQLite's primary result code for engine failures.
    ///
    /// ```
    /// # use sqlkeep::DbError;
    /// let err = DbError::ParameterOutOfRange { index: 3, count: 1 };
    /// assert!(err.code().is_none());
    /// ```
    pub fn code(&self) -> Option<ErrorCode> {
        self.engine_error().and_then(rusqlite::Error::sqlite_error_code)
    }

    /// Returns SQLite's extended result code for engine failures.
    pub fn extended_code(&self) -> Option<i32> {
        self.engine_error()
            .and_then(rusqlite::Error::sqlite_error)
            .map(|e| e.extended_code)
    }
}

/// Convenience alias for results with [`DbError`].
pub type Result<T> = std::result::Result<T, DbError>;

/// Returns the human-readable message SQLite attached to a failure, falling
/// back to the error's display form.
pub(crate) fn engine_message(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.clone(),
        other => other.to_string(),
    }
}
