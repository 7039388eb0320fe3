//! Connection configuration.
//!
//! [`DatabaseConfig`] is YAML-serializable so applications can keep their
//! database settings next to the rest of their configuration.
//!
//! # Example YAML
//!
//! ```yaml
//! schema_version: 3
//! statement_cache_capacity: 32
//! busy_timeout_ms: 2000
//! foreign_keys: true
//! seed_path: /usr/share/app/seed.db
//! ```
//!
//! Every field is optional and falls back to [`DatabaseConfig::default`].

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings applied when a [`Database`](crate::Database) is opened.
///
/// # Examples
///
/// ```
/// # use sqlkeep::DatabaseConfig;
/// let config: DatabaseConfig = serde_yaml::from_str("schema_version: 4").unwrap();
/// assert_eq!(config.schema_version, 4);
/// assert_eq!(config.statement_cache_capacity, 16);
/// assert!(config.foreign_keys);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Schema version the application expects.
    pub schema_version: u32,
    /// Maximum number of prepared statements kept in the statement cache.
    pub statement_cache_capacity: usize,
    /// How long to wait on a locked database before failing with `SQLITE_BUSY`.
    /// `None` keeps SQLite's default.
    pub busy_timeout_ms: Option<u64>,
    /// Whether to enforce foreign key constraints.
    pub foreign_keys: bool,
    /// Seed database copied into place on first launch.
    pub seed_path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            statement_cache_capacity: 16,
            busy_timeout_ms: None,
            foreign_keys: true,
            seed_path: None,
        }
    }
}

impl DatabaseConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](crate::DbError::Io) if the file cannot be read, or
    /// [`Yaml`](crate::DbError::Yaml) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](crate::DbError::Io) if the file cannot be written, or
    /// [`Yaml`](crate::DbError::Yaml) if serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }
}
