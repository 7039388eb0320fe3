//! Thin SQLite embedding layer with schema-version migration.
//!
//! This crate manages a single database connection's lifecycle (first-run
//! installation from a seed file, schema-version migration, transactions) and
//! wraps prepared statements with typed parameter binding and typed column
//! extraction, including boolean and timestamp conventions SQLite does not
//! support natively.
//!
//! # Architecture
//!
//! The crate is organized into six modules:
//!
//! - **`codec`**: Host value ↔ SQLite storage class conversions
//! - **`statement`**: Prepared statements, row cursors, typed column reads
//! - **`connection`**: [`Database`], covering open, transactions, execution and caching
//! - **`migration`**: `PRAGMA user_version` reconciliation at open
//! - **`bootstrap`**: Copying a seed database into place on first launch
//! - **`config`**: YAML-serializable connection settings
//!
//! # Quick start
//!
//! ```no_run
//! use sqlkeep::{Database, DatabaseConfig, Step, migration};
//!
//! let config = DatabaseConfig {
//!     schema_version: 2,
//!     ..DatabaseConfig::default()
//! };
//! let db = Database::open_or_install(
//!     "bundle/seed.db",
//!     "data/app.db",
//!     &config,
//!     migration::from_fn(|db, from, _to| {
//!         if from < 2 {
//!             db.execute_script("ALTER TABLE tasks ADD COLUMN done INTEGER NOT NULL DEFAULT 0;")?;
//!         }
//!         Ok(())
//!     }),
//! )
//! .unwrap();
//!
//! db.begin_transaction().unwrap();
//! let mut insert = db
//!     .prepare_statement("insert_task", "INSERT INTO tasks (title, done) VALUES (?1, ?2)")
//!     .unwrap();
//! insert.bind_string(1, "write docs").unwrap();
//! insert.bind_bool(2, false).unwrap();
//! insert.execute().unwrap();
//! drop(insert);
//! db.commit_transaction().unwrap();
//!
//! let mut select = db.prepare("SELECT title FROM tasks WHERE done = 0").unwrap();
//! let mut rows = select.query();
//! while let Step::Row(row) = rows.step().unwrap() {
//!     println!("{}", row.column_string(0).unwrap().unwrap_or_default());
//! }
//! ```
//!
//! # Status codes
//!
//! Engine failures are never remapped: each error variant that originates in
//! SQLite keeps the [`rusqlite::Error`], and [`DbError::code`] /
//! [`DbError::extended_code`] return SQLite's result codes.

mod bootstrap;
pub mod codec;
mod config;
mod connection;
mod error;
pub mod migration;
mod statement;

pub use bootstrap::{InstallOutcome, install_seed};
pub use codec::Value;
pub use config::DatabaseConfig;
pub use connection::Database;
pub use error::{BoxError, DbError, Result};
pub use migration::{MigrationOutcome, Migrator, NoMigration};
pub use statement::{Row, Rows, Statement, Step};
