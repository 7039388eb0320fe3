//! Schema-version reconciliation run when a [`Database`] opens.
//!
//! The installed version lives in the database header (`PRAGMA user_version`)
//! and is compared against the version the application expects:
//!
//! - equal: nothing happens ([`MigrationOutcome::UpToDate`])
//! - installed is newer: [`DbError::VersionSkew`], the file is not touched
//! - installed is older: a transaction is opened, the [`Migrator`] is called
//!   once with both endpoints, `user_version` is set to the expected version
//!   and the transaction commits ([`MigrationOutcome::Migrated`])
//!
//! If the migrator fails (or panics) the transaction is rolled back, so the
//! schema and the stored version stay exactly as they were. A migrator must
//! not commit or roll back the transaction itself; if it does, opening fails
//! with [`DbError::Migration`] and the stored version is left alone.
//!
//! # Example
//!
//! ```no_run
//! use sqlkeep::{Database, migration};
//!
//! let db = Database::open(
//!     "app.db",
//!     3,
//!     migration::from_fn(|db, from, to| {
//!         if from < 2 {
//!             db.execute_query("ALTER TABLE tasks ADD COLUMN due TEXT")?;
//!         }
//!         if from < 3 && to >= 3 {
//!             db.execute_query("CREATE INDEX idx_tasks_due ON tasks(due)")?;
//!         }
//!         Ok(())
//!     }),
//! )
//! .unwrap();
//! ```

use std::cmp::Ordering;

use tracing::{debug, info, warn};

use crate::connection::Database;
use crate::error::{BoxError, DbError, Result};

/// Upgrades a database schema between two versions.
///
/// Called at most once per open, inside a transaction, with the installed
/// version as `from` and the expected version as `to`. The implementation
/// must handle every intermediate step itself. The version bump is done by
/// the caller after this returns `Ok`.
pub trait Migrator {
    /// Applies all schema changes needed to go from `from` to `to`.
    fn migrate(&mut self, db: &Database, from: u32, to: u32) -> std::result::Result<(), BoxError>;
}

/// Migrator that applies no schema changes.
///
/// Opening an older database with it still advances the stored version,
/// which suits databases whose seed already carries the current schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMigration;

impl Migrator for NoMigration {
    fn migrate(&mut self, _db: &Database, _from: u32, _to: u32) -> std::result::Result<(), BoxError> {
        Ok(())
    }
}

/// Migrator backed by a closure. Created by [`from_fn`].
pub struct FnMigrator<F>(F);

impl<F> Migrator for FnMigrator<F>
where
    F: FnMut(&Database, u32, u32) -> std::result::Result<(), BoxError>,
{
    fn migrate(&mut self, db: &Database, from: u32, to: u32) -> std::result::Result<(), BoxError> {
        (self.0)(db, from, to)
    }
}

impl<F> std::fmt::Debug for FnMigrator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMigrator").finish_non_exhaustive()
    }
}

/// Wraps a closure taking `(db, from, to)` as a [`Migrator`].
pub fn from_fn<F>(f: F) -> FnMigrator<F>
where
    F: FnMut(&Database, u32, u32) -> std::result::Result<(), BoxError>,
{
    FnMigrator(f)
}

/// Terminal state of a successful reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Installed and expected versions matched; the migrator was not called.
    UpToDate { version: u32 },
    /// The migrator ran and the stored version was advanced.
    Migrated { from: u32, to: u32 },
}

/// Brings the stored schema version of `db` up to its expected version.
pub(crate) fn reconcile<M: Migrator>(db: &Database, migrator: &mut M) -> Result<MigrationOutcome> {
    let installed = db.schema_version()?;
    let expected = db.expected_version();
    debug!(installed, expected, path = %db.path().display(), "Checking schema version");

    match installed.cmp(&expected) {
        Ordering::Equal => Ok(MigrationOutcome::UpToDate { version: installed }),
        Ordering::Greater => {
            warn!(installed, expected, "Installed schema is newer than this application");
            Err(DbError::VersionSkew {
                installed,
                expected,
            })
        }
        Ordering::Less => {
            info!(from = installed, to = expected, "Migrating schema");
            let tx = db.connection().unchecked_transaction()?;

            if let Err(source) = migrator.migrate(db, installed, expected) {
                if let Err(e) = tx.rollback() {
                    warn!(error = %e, "Rollback after failed migration reported an error");
                }
                warn!(from = installed, to = expected, error = %source, "Migration failed, rolled back");
                return Err(DbError::Migration {
                    from: installed,
                    to: expected,
                    source,
                });
            }

            // The version is only ever written inside the migration transaction.
            if !db.in_transaction() {
                warn!(from = installed, to = expected, "Migrator ended the migration transaction");
                return Err(DbError::Migration {
                    from: installed,
                    to: expected,
                    source: "migrator committed or rolled back the migration transaction".into(),
                });
            }

            db.set_schema_version(expected)?;
            tx.commit()?;
            info!(from = installed, to = expected, "Migration committed");
            Ok(MigrationOutcome::Migrated {
                from: installed,
                to: expected,
            })
        }
    }
}
