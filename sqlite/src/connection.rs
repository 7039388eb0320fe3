//! The database connection and its lifecycle.
//!
//! [`Database`] exclusively owns one SQLite connection. Opening it never
//! creates a file: the file must already exist (see
//! [`install_seed`](crate::install_seed)). Right after opening, the stored
//! schema version is reconciled with the expected one (see
//! [`migration`](crate::migration)).
//!
//! Transactions are controlled explicitly with
//! [`begin_transaction`](Database::begin_transaction),
//! [`commit_transaction`](Database::commit_transaction) and
//! [`rollback_transaction`](Database::rollback_transaction). They do not nest;
//! misuse is reported by SQLite itself. Ad-hoc statements issued through
//! [`execute_query`](Database::execute_query) while a transaction is open
//! simply run inside it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use crate::bootstrap::install_seed;
use crate::config::DatabaseConfig;
use crate::error::{DbError, Result, engine_message};
use crate::migration::{self, MigrationOutcome, Migrator};
use crate::statement::{Statement, Step};

/// A single SQLite database connection with schema-version management.
///
/// Not `Sync`: all access must happen from one logical sequence of
/// operations at a time. Closed when dropped, or explicitly with
/// [`close`](Self::close). Statements borrow the `Database`, so none can
/// outlive it.
pub struct Database {
    conn: Connection,
    path: PathBuf,
    expected_version: u32,
    outcome: MigrationOutcome,
    /// Statement name to the SQL text it was first prepared with.
    names: RefCell<HashMap<String, String>>,
    last_error: RefCell<Option<String>>,
}

impl Database {
    /// Opens the database at `path` with default settings, expecting schema
    /// version `expected_version`.
    ///
    /// # Errors
    ///
    /// - [`DbError::MissingFile`] if no file exists at `path`
    /// - [`DbError::InvalidSchemaVersion`] if `expected_version` exceeds
    ///   `i32::MAX`
    /// - [`DbError::Open`] if SQLite cannot open it or it is not a database
    /// - [`DbError::VersionSkew`] if the installed schema is newer
    /// - [`DbError::Migration`] if the migrator fails
    pub fn open<M: Migrator>(
        path: impl AsRef<Path>,
        expected_version: u32,
        migrator: M,
    ) -> Result<Self> {
        let config = DatabaseConfig {
            schema_version: expected_version,
            ..DatabaseConfig::default()
        };
        Self::open_with_config(path, &config, migrator)
    }

    /// Opens the database at `path` using the settings in `config`.
    ///
    /// The expected schema version is `config.schema_version`. See
    /// [`open`](Self::open) for the error cases.
    pub fn open_with_config<M: Migrator>(
        path: impl AsRef<Path>,
        config: &DatabaseConfig,
        mut migrator: M,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(DbError::MissingFile(path));
        }
        // user_version is a signed 32-bit header field.
        if i32::try_from(config.schema_version).is_err() {
            return Err(DbError::InvalidSchemaVersion(i64::from(config.schema_version)));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&path, flags).map_err(|source| DbError::Open {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Opened database");

        let mut db = Self {
            conn,
            path,
            expected_version: config.schema_version,
            outcome: MigrationOutcome::UpToDate {
                version: config.schema_version,
            },
            names: RefCell::new(HashMap::new()),
            last_error: RefCell::new(None),
        };
        db.configure(config)?;
        db.outcome = migration::reconcile(&db, &mut migrator)?;
        Ok(db)
    }

    /// Installs `seed` at `path` if no database exists there yet, then opens
    /// it as [`open_with_config`](Self::open_with_config) does.
    pub fn open_or_install<M: Migrator>(
        seed: impl AsRef<Path>,
        path: impl AsRef<Path>,
        config: &DatabaseConfig,
        migrator: M,
    ) -> Result<Self> {
        install_seed(seed, path.as_ref())?;
        Self::open_with_config(path, config, migrator)
    }

    /// Applies connection settings and validates that the file is a database.
    fn configure(&self, config: &DatabaseConfig) -> Result<()> {
        self.conn
            .set_prepared_statement_cache_capacity(config.statement_cache_capacity);
        if let Some(ms) = config.busy_timeout_ms {
            self.conn.busy_timeout(Duration::from_millis(ms))?;
        }

        // First read of the header; a corrupt or foreign file fails here.
        let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
        self.conn
            .execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))
            .and_then(|()| self.conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |_| Ok(())))
            .map_err(|source| DbError::Open {
                path: self.path.clone(),
                source,
            })
    }

    /// Returns the underlying rusqlite connection. For advanced use only;
    /// closing stays with the `Database`.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Path the database was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema version the application expects.
    pub fn expected_version(&self) -> u32 {
        self.expected_version
    }

    /// What schema reconciliation did when the database was opened.
    pub fn migration_outcome(&self) -> MigrationOutcome {
        self.outcome
    }

    /// Reads the schema version stored in the database header.
    pub fn schema_version(&self) -> Result<u32> {
        let raw: i64 = self.track(self.conn.query_row("PRAGMA user_version", [], |row| row.get(0)))?;
        u32::try_from(raw).map_err(|_| DbError::InvalidSchemaVersion(raw))
    }

    /// Only the migration coordinator writes the version.
    pub(crate) fn set_schema_version(&self, version: u32) -> Result<()> {
        self.track(
            self.conn
                .execute_batch(&format!("PRAGMA user_version = {version};")),
        )?;
        Ok(())
    }

    /// Begins a transaction. Fails if one is already open.
    pub fn begin_transaction(&self) -> Result<()> {
        self.track(self.conn.execute_batch("BEGIN TRANSACTION;"))?;
        Ok(())
    }

    /// Commits the open transaction. Fails if none is open.
    pub fn commit_transaction(&self) -> Result<()> {
        self.track(self.conn.execute_batch("COMMIT TRANSACTION;"))?;
        Ok(())
    }

    /// Rolls back the open transaction. Fails if none is open.
    pub fn rollback_transaction(&self) -> Result<()> {
        self.track(self.conn.execute_batch("ROLLBACK TRANSACTION;"))?;
        Ok(())
    }

    /// Returns `true` while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Compiles `query` into a [`Statement`].
    ///
    /// With a non-empty `name`, the statement is kept in the connection's
    /// statement cache and later calls with the same name reuse it instead of
    /// recompiling. The SQL recorded for a name on first use is the one that
    /// is compiled from then on. Reused statements come back with all
    /// parameters cleared and the row position reset.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Prepare`] if SQLite cannot compile the SQL.
    pub fn prepare_statement(&self, name: &str, query: &str) -> Result<Statement<'_>> {
        if name.is_empty() {
            return self.prepare(query);
        }

        let sql = self
            .names
            .borrow_mut()
            .entry(name.to_string())
            .or_insert_with(|| query.to_string())
            .clone();
        let stmt = self
            .track(self.conn.prepare_cached(&sql))
            .map_err(|source| DbError::Prepare {
                sql: sql.clone(),
                source,
            })?;
        let mut stmt = Statement::cached(self, stmt, name, &sql);
        stmt.reset()?;
        Ok(stmt)
    }

    /// Compiles `query` into an uncached [`Statement`].
    pub fn prepare(&self, query: &str) -> Result<Statement<'_>> {
        let stmt = self
            .track(self.conn.prepare(query))
            .map_err(|source| DbError::Prepare {
                sql: query.to_string(),
                source,
            })?;
        Ok(Statement::fresh(self, stmt, query))
    }

    /// Compiles and runs a single statement without parameters, stepping
    /// through (and discarding) any rows it produces.
    ///
    /// Intended for DDL and one-shot statements. Runs inside the current
    /// transaction when one is open.
    pub fn execute_query(&self, sql: &str) -> Result<()> {
        let mut stmt = self.prepare(sql)?;
        let mut rows = stmt.query();
        while let Step::Row(_) = rows.step()? {}
        Ok(())
    }

    /// Runs every `;`-separated statement in `script`, stopping at the first
    /// failure. Statements that already ran are not undone beyond what
    /// SQLite itself does; wrap the call in a transaction for atomicity.
    pub fn execute_script(&self, script: &str) -> Result<()> {
        debug!(bytes = script.len(), "Executing SQL script");
        self.track(self.conn.execute_batch(script))?;
        Ok(())
    }

    /// Reads a UTF-8 SQL script from `path` and runs it with
    /// [`execute_script`](Self::execute_script).
    pub fn execute_script_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let script = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loaded SQL script");
        self.execute_script(&script)
    }

    /// Rowid of the most recent successful INSERT on this connection, or `0`
    /// if there has been none.
    pub fn last_insert_row_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Message of the most recent SQLite failure seen through this
    /// `Database` or its statements. Only meaningful right after a failing
    /// call.
    pub fn error_message(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    /// Drops every cached statement without closing the connection.
    ///
    /// Named statements are recompiled on their next use.
    pub fn release_cached_resources(&self) {
        let released = {
            let mut names = self.names.borrow_mut();
            let count = names.len();
            names.clear();
            count
        };
        self.conn.flush_prepared_statement_cache();
        info!(released, "Released cached statements");
    }

    /// Finalizes cached statements and closes the connection.
    ///
    /// Dropping a `Database` closes it as well; this variant reports a
    /// failing close.
    pub fn close(self) -> Result<()> {
        self.conn.flush_prepared_statement_cache();
        let path = self.path;
        self.conn.close().map_err(|(_, e)| DbError::Sqlite(e))?;
        debug!(path = %path.display(), "Closed database");
        Ok(())
    }

    /// Records the engine message of a failed call for
    /// [`error_message`](Self::error_message).
    pub(crate) fn track<T>(&self, result: rusqlite::Result<T>) -> rusqlite::Result<T> {
        if let Err(e) = &result {
            *self.last_error.borrow_mut() = Some(engine_message(e));
        }
        result
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("expected_version", &self.expected_version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::NoMigration;
    use tempfile::TempDir;

    fn empty_db(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("app.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT);")
            .unwrap();
        path
    }

    #[test]
    fn test_open_missing_file_does_not_create() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.db");
        let err = Database::open(&path, 1, NoMigration).unwrap_err();
        assert!(matches!(err, DbError::MissingFile(_)));
        assert!(!path.exists());
    }

    #[test]
    fn test_open_rejects_non_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, vec![0x5a; 4096]).unwrap();
        let err = Database::open(&path, 1, NoMigration).unwrap_err();
        assert!(matches!(err, DbError::Open { .. }));
        assert_eq!(err.code(), Some(rusqlite::ErrorCode::NotADatabase));
    }

    #[test]
    fn test_nested_begin_is_reported() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(empty_db(&dir), 0, NoMigration).unwrap();
        db.begin_transaction().unwrap();
        assert!(db.in_transaction());
        assert!(db.begin_transaction().is_err());
        assert!(db.error_message().is_some());
        db.rollback_transaction().unwrap();
        assert!(!db.in_transaction());
    }

    #[test]
    fn test_commit_without_begin_is_reported() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(empty_db(&dir), 0, NoMigration).unwrap();
        assert!(db.commit_transaction().is_err());
        assert!(db.rollback_transaction().is_err());
    }

    #[test]
    fn test_last_insert_row_id() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(empty_db(&dir), 0, NoMigration).unwrap();
        assert_eq!(db.last_insert_row_id(), 0);
        db.execute_query("INSERT INTO items (id, label) VALUES (41, 'a')").unwrap();
        assert_eq!(db.last_insert_row_id(), 41);
    }

    #[test]
    fn test_execute_query_discards_rows() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(empty_db(&dir), 0, NoMigration).unwrap();
        db.execute_query("INSERT INTO items (label) VALUES ('x')").unwrap();
        db.execute_query("SELECT * FROM items").unwrap();
    }

    #[test]
    fn test_execute_script_stops_at_first_failure() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(empty_db(&dir), 0, NoMigration).unwrap();
        let script = "INSERT INTO items (label) VALUES ('one');\n\
                      INSERT INTO missing (label) VALUES ('two');\n\
                      INSERT INTO items (label) VALUES ('three');";
        let err = db.execute_script(script).unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));
        assert!(db.error_message().unwrap().contains("missing"));

        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_named_statement_keeps_first_sql() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(empty_db(&dir), 0, NoMigration).unwrap();
        let stmt = db.prepare_statement("count", "SELECT COUNT(*) FROM items").unwrap();
        assert_eq!(stmt.name(), Some("count"));
        drop(stmt);
        let stmt = db.prepare_statement("count", "SELECT 1").unwrap();
        assert_eq!(stmt.sql(), "SELECT COUNT(*) FROM items");
    }

    #[test]
    fn test_release_cached_resources_forgets_names() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(empty_db(&dir), 0, NoMigration).unwrap();
        drop(db.prepare_statement("q", "SELECT 1").unwrap());
        db.release_cached_resources();
        let stmt = db.prepare_statement("q", "SELECT 2").unwrap();
        assert_eq!(stmt.sql(), "SELECT 2");
    }

    #[test]
    fn test_prepare_error_keeps_engine_message() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(empty_db(&dir), 0, NoMigration).unwrap();
        let err = db.prepare("SELEC nonsense").unwrap_err();
        assert!(matches!(err, DbError::Prepare { .. }));
        assert!(db.error_message().unwrap().contains("syntax error"));
    }

    #[test]
    fn test_close() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(empty_db(&dir), 0, NoMigration).unwrap();
        drop(db.prepare_statement("q", "SELECT 1").unwrap());
        db.close().unwrap();
    }
}
