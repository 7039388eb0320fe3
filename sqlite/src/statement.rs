//! Prepared statements with typed parameter binding and column extraction.
//!
//! A [`Statement`] borrows the [`Database`] it was prepared on, so it can
//! never outlive the connection. Parameters are bound by 1-based index;
//! [`Statement::query`] starts execution and returns a [`Rows`] cursor whose
//! [`Rows::step`] yields [`Step::Row`] for each result row and [`Step::Done`]
//! once execution completes. Columns of the current row are read by 0-based
//! index through the [`codec`](crate::codec) conventions.
//!
//! # Example
//!
//! ```no_run
//! use sqlkeep::{Database, NoMigration, Step};
//!
//! let db = Database::open("app.db", 1, NoMigration).unwrap();
//! let mut stmt = db
//!     .prepare_statement("by_done", "SELECT title, done FROM tasks WHERE done = ?1")
//!     .unwrap();
//! stmt.bind_bool(1, false).unwrap();
//!
//! let mut rows = stmt.query();
//! while let Step::Row(row) = rows.step().unwrap() {
//!     println!("{:?} done={}", row.column_string(0).unwrap(), row.column_bool(1).unwrap());
//! }
//! ```

use chrono::{DateTime, Utc};
use rusqlite::CachedStatement;

use crate::codec::{self, Value};
use crate::connection::Database;
use crate::error::{DbError, Result};

/// Either a one-off statement or one checked out of the connection's cache.
/// Cached statements return to the cache when dropped.
enum Handle<'conn> {
    Fresh(rusqlite::Statement<'conn>),
    Cached(CachedStatement<'conn>),
}

/// A prepared statement tied to the lifetime of its [`Database`].
///
/// Finalized (or returned to the statement cache, when named) on drop.
pub struct Statement<'conn> {
    db: &'conn Database,
    handle: Handle<'conn>,
    name: Option<String>,
    sql: String,
}

impl<'conn> Statement<'conn> {
    pub(crate) fn fresh(db: &'conn Database, stmt: rusqlite::Statement<'conn>, sql: &str) -> Self {
        Self {
            db,
            handle: Handle::Fresh(stmt),
            name: None,
            sql: sql.to_string(),
        }
    }

    pub(crate) fn cached(
        db: &'conn Database,
        stmt: CachedStatement<'conn>,
        name: &str,
        sql: &str,
    ) -> Self {
        Self {
            db,
            handle: Handle::Cached(stmt),
            name: Some(name.to_string()),
            sql: sql.to_string(),
        }
    }

    /// Returns the underlying rusqlite statement. For advanced use only.
    pub fn raw(&mut self) -> &mut rusqlite::Statement<'conn> {
        match &mut self.handle {
            Handle::Fresh(stmt) => stmt,
            Handle::Cached(stmt) => &mut **stmt,
        }
    }

    fn inner(&self) -> &rusqlite::Statement<'conn> {
        match &self.handle {
            Handle::Fresh(stmt) => stmt,
            Handle::Cached(stmt) => &**stmt,
        }
    }

    /// Cache name, for statements prepared with a non-empty name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// SQL text the statement was compiled from.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of `?` parameters the statement declares.
    pub fn parameter_count(&self) -> usize {
        self.inner().parameter_count()
    }

    /// Number of columns each result row has.
    pub fn column_count(&self) -> usize {
        self.inner().column_count()
    }

    /// Name of result column `index`.
    pub fn column_name(&self, index: usize) -> Result<&str> {
        let count = self.column_count();
        self.inner()
            .column_name(index)
            .map_err(|_| DbError::ColumnOutOfRange { index, count })
    }

    /// Binds `value` to the 1-based parameter `index`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::ParameterOutOfRange`] if `index` is not within
    /// `1..=parameter_count()`, or [`DbError::Bind`] if SQLite rejects the
    /// value.
    pub fn bind(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        let count = self.parameter_count();
        if index == 0 || index > count {
            return Err(DbError::ParameterOutOfRange { index, count });
        }
        let value = value.into();
        let result = self.raw().raw_bind_parameter(index, &value);
        self.db
            .track(result)
            .map_err(|source| DbError::Bind { index, source })
    }

    /// Binds a boolean, stored as `1`/`0`.
    pub fn bind_bool(&mut self, index: usize, value: bool) -> Result<()> {
        self.bind(index, value)
    }

    /// Binds an integer.
    pub fn bind_int(&mut self, index: usize, value: i64) -> Result<()> {
        self.bind(index, value)
    }

    /// Binds a float.
    pub fn bind_double(&mut self, index: usize, value: f64) -> Result<()> {
        self.bind(index, value)
    }

    /// Binds text.
    pub fn bind_string(&mut self, index: usize, value: &str) -> Result<()> {
        self.bind(index, value)
    }

    /// Binds a timestamp, stored as text in
    /// [`TIMESTAMP_FORMAT`](crate::codec::TIMESTAMP_FORMAT).
    pub fn bind_date(&mut self, index: usize, value: DateTime<Utc>) -> Result<()> {
        self.bind(index, value)
    }

    /// Binds SQL NULL.
    pub fn bind_null(&mut self, index: usize) -> Result<()> {
        self.bind(index, Value::Null)
    }

    /// Starts executing the statement with the currently bound parameters.
    ///
    /// The returned cursor borrows the statement; dropping it resets the row
    /// position so the statement can be executed again.
    pub fn query(&mut self) -> Rows<'_> {
        let db = self.db;
        let columns = self.column_count();
        Rows {
            db,
            columns,
            inner: self.raw().raw_query(),
        }
    }

    /// Runs a statement that produces no rows (INSERT, UPDATE, DELETE, DDL)
    /// to completion and returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Step`] if execution fails or the statement
    /// returns rows.
    pub fn execute(&mut self) -> Result<usize> {
        let result = self.raw().raw_execute();
        self.db.track(result).map_err(DbError::Step)
    }

    /// Clears all bound parameters so the statement can be reused for a new
    /// execution. The row position is reset whenever a [`Rows`] cursor is
    /// dropped.
    pub fn reset(&mut self) -> Result<()> {
        self.raw().clear_bindings();
        Ok(())
    }
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("name", &self.name)
            .field("parameters", &self.parameter_count())
            .field("columns", &self.column_count())
            .finish_non_exhaustive()
    }
}

/// Outcome of a single [`Rows::step`].
#[derive(Debug)]
pub enum Step<'r, 'stmt> {
    /// A result row is available.
    Row(Row<'r, 'stmt>),
    /// The statement has finished executing.
    Done,
}

impl Step<'_, '_> {
    /// Returns `true` for [`Step::Row`].
    pub fn is_row(&self) -> bool {
        matches!(self, Self::Row(_))
    }
}

/// Execution cursor over a statement's result rows.
pub struct Rows<'stmt> {
    db: &'stmt Database,
    columns: usize,
    inner: rusqlite::Rows<'stmt>,
}

impl<'stmt> Rows<'stmt> {
    /// Advances execution by one step.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Step`] for any engine status other than a row or
    /// completion (constraint violations, busy/locked, misuse). The message
    /// is also available from [`Database::error_message`].
    pub fn step(&mut self) -> Result<Step<'_, 'stmt>> {
        let db = self.db;
        let columns = self.columns;
        match db.track(self.inner.next()).map_err(DbError::Step)? {
            Some(inner) => Ok(Step::Row(Row { inner, columns })),
            None => Ok(Step::Done),
        }
    }
}

/// The current result row of a [`Rows`] cursor.
///
/// Every accessor reads through the [`codec`](crate::codec): NULL columns
/// yield the type's default and never an error. Only an out-of-range column
/// index fails.
pub struct Row<'r, 'stmt> {
    inner: &'r rusqlite::Row<'stmt>,
    columns: usize,
}

impl Row<'_, '_> {
    fn value(&self, index: usize) -> Result<rusqlite::types::ValueRef<'_>> {
        if index >= self.columns {
            return Err(DbError::ColumnOutOfRange {
                index,
                count: self.columns,
            });
        }
        Ok(self.inner.get_ref(index)?)
    }

    /// Number of columns in the row.
    pub fn column_count(&self) -> usize {
        self.columns
    }

    /// Returns `true` if column `index` is SQL NULL.
    pub fn is_null(&self, index: usize) -> Result<bool> {
        Ok(matches!(self.value(index)?, rusqlite::types::ValueRef::Null))
    }

    /// Reads an integer column as a boolean. NULL reads as `false`.
    pub fn column_bool(&self, index: usize) -> Result<bool> {
        self.value(index).map(codec::decode_bool)
    }

    /// NULL reads as `0`.
    pub fn column_int(&self, index: usize) -> Result<i64> {
        self.value(index).map(codec::decode_int)
    }

    /// NULL reads as `0.0`.
    pub fn column_double(&self, index: usize) -> Result<f64> {
        self.value(index).map(codec::decode_real)
    }

    /// NULL reads as `None`; an empty string reads as `Some("")`.
    pub fn column_string(&self, index: usize) -> Result<Option<String>> {
        self.value(index).map(codec::decode_text)
    }

    /// Reads a text column as a timestamp. NULL and malformed text read as
    /// `None`.
    pub fn column_date(&self, index: usize) -> Result<Option<DateTime<Utc>>> {
        self.value(index).map(codec::decode_timestamp)
    }
}

impl std::fmt::Debug for Row<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Row")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}
