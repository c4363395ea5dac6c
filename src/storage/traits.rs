/// Storage backend traits for ripple-db.
///
/// `StorageBackend` is the narrow physical-I/O trait implemented by concrete
/// backends (e.g. SQLite). The executor is the only caller; resolvers reach
/// the backend through the executor, never directly.
use serde_json::Value;

use crate::error::Result;
use crate::query::{DeleteQuery, InsertQuery, Query, RawQuery, UpdateQuery};

/// A single result row: column name to value.
pub type Row = serde_json::Map<String, Value>;

/// Handle over a query's result rows.
///
/// The handle owns whatever resource backs the rows; dropping it releases
/// that resource. Release happens on every exit path, including when a
/// row-mapping step fails partway through iteration.
pub trait ResultSet: Send {
    /// Next row, or `None` when the set is exhausted.
    fn next_row(&mut self) -> Result<Option<Row>>;
}

/// Low-level physical store — raw row I/O with no domain-type semantics.
///
/// Implementors must be `Send + Sync` so one store instance can serve
/// concurrent callers. Direct backend calls never trigger change
/// notifications; that is the executor's job.
pub trait StorageBackend: Send + Sync {
    /// Execute a structured query and return a handle over the result rows.
    fn query(&self, query: &Query) -> Result<Box<dyn ResultSet>>;

    /// Execute a free-form read statement.
    fn raw_query(&self, query: &RawQuery) -> Result<Box<dyn ResultSet>>;

    /// Execute a free-form statement that returns no rows.
    fn execute_raw(&self, query: &RawQuery) -> Result<()>;

    /// Insert a row. Returns the generated row id.
    fn insert(&self, query: &InsertQuery, row: &Row) -> Result<i64>;

    /// Update rows matching the query. Returns the number of rows affected.
    fn update(&self, query: &UpdateQuery, row: &Row) -> Result<u64>;

    /// Delete rows matching the query. Returns the number of rows deleted.
    fn delete(&self, query: &DeleteQuery) -> Result<u64>;

    /// Begin a transaction. Transactions nest; each `begin` must be paired
    /// with exactly one `commit` or `rollback`.
    fn begin_transaction(&self) -> Result<()>;

    /// Commit the innermost open transaction.
    fn commit_transaction(&self) -> Result<()>;

    /// Roll back the innermost open transaction.
    fn rollback_transaction(&self) -> Result<()>;

    /// Release backend resources. Default: no-op.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}
