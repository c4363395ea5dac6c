//! SQLite storage backend for ripple-db.
//!
//! Implements `StorageBackend` using rusqlite (bundled). The connection is
//! protected by a `parking_lot::ReentrantMutex<RefCell<Connection>>` so that
//! nested transaction calls from the same thread can re-acquire the lock.
//! Transactions are implemented as named SAVEPOINTs so they compose when
//! nested.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use rusqlite::types::ValueRef;
use serde_json::Value;

use crate::error::{Result, RippleDbError};
use crate::query::{DeleteQuery, InsertQuery, Query, RawQuery, UpdateQuery};

use super::traits::{ResultSet, Row, StorageBackend};

// ============================================================================
// Value helpers
// ============================================================================

/// Convert a `serde_json::Value` to a `rusqlite::types::Value` for statement
/// params.
fn json_value_to_sql(v: &Value) -> rusqlite::types::Value {
    match v {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(if *b { 1 } else { 0 }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                rusqlite::types::Value::Integer(i)
            } else {
                rusqlite::types::Value::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        // Arrays and objects stored as JSON strings in SQLite
        other => rusqlite::types::Value::Text(other.to_string()),
    }
}

/// Convert a SQLite column value to a `serde_json::Value`.
///
/// Blobs surface as JSON arrays of byte values.
fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|&byte| Value::from(byte)).collect()),
    }
}

// ============================================================================
// Materialized result set
// ============================================================================

/// Result rows read eagerly under the connection lock.
///
/// Owning the rows means the SQLite statement is finished before the handle
/// is returned; dropping the handle releases the rows.
struct MaterializedRows {
    rows: VecDeque<Row>,
}

impl ResultSet for MaterializedRows {
    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.pop_front())
    }
}

// ============================================================================
// SqliteBackend
// ============================================================================

/// SQLite storage backend.
pub struct SqliteBackend {
    conn: ReentrantMutex<RefCell<rusqlite::Connection>>,
    /// Open savepoint names, innermost last.
    savepoints: Mutex<Vec<String>>,
    savepoint_counter: AtomicU64,
}

impl SqliteBackend {
    /// Open a file-backed SQLite database.
    pub fn open(path: &str) -> Result<Self> {
        Ok(Self::from_connection(rusqlite::Connection::open(path)?))
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(
            rusqlite::Connection::open_in_memory()?,
        ))
    }

    fn from_connection(conn: rusqlite::Connection) -> Self {
        Self {
            conn: ReentrantMutex::new(RefCell::new(conn)),
            savepoints: Mutex::new(Vec::new()),
            savepoint_counter: AtomicU64::new(0),
        }
    }

    /// Execute `f` with a shared reference to the underlying connection.
    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T>,
    {
        let guard = self.conn.lock();
        let conn = guard.borrow();
        f(&conn)
    }

    /// Run `sql` with `params` and materialize every row into a `Row`.
    fn run_select(
        &self,
        sql: &str,
        params: Vec<rusqlite::types::Value>,
    ) -> Result<Box<dyn ResultSet>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let column_names: Vec<String> =
                stmt.column_names().iter().map(|c| c.to_string()).collect();

            let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
            let mut out: VecDeque<Row> = VecDeque::new();
            while let Some(row) = rows.next()? {
                let mut record = Row::new();
                for (idx, name) in column_names.iter().enumerate() {
                    record.insert(name.clone(), sql_to_json(row.get_ref(idx)?));
                }
                out.push_back(record);
            }
            Ok(Box::new(MaterializedRows { rows: out }) as Box<dyn ResultSet>)
        })
    }

    /// Build the SELECT statement and params for a structured query.
    fn build_select(query: &Query) -> (String, Vec<rusqlite::types::Value>) {
        let mut sql = String::from("SELECT ");
        if query.distinct {
            sql.push_str("DISTINCT ");
        }
        if query.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&query.columns.join(", "));
        }
        sql.push_str(" FROM ");
        sql.push_str(&query.table);

        if let Some(where_clause) = &query.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(where_clause);
        }
        if let Some(group_by) = &query.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group_by);
        }
        if let Some(having) = &query.having {
            sql.push_str(" HAVING ");
            sql.push_str(having);
        }
        if let Some(order_by) = &query.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        if let Some(limit) = &query.limit {
            sql.push_str(" LIMIT ");
            sql.push_str(limit);
        }

        let params = query.where_args.iter().map(json_value_to_sql).collect();
        (sql, params)
    }
}

// ============================================================================
// StorageBackend implementation
// ============================================================================

impl StorageBackend for SqliteBackend {
    fn query(&self, query: &Query) -> Result<Box<dyn ResultSet>> {
        let (sql, params) = Self::build_select(query);
        self.run_select(&sql, params)
    }

    fn raw_query(&self, query: &RawQuery) -> Result<Box<dyn ResultSet>> {
        let params = query.args.iter().map(json_value_to_sql).collect();
        self.run_select(&query.statement, params)
    }

    fn execute_raw(&self, query: &RawQuery) -> Result<()> {
        self.with_conn(|conn| {
            if query.args.is_empty() {
                conn.execute_batch(&query.statement)?;
            } else {
                let params: Vec<rusqlite::types::Value> =
                    query.args.iter().map(json_value_to_sql).collect();
                conn.execute(&query.statement, rusqlite::params_from_iter(params))?;
            }
            Ok(())
        })
    }

    fn insert(&self, query: &InsertQuery, row: &Row) -> Result<i64> {
        self.with_conn(|conn| {
            if row.is_empty() {
                conn.execute(
                    &format!("INSERT INTO {} DEFAULT VALUES", query.table),
                    [],
                )?;
            } else {
                let columns: Vec<&str> = row.keys().map(String::as_str).collect();
                let placeholders: Vec<String> =
                    (1..=columns.len()).map(|i| format!("?{i}")).collect();
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    query.table,
                    columns.join(", "),
                    placeholders.join(", ")
                );
                let params: Vec<rusqlite::types::Value> =
                    row.values().map(json_value_to_sql).collect();
                conn.execute(&sql, rusqlite::params_from_iter(params))?;
            }
            Ok(conn.last_insert_rowid())
        })
    }

    fn update(&self, query: &UpdateQuery, row: &Row) -> Result<u64> {
        if row.is_empty() {
            return Err(RippleDbError::Internal(
                "update requires at least one column value".to_string(),
            ));
        }
        self.with_conn(|conn| {
            let assignments: Vec<String> = row
                .keys()
                .enumerate()
                .map(|(i, column)| format!("{column} = ?{}", i + 1))
                .collect();
            let mut sql = format!("UPDATE {} SET {}", query.table, assignments.join(", "));
            if let Some(where_clause) = &query.where_clause {
                sql.push_str(" WHERE ");
                sql.push_str(where_clause);
            }
            let params: Vec<rusqlite::types::Value> = row
                .values()
                .chain(query.where_args.iter())
                .map(json_value_to_sql)
                .collect();
            let affected = conn.execute(&sql, rusqlite::params_from_iter(params))?;
            Ok(affected as u64)
        })
    }

    fn delete(&self, query: &DeleteQuery) -> Result<u64> {
        self.with_conn(|conn| {
            let mut sql = format!("DELETE FROM {}", query.table);
            if let Some(where_clause) = &query.where_clause {
                sql.push_str(" WHERE ");
                sql.push_str(where_clause);
            }
            let params: Vec<rusqlite::types::Value> =
                query.where_args.iter().map(json_value_to_sql).collect();
            let deleted = conn.execute(&sql, rusqlite::params_from_iter(params))?;
            Ok(deleted as u64)
        })
    }

    fn begin_transaction(&self) -> Result<()> {
        let n = self.savepoint_counter.fetch_add(1, Ordering::Relaxed);
        let name = format!("sp_{n}");
        self.with_conn(|conn| {
            conn.execute_batch(&format!("SAVEPOINT {name}"))?;
            Ok(())
        })?;
        self.savepoints.lock().push(name);
        Ok(())
    }

    fn commit_transaction(&self) -> Result<()> {
        let name = self.savepoints.lock().pop().ok_or_else(|| {
            RippleDbError::Internal("commit_transaction without open transaction".to_string())
        })?;
        self.with_conn(|conn| {
            conn.execute_batch(&format!("RELEASE SAVEPOINT {name}"))?;
            Ok(())
        })
    }

    fn rollback_transaction(&self) -> Result<()> {
        let name = self.savepoints.lock().pop().ok_or_else(|| {
            RippleDbError::Internal("rollback_transaction without open transaction".to_string())
        })?;
        self.with_conn(|conn| {
            conn.execute_batch(&format!(
                "ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}"
            ))?;
            Ok(())
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
