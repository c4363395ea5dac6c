//! Shared test fixtures: a recording in-memory backend and a small domain
//! type with its resolver set.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use ripple_db::client::Store;
use ripple_db::error::{Result, RippleDbError};
use ripple_db::query::{DeleteQuery, InsertQuery, Query, RawQuery, UpdateQuery};
use ripple_db::registry::TypeMapping;
use ripple_db::resolver::{
    DefaultDeleteResolver, DefaultPutResolver, DeleteMapping, GetResolver, PutMapping,
    PutResolver, PutResult,
};
use ripple_db::storage::{ResultSet, Row, StorageBackend};

// ============================================================================
// MemoryBackend
// ============================================================================

type Tables = HashMap<String, Vec<(i64, Row)>>;

struct BackendState {
    tables: Mutex<Tables>,
    /// Snapshots for rollback, innermost last.
    tx_stack: Mutex<Vec<Tables>>,
    next_id: AtomicI64,
    physical_calls: AtomicUsize,
    released_result_sets: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

/// In-memory backend that records every physical call, counts result-set
/// releases, and can be scripted to fail reads or writes. Clones share
/// state, so tests keep a handle after moving a clone into the store.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<BackendState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(BackendState {
                tables: Mutex::new(HashMap::new()),
                tx_stack: Mutex::new(Vec::new()),
                next_id: AtomicI64::new(1),
                physical_calls: AtomicUsize::new(0),
                released_result_sets: AtomicUsize::new(0),
                fail_writes: AtomicBool::new(false),
                fail_reads: AtomicBool::new(false),
            }),
        }
    }

    pub fn physical_calls(&self) -> usize {
        self.state.physical_calls.load(Ordering::SeqCst)
    }

    pub fn released_result_sets(&self) -> usize {
        self.state.released_result_sets.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn rows_in(&self, table: &str) -> usize {
        self.state
            .tables
            .lock()
            .unwrap()
            .get(table)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }

    fn record_call(&self) {
        self.state.physical_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn scripted_write_failure(&self) -> Result<()> {
        if self.state.fail_writes.load(Ordering::SeqCst) {
            Err(RippleDbError::Internal(
                "scripted backend write failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn scripted_read_failure(&self) -> Result<()> {
        if self.state.fail_reads.load(Ordering::SeqCst) {
            Err(RippleDbError::Internal(
                "scripted backend read failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn result_set(&self, rows: Vec<Row>) -> Box<dyn ResultSet> {
        Box::new(CountingResultSet {
            rows: rows.into(),
            state: Arc::clone(&self.state),
        })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Supports the single-equality shape `"<column> = ?"` used in the tests.
fn row_matches(row: &Row, where_clause: Option<&String>, args: &[Value]) -> bool {
    let Some(clause) = where_clause else {
        return true;
    };
    let column = clause
        .strip_suffix(" = ?")
        .expect("MemoryBackend only supports \"<column> = ?\" where clauses");
    let expected = args.first().expect("missing where argument");
    row.get(column) == Some(expected)
}

impl StorageBackend for MemoryBackend {
    fn query(&self, query: &Query) -> Result<Box<dyn ResultSet>> {
        self.record_call();
        self.scripted_read_failure()?;
        let tables = self.state.tables.lock().unwrap();
        let rows: Vec<Row> = tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, row)| {
                        row_matches(row, query.where_clause.as_ref(), &query.where_args)
                    })
                    .map(|(_, row)| row.clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(self.result_set(rows))
    }

    fn raw_query(&self, query: &RawQuery) -> Result<Box<dyn ResultSet>> {
        self.record_call();
        self.scripted_read_failure()?;
        // Supports "SELECT ... FROM <table>" by returning the whole table.
        let table = query
            .statement
            .split_whitespace()
            .skip_while(|word| !word.eq_ignore_ascii_case("FROM"))
            .nth(1)
            .unwrap_or_default()
            .to_string();
        let tables = self.state.tables.lock().unwrap();
        let rows: Vec<Row> = tables
            .get(&table)
            .map(|rows| rows.iter().map(|(_, row)| row.clone()).collect())
            .unwrap_or_default();
        Ok(self.result_set(rows))
    }

    fn execute_raw(&self, _query: &RawQuery) -> Result<()> {
        self.record_call();
        self.scripted_write_failure()
    }

    fn insert(&self, query: &InsertQuery, row: &Row) -> Result<i64> {
        self.record_call();
        self.scripted_write_failure()?;
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        let mut stored = row.clone();
        stored.entry("id".to_string()).or_insert(json!(id));
        self.state
            .tables
            .lock()
            .unwrap()
            .entry(query.table.clone())
            .or_default()
            .push((id, stored));
        Ok(id)
    }

    fn update(&self, query: &UpdateQuery, row: &Row) -> Result<u64> {
        self.record_call();
        self.scripted_write_failure()?;
        let mut tables = self.state.tables.lock().unwrap();
        let Some(rows) = tables.get_mut(&query.table) else {
            return Ok(0);
        };
        let mut affected = 0;
        for (_, stored) in rows.iter_mut() {
            if row_matches(stored, query.where_clause.as_ref(), &query.where_args) {
                for (column, value) in row {
                    stored.insert(column.clone(), value.clone());
                }
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn delete(&self, query: &DeleteQuery) -> Result<u64> {
        self.record_call();
        self.scripted_write_failure()?;
        let mut tables = self.state.tables.lock().unwrap();
        let Some(rows) = tables.get_mut(&query.table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|(_, row)| {
            !row_matches(row, query.where_clause.as_ref(), &query.where_args)
        });
        Ok((before - rows.len()) as u64)
    }

    fn begin_transaction(&self) -> Result<()> {
        let snapshot = self.state.tables.lock().unwrap().clone();
        self.state.tx_stack.lock().unwrap().push(snapshot);
        Ok(())
    }

    fn commit_transaction(&self) -> Result<()> {
        self.state
            .tx_stack
            .lock()
            .unwrap()
            .pop()
            .map(|_| ())
            .ok_or_else(|| RippleDbError::Internal("commit without transaction".to_string()))
    }

    fn rollback_transaction(&self) -> Result<()> {
        let snapshot = self
            .state
            .tx_stack
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| RippleDbError::Internal("rollback without transaction".to_string()))?;
        *self.state.tables.lock().unwrap() = snapshot;
        Ok(())
    }
}

struct CountingResultSet {
    rows: std::collections::VecDeque<Row>,
    state: Arc<BackendState>,
}

impl ResultSet for CountingResultSet {
    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.pop_front())
    }
}

impl Drop for CountingResultSet {
    fn drop(&mut self) {
        self.state.released_result_sets.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Domain fixture: User
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Option<i64>,
    pub name: String,
}

impl User {
    pub fn new(id: Option<i64>, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

pub const USERS_TABLE: &str = "users";

/// Mapping for the default put/delete strategies.
pub struct UserMapping;

impl PutMapping<User> for UserMapping {
    fn insert_query(&self, _object: &User) -> InsertQuery {
        InsertQuery::new(USERS_TABLE)
    }

    fn update_query(&self, object: &User) -> UpdateQuery {
        UpdateQuery {
            where_clause: Some("id = ?".to_string()),
            where_args: vec![object.id.map(|id| json!(id)).unwrap_or(Value::Null)],
            ..UpdateQuery::new(USERS_TABLE)
        }
    }

    fn to_row(&self, object: &User) -> Row {
        let mut row = Row::new();
        if let Some(id) = object.id {
            row.insert("id".to_string(), json!(id));
        }
        row.insert("name".to_string(), json!(object.name));
        row
    }
}

impl DeleteMapping<User> for UserMapping {
    fn delete_query(&self, object: &User) -> DeleteQuery {
        DeleteQuery {
            where_clause: Some("id = ?".to_string()),
            where_args: vec![object.id.map(|id| json!(id)).unwrap_or(Value::Null)],
            ..DeleteQuery::new(USERS_TABLE)
        }
    }
}

/// Row mapping for `User` reads.
pub struct UserGetResolver;

impl GetResolver<User> for UserGetResolver {
    fn map_row(&self, _store: &Store, row: &Row) -> Result<User> {
        Ok(User {
            id: row.get("id").and_then(Value::as_i64),
            name: row
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

pub fn user_mapping() -> TypeMapping<User> {
    TypeMapping::new(
        DefaultPutResolver::new(UserMapping),
        UserGetResolver,
        DefaultDeleteResolver::new(UserMapping),
    )
}

/// Put strategy that adds a notification tag on top of the default.
pub struct TaggedUserPutResolver {
    inner: DefaultPutResolver<UserMapping>,
    tag: &'static str,
}

impl TaggedUserPutResolver {
    pub fn new(tag: &'static str) -> Self {
        Self {
            inner: DefaultPutResolver::new(UserMapping),
            tag,
        }
    }
}

impl PutResolver<User> for TaggedUserPutResolver {
    fn perform_put(&self, store: &Store, object: &User) -> Result<PutResult> {
        let mut result = self.inner.perform_put(store, object)?;
        result.affected_tags.insert(self.tag.to_string());
        Ok(result)
    }
}

/// Put strategy that fails for a specific user name.
pub struct FailingPutResolver {
    inner: DefaultPutResolver<UserMapping>,
    poison: &'static str,
}

impl FailingPutResolver {
    pub fn new(poison: &'static str) -> Self {
        Self {
            inner: DefaultPutResolver::new(UserMapping),
            poison,
        }
    }
}

impl PutResolver<User> for FailingPutResolver {
    fn perform_put(&self, store: &Store, object: &User) -> Result<PutResult> {
        if object.name == self.poison {
            return Err(RippleDbError::Internal(format!(
                "refusing to put {}",
                object.name
            )));
        }
        self.inner.perform_put(store, object)
    }
}

/// Query for users whose `name` equals `name`.
pub fn users_by_name(name: &str) -> Query {
    Query {
        where_clause: Some("name = ?".to_string()),
        where_args: vec![json!(name)],
        ..Query::new(USERS_TABLE)
    }
}
