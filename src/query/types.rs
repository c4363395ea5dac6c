//! Descriptor type definitions: read queries, write queries, and the
//! validation applied before any backend access.
//!
//! Descriptors are plain structs. Construct them with `new(..)` plus struct
//! update syntax; `validate()` is the single checking step and runs before
//! the backend is touched.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::ValidationError;

// ============================================================================
// Query
// ============================================================================

/// SELECT-shaped query against a single table.
///
/// `observes_tables` / `observes_tags` extend the implicit observed set
/// (the queried table) for live subscribers of this query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub table: String,
    pub distinct: bool,
    /// Empty means all columns.
    pub columns: Vec<String>,
    pub where_clause: Option<String>,
    pub where_args: Vec<Value>,
    pub group_by: Option<String>,
    pub having: Option<String>,
    pub order_by: Option<String>,
    /// Free-form limit clause, e.g. `"20"` or `"20 OFFSET 40"`.
    pub limit: Option<String>,
    pub observes_tables: Vec<String>,
    pub observes_tags: Vec<String>,
}

impl Query {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.table.is_empty() {
            return Err(ValidationError::new(
                "table",
                "query table must be non-empty",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// RawQuery
// ============================================================================

/// Free-form statement with explicit affected and observed sets.
///
/// `affects_tables` / `affects_tags` declare what the statement writes (if
/// it is a write). `observes_tables` / `observes_tags` declare what a live
/// subscriber of this query should watch; when both are empty, auto-refresh
/// is disabled for this query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQuery {
    pub statement: String,
    pub args: Vec<Value>,
    pub affects_tables: Vec<String>,
    pub affects_tags: Vec<String>,
    pub observes_tables: Vec<String>,
    pub observes_tags: Vec<String>,
}

impl RawQuery {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.statement.is_empty() {
            return Err(ValidationError::new(
                "statement",
                "raw query statement must be non-empty",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// GetQuery
// ============================================================================

/// Either source a get operation can read from.
#[derive(Debug, Clone, PartialEq)]
pub enum GetQuery {
    Query(Query),
    Raw(RawQuery),
}

impl GetQuery {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            GetQuery::Query(q) => q.validate(),
            GetQuery::Raw(r) => r.validate(),
        }
    }

    /// The observed set for live subscriptions: implicit table plus declared
    /// observed tables/tags on `Query`, the explicit fields on `RawQuery`.
    pub fn observed_set(&self) -> (BTreeSet<String>, BTreeSet<String>) {
        match self {
            GetQuery::Query(q) => {
                let mut tables: BTreeSet<String> =
                    q.observes_tables.iter().cloned().collect();
                tables.insert(q.table.clone());
                (tables, q.observes_tags.iter().cloned().collect())
            }
            GetQuery::Raw(r) => (
                r.observes_tables.iter().cloned().collect(),
                r.observes_tags.iter().cloned().collect(),
            ),
        }
    }
}

impl From<Query> for GetQuery {
    fn from(query: Query) -> Self {
        GetQuery::Query(query)
    }
}

impl From<RawQuery> for GetQuery {
    fn from(query: RawQuery) -> Self {
        GetQuery::Raw(query)
    }
}

// ============================================================================
// Write descriptors
// ============================================================================

/// Insert a single row into a table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertQuery {
    pub table: String,
}

impl InsertQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.table.is_empty() {
            return Err(ValidationError::new(
                "table",
                "insert table must be non-empty",
            ));
        }
        Ok(())
    }
}

/// Update rows matching a where clause. `None` where clause updates all rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateQuery {
    pub table: String,
    pub where_clause: Option<String>,
    pub where_args: Vec<Value>,
}

impl UpdateQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.table.is_empty() {
            return Err(ValidationError::new(
                "table",
                "update table must be non-empty",
            ));
        }
        Ok(())
    }
}

/// Delete rows matching a where clause. `None` where clause deletes all rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteQuery {
    pub table: String,
    pub where_clause: Option<String>,
    pub where_args: Vec<Value>,
}

impl DeleteQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.table.is_empty() {
            return Err(ValidationError::new(
                "table",
                "delete table must be non-empty",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
