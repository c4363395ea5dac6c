//! Delete resolution — derive a delete query from an object and execute it.

use std::collections::BTreeSet;

use crate::client::Store;
use crate::error::Result;
use crate::query::DeleteQuery;

// ============================================================================
// DeleteResult
// ============================================================================

/// Immutable result of a delete operation.
///
/// The affected sets are empty when no rows were deleted, so a no-op delete
/// can never trigger a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResult {
    pub rows_deleted: u64,
    pub affected_tables: BTreeSet<String>,
    pub affected_tags: BTreeSet<String>,
}

impl DeleteResult {
    pub fn new<T, G>(rows_deleted: u64, tables: T, tags: G) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        if rows_deleted == 0 {
            return Self {
                rows_deleted: 0,
                affected_tables: BTreeSet::new(),
                affected_tags: BTreeSet::new(),
            };
        }
        Self {
            rows_deleted,
            affected_tables: tables.into_iter().map(Into::into).collect(),
            affected_tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// DeleteResolver
// ============================================================================

/// Strategy translating a domain object into a physical delete.
pub trait DeleteResolver<T>: Send + Sync {
    fn perform_delete(&self, store: &Store, object: &T) -> Result<DeleteResult>;
}

/// Mapping function the default delete strategy is assembled from.
pub trait DeleteMapping<T>: Send + Sync {
    /// Delete query identifying `object`'s rows (typically by identity
    /// field).
    fn delete_query(&self, object: &T) -> DeleteQuery;
}

/// Default delete strategy: derive the query from the object and execute it.
pub struct DefaultDeleteResolver<M> {
    mapping: M,
}

impl<M> DefaultDeleteResolver<M> {
    pub fn new(mapping: M) -> Self {
        Self { mapping }
    }
}

impl<T, M> DeleteResolver<T> for DefaultDeleteResolver<M>
where
    M: DeleteMapping<T>,
{
    fn perform_delete(&self, store: &Store, object: &T) -> Result<DeleteResult> {
        let query = self.mapping.delete_query(object);
        let rows_deleted = store.low_level().delete(&query)?;
        Ok(DeleteResult::new(
            rows_deleted,
            [query.table],
            [] as [String; 0],
        ))
    }
}

/// Resolver for delete-by-query operations: the descriptor is its own
/// translation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ByQueryDeleteResolver;

impl DeleteResolver<DeleteQuery> for ByQueryDeleteResolver {
    fn perform_delete(&self, store: &Store, query: &DeleteQuery) -> Result<DeleteResult> {
        let rows_deleted = store.low_level().delete(query)?;
        Ok(DeleteResult::new(
            rows_deleted,
            [query.table.clone()],
            [] as [String; 0],
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================
