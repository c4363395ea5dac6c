//! Get resolution — physical read plus row-to-object mapping.

use crate::client::Store;
use crate::error::Result;
use crate::query::GetQuery;
use crate::storage::{ResultSet, Row};

/// Strategy translating a read descriptor into a result-set handle and rows
/// into domain objects.
pub trait GetResolver<T>: Send + Sync {
    /// Execute the physical read. The default dispatches the descriptor to
    /// the executor; override to customize how rows are fetched.
    fn perform_get(&self, store: &Store, query: &GetQuery) -> Result<Box<dyn ResultSet>> {
        match query {
            GetQuery::Query(q) => store.low_level().query(q),
            GetQuery::Raw(r) => store.low_level().raw_query(r),
        }
    }

    /// Map one result row to a domain object.
    fn map_row(&self, store: &Store, row: &Row) -> Result<T>;
}

/// Identity resolver — rows map to themselves, for callers that want raw
/// rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct RowGetResolver;

impl GetResolver<Row> for RowGetResolver {
    fn map_row(&self, _store: &Store, row: &Row) -> Result<Row> {
        Ok(row.clone())
    }
}
