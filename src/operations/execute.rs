//! Prepared ExecuteRaw operation — free-form write statements with
//! explicitly declared affected sets.

use crate::changes::Changes;
use crate::client::Store;
use crate::error::Result;
use crate::interceptor::{run_chain, OpOutput, OperationContext, OperationKind};
use crate::query::RawQuery;

use super::{downcast_output, wrap_storage, Deferred};

/// Executes a statement that returns no rows. Notifies the query's
/// `affects_tables` / `affects_tags` when they are non-empty.
#[derive(Clone)]
pub struct PreparedExecuteRaw {
    store: Store,
    query: RawQuery,
}

impl PreparedExecuteRaw {
    pub(crate) fn new(store: Store, query: RawQuery) -> Self {
        Self { store, query }
    }

    /// Execute on the calling thread.
    pub fn execute(&self) -> Result<()> {
        let context = OperationContext::new(
            OperationKind::ExecuteRaw,
            format!("ExecuteRaw operation, query = {:?}", self.query),
        );
        let output = run_chain(self.store.interceptors(), &context, || {
            self.query.validate()?;
            self.store
                .low_level()
                .execute_raw(&self.query)
                .map_err(|e| wrap_storage(&context, e))?;
            let changes = Changes::new(
                self.query.affects_tables.clone(),
                self.query.affects_tags.clone(),
            );
            if !changes.is_empty() {
                self.store.low_level().notify_about_changes(changes);
            }
            Ok(Box::new(()) as OpOutput)
        })?;
        downcast_output(output, &context)
    }

    /// Execute on the store's scheduler.
    pub fn execute_deferred(self) -> Deferred<()> {
        let store = self.store.clone();
        Deferred::spawn(&store, move || self.execute())
    }
}
