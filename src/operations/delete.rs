//! Prepared Delete operations — object deletes, batch deletes, and
//! delete-by-query.

use std::fmt;
use std::sync::Arc;

use crate::changes::Changes;
use crate::client::Store;
use crate::error::Result;
use crate::interceptor::{run_chain, OpOutput, OperationContext, OperationKind};
use crate::query::DeleteQuery;
use crate::resolver::{ByQueryDeleteResolver, DeleteResolver, DeleteResult};

use super::{downcast_output, wrap_storage, Deferred};

/// Publish a notification for one effective delete, outside a transaction.
fn notify_delete(store: &Store, result: &DeleteResult) {
    if result.rows_deleted > 0 {
        store.low_level().notify_about_changes(Changes::new(
            result.affected_tables.clone(),
            result.affected_tags.clone(),
        ));
    }
}

// ============================================================================
// PreparedDeleteObject
// ============================================================================

/// Delete of a single object. A delete that matches nothing reports zero
/// rows and publishes nothing.
pub struct PreparedDeleteObject<T> {
    store: Store,
    object: T,
    resolver: Option<Arc<dyn DeleteResolver<T>>>,
}

impl<T> PreparedDeleteObject<T> {
    pub(crate) fn new(store: Store, object: T) -> Self {
        Self {
            store,
            object,
            resolver: None,
        }
    }

    /// Use `resolver` for this operation instead of the registered mapping.
    pub fn with_resolver(mut self, resolver: impl DeleteResolver<T> + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }
}

impl<T: fmt::Debug + 'static> PreparedDeleteObject<T> {
    /// Execute on the calling thread.
    pub fn execute(&self) -> Result<DeleteResult> {
        let context = OperationContext::new(
            OperationKind::Delete,
            format!("Delete operation, object = {:?}", self.object),
        );
        let output = run_chain(self.store.interceptors(), &context, || {
            let resolver = match &self.resolver {
                Some(resolver) => Arc::clone(resolver),
                None => self.store.mapping_of::<T>()?.delete,
            };
            let result = resolver
                .perform_delete(&self.store, &self.object)
                .map_err(|e| wrap_storage(&context, e))?;
            notify_delete(&self.store, &result);
            Ok(Box::new(result) as OpOutput)
        })?;
        downcast_output(output, &context)
    }

    /// Execute on the store's scheduler.
    pub fn execute_deferred(self) -> Deferred<DeleteResult>
    where
        T: Send + Sync,
    {
        let store = self.store.clone();
        Deferred::spawn(&store, move || self.execute())
    }
}

// ============================================================================
// PreparedDeleteCollection
// ============================================================================

/// Delete of a collection of objects, transactional by default, with the
/// same notification timing as a put collection.
pub struct PreparedDeleteCollection<T> {
    store: Store,
    objects: Vec<T>,
    resolver: Option<Arc<dyn DeleteResolver<T>>>,
    use_transaction: bool,
}

impl<T> PreparedDeleteCollection<T> {
    pub(crate) fn new(store: Store, objects: Vec<T>) -> Self {
        Self {
            store,
            objects,
            resolver: None,
            use_transaction: true,
        }
    }

    /// Use `resolver` for every item instead of the registered mapping.
    pub fn with_resolver(mut self, resolver: impl DeleteResolver<T> + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Whether to wrap the batch in a transaction. Default: true.
    pub fn use_transaction(mut self, use_transaction: bool) -> Self {
        self.use_transaction = use_transaction;
        self
    }
}

impl<T: fmt::Debug + 'static> PreparedDeleteCollection<T> {
    /// Execute on the calling thread. An empty collection performs zero
    /// operations and zero notifications.
    pub fn execute(&self) -> Result<Vec<DeleteResult>> {
        if self.objects.is_empty() {
            return Ok(Vec::new());
        }
        let context = OperationContext::new(
            OperationKind::Delete,
            format!("Delete operation, objects = {:?}", self.objects),
        );
        let output = run_chain(self.store.interceptors(), &context, || {
            let resolver = match &self.resolver {
                Some(resolver) => Arc::clone(resolver),
                None => self.store.mapping_of::<T>()?.delete,
            };
            let results = self.perform_batch(resolver.as_ref(), &context)?;
            Ok(Box::new(results) as OpOutput)
        })?;
        downcast_output(output, &context)
    }

    fn perform_batch(
        &self,
        resolver: &dyn DeleteResolver<T>,
        context: &OperationContext,
    ) -> Result<Vec<DeleteResult>> {
        let low = self.store.low_level();

        if self.use_transaction {
            low.begin_transaction().map_err(|e| wrap_storage(context, e))?;
        }

        let outcome = (|| -> Result<Vec<DeleteResult>> {
            let mut results = Vec::with_capacity(self.objects.len());
            for object in &self.objects {
                let result = resolver
                    .perform_delete(&self.store, object)
                    .map_err(|e| wrap_storage(context, e))?;
                if !self.use_transaction {
                    notify_delete(&self.store, &result);
                }
                results.push(result);
            }
            Ok(results)
        })();

        if !self.use_transaction {
            return outcome;
        }

        let marked = match &outcome {
            Ok(_) => low.set_transaction_successful(),
            Err(_) => Ok(()),
        };
        let ended = low.end_transaction();

        let results = outcome?;
        marked.map_err(|e| wrap_storage(context, e))?;
        ended.map_err(|e| wrap_storage(context, e))?;

        let mut union = Changes::default();
        for result in &results {
            if result.rows_deleted > 0 {
                union.merge(&Changes::new(
                    result.affected_tables.clone(),
                    result.affected_tags.clone(),
                ));
            }
        }
        if !union.is_empty() {
            low.notify_about_changes(union);
        }
        Ok(results)
    }

    /// Execute on the store's scheduler.
    pub fn execute_deferred(self) -> Deferred<Vec<DeleteResult>>
    where
        T: Send + Sync,
    {
        let store = self.store.clone();
        Deferred::spawn(&store, move || self.execute())
    }
}

// ============================================================================
// PreparedDeleteByQuery
// ============================================================================

/// Delete driven directly by a [`DeleteQuery`] descriptor.
pub struct PreparedDeleteByQuery {
    store: Store,
    query: DeleteQuery,
    resolver: Arc<dyn DeleteResolver<DeleteQuery>>,
}

impl PreparedDeleteByQuery {
    pub(crate) fn new(store: Store, query: DeleteQuery) -> Self {
        Self {
            store,
            query,
            resolver: Arc::new(ByQueryDeleteResolver),
        }
    }

    /// Use `resolver` for this operation instead of the default.
    pub fn with_resolver(mut self, resolver: impl DeleteResolver<DeleteQuery> + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Execute on the calling thread.
    pub fn execute(&self) -> Result<DeleteResult> {
        let context = OperationContext::new(
            OperationKind::Delete,
            format!("Delete operation, query = {:?}", self.query),
        );
        let output = run_chain(self.store.interceptors(), &context, || {
            self.query.validate()?;
            let result = self
                .resolver
                .perform_delete(&self.store, &self.query)
                .map_err(|e| wrap_storage(&context, e))?;
            notify_delete(&self.store, &result);
            Ok(Box::new(result) as OpOutput)
        })?;
        downcast_output(output, &context)
    }

    /// Execute on the store's scheduler.
    pub fn execute_deferred(self) -> Deferred<DeleteResult> {
        let store = self.store.clone();
        Deferred::spawn(&store, move || self.execute())
    }
}
