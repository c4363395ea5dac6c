//! Prepared Put operations — insert or update through a put resolver.

use std::fmt;
use std::sync::Arc;

use crate::changes::Changes;
use crate::client::Store;
use crate::error::Result;
use crate::interceptor::{run_chain, OpOutput, OperationContext, OperationKind};
use crate::resolver::{PutResolver, PutResult};

use super::{downcast_output, wrap_storage, Deferred};

/// Publish a notification for one committed put, outside a transaction.
fn notify_put(store: &Store, result: &PutResult) {
    if result.was_inserted() || result.was_updated() {
        store.low_level().notify_about_changes(Changes::new(
            result.affected_tables.clone(),
            result.affected_tags.clone(),
        ));
    }
}

// ============================================================================
// PreparedPutObject
// ============================================================================

/// Put of a single object.
pub struct PreparedPutObject<T> {
    store: Store,
    object: T,
    resolver: Option<Arc<dyn PutResolver<T>>>,
}

impl<T> PreparedPutObject<T> {
    pub(crate) fn new(store: Store, object: T) -> Self {
        Self {
            store,
            object,
            resolver: None,
        }
    }

    /// Use `resolver` for this operation instead of the registered mapping.
    pub fn with_resolver(mut self, resolver: impl PutResolver<T> + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn object(&self) -> &T {
        &self.object
    }
}

impl<T: fmt::Debug + 'static> PreparedPutObject<T> {
    /// Execute on the calling thread.
    pub fn execute(&self) -> Result<PutResult> {
        let context = OperationContext::new(
            OperationKind::Put,
            format!("Put operation, object = {:?}", self.object),
        );
        let output = run_chain(self.store.interceptors(), &context, || {
            let resolver = match &self.resolver {
                Some(resolver) => Arc::clone(resolver),
                None => self.store.mapping_of::<T>()?.put,
            };
            let result = resolver
                .perform_put(&self.store, &self.object)
                .map_err(|e| wrap_storage(&context, e))?;
            notify_put(&self.store, &result);
            Ok(Box::new(result) as OpOutput)
        })?;
        downcast_output(output, &context)
    }

    /// Execute on the store's scheduler.
    pub fn execute_deferred(self) -> Deferred<PutResult>
    where
        T: Send + Sync,
    {
        let store = self.store.clone();
        Deferred::spawn(&store, move || self.execute())
    }
}

// ============================================================================
// PreparedPutCollection
// ============================================================================

/// Put of a collection of objects, transactional by default.
///
/// With a transaction: one coalesced notification after commit, covering
/// the union of affected sets, only when that union is non-empty. Without:
/// each effective item notifies immediately; a mid-batch failure aborts the
/// rest but does not compensate the items already applied.
pub struct PreparedPutCollection<T> {
    store: Store,
    objects: Vec<T>,
    resolver: Option<Arc<dyn PutResolver<T>>>,
    use_transaction: bool,
}

impl<T> PreparedPutCollection<T> {
    pub(crate) fn new(store: Store, objects: Vec<T>) -> Self {
        Self {
            store,
            objects,
            resolver: None,
            use_transaction: true,
        }
    }

    /// Use `resolver` for every item instead of the registered mapping.
    pub fn with_resolver(mut self, resolver: impl PutResolver<T> + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Whether to wrap the batch in a transaction. Default: true.
    pub fn use_transaction(mut self, use_transaction: bool) -> Self {
        self.use_transaction = use_transaction;
        self
    }
}

impl<T: fmt::Debug + 'static> PreparedPutCollection<T> {
    /// Execute on the calling thread. An empty collection performs zero
    /// operations and zero notifications.
    pub fn execute(&self) -> Result<Vec<PutResult>> {
        if self.objects.is_empty() {
            return Ok(Vec::new());
        }
        let context = OperationContext::new(
            OperationKind::Put,
            format!("Put operation, objects = {:?}", self.objects),
        );
        let output = run_chain(self.store.interceptors(), &context, || {
            let resolver = match &self.resolver {
                Some(resolver) => Arc::clone(resolver),
                None => self.store.mapping_of::<T>()?.put,
            };
            let results = self.perform_batch(resolver.as_ref(), &context)?;
            Ok(Box::new(results) as OpOutput)
        })?;
        downcast_output(output, &context)
    }

    fn perform_batch(
        &self,
        resolver: &dyn PutResolver<T>,
        context: &OperationContext,
    ) -> Result<Vec<PutResult>> {
        let low = self.store.low_level();

        if self.use_transaction {
            low.begin_transaction().map_err(|e| wrap_storage(context, e))?;
        }

        let outcome = (|| -> Result<Vec<PutResult>> {
            let mut results = Vec::with_capacity(self.objects.len());
            for object in &self.objects {
                let result = resolver
                    .perform_put(&self.store, object)
                    .map_err(|e| wrap_storage(context, e))?;
                if !self.use_transaction {
                    notify_put(&self.store, &result);
                }
                results.push(result);
            }
            Ok(results)
        })();

        if !self.use_transaction {
            return outcome;
        }

        // Mark success only when every item succeeded; end unconditionally,
        // which rolls back when the mark was never set.
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
            if result.was_inserted() || result.was_updated() {
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
    pub fn execute_deferred(self) -> Deferred<Vec<PutResult>>
    where
        T: Send + Sync,
    {
        let store = self.store.clone();
        Deferred::spawn(&store, move || self.execute())
    }
}
