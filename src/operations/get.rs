//! Prepared Get operations — typed reads, single-object reads, raw rows,
//! and their live stream forms.

use std::sync::Arc;

use crate::changes::ChangeFilter;
use crate::client::Store;
use crate::error::Result;
use crate::interceptor::{run_chain, OpOutput, OperationContext, OperationKind};
use crate::query::GetQuery;
use crate::reactive::{LiveStream, OverflowPolicy};
use crate::resolver::{GetResolver, RowGetResolver};
use crate::storage::{ResultSet, Row};

use super::{downcast_output, wrap_storage, Deferred};

/// Observed set of a read, as a bus filter. `None` disables auto-refresh.
fn observed_filter(query: &GetQuery) -> Option<ChangeFilter> {
    let (tables, tags) = query.observed_set();
    if tables.is_empty() && tags.is_empty() {
        None
    } else {
        Some(ChangeFilter::new(tables, tags))
    }
}

/// Execute the read and map every row.
///
/// The result-set handle is dropped on every exit path, including a failed
/// mapping step, so its resource is released exactly once.
fn read_all<T>(
    store: &Store,
    resolver: &dyn GetResolver<T>,
    query: &GetQuery,
    context: &OperationContext,
) -> Result<Vec<T>> {
    let mut result_set = resolver
        .perform_get(store, query)
        .map_err(|e| wrap_storage(context, e))?;
    let mut items = Vec::new();
    while let Some(row) = result_set
        .next_row()
        .map_err(|e| wrap_storage(context, e))?
    {
        items.push(
            resolver
                .map_row(store, &row)
                .map_err(|e| wrap_storage(context, e))?,
        );
    }
    Ok(items)
}

/// Execute the read and map the first row, if any.
fn read_first<T>(
    store: &Store,
    resolver: &dyn GetResolver<T>,
    query: &GetQuery,
    context: &OperationContext,
) -> Result<Option<T>> {
    let mut result_set = resolver
        .perform_get(store, query)
        .map_err(|e| wrap_storage(context, e))?;
    match result_set
        .next_row()
        .map_err(|e| wrap_storage(context, e))?
    {
        Some(row) => Ok(Some(
            resolver
                .map_row(store, &row)
                .map_err(|e| wrap_storage(context, e))?,
        )),
        None => Ok(None),
    }
}

// ============================================================================
// PreparedGetList
// ============================================================================

/// Get returning every mapped object.
pub struct PreparedGetList<T> {
    store: Store,
    query: GetQuery,
    resolver: Option<Arc<dyn GetResolver<T>>>,
}

impl<T> Clone for PreparedGetList<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            query: self.query.clone(),
            resolver: self.resolver.as_ref().map(Arc::clone),
        }
    }
}

impl<T> PreparedGetList<T> {
    pub(crate) fn new(store: Store, query: GetQuery) -> Self {
        Self {
            store,
            query,
            resolver: None,
        }
    }

    /// Use `resolver` for this operation instead of the registered mapping.
    pub fn with_resolver(mut self, resolver: impl GetResolver<T> + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn query(&self) -> &GetQuery {
        &self.query
    }
}

impl<T: Send + 'static> PreparedGetList<T> {
    /// Execute on the calling thread.
    pub fn execute(&self) -> Result<Vec<T>> {
        let context = OperationContext::new(
            OperationKind::Get,
            format!("Get operation, query = {:?}", self.query),
        );
        let output = run_chain(self.store.interceptors(), &context, || {
            self.query.validate()?;
            let resolver = match &self.resolver {
                Some(resolver) => Arc::clone(resolver),
                None => self.store.mapping_of::<T>()?.get,
            };
            let items = read_all(&self.store, resolver.as_ref(), &self.query, &context)?;
            Ok(Box::new(items) as OpOutput)
        })?;
        downcast_output(output, &context)
    }

    /// Execute on the store's scheduler.
    pub fn execute_deferred(self) -> Deferred<Vec<T>> {
        let store = self.store.clone();
        Deferred::spawn(&store, move || self.execute())
    }

    /// Continuous live stream: cold-start value immediately, then one
    /// re-executed result per matching change notification.
    pub fn stream(&self, policy: OverflowPolicy) -> LiveStream<Vec<T>> {
        let operation = self.clone();
        let filter = observed_filter(&self.query);
        LiveStream::launch(&self.store, filter, policy, move || operation.execute())
    }
}

// ============================================================================
// PreparedGetObject
// ============================================================================

/// Get returning the first mapped object, if any. The live stream form
/// re-emits `None` results unconditionally, like any other value.
pub struct PreparedGetObject<T> {
    store: Store,
    query: GetQuery,
    resolver: Option<Arc<dyn GetResolver<T>>>,
}

impl<T> Clone for PreparedGetObject<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            query: self.query.clone(),
            resolver: self.resolver.as_ref().map(Arc::clone),
        }
    }
}

impl<T> PreparedGetObject<T> {
    pub(crate) fn new(store: Store, query: GetQuery) -> Self {
        Self {
            store,
            query,
            resolver: None,
        }
    }

    /// Use `resolver` for this operation instead of the registered mapping.
    pub fn with_resolver(mut self, resolver: impl GetResolver<T> + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }
}

impl<T: Send + 'static> PreparedGetObject<T> {
    /// Execute on the calling thread.
    pub fn execute(&self) -> Result<Option<T>> {
        let context = OperationContext::new(
            OperationKind::Get,
            format!("Get operation, query = {:?}", self.query),
        );
        let output = run_chain(self.store.interceptors(), &context, || {
            self.query.validate()?;
            let resolver = match &self.resolver {
                Some(resolver) => Arc::clone(resolver),
                None => self.store.mapping_of::<T>()?.get,
            };
            let item = read_first(&self.store, resolver.as_ref(), &self.query, &context)?;
            Ok(Box::new(item) as OpOutput)
        })?;
        downcast_output(output, &context)
    }

    /// Execute on the store's scheduler.
    pub fn execute_deferred(self) -> Deferred<Option<T>> {
        let store = self.store.clone();
        Deferred::spawn(&store, move || self.execute())
    }

    /// Continuous live stream of `Option<T>` results.
    pub fn stream(&self, policy: OverflowPolicy) -> LiveStream<Option<T>> {
        let operation = self.clone();
        let filter = observed_filter(&self.query);
        LiveStream::launch(&self.store, filter, policy, move || operation.execute())
    }
}

// ============================================================================
// PreparedGetRows
// ============================================================================

/// Get returning the raw result-set handle (identity mapping).
#[derive(Clone)]
pub struct PreparedGetRows {
    store: Store,
    query: GetQuery,
    resolver: Arc<dyn GetResolver<Row>>,
}

impl PreparedGetRows {
    pub(crate) fn new(store: Store, query: GetQuery) -> Self {
        Self {
            store,
            query,
            resolver: Arc::new(RowGetResolver),
        }
    }

    /// Use `resolver`'s `perform_get` for this operation.
    pub fn with_resolver(mut self, resolver: impl GetResolver<Row> + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Execute on the calling thread, returning the unconsumed handle.
    pub fn execute(&self) -> Result<Box<dyn ResultSet>> {
        let context = OperationContext::new(
            OperationKind::Get,
            format!("Get operation, query = {:?}", self.query),
        );
        let output = run_chain(self.store.interceptors(), &context, || {
            self.query.validate()?;
            let rows = self
                .resolver
                .perform_get(&self.store, &self.query)
                .map_err(|e| wrap_storage(&context, e))?;
            Ok(Box::new(rows) as OpOutput)
        })?;
        downcast_output(output, &context)
    }

    /// Execute on the store's scheduler.
    pub fn execute_deferred(self) -> Deferred<Box<dyn ResultSet>> {
        let store = self.store.clone();
        Deferred::spawn(&store, move || self.execute())
    }

    /// Continuous live stream of result-set handles.
    pub fn stream(&self, policy: OverflowPolicy) -> LiveStream<Box<dyn ResultSet>> {
        let operation = self.clone();
        let filter = observed_filter(&self.query);
        LiveStream::launch(&self.store, filter, policy, move || operation.execute())
    }
}
