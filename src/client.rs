//! Store — the resolver-dispatch execution engine.
//!
//! A [`Store`] owns the storage backend, the type registry, the change bus,
//! the interceptor list, and the scheduler. It is cheap to clone (the state
//! sits behind one `Arc`) and safe to share across threads.
//!
//! # Threading model
//!
//! Blocking operations run entirely on the caller's thread. The transaction
//! protocol (`begin` / `set_successful` / `end`) assumes one logical session
//! drives a given transaction at a time; transaction frames are tracked as a
//! stack, so interleaving frames from different threads is not supported —
//! serialization at that level is the backend's concern. Change
//! notifications raised while any transaction is running are held back and
//! flushed as one union once the last frame ends, strictly after the commit
//! decision.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::changes::{ChangeFilter, Changes};
use crate::error::{Result, ValidationError};
use crate::interceptor::Interceptor;
use crate::operations::delete::{
    PreparedDeleteByQuery, PreparedDeleteCollection, PreparedDeleteObject,
};
use crate::operations::execute::PreparedExecuteRaw;
use crate::operations::get::{PreparedGetList, PreparedGetObject, PreparedGetRows};
use crate::operations::put::{PreparedPutCollection, PreparedPutObject};
use crate::query::{DeleteQuery, GetQuery, InsertQuery, Query, RawQuery, UpdateQuery};
use crate::reactive::bus::{BusSubscription, ChangeBus};
use crate::registry::{TypeMapping, TypeRegistry};
use crate::scheduler::{Scheduler, ThreadScheduler};
use crate::storage::{ResultSet, Row, StorageBackend};

// ============================================================================
// Store
// ============================================================================

struct StoreInner {
    backend: Box<dyn StorageBackend>,
    registry: TypeRegistry,
    bus: ChangeBus,
    interceptors: Vec<Arc<dyn Interceptor>>,
    scheduler: Arc<dyn Scheduler>,
    /// Number of currently open transaction frames.
    running_transactions: AtomicUsize,
    /// Success mark per open frame, innermost last.
    transaction_frames: Mutex<Vec<bool>>,
    /// Changes raised while a transaction was running, flushed as one union.
    pending_changes: Mutex<Vec<Changes>>,
}

/// The persistence client. See the module docs for the threading model.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Resolver triple for `T`. Fails with a configuration error before any
    /// backend access when `T` was never registered.
    pub fn mapping_of<T: 'static>(&self) -> Result<TypeMapping<T>> {
        Ok(self.inner.registry.mapping_of::<T>()?)
    }

    /// Low-level physical I/O and transaction control.
    pub fn low_level(&self) -> LowLevel<'_> {
        LowLevel { inner: &self.inner }
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.inner.interceptors
    }

    /// Subscribe to change notifications published by this store.
    ///
    /// The sink runs synchronously on the publishing thread. Cancel through
    /// the returned handle; dropping the handle without cancelling leaves
    /// the subscription active.
    pub fn observe_changes(
        &self,
        filter: ChangeFilter,
        sink: impl Fn(&Changes) + Send + Sync + 'static,
    ) -> BusSubscription {
        self.inner.bus.subscribe(filter, sink)
    }

    /// Number of live change subscribers. Diagnostics only.
    pub fn change_subscriber_count(&self) -> usize {
        self.inner.bus.subscriber_count()
    }

    /// Release backend resources. Operations after `close` may fail.
    pub fn close(&self) -> Result<()> {
        self.inner.backend.close()
    }

    pub(crate) fn change_bus(&self) -> &ChangeBus {
        &self.inner.bus
    }

    pub(crate) fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.inner.scheduler
    }

    // -----------------------------------------------------------------------
    // Operation entry points
    // -----------------------------------------------------------------------

    /// Prepare a put of one object.
    pub fn put<T>(&self, object: T) -> PreparedPutObject<T> {
        PreparedPutObject::new(self.clone(), object)
    }

    /// Prepare a put of a collection. Uses a transaction by default.
    pub fn put_all<T>(&self, objects: Vec<T>) -> PreparedPutCollection<T> {
        PreparedPutCollection::new(self.clone(), objects)
    }

    /// Prepare a get returning every mapped object.
    pub fn get_list<T>(&self, query: impl Into<GetQuery>) -> PreparedGetList<T> {
        PreparedGetList::new(self.clone(), query.into())
    }

    /// Prepare a get returning the first mapped object, if any.
    pub fn get_object<T>(&self, query: impl Into<GetQuery>) -> PreparedGetObject<T> {
        PreparedGetObject::new(self.clone(), query.into())
    }

    /// Prepare a get returning the raw result-set handle.
    pub fn get_rows(&self, query: impl Into<GetQuery>) -> PreparedGetRows {
        PreparedGetRows::new(self.clone(), query.into())
    }

    /// Prepare a delete of one object.
    pub fn delete<T>(&self, object: T) -> PreparedDeleteObject<T> {
        PreparedDeleteObject::new(self.clone(), object)
    }

    /// Prepare a delete of a collection. Uses a transaction by default.
    pub fn delete_all<T>(&self, objects: Vec<T>) -> PreparedDeleteCollection<T> {
        PreparedDeleteCollection::new(self.clone(), objects)
    }

    /// Prepare a delete driven directly by a [`DeleteQuery`].
    pub fn delete_by_query(&self, query: DeleteQuery) -> PreparedDeleteByQuery {
        PreparedDeleteByQuery::new(self.clone(), query)
    }

    /// Prepare a free-form write statement with explicit affected sets.
    pub fn execute_raw(&self, query: RawQuery) -> PreparedExecuteRaw {
        PreparedExecuteRaw::new(self.clone(), query)
    }
}

// ============================================================================
// LowLevel
// ============================================================================

/// Physical reads/writes, transaction control, and notification publishing.
///
/// Resolvers call back into this API; direct calls never trigger
/// notifications on their own — prepared operations decide what to publish.
pub struct LowLevel<'a> {
    inner: &'a StoreInner,
}

impl LowLevel<'_> {
    pub fn query(&self, query: &Query) -> Result<Box<dyn ResultSet>> {
        query.validate()?;
        self.inner.backend.query(query)
    }

    pub fn raw_query(&self, query: &RawQuery) -> Result<Box<dyn ResultSet>> {
        query.validate()?;
        self.inner.backend.raw_query(query)
    }

    pub fn execute_raw(&self, query: &RawQuery) -> Result<()> {
        query.validate()?;
        self.inner.backend.execute_raw(query)
    }

    pub fn insert(&self, query: &InsertQuery, row: &Row) -> Result<i64> {
        query.validate()?;
        self.inner.backend.insert(query, row)
    }

    pub fn update(&self, query: &UpdateQuery, row: &Row) -> Result<u64> {
        query.validate()?;
        self.inner.backend.update(query, row)
    }

    pub fn delete(&self, query: &DeleteQuery) -> Result<u64> {
        query.validate()?;
        self.inner.backend.delete(query)
    }

    /// Publish `changes` to subscribers.
    ///
    /// While any transaction is running the changes are held back and
    /// flushed as a single union once the last frame ends; one coalesced
    /// notification per quiet point, never before the commit decision.
    pub fn notify_about_changes(&self, changes: Changes) {
        if self.inner.running_transactions.load(Ordering::SeqCst) == 0 {
            debug!(?changes, "publishing changes");
            self.inner.bus.publish(&changes);
        } else {
            self.inner.pending_changes.lock().push(changes);
            self.flush_pending_if_idle();
        }
    }

    fn flush_pending_if_idle(&self) {
        if self.inner.running_transactions.load(Ordering::SeqCst) != 0 {
            return;
        }
        let drained: Vec<Changes> = std::mem::take(&mut *self.inner.pending_changes.lock());
        if drained.is_empty() {
            return;
        }
        let mut union = Changes::default();
        for changes in &drained {
            union.merge(changes);
        }
        if !union.is_empty() {
            debug!(changes = ?union, "publishing coalesced changes");
            self.inner.bus.publish(&union);
        }
    }

    /// Open a transaction frame.
    pub fn begin_transaction(&self) -> Result<()> {
        self.inner.backend.begin_transaction()?;
        self.inner.transaction_frames.lock().push(false);
        self.inner.running_transactions.fetch_add(1, Ordering::SeqCst);
        debug!("transaction begun");
        Ok(())
    }

    /// Mark the innermost frame successful. Call only after every item in
    /// the batch succeeded.
    pub fn set_transaction_successful(&self) -> Result<()> {
        let mut frames = self.inner.transaction_frames.lock();
        match frames.last_mut() {
            Some(successful) => {
                *successful = true;
                Ok(())
            }
            None => Err(crate::error::RippleDbError::Internal(
                "set_transaction_successful called outside a transaction".to_string(),
            )),
        }
    }

    /// Close the innermost frame: commit when it was marked successful,
    /// roll back otherwise. Must be called on every exit path after
    /// `begin_transaction`.
    pub fn end_transaction(&self) -> Result<()> {
        let successful = self.inner.transaction_frames.lock().pop().ok_or_else(|| {
            crate::error::RippleDbError::Internal(
                "end_transaction called outside a transaction".to_string(),
            )
        })?;
        let result = if successful {
            self.inner.backend.commit_transaction()
        } else {
            self.inner.backend.rollback_transaction()
        };
        self.inner.running_transactions.fetch_sub(1, Ordering::SeqCst);
        debug!(committed = successful, "transaction ended");
        self.flush_pending_if_idle();
        result
    }
}

// ============================================================================
// StoreBuilder
// ============================================================================

/// Builds a [`Store`]. `backend` is required; everything else has defaults.
pub struct StoreBuilder {
    backend: Option<Box<dyn StorageBackend>>,
    registry: TypeRegistry,
    interceptors: Vec<Arc<dyn Interceptor>>,
    scheduler: Arc<dyn Scheduler>,
}

impl StoreBuilder {
    fn new() -> Self {
        Self {
            backend: None,
            registry: TypeRegistry::new(),
            interceptors: Vec::new(),
            scheduler: Arc::new(ThreadScheduler),
        }
    }

    /// Required: the physical storage backend.
    pub fn backend(mut self, backend: impl StorageBackend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Register the resolver triple for a domain type. Registration is only
    /// possible here; the registry is read-only once the store is built.
    pub fn register<T: 'static>(mut self, mapping: TypeMapping<T>) -> Self {
        self.registry.register(mapping);
        self
    }

    /// Add an interceptor. Interceptors run in the order they were added.
    pub fn add_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Scheduler for deferred and stream execution. Default: one spawned
    /// thread per task.
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }

    /// Validating finalize step.
    pub fn build(self) -> Result<Store, ValidationError> {
        let backend = self.backend.ok_or_else(|| {
            ValidationError::new("backend", "a storage backend is required to build a store")
        })?;
        Ok(Store {
            inner: Arc::new(StoreInner {
                backend,
                registry: self.registry,
                bus: ChangeBus::new(),
                interceptors: self.interceptors,
                scheduler: self.scheduler,
                running_transactions: AtomicUsize::new(0),
                transaction_frames: Mutex::new(Vec::new()),
                pending_changes: Mutex::new(Vec::new()),
            }),
        })
    }
}
