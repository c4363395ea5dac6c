//! ChangeBus — a concurrency-guarded publish/subscribe structure.
//!
//! Subscribers are (filter, sink) pairs in a `parking_lot::Mutex`-guarded
//! list. `publish` snapshots the matching sinks under the lock and invokes
//! them after releasing it, so sinks may safely re-enter the bus (subscribe
//! or cancel) without deadlocking. Consequences of the snapshot:
//!   - a subscriber cancelled *during* a publish may still receive that
//!     in-flight event (best effort, see `BusSubscription::cancel`);
//!   - a subscriber added during a publish is not called until the next one.
//!
//! There is no buffering: subscribers that join after a publish never see
//! it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::changes::{ChangeFilter, Changes};

/// Closure type for subscriber sinks.
pub type ChangeSink = dyn Fn(&Changes) + Send + Sync;

struct Subscriber {
    id: u64,
    filter: ChangeFilter,
    sink: Arc<ChangeSink>,
}

/// Publish/subscribe fabric keyed by affected table/tag sets.
pub struct ChangeBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `sink` for publications matching `filter`.
    ///
    /// The sink runs synchronously on the publishing thread. The returned
    /// handle cancels the subscription; cancellation is idempotent.
    pub fn subscribe(
        &self,
        filter: ChangeFilter,
        sink: impl Fn(&Changes) + Send + Sync + 'static,
    ) -> BusSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push(Subscriber {
            id,
            filter,
            sink: Arc::new(sink),
        });
        trace!(id, "change bus subscriber added");
        BusSubscription {
            id,
            subscribers: Arc::clone(&self.subscribers),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Fan `changes` out to every subscriber whose filter matches, at the
    /// moment of publish.
    pub fn publish(&self, changes: &Changes) {
        // Snapshot matching sinks under the lock (cheap: ref-count bumps).
        let matching: Vec<Arc<ChangeSink>> = {
            let guard = self.subscribers.lock();
            guard
                .iter()
                .filter(|s| s.filter.matches(changes))
                .map(|s| Arc::clone(&s.sink))
                .collect()
        };
        // Lock is released — sinks can safely subscribe or cancel.
        for sink in matching {
            sink(changes);
        }
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation handle for one bus subscription.
///
/// `cancel` is idempotent and safe to call from any thread. A publish that
/// already snapshotted this subscriber's sink may still deliver one
/// in-flight event after `cancel` returns; no later event is delivered.
/// Dropping the handle without cancelling leaves the subscription active.
pub struct BusSubscription {
    id: u64,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    cancelled: AtomicBool,
}

impl BusSubscription {
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.subscribers.lock().retain(|s| s.id != self.id);
        trace!(id = self.id, "change bus subscriber removed");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
