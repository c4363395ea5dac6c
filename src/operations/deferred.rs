//! One-shot deferred execution handles.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::client::Store;
use crate::error::Result;

struct DeferredShared<T> {
    slot: Mutex<Option<Result<T>>>,
    ready: Condvar,
}

/// Handle to an operation scheduled on the store's scheduler. The blocking
/// path runs exactly once; `wait` joins it.
pub struct Deferred<T> {
    shared: Arc<DeferredShared<T>>,
}

impl<T: Send + 'static> Deferred<T> {
    pub(crate) fn spawn(store: &Store, task: impl FnOnce() -> Result<T> + Send + 'static) -> Self {
        let shared = Arc::new(DeferredShared {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        });
        let task_shared = Arc::clone(&shared);
        store.scheduler().schedule(Box::new(move || {
            let result = task();
            *task_shared.slot.lock() = Some(result);
            task_shared.ready.notify_all();
        }));
        Deferred { shared }
    }
}

impl<T> Deferred<T> {
    /// Block until the operation finishes and take its result.
    pub fn wait(self) -> Result<T> {
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(result) = slot.take() {
                return result;
            }
            self.shared.ready.wait(&mut slot);
        }
    }

    /// The result if the operation already finished.
    pub fn try_take(&self) -> Option<Result<T>> {
        self.shared.slot.lock().take()
    }
}
