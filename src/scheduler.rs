//! Work schedulers for deferred and live-stream execution.
//!
//! Blocking entry points always run on the caller's thread; deferred and
//! stream entry points hand their blocking path to the store's scheduler.

/// Strategy deciding where scheduled work runs.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

/// Runs each task on a freshly spawned thread. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        std::thread::spawn(task);
    }
}

/// Runs each task inline on the calling thread. Deterministic, which makes
/// it the right choice in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        task();
    }
}
