//! Live query streams — one-shot reads turned into self-refreshing result
//! streams.
//!
//! Protocol: the cold-start task (scheduled on the store's scheduler)
//! executes the operation once and emits immediately; it then registers
//! with the change bus filtered by the operation's observed set. Every
//! matching publication re-executes the identical operation on the
//! publishing thread and emits the new result unconditionally — no
//! equality/dedup filtering. A failed execution (initial or re-triggered)
//! emits the wrapped error as the terminal item and tears the subscription
//! down.
//!
//! # Threading model
//!
//! The mailbox between producer and consumer is a `parking_lot` mutex +
//! condvar pair. The bus subscription handle lives behind its own mutex so
//! that cancellation from the consumer side and teardown from the error
//! path can race safely; `cancel` is idempotent. A re-execution that is
//! already in flight at the exact moment of cancellation may or may not
//! deliver its value (best effort); nothing is delivered afterwards.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::changes::ChangeFilter;
use crate::client::Store;
use crate::error::Result;

use super::bus::BusSubscription;

// ============================================================================
// OverflowPolicy
// ============================================================================

/// What happens to emissions the consumer has not received yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Queue every emission until the consumer receives it.
    Buffer,
    /// Keep only the newest unreceived emission, dropping intermediates.
    Latest,
}

// ============================================================================
// Mailbox
// ============================================================================

struct MailboxState<T> {
    queue: VecDeque<Result<T>>,
    closed: bool,
}

struct Mailbox<T> {
    state: Mutex<MailboxState<T>>,
    available: Condvar,
    policy: OverflowPolicy,
}

impl<T> Mailbox<T> {
    fn new(policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            policy,
        }
    }

    /// Emit one item. An `Err` item is terminal: it closes the mailbox.
    fn push(&self, item: Result<T>) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        let terminal = item.is_err();
        if self.policy == OverflowPolicy::Latest {
            state.queue.clear();
        }
        state.queue.push_back(item);
        if terminal {
            state.closed = true;
        }
        drop(state);
        self.available.notify_all();
    }

    /// Close, keeping queued items for the consumer to drain.
    fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    /// Close and drop anything queued (consumer walked away).
    fn close_and_discard(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.queue.clear();
        drop(state);
        self.available.notify_all();
    }

    /// Block until an item is available or the mailbox is closed and drained.
    fn recv(&self) -> Option<Result<T>> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    fn try_recv(&self) -> Option<Result<T>> {
        self.state.lock().queue.pop_front()
    }
}

// ============================================================================
// LiveStream
// ============================================================================

struct LiveState {
    cancelled: AtomicBool,
    subscription: Mutex<Option<BusSubscription>>,
}

impl LiveState {
    fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            subscription: Mutex::new(None),
        }
    }

    /// Stop re-execution and cancel the bus subscription if one is stored.
    /// Idempotent; also cleans up a subscription stored after a cancel.
    fn teardown(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.cancel();
        }
    }
}

/// A continuously-refreshing result stream. See the module docs for the
/// protocol.
///
/// Consume with [`recv`](LiveStream::recv) / [`try_recv`](LiveStream::try_recv)
/// or as an iterator of `Result` items. Dropping the stream cancels it.
pub struct LiveStream<T> {
    mailbox: Arc<Mailbox<T>>,
    state: Arc<LiveState>,
}

impl<T: Send + 'static> LiveStream<T> {
    /// Start a live stream executing `execute` per the protocol.
    ///
    /// `filter: None` means the operation has no observed set: the stream
    /// emits its cold-start value and completes (auto-refresh disabled).
    pub(crate) fn launch(
        store: &Store,
        filter: Option<ChangeFilter>,
        policy: OverflowPolicy,
        execute: impl Fn() -> Result<T> + Send + Sync + 'static,
    ) -> Self {
        let mailbox = Arc::new(Mailbox::new(policy));
        let state = Arc::new(LiveState::new());
        let stream = LiveStream {
            mailbox: Arc::clone(&mailbox),
            state: Arc::clone(&state),
        };

        let task_store = store.clone();
        let execute = Arc::new(execute);

        store.scheduler().schedule(Box::new(move || {
            if state.cancelled.load(Ordering::SeqCst) {
                return;
            }

            // Cold start: execute once, emit immediately.
            match execute() {
                Ok(value) => mailbox.push(Ok(value)),
                Err(error) => {
                    mailbox.push(Err(error));
                    return;
                }
            }

            let Some(filter) = filter else {
                mailbox.close();
                return;
            };

            // Register for re-execution on every matching publication.
            let sink_mailbox = Arc::clone(&mailbox);
            let sink_state = Arc::clone(&state);
            let sink_execute = Arc::clone(&execute);
            let subscription = task_store.change_bus().subscribe(filter, move |_changes| {
                if sink_state.cancelled.load(Ordering::SeqCst) {
                    return;
                }
                match sink_execute() {
                    Ok(value) => sink_mailbox.push(Ok(value)),
                    Err(error) => {
                        sink_mailbox.push(Err(error));
                        sink_state.teardown();
                    }
                }
            });

            *state.subscription.lock() = Some(subscription);
            // The consumer may have cancelled while we were registering.
            if state.cancelled.load(Ordering::SeqCst) {
                state.teardown();
            }
        }));

        stream
    }
}

impl<T> LiveStream<T> {
    /// Block until the next emission. `None` when the stream has completed,
    /// errored out, or been cancelled and drained.
    pub fn recv(&self) -> Option<Result<T>> {
        self.mailbox.recv()
    }

    /// Next queued emission without blocking.
    pub fn try_recv(&self) -> Option<Result<T>> {
        self.mailbox.try_recv()
    }

    /// Stop the stream: no further re-execution, bus subscription torn
    /// down, queued-but-unreceived emissions discarded. Idempotent.
    pub fn cancel(&self) {
        self.state.teardown();
        self.mailbox.close_and_discard();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }
}

impl<T> Iterator for LiveStream<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl<T> Drop for LiveStream<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}
