//! Request queue shared by callers and a single worker
//!
//! Normal calls go to the back; rejection notices, halts and retried calls go
//! to the front so the worker corrects its quota model before any further
//! network traffic. A single mutex guards the deque and the "last call" slot,
//! and a [`Notify`] wakes the worker when work arrives.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tracing::debug;

use super::rate_limit::Rejection;

/// Item handed to the worker by [`RequestQueue::dequeue`]
#[derive(Debug, Clone, PartialEq)]
pub enum Action<C> {
    /// Ordinary service call
    Call(C),
    /// Quota replacement and cooldown from the server
    Rejection(Rejection),
    /// Unrecoverable condition reported by the service manager
    Halt(String),
    /// Stop after finishing everything enqueued before it
    Shutdown,
}

/// Channel back into a worker's queue for its service manager
///
/// Managers only see this narrow view of the queue, which keeps them
/// independent of the caller's call and context types.
pub trait RejectionSink: Send + Sync {
    /// Push a rejection to the front of the queue
    fn enqueue_rejection(&self, rejection: Rejection);

    /// Ask the worker to stop before dispatching anything else
    fn halt(&self, reason: String);
}

#[derive(Debug)]
struct QueueState<C> {
    pending: VecDeque<Action<C>>,
    last_call: Option<C>,
}

/// Thread-safe FIFO with priority insertion at the front
#[derive(Debug)]
pub struct RequestQueue<C> {
    state: Mutex<QueueState<C>>,
    available: Notify,
}

impl<C> Default for RequestQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> RequestQueue<C> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                last_call: None,
            }),
            available: Notify::new(),
        }
    }

    /// Append calls to the back, in order
    pub fn enqueue<I>(&self, calls: I)
    where
        I: IntoIterator<Item = C>,
    {
        let added = {
            let mut state = self.state.lock();
            let before = state.pending.len();
            state.pending.extend(calls.into_iter().map(Action::Call));
            state.pending.len() - before
        };
        if added > 0 {
            debug!(added, "Calls enqueued");
            self.available.notify_one();
        }
    }

    /// Push the shutdown sentinel to the back so pending work finishes first
    pub fn enqueue_shutdown(&self) {
        self.push_back(Action::Shutdown);
    }

    /// Number of items waiting, including signals
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    fn push_back(&self, action: Action<C>) {
        self.state.lock().pending.push_back(action);
        self.available.notify_one();
    }

    fn push_front(&self, action: Action<C>) {
        self.state.lock().pending.push_front(action);
        self.available.notify_one();
    }

    /// Forget the last call so it cannot be requeued
    pub fn take_last_call(&self) -> Option<C> {
        self.state.lock().last_call.take()
    }
}

impl<C: Clone> RequestQueue<C> {
    /// Re-insert the most recently dequeued call at the front.
    ///
    /// Returns `false` when no call has been dequeued yet.
    pub fn requeue_last_call(&self) -> bool {
        let requeued = {
            let mut state = self.state.lock();
            match state.last_call.clone() {
                Some(call) => {
                    state.pending.push_front(Action::Call(call));
                    true
                }
                None => false,
            }
        };
        if requeued {
            self.available.notify_one();
        }
        requeued
    }

    /// Pop the front item, waiting while the queue is empty.
    ///
    /// A popped call is remembered as the last call for
    /// [`RequestQueue::requeue_last_call`].
    pub async fn dequeue(&self) -> Action<C> {
        loop {
            if let Some(action) = self.try_dequeue() {
                return action;
            }
            self.available.notified().await;
        }
    }

    /// Pop the front item without waiting
    pub fn try_dequeue(&self) -> Option<Action<C>> {
        let mut state = self.state.lock();
        let action = state.pending.pop_front()?;
        if let Action::Call(call) = &action {
            state.last_call = Some(call.clone());
        }
        Some(action)
    }
}

impl<C: Send> RejectionSink for RequestQueue<C> {
    fn enqueue_rejection(&self, rejection: Rejection) {
        debug!(
            rules = rejection.rate_limits.len(),
            retry_after_secs = rejection.retry_after.as_secs(),
            "Rejection pushed to front of queue"
        );
        self.push_front(Action::Rejection(rejection));
    }

    fn halt(&self, reason: String) {
        self.push_front(Action::Halt(reason));
    }
}
