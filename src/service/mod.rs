//! Request services: queued, rate-limited execution of network calls
//!
//! Every outbound call to the web API or the image host goes through a
//! [`Service`]: callers enqueue [`Call`]s, a single background worker drains
//! them in order, paces them with a [`RateLimiter`], and sends each
//! [`Completed`] result back over a channel owned by the caller.
//!
//! # Flow
//!
//! 1. **Enqueue**: callers push calls onto the service's [`RequestQueue`]
//! 2. **Wait for quota**: the worker sleeps until every quota window has room
//! 3. **Execute**: the [`ServiceManager`] performs the network operation
//! 4. **Deliver**: the result goes out on the result channel
//!
//! On HTTP 429 the manager pushes a [`Rejection`] to the front of the queue.
//! The worker then adopts the server's replacement quota, requeues the call
//! that was rejected, and sleeps for the mandated cooldown before touching
//! the network again.
//!
//! # Components
//!
//! - [`rate_limit`] - Sliding-window quota tracking
//! - [`queue`] - Priority-capable request queue
//! - [`worker`] - Consumer loop
//! - [`call`] - Calls and completed results
//! - [`config`] - Constants and worker settings

pub mod call;
pub mod config;
pub mod queue;
pub mod rate_limit;
pub mod worker;

pub use call::{Call, Completed, ServiceReply};
pub use config::WorkerConfig;
pub use queue::{Action, RejectionSink, RequestQueue};
pub use rate_limit::{RateLimit, RateLimiter, RateWindow, Rejection};
pub use worker::{Worker, WorkerExit};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Service errors delivered in the reply slot of a completed call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Server refused the call for quota reasons; it is already queued for retry
    #[error("rate limited during {operation}, retrying after {}s", .retry_after.as_secs())]
    RateLimited {
        /// Operation that was refused
        operation: String,
        /// Cooldown announced by the server
        retry_after: Duration,
    },

    /// Non-success HTTP status
    #[error("HTTP error {status} {reason} during {operation}")]
    Http {
        /// Status code
        status: u16,
        /// Canonical reason phrase
        reason: String,
        /// Operation that failed
        operation: String,
    },

    /// Connection, DNS or timeout failure
    #[error("URL error {reason} during {operation}")]
    Network {
        /// Transport error description
        reason: String,
        /// Operation that failed
        operation: String,
    },

    /// Response body could not be decoded
    #[error("parse error: {0}")]
    Parse(String),

    /// Local file system failure
    #[error("IO error: {0}")]
    Io(String),

    /// Rate-limit headers of a 429 response could not be understood
    #[error("malformed rate limit headers: {0}")]
    MalformedRateLimit(String),

    /// Call dropped after too many consecutive rejections
    #[error("gave up on {operation} after {rejections} rate limit rejections")]
    RetriesExhausted {
        /// Operation that was dropped
        operation: String,
        /// Rejections received in a row
        rejections: u32,
    },

    /// Server refused the call and the service stops instead of retrying
    #[error("{operation} refused by a rate limit the service cannot follow")]
    Aborted {
        /// Operation that was refused
        operation: String,
    },

    /// Worker task panicked
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),
}

impl ServiceError {
    /// Whether the failed call has been queued again and will be redelivered
    pub fn is_retrying(&self) -> bool {
        matches!(self, ServiceError::RateLimited { .. })
    }
}

/// Performs the concrete network operations of one service
///
/// Implementations catch every transport failure and return it as data. On
/// HTTP 429 they report the server's replacement quota through `rejections`
/// and return [`ServiceError::RateLimited`]. A manager whose service runs
/// without a limiter pushes a rule-less rejection instead and returns
/// [`ServiceError::Aborted`], since the worker stops rather than retrying.
#[async_trait]
pub trait ServiceManager: Send + Sync + 'static {
    /// Operations this manager understands
    type Operation: Clone + fmt::Debug + Send + Sync + 'static;

    /// Successful result of an operation
    type Payload: Send + 'static;

    /// Execute one operation
    async fn execute(
        &self,
        operation: &Self::Operation,
        rejections: &dyn RejectionSink,
    ) -> ServiceReply<Self::Payload>;
}

/// Receiver half of a service's result channel
pub type ResultReceiver<M, Ctx> = mpsc::UnboundedReceiver<
    Completed<<M as ServiceManager>::Operation, Ctx, <M as ServiceManager>::Payload>,
>;

/// Handle to a running service: its queue plus its worker task
pub struct Service<M: ServiceManager, Ctx> {
    name: String,
    queue: Arc<RequestQueue<Call<M::Operation, Ctx>>>,
    worker: JoinHandle<WorkerExit>,
}

impl<M, Ctx> Service<M, Ctx>
where
    M: ServiceManager,
    Ctx: Clone + Send + 'static,
{
    /// Start a worker for `manager` and return the handle with its result channel.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        name: impl Into<String>,
        manager: M,
        rate_limiter: Option<RateLimiter>,
        config: WorkerConfig,
    ) -> (Self, ResultReceiver<M, Ctx>) {
        let name = name.into();
        let queue = Arc::new(RequestQueue::new());
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let worker = Worker::new(
            name.clone(),
            queue.clone(),
            manager,
            rate_limiter,
            results_tx,
            config,
        );
        let worker = tokio::spawn(worker.run());

        (
            Self {
                name,
                queue,
                worker,
            },
            results_rx,
        )
    }

    /// Service name used in logs and metrics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue calls at the back of the queue
    pub fn enqueue<I>(&self, calls: I)
    where
        I: IntoIterator<Item = Call<M::Operation, Ctx>>,
    {
        self.queue.enqueue(calls);
    }

    /// Enqueue a single call
    pub fn call(&self, operation: M::Operation, context: Ctx) {
        self.queue.enqueue([Call::new(operation, context)]);
    }

    /// Shared request queue of this service
    pub fn queue(&self) -> &Arc<RequestQueue<Call<M::Operation, Ctx>>> {
        &self.queue
    }

    /// Whether the worker is still consuming
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Stop the worker immediately, dropping whatever is still queued
    pub fn abort(self) {
        self.worker.abort();
    }

    /// Ask the worker to stop once everything enqueued so far has been served
    pub fn request_shutdown(&self) {
        self.queue.enqueue_shutdown();
    }

    /// Wait for the worker to exit
    pub async fn join(self) -> Result<WorkerExit, ServiceError> {
        self.worker
            .await
            .map_err(|e| ServiceError::WorkerPanicked(e.to_string()))
    }

    /// Stop the worker once everything enqueued so far has been served.
    ///
    /// Returns only after the worker has exited.
    pub async fn shutdown(self) -> Result<WorkerExit, ServiceError> {
        self.request_shutdown();
        self.join().await
    }
}
