//! Single consumer loop for one service
//!
//! Each iteration waits for quota, dequeues one item, and either executes a
//! call, applies a rejection, or stops. The worker is the only owner of its
//! [`RateLimiter`], so quota updates and timestamps never race.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::call::{Call, Completed};
use super::config::{WorkerConfig, COOL_OFF_LOG_THRESHOLD};
use super::queue::{Action, RequestQueue};
use super::rate_limit::{RateLimiter, Rejection};
use super::{ServiceError, ServiceManager};
use crate::metrics;

/// Why a worker loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Shutdown sentinel reached
    Shutdown,
    /// A rejection arrived on a channel without a rate limiter
    UnlimitedRejection,
    /// The service manager reported an unrecoverable condition
    Halted(String),
}

/// Sender half of a service's result channel
pub type ResultSender<M, Ctx> = mpsc::UnboundedSender<
    Completed<<M as ServiceManager>::Operation, Ctx, <M as ServiceManager>::Payload>,
>;

/// Consumer of one service's request queue
pub struct Worker<M: ServiceManager, Ctx> {
    name: String,
    queue: Arc<RequestQueue<Call<M::Operation, Ctx>>>,
    manager: M,
    rate_limiter: Option<RateLimiter>,
    results: ResultSender<M, Ctx>,
    config: WorkerConfig,
    rejection_streak: u32,
}

impl<M, Ctx> Worker<M, Ctx>
where
    M: ServiceManager,
    Ctx: Clone + Send + 'static,
{
    /// Create a worker bound to a queue, a manager and a result channel
    pub fn new(
        name: impl Into<String>,
        queue: Arc<RequestQueue<Call<M::Operation, Ctx>>>,
        manager: M,
        rate_limiter: Option<RateLimiter>,
        results: ResultSender<M, Ctx>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            manager,
            rate_limiter,
            results,
            config,
            rejection_streak: 0,
        }
    }

    /// Run until a shutdown sentinel or a fatal condition
    pub async fn run(mut self) -> WorkerExit {
        info!(service = %self.name, limited = self.rate_limiter.is_some(), "Worker started");
        let exit = loop {
            self.wait_for_quota().await;

            match self.queue.dequeue().await {
                Action::Shutdown => break WorkerExit::Shutdown,
                Action::Halt(reason) => {
                    error!(service = %self.name, %reason, "Service halted");
                    break WorkerExit::Halted(reason);
                }
                Action::Rejection(rejection) => {
                    if self.rate_limiter.is_none() {
                        error!(service = %self.name, "Service received too many requests, exiting");
                        break WorkerExit::UnlimitedRejection;
                    }
                    self.apply_rejection(rejection).await;
                }
                Action::Call(call) => self.dispatch(call).await,
            }
        };
        info!(service = %self.name, ?exit, "Worker finished");
        exit
    }

    /// Sleep until every quota window has room for another call
    async fn wait_for_quota(&mut self) {
        let Some(limiter) = self.rate_limiter.as_mut() else {
            return;
        };
        while let Some(wait) = limiter.time_until_ready() {
            if wait.is_zero() {
                break;
            }
            if wait > COOL_OFF_LOG_THRESHOLD {
                info!(service = %self.name, wait_secs = wait.as_secs_f64(), "Cooling off calls");
            } else {
                debug!(
                    service = %self.name,
                    wait_ms = wait.as_millis() as u64,
                    "Waiting for quota"
                );
            }
            metrics::record_quota_wait(&self.name, wait);
            tokio::time::sleep(wait).await;
        }
    }

    async fn dispatch(&mut self, call: Call<M::Operation, Ctx>) {
        if let Some(limiter) = self.rate_limiter.as_mut() {
            limiter.record_call();
        }
        debug!(service = %self.name, operation = ?call.operation, "Dispatching call");
        metrics::record_dispatch(&self.name);

        let reply = self
            .manager
            .execute(&call.operation, self.queue.as_ref())
            .await;

        if !matches!(&reply, Err(err) if err.is_retrying()) {
            self.rejection_streak = 0;
        }

        self.deliver(Completed {
            operation: call.operation,
            context: call.context,
            reply,
        });
    }

    /// Adopt the server's quota, retry the rejected call, and serve the cooldown.
    ///
    /// Nothing else is dequeued until the cooldown has elapsed.
    async fn apply_rejection(&mut self, rejection: Rejection) {
        if let Some(limiter) = self.rate_limiter.as_mut() {
            limiter.update_rate_limits(&rejection.rate_limits);
        }
        self.rejection_streak += 1;

        if self.config.allows_retry(self.rejection_streak) {
            self.queue.requeue_last_call();
        } else if let Some(call) = self.queue.take_last_call() {
            warn!(
                service = %self.name,
                operation = ?call.operation,
                rejections = self.rejection_streak,
                "Giving up on call after repeated rejections"
            );
            let error = ServiceError::RetriesExhausted {
                operation: format!("{:?}", call.operation),
                rejections: self.rejection_streak,
            };
            self.rejection_streak = 0;
            self.deliver(Completed {
                operation: call.operation,
                context: call.context,
                reply: Err(error),
            });
        }

        self.cooldown(rejection.retry_after).await;
    }

    async fn cooldown(&self, retry_after: Duration) {
        warn!(
            service = %self.name,
            retry_after_secs = retry_after.as_secs_f64(),
            "Hit rate limit, sleeping"
        );
        metrics::record_rejection(&self.name, retry_after);
        tokio::time::sleep(retry_after).await;
    }

    fn deliver(&self, completed: Completed<M::Operation, Ctx, M::Payload>) {
        if self.results.send(completed).is_err() {
            debug!(service = %self.name, "Result receiver dropped, discarding result");
        }
    }
}
