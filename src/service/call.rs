//! Units of deferred work and their completed results

use super::ServiceError;

/// A queued request for a service operation plus the caller's context
///
/// `operation` says what the service manager should do; `context` is handed
/// back untouched with the result so the caller can route it to the right
/// handler. Both are immutable once the call is enqueued.
#[derive(Debug, Clone, PartialEq)]
pub struct Call<Op, Ctx> {
    /// Operation to execute
    pub operation: Op,
    /// Caller data returned alongside the result
    pub context: Ctx,
}

impl<Op, Ctx> Call<Op, Ctx> {
    /// Create a call carrying a caller context
    pub fn new(operation: Op, context: Ctx) -> Self {
        Self { operation, context }
    }
}

impl<Op> Call<Op, ()> {
    /// Create a call whose result nobody needs to route
    pub fn detached(operation: Op) -> Self {
        Self::new(operation, ())
    }
}

/// Reply slot of a completed call: payload on success, error otherwise
pub type ServiceReply<T> = Result<T, ServiceError>;

/// Result produced by a worker for one dequeued call
#[derive(Debug)]
pub struct Completed<Op, Ctx, T> {
    /// Operation that was executed
    pub operation: Op,
    /// Context the caller attached to the call
    pub context: Ctx,
    /// Outcome of the operation
    pub reply: ServiceReply<T>,
}

impl<Op, Ctx, T> Completed<Op, Ctx, T> {
    /// Whether the call will be delivered again after a rate-limit cooldown
    pub fn will_retry(&self) -> bool {
        matches!(&self.reply, Err(err) if err.is_retrying())
    }
}
