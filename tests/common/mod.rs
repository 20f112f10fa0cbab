//! Shared test helpers: a scripted service manager and a local HTTP server

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use stash_fetcher::service::{
    RejectionSink, Rejection, ServiceError, ServiceManager, ServiceReply,
};
use tokio::time::Instant;

/// Start `router` on an ephemeral port and return its base URL
pub async fn serve(router: Router) -> String {
    serve_with(|_| router).await
}

/// Start the router built by `build`, which receives the server's own base URL
pub async fn serve_with<F>(build: F) -> String
where
    F: FnOnce(&str) -> Router,
{
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let router = build(&base);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    base
}

/// What the scripted manager does for one execution of an operation
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Succeed, echoing the operation id
    Ok,
    /// Report a rejection and return `RateLimited`
    Reject(Rejection),
    /// Return an HTTP 500 error
    Fail,
    /// Report unreadable quota headers and halt
    Malformed,
}

/// Service manager whose outcomes are scripted per operation id
///
/// Operations without a script (or with an exhausted one) succeed.
#[derive(Clone, Default)]
pub struct ScriptedManager {
    script: Arc<Mutex<HashMap<u32, VecDeque<Outcome>>>>,
    log: Arc<Mutex<Vec<(u32, Instant)>>>,
}

impl ScriptedManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for the next executions of `operation`
    pub fn script(&self, operation: u32, outcomes: impl IntoIterator<Item = Outcome>) {
        self.script
            .lock()
            .entry(operation)
            .or_default()
            .extend(outcomes);
    }

    /// Operations in execution order
    pub fn executed(&self) -> Vec<u32> {
        self.log.lock().iter().map(|(op, _)| *op).collect()
    }

    /// Execution times in order
    pub fn times(&self) -> Vec<Instant> {
        self.log.lock().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl ServiceManager for ScriptedManager {
    type Operation = u32;
    type Payload = u32;

    async fn execute(&self, operation: &u32, rejections: &dyn RejectionSink) -> ServiceReply<u32> {
        self.log.lock().push((*operation, Instant::now()));
        let outcome = self
            .script
            .lock()
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Outcome::Ok);

        match outcome {
            Outcome::Ok => Ok(*operation),
            Outcome::Reject(rejection) => {
                let retry_after = rejection.retry_after;
                rejections.enqueue_rejection(rejection);
                Err(ServiceError::RateLimited {
                    operation: operation.to_string(),
                    retry_after,
                })
            }
            Outcome::Fail => Err(ServiceError::Http {
                status: 500,
                reason: "Internal Server Error".into(),
                operation: operation.to_string(),
            }),
            Outcome::Malformed => {
                rejections.halt("missing X-Rate-Limit-Rules header".into());
                Err(ServiceError::MalformedRateLimit(
                    "missing X-Rate-Limit-Rules header".into(),
                ))
            }
        }
    }
}

/// Milliseconds between two instants
pub fn millis_between(earlier: Instant, later: Instant) -> u128 {
    later.duration_since(earlier).as_millis()
}

/// Shorthand for a rejection
pub fn rejection(rules: &[(u32, u64)], retry_after_secs: u64) -> Rejection {
    Rejection::new(
        rules
            .iter()
            .map(|(hits, secs)| stash_fetcher::RateLimit::from_secs(*hits, *secs))
            .collect(),
        Duration::from_secs(retry_after_secs),
    )
}
