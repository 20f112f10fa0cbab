//! # Stash Fetcher Library
//!
//! Rate-limited access to the game's account web API and image host, with a
//! local cache of stash tabs, characters and item icons.
//!
//! ## Features
//!
//! - **Queued Services**: every network call goes through a single-worker
//!   service with a FIFO queue and priority slots for control messages
//! - **Sliding-Window Rate Limiting**: calls are paced against several
//!   `hits per period` windows at once
//! - **Server-Driven Quotas**: on HTTP 429 the worker adopts the quota the
//!   server announces, retries the rejected call and serves the cooldown
//! - **Caching**: tabs, characters and images are fetched once and written
//!   atomically
//!
//! ## Quick Start
//!
//! ```no_run
//! use stash_fetcher::api::{api_rate_limiter, ApiEndpoints, ApiManager, ApiOperation};
//! use stash_fetcher::service::{Service, WorkerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ApiManager::with_user_agent("my-tool/1.0", ApiEndpoints::default())?;
//! let (service, mut results) = Service::spawn(
//!     "api",
//!     manager,
//!     Some(api_rate_limiter()),
//!     WorkerConfig::default(),
//! );
//!
//! service.call(ApiOperation::Leagues, ());
//! if let Some(completed) = results.recv().await {
//!     println!("{:?}", completed.reply);
//! }
//! service.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`service`] - Rate limiter, request queue, worker and service handle
//! - [`api`] - Web API service manager and HTTP helpers
//! - [`download`] - Image download service manager
//! - [`cache`] - File-backed cache and saved state
//! - [`cli`] - Command line front end
//! - [`metrics`] - Prometheus metrics

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Web API access
pub mod api;

/// Cached documents and saved state
pub mod cache;

/// CLI command implementations
pub mod cli;

/// Image downloads
pub mod download;

/// Observability metrics
pub mod metrics;

/// Queued, rate-limited request services
pub mod service;

pub use service::{
    Call, Completed, RateLimit, RateLimiter, Rejection, RequestQueue, Service, ServiceError,
    ServiceManager, WorkerExit,
};
