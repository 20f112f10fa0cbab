//! HTTP plumbing shared by the API and download managers
//!
//! Provides:
//! - Client construction with explicit timeouts and a User-Agent
//! - Response classification (success, 429, other HTTP errors, transport errors)
//! - Parsing of the rate-limit headers that accompany a 429 response

use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::metrics::HttpRequestMetrics;
use crate::service::config::{DEFAULT_RETRY_AFTER, HTTP_CONNECT_TIMEOUT, HTTP_REQUEST_TIMEOUT};
use crate::service::{RateLimit, Rejection, ServiceError};

/// Header listing the rule sets that apply to a response
pub const RULES_HEADER: &str = "X-Rate-Limit-Rules";

/// Prefix of the per-rule quota headers (`X-Rate-Limit-Client`, ...)
pub const RULE_HEADER_PREFIX: &str = "X-Rate-Limit-";

/// Header carrying the mandatory cooldown in seconds
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

/// Rule set preferred when the server lists several
const PREFERRED_RULE: &str = "client";

/// Default User-Agent sent with every request
pub fn default_user_agent() -> String {
    format!("stash-fetcher/{}", env!("CARGO_PKG_VERSION"))
}

/// Build the HTTP client used by one service manager.
///
/// Configured with explicit timeouts to prevent indefinite hangs:
/// - Connect timeout: 10 seconds
/// - Request timeout: 30 seconds
pub fn build_client(user_agent: &str) -> Result<Client, ServiceError> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .timeout(HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ServiceError::Network {
            reason: format!("failed to build HTTP client: {e}"),
            operation: "build_client".to_string(),
        })
}

/// Why a request did not produce a successful response
#[derive(Debug)]
pub(crate) enum SendError {
    /// HTTP 429; the headers describe the server's quota
    TooManyRequests(HeaderMap),
    /// Any other failure, already converted for the caller
    Failed(ServiceError),
}

/// Send a request and sort the outcome.
pub(crate) async fn send(
    request: RequestBuilder,
    operation: &'static str,
) -> Result<Response, SendError> {
    let metrics = HttpRequestMetrics::start(operation);

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            metrics.record_network_error();
            warn!(operation, "Network error: {}", e);
            return Err(SendError::Failed(ServiceError::Network {
                reason: describe_transport_error(&e),
                operation: operation.to_string(),
            }));
        }
    };

    let status = response.status();
    metrics.record_complete(status.as_u16());

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(SendError::TooManyRequests(response.headers().clone()));
    }

    if !status.is_success() {
        warn!(operation, status = status.as_u16(), "HTTP error");
        return Err(SendError::Failed(ServiceError::Http {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            operation: operation.to_string(),
        }));
    }

    debug!(operation, status = status.as_u16(), "Request succeeded");
    Ok(response)
}

/// Short classification of a transport failure followed by its message
fn describe_transport_error(err: &reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "network timeout"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "network error"
    };
    format!("{kind}: {err}")
}

/// Parse the quota and cooldown announced by a 429 response.
///
/// The rule set named `client` wins when several are listed, otherwise the
/// first one is used. Each rule header holds comma-separated
/// `hits:period:restricted` triples with periods in seconds.
pub fn parse_rejection(headers: &HeaderMap) -> Result<Rejection, ServiceError> {
    let rules = header_str(headers, RULES_HEADER)?;
    let rule_names: Vec<&str> = rules
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();
    let rule = rule_names
        .iter()
        .copied()
        .find(|name| name.eq_ignore_ascii_case(PREFERRED_RULE))
        .or_else(|| rule_names.first().copied())
        .ok_or_else(|| {
            ServiceError::MalformedRateLimit(format!("{RULES_HEADER} lists no rules"))
        })?;

    let limits_header = format!("{RULE_HEADER_PREFIX}{rule}");
    let rate_limits = parse_rate_limits(header_str(headers, &limits_header)?)?;

    let retry_after = parse_retry_after(headers)?;

    Ok(Rejection::new(rate_limits, retry_after))
}

/// Read the cooldown of a 429 response.
///
/// A missing header falls back to [`DEFAULT_RETRY_AFTER`]; a present but
/// unreadable one is an error.
pub fn parse_retry_after(headers: &HeaderMap) -> Result<Duration, ServiceError> {
    let Some(value) = headers.get(RETRY_AFTER_HEADER) else {
        warn!(
            "429 response without {}, assuming {}s",
            RETRY_AFTER_HEADER,
            DEFAULT_RETRY_AFTER.as_secs()
        );
        return Ok(DEFAULT_RETRY_AFTER);
    };
    let text = value.to_str().map_err(|_| {
        ServiceError::MalformedRateLimit(format!("{RETRY_AFTER_HEADER} is not text"))
    })?;
    let secs = text.trim().parse::<u64>().map_err(|_| {
        ServiceError::MalformedRateLimit(format!(
            "{RETRY_AFTER_HEADER} is not a number of seconds: {text:?}"
        ))
    })?;
    Ok(Duration::from_secs(secs))
}

/// Parse comma-separated `hits:period:restricted` triples.
pub fn parse_rate_limits(value: &str) -> Result<Vec<RateLimit>, ServiceError> {
    value
        .split(',')
        .map(|triple| {
            let malformed =
                || ServiceError::MalformedRateLimit(format!("invalid rate limit {triple:?}"));
            let parts: Vec<&str> = triple.trim().split(':').collect();
            let [hits, period, _restricted] = parts.as_slice() else {
                return Err(malformed());
            };
            let hits = hits.parse::<u32>().map_err(|_| malformed())?;
            let period = period.parse::<u64>().map_err(|_| malformed())?;
            Ok(RateLimit::from_secs(hits, period))
        })
        .collect()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ServiceError> {
    headers
        .get(name)
        .ok_or_else(|| ServiceError::MalformedRateLimit(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| ServiceError::MalformedRateLimit(format!("{name} header is not text")))
}
