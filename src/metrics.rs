//! Observability metrics for the request services
//!
//! Counters and histograms for dispatched calls, rate-limit rejections,
//! quota waits and HTTP outcomes. Recording goes through the `metrics`
//! facade and is a no-op until [`init_metrics`] installs the Prometheus
//! exporter, so library users pay nothing unless they opt in.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<RwLock<bool>> = Lazy::new(|| RwLock::new(false));

/// Install the Prometheus exporter and describe all metrics.
///
/// Idempotent: later calls return `Ok(())` without reinstalling.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "service_calls_dispatched_total",
        Unit::Count,
        "Calls handed to a service manager"
    );
    describe_counter!(
        "service_rejections_total",
        Unit::Count,
        "Rate limit rejections applied by a worker"
    );
    describe_histogram!(
        "service_cooldown_seconds",
        Unit::Seconds,
        "Cooldown imposed by rate limit rejections"
    );
    describe_histogram!(
        "service_quota_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for quota before a call"
    );
    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "HTTP requests by endpoint and status"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "image_downloads_total",
        Unit::Count,
        "Image download requests by outcome"
    );

    *initialized = true;
    info!("Metrics system initialized on {}", addr);
    Ok(())
}

/// Check if the metrics exporter is installed
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Count a call handed to a service manager
pub fn record_dispatch(service: &str) {
    counter!("service_calls_dispatched_total", "service" => service.to_string()).increment(1);
}

/// Record a rejection and the cooldown it imposed
pub fn record_rejection(service: &str, retry_after: Duration) {
    counter!("service_rejections_total", "service" => service.to_string()).increment(1);
    histogram!("service_cooldown_seconds", "service" => service.to_string())
        .record(retry_after.as_secs_f64());
}

/// Record time spent waiting for quota
pub fn record_quota_wait(service: &str, wait: Duration) {
    histogram!("service_quota_wait_seconds", "service" => service.to_string())
        .record(wait.as_secs_f64());
}

/// Record an image request, `cached` when no network fetch was needed
pub fn record_image_download(cached: bool) {
    let outcome = if cached { "cached" } else { "fetched" };
    counter!("image_downloads_total", "outcome" => outcome).increment(1);
}

/// Timing and outcome of one HTTP request
pub struct HttpRequestMetrics {
    endpoint: &'static str,
    start_time: Instant,
}

impl HttpRequestMetrics {
    /// Start timing a request to `endpoint`
    pub fn start(endpoint: &'static str) -> Self {
        Self {
            endpoint,
            start_time: Instant::now(),
        }
    }

    /// Record a response with a status code
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!("http_request_duration_seconds", "endpoint" => self.endpoint)
            .record(duration.as_secs_f64());

        if status_code == 429 {
            warn!(
                endpoint = self.endpoint,
                duration_ms = duration.as_millis() as u64,
                "Rate limit error (429) recorded"
            );
        } else {
            debug!(
                endpoint = self.endpoint,
                status = status_code,
                duration_ms = duration.as_millis() as u64,
                "HTTP request completed"
            );
        }
    }

    /// Record a request that produced no response
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => "network_error",
        )
        .increment(1);
        histogram!("http_request_duration_seconds", "endpoint" => self.endpoint)
            .record(duration.as_secs_f64());
    }
}
