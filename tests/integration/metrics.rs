//! Integration tests for the metrics exporter

use std::net::SocketAddr;
use std::time::Duration;
use stash_fetcher::metrics;

#[tokio::test]
async fn test_metrics_initialization_is_idempotent() {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

    assert!(metrics::init_metrics(addr).await.is_ok());
    assert!(metrics::init_metrics(addr).await.is_ok());
    assert!(metrics::is_initialized().await);

    metrics::record_dispatch("api");
    metrics::record_rejection("api", Duration::from_secs(30));
    metrics::record_quota_wait("api", Duration::from_millis(500));
}
