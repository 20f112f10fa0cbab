//! Integration tests for image downloads

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stash_fetcher::api::http;
use stash_fetcher::download::{image_cache_path, DownloadManager, DownloadOperation};
use stash_fetcher::service::{Service, WorkerConfig, WorkerExit};
use stash_fetcher::{Call, ServiceError};
use tempfile::TempDir;

use crate::common::serve;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nnot really an image";

type Hits = Arc<AtomicUsize>;

async fn image(State(hits): State<Hits>) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    PNG.into_response()
}

async fn limited(State(hits): State<Hits>) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "30")], "").into_response()
}

async fn start_server() -> (String, Hits) {
    let hits = Hits::default();
    let router = Router::new()
        .route("/image/Art/2DItems/Orb.png", get(image))
        .route("/image/Art/2DItems/Gem.png", get(image))
        .route("/image/Art/2DItems/Limited.png", get(limited))
        .with_state(hits.clone());
    (serve(router).await, hits)
}

fn spawn(
    dir: &TempDir,
) -> (
    Service<DownloadManager, ()>,
    stash_fetcher::service::ResultReceiver<DownloadManager, ()>,
) {
    let manager =
        DownloadManager::with_user_agent(&http::default_user_agent(), dir.path()).unwrap();
    Service::spawn("download", manager, None, WorkerConfig::default())
}

fn image_call(url: &str) -> Call<DownloadOperation, ()> {
    Call::detached(DownloadOperation::Image {
        url: url.to_string(),
    })
}

#[tokio::test]
async fn test_image_is_downloaded_once() {
    let (base, hits) = start_server().await;
    let dir = TempDir::new().unwrap();
    let url = format!("{base}/image/Art/2DItems/Orb.png?scale=1");
    let (service, mut results) = spawn(&dir);

    service.enqueue([image_call(&url), image_call(&url)]);

    let first = results.recv().await.unwrap().reply.unwrap();
    assert!(first.fetched);
    assert_eq!(std::fs::read(&first.path).unwrap(), PNG);
    assert_eq!(first.path, image_cache_path(dir.path(), &url).unwrap());

    let second = results.recv().await.unwrap().reply.unwrap();
    assert!(!second.fetched);
    assert_eq!(second.path, first.path);

    assert_eq!(service.shutdown().await.unwrap(), WorkerExit::Shutdown);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_url_is_reported() {
    let dir = TempDir::new().unwrap();
    let (service, mut results) = spawn(&dir);

    service.enqueue([image_call("https://cdn.example/image/")]);

    let completed = results.recv().await.unwrap();
    assert!(matches!(completed.reply, Err(ServiceError::Parse(_))));
    assert_eq!(service.shutdown().await.unwrap(), WorkerExit::Shutdown);
}

#[tokio::test]
async fn test_too_many_requests_aborts_downloads() {
    let (base, hits) = start_server().await;
    let dir = TempDir::new().unwrap();
    let (service, mut results) = spawn(&dir);

    service.enqueue([
        image_call(&format!("{base}/image/Art/2DItems/Limited.png")),
        image_call(&format!("{base}/image/Art/2DItems/Gem.png")),
    ]);

    let rejected = results.recv().await.unwrap();
    assert!(matches!(rejected.reply, Err(ServiceError::Aborted { .. })));
    assert!(!rejected.will_retry());
    assert!(results.recv().await.is_none());

    assert_eq!(
        service.join().await.unwrap(),
        WorkerExit::UnlimitedRejection
    );
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
