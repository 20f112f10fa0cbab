//! Integration tests for the API manager against a local server

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stash_fetcher::api::{
    api_rate_limiter, http, ApiEndpoints, ApiManager, ApiOperation, ApiPayload, Credentials,
};
use stash_fetcher::service::{Action, RequestQueue, Service, WorkerConfig, WorkerExit};
use stash_fetcher::{Call, RateLimit, ServiceError, ServiceManager};

use crate::common::serve;

type Hits = Arc<AtomicUsize>;

fn credentials() -> Credentials {
    Credentials::new("exile", "secret")
}

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("POESESSID=secret"))
}

fn rate_limited(retry_after: &'static str) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("x-rate-limit-rules", "Ip,Client"),
            ("x-rate-limit-ip", "100:60:60"),
            ("x-rate-limit-client", "5:10:60"),
            ("retry-after", retry_after),
        ],
        "",
    )
        .into_response()
}

async fn leagues(Query(query): Query<HashMap<String, String>>) -> Response {
    if query.get("type").map(String::as_str) != Some("main") {
        return StatusCode::BAD_REQUEST.into_response();
    }
    Json(json!([{"id": "Standard"}, {"id": "Hardcore"}])).into_response()
}

async fn characters(headers: HeaderMap) -> Response {
    if !has_session(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    Json(json!([
        {"name": "Aya", "league": "Standard"},
        {"name": "Brutus", "league": "Hardcore"},
        {"name": "Cinder", "league": "Standard"}
    ]))
    .into_response()
}

async fn stash_items(
    State(hits): State<Hits>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !has_session(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
        return rate_limited("1");
    }
    let index: u32 = query
        .get("tabIndex")
        .and_then(|v| v.parse().ok())
        .unwrap_or_default();
    Json(json!({
        "numTabs": 2,
        "tabs": [{"n": "Dump", "i": 0, "id": "a", "type": "PremiumStash"},
                 {"n": "Maps", "i": 1, "id": "b", "type": "MapStash"}],
        "items": [{"icon": format!("https://cdn.example/tab{index}.png")}]
    }))
    .into_response()
}

async fn malformed() -> Response {
    (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "5")], "").into_response()
}

async fn start_server() -> (String, Hits) {
    let hits = Hits::default();
    let router = Router::new()
        .route("/leagues", get(leagues))
        .route("/character-window/get-characters", get(characters))
        .route("/character-window/get-stash-items", get(stash_items))
        .route("/character-window/get-items", get(malformed))
        .with_state(hits.clone());
    (serve(router).await, hits)
}

fn manager(base: &str) -> ApiManager {
    ApiManager::with_user_agent(&http::default_user_agent(), ApiEndpoints::single(base)).unwrap()
}

#[tokio::test]
async fn test_leagues() {
    let (base, _) = start_server().await;
    let queue = RequestQueue::<Call<ApiOperation, ()>>::new();

    let payload = manager(&base)
        .execute(&ApiOperation::Leagues, &queue)
        .await
        .unwrap();

    assert_eq!(
        payload,
        ApiPayload::Leagues(vec!["Standard".into(), "Hardcore".into()])
    );
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_character_list_is_filtered_by_league() {
    let (base, _) = start_server().await;
    let queue = RequestQueue::<Call<ApiOperation, ()>>::new();

    let payload = manager(&base)
        .execute(
            &ApiOperation::CharacterList {
                credentials: credentials(),
                league: "Standard".into(),
            },
            &queue,
        )
        .await
        .unwrap();

    assert_eq!(
        payload,
        ApiPayload::Characters(vec!["Aya".into(), "Cinder".into()])
    );
}

#[tokio::test]
async fn test_missing_session_is_http_error() {
    let (base, _) = start_server().await;
    let queue = RequestQueue::<Call<ApiOperation, ()>>::new();

    let error = manager(&base)
        .execute(
            &ApiOperation::CharacterList {
                credentials: Credentials::new("exile", "wrong"),
                league: "Standard".into(),
            },
            &queue,
        )
        .await
        .unwrap_err();

    assert!(matches!(error, ServiceError::Http { status: 403, .. }));
    assert!(!error.is_retrying());
}

#[tokio::test]
async fn test_unknown_endpoint_is_http_error() {
    let (base, _) = start_server().await;
    let queue = RequestQueue::<Call<ApiOperation, ()>>::new();

    let error = manager(&base)
        .execute(
            &ApiOperation::UniqueSubtab {
                account: "exile".into(),
                uid: "abc".into(),
                tab_index: 1,
            },
            &queue,
        )
        .await
        .unwrap_err();

    assert!(matches!(error, ServiceError::Http { status: 404, .. }));
}

#[tokio::test]
async fn test_too_many_requests_pushes_rejection() {
    let (base, _) = start_server().await;
    let queue = RequestQueue::<Call<ApiOperation, ()>>::new();

    let error = manager(&base)
        .execute(
            &ApiOperation::TabInfo {
                credentials: credentials(),
                league: "Standard".into(),
            },
            &queue,
        )
        .await
        .unwrap_err();

    assert!(error.is_retrying());
    match queue.try_dequeue() {
        Some(Action::Rejection(rejection)) => {
            assert_eq!(rejection.rate_limits, vec![RateLimit::from_secs(5, 10)]);
            assert_eq!(rejection.retry_after, Duration::from_secs(1));
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_quota_headers_halt() {
    let (base, _) = start_server().await;
    let queue = RequestQueue::<Call<ApiOperation, ()>>::new();

    let error = manager(&base)
        .execute(
            &ApiOperation::CharacterItems {
                credentials: credentials(),
                character: "Aya".into(),
            },
            &queue,
        )
        .await
        .unwrap_err();

    assert!(matches!(error, ServiceError::MalformedRateLimit(_)));
    assert!(matches!(queue.try_dequeue(), Some(Action::Halt(_))));
}

#[tokio::test]
async fn test_service_retries_after_server_cooldown() {
    let (base, hits) = start_server().await;
    let (service, mut results) = Service::spawn(
        "api",
        manager(&base),
        Some(api_rate_limiter()),
        WorkerConfig::default(),
    );

    service.call(
        ApiOperation::TabItems {
            credentials: credentials(),
            league: "Standard".into(),
            tab_index: 1,
        },
        "tab-1",
    );

    let rejected = results.recv().await.unwrap();
    assert!(rejected.will_retry());
    assert_eq!(rejected.context, "tab-1");

    let started = std::time::Instant::now();
    let retried = results.recv().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(900));
    assert_eq!(retried.context, "tab-1");
    let Ok(ApiPayload::Tab(document)) = retried.reply else {
        panic!("expected tab contents");
    };
    assert_eq!(document["items"][0]["icon"], "https://cdn.example/tab1.png");

    assert_eq!(service.shutdown().await.unwrap(), WorkerExit::Shutdown);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
