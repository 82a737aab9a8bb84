use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use gatekeeper::clock::ManualClock;
use gatekeeper::store::{CounterStore, MemoryStore};
use gatekeeper::{create_app, AppState, OverrideEvent, RateLimitConfig, RateLimitPolicy, Throttler};

const START_MS: i64 = 1_700_000_000_000;

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(START_MS).unwrap()
}

struct TestApp {
    app: Router,
    clock: ManualClock,
}

fn test_app(config: RateLimitConfig) -> TestApp {
    let clock = ManualClock::new(start());
    let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new(Arc::new(clock.clone())));
    let throttler = Arc::new(Throttler::new(
        Arc::new(config),
        store.clone(),
        Arc::new(clock.clone()),
    ));

    TestApp {
        app: create_app(AppState::new(throttler, store)),
        clock,
    }
}

fn config(unauth: RateLimitPolicy, overrides: Vec<OverrideEvent>) -> RateLimitConfig {
    RateLimitConfig::new(
        Duration::from_secs(60),
        RateLimitPolicy::new(20, Duration::from_secs(10), 50),
        unauth,
        overrides,
    )
    .unwrap()
}

fn get(path: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn header(response: &axum::response::Response, name: &str) -> String {
    response.headers()[name].to_str().unwrap().to_string()
}

#[tokio::test]
async fn test_admitted_request_carries_rate_limit_headers() {
    let test = test_app(config(RateLimitPolicy::new(10, Duration::from_secs(10), 50), vec![]));

    let response = test.app.clone().oneshot(get("/", "10.0.0.1")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-limit"), "10");
    assert_eq!(header(&response, "x-ratelimit-remaining"), "9");
    assert_eq!(
        header(&response, "x-ratelimit-reset"),
        ((START_MS + 60_000) / 1000).to_string()
    );
    assert_eq!(body_string(response).await, "Public");
}

#[tokio::test]
async fn test_fixed_window_limit_returns_429() {
    let test = test_app(config(RateLimitPolicy::new(3, Duration::from_secs(10), 50), vec![]));

    for expected_remaining in ["2", "1", "0"] {
        let response = test.app.clone().oneshot(get("/", "10.0.0.2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-ratelimit-remaining"), expected_remaining);
    }

    let response = test.app.clone().oneshot(get("/", "10.0.0.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get("x-ratelimit-limit").is_none());

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body, serde_json::json!({ "error": "Too Many Requests", "retryAfter": 60 }));
}

#[tokio::test]
async fn test_window_expiry_readmits_client() {
    let test = test_app(config(RateLimitPolicy::new(1, Duration::from_secs(10), 50), vec![]));

    let response = test.app.clone().oneshot(get("/", "10.0.0.3")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = test.app.clone().oneshot(get("/", "10.0.0.3")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    test.clock.advance(ChronoDuration::seconds(60));

    let response = test.app.clone().oneshot(get("/", "10.0.0.3")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_sliding_log_allows_one_past_max_requests() {
    let test = test_app(config(RateLimitPolicy::new(100, Duration::from_secs(10), 5), vec![]));

    let mut statuses = Vec::new();
    for _ in 0..7 {
        let response = test.app.clone().oneshot(get("/", "10.0.0.4")).await.unwrap();
        statuses.push(response.status());
    }

    assert!(statuses[..6].iter().all(|s| *s == StatusCode::OK));
    assert_eq!(statuses[6], StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_buckets_are_isolated_per_fingerprint() {
    let test = test_app(config(RateLimitPolicy::new(1, Duration::from_secs(10), 50), vec![]));

    let response = test.app.clone().oneshot(get("/", "10.0.0.5")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = test.app.clone().oneshot(get("/", "10.0.0.5")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // Different client, different route, and authenticated requests each get their own bucket.
    let response = test.app.clone().oneshot(get("/", "10.0.0.6")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = test.app.clone().oneshot(get("/sale", "10.0.0.5")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let authed = Request::builder()
        .uri("/")
        .header("x-forwarded-for", "10.0.0.5")
        .header("authorization", "Bearer token")
        .body(Body::empty())
        .unwrap();
    let response = test.app.clone().oneshot(authed).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-limit"), "20");
}

#[tokio::test]
async fn test_active_override_reaches_handler() {
    let event = OverrideEvent {
        url: "/sale".to_string(),
        start_time: start() - ChronoDuration::minutes(5),
        end_time: start() + ChronoDuration::minutes(30),
        policy: RateLimitPolicy::new(400, Duration::from_secs(10), 50),
    };
    let test = test_app(config(RateLimitPolicy::new(10, Duration::from_secs(10), 50), vec![event]));

    let response = test.app.clone().oneshot(get("/sale", "10.0.0.7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-limit"), "400");
    assert_eq!(body_string(response).await, "Sale!!! (promotional pricing active)");

    test.clock.advance(ChronoDuration::hours(1));

    let response = test.app.clone().oneshot(get("/sale", "10.0.0.7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-ratelimit-limit"), "10");
    assert_eq!(body_string(response).await, "Sale!!!");
}

#[tokio::test]
async fn test_missing_client_ip_is_server_error() {
    let test = test_app(config(RateLimitPolicy::new(10, Duration::from_secs(10), 50), vec![]));

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = test.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_health_is_not_rate_limited() {
    let test = test_app(config(RateLimitPolicy::new(1, Duration::from_secs(10), 1), vec![]));

    for _ in 0..3 {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = test.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("x-ratelimit-limit").is_none());

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "healthy");
    }
}
