use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use tally_core::config::Config;
use tally_duckdb::DuckDbBackend;
use tally_server::app::build_app;
use tally_server::state::AppState;

const CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const GOOGLEBOT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

fn test_config() -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/tally-test".to_string(),
        ..Config::default()
    }
}

/// Create a fresh in-memory backend + state + app for each test.
async fn setup_with(config: Config) -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    db.seed_website("example.com", "Example")
        .await
        .expect("seed website");
    let state = Arc::new(AppState::new(db, config).expect("state"));
    let app = build_app(Arc::clone(&state));
    (state, app)
}

async fn setup() -> (Arc<AppState>, axum::Router) {
    setup_with(test_config()).await
}

/// Helper: POST /api/event/hit the way the tracker does, as text/plain.
fn hit_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/event/hit")
        .header(header::CONTENT_TYPE, "text/plain")
        .header("x-forwarded-for", "203.0.113.9")
        .header(header::USER_AGENT, CHROME)
        .header(header::ACCEPT_LANGUAGE, "en-GB,en;q=0.9")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

fn load_body(bid: &str, url: &str) -> Value {
    json!({
        "e": "load",
        "b": bid,
        "u": url,
        "r": "https://www.google.com/",
        "p": true,
        "q": true,
        "t": "Europe/Berlin"
    })
}

async fn json_body(response: axum::http::Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

async fn text_body(response: axum::http::Response<Body>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

fn advance_one_second(http_date: &str) -> String {
    let parsed = chrono::DateTime::parse_from_rfc2822(http_date).expect("http date");
    (parsed + chrono::TimeDelta::seconds(1))
        .with_timezone(&chrono::Utc)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

async fn view_count(state: &AppState) -> i64 {
    let conn = state.db.conn_for_test().await;
    conn.query_row("SELECT COUNT(*) FROM views", [], |row| row.get(0))
        .expect("count views")
}

#[tokio::test]
async fn test_load_hit_is_stored_and_enriched() {
    let (state, app) = setup().await;

    let response = app
        .oneshot(hit_request(load_body("bid-1", "https://example.com/docs/?utm_campaign=launch")))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let conn = state.db.conn_for_test().await;
    let row: (String, String, String, String, String, String) = conn
        .query_row(
            "SELECT pathname, referrer_group, country, ua_browser, ua_device_type, utm_campaign \
             FROM views WHERE bid = 'bid-1'",
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .expect("stored view");
    assert_eq!(
        row,
        (
            "/docs".to_string(),
            "Google".to_string(),
            "Germany".to_string(),
            "Chrome".to_string(),
            "Desktop".to_string(),
            "launch".to_string(),
        )
    );
}

#[tokio::test]
async fn test_unload_sets_duration_on_existing_view() {
    let (state, app) = setup().await;

    let response = app
        .clone()
        .oneshot(hit_request(load_body("bid-2", "https://example.com/")))
        .await
        .expect("load");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(hit_request(json!({ "e": "unload", "b": "bid-2", "m": 12_500 })))
        .await
        .expect("unload");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let conn = state.db.conn_for_test().await;
    let duration: i64 = conn
        .query_row("SELECT duration_ms FROM views WHERE bid = 'bid-2'", [], |row| row.get(0))
        .expect("duration");
    assert_eq!(duration, 12_500);
}

#[tokio::test]
async fn test_unknown_hostname_returns_404() {
    let (state, app) = setup().await;

    let response = app
        .oneshot(hit_request(load_body("bid-3", "https://unknown.org/")))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "not_found");
    assert_eq!(view_count(&state).await, 0);
}

#[tokio::test]
async fn test_bot_hit_is_accepted_but_not_stored() {
    let (state, app) = setup().await;

    let mut request = hit_request(load_body("bid-4", "https://example.com/"));
    request
        .headers_mut()
        .insert(header::USER_AGENT, GOOGLEBOT.parse().expect("header"));
    let response = app.oneshot(request).await.expect("request");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(view_count(&state).await, 0);
}

#[tokio::test]
async fn test_custom_hit_requires_properties() {
    let (_state, app) = setup().await;

    let response = app
        .clone()
        .oneshot(hit_request(json!({ "e": "custom", "g": "example.com", "d": {} })))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "validation_error");

    let response = app
        .oneshot(hit_request(
            json!({ "e": "custom", "g": "example.com", "d": { "plan": "pro" } }),
        ))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_malformed_and_unknown_bodies_are_rejected() {
    let (_state, app) = setup().await;

    for body in [json!({ "e": "scroll", "b": "x" }), json!("not an object")] {
        let response = app
            .clone()
            .oneshot(hit_request(body))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_blocked_ip_gets_silent_no_content() {
    let config = Config {
        blocked_ips: "203.0.113.9".to_string(),
        ..test_config()
    };
    let (state, app) = setup_with(config).await;

    let response = app
        .oneshot(hit_request(load_body("bid-5", "https://example.com/")))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(view_count(&state).await, 0);
}

#[tokio::test]
async fn test_rate_limit_rejects_over_limit_prefix() {
    let config = Config {
        rate_limit_requests: 2,
        ..test_config()
    };
    let (_state, app) = setup_with(config).await;

    for bid in ["r1", "r2"] {
        let response = app
            .clone()
            .oneshot(hit_request(load_body(bid, "https://example.com/")))
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = app
        .oneshot(hit_request(load_body("r3", "https://example.com/")))
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "rate_limited");
}

#[tokio::test]
async fn test_missing_client_address_is_bad_request() {
    let (_state, app) = setup().await;

    // oneshot carries no ConnectInfo, so without proxy headers there is no address.
    let request = Request::builder()
        .method("GET")
        .uri("/api/event/ping")
        .body(Body::empty())
        .expect("build request");
    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ping_reports_uniqueness_through_cache_headers() {
    let (_state, app) = setup().await;

    let request = Request::builder()
        .uri("/api/event/ping")
        .header("x-real-ip", "198.51.100.4")
        .body(Body::empty())
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL].to_str().expect("ascii"),
        "no-cache"
    );
    let last_modified = response.headers()[header::LAST_MODIFIED]
        .to_str()
        .expect("ascii")
        .to_string();
    assert_eq!(text_body(response).await, "0");

    // Replaying today's Last-Modified marks the visitor as already seen.
    let request = Request::builder()
        .uri("/api/event/ping")
        .header("x-real-ip", "198.51.100.4")
        .header(header::IF_MODIFIED_SINCE, &last_modified)
        .body(Body::empty())
        .expect("build request");
    let response = app.clone().oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::LAST_MODIFIED].to_str().expect("ascii"),
        advance_one_second(&last_modified)
    );
    assert_eq!(text_body(response).await, "1");

    let request = Request::builder()
        .uri("/api/event/ping")
        .header("x-real-ip", "198.51.100.4")
        .header(header::IF_MODIFIED_SINCE, "not a date")
        .body(Body::empty())
        .expect("build request");
    let response = app.oneshot(request).await.expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_endpoint_reads_stored_hits() {
    let (_state, app) = setup().await;

    for bid in ["s1", "s2"] {
        let response = app
            .clone()
            .oneshot(hit_request(load_body(bid, "https://example.com/pricing")))
            .await
            .expect("load");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/website/example.com/summary")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["visitors"], 2);
    assert_eq!(body["data"]["pageviews"], 2);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/website/example.com/referrers?grouped=true")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");
    let body = json_body(response).await;
    assert_eq!(body["data"][0]["referrer"], "Google");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/website/example.com/pages?pathname%5Beq%5D=%2Fother")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");
    let body = json_body(response).await;
    assert_eq!(body["data"], json!([]));

    for (uri, status) in [
        ("/api/website/example.com/heatmap", StatusCode::NOT_FOUND),
        ("/api/website/unknown.org/summary", StatusCode::NOT_FOUND),
        ("/api/website/example.com/pages?colour=blue", StatusCode::BAD_REQUEST),
    ] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("build request"))
            .await
            .expect("request");
        assert_eq!(response.status(), status, "{uri}");
    }
}

#[tokio::test]
async fn test_reports_are_gzipped_when_accepted() {
    let (_state, app) = setup().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/website/example.com/summary")
                .header(header::ACCEPT_ENCODING, "gzip")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_ENCODING].to_str().expect("ascii"),
        "gzip"
    );
}

#[tokio::test]
async fn test_health_reports_ok() {
    let (_state, app) = setup().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}
