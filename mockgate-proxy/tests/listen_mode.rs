//! End-to-end tests for proxy mode (`listen` set).

mod helpers;

use helpers::*;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

async fn read_capture(path: PathBuf) -> Value {
    let written = wait_until(|| {
        let path = path.clone();
        async move { path.is_file() }
    })
    .await;
    assert!(written, "capture {} was never written", path.display());
    serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap()
}

fn capture_path(mock_path: &Path, file: &str) -> PathBuf {
    mock_path.join("_captures").join(file)
}

#[tokio::test]
async fn test_unmatched_request_is_relayed_and_captured() {
    let upstream = FakeUpstream::start().await;
    let dir = TempDir::new().unwrap();
    let server = TestServer::start(proxy_settings(dir.path(), &upstream.url())).await;

    let response = client()
        .get(server.url("/api/items?limit=2"))
        .header("Origin", "http://ui.test")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "http://ui.test");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["method"], "GET");
    assert_eq!(body["path"], "/api/items");
    assert_eq!(body["query"], "limit=2");
    assert_eq!(upstream.hits(), 1);

    let capture = read_capture(capture_path(dir.path(), "api.items.json")).await;
    assert_eq!(capture, json!({ "GET /api/items": body }));
}

#[tokio::test]
async fn test_non_get_capture_file_carries_method_suffix() {
    let upstream = FakeUpstream::start().await;
    let dir = TempDir::new().unwrap();
    let server = TestServer::start(proxy_settings(dir.path(), &upstream.url())).await;

    let response = client()
        .post(server.url("/api/items"))
        .body(r#"{"name":"widget"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let capture = read_capture(capture_path(dir.path(), "api.items-POST.json")).await;
    assert_eq!(capture["POST /api/items"]["body"], r#"{"name":"widget"}"#);
    assert!(!capture_path(dir.path(), "api.items.json").exists());
}

#[tokio::test]
async fn test_text_upstream_body_is_relayed_and_captured_as_string() {
    let upstream = FakeUpstream::start().await;
    let dir = TempDir::new().unwrap();
    let server = TestServer::start(proxy_settings(dir.path(), &upstream.url())).await;

    let response = client().get(server.url("/text")).send().await.unwrap();
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    assert_eq!(response.text().await.unwrap(), "hello from upstream");

    let capture = read_capture(capture_path(dir.path(), "text.json")).await;
    assert_eq!(capture, json!({"GET /text": "hello from upstream"}));
}

#[tokio::test]
async fn test_primary_fixture_replaces_live_response() {
    let upstream = FakeUpstream::start().await;
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("items.json"),
        r#"{"GET /api/items": {"mocked": true}}"#,
    )
    .unwrap();
    let server = TestServer::start(proxy_settings(dir.path(), &upstream.url())).await;

    let body: Value = client()
        .get(server.url("/api/items"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body, json!({"mocked": true}));
    assert_eq!(upstream.hits(), 1, "upstream is still called");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!capture_path(dir.path(), "api.items.json").exists());
}

#[tokio::test]
async fn test_configured_headers_are_merged_into_forwarded_request() {
    let upstream = FakeUpstream::start().await;
    let dir = TempDir::new().unwrap();
    let mut settings = proxy_settings(dir.path(), &upstream.url());
    settings
        .headers
        .insert("Authorization".into(), "Bearer from-config".into());
    settings.headers.insert("X-Env".into(), "dev".into());
    let server = TestServer::start(settings).await;

    let body: Value = client()
        .get(server.url("/whoami"))
        .header("Authorization", "Bearer from-client")
        .header("X-Client", "kept")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let headers = &body["headers"];
    assert_eq!(headers["authorization"], "Bearer from-config");
    assert_eq!(headers["x-env"], "dev");
    assert_eq!(headers["x-client"], "kept");
}

#[tokio::test]
async fn test_upstream_unreachable_is_500() {
    let dir = TempDir::new().unwrap();
    let server = TestServer::start(proxy_settings(
        dir.path(),
        &unreachable_upstream_url().await,
    ))
    .await;

    let response = client()
        .get(server.url("/api/items"))
        .header("Origin", "http://ui.test")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()["access-control-allow-origin"], "http://ui.test");
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upstream_error_status_is_500_and_not_captured() {
    let upstream = FakeUpstream::start().await;
    let dir = TempDir::new().unwrap();
    let server = TestServer::start(proxy_settings(dir.path(), &upstream.url())).await;

    let response = client()
        .get(server.url("/status/503"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!capture_path(dir.path(), "status.503.json").exists());
}

#[tokio::test]
async fn test_offline_replay_serves_captured_fixture() {
    let dir = TempDir::new().unwrap();
    let captures = dir.path().join("_captures");
    fs::create_dir(&captures).unwrap();
    fs::write(
        captures.join("api.items.json"),
        r#"{"GET /api/items": [{"id": 1}]}"#,
    )
    .unwrap();

    let mut settings = proxy_settings(dir.path(), &unreachable_upstream_url().await);
    settings.use_temp_mock = true;
    let server = TestServer::start(settings).await;
    let client = client();

    let replayed = client.get(server.url("/api/items")).send().await.unwrap();
    assert_eq!(replayed.status(), StatusCode::OK);
    assert_eq!(replayed.json::<Value>().await.unwrap(), json!([{"id": 1}]));

    let missing = client.get(server.url("/api/other")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_captured_response_is_served_later_in_mock_mode() {
    let upstream = FakeUpstream::start().await;
    let dir = TempDir::new().unwrap();
    let proxy = TestServer::start(proxy_settings(dir.path(), &upstream.url())).await;

    let live: Value = client()
        .get(proxy.url("/api/profile"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    read_capture(capture_path(dir.path(), "api.profile.json")).await;
    proxy.stop().await;

    let mut settings = mock_settings(dir.path());
    settings.use_temp_mock = true;
    let mock = TestServer::start(settings).await;

    let replayed: Value = client()
        .get(mock.url("/api/profile"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(replayed, live);
}

#[tokio::test]
async fn test_capture_made_on_fresh_directory_is_replayed_when_upstream_goes_down() {
    let upstream = FakeUpstream::start().await;
    let dir = TempDir::new().unwrap();
    assert!(!dir.path().join("_captures").exists());
    let mut settings = proxy_settings(dir.path(), &upstream.url());
    settings.use_temp_mock = true;
    let server = TestServer::start_watching(settings).await;
    let client = client();

    let live: Value = client
        .get(server.url("/api/orders"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    read_capture(capture_path(dir.path(), "api.orders.json")).await;

    upstream.set_down(true);

    let replayed = wait_until(|| {
        let client = client.clone();
        let url = server.url("/api/orders");
        let live = live.clone();
        async move {
            match client.get(url).send().await {
                Ok(response) if response.status() == StatusCode::OK => {
                    response.json::<Value>().await.ok() == Some(live)
                }
                _ => false,
            }
        }
    })
    .await;
    assert!(replayed, "captured response was not picked up for offline replay");
}
