mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{TestApp, body_json};
use serde_json::json;
use uuid::Uuid;

const WRITE: &[&str] = &["alcove.global.write.ui"];
const READ: &[&str] = &["alcove.global.read.ui"];

fn upload_request(permissions: &[&str], content_type: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri("/settings/upload")
        .header("x-settings-tenant", common::TENANT)
        .header(
            "x-settings-permissions",
            serde_json::to_string(permissions).unwrap(),
        )
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap()
}

fn entries(keys: &[&str]) -> String {
    let array: Vec<_> = keys
        .iter()
        .map(|key| json!({"scope": "ui", "key": key, "value": {"k": key}}))
        .collect();
    serde_json::to_string(&array).unwrap()
}

#[tokio::test]
async fn upload_inserts_then_updates() {
    let app = TestApp::spawn().await;

    let resp = app
        .raw(upload_request(
            WRITE,
            "application/json",
            entries(&["a", "b", "c"]),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let summary = body_json(resp).await;
    assert_eq!(summary, json!({"inserted": 3, "updated": 0}));

    // Same keys again: every entry lands on its existing row.
    let resp = app
        .raw(upload_request(
            WRITE,
            "application/json",
            entries(&["a", "b", "c"]),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"inserted": 0, "updated": 3}));
}

#[tokio::test]
async fn upload_larger_than_the_inflight_window() {
    let app = TestApp::spawn().await;
    let keys: Vec<String> = (0..25).map(|i| format!("key{i:02}")).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();

    let resp = app
        .raw(upload_request(WRITE, "application/json", entries(&key_refs)))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"inserted": 25, "updated": 0}));

    let resp = app
        .request(
            "GET",
            "/settings/entries?limit=100",
            None,
            READ,
            None,
        )
        .await;
    assert_eq!(body_json(resp).await["resultInfo"]["totalRecords"], 25);
}

#[tokio::test]
async fn upload_requires_json_content_type() {
    let app = TestApp::spawn().await;
    let resp = app
        .raw(upload_request(WRITE, "text/plain", entries(&["a"])))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // A parameterized JSON content type is accepted.
    let resp = app
        .raw(upload_request(
            WRITE,
            "application/json; charset=utf-8",
            entries(&["a"]),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn upload_rejects_malformed_documents() {
    let app = TestApp::spawn().await;

    for bad in [
        r#"{"scope": "ui", "key": "a", "value": 1}"#.to_string(),
        r#"[{"scope": "ui", "key": "a", "value": 1}"#.to_string(),
        r#"[{"scope": "ui"} {"key": "a"}]"#.to_string(),
        r#"[{"scope": "ui", "key": "a", "value": 1, "bogus": 2}]"#.to_string(),
    ] {
        let resp = app
            .raw(upload_request(WRITE, "application/json", bad.clone()))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body {bad}");
    }
}

#[tokio::test]
async fn upload_rejects_entries_with_ids() {
    let app = TestApp::spawn().await;
    let body = json!([{"id": Uuid::new_v4(), "scope": "ui", "key": "a", "value": 1}]).to_string();
    let resp = app
        .raw(upload_request(WRITE, "application/json", body))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_without_write_grant_is_forbidden() {
    let app = TestApp::spawn().await;
    let resp = app
        .raw(upload_request(READ, "application/json", entries(&["a"])))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Nothing was written.
    let resp = app
        .request("GET", "/settings/entries", None, READ, None)
        .await;
    assert_eq!(body_json(resp).await["resultInfo"]["totalRecords"], 0);
}

#[tokio::test]
async fn upload_empty_array_is_a_no_op() {
    let app = TestApp::spawn().await;
    let resp = app
        .raw(upload_request(WRITE, "application/json", "[]".to_string()))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"inserted": 0, "updated": 0}));
}
