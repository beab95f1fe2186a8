//! `/metrics`, `/snapshot`, `/alerts`, `/alert-hook`.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::Value;

use messaging_observability::health::{build_snapshot, Alert, HealthSnapshot};
use messaging_types::MessagingError;

use crate::dto::AlertHookAck;
use crate::error::ApiError;
use crate::state::AppState;

/// Prometheus text exposition. An optional bearer token gates access; when
/// `metrics_bearer_token` is `None` the endpoint is open.
pub async fn metrics(
    State(state): State<std::sync::Arc<AppState>>,
    headers: HeaderMap,
) -> Result<String, ApiError> {
    check_bearer(&headers, state.metrics_bearer_token.as_deref())?;
    Ok(state.metrics.render_prometheus())
}

fn check_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected else { return Ok(()) };
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::from(MessagingError::AuthRequired))
    }
}

/// Delivery-job and indexer-lag snapshot. Lag is read back from the shared
/// metrics registry's `indexer_lag_blocks` gauge, keyed by `chain_key` — the
/// indexer sets it each cycle, this HTTP layer only reads it.
#[utoipa::path(
    get,
    path = "/snapshot",
    responses((status = 200, description = "delivery and indexer snapshot")),
    tag = "observability",
)]
pub async fn snapshot(State(state): State<std::sync::Arc<AppState>>) -> Result<Json<HealthSnapshot>, ApiError> {
    let stats = state.store.delivery_job_stats().await.map_err(MessagingError::from)?;
    let stats = messaging_observability::health::DeliveryJobStats {
        pending: stats.pending,
        processing: stats.processing,
        done: stats.done,
        failed: stats.failed,
    };
    let indexer_lag = state.metrics.gauges_by_label("indexer_lag_blocks", "chain_key");
    Ok(Json(build_snapshot(stats, indexer_lag, &state.alert_thresholds)))
}

/// Just the `alerts` slice of the same snapshot, for callers that only want
/// to poll for active alerts.
#[utoipa::path(
    get,
    path = "/alerts",
    responses((status = 200, description = "active alerts")),
    tag = "observability",
)]
pub async fn alerts(State(state): State<std::sync::Arc<AppState>>) -> Result<Json<Vec<Alert>>, ApiError> {
    let Json(snapshot) = snapshot(State(state)).await?;
    Ok(Json(snapshot.alerts))
}

/// `alert-hook`. Accepts whatever an
/// external alertmanager-style caller posts and acknowledges receipt; this
/// backend only emits alerts (via `AlertWebhook::send`), it never consumes
/// them, so there's nothing to act on beyond recording that the call landed.
#[utoipa::path(
    post,
    path = "/alert-hook",
    responses((status = 200, description = "webhook payload acknowledged", body = AlertHookAck)),
    tag = "observability",
)]
pub async fn alert_hook(Json(body): Json<Value>) -> Json<AlertHookAck> {
    let received = match &body {
        Value::Array(items) => items.len(),
        Value::Null => 0,
        _ => 1,
    };
    tracing::info!(received, "alert webhook payload received");
    Json(AlertHookAck { received })
}
