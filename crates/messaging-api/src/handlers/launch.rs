//! Launch readiness and compliance read-only endpoints.

use axum::extract::State;
use axum::Json;

use messaging_launch::LaunchReport;

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/launch/readiness",
    responses((status = 200, description = "launch readiness checks computed at boot")),
    tag = "launch",
)]
pub async fn readiness(State(state): State<std::sync::Arc<AppState>>) -> Json<LaunchReport> {
    Json(state.launch_report.clone())
}
