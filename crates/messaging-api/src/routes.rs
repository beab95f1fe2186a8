//! Route table wiring the HTTP surface onto the handlers.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{channel, inbox, launch, observability, pricing, send};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/send", post(send::send))
        .route("/inbox", get(inbox::inbox))
        .route("/pricing", get(pricing::pricing_get).put(pricing::pricing_set))
        .route("/channels/:channel/connect", post(channel::channel_connect))
        .route("/channels/:channel/disconnect", post(channel::channel_disconnect))
        .route("/channels/:channel/status", get(channel::channel_status))
        .route("/metrics", get(observability::metrics))
        .route("/snapshot", get(observability::snapshot))
        .route("/alerts", get(observability::alerts))
        .route("/alert-hook", post(observability::alert_hook))
        .route("/launch/readiness", get(launch::readiness))
        .merge(swagger_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Swagger UI mounted alongside the API, same as `openibank-api::routes::swagger_routes`.
fn swagger_routes() -> Router<Arc<AppState>> {
    use utoipa::OpenApi;
    use utoipa_swagger_ui::SwaggerUi;

    use crate::openapi::ApiDoc;

    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
