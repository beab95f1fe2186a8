//! Thin HTTP glue for the paid-inbox messaging backend: an
//! axum router that deserializes wire DTOs, authenticates the caller off a
//! trusted header, and delegates to `messaging-orchestrator` / the
//! subsystem crates for everything else. No business logic lives here.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use routes::create_router;
pub use state::AppState;
