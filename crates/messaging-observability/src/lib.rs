//! Observability fabric: metrics registries, a bounded span
//! buffer, logging init, and a health/alert snapshot — all owned structs
//! passed explicitly rather than globals.

pub mod health;
pub mod logging;
pub mod registry;
pub mod spans;

pub use health::{Alert, AlertThresholds, AlertWebhook, DeliveryJobStats, HealthSnapshot};
pub use logging::{init_logging, LogFormat};
pub use registry::{Labels, Registry};
pub use spans::{export_spans, Span, SpanBuffer, SpanStatus};
