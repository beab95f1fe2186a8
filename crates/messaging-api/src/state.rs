//! Shared application state: an injected config struct, not a global —
//! every handler borrows through this, nothing reaches for a
//! process-wide static.

use messaging_abuse::AbuseEngineConfig;
use messaging_consent::{ConsentConfig, ConsentGate};
use messaging_db::Store;
use messaging_launch::LaunchReport;
use messaging_lock::LockBackend;
use messaging_observability::health::AlertThresholds;
use messaging_observability::Registry;
use messaging_orchestrator::RateLimitConfig;

/// Everything a handler needs to construct a `SendOrchestrator`,
/// `AbuseEngine`, and `AuditLedger` for the duration of one request — these
/// are cheap reference-holding structs, rebuilt per request rather than
/// cached, the same way `openibank-api::state::AppState` hands out a
/// connection pool rather than a live transaction.
pub struct AppState {
    pub store: Store,
    pub lock: LockBackend,
    pub consent: ConsentGate,
    pub metrics: Registry,
    pub abuse_config: AbuseEngineConfig,
    pub rate_limit: RateLimitConfig,
    pub alert_thresholds: AlertThresholds,
    pub max_attempts_per_job: u32,
    /// Computed once at boot by `services/messaging-server`; read-only after
    /// that — the launch gate runs synchronously at boot, not per-request.
    pub launch_report: LaunchReport,
    /// Gates `/metrics` when set.
    pub metrics_bearer_token: Option<String>,
}

impl AppState {
    pub fn new(
        store: Store,
        lock: LockBackend,
        legal_tos_version: impl Into<String>,
        abuse_config: AbuseEngineConfig,
        rate_limit: RateLimitConfig,
        alert_thresholds: AlertThresholds,
        max_attempts_per_job: u32,
        launch_report: LaunchReport,
        metrics_bearer_token: Option<String>,
    ) -> Self {
        Self {
            store,
            lock,
            consent: ConsentGate::new(ConsentConfig::new(legal_tos_version)),
            metrics: Registry::new(),
            abuse_config,
            rate_limit,
            alert_thresholds,
            max_attempts_per_job,
            launch_report,
            metrics_bearer_token,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use messaging_db::{PersistenceMode, StoreConfig};

    pub async fn state() -> AppState {
        let root = std::env::temp_dir().join(format!("messaging-api-test-{}", uuid::Uuid::new_v4()));
        let config = StoreConfig {
            mode: PersistenceMode::File,
            file_root: root.to_string_lossy().into_owned(),
            ..StoreConfig::default()
        };
        let store = Store::connect(&config).await.unwrap();
        AppState::new(
            store,
            LockBackend::disabled(),
            "v1",
            AbuseEngineConfig::default(),
            RateLimitConfig::default(),
            AlertThresholds::default(),
            5,
            LaunchReport { checks: vec![], ready: true },
            None,
        )
    }
}
