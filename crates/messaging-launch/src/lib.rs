//! Launch-readiness gate, run synchronously at boot when gating is enabled.
//!
//! Grounded on `openibank-api-server::main::validate_config`'s fail-fast
//! pattern (`anyhow::bail!` on a bad JWT secret / TLS config) generalized
//! into a structured, enumerable check list instead of ad hoc bails — the
//! caller (`services/messaging-server::main`) decides what to do with a
//! `fail`/`warn`, rather than this crate aborting the process itself.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessCheck {
    pub key: String,
    pub status: CheckStatus,
    pub message: String,
    pub evidence: Option<String>,
}

impl ReadinessCheck {
    fn pass(key: &str, message: impl Into<String>) -> Self {
        Self { key: key.into(), status: CheckStatus::Pass, message: message.into(), evidence: None }
    }

    fn warn(key: &str, message: impl Into<String>, evidence: impl Into<String>) -> Self {
        Self { key: key.into(), status: CheckStatus::Warn, message: message.into(), evidence: Some(evidence.into()) }
    }

    fn fail(key: &str, message: impl Into<String>, evidence: impl Into<String>) -> Self {
        Self { key: key.into(), status: CheckStatus::Fail, message: message.into(), evidence: Some(evidence.into()) }
    }
}

/// The facts the gate evaluates. A plain struct, not environment lookups
/// scattered through the check functions, so tests build fixtures directly.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub strict_mode: bool,
    pub session_secret: String,
    pub pii_secret: String,
    pub smart_account_secret: String,
    pub persistence_backend_reachable: bool,
    pub distributed_workers_enabled: bool,
    pub lock_backend_alive: bool,
    pub chain_indexer_enabled: bool,
    pub chain_indexer_dependencies_valid: bool,
    pub notification_providers_authenticated: Vec<String>,
    pub identity_verifier_configured: bool,
    pub legal_terms_version: Option<String>,
    pub block_on_warn: bool,
}

const MIN_SECRET_LEN: usize = 24;
const DEFAULT_SECRET_MARKERS: [&str; 2] = ["change-me", "default"];

fn is_weak_secret(secret: &str) -> bool {
    secret.len() < MIN_SECRET_LEN || DEFAULT_SECRET_MARKERS.iter().any(|m| secret.contains(m))
}

fn check_secret(key: &str, label: &str, secret: &str) -> ReadinessCheck {
    if is_weak_secret(secret) {
        ReadinessCheck::fail(key, format!("{label} secret is default or too short"), format!("len={}", secret.len()))
    } else {
        ReadinessCheck::pass(key, format!("{label} secret rotated"))
    }
}

pub fn run_checks(config: &LaunchConfig) -> Vec<ReadinessCheck> {
    let mut checks = vec![
        check_secret("key_rotation.session", "session", &config.session_secret),
        check_secret("key_rotation.pii", "pii", &config.pii_secret),
        check_secret("key_rotation.smart_account", "smart account", &config.smart_account_secret),
    ];

    checks.push(if config.persistence_backend_reachable {
        ReadinessCheck::pass("persistence_backend", "store reachable")
    } else if config.strict_mode {
        ReadinessCheck::fail("persistence_backend", "store unreachable in strict mode", "health_check=false")
    } else {
        ReadinessCheck::warn("persistence_backend", "store unreachable", "health_check=false")
    });

    if config.distributed_workers_enabled {
        checks.push(if config.lock_backend_alive {
            ReadinessCheck::pass("lock_backend", "lock backend liveness probe passed")
        } else {
            ReadinessCheck::fail("lock_backend", "distributed workers require a live lock backend", "liveness_probe=false")
        });
    }

    if config.chain_indexer_enabled {
        checks.push(if config.chain_indexer_dependencies_valid {
            ReadinessCheck::pass("chain_indexer", "chain indexer dependencies valid")
        } else {
            ReadinessCheck::fail("chain_indexer", "chain indexer enabled with invalid dependencies", "dependencies_valid=false")
        });
    }

    checks.push(if !config.notification_providers_authenticated.is_empty() {
        ReadinessCheck::pass("notification_providers", format!("{} provider(s) authenticated", config.notification_providers_authenticated.len()))
    } else if config.strict_mode {
        ReadinessCheck::fail("notification_providers", "strict mode requires at least one authenticated provider", "providers=0")
    } else {
        ReadinessCheck::warn("notification_providers", "no notification providers authenticated", "providers=0")
    });

    checks.push(if config.identity_verifier_configured {
        ReadinessCheck::pass("identity_verification", "identity verifier configured")
    } else if config.strict_mode {
        ReadinessCheck::fail("identity_verification", "strict mode requires a remote verifier or local equivalent", "verifier=none")
    } else {
        ReadinessCheck::warn("identity_verification", "no identity verifier configured", "verifier=none")
    });

    checks.push(match &config.legal_terms_version {
        Some(v) if !v.is_empty() => ReadinessCheck::pass("legal_terms", format!("terms version {v} set")),
        _ => ReadinessCheck::fail("legal_terms", "legal terms version not set", "version=none"),
    });

    checks
}

pub fn launch_ready(checks: &[ReadinessCheck], block_on_warn: bool) -> bool {
    let fail_count = checks.iter().filter(|c| c.status == CheckStatus::Fail).count();
    let warn_count = checks.iter().filter(|c| c.status == CheckStatus::Warn).count();
    fail_count == 0 && (!block_on_warn || warn_count == 0)
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchReport {
    pub checks: Vec<ReadinessCheck>,
    pub ready: bool,
}

pub fn evaluate(config: &LaunchConfig) -> LaunchReport {
    let checks = run_checks(config);
    let ready = launch_ready(&checks, config.block_on_warn);
    LaunchReport { checks, ready }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> LaunchConfig {
        LaunchConfig {
            strict_mode: true,
            session_secret: "a-rotated-secret-that-is-long-enough".into(),
            pii_secret: "a-rotated-secret-that-is-long-enough".into(),
            smart_account_secret: "a-rotated-secret-that-is-long-enough".into(),
            persistence_backend_reachable: true,
            distributed_workers_enabled: true,
            lock_backend_alive: true,
            chain_indexer_enabled: false,
            chain_indexer_dependencies_valid: true,
            notification_providers_authenticated: vec!["whatsapp".into()],
            identity_verifier_configured: true,
            legal_terms_version: Some("2026-01-01".into()),
            block_on_warn: false,
        }
    }

    #[test]
    fn fully_healthy_config_is_ready() {
        let report = evaluate(&base_config());
        assert!(report.ready, "{:?}", report.checks);
    }

    #[test]
    fn default_secret_fails_the_gate() {
        let mut config = base_config();
        config.session_secret = "change-me-in-production".into();
        let report = evaluate(&config);
        assert!(!report.ready);
    }

    #[test]
    fn distributed_mode_without_lock_backend_fails() {
        let mut config = base_config();
        config.lock_backend_alive = false;
        let report = evaluate(&config);
        assert!(!report.ready);
    }

    #[test]
    fn warn_only_blocks_when_configured_to() {
        let mut config = base_config();
        config.strict_mode = false;
        config.notification_providers_authenticated = vec![];
        let lenient = evaluate(&config);
        assert!(lenient.ready);

        config.block_on_warn = true;
        let strict_on_warn = evaluate(&config);
        assert!(!strict_on_warn.ready);
    }
}
