//! Server configuration: environment, config file, and CLI overrides,
//! layered the way `openibank-api-server::config::ServerConfig` does.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub persistence: PersistenceSettings,
    #[serde(default)]
    pub lock: LockSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub abuse: AbuseSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub indexer: IndexerSettings,
    #[serde(default)]
    pub consent: ConsentSettings,
    #[serde(default)]
    pub launch: LaunchSettings,
    #[serde(default)]
    pub observability: ObservabilitySettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port).parse().expect("invalid socket address")
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// `persistence.backend ∈ {postgres, sqlite, file}`, mapped onto
/// `messaging_db::PersistenceMode`: `postgres` → `Strict`, `sqlite` →
/// `Embedded`, `file` → `File`. `File` is also what `Store::connect`
/// degrades to on its own if an `Embedded` connection can't be opened, so
/// picking `sqlite` here is always safe — a dev box with no write access to
/// the configured sqlite path still comes up, on the file backend, instead
/// of failing to start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_file_root")]
    pub file_root: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_url: default_database_url(),
            sqlite_path: default_sqlite_path(),
            file_root: default_file_root(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

impl PersistenceSettings {
    pub fn to_store_config(&self) -> messaging_db::StoreConfig {
        let mode = match self.backend.as_str() {
            "postgres" => messaging_db::PersistenceMode::Strict,
            "sqlite" => messaging_db::PersistenceMode::Embedded,
            _ => messaging_db::PersistenceMode::File,
        };
        messaging_db::StoreConfig {
            mode,
            database_url: self.database_url.clone(),
            sqlite_path: self.sqlite_path.clone(),
            file_root: self.file_root.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            acquire_timeout_secs: self.acquire_timeout_secs,
        }
    }
}

/// Redis connection for the distributed lock/rate backend. Absent entirely
/// in embedded/local deployments, in which case the lock backend degrades
/// to its in-memory fallback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockSettings {
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_rate_limit_max")]
    pub max: i64,
    #[serde(default = "default_rate_limit_window_secs")]
    pub window_secs: u64,
    #[serde(default)]
    pub strict: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max: default_rate_limit_max(),
            window_secs: default_rate_limit_window_secs(),
            strict: false,
        }
    }
}

impl RateLimitSettings {
    pub fn to_orchestrator_config(&self) -> messaging_orchestrator::RateLimitConfig {
        messaging_orchestrator::RateLimitConfig {
            max: self.max,
            window: Duration::from_secs(self.window_secs),
            strict: self.strict,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbuseSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_abuse_window_ms")]
    pub window_ms: i64,
    #[serde(default = "default_abuse_dim_max")]
    pub sender_max: i64,
    #[serde(default = "default_abuse_dim_max")]
    pub recipient_max: i64,
    #[serde(default = "default_abuse_ip_max")]
    pub ip_max: i64,
    #[serde(default = "default_abuse_ip_max")]
    pub device_max: i64,
    #[serde(default = "default_abuse_dim_weight")]
    pub sender_weight: f64,
    #[serde(default = "default_abuse_dim_weight")]
    pub recipient_weight: f64,
    #[serde(default = "default_abuse_dim_weight")]
    pub ip_weight: f64,
    #[serde(default = "default_abuse_dim_weight")]
    pub device_weight: f64,
    #[serde(default = "default_missing_ua_penalty")]
    pub missing_user_agent_penalty: f64,
    #[serde(default = "default_score_limit")]
    pub score_limit: f64,
    #[serde(default = "default_block_duration_ms")]
    pub block_duration_ms: i64,
}

impl Default for AbuseSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: default_abuse_window_ms(),
            sender_max: default_abuse_dim_max(),
            recipient_max: default_abuse_dim_max(),
            ip_max: default_abuse_ip_max(),
            device_max: default_abuse_ip_max(),
            sender_weight: default_abuse_dim_weight(),
            recipient_weight: default_abuse_dim_weight(),
            ip_weight: default_abuse_dim_weight(),
            device_weight: default_abuse_dim_weight(),
            missing_user_agent_penalty: default_missing_ua_penalty(),
            score_limit: default_score_limit(),
            block_duration_ms: default_block_duration_ms(),
        }
    }
}

impl AbuseSettings {
    pub fn to_engine_config(&self) -> messaging_abuse::AbuseEngineConfig {
        messaging_abuse::AbuseEngineConfig {
            enabled: self.enabled,
            window_ms: self.window_ms,
            sender_max: self.sender_max,
            recipient_max: self.recipient_max,
            ip_max: self.ip_max,
            device_max: self.device_max,
            sender_weight: self.sender_weight,
            recipient_weight: self.recipient_weight,
            ip_weight: self.ip_weight,
            device_weight: self.device_weight,
            missing_user_agent_penalty: self.missing_user_agent_penalty,
            score_limit: self.score_limit,
            block_duration_ms: self.block_duration_ms,
        }
    }
}

/// `worker.distributed ∈ {on, off}`; delivery poll interval/batch size/lock
/// TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    #[serde(default = "default_worker_id")]
    pub worker_id: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default)]
    pub distributed: bool,
    #[serde(default = "default_claim_lock_ttl_secs")]
    pub claim_lock_ttl_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_job: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            worker_id: default_worker_id(),
            batch_size: default_batch_size(),
            lease_secs: default_lease_secs(),
            tick_interval_secs: default_tick_interval_secs(),
            distributed: false,
            claim_lock_ttl_secs: default_claim_lock_ttl_secs(),
            max_attempts_per_job: default_max_attempts(),
        }
    }
}

impl WorkerSettings {
    pub fn to_worker_config(&self) -> messaging_worker::WorkerConfig {
        messaging_worker::WorkerConfig {
            worker_id: self.worker_id.clone(),
            batch_size: self.batch_size,
            lease: Duration::from_secs(self.lease_secs),
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            distributed: self.distributed,
            claim_lock_ttl: Duration::from_secs(self.claim_lock_ttl_secs),
        }
    }
}

/// Chain RPC URL + vault address, start block, token decimals. `enabled =
/// false` means no indexer tick loop runs at all — there is no in-tree
/// chain RPC client, so a deployment that flips this on must supply one via
/// `messaging_indexer::ChainRpc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    #[serde(default)]
    pub vault_address: String,
    #[serde(default)]
    pub configured_start_block: i64,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,
    #[serde(default)]
    pub distributed: bool,
    #[serde(default = "default_claim_lock_ttl_secs")]
    pub claim_lock_ttl_secs: u64,
    #[serde(default = "default_tick_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_job: u32,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            chain_id: default_chain_id(),
            vault_address: String::new(),
            configured_start_block: 0,
            token_decimals: default_token_decimals(),
            distributed: false,
            claim_lock_ttl_secs: default_claim_lock_ttl_secs(),
            poll_interval_secs: default_tick_interval_secs(),
            max_attempts_per_job: default_max_attempts(),
        }
    }
}

impl IndexerSettings {
    pub fn to_indexer_config(&self) -> messaging_indexer::IndexerConfig {
        messaging_indexer::IndexerConfig {
            chain_id: self.chain_id.clone(),
            vault_address: self.vault_address.clone(),
            configured_start_block: self.configured_start_block,
            token_decimals: self.token_decimals,
            distributed: self.distributed,
            claim_lock_ttl: Duration::from_secs(self.claim_lock_ttl_secs),
            max_attempts_per_job: self.max_attempts_per_job,
        }
    }
}

/// Legal TOS version currently required for consent to be current.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentSettings {
    #[serde(default = "default_legal_tos_version")]
    pub legal_tos_version: String,
}

impl Default for ConsentSettings {
    fn default() -> Self {
        Self { legal_tos_version: default_legal_tos_version() }
    }
}

/// Launch-readiness gate inputs: identity strict mode + provider allowlist,
/// key-rotation secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSettings {
    #[serde(default)]
    pub gate_enabled: bool,
    #[serde(default)]
    pub strict_mode: bool,
    #[serde(default)]
    pub block_on_warn: bool,
    #[serde(default = "default_weak_secret")]
    pub session_secret: String,
    #[serde(default = "default_weak_secret")]
    pub pii_secret: String,
    #[serde(default = "default_weak_secret")]
    pub smart_account_secret: String,
    #[serde(default)]
    pub identity_verifier_configured: bool,
    #[serde(default)]
    pub notification_providers_authenticated: Vec<String>,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            gate_enabled: false,
            strict_mode: false,
            block_on_warn: false,
            session_secret: default_weak_secret(),
            pii_secret: default_weak_secret(),
            smart_account_secret: default_weak_secret(),
            identity_verifier_configured: false,
            notification_providers_authenticated: Vec::new(),
        }
    }
}

/// Metrics/tracing enabled + tokens; alert thresholds and webhook URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    pub metrics_bearer_token: Option<String>,
    #[serde(default = "default_max_pending_jobs")]
    pub max_pending_jobs: i64,
    #[serde(default = "default_max_indexer_lag_blocks")]
    pub max_indexer_lag_blocks: i64,
    pub alert_webhook_url: Option<String>,
    pub alert_webhook_bearer_token: Option<String>,
    #[serde(default = "default_alert_interval_secs")]
    pub alert_interval_secs: u64,
    #[serde(default = "default_max_spans")]
    pub max_spans: usize,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            metrics_bearer_token: None,
            max_pending_jobs: default_max_pending_jobs(),
            max_indexer_lag_blocks: default_max_indexer_lag_blocks(),
            alert_webhook_url: None,
            alert_webhook_bearer_token: None,
            alert_interval_secs: default_alert_interval_secs(),
            max_spans: default_max_spans(),
        }
    }
}

impl ObservabilitySettings {
    pub fn to_alert_thresholds(&self) -> messaging_observability::AlertThresholds {
        messaging_observability::AlertThresholds {
            max_pending_jobs: self.max_pending_jobs,
            max_indexer_lag_blocks: self.max_indexer_lag_blocks,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

// =============================================================================
// Default functions
// =============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_shutdown_timeout() -> u64 {
    30
}
fn default_backend() -> String {
    "file".to_string()
}
fn default_database_url() -> String {
    "postgresql://localhost/messaging".to_string()
}
fn default_sqlite_path() -> String {
    "./messaging.sqlite3".to_string()
}
fn default_file_root() -> String {
    messaging_db::StoreConfig::default().file_root
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    1
}
fn default_acquire_timeout() -> u64 {
    10
}
fn default_rate_limit_max() -> i64 {
    20
}
fn default_rate_limit_window_secs() -> u64 {
    60
}
fn default_abuse_window_ms() -> i64 {
    60_000
}
fn default_abuse_dim_max() -> i64 {
    20
}
fn default_abuse_ip_max() -> i64 {
    30
}
fn default_abuse_dim_weight() -> f64 {
    1.0
}
fn default_missing_ua_penalty() -> f64 {
    2.0
}
fn default_score_limit() -> f64 {
    10.0
}
fn default_block_duration_ms() -> i64 {
    15 * 60_000
}
fn default_worker_id() -> String {
    "worker-1".to_string()
}
fn default_batch_size() -> i64 {
    25
}
fn default_lease_secs() -> u64 {
    30
}
fn default_tick_interval_secs() -> u64 {
    2
}
fn default_claim_lock_ttl_secs() -> u64 {
    10
}
fn default_max_attempts() -> u32 {
    5
}
fn default_chain_id() -> String {
    "base".to_string()
}
fn default_token_decimals() -> u32 {
    6
}
fn default_legal_tos_version() -> String {
    "v1".to_string()
}
fn default_weak_secret() -> String {
    "change-me-in-production".to_string()
}
fn default_max_pending_jobs() -> i64 {
    1000
}
fn default_max_indexer_lag_blocks() -> i64 {
    500
}
fn default_alert_interval_secs() -> u64 {
    60
}
fn default_max_spans() -> usize {
    2048
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_true() -> bool {
    true
}

// =============================================================================
// Loading
// =============================================================================

impl ServerConfig {
    /// Layers a config file (if given), `config/default` + `config/local`,
    /// then `MESSAGING__`-prefixed environment variables on top — same
    /// layering order as `openibank-api-server::config::ServerConfig::load`.
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();
        // 1. config file path argument, 2. config/default + config/local,
        // 3. MESSAGING__-prefixed env vars, each overriding the last.
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("MESSAGING").separator("__").try_parsing(true));

        let built = builder.build()?;
        let server_config: ServerConfig = built.try_deserialize().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "using default configuration - some settings may need adjustment");
            ServerConfig::default()
        });
        Ok(server_config)
    }

    pub fn development() -> Self {
        Self {
            server: ServerSettings::default(),
            persistence: PersistenceSettings::default(),
            lock: LockSettings::default(),
            rate_limit: RateLimitSettings::default(),
            abuse: AbuseSettings::default(),
            worker: WorkerSettings::default(),
            indexer: IndexerSettings::default(),
            consent: ConsentSettings::default(),
            launch: LaunchSettings::default(),
            observability: ObservabilitySettings::default(),
            logging: LoggingConfig { level: "debug".to_string(), format: "pretty".to_string() },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::development()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_config_defaults_to_file_backend() {
        let config = ServerConfig::development();
        assert_eq!(config.persistence.backend, "file");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn postgres_backend_maps_to_strict_persistence_mode() {
        let mut settings = PersistenceSettings::default();
        settings.backend = "postgres".to_string();
        assert_eq!(settings.to_store_config().mode, messaging_db::PersistenceMode::Strict);
    }
}
