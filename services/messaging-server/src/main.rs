//! Paid-inbox messaging backend server.
//!
//! Boots the HTTP API, runs the launch-readiness gate once at startup, and
//! drives the delivery worker and chain indexer tick loops alongside the
//! request server.
//!
//! ```bash
//! messaging-server
//! messaging-server --config /path/to/config.toml
//! MESSAGING__SERVER__PORT=8080 messaging-server
//! ```

mod config;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use tokio::signal;
use tokio::sync::Notify;

use messaging_api::{create_router, AppState};
use messaging_db::Store;
use messaging_indexer::{ChainIndexer, ChainRpc, MessagePaidEvent};
use messaging_launch::{evaluate, CheckStatus, LaunchConfig};
use messaging_lock::LockBackend;
use messaging_observability::{init_logging, LogFormat};
use messaging_types::Channel;
use messaging_worker::{DeliveryWorker, NotificationSink};

use crate::config::ServerConfig;

/// The paid-inbox messaging backend.
#[derive(Parser, Debug)]
#[command(name = "messaging-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, env = "MESSAGING_CONFIG")]
    config: Option<String>,

    /// Host to bind to
    #[arg(long, env = "MESSAGING_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "MESSAGING_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MESSAGING_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "MESSAGING_LOG_FORMAT")]
    log_format: Option<String>,

    /// Persistence connection URL override (postgres or sqlite path, depending on backend)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Redis connection URL for the distributed lock/rate backend
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Enforce the launch-readiness gate and abort boot if it fails
    #[arg(long, env = "MESSAGING_STRICT_LAUNCH")]
    strict_launch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut server_config = ServerConfig::load(args.config.as_deref())?;

    if let Some(host) = args.host {
        server_config.server.host = host;
    }
    if let Some(port) = args.port {
        server_config.server.port = port;
    }
    if let Some(database_url) = args.database_url {
        server_config.persistence.database_url = database_url;
    }
    if let Some(redis_url) = args.redis_url {
        server_config.lock.redis_url = Some(redis_url);
    }
    if let Some(level) = args.log_level {
        server_config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        server_config.logging.format = format;
    }
    if args.strict_launch {
        server_config.launch.gate_enabled = true;
        server_config.launch.strict_mode = true;
    }

    let log_format = match server_config.logging.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Pretty,
    };
    init_logging(&server_config.logging.level, log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting messaging server");

    let store = init_store(&server_config).await?;
    let lock = init_lock_backend(&server_config).await?;

    let launch_report = run_launch_gate(&server_config, &store, &lock).await?;

    let state = Arc::new(AppState::new(
        store,
        lock,
        server_config.consent.legal_tos_version.clone(),
        server_config.abuse.to_engine_config(),
        server_config.rate_limit.to_orchestrator_config(),
        server_config.observability.to_alert_thresholds(),
        server_config.worker.max_attempts_per_job,
        launch_report,
        server_config.observability.metrics_bearer_token.clone(),
    ));

    let mut background_tasks = Vec::new();
    background_tasks.push(spawn_delivery_worker(Arc::clone(&state), &server_config));
    if server_config.indexer.enabled {
        background_tasks.push(spawn_chain_indexer(Arc::clone(&state), &server_config));
    }
    if let Some(webhook_url) = server_config.observability.alert_webhook_url.clone() {
        background_tasks.push(spawn_alert_exporter(Arc::clone(&state), &server_config, webhook_url));
    }

    let app = create_router(state);
    let addr = server_config.server.socket_addr();
    tracing::info!(host = %server_config.server.host, port = server_config.server.port, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("stopping background tasks");
    for task in &background_tasks {
        task.stop.notify_one();
    }
    let shutdown_timeout = server_config.server.shutdown_timeout();
    for task in background_tasks {
        let _ = tokio::time::timeout(shutdown_timeout, task.handle).await;
    }

    tracing::info!("server shutdown complete");
    Ok(())
}

struct BackgroundTask {
    stop: Arc<Notify>,
    handle: tokio::task::JoinHandle<()>,
}

async fn init_store(config: &ServerConfig) -> anyhow::Result<Store> {
    let store_config = config.persistence.to_store_config();
    let store = Store::connect(&store_config).await?;
    let health = store.health_check().await;
    if !health.healthy {
        anyhow::bail!("persistence backend health check failed: {}", health.detail);
    }
    tracing::info!(mode = ?health.mode, "persistence backend healthy");
    Ok(store)
}

async fn init_lock_backend(config: &ServerConfig) -> anyhow::Result<LockBackend> {
    match &config.lock.redis_url {
        Some(url) => {
            tracing::info!("connecting to redis lock backend");
            let cfg = deadpool_redis::Config::from_url(url);
            let pool = cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
            Ok(LockBackend::new(Some(pool)))
        }
        None => {
            tracing::info!("no redis URL configured, lock backend running in-memory only");
            Ok(LockBackend::disabled())
        }
    }
}

/// Runs the launch-readiness gate. When gating is enabled
/// and the gate fails, boot aborts with the enumerated failing checks;
/// otherwise the computed report is carried forward and served read-only at
/// `/launch/readiness`.
async fn run_launch_gate(config: &ServerConfig, store: &Store, lock: &LockBackend) -> anyhow::Result<messaging_launch::LaunchReport> {
    let launch_config = LaunchConfig {
        strict_mode: config.launch.strict_mode,
        session_secret: config.launch.session_secret.clone(),
        pii_secret: config.launch.pii_secret.clone(),
        smart_account_secret: config.launch.smart_account_secret.clone(),
        persistence_backend_reachable: store.health_check().await.healthy,
        distributed_workers_enabled: config.worker.distributed,
        lock_backend_alive: lock.is_connected(),
        chain_indexer_enabled: config.indexer.enabled,
        chain_indexer_dependencies_valid: !config.indexer.enabled
            || (!config.indexer.vault_address.is_empty() && !config.indexer.chain_id.is_empty()),
        notification_providers_authenticated: config.launch.notification_providers_authenticated.clone(),
        identity_verifier_configured: config.launch.identity_verifier_configured,
        legal_terms_version: Some(config.consent.legal_tos_version.clone()),
        block_on_warn: config.launch.block_on_warn,
    };

    let report = evaluate(&launch_config);
    for check in &report.checks {
        match check.status {
            CheckStatus::Pass => tracing::debug!(key = %check.key, "launch check passed"),
            CheckStatus::Warn => tracing::warn!(key = %check.key, message = %check.message, "launch check warned"),
            CheckStatus::Fail => tracing::error!(key = %check.key, message = %check.message, "launch check failed"),
        }
    }

    if config.launch.gate_enabled && !report.ready {
        let failing: Vec<String> = report.checks.iter().filter(|c| c.status == CheckStatus::Fail).map(|c| c.key.clone()).collect();
        anyhow::bail!("launch readiness gate failed: {}", failing.join(", "));
    }

    Ok(report)
}

/// POSTs delivery payloads to a per-channel webhook URL, the only sink
/// implementation this binary carries: concrete provider clients are an
/// external collaborator behind the `NotificationSink` trait.
struct WebhookNotificationSink {
    client: reqwest::Client,
    timeout: Duration,
    endpoints: HashMap<Channel, String>,
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn send(&self, channel: Channel, destination: &str, payload: &str) -> Result<(), String> {
        let Some(endpoint) = self.endpoints.get(&channel) else {
            return Err(format!("notification_provider_unavailable:{}", channel.as_str()));
        };
        let body = serde_json::json!({ "destination": destination, "payload": payload });
        let response = self.client.post(endpoint).timeout(self.timeout).json(&body).send().await;
        match response {
            Ok(r) if r.status().is_success() => Ok(()),
            Ok(r) => Err(format!("provider_status_{}", r.status().as_u16())),
            Err(e) => Err(e.to_string()),
        }
    }
}

fn spawn_delivery_worker(state: Arc<AppState>, config: &ServerConfig) -> BackgroundTask {
    let worker_config = config.worker.to_worker_config();
    let sink: Arc<dyn NotificationSink> = Arc::new(WebhookNotificationSink {
        client: reqwest::Client::new(),
        timeout: Duration::from_secs(10),
        endpoints: HashMap::new(),
    });
    let stop = Arc::new(Notify::new());
    let stop_for_task = Arc::clone(&stop);
    let handle = tokio::spawn(async move {
        let worker = DeliveryWorker::new(&state.store, &state.lock, &state.metrics, sink, worker_config);
        worker.run(&stop_for_task).await;
    });
    BackgroundTask { stop, handle }
}

/// Always reports the chain RPC as unavailable; enabling `indexer.enabled`
/// without wiring a concrete `ChainRpc` simply idles the cycle instead of
/// indexing anything — the chain client itself is an external collaborator
/// behind the `ChainRpc` trait.
struct UnconfiguredChainRpc;

#[async_trait]
impl ChainRpc for UnconfiguredChainRpc {
    async fn latest_block(&self) -> Result<i64, String> {
        Err("no chain RPC client configured for this deployment".into())
    }

    async fn fetch_message_paid_events(&self, _from_block: i64, _to_block: i64) -> Result<Vec<MessagePaidEvent>, String> {
        Err("no chain RPC client configured for this deployment".into())
    }
}

fn spawn_chain_indexer(state: Arc<AppState>, config: &ServerConfig) -> BackgroundTask {
    let indexer_config = config.indexer.to_indexer_config();
    let poll_interval = Duration::from_secs(config.indexer.poll_interval_secs);
    let stop = Arc::new(Notify::new());
    let stop_for_task = Arc::clone(&stop);
    let handle = tokio::spawn(async move {
        let rpc = UnconfiguredChainRpc;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {
                    let indexer = ChainIndexer::new(&state.store, &state.lock, &state.consent, &state.metrics, &rpc, indexer_config.clone());
                    if let Err(e) = indexer.run_cycle().await {
                        tracing::warn!(error = %e, "chain indexer cycle failed");
                    }
                }
                _ = stop_for_task.notified() => {
                    tracing::info!("chain indexer stopping");
                    break;
                }
            }
        }
    });
    BackgroundTask { stop, handle }
}

/// Periodically builds a health snapshot and forwards pending alerts to the
/// configured webhook; the send is skipped entirely when no alerts are
/// pending, enforced inside `AlertWebhook::send`.
fn spawn_alert_exporter(state: Arc<AppState>, config: &ServerConfig, webhook_url: String) -> BackgroundTask {
    let interval = Duration::from_secs(config.observability.alert_interval_secs);
    let thresholds = config.observability.to_alert_thresholds();
    let webhook = messaging_observability::AlertWebhook {
        endpoint: webhook_url,
        bearer_token: config.observability.alert_webhook_bearer_token.clone(),
        timeout: Duration::from_secs(10),
    };
    let stop = Arc::new(Notify::new());
    let stop_for_task = Arc::clone(&stop);
    let handle = tokio::spawn(async move {
        let client = reqwest::Client::new();
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let stats = match state.store.delivery_job_stats().await {
                        Ok(stats) => messaging_observability::health::DeliveryJobStats {
                            pending: stats.pending,
                            processing: stats.processing,
                            done: stats.done,
                            failed: stats.failed,
                        },
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to read delivery job stats for alerting");
                            continue;
                        }
                    };
                    let indexer_lag = state.metrics.gauges_by_label("indexer_lag_blocks", "chain_key");
                    let snapshot = messaging_observability::health::build_snapshot(stats, indexer_lag, &thresholds);
                    webhook.send(&client, &snapshot.alerts).await;
                }
                _ = stop_for_task.notified() => {
                    tracing::info!("alert exporter stopping");
                    break;
                }
            }
        }
    });
    BackgroundTask { stop, handle }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, initiating graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, initiating graceful shutdown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_port_override() {
        let args = Args::parse_from(["messaging-server", "--port", "8080"]);
        assert_eq!(args.port, Some(8080));
    }

    #[test]
    fn development_config_has_no_redis_by_default() {
        let config = ServerConfig::development();
        assert!(config.lock.redis_url.is_none());
    }
}
