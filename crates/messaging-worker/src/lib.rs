//! Delivery worker tick loop.
//!
//! A single tick reads queue gauges, optionally takes the cluster-wide
//! claim mutex, claims a batch of due jobs, and hands each to an injected
//! [`NotificationSink`]. The run loop itself follows the
//! `shutdown_signal` idiom (`tokio::select!` racing ctrl_c/SIGTERM), traded
//! here for a `tokio::sync::Notify`-gated stop signal since this crate is a
//! library, not the binary that owns the OS signal handlers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tokio::sync::Notify;

use messaging_db::Store;
use messaging_lock::LockBackend;
use messaging_observability::Registry;
use messaging_types::{Channel, DeliveryJob, DeliveryJobStatus};

/// The notification sink a channel connects to. No real WhatsApp/X client
/// ships here — concrete implementations
/// live wherever the deployment wires in its provider credentials.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, channel: Channel, destination: &str, payload: &str) -> Result<(), String>;
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub batch_size: i64,
    pub lease: Duration,
    pub tick_interval: Duration,
    pub distributed: bool,
    pub claim_lock_ttl: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker-1".into(),
            batch_size: 25,
            lease: Duration::from_secs(30),
            tick_interval: Duration::from_secs(2),
            distributed: false,
            claim_lock_ttl: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TickReport {
    pub claimed: usize,
    pub done: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub lock_skipped: bool,
}

pub struct DeliveryWorker<'s> {
    store: &'s Store,
    lock: &'s LockBackend,
    metrics: &'s Registry,
    sink: Arc<dyn NotificationSink>,
    config: WorkerConfig,
}

const CLAIM_LOCK_KEY: &str = "delivery-worker-claim";

impl<'s> DeliveryWorker<'s> {
    pub fn new(store: &'s Store, lock: &'s LockBackend, metrics: &'s Registry, sink: Arc<dyn NotificationSink>, config: WorkerConfig) -> Self {
        Self { store, lock, metrics, sink, config }
    }

    /// One tick of the claim → deliver → ack/retry loop.
    pub async fn tick(&self) -> messaging_db::DbResult<TickReport> {
        // Step 1: aggregated job stats as gauges.
        let stats = self.store.delivery_job_stats().await?;
        self.metrics.set_gauge("delivery_jobs_pending", &[], stats.pending as f64);
        self.metrics.set_gauge("delivery_jobs_processing", &[], stats.processing as f64);
        self.metrics.set_gauge("delivery_jobs_done", &[], stats.done as f64);
        self.metrics.set_gauge("delivery_jobs_failed", &[], stats.failed as f64);

        // Step 2: cluster-wide claim mutex in distributed mode.
        let mut token = None;
        if self.config.distributed {
            token = self
                .lock
                .try_acquire(CLAIM_LOCK_KEY, self.config.claim_lock_ttl)
                .await
                .map_err(|e| messaging_db::DbError::Connection(e.to_string()))?;
            if token.is_none() {
                return Ok(TickReport { lock_skipped: true, ..TickReport::default() });
            }
        }

        // Step 3: claim due jobs.
        let jobs = self
            .store
            .claim_due_jobs(&self.config.worker_id, self.config.batch_size, ChronoDuration::from_std(self.config.lease).unwrap_or(ChronoDuration::seconds(30)))
            .await?;

        let mut report = TickReport { claimed: jobs.len(), ..TickReport::default() };

        // Step 4: hand each job to the sink, apply done/retry/dead-letter policy.
        for job in &jobs {
            match self.sink.send(job.channel, &job.destination, &job.payload).await {
                Ok(()) => {
                    self.store.mark_job_done(job.id).await?;
                    self.metrics.incr_counter("delivery_jobs_done_total", &[], 1.0);
                    report.done += 1;
                }
                Err(reason) => {
                    let final_status = self.apply_failure(job, &reason).await?;
                    match final_status {
                        DeliveryJobStatus::Failed => report.dead_lettered += 1,
                        _ => report.retried += 1,
                    }
                }
            }
        }

        if let Some(token) = token {
            let _ = self.lock.release(CLAIM_LOCK_KEY, &token).await;
        }

        Ok(report)
    }

    /// Applies the retry/dead-letter policy: the error text is
    /// prefixed with `max_retries_reached:` only once this attempt exhausts
    /// `maxAttempts`, so the prefix reflects the final dead-letter write
    /// rather than being guessed at ahead of the store's own check.
    async fn apply_failure(&self, job: &DeliveryJob, reason: &str) -> messaging_db::DbResult<DeliveryJobStatus> {
        let next_attempt = job.attempts + 1;
        let error_text = if next_attempt >= job.max_attempts {
            format!("max_retries_reached:{reason}")
        } else {
            reason.to_string()
        };
        let status = self.store.retry_or_deadletter_job(job.id, &error_text).await?;
        self.metrics.incr_counter(
            "delivery_jobs_failed_total",
            &[("dead_letter".into(), (status == DeliveryJobStatus::Failed).to_string())],
            1.0,
        );
        Ok(status)
    }

    /// Runs ticks on `tick_interval` until `stop` is notified, mirroring the
    /// `tokio::select!` ctrl_c/SIGTERM race with a library-level
    /// stop signal in place of direct OS signal handling.
    pub async fn run(&self, stop: &Notify) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.tick_interval) => {
                    if let Err(e) = self.tick().await {
                        tracing::warn!(error = %e, "delivery worker tick failed");
                    }
                }
                _ = stop.notified() => {
                    tracing::info!("delivery worker stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging_db::{PersistenceMode, StoreConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysOk;
    #[async_trait]
    impl NotificationSink for AlwaysOk {
        async fn send(&self, _channel: Channel, _destination: &str, _payload: &str) -> Result<(), String> {
            Ok(())
        }
    }

    struct AlwaysFail(AtomicUsize);
    #[async_trait]
    impl NotificationSink for AlwaysFail {
        async fn send(&self, _channel: Channel, _destination: &str, _payload: &str) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err("provider_unreachable".into())
        }
    }

    async fn file_store() -> Store {
        let root = std::env::temp_dir().join(format!("messaging-worker-test-{}", uuid::Uuid::new_v4()));
        let config = StoreConfig {
            mode: PersistenceMode::File,
            file_root: root.to_string_lossy().into_owned(),
            ..StoreConfig::default()
        };
        Store::connect(&config).await.unwrap()
    }

    #[tokio::test]
    async fn claimed_job_marked_done_on_success() {
        let store = file_store().await;
        let user = store.create_user("u1", "0x1", 0).await.unwrap();
        let message = store.create_chain_message(&user.id, &user.id, "hash1", 100, "tx1").await.unwrap();
        store
            .enqueue_delivery_job(message.id, &user.id, Channel::WhatsApp, "+15555550100", "{}", 5)
            .await
            .unwrap();

        let lock = LockBackend::disabled();
        let metrics = Registry::new();
        let worker = DeliveryWorker::new(&store, &lock, &metrics, Arc::new(AlwaysOk), WorkerConfig::default());
        let report = worker.tick().await.unwrap();

        assert_eq!(report.claimed, 1);
        assert_eq!(report.done, 1);
        let stats = store.delivery_job_stats().await.unwrap();
        assert_eq!(stats.done, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn failure_below_max_attempts_reschedules_without_dead_letter_prefix() {
        let store = file_store().await;
        let user = store.create_user("u2", "0x2", 0).await.unwrap();
        let message = store.create_chain_message(&user.id, &user.id, "hash2", 100, "tx2").await.unwrap();
        store
            .enqueue_delivery_job(message.id, &user.id, Channel::X, "@handle", "{}", 5)
            .await
            .unwrap();

        let lock = LockBackend::disabled();
        let metrics = Registry::new();
        let worker = DeliveryWorker::new(&store, &lock, &metrics, Arc::new(AlwaysFail(AtomicUsize::new(0))), WorkerConfig::default());
        let report = worker.tick().await.unwrap();

        assert_eq!(report.retried, 1);
        assert_eq!(report.dead_lettered, 0);
        let stats = store.delivery_job_stats().await.unwrap();
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn exhausting_max_attempts_dead_letters_with_prefixed_reason() {
        let store = file_store().await;
        let user = store.create_user("u3", "0x3", 0).await.unwrap();
        let message = store.create_chain_message(&user.id, &user.id, "hash3", 100, "tx3").await.unwrap();
        store
            .enqueue_delivery_job(message.id, &user.id, Channel::WhatsApp, "+15555550199", "{}", 1)
            .await
            .unwrap();

        let lock = LockBackend::disabled();
        let metrics = Registry::new();
        let worker = DeliveryWorker::new(&store, &lock, &metrics, Arc::new(AlwaysFail(AtomicUsize::new(0))), WorkerConfig::default());
        let report = worker.tick().await.unwrap();

        assert_eq!(report.dead_lettered, 1);
        let stats = store.delivery_job_stats().await.unwrap();
        assert_eq!(stats.failed, 1);
    }
}
