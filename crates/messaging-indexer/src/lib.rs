//! Chain indexer cycle.
//!
//! Mirrors `messaging-worker`'s tick shape (gauge update → optional cluster
//! mutex → do the work → release) but keyed per `chainKey` instead of a
//! single global claim, and with a checkpoint that only advances after the
//! whole cycle succeeds — any failure mid-cycle must leave the checkpoint
//! untouched so the next cycle safely replays the same window; every
//! per-event write here is idempotent, which is what makes that replay safe.

use std::time::Duration;

use async_trait::async_trait;

use messaging_consent::ConsentGate;
use messaging_db::Store;
use messaging_lock::LockBackend;
use messaging_observability::Registry;
use messaging_types::{Channel, ChainEvent};

/// A single decoded `MessagePaid` log. The event's `content_hash` is the
/// application-level key tying it back to a `Message` row — whatever memo
/// or calldata field the chain contract uses to carry it is the concrete
/// client's concern, not this crate's. `channel`, when the event names one,
/// restricts delivery fan-out to that single channel the same way an
/// explicit `SendRequest.channel` does for a direct send.
#[derive(Debug, Clone)]
pub struct MessagePaidEvent {
    pub tx_hash: String,
    pub log_index: i64,
    pub block_number: i64,
    pub block_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub amount_raw: String,
    pub fee_raw: String,
    pub content_hash: String,
    pub nonce: String,
    pub channel: Option<Channel>,
}

/// The chain dependency this crate needs, injected so it never links a
/// concrete RPC client.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn latest_block(&self) -> Result<i64, String>;
    async fn fetch_message_paid_events(&self, from_block: i64, to_block: i64) -> Result<Vec<MessagePaidEvent>, String>;
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chain_id: String,
    pub vault_address: String,
    pub configured_start_block: i64,
    pub token_decimals: u32,
    pub distributed: bool,
    pub claim_lock_ttl: Duration,
    pub max_attempts_per_job: u32,
}

impl IndexerConfig {
    /// `chainId + ":" + lowercase(vaultAddress)` — the stable key a
    /// checkpoint and every gauge this indexer emits are scoped under.
    pub fn chain_key(&self) -> String {
        format!("{}:{}", self.chain_id, self.vault_address.to_lowercase())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CycleReport {
    pub lock_skipped: bool,
    pub rpc_unavailable: bool,
    pub up_to_date: bool,
    pub events_processed: usize,
    pub events_skipped_unresolved: usize,
}

pub struct ChainIndexer<'s> {
    store: &'s Store,
    lock: &'s LockBackend,
    consent: &'s ConsentGate,
    metrics: &'s Registry,
    rpc: &'s dyn ChainRpc,
    config: IndexerConfig,
}

/// Normalizes a raw on-chain integer string to the application's integer
/// unit using `tokenDecimals` — floor division, same rounding convention as
/// `messaging-core::pricing`'s return-discount math.
fn normalize_amount(amount_raw: &str, token_decimals: u32) -> i64 {
    let raw: i128 = amount_raw.parse().unwrap_or(0);
    let divisor = 10i128.pow(token_decimals);
    (raw / divisor.max(1)) as i64
}

impl<'s> ChainIndexer<'s> {
    pub fn new(store: &'s Store, lock: &'s LockBackend, consent: &'s ConsentGate, metrics: &'s Registry, rpc: &'s dyn ChainRpc, config: IndexerConfig) -> Self {
        Self { store, lock, consent, metrics, rpc, config }
    }

    pub async fn run_cycle(&self) -> messaging_db::DbResult<CycleReport> {
        let chain_key = self.config.chain_key();
        let lock_key = format!("indexer:{chain_key}");

        // Step 1: cluster-wide mutex in distributed mode.
        let mut token = None;
        if self.config.distributed {
            token = self
                .lock
                .try_acquire(&lock_key, self.config.claim_lock_ttl)
                .await
                .map_err(|e| messaging_db::DbError::Connection(e.to_string()))?;
            if token.is_none() {
                self.metrics.incr_counter("indexer_cycle_skipped_total", &[("chain_key".into(), chain_key)], 1.0);
                return Ok(CycleReport { lock_skipped: true, ..CycleReport::default() });
            }
        }

        let report = self.materialize(&chain_key).await;

        if let Some(token) = &token {
            let _ = self.lock.release(&lock_key, token).await;
        }

        report
    }

    async fn materialize(&self, chain_key: &str) -> messaging_db::DbResult<CycleReport> {
        // Step 2: latest block.
        let latest_block = match self.rpc.latest_block().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(chain_key, error = %e, "chain RPC unavailable, skipping cycle");
                return Ok(CycleReport { rpc_unavailable: true, ..CycleReport::default() });
            }
        };

        // Step 3: checkpoint and range.
        let checkpoint = self.store.get_checkpoint(chain_key).await?;
        let from_block = self.config.configured_start_block.max(checkpoint.map(|c| c.last_indexed_block + 1).unwrap_or(self.config.configured_start_block));
        self.metrics.set_gauge("indexer_latest_block", &[("chain_key".into(), chain_key.to_string())], latest_block as f64);
        if from_block > latest_block {
            return Ok(CycleReport { up_to_date: true, ..CycleReport::default() });
        }

        // Step 4: fetch and materialize events in order.
        let events = self
            .rpc
            .fetch_message_paid_events(from_block, latest_block)
            .await
            .map_err(messaging_db::DbError::Connection)?;

        let mut report = CycleReport::default();
        for event in &events {
            self.materialize_event(chain_key, event, &mut report).await?;
        }

        // Step 5: advance checkpoint only after the whole loop succeeds.
        self.store.save_checkpoint(chain_key, latest_block).await?;
        self.metrics.set_gauge(
            "indexer_lag_blocks",
            &[("chain_key".into(), chain_key.to_string())],
            (latest_block - from_block).max(0) as f64,
        );

        Ok(report)
    }

    async fn materialize_event(&self, chain_key: &str, event: &MessagePaidEvent, report: &mut CycleReport) -> messaging_db::DbResult<()> {
        let chain_event = ChainEvent {
            id: uuid::Uuid::new_v4(),
            chain_key: chain_key.to_string(),
            tx_hash: event.tx_hash.clone(),
            log_index: event.log_index,
            block_number: event.block_number,
            block_hash: event.block_hash.clone(),
            from_address: event.from_address.clone(),
            to_address: event.to_address.clone(),
            amount_raw: event.amount_raw.clone(),
            amount_normalized: normalize_amount(&event.amount_raw, self.config.token_decimals),
            fee_raw: event.fee_raw.clone(),
            content_hash: event.content_hash.clone(),
            nonce: event.nonce.clone(),
            channel: event.channel,
            observed_at: chrono::Utc::now(),
        };
        self.store.insert_chain_event(&chain_event).await?;

        let payer = self.store.get_user_by_wallet(&event.from_address).await?;
        let recipient = self.store.get_user_by_wallet(&event.to_address).await?;
        let (payer, recipient) = match (payer, recipient) {
            (Some(p), Some(r)) => (p, r),
            _ => {
                report.events_skipped_unresolved += 1;
                return Ok(());
            }
        };

        let message = self
            .store
            .create_chain_message(&payer.id, &recipient.id, &event.content_hash, chain_event.amount_normalized, &event.tx_hash)
            .await?;

        let connections = self.store.active_connections_for_user(&recipient.id).await?;
        for connection in &connections {
            if !self.consent.is_current(connection) {
                self.metrics.incr_counter(
                    "delivery_job_skip_total",
                    &[("reason".into(), "stale_channel_consent".into()), ("channel".into(), connection.channel.as_str().into())],
                    1.0,
                );
                continue;
            }
            if let Some(only) = event.channel {
                if connection.channel != only {
                    continue;
                }
            }
            let payload = serde_json::json!({
                "subject": "message_paid",
                "messageId": message.id,
                "amount": message.price,
                "txHash": message.tx_hash,
            })
            .to_string();
            self.store
                .enqueue_delivery_job(message.id, &recipient.id, connection.channel, &connection.external_handle, &payload, self.config.max_attempts_per_job)
                .await?;
        }

        report.events_processed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging_consent::ConsentConfig;
    use messaging_db::{PersistenceMode, StoreConfig};
    use std::sync::Mutex;

    struct FixedRpc {
        latest: i64,
        events: Mutex<Vec<MessagePaidEvent>>,
    }

    #[async_trait]
    impl ChainRpc for FixedRpc {
        async fn latest_block(&self) -> Result<i64, String> {
            Ok(self.latest)
        }

        async fn fetch_message_paid_events(&self, _from: i64, _to: i64) -> Result<Vec<MessagePaidEvent>, String> {
            Ok(self.events.lock().unwrap().drain(..).collect())
        }
    }

    async fn file_store() -> Store {
        let root = std::env::temp_dir().join(format!("messaging-indexer-test-{}", uuid::Uuid::new_v4()));
        let config = StoreConfig {
            mode: PersistenceMode::File,
            file_root: root.to_string_lossy().into_owned(),
            ..StoreConfig::default()
        };
        Store::connect(&config).await.unwrap()
    }

    fn config() -> IndexerConfig {
        IndexerConfig {
            chain_id: "base".into(),
            vault_address: "0xVAULT".into(),
            configured_start_block: 0,
            token_decimals: 6,
            distributed: false,
            claim_lock_ttl: Duration::from_secs(10),
            max_attempts_per_job: 5,
        }
    }

    #[tokio::test]
    async fn unresolved_wallets_are_skipped_but_checkpoint_still_advances() {
        let store = file_store().await;
        let lock = LockBackend::disabled();
        let consent = ConsentGate::new(ConsentConfig::new("v1"));
        let metrics = Registry::new();
        let rpc = FixedRpc {
            latest: 100,
            events: Mutex::new(vec![MessagePaidEvent {
                tx_hash: "0xabc".into(),
                log_index: 0,
                block_number: 50,
                block_hash: "0xblock50".into(),
                from_address: "0xunregistered_sender".into(),
                to_address: "0xunregistered_recipient".into(),
                amount_raw: "1000000".into(),
                fee_raw: "0".into(),
                content_hash: "hash1".into(),
                nonce: "1".into(),
                channel: None,
            }]),
        };
        let indexer = ChainIndexer::new(&store, &lock, &consent, &metrics, &rpc, config());

        let report = indexer.run_cycle().await.unwrap();
        assert_eq!(report.events_skipped_unresolved, 1);
        assert_eq!(report.events_processed, 0);
        let checkpoint = store.get_checkpoint("base:0xvault").await.unwrap().unwrap();
        assert_eq!(checkpoint.last_indexed_block, 100);
    }

    #[tokio::test]
    async fn resolved_event_materializes_delivered_message_and_enqueues_connections() {
        let store = file_store().await;
        let sender = store.create_user("payer", "0xSENDER", 0).await.unwrap();
        let recipient = store.create_user("payee", "0xRECIPIENT", 0).await.unwrap();
        store
            .upsert_channel_connection(&recipient.id, messaging_types::Channel::WhatsApp, "+15555550100", "secret-ref", "v1", Some(chrono::Utc::now()))
            .await
            .unwrap();

        let lock = LockBackend::disabled();
        let consent = ConsentGate::new(ConsentConfig::new("v1"));
        let metrics = Registry::new();
        let rpc = FixedRpc {
            latest: 10,
            events: Mutex::new(vec![MessagePaidEvent {
                tx_hash: "0xdef".into(),
                log_index: 0,
                block_number: 5,
                block_hash: "0xblock5".into(),
                from_address: sender.wallet_address.clone(),
                to_address: recipient.wallet_address.clone(),
                amount_raw: "2000000".into(),
                fee_raw: "0".into(),
                content_hash: "hash2".into(),
                nonce: "1".into(),
                channel: None,
            }]),
        };
        let indexer = ChainIndexer::new(&store, &lock, &consent, &metrics, &rpc, config());

        let report = indexer.run_cycle().await.unwrap();
        assert_eq!(report.events_processed, 1);

        let message = store.get_message_by_content_hash("hash2").await.unwrap().expect("message materialized");
        assert_eq!(message.status, messaging_types::MessageStatus::Delivered);
        assert_eq!(message.price, 2);

        let stats = store.delivery_job_stats().await.unwrap();
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn event_channel_restricts_fan_out_to_that_channel() {
        let store = file_store().await;
        let sender = store.create_user("payer-2", "0xSENDER2", 0).await.unwrap();
        let recipient = store.create_user("payee-2", "0xRECIPIENT2", 0).await.unwrap();
        store
            .upsert_channel_connection(&recipient.id, messaging_types::Channel::WhatsApp, "+15555550100", "secret-ref", "v1", Some(chrono::Utc::now()))
            .await
            .unwrap();
        store
            .upsert_channel_connection(&recipient.id, messaging_types::Channel::X, "@recipient", "secret-ref", "v1", Some(chrono::Utc::now()))
            .await
            .unwrap();

        let lock = LockBackend::disabled();
        let consent = ConsentGate::new(ConsentConfig::new("v1"));
        let metrics = Registry::new();
        let rpc = FixedRpc {
            latest: 10,
            events: Mutex::new(vec![MessagePaidEvent {
                tx_hash: "0xghi".into(),
                log_index: 0,
                block_number: 5,
                block_hash: "0xblock5b".into(),
                from_address: sender.wallet_address.clone(),
                to_address: recipient.wallet_address.clone(),
                amount_raw: "2000000".into(),
                fee_raw: "0".into(),
                content_hash: "hash3".into(),
                nonce: "1".into(),
                channel: Some(messaging_types::Channel::X),
            }]),
        };
        let indexer = ChainIndexer::new(&store, &lock, &consent, &metrics, &rpc, config());

        let report = indexer.run_cycle().await.unwrap();
        assert_eq!(report.events_processed, 1);

        let stats = store.delivery_job_stats().await.unwrap();
        assert_eq!(stats.pending, 1, "only the X connection should have been enqueued");
    }
}
