//! Chain event materialization and per-chain checkpoints.

use chrono::Utc;

use messaging_types::{ChainEvent, ChainEventCheckpoint};

use crate::models::{DbChainEvent, DbChainEventCheckpoint};
use crate::store::{Backend, Store};
use crate::DbResult;

impl Store {
    pub async fn get_checkpoint(&self, chain_key: &str) -> DbResult<Option<ChainEventCheckpoint>> {
        match &self.backend {
            Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbChainEventCheckpoint>(
                    "SELECT * FROM chain_event_checkpoints WHERE chain_key = ?",
                )
                .bind(chain_key)
                .fetch_optional(pool)
                .await?;
                Ok(row.map(Into::into))
            }
            Backend::File(fs) => Ok(fs
                .chain_checkpoints
                .lock()
                .await
                .get(chain_key)
                .cloned()
                .map(Into::into)),
        }
    }

    /// Persists the checkpoint only after the caller has fully materialized
    /// every event up to `last_indexed_block` — never advanced speculatively,
    /// so a crash mid-batch re-processes from the last confirmed block
    /// instead of skipping events.
    pub async fn save_checkpoint(&self, chain_key: &str, last_indexed_block: i64) -> DbResult<()> {
        let now = Utc::now();
        match &self.backend {
            Backend::Sql(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO chain_event_checkpoints (chain_key, last_indexed_block, updated_at)
                    VALUES (?, ?, ?)
                    ON CONFLICT (chain_key) DO UPDATE SET
                        last_indexed_block = excluded.last_indexed_block,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(chain_key)
                .bind(last_indexed_block)
                .bind(now)
                .execute(pool)
                .await?;
                Ok(())
            }
            Backend::File(fs) => {
                let mut checkpoints = fs.chain_checkpoints.lock().await;
                checkpoints.insert(
                    chain_key.to_string(),
                    DbChainEventCheckpoint {
                        chain_key: chain_key.to_string(),
                        last_indexed_block,
                        updated_at: now,
                    },
                );
                fs.persist("chain_checkpoints.json", &*checkpoints).await?;
                Ok(())
            }
        }
    }

    /// Inserts an event, idempotent on `(tx_hash, log_index)` — re-observing
    /// a log the indexer already saw is a no-op rather than a duplicate.
    pub async fn insert_chain_event(&self, event: &ChainEvent) -> DbResult<()> {
        match &self.backend {
            Backend::Sql(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO chain_events (id, chain_key, tx_hash, log_index, block_number, block_hash, from_address, to_address, amount_raw, amount_normalized, fee_raw, content_hash, nonce, channel, observed_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT (tx_hash, log_index) DO NOTHING
                    "#,
                )
                .bind(event.id)
                .bind(&event.chain_key)
                .bind(&event.tx_hash)
                .bind(event.log_index)
                .bind(event.block_number)
                .bind(&event.block_hash)
                .bind(&event.from_address)
                .bind(&event.to_address)
                .bind(&event.amount_raw)
                .bind(event.amount_normalized)
                .bind(&event.fee_raw)
                .bind(&event.content_hash)
                .bind(&event.nonce)
                .bind(event.channel.map(|c| c.as_str()))
                .bind(event.observed_at)
                .execute(pool)
                .await?;
                Ok(())
            }
            Backend::File(fs) => {
                let mut events = fs.chain_events.lock().await;
                let key = format!("{}:{}", event.tx_hash, event.log_index);
                if events.values().any(|e| e.tx_hash == event.tx_hash && e.log_index == event.log_index) {
                    return Ok(());
                }
                events.insert(
                    key,
                    DbChainEvent {
                        id: event.id,
                        chain_key: event.chain_key.clone(),
                        tx_hash: event.tx_hash.clone(),
                        log_index: event.log_index,
                        block_number: event.block_number,
                        block_hash: event.block_hash.clone(),
                        from_address: event.from_address.clone(),
                        to_address: event.to_address.clone(),
                        amount_raw: event.amount_raw.clone(),
                        amount_normalized: event.amount_normalized,
                        fee_raw: event.fee_raw.clone(),
                        content_hash: event.content_hash.clone(),
                        nonce: event.nonce.clone(),
                        channel: event.channel.map(|c| c.as_str().to_string()),
                        observed_at: event.observed_at,
                    },
                );
                fs.persist("chain_events.json", &*events).await?;
                Ok(())
            }
        }
    }
}
