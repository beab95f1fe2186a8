//! On-chain payment event materialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ChainEventId;
use crate::Channel;

/// A decoded on-chain transfer, keyed uniquely by `(tx_hash, log_index)` so
/// re-observing the same log twice is a no-op rather than a duplicate. Once
/// inserted a row is never updated — a chain log doesn't change after the
/// fact, so there's no update path to get wrong.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEvent {
    pub id: ChainEventId,
    pub chain_key: String,
    pub tx_hash: String,
    pub log_index: i64,
    pub block_number: i64,
    pub block_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub amount_raw: String,
    pub amount_normalized: i64,
    pub fee_raw: String,
    pub content_hash: String,
    pub nonce: String,
    /// The channel the payment names for delivery, if the event carries
    /// one. `None` means "no restriction" — fan out to every consent-current
    /// connection, same as an unrestricted send.
    pub channel: Option<Channel>,
    pub observed_at: DateTime<Utc>,
}

/// The indexer's durable cursor for one chain: the highest block number
/// whose events have been fully materialized into messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEventCheckpoint {
    pub chain_key: String,
    pub last_indexed_block: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_carries_chain_key() {
        let cp = ChainEventCheckpoint {
            chain_key: "base-mainnet".into(),
            last_indexed_block: 100,
            updated_at: Utc::now(),
        };
        assert_eq!(cp.chain_key, "base-mainnet");
    }
}
