//! Message entity and status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Paid,
    Delivered,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

/// A single paid, point-to-point message, settled on the ledger before the
/// recipient ever sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub ciphertext: String,
    pub content_hash: String,
    pub price: i64,
    pub status: MessageStatus,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Binds a `(sender, idempotency_key)` pair to the message it produced, so a
/// retried send returns the original result instead of debiting twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageIdempotency {
    pub sender_id: UserId,
    pub idempotency_key: String,
    pub message_id: MessageId,
    pub created_at: DateTime<Utc>,
}

/// Derives the default idempotency key for a send when the caller doesn't
/// supply one: a hash of the fields that make two sends "the same."
pub fn derive_idempotency_key(sender_id: &str, recipient_id: &str, content_hash: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(sender_id.as_bytes());
    hasher.update(b"|");
    hasher.update(recipient_id.as_bytes());
    hasher.update(b"|");
    hasher.update(content_hash.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_match_spec() {
        assert_eq!(MessageStatus::Paid.as_str(), "paid");
        assert_eq!(MessageStatus::Delivered.as_str(), "delivered");
        assert_eq!(MessageStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn idempotency_key_is_deterministic() {
        let a = derive_idempotency_key("s1", "r1", "hash1");
        let b = derive_idempotency_key("s1", "r1", "hash1");
        let c = derive_idempotency_key("s1", "r1", "hash2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
