//! Best-effort audit/drop ledger.
//!
//! `AuditLedger::record` serializes metadata to JSON and inserts via
//! `messaging_db::Store::audit_log`; on any insert error it pushes a
//! `{ts, user_id, event_type, reason}` record onto a bounded in-memory ring
//! and increments a drop counter labeled by `(reason, event_type)`. The
//! ledger never raises — a failing audit write must never fail the request
//! that triggered it.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use messaging_db::Store;
use serde::Serialize;
use tokio::sync::Mutex;

const DROP_RING_CAPACITY: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct DroppedAuditEntry {
    pub ts: DateTime<Utc>,
    pub user_id: Option<String>,
    pub event_type: String,
    pub reason: String,
}

pub struct AuditLedger<'s> {
    store: &'s Store,
    drops: Mutex<VecDeque<DroppedAuditEntry>>,
    drop_counts: Mutex<HashMap<(String, String), u64>>,
}

impl<'s> AuditLedger<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self {
            store,
            drops: Mutex::new(VecDeque::with_capacity(DROP_RING_CAPACITY)),
            drop_counts: Mutex::new(HashMap::new()),
        }
    }

    pub async fn record(
        &self,
        user_id: Option<&str>,
        event_type: &str,
        resource_type: Option<&str>,
        resource_id: Option<&str>,
        metadata: &(impl Serialize + ?Sized),
    ) {
        let details = match serde_json::to_value(metadata) {
            Ok(value) => Some(value),
            Err(e) => {
                self.drop_entry(user_id, event_type, format!("serialize_error:{e}")).await;
                return;
            }
        };

        if let Err(e) = self
            .store
            .audit_log(user_id, event_type, resource_type, resource_id, details.as_ref())
            .await
        {
            self.drop_entry(user_id, event_type, e.to_string()).await;
        }
    }

    async fn drop_entry(&self, user_id: Option<&str>, event_type: &str, reason: String) {
        tracing::warn!(event_type, reason = %reason, "audit write dropped");
        let mut drops = self.drops.lock().await;
        if drops.len() == DROP_RING_CAPACITY {
            drops.pop_front();
        }
        drops.push_back(DroppedAuditEntry {
            ts: Utc::now(),
            user_id: user_id.map(str::to_string),
            event_type: event_type.to_string(),
            reason: reason.clone(),
        });
        drop(drops);

        let mut counts = self.drop_counts.lock().await;
        *counts.entry((reason, event_type.to_string())).or_insert(0) += 1;
    }

    pub async fn recent_drops(&self) -> Vec<DroppedAuditEntry> {
        self.drops.lock().await.iter().cloned().collect()
    }

    pub async fn drop_count(&self, reason: &str, event_type: &str) -> u64 {
        self.drop_counts
            .lock()
            .await
            .get(&(reason.to_string(), event_type.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging_db::{PersistenceMode, StoreConfig};
    use serde_json::json;

    async fn file_store() -> Store {
        let root = std::env::temp_dir().join(format!("messaging-audit-test-{}", uuid::Uuid::new_v4()));
        let config = StoreConfig {
            mode: PersistenceMode::File,
            file_root: root.to_string_lossy().into_owned(),
            ..StoreConfig::default()
        };
        Store::connect(&config).await.unwrap()
    }

    #[tokio::test]
    async fn successful_write_leaves_the_drop_ring_empty() {
        let store = file_store().await;
        let ledger = AuditLedger::new(&store);
        ledger
            .record(Some("alice"), "message_sent", Some("message"), Some("m1"), &json!({"price": 100}))
            .await;
        assert!(ledger.recent_drops().await.is_empty());
    }

    #[tokio::test]
    async fn ring_buffer_is_capped_at_fifty() {
        let store = file_store().await;
        let ledger = AuditLedger::new(&store);
        for i in 0..60 {
            ledger.drop_entry(Some("alice"), "message_sent", format!("synthetic_{i}")).await;
        }
        assert_eq!(ledger.recent_drops().await.len(), DROP_RING_CAPACITY);
        assert_eq!(ledger.drop_count("synthetic_59", "message_sent").await, 1);
    }
}
