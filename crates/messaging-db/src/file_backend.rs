//! Last-resort persistence: one JSON file per entity collection under
//! `file_root`, held in memory and rewritten whole on every mutation.
//!
//! This mode exists so the server can still boot (degraded) when no
//! database is reachable at all; it is not meant to survive real load. Each
//! collection is guarded by its own `tokio::sync::Mutex` rather than one
//! lock over the whole store so unrelated collections don't serialize
//! against each other.
//!
//! Collections keyed by a composite (non-`String`) key aren't round-tripped
//! to disk — `serde_json` can only serialize map keys that are strings —
//! so idempotency mappings, channel connections, and abuse counters/blocks
//! live for the process lifetime only in file mode. Acceptable for the
//! degraded fallback this mode is for; not a substitute for Strict/Embedded.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use crate::error::{DbError, DbResult};
use crate::models::*;

pub struct FileStore {
    root: PathBuf,
    pub users: Mutex<BTreeMap<String, DbUser>>,
    pub pricing_profiles: Mutex<BTreeMap<String, DbPricingProfile>>,
    pub messages: Mutex<BTreeMap<String, DbMessage>>,
    pub idempotency: Mutex<BTreeMap<(String, String), DbMessageIdempotency>>,
    pub delivery_jobs: Mutex<BTreeMap<String, DbDeliveryJob>>,
    pub chain_events: Mutex<BTreeMap<String, DbChainEvent>>,
    pub chain_checkpoints: Mutex<BTreeMap<String, DbChainEventCheckpoint>>,
    pub channel_connections: Mutex<BTreeMap<(String, String), DbChannelConnection>>,
    pub identity_bindings: Mutex<BTreeMap<String, DbIdentityBinding>>,
    pub abuse_counters: Mutex<BTreeMap<String, DbAbuseCounter>>,
    pub abuse_blocks: Mutex<BTreeMap<String, DbAbuseBlock>>,
    pub abuse_events: Mutex<BTreeMap<String, DbAbuseEvent>>,
    pub audit_log: Mutex<Vec<DbAuditLog>>,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> DbResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            users: Mutex::new(load(&root, "users.json").await?),
            pricing_profiles: Mutex::new(load(&root, "pricing_profiles.json").await?),
            messages: Mutex::new(load(&root, "messages.json").await?),
            idempotency: Mutex::new(BTreeMap::new()),
            delivery_jobs: Mutex::new(load(&root, "delivery_jobs.json").await?),
            chain_events: Mutex::new(load(&root, "chain_events.json").await?),
            chain_checkpoints: Mutex::new(load(&root, "chain_checkpoints.json").await?),
            channel_connections: Mutex::new(BTreeMap::new()),
            identity_bindings: Mutex::new(load(&root, "identity_bindings.json").await?),
            abuse_counters: Mutex::new(BTreeMap::new()),
            abuse_blocks: Mutex::new(BTreeMap::new()),
            abuse_events: Mutex::new(load(&root, "abuse_events.json").await?),
            audit_log: Mutex::new(load_vec(&root, "audit_log.json").await?),
            root,
        })
    }

    pub(crate) async fn persist<T: Serialize>(&self, name: &str, value: &T) -> DbResult<()> {
        let path = self.root.join(name);
        let json = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

async fn load<K: Ord + DeserializeOwned, V: DeserializeOwned>(
    root: &std::path::Path,
    name: &str,
) -> DbResult<BTreeMap<K, V>> {
    let path = root.join(name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

async fn load_vec<V: DeserializeOwned>(root: &std::path::Path, name: &str) -> DbResult<Vec<V>> {
    let path = root.join(name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn not_found(what: &str) -> DbError {
    DbError::NotFound(what.to_string())
}
