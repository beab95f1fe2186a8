//! Sliding-window abuse scoring and block-gating.

mod config;
mod keys;

pub use config::AbuseEngineConfig;

use chrono::{DateTime, Utc};

use messaging_db::{DbResult, Store};
use messaging_types::AbuseKeyType;

/// One request's worth of client-side signals, already extracted from the
/// transport layer by the caller.
#[derive(Debug, Clone)]
pub struct AbuseCheckRequest {
    pub sender_id: String,
    pub recipient_id: String,
    pub client_ip: Option<String>,
    pub explicit_device_id: Option<String>,
    pub user_agent_hints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbuseDecision {
    Allow,
    Blocked { reason: String, retry_after_ms: i64 },
}

pub struct AbuseEngine<'s> {
    store: &'s Store,
    config: AbuseEngineConfig,
}

struct Dimension {
    key_type: AbuseKeyType,
    key_value: String,
    count: i64,
    max: i64,
    weight: f64,
}

impl<'s> AbuseEngine<'s> {
    pub fn new(store: &'s Store, config: AbuseEngineConfig) -> Self {
        Self { store, config }
    }

    /// Runs the block-gate → increment → score → block pipeline, in order.
    pub async fn evaluate(&self, request: &AbuseCheckRequest) -> DbResult<AbuseDecision> {
        if !self.config.enabled {
            return Ok(AbuseDecision::Allow);
        }

        let now = Utc::now();
        let ip_key = request.client_ip.as_deref().map(keys::ip_key);
        let device_key = keys::device_key(
            request.explicit_device_id.as_deref(),
            &request.user_agent_hints,
        );
        let missing_user_agent = device_key.is_none();

        // Step 3: block-gate before touching any counters.
        for (key_type, key_value) in self.candidate_keys(request, ip_key.as_deref(), device_key.as_deref()) {
            if let Some(block) = self.store.get_abuse_block(key_type, &key_value).await? {
                if block.is_active(now) {
                    let retry_after_ms = (block.blocked_until - now).num_milliseconds().max(0);
                    return Ok(AbuseDecision::Blocked {
                        reason: "abuse_blocked".into(),
                        retry_after_ms,
                    });
                }
            }
        }

        let window_start = window_start(now, self.config.window_ms);

        // Step 4: atomic increments.
        let mut dims = Vec::new();
        dims.push(Dimension {
            key_type: AbuseKeyType::Sender,
            count: self
                .store
                .increment_abuse_counter(AbuseKeyType::Sender, &request.sender_id, window_start)
                .await?,
            key_value: request.sender_id.clone(),
            max: self.config.sender_max,
            weight: self.config.sender_weight,
        });
        dims.push(Dimension {
            key_type: AbuseKeyType::Recipient,
            count: self
                .store
                .increment_abuse_counter(AbuseKeyType::Recipient, &request.recipient_id, window_start)
                .await?,
            key_value: request.recipient_id.clone(),
            max: self.config.recipient_max,
            weight: self.config.recipient_weight,
        });
        if let Some(ref ip) = ip_key {
            dims.push(Dimension {
                key_type: AbuseKeyType::Ip,
                count: self.store.increment_abuse_counter(AbuseKeyType::Ip, ip, window_start).await?,
                key_value: ip.clone(),
                max: self.config.ip_max,
                weight: self.config.ip_weight,
            });
        }
        if let Some(ref device) = device_key {
            dims.push(Dimension {
                key_type: AbuseKeyType::Device,
                count: self
                    .store
                    .increment_abuse_counter(AbuseKeyType::Device, device, window_start)
                    .await?,
                key_value: device.clone(),
                max: self.config.device_max,
                weight: self.config.device_weight,
            });
        }

        // Step 5: scoring.
        let mut score = 0.0;
        let mut excess_dims = Vec::new();
        for dim in &dims {
            let excess = (dim.count - dim.max).max(0);
            if excess > 0 {
                score += excess as f64 * dim.weight;
                excess_dims.push(dim);
            }
        }
        if missing_user_agent {
            score += self.config.missing_user_agent_penalty;
        }

        // Step 6: allow or block.
        if score < self.config.score_limit {
            return Ok(AbuseDecision::Allow);
        }

        let penalty_only = excess_dims.is_empty();
        let to_block: Vec<&Dimension> = if penalty_only {
            dims.iter().filter(|d| matches!(d.key_type, AbuseKeyType::Sender | AbuseKeyType::Ip)).collect()
        } else {
            excess_dims
        };

        let blocked_until = now + chrono::Duration::milliseconds(self.config.block_duration_ms);
        for dim in &to_block {
            let reason = block_reason(dim.key_type, penalty_only, missing_user_agent);
            self.store
                .upsert_abuse_block(dim.key_type, &dim.key_value, blocked_until, reason)
                .await?;
            // Best-effort: a failed event record must never fail the request.
            let _ = self.store.record_abuse_event(dim.key_type, &dim.key_value, score, reason).await;
        }

        Ok(AbuseDecision::Blocked {
            reason: "abuse_blocked".into(),
            retry_after_ms: self.config.block_duration_ms,
        })
    }

    fn candidate_keys(
        &self,
        request: &AbuseCheckRequest,
        ip_key: Option<&str>,
        device_key: Option<&str>,
    ) -> Vec<(AbuseKeyType, String)> {
        let mut keys = vec![
            (AbuseKeyType::Sender, request.sender_id.clone()),
            (AbuseKeyType::Recipient, request.recipient_id.clone()),
        ];
        if let Some(ip) = ip_key {
            keys.push((AbuseKeyType::Ip, ip.to_string()));
        }
        if let Some(device) = device_key {
            keys.push((AbuseKeyType::Device, device.to_string()));
        }
        keys
    }
}

fn window_start(now: DateTime<Utc>, window_ms: i64) -> DateTime<Utc> {
    let now_ms = now.timestamp_millis();
    let floored = (now_ms / window_ms) * window_ms;
    DateTime::from_timestamp_millis(floored).unwrap_or(now)
}

/// `reason` is the first matching velocity label for the dimension being
/// blocked, falling back to `missing_user_agent`/`abuse_score_limit` when the
/// block came from the penalty-only path.
fn block_reason(key_type: AbuseKeyType, penalty_only: bool, missing_user_agent: bool) -> &'static str {
    if penalty_only {
        return if missing_user_agent { "missing_user_agent" } else { "abuse_score_limit" };
    }
    match key_type {
        AbuseKeyType::Sender => "sender_velocity",
        AbuseKeyType::Recipient => "recipient_velocity",
        AbuseKeyType::Ip => "ip_velocity",
        AbuseKeyType::Device => "device_velocity",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging_db::{PersistenceMode, StoreConfig};

    async fn file_store() -> Store {
        let root = std::env::temp_dir().join(format!("messaging-abuse-test-{}", uuid::Uuid::new_v4()));
        let config = StoreConfig {
            mode: PersistenceMode::File,
            file_root: root.to_string_lossy().into_owned(),
            ..StoreConfig::default()
        };
        Store::connect(&config).await.unwrap()
    }

    #[tokio::test]
    async fn disabled_engine_always_allows() {
        let store = file_store().await;
        let engine = AbuseEngine::new(&store, AbuseEngineConfig { enabled: false, ..Default::default() });
        let decision = engine
            .evaluate(&AbuseCheckRequest {
                sender_id: "alice".into(),
                recipient_id: "bob".into(),
                client_ip: None,
                explicit_device_id: None,
                user_agent_hints: vec![],
            })
            .await
            .unwrap();
        assert_eq!(decision, AbuseDecision::Allow);
    }

    #[tokio::test]
    async fn sender_velocity_triggers_a_block_after_enough_sends() {
        let store = file_store().await;
        let config = AbuseEngineConfig {
            sender_max: 1,
            sender_weight: 100.0,
            recipient_weight: 0.0,
            ip_weight: 0.0,
            device_weight: 0.0,
            score_limit: 50.0,
            missing_user_agent_penalty: 0.0,
            ..Default::default()
        };
        let engine = AbuseEngine::new(&store, config);
        let request = AbuseCheckRequest {
            sender_id: "alice".into(),
            recipient_id: "bob".into(),
            client_ip: Some("9.9.9.9".into()),
            explicit_device_id: Some("device-1".into()),
            user_agent_hints: vec![],
        };

        let first = engine.evaluate(&request).await.unwrap();
        assert_eq!(first, AbuseDecision::Allow);

        let second = engine.evaluate(&request).await.unwrap();
        assert!(matches!(second, AbuseDecision::Blocked { .. }));

        let third = engine.evaluate(&request).await.unwrap();
        assert!(matches!(third, AbuseDecision::Blocked { .. }), "an active block must gate subsequent requests");
    }
}
