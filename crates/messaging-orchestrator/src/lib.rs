//! Pricing + send pipeline.
//!
//! `SendOrchestrator` is the one place that wires rate limiting
//! (`messaging-lock`), abuse scoring (`messaging-abuse`), pricing
//! (`messaging-core::pricing`), persistence (`messaging-db`), channel
//! fan-out gating (`messaging-consent`), audit (`messaging-audit`), and
//! metrics (`messaging-observability`) into the eight ordered steps a
//! send request runs through. Grounded on `openibank-db::repos::wallet`'s
//! debit-under-transaction pattern, which `Store::create_paid_message`
//! already implements; this crate is the caller that decides price,
//! checks the gates around it, and fans delivery out afterward.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use messaging_abuse::{AbuseCheckRequest, AbuseDecision, AbuseEngine};
use messaging_audit::AuditLedger;
use messaging_consent::ConsentGate;
use messaging_core::pricing::{self, ContactHistory, PricingRule};
use messaging_db::{SendOutcome, Store};
use messaging_lock::LockBackend;
use messaging_observability::Registry;
use messaging_types::{Channel, Message, MessageStatus, MessagingError, Result};

/// How the caller identified the recipient: handle, phone hash, or wallet.
#[derive(Debug, Clone)]
pub enum RecipientSelector {
    Handle(String),
    PhoneHash(String),
    Wallet(String),
}

#[derive(Debug, Clone)]
pub struct SendRequest {
    pub sender_id: String,
    pub recipient: RecipientSelector,
    /// Opaque to the core — bodies are never decrypted here.
    pub ciphertext: String,
    /// Supplied by the caller alongside `ciphertext`, not re-derived here —
    /// the hash is taken over the plaintext the client encrypted, which
    /// this layer never sees.
    pub content_hash: String,
    pub idempotency_key: Option<String>,
    /// Restricts delivery-job fan-out (step 7) to a single channel when set;
    /// otherwise every consent-current connection of the recipient is used.
    pub channel: Option<Channel>,
    pub client_ip: Option<String>,
    pub explicit_device_id: Option<String>,
    pub user_agent_hints: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SendResult {
    pub message_id: Uuid,
    pub paid: i64,
    pub status: MessageStatus,
}

/// Rate-limit knobs for step 1, injected rather than read from env — same
/// config-struct-over-global-state shape as `AbuseEngineConfig`.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max: i64,
    pub window: Duration,
    pub strict: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max: 20, window: Duration::from_secs(60), strict: false }
    }
}

pub struct SendOrchestrator<'s> {
    store: &'s Store,
    lock: &'s LockBackend,
    abuse: &'s AbuseEngine<'s>,
    consent: &'s ConsentGate,
    audit: &'s AuditLedger<'s>,
    metrics: &'s Registry,
    rate_limit: RateLimitConfig,
}

impl<'s> SendOrchestrator<'s> {
    pub fn new(
        store: &'s Store,
        lock: &'s LockBackend,
        abuse: &'s AbuseEngine<'s>,
        consent: &'s ConsentGate,
        audit: &'s AuditLedger<'s>,
        metrics: &'s Registry,
        rate_limit: RateLimitConfig,
    ) -> Self {
        Self { store, lock, abuse, consent, audit, metrics, rate_limit }
    }

    pub async fn send(&self, request: SendRequest) -> Result<SendResult> {
        // Step 1: rate limit.
        let bucket_key = format!("send:{}", request.sender_id);
        let ip = request.client_ip.as_deref().unwrap_or("unknown");
        let bucket = self
            .lock
            .evaluate_bucket(&bucket_key, ip, "send", self.rate_limit.max, self.rate_limit.window, self.rate_limit.strict)
            .await
            .map_err(|e| MessagingError::internal(e.to_string()))?;
        if !bucket.ok {
            self.metrics.incr_counter("send_rejected_total", &[("reason".into(), "rate_limited".into())], 1.0);
            return Err(MessagingError::RateLimited { retry_after_ms: bucket.ttl.as_millis() as u64 });
        }

        // Step 2: abuse check.
        let abuse_request = AbuseCheckRequest {
            sender_id: request.sender_id.clone(),
            recipient_id: recipient_hint(&request.recipient),
            client_ip: request.client_ip.clone(),
            explicit_device_id: request.explicit_device_id.clone(),
            user_agent_hints: request.user_agent_hints.clone(),
        };
        match self.abuse.evaluate(&abuse_request).await.map_err(MessagingError::from)? {
            AbuseDecision::Allow => {}
            AbuseDecision::Blocked { reason, retry_after_ms } => {
                tracing::warn!(sender_id = %request.sender_id, reason, "send blocked by abuse engine");
                self.metrics.incr_counter("send_rejected_total", &[("reason".into(), "abuse_blocked".into())], 1.0);
                return Err(MessagingError::AbuseBlocked { retry_after_ms: retry_after_ms.max(0) as u64, reason });
            }
        }

        // Step 3: resolve recipient, reject self-send.
        let recipient = self.resolve_recipient(&request.recipient).await?;
        if recipient.id == request.sender_id {
            self.metrics.incr_counter("send_rejected_total", &[("reason".into(), "self_send_not_allowed".into())], 1.0);
            return Err(MessagingError::SelfSendNotAllowed);
        }

        // Step 4: pricing.
        let history_row = self.store.contact_history(&request.sender_id, &recipient.id).await.map_err(MessagingError::from)?;
        let history = ContactHistory {
            sender_has_sent_to_recipient: history_row.sender_has_sent_to_recipient,
            recipient_has_sent_to_sender: history_row.recipient_has_sent_to_sender,
        };
        let pricing_profile = self.store.get_pricing_profile(&recipient.id).await.map_err(MessagingError::from)?;
        let decision = pricing::compute_price(&pricing_profile, history);
        if !pricing_profile.accepts_all && decision.rule == PricingRule::FirstContact {
            // A cold first contact with an `acceptsAll == false` recipient is
            // exactly the "sender is not pre-allowed" case: no prior message
            // exists in either direction, so there is no relationship for
            // the recipient to have pre-allowed.
            self.metrics.incr_counter("send_rejected_total", &[("reason".into(), "not_accepted".into())], 1.0);
            return Err(MessagingError::NotAccepted);
        }

        // Step 5: idempotency.
        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.store.find_idempotent_message(&request.sender_id, key).await.map_err(MessagingError::from)? {
                let message = self.store.get_message(existing.message_id).await.map_err(MessagingError::from)?
                    .ok_or_else(|| MessagingError::internal("idempotent message vanished"))?;
                if message.recipient_id != recipient.id || message.content_hash != request.content_hash {
                    return Err(MessagingError::IdempotencyConflict);
                }
                return Ok(to_result(&message));
            }
        }

        // Step 6: debit + insert, atomic.
        let outcome = self
            .store
            .create_paid_message(
                &request.sender_id,
                &recipient.id,
                &request.ciphertext,
                &request.content_hash,
                decision.price,
                request.idempotency_key.as_deref(),
            )
            .await
            .map_err(MessagingError::from)?;
        let message = match outcome {
            SendOutcome::Created(message) => message,
            SendOutcome::Idempotent(message) => return Ok(to_result(&message)),
        };

        // Step 7: fan out to consent-current connected channels.
        let connections = self.store.active_connections_for_user(&recipient.id).await.map_err(MessagingError::from)?;
        for connection in &connections {
            if !self.consent.is_current(connection) {
                self.metrics.incr_counter(
                    "delivery_job_skip_total",
                    &[("reason".into(), "stale_channel_consent".into()), ("channel".into(), connection.channel.as_str().into())],
                    1.0,
                );
                continue;
            }
            if let Some(only) = request.channel {
                if connection.channel != only {
                    continue;
                }
            }
            let payload = delivery_payload(&message);
            self.store
                .enqueue_delivery_job(message.id, &recipient.id, connection.channel, &connection.external_handle, &payload, 5)
                .await
                .map_err(MessagingError::from)?;
        }

        // Step 8: metrics, audit, response.
        self.metrics.incr_counter("messages_sent_total", &[], 1.0);
        self.metrics.observe_histogram("message_price", &[], decision.price as f64);
        self.audit
            .record(
                Some(&request.sender_id),
                "message_sent",
                Some("message"),
                Some(&message.id.to_string()),
                &serde_json::json!({
                    "recipient_id": recipient.id,
                    "price": decision.price,
                    "pricing_rule": pricing_rule_label(decision.rule),
                }),
            )
            .await;

        Ok(to_result(&message))
    }

    async fn resolve_recipient(&self, selector: &RecipientSelector) -> Result<messaging_types::User> {
        let user = match selector {
            RecipientSelector::Handle(handle) => self.store.get_user_by_handle(handle).await,
            RecipientSelector::PhoneHash(hash) => self.store.get_user_by_phone_hash(hash).await,
            RecipientSelector::Wallet(wallet) => self.store.get_user_by_wallet(wallet).await,
        }
        .map_err(MessagingError::from)?;
        user.ok_or_else(|| MessagingError::validation("recipient", "no matching user"))
    }
}

fn recipient_hint(selector: &RecipientSelector) -> String {
    match selector {
        RecipientSelector::Handle(v) | RecipientSelector::PhoneHash(v) | RecipientSelector::Wallet(v) => v.clone(),
    }
}

fn delivery_payload(message: &Message) -> String {
    serde_json::json!({
        "subject": "message_paid",
        "messageId": message.id,
        "amount": message.price,
        "txHash": message.tx_hash,
    })
    .to_string()
}

fn pricing_rule_label(rule: PricingRule) -> &'static str {
    match rule {
        PricingRule::Default => "default",
        PricingRule::ReturnDiscount => "return_discount",
        PricingRule::FirstContact => "first_contact",
    }
}

fn to_result(message: &Message) -> SendResult {
    SendResult { message_id: message.id, paid: message.price, status: message.status }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging_abuse::AbuseEngineConfig;
    use messaging_consent::ConsentConfig;
    use messaging_db::{PersistenceMode, StoreConfig};

    async fn fixture_store() -> Store {
        let root = std::env::temp_dir().join(format!("messaging-orchestrator-test-{}", uuid::Uuid::new_v4()));
        let config = StoreConfig {
            mode: PersistenceMode::File,
            file_root: root.to_string_lossy().into_owned(),
            ..StoreConfig::default()
        };
        Store::connect(&config).await.expect("file store connects")
    }

    #[tokio::test]
    async fn first_contact_with_accepts_all_false_is_rejected() {
        let store = fixture_store().await;
        let sender = store.create_user("sender-1", "0xaaa", 10_000).await.unwrap();
        let recipient = store.create_user("recipient-1", "0xbbb", 0).await.unwrap();
        let mut pricing = messaging_types::PricingProfile::default();
        pricing.accepts_all = false;
        store.set_pricing_profile(&recipient.id, &pricing).await.unwrap();

        let lock = LockBackend::disabled();
        let abuse = AbuseEngine::new(&store, AbuseEngineConfig { enabled: false, ..AbuseEngineConfig::default() });
        let consent = ConsentGate::new(ConsentConfig::new("v1"));
        let audit = AuditLedger::new(&store);
        let metrics = Registry::new();
        let orchestrator = SendOrchestrator::new(&store, &lock, &abuse, &consent, &audit, &metrics, RateLimitConfig::default());

        let result = orchestrator
            .send(SendRequest {
                sender_id: sender.id,
                recipient: RecipientSelector::Wallet("0xbbb".into()),
                ciphertext: "hello-ciphertext".into(),
                content_hash: "hash-hello".into(),
                idempotency_key: None,
                channel: None,
                client_ip: None,
                explicit_device_id: None,
                user_agent_hints: vec![],
            })
            .await;

        assert!(matches!(result, Err(MessagingError::NotAccepted)));
    }

    #[tokio::test]
    async fn self_send_is_rejected_before_pricing() {
        let store = fixture_store().await;
        let user = store.create_user("solo", "0xccc", 10_000).await.unwrap();

        let lock = LockBackend::disabled();
        let abuse = AbuseEngine::new(&store, AbuseEngineConfig { enabled: false, ..AbuseEngineConfig::default() });
        let consent = ConsentGate::new(ConsentConfig::new("v1"));
        let audit = AuditLedger::new(&store);
        let metrics = Registry::new();
        let orchestrator = SendOrchestrator::new(&store, &lock, &abuse, &consent, &audit, &metrics, RateLimitConfig::default());

        let result = orchestrator
            .send(SendRequest {
                sender_id: user.id.clone(),
                recipient: RecipientSelector::Wallet("0xccc".into()),
                ciphertext: "hi-me-ciphertext".into(),
                content_hash: "hash-hi-me".into(),
                idempotency_key: None,
                channel: None,
                client_ip: None,
                explicit_device_id: None,
                user_agent_hints: vec![],
            })
            .await;

        assert!(matches!(result, Err(MessagingError::SelfSendNotAllowed)));
    }

    #[tokio::test]
    async fn successful_send_debits_balance_and_enqueues_connected_channels() {
        let store = fixture_store().await;
        let sender = store.create_user("sender-2", "0xddd", 10_000).await.unwrap();
        let recipient = store.create_user("recipient-2", "0xeee", 0).await.unwrap();
        store
            .upsert_channel_connection(&recipient.id, Channel::WhatsApp, "+15555550100", "secret-ref", "v1", Some(Utc::now()))
            .await
            .unwrap();

        let lock = LockBackend::disabled();
        let abuse = AbuseEngine::new(&store, AbuseEngineConfig { enabled: false, ..AbuseEngineConfig::default() });
        let consent = ConsentGate::new(ConsentConfig::new("v1"));
        let audit = AuditLedger::new(&store);
        let metrics = Registry::new();
        let orchestrator = SendOrchestrator::new(&store, &lock, &abuse, &consent, &audit, &metrics, RateLimitConfig::default());

        let result = orchestrator
            .send(SendRequest {
                sender_id: sender.id.clone(),
                recipient: RecipientSelector::Wallet("0xeee".into()),
                ciphertext: "first-message-ciphertext".into(),
                content_hash: "hash-first-message".into(),
                idempotency_key: Some("key-1".into()),
                channel: None,
                client_ip: Some("1.2.3.4".into()),
                explicit_device_id: None,
                user_agent_hints: vec![],
            })
            .await
            .unwrap();

        assert_eq!(result.status, MessageStatus::Paid);
        let sender_after = store.get_user(&sender.id).await.unwrap().unwrap();
        assert_eq!(sender_after.balance, 10_000 - result.paid);

        // Retrying with the same idempotency key returns the same message
        // instead of debiting twice.
        let retried = orchestrator
            .send(SendRequest {
                sender_id: sender.id.clone(),
                recipient: RecipientSelector::Wallet("0xeee".into()),
                ciphertext: "first-message-ciphertext".into(),
                content_hash: "hash-first-message".into(),
                idempotency_key: Some("key-1".into()),
                channel: None,
                client_ip: Some("1.2.3.4".into()),
                explicit_device_id: None,
                user_agent_hints: vec![],
            })
            .await
            .unwrap();
        assert_eq!(retried.message_id, result.message_id);
        let sender_after_retry = store.get_user(&sender.id).await.unwrap().unwrap();
        assert_eq!(sender_after_retry.balance, sender_after.balance);
    }
}
