//! Row types mapped from the `messaging-db` tables.
//!
//! Enum-valued columns (`status`, `channel`, ...) are mapped as plain
//! `String` here and converted to the domain enums in `messaging-types` at
//! the edge — `sqlx::Any` (which backs both the strict Postgres and the
//! embedded SQLite mode) maps cleanly onto `TEXT`/`VARCHAR` across both
//! drivers without a custom `sqlx::Type` impl per dialect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use messaging_types::*;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbUser {
    pub id: String,
    pub wallet_address: String,
    pub email_hash: Option<String>,
    pub phone_hash: Option<String>,
    pub handle: Option<String>,
    pub discoverable_by_handle: bool,
    pub discoverable_by_phone: bool,
    pub balance: i64,
    pub handle_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbUser> for User {
    fn from(r: DbUser) -> Self {
        User {
            id: r.id,
            wallet_address: r.wallet_address,
            email_hash: r.email_hash,
            phone_hash: r.phone_hash,
            handle: r.handle,
            discoverable_by_handle: r.discoverable_by_handle,
            discoverable_by_phone: r.discoverable_by_phone,
            balance: r.balance,
            handle_changed_at: r.handle_changed_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbPricingProfile {
    pub user_id: String,
    pub default_price: i64,
    pub first_contact_price: i64,
    pub return_discount_bps: i32,
    pub accepts_all: bool,
}

impl From<DbPricingProfile> for PricingProfile {
    fn from(r: DbPricingProfile) -> Self {
        PricingProfile {
            default_price: r.default_price,
            first_contact_price: r.first_contact_price,
            return_discount_bps: r.return_discount_bps,
            accepts_all: r.accepts_all,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbMessage {
    pub id: Uuid,
    pub sender_id: String,
    pub recipient_id: String,
    pub ciphertext: String,
    pub content_hash: String,
    pub price: i64,
    pub status: String,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbMessage {
    pub fn status(&self) -> MessageStatus {
        match self.status.as_str() {
            "delivered" => MessageStatus::Delivered,
            "failed" => MessageStatus::Failed,
            _ => MessageStatus::Paid,
        }
    }
}

impl From<DbMessage> for Message {
    fn from(r: DbMessage) -> Self {
        let status = r.status();
        Message {
            id: r.id,
            sender_id: r.sender_id,
            recipient_id: r.recipient_id,
            ciphertext: r.ciphertext,
            content_hash: r.content_hash,
            price: r.price,
            status,
            tx_hash: r.tx_hash,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbMessageIdempotency {
    pub sender_id: String,
    pub idempotency_key: String,
    pub message_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<DbMessageIdempotency> for MessageIdempotency {
    fn from(r: DbMessageIdempotency) -> Self {
        MessageIdempotency {
            sender_id: r.sender_id,
            idempotency_key: r.idempotency_key,
            message_id: r.message_id,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbDeliveryJob {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: String,
    pub channel: String,
    pub destination: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub error_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbDeliveryJob> for DeliveryJob {
    fn from(r: DbDeliveryJob) -> Self {
        let channel = match r.channel.as_str() {
            "x" => Channel::X,
            _ => Channel::WhatsApp,
        };
        let status = match r.status.as_str() {
            "processing" => DeliveryJobStatus::Processing,
            "done" => DeliveryJobStatus::Done,
            "failed" => DeliveryJobStatus::Failed,
            _ => DeliveryJobStatus::Pending,
        };
        DeliveryJob {
            id: r.id,
            message_id: r.message_id,
            user_id: r.user_id,
            channel,
            destination: r.destination,
            payload: r.payload,
            status,
            attempts: r.attempts as u32,
            max_attempts: r.max_attempts as u32,
            next_attempt_at: r.next_attempt_at,
            locked_by: r.locked_by,
            locked_until: r.locked_until,
            error_text: r.error_text,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbChainEvent {
    pub id: Uuid,
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
    pub channel: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl From<DbChainEvent> for ChainEvent {
    fn from(r: DbChainEvent) -> Self {
        ChainEvent {
            id: r.id,
            chain_key: r.chain_key,
            tx_hash: r.tx_hash,
            log_index: r.log_index,
            block_number: r.block_number,
            block_hash: r.block_hash,
            from_address: r.from_address,
            to_address: r.to_address,
            amount_raw: r.amount_raw,
            amount_normalized: r.amount_normalized,
            fee_raw: r.fee_raw,
            content_hash: r.content_hash,
            nonce: r.nonce,
            channel: r.channel.as_deref().and_then(Channel::parse),
            observed_at: r.observed_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbChainEventCheckpoint {
    pub chain_key: String,
    pub last_indexed_block: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<DbChainEventCheckpoint> for ChainEventCheckpoint {
    fn from(r: DbChainEventCheckpoint) -> Self {
        ChainEventCheckpoint {
            chain_key: r.chain_key,
            last_indexed_block: r.last_indexed_block,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbChannelConnection {
    pub user_id: String,
    pub channel: String,
    pub external_handle: String,
    pub secret_ref: String,
    pub consent_version: String,
    pub consent_accepted_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbChannelConnection> for ChannelConnection {
    fn from(r: DbChannelConnection) -> Self {
        let channel = match r.channel.as_str() {
            "x" => Channel::X,
            _ => Channel::WhatsApp,
        };
        let status = match r.status.as_str() {
            "disconnected" => ConnectionStatus::Disconnected,
            _ => ConnectionStatus::Active,
        };
        ChannelConnection {
            user_id: r.user_id,
            channel,
            external_handle: r.external_handle,
            secret_ref: r.secret_ref,
            consent_version: r.consent_version,
            consent_accepted_at: r.consent_accepted_at,
            status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbIdentityBinding {
    pub user_id: String,
    pub method: String,
    pub provider: String,
    pub subject: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<DbIdentityBinding> for IdentityBinding {
    fn from(r: DbIdentityBinding) -> Self {
        let method = match r.method.as_str() {
            "siwe" => IdentityMethod::Siwe,
            "passkey" => IdentityMethod::Passkey,
            _ => IdentityMethod::Oauth,
        };
        IdentityBinding {
            user_id: r.user_id,
            method,
            provider: r.provider,
            subject: r.subject,
            revoked_at: r.revoked_at,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbAbuseCounter {
    pub key_type: String,
    pub key_value: String,
    pub window_start: DateTime<Utc>,
    pub count: i64,
}

impl From<DbAbuseCounter> for AbuseCounter {
    fn from(r: DbAbuseCounter) -> Self {
        AbuseCounter {
            key_type: parse_key_type(&r.key_type),
            key_value: r.key_value,
            window_start: r.window_start,
            count: r.count,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbAbuseBlock {
    pub key_type: String,
    pub key_value: String,
    pub blocked_until: DateTime<Utc>,
    pub reason: String,
    pub updated_at: DateTime<Utc>,
}

impl From<DbAbuseBlock> for AbuseBlock {
    fn from(r: DbAbuseBlock) -> Self {
        AbuseBlock {
            key_type: parse_key_type(&r.key_type),
            key_value: r.key_value,
            blocked_until: r.blocked_until,
            reason: r.reason,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbAbuseEvent {
    pub id: Uuid,
    pub key_type: String,
    pub key_value: String,
    pub score: f64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

impl From<DbAbuseEvent> for AbuseEvent {
    fn from(r: DbAbuseEvent) -> Self {
        AbuseEvent {
            id: r.id,
            key_type: parse_key_type(&r.key_type),
            key_value: r.key_value,
            score: r.score,
            reason: r.reason,
            occurred_at: r.occurred_at,
        }
    }
}

fn parse_key_type(s: &str) -> AbuseKeyType {
    match s {
        "recipient" => AbuseKeyType::Recipient,
        "ip" => AbuseKeyType::Ip,
        "device" => AbuseKeyType::Device,
        _ => AbuseKeyType::Sender,
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbAuditLog {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub event_type: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}
