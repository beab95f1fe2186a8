//! Wire DTOs for the HTTP surface. Kept separate from the
//! domain types in `messaging-types` the way `openibank-api::dto` separates
//! request/response shapes from `openibank-db`'s row structs — a field
//! rename on the wire shouldn't force a migration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use messaging_types::{Channel, Message, MessageStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendRequestBody {
    pub recipient_handle: Option<String>,
    pub recipient_phone_hash: Option<String>,
    pub recipient_wallet: Option<String>,
    pub ciphertext: String,
    pub content_hash: String,
    pub idempotency_key: Option<String>,
    #[schema(value_type = Option<String>)]
    pub channel: Option<Channel>,
    pub device_id: Option<String>,
    #[serde(default)]
    pub user_agent_hints: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendResponse {
    pub message_id: uuid::Uuid,
    pub paid: i64,
    #[schema(value_type = String)]
    pub status: MessageStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InboxMessage {
    pub id: uuid::Uuid,
    pub sender_id: String,
    pub sender_wallet_address: String,
    pub ciphertext: String,
    pub content_hash: String,
    pub price: i64,
    #[schema(value_type = String)]
    pub status: MessageStatus,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InboxMessage {
    pub fn from_entry(message: Message, sender_wallet_address: String) -> Self {
        Self {
            id: message.id,
            sender_id: message.sender_id,
            sender_wallet_address,
            ciphertext: message.ciphertext,
            content_hash: message.content_hash,
            price: message.price,
            status: message.status,
            tx_hash: message.tx_hash,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InboxResponse {
    pub messages: Vec<InboxMessage>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PricingProfileBody {
    pub default_price: i64,
    pub first_contact_price: i64,
    pub return_discount_bps: i32,
    pub accepts_all: bool,
}

impl From<messaging_types::PricingProfile> for PricingProfileBody {
    fn from(p: messaging_types::PricingProfile) -> Self {
        Self {
            default_price: p.default_price,
            first_contact_price: p.first_contact_price,
            return_discount_bps: p.return_discount_bps,
            accepts_all: p.accepts_all,
        }
    }
}

impl From<PricingProfileBody> for messaging_types::PricingProfile {
    fn from(b: PricingProfileBody) -> Self {
        Self {
            default_price: b.default_price,
            first_contact_price: b.first_contact_price,
            return_discount_bps: b.return_discount_bps,
            accepts_all: b.accepts_all,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChannelConnectBody {
    #[schema(value_type = String)]
    pub channel: Channel,
    pub external_handle: String,
    #[serde(default)]
    pub secret_ref: Option<String>,
    #[serde(default)]
    pub terms_version: Option<String>,
    #[serde(default)]
    pub terms_accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChannelStatusResponse {
    #[schema(value_type = String)]
    pub channel: Channel,
    pub external_handle: String,
    #[schema(value_type = String)]
    pub status: messaging_types::ConnectionStatus,
    pub consent_version: String,
    pub consent_current: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AlertHookAck {
    pub received: usize,
}
