//! External delivery channels and the user's connection to each.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    WhatsApp,
    X,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WhatsApp => "whatsapp",
            Self::X => "x",
        }
    }

    /// Parses a channel name, returning `None` rather than guessing on an
    /// unrecognized or empty string — callers decoding an optional,
    /// caller-controlled value (like a chain event's channel hint) should
    /// not silently misattribute it to the wrong channel.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "whatsapp" => Some(Self::WhatsApp),
            "x" => Some(Self::X),
            _ => None,
        }
    }

    /// Both external channels are terms-gated today; kept as a method
    /// (rather than a constant `true`) so a future channel can opt out.
    pub fn requires_terms_acceptance(&self) -> bool {
        matches!(self, Self::WhatsApp | Self::X)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Disconnected,
}

/// A user's link to one external channel: the destination to deliver to,
/// an opaque reference to the provider secret, and the terms-of-service
/// state gating delivery. `consent_accepted_at` is `None` until the caller
/// has actually supplied an acceptance timestamp — a connection can carry
/// the right `consent_version` and still never have been accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConnection {
    pub user_id: UserId,
    pub channel: Channel,
    pub external_handle: String,
    pub secret_ref: String,
    pub consent_version: String,
    pub consent_accepted_at: Option<DateTime<Utc>>,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChannelConnection {
    pub fn is_active(&self) -> bool {
        matches!(self.status, ConnectionStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_strings_round_trip() {
        assert_eq!(Channel::WhatsApp.as_str(), "whatsapp");
        assert_eq!(Channel::X.as_str(), "x");
        assert_eq!(Channel::parse("whatsapp"), Some(Channel::WhatsApp));
        assert_eq!(Channel::parse("x"), Some(Channel::X));
        assert_eq!(Channel::parse("carrier_pigeon"), None);
    }

    #[test]
    fn both_channels_are_terms_gated() {
        assert!(Channel::WhatsApp.requires_terms_acceptance());
        assert!(Channel::X.requires_terms_acceptance());
    }
}
