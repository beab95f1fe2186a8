//! Abuse engine entities: sliding-window counters, weighted scores, and the
//! blocks they produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbuseKeyType {
    Sender,
    Recipient,
    Ip,
    Device,
}

impl AbuseKeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sender => "sender",
            Self::Recipient => "recipient",
            Self::Ip => "ip",
            Self::Device => "device",
        }
    }
}

/// A fixed-width count of events for `(key_type, key_value)` within the
/// window starting at `window_start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbuseCounter {
    pub key_type: AbuseKeyType,
    pub key_value: String,
    pub window_start: DateTime<Utc>,
    pub count: i64,
}

/// A standing block for `(key_type, key_value)`, effective until
/// `blocked_until`. Renewing a block always takes the later of the two
/// expiries: `blocked_until = max(existing, incoming)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbuseBlock {
    pub key_type: AbuseKeyType,
    pub key_value: String,
    pub blocked_until: DateTime<Utc>,
    pub reason: String,
    pub updated_at: DateTime<Utc>,
}

impl AbuseBlock {
    pub fn merge_expiry(existing: DateTime<Utc>, incoming: DateTime<Utc>) -> DateTime<Utc> {
        existing.max(incoming)
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until > now
    }
}

/// A scored abuse signal recorded for audit/tuning, independent of whether
/// it crossed the blocking threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbuseEvent {
    pub id: crate::ids::AbuseEventId,
    pub key_type: AbuseKeyType,
    pub key_value: String,
    pub score: f64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn merge_expiry_takes_the_later_deadline() {
        let now = Utc::now();
        let earlier = now;
        let later = now + Duration::hours(1);
        assert_eq!(AbuseBlock::merge_expiry(earlier, later), later);
        assert_eq!(AbuseBlock::merge_expiry(later, earlier), later);
    }

    #[test]
    fn key_type_strings_match_spec() {
        assert_eq!(AbuseKeyType::Sender.as_str(), "sender");
        assert_eq!(AbuseKeyType::Device.as_str(), "device");
    }
}
