//! Delivery job entity — the unit of work the delivery worker claims and
//! drains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::ids::{DeliveryJobId, MessageId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryJobStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl DeliveryJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Fixed retry backoff schedule, in seconds, indexed by attempt number.
/// The worker re-reads this on every retry rather than
/// baking a computed `next_attempt_at` assumption into callers.
pub const RETRY_BACKOFF_SECONDS: [u64; 6] = [1, 2, 5, 15, 30, 60];

/// Caps the last element so a job that has exhausted the named schedule
/// keeps retrying at the slowest cadence instead of panicking on overflow.
pub fn backoff_seconds_for_attempt(attempt: u32) -> u64 {
    let idx = (attempt as usize).saturating_sub(1).min(RETRY_BACKOFF_SECONDS.len() - 1);
    RETRY_BACKOFF_SECONDS[idx]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub id: DeliveryJobId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub channel: Channel,
    pub destination: String,
    pub payload: String,
    pub status: DeliveryJobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub error_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryJob {
    /// A job is eligible for claim when pending (or processing with an
    /// expired lease) and due.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            DeliveryJobStatus::Pending => self.next_attempt_at <= now,
            DeliveryJobStatus::Processing => {
                self.locked_until.map(|until| until <= now).unwrap_or(true)
            }
            DeliveryJobStatus::Done | DeliveryJobStatus::Failed => false,
        }
    }

    pub fn has_attempts_remaining(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_schedule_caps_at_last_entry() {
        assert_eq!(backoff_seconds_for_attempt(1), 1);
        assert_eq!(backoff_seconds_for_attempt(6), 60);
        assert_eq!(backoff_seconds_for_attempt(99), 60);
    }

    #[test]
    fn claimable_respects_lease_expiry() {
        let now = Utc::now();
        let mut job = DeliveryJob {
            id: uuid::Uuid::new_v4(),
            message_id: uuid::Uuid::new_v4(),
            user_id: "u1".into(),
            channel: Channel::WhatsApp,
            destination: "+15555550100".into(),
            payload: "{}".into(),
            status: DeliveryJobStatus::Processing,
            attempts: 1,
            max_attempts: 5,
            next_attempt_at: now,
            locked_by: Some("worker-1".into()),
            locked_until: Some(now + chrono::Duration::seconds(30)),
            error_text: None,
            created_at: now,
            updated_at: now,
        };
        assert!(!job.is_claimable(now));
        job.locked_until = Some(now - chrono::Duration::seconds(1));
        assert!(job.is_claimable(now));
    }
}
