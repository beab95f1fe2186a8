//! Abuse counters, blocks, and scored events.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use messaging_types::{AbuseBlock, AbuseKeyType};

use crate::error::DbResult;
use crate::models::DbAbuseBlock;
use crate::store::{Backend, Store};

impl Store {
    /// Increments the sliding-window counter for `(key_type, key_value,
    /// window_start)`, creating it at 1 if absent, and returns the count
    /// after the increment.
    pub async fn increment_abuse_counter(
        &self,
        key_type: AbuseKeyType,
        key_value: &str,
        window_start: DateTime<Utc>,
    ) -> DbResult<i64> {
        match &self.backend {
            Backend::Sql(pool) => {
                let row: (i64,) = sqlx::query_as(
                    r#"
                    INSERT INTO abuse_counters (key_type, key_value, window_start, count)
                    VALUES (?, ?, ?, 1)
                    ON CONFLICT (key_type, key_value, window_start) DO UPDATE SET count = abuse_counters.count + 1
                    RETURNING count
                    "#,
                )
                .bind(key_type.as_str())
                .bind(key_value)
                .bind(window_start)
                .fetch_one(pool)
                .await?;
                Ok(row.0)
            }
            Backend::File(fs) => {
                let mut counters = fs.abuse_counters.lock().await;
                let key = format!("{}:{}:{}", key_type.as_str(), key_value, window_start.timestamp());
                let entry = counters
                    .entry(key)
                    .or_insert_with(|| crate::models::DbAbuseCounter {
                        key_type: key_type.as_str().to_string(),
                        key_value: key_value.to_string(),
                        window_start,
                        count: 0,
                    });
                entry.count += 1;
                Ok(entry.count)
            }
        }
    }

    pub async fn get_abuse_block(&self, key_type: AbuseKeyType, key_value: &str) -> DbResult<Option<AbuseBlock>> {
        match &self.backend {
            Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbAbuseBlock>(
                    "SELECT * FROM abuse_blocks WHERE key_type = ? AND key_value = ?",
                )
                .bind(key_type.as_str())
                .bind(key_value)
                .fetch_optional(pool)
                .await?;
                Ok(row.map(Into::into))
            }
            Backend::File(fs) => Ok(fs
                .abuse_blocks
                .lock()
                .await
                .get(&format!("{}:{}", key_type.as_str(), key_value))
                .cloned()
                .map(Into::into)),
        }
    }

    /// Upserts a block, always keeping the later of the existing and
    /// incoming expiry (`blocked_until = max(existing, incoming)`) so a
    /// second, shorter-lived offense can't shorten an
    /// existing block.
    pub async fn upsert_abuse_block(
        &self,
        key_type: AbuseKeyType,
        key_value: &str,
        blocked_until: DateTime<Utc>,
        reason: &str,
    ) -> DbResult<()> {
        let now = Utc::now();
        match &self.backend {
            Backend::Sql(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO abuse_blocks (key_type, key_value, blocked_until, reason, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT (key_type, key_value) DO UPDATE SET
                        blocked_until = CASE
                            WHEN excluded.blocked_until > abuse_blocks.blocked_until THEN excluded.blocked_until
                            ELSE abuse_blocks.blocked_until
                        END,
                        reason = excluded.reason,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(key_type.as_str())
                .bind(key_value)
                .bind(blocked_until)
                .bind(reason)
                .bind(now)
                .execute(pool)
                .await?;
                Ok(())
            }
            Backend::File(fs) => {
                let mut blocks = fs.abuse_blocks.lock().await;
                let key = format!("{}:{}", key_type.as_str(), key_value);
                let merged_until = blocks
                    .get(&key)
                    .map(|existing| existing.blocked_until.max(blocked_until))
                    .unwrap_or(blocked_until);
                blocks.insert(
                    key,
                    DbAbuseBlock {
                        key_type: key_type.as_str().to_string(),
                        key_value: key_value.to_string(),
                        blocked_until: merged_until,
                        reason: reason.to_string(),
                        updated_at: now,
                    },
                );
                Ok(())
            }
        }
    }

    pub async fn record_abuse_event(
        &self,
        key_type: AbuseKeyType,
        key_value: &str,
        score: f64,
        reason: &str,
    ) -> DbResult<()> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        match &self.backend {
            Backend::Sql(pool) => {
                sqlx::query(
                    "INSERT INTO abuse_events (id, key_type, key_value, score, reason, occurred_at) VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(id)
                .bind(key_type.as_str())
                .bind(key_value)
                .bind(score)
                .bind(reason)
                .bind(now)
                .execute(pool)
                .await?;
                Ok(())
            }
            Backend::File(fs) => {
                let mut events = fs.abuse_events.lock().await;
                events.insert(
                    id.to_string(),
                    crate::models::DbAbuseEvent {
                        id,
                        key_type: key_type.as_str().to_string(),
                        key_value: key_value.to_string(),
                        score,
                        reason: reason.to_string(),
                        occurred_at: now,
                    },
                );
                fs.persist("abuse_events.json", &*events).await?;
                Ok(())
            }
        }
    }
}
