//! Best-effort audit log persistence.
//!
//! Grounded on `openibank-db::repos::audit`'s query shapes, narrowed to the
//! event-type-oriented log this system needs (no IP/user-agent columns —
//! those belonged to a session-auth domain this backend doesn't have).

use chrono::Utc;
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::DbAuditLog;
use crate::store::{Backend, Store};

impl Store {
    pub async fn audit_log(
        &self,
        user_id: Option<&str>,
        event_type: &str,
        resource_type: Option<&str>,
        resource_id: Option<&str>,
        details: Option<&serde_json::Value>,
    ) -> DbResult<()> {
        let now = Utc::now();
        let details_str = details.map(|d| d.to_string());
        match &self.backend {
            Backend::Sql(pool) => {
                sqlx::query(
                    "INSERT INTO audit_log (id, user_id, event_type, resource_type, resource_id, details, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(event_type)
                .bind(resource_type)
                .bind(resource_id)
                .bind(details_str)
                .bind(now)
                .execute(pool)
                .await?;
                Ok(())
            }
            Backend::File(fs) => {
                let mut log = fs.audit_log.lock().await;
                log.push(DbAuditLog {
                    id: Uuid::new_v4(),
                    user_id: user_id.map(str::to_string),
                    event_type: event_type.to_string(),
                    resource_type: resource_type.map(str::to_string),
                    resource_id: resource_id.map(str::to_string),
                    details: details_str,
                    created_at: now,
                });
                fs.persist("audit_log.json", &*log).await?;
                Ok(())
            }
        }
    }

    pub async fn list_recent_audit(&self, limit: i64) -> DbResult<Vec<DbAuditLog>> {
        match &self.backend {
            Backend::Sql(pool) => {
                let rows = sqlx::query_as::<_, DbAuditLog>(
                    "SELECT * FROM audit_log ORDER BY created_at DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(pool)
                .await?;
                Ok(rows)
            }
            Backend::File(fs) => {
                let log = fs.audit_log.lock().await;
                let mut rows: Vec<DbAuditLog> = log.clone();
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                rows.truncate(limit.max(0) as usize);
                Ok(rows)
            }
        }
    }
}
