//! Channel connection persistence: one row per `(user, channel)`, carrying
//! the consent state the delivery worker gates on before it will hand a job
//! to that channel's sink.

use chrono::{DateTime, Utc};

use messaging_types::{Channel, ChannelConnection, ConnectionStatus};

use crate::error::DbResult;
use crate::models::DbChannelConnection;
use crate::store::{Backend, Store};

impl Store {
    /// Upserts a channel connection. `consent_accepted_at` is preserved
    /// across a re-connect when the caller doesn't supply a new one — a
    /// `channel-connect` call that only updates the destination handle must
    /// not silently erase a previously recorded acceptance.
    pub async fn upsert_channel_connection(
        &self,
        user_id: &str,
        channel: Channel,
        external_handle: &str,
        secret_ref: &str,
        consent_version: &str,
        consent_accepted_at: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        let now = Utc::now();
        match &self.backend {
            Backend::Sql(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO channel_connections (user_id, channel, external_handle, secret_ref, consent_version, consent_accepted_at, status, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, 'active', ?, ?)
                    ON CONFLICT (user_id, channel) DO UPDATE SET
                        external_handle = excluded.external_handle,
                        secret_ref = excluded.secret_ref,
                        consent_version = excluded.consent_version,
                        consent_accepted_at = COALESCE(excluded.consent_accepted_at, channel_connections.consent_accepted_at),
                        status = 'active',
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(user_id)
                .bind(channel.as_str())
                .bind(external_handle)
                .bind(secret_ref)
                .bind(consent_version)
                .bind(consent_accepted_at)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await?;
                Ok(())
            }
            Backend::File(fs) => {
                let mut connections = fs.channel_connections.lock().await;
                let key = (user_id.to_string(), channel.as_str().to_string());
                let accepted_at = consent_accepted_at.or_else(|| connections.get(&key).and_then(|c| c.consent_accepted_at));
                connections.insert(
                    key,
                    DbChannelConnection {
                        user_id: user_id.to_string(),
                        channel: channel.as_str().to_string(),
                        external_handle: external_handle.to_string(),
                        secret_ref: secret_ref.to_string(),
                        consent_version: consent_version.to_string(),
                        consent_accepted_at: accepted_at,
                        status: "active".to_string(),
                        created_at: now,
                        updated_at: now,
                    },
                );
                Ok(())
            }
        }
    }

    pub async fn disconnect_channel(&self, user_id: &str, channel: Channel) -> DbResult<()> {
        let now = Utc::now();
        match &self.backend {
            Backend::Sql(pool) => {
                sqlx::query(
                    "UPDATE channel_connections SET status = 'disconnected', updated_at = ? WHERE user_id = ? AND channel = ?",
                )
                .bind(now)
                .bind(user_id)
                .bind(channel.as_str())
                .execute(pool)
                .await?;
                Ok(())
            }
            Backend::File(fs) => {
                let mut connections = fs.channel_connections.lock().await;
                if let Some(row) = connections.get_mut(&(user_id.to_string(), channel.as_str().to_string())) {
                    row.status = "disconnected".to_string();
                    row.updated_at = now;
                }
                Ok(())
            }
        }
    }

    pub async fn get_channel_connection(&self, user_id: &str, channel: Channel) -> DbResult<Option<ChannelConnection>> {
        match &self.backend {
            Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbChannelConnection>(
                    "SELECT * FROM channel_connections WHERE user_id = ? AND channel = ?",
                )
                .bind(user_id)
                .bind(channel.as_str())
                .fetch_optional(pool)
                .await?;
                Ok(row.map(Into::into))
            }
            Backend::File(fs) => Ok(fs
                .channel_connections
                .lock()
                .await
                .get(&(user_id.to_string(), channel.as_str().to_string()))
                .cloned()
                .map(Into::into)),
        }
    }

    /// All channel connections for a user that are currently active — the
    /// set the orchestrator and chain indexer both fan delivery jobs out to
    /// before the consent gate narrows it further.
    pub async fn active_connections_for_user(&self, user_id: &str) -> DbResult<Vec<ChannelConnection>> {
        match &self.backend {
            Backend::Sql(pool) => {
                let rows = sqlx::query_as::<_, DbChannelConnection>(
                    "SELECT * FROM channel_connections WHERE user_id = ? AND status = 'active'",
                )
                .bind(user_id)
                .fetch_all(pool)
                .await?;
                Ok(rows.into_iter().map(Into::into).collect())
            }
            Backend::File(fs) => Ok(fs
                .channel_connections
                .lock()
                .await
                .values()
                .filter(|c| c.user_id == user_id && c.status == "active")
                .cloned()
                .map(Into::into)
                .collect()),
        }
    }
}

/// A connection only receives delivery jobs when it's active, its accepted
/// consent version is the one currently required, and it actually has an
/// acceptance timestamp on record — a matching version with no recorded
/// acceptance is not consent-current. Kept as a free function, not a
/// `Store` method, because it's pure policy over data the Store already
/// returned — `messaging-consent` owns the live "what's current" source of
/// truth and calls this with that answer.
pub fn is_consent_current(connection: &ChannelConnection, required_version: &str) -> bool {
    connection.is_active() && connection.consent_version == required_version && connection.consent_accepted_at.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn connection(version: &str, status: ConnectionStatus) -> ChannelConnection {
        ChannelConnection {
            user_id: "u1".into(),
            channel: Channel::WhatsApp,
            external_handle: "+15555550100".into(),
            secret_ref: "secret-ref".into(),
            consent_version: version.into(),
            consent_accepted_at: Some(Utc::now()),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stale_consent_version_is_not_current() {
        let c = connection("v1", ConnectionStatus::Active);
        assert!(!is_consent_current(&c, "v2"));
        assert!(is_consent_current(&c, "v1"));
    }

    #[test]
    fn disconnected_never_counts_as_current() {
        let c = connection("v1", ConnectionStatus::Disconnected);
        assert!(!is_consent_current(&c, "v1"));
    }

    #[test]
    fn never_accepted_is_not_current() {
        let mut c = connection("v1", ConnectionStatus::Active);
        c.consent_accepted_at = None;
        assert!(!is_consent_current(&c, "v1"));
    }
}
