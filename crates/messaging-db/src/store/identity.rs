//! Identity binding persistence: links an
//! opaque user id to an auth-provider subject, and — at most once among
//! non-revoked bindings — to a wallet address.

use chrono::Utc;

use messaging_types::{IdentityBinding, IdentityMethod};

use crate::error::{DbError, DbResult};
use crate::models::DbIdentityBinding;
use crate::store::{Backend, Store};

impl Store {
    pub async fn save_identity_binding(
        &self,
        user_id: &str,
        method: IdentityMethod,
        provider: &str,
        subject: &str,
    ) -> DbResult<IdentityBinding> {
        let now = Utc::now();
        let method_str = method_str(method);
        match &self.backend {
            Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbIdentityBinding>(
                    r#"
                    INSERT INTO identity_bindings (user_id, method, provider, subject, revoked_at, created_at)
                    VALUES (?, ?, ?, ?, NULL, ?)
                    RETURNING *
                    "#,
                )
                .bind(user_id)
                .bind(method_str)
                .bind(provider)
                .bind(subject)
                .bind(now)
                .fetch_one(pool)
                .await
                .map_err(|e| {
                    if crate::store::user::is_unique_violation(&e) {
                        DbError::Duplicate(format!("identity subject {subject} already bound"))
                    } else {
                        e.into()
                    }
                })?;
                Ok(row.into())
            }
            Backend::File(fs) => {
                let mut bindings = fs.identity_bindings.lock().await;
                let key = format!("{provider}:{subject}");
                if bindings.values().any(|b| b.provider == provider && b.subject == subject && b.revoked_at.is_none()) {
                    return Err(DbError::Duplicate(format!("identity subject {subject} already bound")));
                }
                let row = DbIdentityBinding {
                    user_id: user_id.to_string(),
                    method: method_str.to_string(),
                    provider: provider.to_string(),
                    subject: subject.to_string(),
                    revoked_at: None,
                    created_at: now,
                };
                bindings.insert(key, row.clone());
                fs.persist("identity_bindings.json", &*bindings).await?;
                Ok(row.into())
            }
        }
    }

    pub async fn revoke_identity_binding(&self, provider: &str, subject: &str) -> DbResult<()> {
        let now = Utc::now();
        match &self.backend {
            Backend::Sql(pool) => {
                sqlx::query("UPDATE identity_bindings SET revoked_at = ? WHERE provider = ? AND subject = ?")
                    .bind(now)
                    .bind(provider)
                    .bind(subject)
                    .execute(pool)
                    .await?;
                Ok(())
            }
            Backend::File(fs) => {
                let mut bindings = fs.identity_bindings.lock().await;
                if let Some(row) = bindings.get_mut(&format!("{provider}:{subject}")) {
                    row.revoked_at = Some(now);
                }
                Ok(())
            }
        }
    }

    pub async fn find_identity_binding(&self, provider: &str, subject: &str) -> DbResult<Option<IdentityBinding>> {
        match &self.backend {
            Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbIdentityBinding>(
                    "SELECT * FROM identity_bindings WHERE provider = ? AND subject = ? AND revoked_at IS NULL",
                )
                .bind(provider)
                .bind(subject)
                .fetch_optional(pool)
                .await?;
                Ok(row.map(Into::into))
            }
            Backend::File(fs) => Ok(fs
                .identity_bindings
                .lock()
                .await
                .get(&format!("{provider}:{subject}"))
                .filter(|b| b.revoked_at.is_none())
                .cloned()
                .map(Into::into)),
        }
    }
}

fn method_str(method: IdentityMethod) -> &'static str {
    match method {
        IdentityMethod::Oauth => "oauth",
        IdentityMethod::Siwe => "siwe",
        IdentityMethod::Passkey => "passkey",
    }
}
