//! Identity bindings: how an opaque user id ties to an auth provider
//! subject and, at most once per non-revoked binding, a wallet address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMethod {
    Oauth,
    Siwe,
    Passkey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityBinding {
    pub user_id: UserId,
    pub method: IdentityMethod,
    pub provider: String,
    pub subject: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl IdentityBinding {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_active_iff_not_revoked() {
        let now = Utc::now();
        let mut b = IdentityBinding {
            user_id: "u1".into(),
            method: IdentityMethod::Oauth,
            provider: "google".into(),
            subject: "sub-1".into(),
            revoked_at: None,
            created_at: now,
        };
        assert!(b.is_active());
        b.revoked_at = Some(now);
        assert!(!b.is_active());
    }
}
