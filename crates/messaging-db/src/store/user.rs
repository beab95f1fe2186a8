//! User and pricing-profile persistence.
//!
//! Grounded on `openibank-db::repos::user` (lookup-by-unique-column shape)
//! and `openibank-db::repos::wallet` (balance-mutation-under-lock shape,
//! adapted here for `SELECT ... FOR UPDATE` style re-reads before debit).

use chrono::Utc;

use messaging_types::{MessagingError, PricingProfile, User};

use crate::error::{DbError, DbResult};
use crate::models::{DbPricingProfile, DbUser};
use crate::store::Store;

impl Store {
    pub async fn create_user(
        &self,
        id: &str,
        wallet_address: &str,
        initial_balance: i64,
    ) -> DbResult<User> {
        let now = Utc::now();
        let wallet = User::normalize_wallet(wallet_address);
        match &self.backend {
            crate::store::Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbUser>(
                    r#"
                    INSERT INTO users (id, wallet_address, balance, discoverable_by_handle, discoverable_by_phone, created_at, updated_at)
                    VALUES (?, ?, ?, true, false, ?, ?)
                    RETURNING id, wallet_address, email_hash, phone_hash, handle, discoverable_by_handle, discoverable_by_phone, balance, handle_changed_at, created_at, updated_at
                    "#,
                )
                .bind(id)
                .bind(&wallet)
                .bind(initial_balance)
                .bind(now)
                .bind(now)
                .fetch_one(pool)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        DbError::Duplicate(format!("wallet address {wallet} already bound"))
                    } else {
                        e.into()
                    }
                })?;
                Ok(row.into())
            }
            crate::store::Backend::File(fs) => {
                let mut users = fs.users.lock().await;
                if users.values().any(|u| u.wallet_address == wallet) {
                    return Err(DbError::Duplicate(format!("wallet address {wallet} already bound")));
                }
                let row = DbUser {
                    id: id.to_string(),
                    wallet_address: wallet,
                    email_hash: None,
                    phone_hash: None,
                    handle: None,
                    discoverable_by_handle: true,
                    discoverable_by_phone: false,
                    balance: initial_balance,
                    handle_changed_at: None,
                    created_at: now,
                    updated_at: now,
                };
                users.insert(row.id.clone(), row.clone());
                fs.persist("users.json", &*users).await?;
                Ok(row.into())
            }
        }
    }

    pub async fn get_user(&self, id: &str) -> DbResult<Option<User>> {
        match &self.backend {
            crate::store::Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE id = ?")
                    .bind(id)
                    .fetch_optional(pool)
                    .await?;
                Ok(row.map(Into::into))
            }
            crate::store::Backend::File(fs) => {
                Ok(fs.users.lock().await.get(id).cloned().map(Into::into))
            }
        }
    }

    pub async fn get_user_by_wallet(&self, wallet_address: &str) -> DbResult<Option<User>> {
        let wallet = User::normalize_wallet(wallet_address);
        match &self.backend {
            crate::store::Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE wallet_address = ?")
                    .bind(&wallet)
                    .fetch_optional(pool)
                    .await?;
                Ok(row.map(Into::into))
            }
            crate::store::Backend::File(fs) => Ok(fs
                .users
                .lock()
                .await
                .values()
                .find(|u| u.wallet_address == wallet)
                .cloned()
                .map(Into::into)),
        }
    }

    pub async fn get_user_by_phone_hash(&self, phone_hash: &str) -> DbResult<Option<User>> {
        match &self.backend {
            crate::store::Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbUser>(
                    "SELECT * FROM users WHERE phone_hash = ? AND discoverable_by_phone = true",
                )
                .bind(phone_hash)
                .fetch_optional(pool)
                .await?;
                Ok(row.map(Into::into))
            }
            crate::store::Backend::File(fs) => Ok(fs
                .users
                .lock()
                .await
                .values()
                .find(|u| u.phone_hash.as_deref() == Some(phone_hash) && u.discoverable_by_phone)
                .cloned()
                .map(Into::into)),
        }
    }

    pub async fn get_user_by_handle(&self, handle: &str) -> DbResult<Option<User>> {
        match &self.backend {
            crate::store::Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbUser>(
                    "SELECT * FROM users WHERE handle = ? AND discoverable_by_handle = true",
                )
                .bind(handle)
                .fetch_optional(pool)
                .await?;
                Ok(row.map(Into::into))
            }
            crate::store::Backend::File(fs) => Ok(fs
                .users
                .lock()
                .await
                .values()
                .find(|u| u.handle.as_deref() == Some(handle) && u.discoverable_by_handle)
                .cloned()
                .map(Into::into)),
        }
    }

    pub async fn set_handle(&self, user_id: &str, handle: &str) -> DbResult<()> {
        let now = Utc::now();
        match &self.backend {
            crate::store::Backend::Sql(pool) => {
                let result = sqlx::query(
                    "UPDATE users SET handle = ?, handle_changed_at = ?, updated_at = ? WHERE id = ?",
                )
                .bind(handle)
                .bind(now)
                .bind(now)
                .bind(user_id)
                .execute(pool)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        DbError::Duplicate(format!("handle {handle} already taken"))
                    } else {
                        e.into()
                    }
                })?;
                if result.rows_affected() == 0 {
                    return Err(DbError::NotFound(format!("user {user_id}")));
                }
                Ok(())
            }
            crate::store::Backend::File(fs) => {
                let mut users = fs.users.lock().await;
                if users
                    .values()
                    .any(|u| u.handle.as_deref() == Some(handle) && u.id != user_id)
                {
                    return Err(DbError::Duplicate(format!("handle {handle} already taken")));
                }
                let user = users.get_mut(user_id).ok_or_else(|| DbError::NotFound(user_id.to_string()))?;
                user.handle = Some(handle.to_string());
                user.handle_changed_at = Some(now);
                user.updated_at = now;
                fs.persist("users.json", &*users).await?;
                Ok(())
            }
        }
    }

    pub async fn get_pricing_profile(&self, user_id: &str) -> DbResult<PricingProfile> {
        match &self.backend {
            crate::store::Backend::Sql(pool) => {
                let row = sqlx::query_as::<_, DbPricingProfile>(
                    "SELECT * FROM pricing_profiles WHERE user_id = ?",
                )
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
                Ok(row.map(Into::into).unwrap_or_default())
            }
            crate::store::Backend::File(fs) => Ok(fs
                .pricing_profiles
                .lock()
                .await
                .get(user_id)
                .cloned()
                .map(Into::into)
                .unwrap_or_default()),
        }
    }

    pub async fn set_pricing_profile(&self, user_id: &str, pricing: &PricingProfile) -> DbResult<()> {
        if !pricing.is_valid() {
            return Err(DbError::InvalidInput("pricing profile out of bounds".into()));
        }
        match &self.backend {
            crate::store::Backend::Sql(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO pricing_profiles (user_id, default_price, first_contact_price, return_discount_bps, accepts_all)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT (user_id) DO UPDATE SET
                        default_price = excluded.default_price,
                        first_contact_price = excluded.first_contact_price,
                        return_discount_bps = excluded.return_discount_bps,
                        accepts_all = excluded.accepts_all
                    "#,
                )
                .bind(user_id)
                .bind(pricing.default_price)
                .bind(pricing.first_contact_price)
                .bind(pricing.return_discount_bps)
                .bind(pricing.accepts_all)
                .execute(pool)
                .await?;
                Ok(())
            }
            crate::store::Backend::File(fs) => {
                let mut profiles = fs.pricing_profiles.lock().await;
                profiles.insert(
                    user_id.to_string(),
                    DbPricingProfile {
                        user_id: user_id.to_string(),
                        default_price: pricing.default_price,
                        first_contact_price: pricing.first_contact_price,
                        return_discount_bps: pricing.return_discount_bps,
                        accepts_all: pricing.accepts_all,
                    },
                );
                fs.persist("pricing_profiles.json", &*profiles).await?;
                Ok(())
            }
        }
    }
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

/// Maps a balance shortfall into the stable API-facing error at the call
/// site that knows both figures (the orchestrator, not this crate).
pub fn insufficient_balance(available: i64, required: i64) -> MessagingError {
    MessagingError::InsufficientBalance { available, required }
}
