//! User and pricing profile entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// A user of the paid-inbox system.
///
/// Invariant: `balance` is never negative after a committed transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub wallet_address: String,
    pub email_hash: Option<String>,
    pub phone_hash: Option<String>,
    pub handle: Option<String>,
    pub discoverable_by_handle: bool,
    pub discoverable_by_phone: bool,
    pub balance: i64,
    pub handle_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Lowercases and trims a wallet address the way every lookup path must,
    /// so callers can't accidentally bypass the unique constraint by casing.
    pub fn normalize_wallet(address: &str) -> String {
        address.trim().to_lowercase()
    }
}

/// Per-recipient pricing configuration (1:1 with [`User`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricingProfile {
    pub default_price: i64,
    pub first_contact_price: i64,
    pub return_discount_bps: i32,
    pub accepts_all: bool,
}

impl Default for PricingProfile {
    fn default() -> Self {
        Self {
            default_price: 100,
            first_contact_price: 250,
            return_discount_bps: 0,
            accepts_all: true,
        }
    }
}

impl PricingProfile {
    /// Basis points are defined over 0..=10000 inclusive.
    pub fn is_valid(&self) -> bool {
        (0..=10_000).contains(&self.return_discount_bps)
            && self.default_price >= 0
            && self.first_contact_price >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_normalization_lowercases_and_trims() {
        assert_eq!(User::normalize_wallet(" 0xABC123 "), "0xabc123");
    }

    #[test]
    fn pricing_profile_bps_bounds() {
        let mut p = PricingProfile::default();
        p.return_discount_bps = 10_000;
        assert!(p.is_valid());
        p.return_discount_bps = 10_001;
        assert!(!p.is_valid());
        p.return_discount_bps = -1;
        assert!(!p.is_valid());
    }
}
