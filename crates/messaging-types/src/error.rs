//! Stable, user-visible error taxonomy for the messaging backend.
//!
//! Every variant here is surfaced to a caller (HTTP layer, SDK, CLI) with a
//! stable string code from [`MessagingError::error_code`]. Internal storage
//! faults (`messaging-db::DbError`) are mapped into `Internal` at the crate
//! boundary that produced them; they never cross into this enum unmapped.

use thiserror::Error;

/// Result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Stable, typed errors surfaced by the core subsystems.
#[derive(Debug, Clone, Error)]
pub enum MessagingError {
    #[error("authentication required")]
    AuthRequired,

    #[error("authenticated user does not match sender")]
    AuthMismatch,

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("blocked for abuse, retry after {retry_after_ms}ms")]
    AbuseBlocked { retry_after_ms: u64, reason: String },

    #[error("cannot send a message to yourself")]
    SelfSendNotAllowed,

    #[error("insufficient balance: have {available}, need {required}")]
    InsufficientBalance { available: i64, required: i64 },

    #[error("recipient is not accepting messages from this sender")]
    NotAccepted,

    #[error("idempotency key already bound to a different request")]
    IdempotencyConflict,

    #[error("wallet address already bound to a different identity")]
    IdentityWalletCollision,

    #[error("invalid secret reference format")]
    InvalidSecretFormat,

    #[error("compliance requirement not met: {reason}")]
    ComplianceRequired { reason: String },

    #[error("notification provider unavailable: {reason}")]
    NotificationProviderUnavailable { reason: String },

    #[error("launch readiness checks have not passed")]
    LaunchNotReady,

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("validation error: {field} - {reason}")]
    ValidationError { field: String, reason: String },
}

impl MessagingError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable error code string for the wire response.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AuthRequired => "auth_required",
            Self::AuthMismatch => "auth_mismatch",
            Self::RateLimited { .. } => "rate_limited",
            Self::AbuseBlocked { .. } => "abuse_blocked",
            Self::SelfSendNotAllowed => "self_send_not_allowed",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::NotAccepted => "not_accepted",
            Self::IdempotencyConflict => "idempotency_conflict",
            Self::IdentityWalletCollision => "identity_wallet_collision",
            Self::InvalidSecretFormat => "invalid_secret_format",
            Self::ComplianceRequired { .. } => "compliance_required",
            Self::NotificationProviderUnavailable { .. } => "notification_provider_unavailable",
            Self::LaunchNotReady => "launch_not_ready",
            Self::Internal { .. } => "internal_error",
            Self::ValidationError { .. } => "validation_error",
        }
    }

    /// The HTTP status the boundary layer should map this to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AuthRequired => 401,
            Self::AuthMismatch => 403,
            Self::RateLimited { .. } => 429,
            Self::AbuseBlocked { .. } => 429,
            Self::SelfSendNotAllowed => 409,
            Self::InsufficientBalance { .. } => 409,
            Self::NotAccepted => 409,
            Self::IdempotencyConflict => 409,
            Self::IdentityWalletCollision => 409,
            Self::InvalidSecretFormat => 400,
            Self::ComplianceRequired { .. } => 403,
            Self::NotificationProviderUnavailable { .. } => 503,
            Self::LaunchNotReady => 503,
            Self::Internal { .. } => 500,
            Self::ValidationError { .. } => 400,
        }
    }

    /// Whether a client may safely retry with the same idempotency key.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Internal { .. } | Self::NotificationProviderUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_match_spec_strings() {
        assert_eq!(MessagingError::AuthRequired.error_code(), "auth_required");
        assert_eq!(MessagingError::SelfSendNotAllowed.error_code(), "self_send_not_allowed");
        assert_eq!(
            MessagingError::InsufficientBalance { available: 0, required: 1 }.error_code(),
            "insufficient_balance"
        );
    }

    #[test]
    fn retriable_errors() {
        assert!(MessagingError::internal("db down").is_retriable());
        assert!(!MessagingError::SelfSendNotAllowed.is_retriable());
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(MessagingError::SelfSendNotAllowed.http_status(), 409);
        assert_eq!(MessagingError::AuthRequired.http_status(), 401);
    }
}
