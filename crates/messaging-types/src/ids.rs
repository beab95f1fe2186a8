//! Identifier aliases.
//!
//! Following `openibank-types`/`openibank-db`'s convention, identifiers are
//! plain `Uuid` (or `String` for the opaque user identity id) rather than
//! single-field newtypes — this keeps `sqlx::FromRow` derives working
//! unmodified across `messaging-db`'s row structs.

use uuid::Uuid;

/// Opaque user identity id. Kept as `String` rather than `Uuid`, since
/// identities may originate from
/// non-UUID external auth providers.
pub type UserId = String;

pub type MessageId = Uuid;
pub type DeliveryJobId = Uuid;
pub type ChainEventId = Uuid;
pub type AbuseEventId = Uuid;
