//! Canonical domain types for the paid-inbox messaging backend.
//!
//! This crate has zero dependencies on other messaging crates. It defines
//! the entities in the data model, the stable error taxonomy, and the small
//! set of cross-cutting enums (channels, abuse key types) that every other
//! crate in the workspace builds on.

pub mod error;
pub mod ids;
pub mod user;
pub mod message;
pub mod delivery;
pub mod chain;
pub mod channel;
pub mod identity;
pub mod abuse;

pub use error::*;
pub use ids::*;
pub use user::*;
pub use message::*;
pub use delivery::*;
pub use chain::*;
pub use channel::*;
pub use identity::*;
pub use abuse::*;
