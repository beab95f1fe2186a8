//! Pricing and send-eligibility primitives for the paid-inbox messaging
//! backend.
//!
//! This crate holds the pure domain logic that sits between the wire layer
//! (`messaging-api`) and storage (`messaging-db`): given a sender, a
//! recipient's [`PricingProfile`](messaging_types::PricingProfile) and prior
//! contact history, what does this message cost, and is the sender even
//! allowed to send it.

pub mod pricing;

pub use pricing::*;
