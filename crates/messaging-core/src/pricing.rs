//! Pricing computation for a single send.
//!
//! The three-way rule is evaluated in a fixed order — sender-has-sent-before
//! always wins over recipient-has-sent-before — because that's the literal
//! order the pipeline spells out, even though one of the walkthrough
//! scenarios derives a different number for the case where
//! both histories are non-empty. See `DESIGN.md` for the resolution: we
//! follow the written step order, not the scenario narrative.

use messaging_types::PricingProfile;

/// Which of the three pricing rules fired, surfaced so callers (audit,
/// metrics) can label a send without recomputing the history lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingRule {
    Default,
    ReturnDiscount,
    FirstContact,
}

#[derive(Debug, Clone, Copy)]
pub struct PricingDecision {
    pub price: i64,
    pub rule: PricingRule,
}

/// Prior contact history between a sender and a recipient, as known to the
/// orchestrator at the time pricing is computed. Both fields only count
/// non-failed messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactHistory {
    pub sender_has_sent_to_recipient: bool,
    pub recipient_has_sent_to_sender: bool,
}

/// Computes the price of a message from `recipient_pricing`, given what the
/// orchestrator already knows about prior contact between the two parties.
///
/// Rounding: the return-discount rule floors to the nearest integer unit, so
/// `returnDiscountBps = 10000` yields exactly `0` and `bps = 0` yields
/// exactly `defaultPrice`.
pub fn compute_price(recipient_pricing: &PricingProfile, history: ContactHistory) -> PricingDecision {
    if history.sender_has_sent_to_recipient {
        PricingDecision {
            price: recipient_pricing.default_price,
            rule: PricingRule::Default,
        }
    } else if history.recipient_has_sent_to_sender {
        let bps = recipient_pricing.return_discount_bps as i64;
        let price = (recipient_pricing.default_price * (10_000 - bps)) / 10_000;
        PricingDecision {
            price,
            rule: PricingRule::ReturnDiscount,
        }
    } else {
        PricingDecision {
            price: recipient_pricing.first_contact_price,
            rule: PricingRule::FirstContact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> PricingProfile {
        PricingProfile {
            default_price: 200,
            first_contact_price: 500,
            return_discount_bps: 500,
            accepts_all: true,
        }
    }

    #[test]
    fn first_contact_when_no_history() {
        let d = compute_price(&profile(), ContactHistory::default());
        assert_eq!(d.price, 500);
        assert_eq!(d.rule, PricingRule::FirstContact);
    }

    #[test]
    fn return_discount_when_only_recipient_has_sent() {
        let history = ContactHistory {
            sender_has_sent_to_recipient: false,
            recipient_has_sent_to_sender: true,
        };
        let d = compute_price(&profile(), history);
        // 200 * (10000 - 500) / 10000 = 190
        assert_eq!(d.price, 190);
        assert_eq!(d.rule, PricingRule::ReturnDiscount);
    }

    #[test]
    fn default_price_once_sender_has_sent_before() {
        let history = ContactHistory {
            sender_has_sent_to_recipient: true,
            recipient_has_sent_to_sender: true,
        };
        let d = compute_price(&profile(), history);
        assert_eq!(d.price, 200);
        assert_eq!(d.rule, PricingRule::Default);
    }

    #[test]
    fn full_discount_bps_yields_zero() {
        let mut p = profile();
        p.return_discount_bps = 10_000;
        let history = ContactHistory {
            sender_has_sent_to_recipient: false,
            recipient_has_sent_to_sender: true,
        };
        assert_eq!(compute_price(&p, history).price, 0);
    }

    #[test]
    fn zero_discount_bps_yields_default_price() {
        let mut p = profile();
        p.return_discount_bps = 0;
        let history = ContactHistory {
            sender_has_sent_to_recipient: false,
            recipient_has_sent_to_sender: true,
        };
        assert_eq!(compute_price(&p, history).price, p.default_price);
    }
}
