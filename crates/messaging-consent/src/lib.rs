//! Channel consent gate: decides which of a recipient's connected channels
//! may currently receive delivery jobs.
//!
//! A small, stateless policy crate in the shape of `openibank-policy`: a
//! config struct plus pure functions, no I/O of its own. The "what counts as
//! current" primitive (`messaging_db::is_consent_current`) lives next to the
//! row it reads; this crate owns the one live fact that primitive needs —
//! the currently required terms version — and the fan-out filtering built on
//! top of it.

use messaging_db::is_consent_current;
use messaging_types::{Channel, ChannelConnection};

/// The currently required terms-of-service version. A plain struct so the
/// orchestrator/indexer can inject a fixture version in tests instead of
/// reading a global constant.
#[derive(Debug, Clone)]
pub struct ConsentConfig {
    pub legal_tos_version: String,
}

impl ConsentConfig {
    pub fn new(legal_tos_version: impl Into<String>) -> Self {
        Self {
            legal_tos_version: legal_tos_version.into(),
        }
    }
}

pub struct ConsentGate {
    config: ConsentConfig,
}

impl ConsentGate {
    pub fn new(config: ConsentConfig) -> Self {
        Self { config }
    }

    /// The terms version a fresh `channel-connect` defaults to when the
    /// caller doesn't supply one.
    pub fn legal_tos_version(&self) -> &str {
        &self.config.legal_tos_version
    }

    /// A channel is "terms-gated" when it requires acceptance at all.
    /// Non-gated channels are always consent-current regardless of
    /// connection state.
    pub fn is_terms_gated(&self, channel: Channel) -> bool {
        channel.requires_terms_acceptance()
    }

    /// Whether a connection may receive delivery jobs right now.
    pub fn is_current(&self, connection: &ChannelConnection) -> bool {
        if !self.is_terms_gated(connection.channel) {
            return true;
        }
        is_consent_current(connection, &self.config.legal_tos_version)
    }

    /// Filters a user's connections down to the ones fan-out may target —
    /// the same enqueue gate the send pipeline and the chain indexer both
    /// apply before queuing a delivery job.
    pub fn current_connections<'a>(
        &self,
        connections: &'a [ChannelConnection],
    ) -> Vec<&'a ChannelConnection> {
        connections.iter().filter(|c| self.is_current(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use messaging_types::ConnectionStatus;

    fn connection(channel: Channel, version: &str, status: ConnectionStatus) -> ChannelConnection {
        ChannelConnection {
            user_id: "u1".into(),
            channel,
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
    fn stale_version_is_filtered_out() {
        let gate = ConsentGate::new(ConsentConfig::new("v2"));
        let conns = vec![connection(Channel::WhatsApp, "v1", ConnectionStatus::Active)];
        assert!(gate.current_connections(&conns).is_empty());
    }

    #[test]
    fn matching_version_and_active_status_passes() {
        let gate = ConsentGate::new(ConsentConfig::new("v2"));
        let conns = vec![connection(Channel::X, "v2", ConnectionStatus::Active)];
        assert_eq!(gate.current_connections(&conns).len(), 1);
    }

    #[test]
    fn disconnected_connection_never_passes() {
        let gate = ConsentGate::new(ConsentConfig::new("v2"));
        let conns = vec![connection(Channel::WhatsApp, "v2", ConnectionStatus::Disconnected)];
        assert!(gate.current_connections(&conns).is_empty());
    }

    #[test]
    fn never_accepted_never_counts_as_current() {
        let gate = ConsentGate::new(ConsentConfig::new("v2"));
        let mut conn = connection(Channel::WhatsApp, "v2", ConnectionStatus::Active);
        conn.consent_accepted_at = None;
        assert!(gate.current_connections(&[conn]).is_empty());
    }
}
