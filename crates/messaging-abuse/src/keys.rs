use sha2::{Digest, Sha256};

/// A stable hex-encoded SHA-256 digest used so raw IPs/device identifiers
/// never land in counters, blocks, or audit records.
pub fn hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)
}

pub fn ip_key(client_ip: &str) -> String {
    hash(&format!("ip:{client_ip}"))
}

/// Device key: explicit id wins when present, else a joined hash of
/// user-agent hints, else `None` when no signal is available at all.
pub fn device_key(explicit_id: Option<&str>, user_agent_hints: &[String]) -> Option<String> {
    if let Some(id) = explicit_id {
        return Some(hash(&format!("device:{id}")));
    }
    if user_agent_hints.is_empty() {
        return None;
    }
    Some(hash(&format!("ua:{}", user_agent_hints.join("|"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_key_prefers_explicit_id() {
        let explicit = device_key(Some("device-1"), &["Mozilla/5.0".into()]);
        let from_ua = device_key(None, &["Mozilla/5.0".into()]);
        assert_ne!(explicit, from_ua);
    }

    #[test]
    fn device_key_is_none_without_any_signal() {
        assert!(device_key(None, &[]).is_none());
    }
}
