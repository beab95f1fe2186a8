/// Injected configuration for the abuse engine. A plain struct, not a
/// process-wide static — tests build an `AbuseEngine` with a fixture config
/// instead of mutating env vars. Each dimension carries its own `{weight,
/// max}` pair so a deployment can, say, weight sender velocity heavily
/// while leaving IP/device dimensions as pure counters (weight 0).
#[derive(Debug, Clone)]
pub struct AbuseEngineConfig {
    pub enabled: bool,
    pub window_ms: i64,
    pub sender_max: i64,
    pub recipient_max: i64,
    pub ip_max: i64,
    pub device_max: i64,
    pub sender_weight: f64,
    pub recipient_weight: f64,
    pub ip_weight: f64,
    pub device_weight: f64,
    pub missing_user_agent_penalty: f64,
    pub score_limit: f64,
    pub block_duration_ms: i64,
}

impl Default for AbuseEngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: 60_000,
            sender_max: 20,
            recipient_max: 20,
            ip_max: 30,
            device_max: 30,
            sender_weight: 1.0,
            recipient_weight: 1.0,
            ip_weight: 1.0,
            device_weight: 1.0,
            missing_user_agent_penalty: 2.0,
            score_limit: 10.0,
            block_duration_ms: 15 * 60_000,
        }
    }
}
