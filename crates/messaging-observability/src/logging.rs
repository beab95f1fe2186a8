//! Logging init, grounded on `openibank-api-server::main::init_logging`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone)]
pub enum LogFormat {
    Pretty,
    Json,
}

pub fn init_logging(default_level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => {
            subscriber.with(fmt::layer().json().with_target(true)).init();
        }
        LogFormat::Pretty => {
            subscriber.with(fmt::layer().pretty().with_target(true)).init();
        }
    }
}
