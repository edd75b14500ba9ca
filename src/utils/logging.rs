//! Structured logging setup built on `tracing-subscriber`.
//!
//! The transport emits `tracing` events throughout; hosts that already install
//! their own subscriber can skip this module entirely.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install a global subscriber honoring `RUST_LOG`, falling back to the
/// configured level. Safe to call more than once; later calls are no-ops.
pub fn init(config: &LoggingConfig) {
    let fallback = format!("{}={}", env!("CARGO_PKG_NAME"), config.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    // A host application may have installed a subscriber already.
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_covers_both_formats_and_repeats() {
        let mut config = LoggingConfig::default();
        init(&config);

        // Second call with the JSON formatter must also be a safe no-op.
        config.json_format = true;
        init(&config);
    }
}
