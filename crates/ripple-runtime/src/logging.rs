//! Structured logging
//!
//! Stdout carries protocol envelopes, so every log line goes to stderr.

use tracing_subscriber::EnvFilter;

use ripple_core::{RippleError, RippleResult};

use crate::LogFormat;

/// Environment variable holding the `tracing` filter directive
pub const LOG_FILTER_ENV: &str = "RIPPLE_LOG";

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. Fails if one is already installed.
pub fn init(format: LogFormat) -> RippleResult<()> {
    let filter =
        EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    installed.map_err(|e| RippleError::Config(format!("logging: {e}")))
}
