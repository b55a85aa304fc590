//! Node configuration

use std::str::FromStr;
use std::time::Duration;

use ripple_core::{RippleError, RippleResult};
use ripple_diffusion::DEFAULT_RETRY_INTERVAL;

/// Environment variable holding the gossip retry interval (e.g. `250ms`)
pub const RETRY_INTERVAL_ENV: &str = "RIPPLE_RETRY_INTERVAL";
/// Environment variable holding the inbound queue capacity
pub const INBOUND_BUFFER_ENV: &str = "RIPPLE_INBOUND_BUFFER";
/// Environment variable selecting `text` or `json` logs
pub const LOG_FORMAT_ENV: &str = "RIPPLE_LOG_FORMAT";

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = RippleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(RippleError::Config(format!(
                "{LOG_FORMAT_ENV}: unknown format `{other}`"
            ))),
        }
    }
}

/// Ripple node configuration
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Delay before re-sending a value to a neighbor that has not acknowledged it
    pub retry_interval: Duration,
    /// Maximum queued inbound envelopes
    pub inbound_buffer: usize,
    pub log_format: LogFormat,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            inbound_buffer: 1024,
            log_format: LogFormat::Text,
        }
    }
}

impl NodeConfig {
    /// Defaults overridden by `RIPPLE_*` environment variables
    pub fn from_env() -> RippleResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> RippleResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = NodeConfig::default();

        if let Some(raw) = lookup(RETRY_INTERVAL_ENV) {
            config.retry_interval = humantime::parse_duration(raw.trim())
                .map_err(|e| RippleError::Config(format!("{RETRY_INTERVAL_ENV}: {e}")))?;
        }

        if let Some(raw) = lookup(INBOUND_BUFFER_ENV) {
            config.inbound_buffer = raw
                .trim()
                .parse()
                .map_err(|e| RippleError::Config(format!("{INBOUND_BUFFER_ENV}: {e}")))?;
        }

        if let Some(raw) = lookup(LOG_FORMAT_ENV) {
            config.log_format = raw.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn validate(&self) -> RippleResult<()> {
        if self.retry_interval.is_zero() {
            return Err(RippleError::Config(
                "retry interval must be greater than zero".into(),
            ));
        }
        if self.inbound_buffer == 0 {
            return Err(RippleError::Config(
                "inbound buffer must hold at least one envelope".into(),
            ));
        }
        Ok(())
    }
}
