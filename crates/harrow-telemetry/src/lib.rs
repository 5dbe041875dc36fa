#![forbid(unsafe_code)]

//! Logging initialisation.
//!
//! Centralises tracing setup behind one entry point so every command
//! logs the same way. `RUST_LOG` wins over the verbosity flag when set.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logging configuration derived from CLI flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingConfig {
    /// Occurrences of `-v`; 0 = info, 1 = debug, 2+ = trace.
    pub verbosity: u8,
    /// Emit JSON instead of human-readable lines.
    pub json: bool,
}

impl LoggingConfig {
    fn level(self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Configure and install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level()));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()
            .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
    }
}
