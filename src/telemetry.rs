//! Tracing subscriber setup for embedding applications

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
    /// Filter used when `RUST_LOG` is unset (e.g., "info", "wallet_custody=debug")
    pub default_directive: String,
    #[serde(default)]
    pub verbose: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            json: false,
            default_directive: "info".to_string(),
            verbose: false,
        }
    }
}

impl TracingConfig {
    fn filter(&self) -> EnvFilter {
        if self.verbose {
            return EnvFilter::new("debug");
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))
    }
}

/// Install the global subscriber
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(config.filter());

    let installed = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    installed.map_err(|e| Error::Config(format!("tracing already initialized: {}", e)))
}
