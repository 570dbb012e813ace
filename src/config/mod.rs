//! Configuration for the wallet custody engine

pub mod rpc;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::tokens::{self, chains, TokenInfo, TokenRegistry};
use crate::wallet::KdfParams;
use crate::{Error, Result};

pub use rpc::RpcConfig;

/// Default price feed (CoinGecko simple price endpoint)
pub const DEFAULT_PRICE_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// Explicit timeouts for every network boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Balance, rate, nonce, fee and status queries (milliseconds)
    pub query_ms: u64,
    /// A single broadcast attempt (milliseconds)
    pub broadcast_ms: u64,
    /// Identity service calls (milliseconds)
    pub identity_ms: u64,
}

impl TimeoutConfig {
    pub fn query(&self) -> Duration {
        Duration::from_millis(self.query_ms)
    }

    pub fn broadcast(&self) -> Duration {
        Duration::from_millis(self.broadcast_ms)
    }

    pub fn identity(&self) -> Duration {
        Duration::from_millis(self.identity_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            query_ms: 10_000,
            broadcast_ms: 15_000,
            identity_ms: 10_000,
        }
    }
}

/// Exponential backoff for chain reads and broadcasts that fail transiently
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Chain the wallet transacts on
    pub chain_id: u64,
    /// Explicit RPC URL; when unset it is resolved from the environment
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Tracked tokens, aggregated in this order
    pub tokens: Vec<TokenInfo>,
    /// Symbol of the token transfers are sent in
    pub transfer_token: String,
    /// Fiat currency code understood by the price feed (e.g., "brl")
    pub fiat_currency: String,
    pub price_api_url: String,
    /// Base URL of the identity service
    #[serde(default)]
    pub identity_base_url: Option<String>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Password key-derivation cost for new wallets
    #[serde(default)]
    pub kdf: KdfParams,
    /// Background balance refresh interval (milliseconds)
    pub balance_refresh_interval_ms: u64,
    /// Transaction status polling interval (milliseconds)
    pub status_poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_id: chains::POLYGON,
            rpc_url: None,
            tokens: tokens::polygon_defaults(),
            transfer_token: "MATIC".to_string(),
            fiat_currency: "brl".to_string(),
            price_api_url: DEFAULT_PRICE_API_URL.to_string(),
            identity_base_url: None,
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            kdf: KdfParams::default(),
            balance_refresh_interval_ms: 15_000,
            status_poll_interval_ms: 5_000,
        }
    }
}

impl Config {
    /// Load and validate a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let registry = self.token_registry()?;
        if registry.get(&self.transfer_token).is_none() {
            return Err(Error::Config(format!(
                "transfer token {} is not tracked",
                self.transfer_token
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.timeouts.query_ms == 0 || self.timeouts.broadcast_ms == 0 {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }
        self.kdf.validate()?;
        Ok(())
    }

    pub fn token_registry(&self) -> Result<TokenRegistry> {
        TokenRegistry::new(self.tokens.clone())
    }

    /// RPC URL for the configured chain
    pub fn resolve_rpc_url(&self, rpc: &RpcConfig) -> Result<String> {
        if let Some(url) = &self.rpc_url {
            return Ok(url.clone());
        }
        rpc.get(self.chain_id)
            .map(str::to_string)
            .ok_or_else(|| Error::Config(format!("no RPC URL for chain {}", self.chain_id)))
    }

    pub fn balance_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.balance_refresh_interval_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }
}
