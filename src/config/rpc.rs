//! RPC endpoint resolution
//!
//! Each supported chain resolves independently, first match wins:
//! 1. The chain's own variable (`POLYGON_RPC_URL`, `AMOY_RPC_URL`)
//! 2. A provider key (`ALCHEMY_API_KEY`, then `INFURA_API_KEY`)
//! 3. The chain's public endpoint, which is rate limited
//!
//! ```bash
//! export ALCHEMY_API_KEY="..."
//! ```

use std::collections::HashMap;

pub use crate::tokens::chains;

const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";
const INFURA_API_KEY: &str = "INFURA_API_KEY";

struct Endpoints {
    chain_id: u64,
    name: &'static str,
    url_var: &'static str,
    alchemy: &'static str,
    infura: &'static str,
    public: &'static str,
}

const SUPPORTED: [Endpoints; 2] = [
    Endpoints {
        chain_id: chains::POLYGON,
        name: "polygon",
        url_var: "POLYGON_RPC_URL",
        alchemy: "https://polygon-mainnet.g.alchemy.com/v2/",
        infura: "https://polygon-mainnet.infura.io/v3/",
        public: "https://polygon-rpc.com",
    },
    Endpoints {
        chain_id: chains::AMOY,
        name: "amoy",
        url_var: "AMOY_RPC_URL",
        alchemy: "https://polygon-amoy.g.alchemy.com/v2/",
        infura: "https://polygon-amoy.infura.io/v3/",
        public: "https://rpc-amoy.polygon.technology",
    },
];

impl Endpoints {
    fn resolve(&self, lookup: &impl Fn(&str) -> Option<String>) -> String {
        if let Some(url) = lookup(self.url_var) {
            tracing::debug!(chain = self.name, source = self.url_var, "Resolved RPC URL");
            return url;
        }
        if let Some(key) = lookup(ALCHEMY_API_KEY) {
            tracing::debug!(chain = self.name, source = "alchemy", "Resolved RPC URL");
            return format!("{}{}", self.alchemy, key);
        }
        if let Some(key) = lookup(INFURA_API_KEY) {
            tracing::debug!(chain = self.name, source = "infura", "Resolved RPC URL");
            return format!("{}{}", self.infura, key);
        }
        tracing::warn!(chain = self.name, "No RPC configured, using rate-limited public endpoint");
        self.public.to_string()
    }
}

/// RPC URL per chain id
#[derive(Debug, Clone)]
pub struct RpcConfig {
    urls: HashMap<u64, String>,
}

impl RpcConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Resolve every supported chain through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let urls = SUPPORTED
            .iter()
            .map(|chain| (chain.chain_id, chain.resolve(&lookup)))
            .collect();
        Self { urls }
    }

    pub fn with_urls(urls: HashMap<u64, String>) -> Self {
        Self { urls }
    }

    pub fn get(&self, chain_id: u64) -> Option<&str> {
        self.urls.get(&chain_id).map(String::as_str)
    }

    pub fn has_chain(&self, chain_id: u64) -> bool {
        self.urls.contains_key(&chain_id)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
