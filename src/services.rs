//! Component wiring
//!
//! Builds every component from a [`Config`] with explicit dependencies; the
//! crate holds no global state.

use std::sync::Arc;

use crate::auth::{AuthOrchestrator, HttpIdentityService, IdentityService};
use crate::balance::BalanceAggregator;
use crate::chain::{ChainClient, RpcChainClient};
use crate::config::{Config, RpcConfig};
use crate::store::SecretStore;
use crate::transaction::TransactionEngine;
use crate::wallet::KeyManager;
use crate::{Error, Result};

/// The wallet core, ready to serve a presentation layer
pub struct WalletServices {
    config: Config,
    keys: Arc<KeyManager>,
    balances: Arc<BalanceAggregator>,
    transactions: Arc<TransactionEngine>,
    auth: Option<AuthOrchestrator>,
}

impl WalletServices {
    pub fn builder(config: Config) -> WalletServicesBuilder {
        WalletServicesBuilder::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    pub fn balances(&self) -> &Arc<BalanceAggregator> {
        &self.balances
    }

    pub fn transactions(&self) -> &Arc<TransactionEngine> {
        &self.transactions
    }

    /// Login flow; requires an identity service
    pub fn auth(&self) -> Result<&AuthOrchestrator> {
        self.auth
            .as_ref()
            .ok_or_else(|| Error::Config("no identity service configured".to_string()))
    }
}

pub struct WalletServicesBuilder {
    config: Config,
    store: Option<Arc<dyn SecretStore>>,
    chain: Option<Arc<dyn ChainClient>>,
    identity: Option<Arc<dyn IdentityService>>,
    rpc: Option<RpcConfig>,
}

impl WalletServicesBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            chain: None,
            identity: None,
            rpc: None,
        }
    }

    /// Platform secret storage; required
    pub fn with_store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `chain` instead of an RPC client built from config
    pub fn with_chain(mut self, chain: Arc<dyn ChainClient>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Use `identity` instead of the HTTP client built from `identity_base_url`
    pub fn with_identity(mut self, identity: Arc<dyn IdentityService>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// RPC endpoints to resolve from when `rpc_url` is unset (default: environment)
    pub fn with_rpc_config(mut self, rpc: RpcConfig) -> Self {
        self.rpc = Some(rpc);
        self
    }

    pub fn build(self) -> Result<WalletServices> {
        let config = self.config;
        config.validate()?;

        let store = self
            .store
            .ok_or_else(|| Error::Config("a secret store is required".to_string()))?;

        let chain: Arc<dyn ChainClient> = match self.chain {
            Some(chain) => chain,
            None => {
                let rpc = self.rpc.unwrap_or_else(RpcConfig::from_env);
                Arc::new(RpcChainClient::from_config(&config, &rpc)?)
            }
        };
        if chain.chain_id() != config.chain_id {
            return Err(Error::Config(format!(
                "chain client is for chain {}, config expects {}",
                chain.chain_id(),
                config.chain_id
            )));
        }

        let identity: Option<Arc<dyn IdentityService>> = match (self.identity, &config.identity_base_url) {
            (Some(identity), _) => Some(identity),
            (None, Some(url)) => Some(Arc::new(HttpIdentityService::new(
                url,
                config.timeouts.identity(),
            )?)),
            (None, None) => None,
        };

        let keys = Arc::new(KeyManager::new(store, config.kdf.clone()));
        let balances = Arc::new(BalanceAggregator::new(
            chain.clone(),
            Arc::new(config.token_registry()?),
            config.timeouts.query(),
            config.retry.clone(),
        ));
        let transactions = Arc::new(TransactionEngine::new(
            keys.clone(),
            chain,
            balances.clone(),
            &config,
        )?);
        let auth = identity
            .map(|identity| AuthOrchestrator::new(identity, keys.clone(), config.timeouts.identity()));

        tracing::info!(
            chain_id = config.chain_id,
            tokens = config.tokens.len(),
            transfer_token = %config.transfer_token,
            identity = auth.is_some(),
            "Wallet services ready"
        );

        Ok(WalletServices {
            config,
            keys,
            balances,
            transactions,
            auth,
        })
    }
}
