//! JSON-RPC chain client
//!
//! Reads balances, nonces and fees and broadcasts signed transactions through
//! alloy's HTTP provider. Fiat rates come from the configured [`PriceFeed`].

use alloy::network::ReceiptResponse;
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::TransportError;
use async_trait::async_trait;

use super::{ChainClient, FeeParameters, PriceFeed};
use crate::config::{Config, RpcConfig};
use crate::fiat::Fiat;
use crate::tokens::{TokenInfo, TokenKind};
use crate::transaction::TransactionStatus;
use crate::{Error, Result};

/// ERC20 balanceOf(address) selector
const BALANCE_OF_SELECTOR: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];

pub struct RpcChainClient {
    provider: DynProvider,
    chain_id: u64,
    prices: PriceFeed,
}

fn network_error(operation: &str, err: TransportError) -> Error {
    Error::Network(format!("{}: {}", operation, err))
}

/// Node error responses to a broadcast are rejections; everything else is transport
fn broadcast_error(err: TransportError) -> Error {
    match err.as_error_resp() {
        Some(payload) => Error::Submission(payload.message.to_string()),
        None => network_error("broadcast", err),
    }
}

fn is_already_known(err: &Error) -> bool {
    matches!(err, Error::Submission(msg) if msg.to_lowercase().contains("already known"))
}

impl RpcChainClient {
    pub fn new(rpc_url: &str, chain_id: u64, prices: PriceFeed) -> Result<Self> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| Error::Config(format!("Invalid RPC URL: {}", e)))?;

        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            provider,
            chain_id,
            prices,
        })
    }

    /// Build from configuration, resolving the RPC URL from `rpc` when unset
    pub fn from_config(config: &Config, rpc: &RpcConfig) -> Result<Self> {
        let prices = PriceFeed::new(
            &config.price_api_url,
            &config.fiat_currency,
            config.timeouts.query(),
        )?;
        Self::new(&config.resolve_rpc_url(rpc)?, config.chain_id, prices)
    }

    async fn erc20_balance(&self, contract: Address, holder: Address) -> Result<U256> {
        let mut calldata = BALANCE_OF_SELECTOR.to_vec();
        calldata.extend_from_slice(&[0u8; 12]);
        calldata.extend_from_slice(holder.as_slice());

        let tx = TransactionRequest::default()
            .to(contract)
            .input(Bytes::from(calldata).into());

        let result = self
            .provider
            .call(tx)
            .await
            .map_err(|e| network_error("balanceOf", e))?;

        if result.len() < 32 {
            return Err(Error::Network(format!(
                "balanceOf on {} returned {} bytes",
                contract,
                result.len()
            )));
        }
        Ok(U256::from_be_slice(&result[..32]))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_nonce(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(|e| network_error("get_nonce", e))
    }

    async fn get_fee_parameters(&self) -> Result<FeeParameters> {
        let estimate = self
            .provider
            .estimate_eip1559_fees()
            .await
            .map_err(|e| network_error("fee estimation", e))?;

        Ok(FeeParameters {
            max_fee_per_gas: estimate.max_fee_per_gas,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
        })
    }

    async fn broadcast(&self, raw: Bytes) -> Result<B256> {
        match self.provider.send_raw_transaction(&raw).await {
            Ok(pending) => Ok(*pending.tx_hash()),
            Err(e) => {
                let err = broadcast_error(e);
                // A retried broadcast of bytes the node already holds
                if is_already_known(&err) {
                    tracing::debug!("Node already knows transaction, treating as submitted");
                    return Ok(keccak256(&raw));
                }
                Err(err)
            }
        }
    }

    async fn get_transaction_status(&self, hash: B256) -> Result<TransactionStatus> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| network_error("get_transaction_receipt", e))?;

        if let Some(receipt) = receipt {
            return Ok(if receipt.status() {
                TransactionStatus::Confirmed
            } else {
                TransactionStatus::Failed
            });
        }

        let known = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(|e| network_error("get_transaction_by_hash", e))?;

        Ok(match known {
            Some(_) => TransactionStatus::Pending,
            None => TransactionStatus::Unknown,
        })
    }

    async fn get_token_balance(&self, address: Address, token: &TokenInfo) -> Result<U256> {
        match token.kind {
            TokenKind::Native => self
                .provider
                .get_balance(address)
                .await
                .map_err(|e| network_error("get_balance", e)),
            TokenKind::Erc20 { contract } => self.erc20_balance(contract, address).await,
        }
    }

    async fn get_fiat_rate(&self, token: &TokenInfo) -> Result<Fiat> {
        self.prices.rate(&token.price_id).await
    }
}

impl std::fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("chain_id", &self.chain_id)
            .field("prices", &self.prices)
            .finish_non_exhaustive()
    }
}
