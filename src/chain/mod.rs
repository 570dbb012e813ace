//! Blockchain network access
//!
//! [`ChainClient`] is the seam between the engine and the network. The
//! engine wraps every call in an explicit timeout; implementations only
//! classify failures: transport trouble is `Error::Network`, a node refusing
//! a transaction is `Error::Submission`.

mod prices;
mod rpc;

pub use prices::PriceFeed;
pub use rpc::RpcChainClient;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::fiat::Fiat;
use crate::tokens::TokenInfo;
use crate::transaction::TransactionStatus;
use crate::Result;

/// EIP-1559 fee parameters, in wei
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeParameters {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    /// Next nonce for `address`, including pending transactions
    async fn get_nonce(&self, address: Address) -> Result<u64>;

    async fn get_fee_parameters(&self) -> Result<FeeParameters>;

    /// Submit an EIP-2718 encoded signed transaction
    async fn broadcast(&self, raw: Bytes) -> Result<B256>;

    async fn get_transaction_status(&self, hash: B256) -> Result<TransactionStatus>;

    /// Raw balance of `token` held by `address`
    async fn get_token_balance(&self, address: Address, token: &TokenInfo) -> Result<U256>;

    /// Fiat price of one whole `token`
    async fn get_fiat_rate(&self, token: &TokenInfo) -> Result<Fiat>;
}
