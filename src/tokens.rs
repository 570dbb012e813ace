//! Tracked token registry
//!
//! Holds the fixed, configured set of tokens a wallet balance is aggregated
//! over and that transfers can be denominated in. Built explicitly from
//! [`Config`](crate::Config); there is no process-global registry.

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::fiat::MAX_TOKEN_DECIMALS;
use crate::{Error, Result};

/// Chain ID constants
pub mod chains {
    pub const POLYGON: u64 = 137;
    pub const AMOY: u64 = 80002;
}

/// Well-known token contracts on Polygon PoS
pub mod addresses {
    use super::*;

    pub const USDC_POLYGON: Address = address!("3c499c542cef5e3811e1192ce70d8cc03d5c3359");
    pub const USDT_POLYGON: Address = address!("c2132d05d31c914a87c6611c10748aeb04b58e8f");
    pub const WETH_POLYGON: Address = address!("7ceb23fd6bc0add59e62ac25578270cff1b9f619");
}

/// Gas limit for a plain value transfer
pub const NATIVE_TRANSFER_GAS: u64 = 21_000;
/// Gas limit budgeted for an ERC-20 `transfer` call
pub const ERC20_TRANSFER_GAS: u64 = 100_000;

/// How a token's balance is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenKind {
    /// Chain gas token, balance read with `eth_getBalance`
    Native,
    /// ERC-20 contract
    Erc20 { contract: Address },
}

/// Token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Token symbol (e.g., "MATIC", "USDC")
    pub symbol: String,
    /// Number of decimals
    pub decimals: u8,
    pub kind: TokenKind,
    /// Identifier understood by the price feed (e.g., "matic-network")
    pub price_id: String,
}

impl TokenInfo {
    pub fn native(symbol: &str, decimals: u8, price_id: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            kind: TokenKind::Native,
            price_id: price_id.to_string(),
        }
    }

    pub fn erc20(symbol: &str, decimals: u8, contract: Address, price_id: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            kind: TokenKind::Erc20 { contract },
            price_id: price_id.to_string(),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.kind, TokenKind::Native)
    }

    pub fn transfer_gas_limit(&self) -> u64 {
        match self.kind {
            TokenKind::Native => NATIVE_TRANSFER_GAS,
            TokenKind::Erc20 { .. } => ERC20_TRANSFER_GAS,
        }
    }
}

/// Default tracked set for Polygon mainnet
pub fn polygon_defaults() -> Vec<TokenInfo> {
    use addresses::*;

    vec![
        TokenInfo::native("MATIC", 18, "matic-network"),
        TokenInfo::erc20("USDC", 6, USDC_POLYGON, "usd-coin"),
        TokenInfo::erc20("USDT", 6, USDT_POLYGON, "tether"),
        TokenInfo::erc20("WETH", 18, WETH_POLYGON, "weth"),
    ]
}

/// Registry of tracked tokens, in configuration order
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    tokens: Vec<TokenInfo>,
}

impl TokenRegistry {
    /// Build a registry, rejecting duplicate symbols, empty sets and
    /// precisions too large for `U256` arithmetic
    pub fn new(tokens: Vec<TokenInfo>) -> Result<Self> {
        if tokens.is_empty() {
            return Err(Error::Config("no tracked tokens configured".to_string()));
        }
        for (i, token) in tokens.iter().enumerate() {
            if token.decimals > MAX_TOKEN_DECIMALS {
                return Err(Error::Config(format!(
                    "token {} has {} decimals, at most {} are supported",
                    token.symbol, token.decimals, MAX_TOKEN_DECIMALS
                )));
            }
            if tokens[..i]
                .iter()
                .any(|t| t.symbol.eq_ignore_ascii_case(&token.symbol))
            {
                return Err(Error::Config(format!(
                    "token {} configured twice",
                    token.symbol
                )));
            }
        }
        Ok(Self { tokens })
    }

    /// Get token info by symbol (case-insensitive)
    pub fn get(&self, symbol: &str) -> Option<&TokenInfo> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Get token info by ERC-20 contract address
    pub fn get_by_contract(&self, contract: &Address) -> Option<&TokenInfo> {
        self.tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::Erc20 { contract: c } if c == *contract))
    }

    pub fn tracked(&self) -> &[TokenInfo] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
