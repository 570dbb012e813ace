//! Wallet Custody
//!
//! Core of a custodial mobile wallet on Polygon:
//! - Per-user signing keys sealed under the user's password
//! - Fiat-denominated balance aggregated across tracked tokens
//! - Transfer construction, signing, submission and status tracking
//! - Login flow that opens or creates the user's wallet
//!
//! # Security Model
//!
//! - Passwords are never stored; keys are re-derived for each operation
//! - Plaintext key material lives only inside a blocking task and is zeroized
//!   on drop
//! - Sealed key blobs are bound to their user id and address
//! - Errors and logs never carry passwords or key bytes
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wallet_custody::address::parse_recipient;
//! use wallet_custody::{Config, FileSecretStore, WalletServices};
//!
//! # async fn run() -> wallet_custody::Result<()> {
//! let services = WalletServices::builder(Config::from_json_file("wallet.json")?)
//!     .with_store(Arc::new(FileSecretStore::open("secrets").await?))
//!     .build()?;
//!
//! let address = parse_recipient("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")?;
//! let balance = services.balances().get_consolidated_balance(address).await;
//! println!("{}", balance.formatted_total());
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod auth;
pub mod balance;
pub mod chain;
pub mod config;
pub mod fiat;
pub mod locks;
pub mod services;
pub mod store;
pub mod telemetry;
pub mod tokens;
pub mod transaction;
pub mod wallet;

mod error;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use auth::{AuthOrchestrator, IdentityService, LoginOutcome, Session};
pub use balance::{BalanceAggregator, BalanceWatcher, ConsolidatedBalance, TokenBalance};
pub use chain::{ChainClient, RpcChainClient};
pub use config::{Config, RpcConfig};
pub use error::{Error, ErrorKind, Result};
pub use fiat::Fiat;
pub use services::WalletServices;
pub use store::{FileSecretStore, MemorySecretStore, SecretStore};
pub use tokens::{TokenInfo, TokenRegistry};
pub use transaction::{
    TransactionEngine, TransactionStatus, TransferRequest, TransferResult,
};
pub use wallet::{KeyManager, Wallet};
