//! Transfer construction, signing, submission and status tracking
//!
//! A transfer moves through [`TransferStage`]s in order:
//!
//! ```text
//! Validating -> Converting -> Signing -> Submitting -> Pending
//! ```
//!
//! Validation (amount, recipient, password, fresh balance) completes before
//! any key is unlocked. Everything from the balance check to the broadcast runs
//! under the user's lock, so two transfers from the same wallet never share a
//! nonce and never spend the same funds. Transfers this engine submitted that
//! are not yet final count against the available balance.

mod payload;
mod status;

pub use payload::{build_transfer, erc20_transfer_calldata};
pub use status::{StatusRegistry, TransactionRecord, TransactionStatus};

use alloy::consensus::{SignableTransaction, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, B256, U256};
use chrono::Utc;
use secrecy::SecretString;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use crate::address::parse_recipient;
use crate::balance::BalanceAggregator;
use crate::chain::ChainClient;
use crate::config::{Config, RetryConfig, TimeoutConfig};
use crate::error::{retry_transient, with_timeout};
use crate::fiat::Fiat;
use crate::locks::KeyedLocks;
use crate::tokens::TokenInfo;
use crate::wallet::KeyManager;
use crate::{Error, ErrorKind, Result};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Validating,
    Converting,
    Signing,
    Submitting,
    Pending,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Validating => "validating",
            TransferStage::Converting => "converting",
            TransferStage::Signing => "signing",
            TransferStage::Submitting => "submitting",
            TransferStage::Pending => "pending",
        };
        f.write_str(name)
    }
}

/// A request to send `amount_fiat` worth of the transfer token
#[derive(Debug)]
pub struct TransferRequest {
    pub user_id: String,
    pub password: SecretString,
    pub to_address: String,
    pub amount_fiat: Fiat,
}

/// Outcome of [`TransactionEngine::transfer`], ready for a presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    pub success: bool,
    pub tx_hash: Option<String>,
    pub error: Option<ErrorKind>,
    pub message: Option<String>,
}

impl TransferResult {
    fn submitted(hash: B256) -> Self {
        Self {
            success: true,
            tx_hash: Some(hash.to_string()),
            error: None,
            message: None,
        }
    }

    fn failed(error: &Error) -> Self {
        Self {
            success: false,
            tx_hash: None,
            error: Some(error.kind()),
            message: Some(error.user_message()),
        }
    }
}

pub struct TransactionEngine {
    keys: Arc<KeyManager>,
    chain: Arc<dyn ChainClient>,
    balances: Arc<BalanceAggregator>,
    token: TokenInfo,
    timeouts: TimeoutConfig,
    retry: RetryConfig,
    locks: KeyedLocks,
    records: StatusRegistry,
}

impl TransactionEngine {
    pub fn new(
        keys: Arc<KeyManager>,
        chain: Arc<dyn ChainClient>,
        balances: Arc<BalanceAggregator>,
        config: &Config,
    ) -> Result<Self> {
        let token = balances
            .tokens()
            .get(&config.transfer_token)
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!(
                    "transfer token {} is not tracked",
                    config.transfer_token
                ))
            })?;

        Ok(Self {
            keys,
            chain,
            balances,
            token,
            timeouts: config.timeouts.clone(),
            retry: config.retry.clone(),
            locks: KeyedLocks::new(),
            records: StatusRegistry::new(),
        })
    }

    /// The token transfers are denominated in
    pub fn transfer_token(&self) -> &TokenInfo {
        &self.token
    }

    /// Validate, sign and submit a transfer
    ///
    /// Never panics or returns an error: failures are reported in the result
    /// with their [`ErrorKind`] and a user-facing message.
    pub async fn transfer(&self, request: TransferRequest) -> TransferResult {
        let span = tracing::info_span!(
            "transfer",
            transfer_id = %Uuid::new_v4(),
            user_id = %request.user_id,
            symbol = %self.token.symbol,
        );

        async {
            match self.try_transfer(&request).await {
                Ok(hash) => TransferResult::submitted(hash),
                Err(e) => {
                    tracing::warn!(kind = ?e.kind(), error = %e, "Transfer failed");
                    TransferResult::failed(&e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn try_transfer(&self, request: &TransferRequest) -> Result<B256> {
        stage(TransferStage::Validating);
        if request.amount_fiat.is_zero() {
            return Err(Error::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }
        let to = parse_recipient(&request.to_address)?;

        let wallet = self
            .keys
            .get_wallet(&request.user_id, &request.password)
            .await?;

        let _guard = self.locks.lock(&request.user_id).await;
        let balance = self.balances.token_balance(wallet.address, &self.token).await?;
        if balance.fiat_rate.is_zero() {
            return Err(Error::Network(format!(
                "no fiat rate available for {}",
                self.token.symbol
            )));
        }
        let in_flight = self.in_flight_amount(&wallet.address).await;
        let available = Fiat::from_raw_units(
            balance.raw_balance.saturating_sub(in_flight),
            self.token.decimals,
            balance.fiat_rate,
        );
        if request.amount_fiat > available {
            return Err(Error::InsufficientFunds {
                requested: request.amount_fiat,
                available,
            });
        }

        stage(TransferStage::Converting);
        let raw_amount = request
            .amount_fiat
            .to_raw_units(self.token.decimals, balance.fiat_rate)
            .ok_or_else(|| Error::InvalidAmount(format!("{} is out of range", request.amount_fiat)))?;
        if raw_amount.is_zero() {
            return Err(Error::AmountTooSmall(format!(
                "{} is less than one unit of {}",
                request.amount_fiat, self.token.symbol
            )));
        }

        stage(TransferStage::Signing);
        let chain = &self.chain;
        let query = self.timeouts.query();
        let address = wallet.address;
        let (nonce, fees) = tokio::try_join!(
            retry_transient("nonce query", &self.retry, move || {
                with_timeout("nonce query", query, chain.get_nonce(address))
            }),
            retry_transient("fee query", &self.retry, move || {
                with_timeout("fee query", query, chain.get_fee_parameters())
            }),
        )?;

        let tx = build_transfer(
            self.chain.chain_id(),
            nonce,
            fees,
            &self.token,
            to,
            raw_amount,
        );
        let signature = self
            .keys
            .sign(&request.user_id, &request.password, &tx)
            .await?;
        let signed = tx.into_signed(signature);
        let local_hash = *signed.hash();
        let raw_tx = Bytes::from(TxEnvelope::from(signed).encoded_2718());

        stage(TransferStage::Submitting);
        let hash = self.broadcast_with_retry(raw_tx).await?;
        if hash != local_hash {
            tracing::warn!(tx_hash = %hash, local_hash = %local_hash, "Node reported a different hash");
        }

        self.records
            .register(TransactionRecord {
                hash,
                from: wallet.address,
                to,
                token: self.token.symbol.clone(),
                raw_amount,
                amount_fiat: request.amount_fiat,
                nonce,
                submitted_at: Utc::now(),
                status: TransactionStatus::Pending,
            })
            .await;

        stage(TransferStage::Pending);
        tracing::info!(
            tx_hash = %hash,
            nonce,
            to = %to,
            amount = %request.amount_fiat,
            "Transfer submitted"
        );
        Ok(hash)
    }

    /// Broadcast the same signed bytes until accepted, rejected or out of attempts
    async fn broadcast_with_retry(&self, raw: Bytes) -> Result<B256> {
        let chain = &self.chain;
        let timeout = self.timeouts.broadcast();
        let raw = &raw;
        retry_transient("broadcast", &self.retry, move || {
            with_timeout("broadcast", timeout, chain.broadcast(raw.clone()))
        })
        .await
    }

    /// Raw amount of this engine's transfers from `address` not yet final
    ///
    /// Statuses are refreshed first so mined transfers, already reflected in
    /// the chain balance, are not counted twice.
    async fn in_flight_amount(&self, address: &Address) -> U256 {
        let mut total = U256::ZERO;
        for record in self.pending_transfers(address).await {
            if record.token != self.token.symbol {
                continue;
            }
            if !self.status(record.hash).await.is_terminal() {
                total = total.saturating_add(record.raw_amount);
            }
        }
        total
    }

    /// Current status of `tx_hash`; any failure reads as `Unknown`
    pub async fn get_transaction_status(&self, tx_hash: &str) -> TransactionStatus {
        match tx_hash.trim().parse::<B256>() {
            Ok(hash) => self.status(hash).await,
            Err(_) => {
                tracing::debug!(tx_hash = %tx_hash, "Malformed transaction hash");
                TransactionStatus::Unknown
            }
        }
    }

    pub async fn status(&self, hash: B256) -> TransactionStatus {
        if let Some(record) = self.records.get(&hash).await {
            if record.status.is_terminal() {
                return record.status;
            }
        }

        let observed = with_timeout(
            "status query",
            self.timeouts.query(),
            self.chain.get_transaction_status(hash),
        )
        .await;

        match observed {
            Ok(status) => {
                let status = self.records.update(&hash, status).await.unwrap_or(status);
                tracing::debug!(tx_hash = %hash, %status, "Transaction status");
                status
            }
            Err(e) => {
                tracing::warn!(tx_hash = %hash, error = %e, "Status query failed");
                TransactionStatus::Unknown
            }
        }
    }

    /// Poll every `interval` until `hash` is confirmed or failed
    ///
    /// Gives up with [`Error::Timeout`] after `max_wait`. Dropping the
    /// returned future stops polling.
    pub async fn poll_until_final(
        &self,
        hash: B256,
        interval: Duration,
        max_wait: Duration,
    ) -> Result<TransactionStatus> {
        let poll = async {
            let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
            loop {
                ticker.tick().await;
                let status = self.status(hash).await;
                if status.is_terminal() {
                    return Ok(status);
                }
            }
        };
        with_timeout("confirmation", max_wait, poll).await
    }

    /// Transfers sent from `address` that have not reached a final status
    pub async fn pending_transfers(&self, address: &Address) -> Vec<TransactionRecord> {
        self.records
            .for_sender(address)
            .await
            .into_iter()
            .filter(|r| !r.status.is_terminal())
            .collect()
    }

    /// Every transfer sent from `address` by this engine
    pub async fn transfers(&self, address: &Address) -> Vec<TransactionRecord> {
        self.records.for_sender(address).await
    }
}

fn stage(stage: TransferStage) {
    tracing::debug!(%stage, "Transfer stage");
}
