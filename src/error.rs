//! Error types for the wallet custody engine
//!
//! Every failure carries an [`ErrorKind`] so callers can branch on the class
//! of failure while telemetry keeps the detailed message. No variant ever
//! holds a password or key bytes.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::config::RetryConfig;
use crate::fiat::Fiat;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Wrong password for wallet")]
    Authentication,

    #[error("No wallet found for user {0}")]
    NotFound(String),

    #[error("Wallet already exists for user {0}")]
    KeyCreation(String),

    #[error("Secure random source unavailable: {0}")]
    RandomSource(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount too small: {0}")]
    AmountTooSmall(String),

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: Fiat, available: Fiat },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Transaction rejected by network: {0}")]
    Submission(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Secret store error: {0}")]
    Storage(String),

    #[error("Identity service error: {0}")]
    Identity(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Bound `fut` by `after`, surfacing expiry as [`Error::Timeout`]
pub(crate) async fn with_timeout<T>(
    operation: &'static str,
    after: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| Error::Timeout { operation, after })?
}

/// Run `call` until it succeeds, fails permanently or runs out of attempts
///
/// Only transient failures are retried, with the backoff from `retry`. Every
/// attempt calls `call` afresh, so it must be safe to repeat.
pub(crate) async fn retry_transient<T, F, Fut>(
    operation: &'static str,
    retry: &RetryConfig,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                let delay = retry.backoff(attempt);
                tracing::warn!(operation, attempt, ?delay, error = %e, "Transient failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Closed classification of [`Error`], safe to hand to a presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    NotFound,
    KeyCreation,
    RandomSource,
    InvalidAddress,
    InvalidAmount,
    AmountTooSmall,
    InsufficientFunds,
    Signing,
    Submission,
    Network,
    Timeout,
    Storage,
    Identity,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Authentication => ErrorKind::Authentication,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::KeyCreation(_) => ErrorKind::KeyCreation,
            Error::RandomSource(_) => ErrorKind::RandomSource,
            Error::InvalidAddress(_) => ErrorKind::InvalidAddress,
            Error::InvalidAmount(_) => ErrorKind::InvalidAmount,
            Error::AmountTooSmall(_) => ErrorKind::AmountTooSmall,
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::Signing(_) => ErrorKind::Signing,
            Error::Submission(_) => ErrorKind::Submission,
            Error::Network(_) | Error::Http(_) => ErrorKind::Network,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Storage(_) | Error::Json(_) => ErrorKind::Storage,
            Error::Identity(_) => ErrorKind::Identity,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Failures worth retrying for idempotent operations
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Timeout)
    }

    /// Message suitable for end users
    ///
    /// Validation and authentication failures are surfaced verbatim. Internal
    /// crypto, storage and network failures collapse to a generic message; the
    /// detailed error should go to telemetry via `Display`.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Authentication
            | ErrorKind::NotFound
            | ErrorKind::KeyCreation
            | ErrorKind::InvalidAddress
            | ErrorKind::InvalidAmount
            | ErrorKind::AmountTooSmall
            | ErrorKind::InsufficientFunds
            | ErrorKind::Submission => self.to_string(),
            ErrorKind::Network | ErrorKind::Timeout => {
                "Network unavailable, please try again".to_string()
            }
            ErrorKind::Identity => "Could not reach the authentication service".to_string(),
            ErrorKind::RandomSource
            | ErrorKind::Signing
            | ErrorKind::Storage
            | ErrorKind::Config => "Internal wallet error".to_string(),
        }
    }
}
