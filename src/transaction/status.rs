//! Transaction status tracking

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

use crate::fiat::Fiat;

/// Lifecycle of a submitted transaction
///
/// `Confirmed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Unknown,
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Confirmed | TransactionStatus::Failed)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Unknown => "unknown",
            TransactionStatus::Pending => "pending",
            TransactionStatus::Confirmed => "confirmed",
            TransactionStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A transfer this engine broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: B256,
    pub from: Address,
    pub to: Address,
    pub token: String,
    pub raw_amount: U256,
    pub amount_fiat: Fiat,
    pub nonce: u64,
    pub submitted_at: DateTime<Utc>,
    pub status: TransactionStatus,
}

/// In-memory record of broadcast transactions
#[derive(Debug, Default)]
pub struct StatusRegistry {
    records: RwLock<HashMap<B256, TransactionRecord>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, record: TransactionRecord) {
        self.records.write().await.insert(record.hash, record);
    }

    pub async fn get(&self, hash: &B256) -> Option<TransactionRecord> {
        self.records.read().await.get(hash).cloned()
    }

    /// Apply a status observed on the network; terminal statuses never change
    pub async fn update(&self, hash: &B256, status: TransactionStatus) -> Option<TransactionStatus> {
        let mut records = self.records.write().await;
        let record = records.get_mut(hash)?;
        if !record.status.is_terminal() && status != TransactionStatus::Unknown {
            record.status = status;
        }
        Some(record.status)
    }

    /// Records sent from `address`, oldest first
    pub async fn for_sender(&self, address: &Address) -> Vec<TransactionRecord> {
        let mut records: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.from == *address)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.nonce, r.submitted_at));
        records
    }
}
