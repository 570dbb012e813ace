//! Secret storage adapters
//!
//! The core treats secret storage as an opaque KV store holding one blob per
//! key. Platform protection (keychain, keystore, biometric gate) lives behind
//! the trait and is never assumed by callers.

mod file;

pub use file::FileSecretStore;

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::Result;

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Store `blob` under `key`, replacing any previous value
    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<()>;

    /// Fetch the blob under `key`; `None` when absent
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Process-local store, for tests and ephemeral sessions
#[derive(Default)]
pub struct MemorySecretStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn put(&self, key: &str, blob: Vec<u8>) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), blob);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }
}

impl std::fmt::Debug for MemorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySecretStore")
            .field("entries", &"[REDACTED]")
            .finish()
    }
}
