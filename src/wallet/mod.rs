//! Per-user key custody
//!
//! This module handles private key creation, storage and signing. Passwords
//! are never stored: every operation that needs the private key re-derives it
//! from the password, uses it inside a blocking task and drops it before the
//! task returns. Cancelling the calling future cannot extend the key's life.

mod keystore;
mod signer;

pub use keystore::{EncryptedKeyBlob, KdfParams, KEYSTORE_VERSION};

use alloy::consensus::SignableTransaction;
use alloy::primitives::{Address, Signature, B256};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::locks::KeyedLocks;
use crate::store::SecretStore;
use crate::{Error, Result};

use keystore::fill_random;
use signer::UnlockedKey;

const WALLET_KEY_PREFIX: &str = "wallet:";
const KEYGEN_ATTEMPTS: usize = 8;

/// A user's address and sealed key material
#[derive(Debug, Clone, Serialize)]
pub struct Wallet {
    pub user_id: String,
    pub address: Address,
    #[serde(skip)]
    pub encrypted_key_blob: Vec<u8>,
}

impl Wallet {
    /// EIP-55 checksummed address
    pub fn address_string(&self) -> String {
        self.address.to_checksum(None)
    }
}

/// Creates, unlocks and signs with per-user wallets
///
/// Calls for the same user id are serialized.
pub struct KeyManager {
    store: Arc<dyn SecretStore>,
    kdf: KdfParams,
    locks: KeyedLocks,
}

fn store_key(user_id: &str) -> String {
    format!("{}{}", WALLET_KEY_PREFIX, user_id)
}

fn password_bytes(password: &SecretString) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(password.expose_secret().as_bytes().to_vec())
}

fn generate_key() -> Result<(Zeroizing<[u8; 32]>, UnlockedKey)> {
    let mut bytes = Zeroizing::new([0u8; 32]);
    for _ in 0..KEYGEN_ATTEMPTS {
        fill_random(&mut bytes[..])?;
        if let Ok(key) = UnlockedKey::from_slice(&bytes[..]) {
            return Ok((bytes, key));
        }
    }
    Err(Error::RandomSource(
        "could not draw a valid secp256k1 scalar".to_string(),
    ))
}

impl KeyManager {
    pub fn new(store: Arc<dyn SecretStore>, kdf: KdfParams) -> Self {
        Self {
            store,
            kdf,
            locks: KeyedLocks::new(),
        }
    }

    /// Whether a wallet exists for `user_id`
    pub async fn has_wallet(&self, user_id: &str) -> Result<bool> {
        self.store.contains(&store_key(user_id)).await
    }

    /// Create and persist a fresh wallet, returning its address
    pub async fn create_wallet(&self, user_id: &str, password: &SecretString) -> Result<Address> {
        let _guard = self.locks.lock(user_id).await;
        let key = store_key(user_id);

        if self.store.contains(&key).await? {
            return Err(Error::KeyCreation(user_id.to_string()));
        }

        let owner = user_id.to_string();
        let password = password_bytes(password);
        let kdf = self.kdf.clone();
        let blob = tokio::task::spawn_blocking(move || -> Result<EncryptedKeyBlob> {
            let (secret, unlocked) = generate_key()?;
            EncryptedKeyBlob::seal(&owner, unlocked.address(), &secret, &password, &kdf)
        })
        .await
        .map_err(|e| Error::Signing(format!("key generation task failed: {}", e)))??;

        let address = blob.address;
        self.store.put(&key, blob.to_bytes()?).await?;

        tracing::info!(user_id = %user_id, address = %address, "Created wallet");
        Ok(address)
    }

    /// Unlock the wallet, proving the password is correct
    pub async fn get_wallet(&self, user_id: &str, password: &SecretString) -> Result<Wallet> {
        let _guard = self.locks.lock(user_id).await;
        let (bytes, blob) = self.load(user_id).await?;
        let address = self.with_key(user_id, &blob, password, |key| Ok(key.address())).await?;

        Ok(Wallet {
            user_id: user_id.to_string(),
            address,
            encrypted_key_blob: bytes,
        })
    }

    /// Sign a transaction's signing hash with the user's key
    pub async fn sign<T>(
        &self,
        user_id: &str,
        password: &SecretString,
        payload: &T,
    ) -> Result<Signature>
    where
        T: SignableTransaction<Signature>,
    {
        self.sign_hash(user_id, password, payload.signature_hash())
            .await
    }

    /// Sign a 32-byte prehash with the user's key
    pub async fn sign_hash(
        &self,
        user_id: &str,
        password: &SecretString,
        hash: B256,
    ) -> Result<Signature> {
        let _guard = self.locks.lock(user_id).await;
        let (_, blob) = self.load(user_id).await?;
        let signature = self
            .with_key(user_id, &blob, password, move |key| key.sign_hash(&hash))
            .await;

        if let Err(e) = &signature {
            tracing::warn!(user_id = %user_id, kind = ?e.kind(), "Signing failed");
        }
        signature
    }

    async fn load(&self, user_id: &str) -> Result<(Vec<u8>, EncryptedKeyBlob)> {
        let bytes = self
            .store
            .get(&store_key(user_id))
            .await?
            .ok_or_else(|| Error::NotFound(user_id.to_string()))?;
        let blob = EncryptedKeyBlob::from_bytes(&bytes)?;
        Ok((bytes, blob))
    }

    /// Run `f` against the decrypted key on the blocking pool
    ///
    /// The key only lives inside the blocking closure.
    async fn with_key<F, R>(
        &self,
        user_id: &str,
        blob: &EncryptedKeyBlob,
        password: &SecretString,
        f: F,
    ) -> Result<R>
    where
        F: FnOnce(&UnlockedKey) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let owner = user_id.to_string();
        let blob = blob.clone();
        let password = password_bytes(password);

        tokio::task::spawn_blocking(move || -> Result<R> {
            let plain = blob.open(&owner, &password)?;
            let key = UnlockedKey::from_slice(&plain)?;
            if key.address() != blob.address {
                return Err(Error::Authentication);
            }
            f(&key)
        })
        .await
        .map_err(|e| Error::Signing(format!("key task failed: {}", e)))?
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("kdf", &self.kdf)
            .finish_non_exhaustive()
    }
}
