//! Password-encrypted key blobs
//!
//! The private key is sealed with AES-256-GCM under a key stretched from the
//! user's password with Argon2id and a per-wallet random salt. The user id and
//! address are bound in as associated data, so a blob only opens for the
//! wallet it was written for. A wrong password fails the GCM tag check.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use alloy::primitives::{Address, Bytes};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{Error, Result};

pub const KEYSTORE_VERSION: u32 = 1;

const KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Argon2id cost parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub m_cost: u32,
    /// Iterations
    pub t_cost: u32,
    /// Parallelism
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19_456,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(KEY_LEN))
            .map_err(|e| Error::Config(format!("invalid argon2 parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    pub fn validate(&self) -> Result<()> {
        self.argon2().map(|_| ())
    }

    fn derive_key(&self, password: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        self.argon2()?
            .hash_password_into(password, salt, &mut key[..])
            .map_err(|e| Error::Signing(format!("key derivation failed: {}", e)))?;
        Ok(key)
    }
}

/// Serialized form stored in the secret store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedKeyBlob {
    pub version: u32,
    pub address: Address,
    pub kdf: KdfParams,
    pub salt: Bytes,
    pub nonce: Bytes,
    pub ciphertext: Bytes,
}

/// Fill `buf` from the operating system CSPRNG
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| Error::RandomSource(e.to_string()))
}

fn associated_data(user_id: &str, address: &Address) -> Vec<u8> {
    format!("wallet-custody:v{}:{}:{}", KEYSTORE_VERSION, user_id, address).into_bytes()
}

impl EncryptedKeyBlob {
    /// Seal `secret` for `user_id` under `password`
    pub fn seal(
        user_id: &str,
        address: Address,
        secret: &[u8; KEY_LEN],
        password: &[u8],
        kdf: &KdfParams,
    ) -> Result<Self> {
        let mut salt = [0u8; SALT_LEN];
        fill_random(&mut salt)?;
        let mut nonce = [0u8; NONCE_LEN];
        fill_random(&mut nonce)?;

        let key = kdf.derive_key(password, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| Error::Signing(format!("cipher init failed: {}", e)))?;
        let aad = associated_data(user_id, &address);
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &secret[..],
                    aad: &aad,
                },
            )
            .map_err(|_| Error::Signing("encryption failed".to_string()))?;

        Ok(Self {
            version: KEYSTORE_VERSION,
            address,
            kdf: kdf.clone(),
            salt: Bytes::copy_from_slice(&salt),
            nonce: Bytes::copy_from_slice(&nonce),
            ciphertext: Bytes::from(ciphertext),
        })
    }

    /// Recover the private key bytes; any tag mismatch is an authentication failure
    pub fn open(&self, user_id: &str, password: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if self.version != KEYSTORE_VERSION {
            return Err(Error::Storage(format!(
                "unsupported keystore version {}",
                self.version
            )));
        }
        if self.nonce.len() != NONCE_LEN || self.salt.len() != SALT_LEN {
            return Err(Error::Storage("corrupt keystore header".to_string()));
        }

        let key = self
            .kdf
            .derive_key(password, &self.salt)
            .map_err(|e| Error::Storage(format!("corrupt keystore: {}", e)))?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| Error::Storage(format!("cipher init failed: {}", e)))?;
        let aad = associated_data(user_id, &self.address);

        cipher
            .decrypt(
                Nonce::from_slice(&self.nonce[..]),
                Payload {
                    msg: &self.ciphertext[..],
                    aad: &aad,
                },
            )
            .map(Zeroizing::new)
            .map_err(|_| Error::Authentication)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Storage(format!("corrupt keystore: {}", e)))
    }
}
