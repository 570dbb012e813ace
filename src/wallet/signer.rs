//! Scoped signing key
//!
//! SECURITY: This is the ONLY place where a plaintext private key exists.
//! - Built from decrypted bytes for a single operation, then dropped
//! - The underlying k256 scalar zeroizes itself on drop
//! - No Clone, no Serialize, Debug is redacted
//! - Keys are never logged

use alloy::primitives::{Address, Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::{Error, Result};

pub(crate) struct UnlockedKey {
    signer: PrivateKeySigner,
}

impl UnlockedKey {
    /// Interpret 32 bytes as a secp256k1 scalar
    ///
    /// Fails for zero or out-of-range scalars.
    pub(crate) fn from_slice(bytes: &[u8]) -> Result<Self> {
        let signer = PrivateKeySigner::from_slice(bytes)
            .map_err(|_| Error::Signing("invalid secp256k1 scalar".to_string()))?;
        Ok(Self { signer })
    }

    /// Public address (safe to share)
    pub(crate) fn address(&self) -> Address {
        self.signer.address()
    }

    pub(crate) fn sign_hash(&self, hash: &B256) -> Result<Signature> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| Error::Signing(e.to_string()))
    }
}

impl std::fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("address", &self.address())
            .field("signer", &"[REDACTED]")
            .finish()
    }
}
