//! Login flow
//!
//! Authenticates against the identity service, then opens the user's wallet,
//! creating it (and registering its address) on first login.

mod http;

pub use http::HttpIdentityService;

use alloy::primitives::Address;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::with_timeout;
use crate::wallet::KeyManager;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated identity-service session
#[derive(Debug)]
pub struct Session {
    pub user_id: String,
    pub token: SecretString,
    pub profile: Profile,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Exchange a national id and password for a session
    async fn login(&self, national_id: &str, password: &SecretString) -> Result<Session>;

    /// Record `address` as the wallet of the session's user
    async fn register_wallet_address(&self, session: &Session, address: Address) -> Result<()>;
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub session: Session,
    pub wallet_address: Address,
    /// The wallet was created by this login
    pub wallet_created: bool,
    /// Whether the address is known to the identity service. Registration is
    /// only attempted when the wallet is created; existing wallets report
    /// `true`.
    pub address_registered: bool,
}

/// Strip formatting from a CPF (`123.456.789-09` → `12345678909`)
pub fn normalize_national_id(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

pub struct AuthOrchestrator {
    identity: Arc<dyn IdentityService>,
    keys: Arc<KeyManager>,
    timeout: Duration,
}

impl AuthOrchestrator {
    pub fn new(identity: Arc<dyn IdentityService>, keys: Arc<KeyManager>, timeout: Duration) -> Self {
        Self {
            identity,
            keys,
            timeout,
        }
    }

    pub async fn login(&self, national_id: &str, password: &SecretString) -> Result<LoginOutcome> {
        let national_id = normalize_national_id(national_id);
        if national_id.is_empty() {
            return Err(Error::Authentication);
        }

        let session = with_timeout(
            "identity login",
            self.timeout,
            self.identity.login(&national_id, password),
        )
        .await?;
        let user_id = session.user_id.clone();

        if self.keys.has_wallet(&user_id).await? {
            let wallet = self.keys.get_wallet(&user_id, password).await?;
            tracing::info!(user_id = %user_id, address = %wallet.address, "Opened wallet");
            return Ok(LoginOutcome {
                session,
                wallet_address: wallet.address,
                wallet_created: false,
                address_registered: true,
            });
        }

        let address = match self.keys.create_wallet(&user_id, password).await {
            Ok(address) => address,
            // A concurrent login created it first
            Err(Error::KeyCreation(_)) => {
                let wallet = self.keys.get_wallet(&user_id, password).await?;
                return Ok(LoginOutcome {
                    session,
                    wallet_address: wallet.address,
                    wallet_created: false,
                    address_registered: true,
                });
            }
            Err(e) => return Err(e),
        };

        let address_registered = match self.register_address(&session, address).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    address = %address,
                    error = %e,
                    "Wallet created but address registration failed"
                );
                false
            }
        };

        Ok(LoginOutcome {
            session,
            wallet_address: address,
            wallet_created: true,
            address_registered,
        })
    }

    /// Register (or re-register) the wallet address with the identity service
    pub async fn register_address(&self, session: &Session, address: Address) -> Result<()> {
        with_timeout(
            "wallet registration",
            self.timeout,
            self.identity.register_wallet_address(session, address),
        )
        .await?;
        tracing::info!(user_id = %session.user_id, address = %address, "Registered wallet address");
        Ok(())
    }
}
