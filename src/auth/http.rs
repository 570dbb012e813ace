//! REST identity service client
//!
//! `POST {base}/auth/login` with `{"cpf", "password"}` returns
//! `{"userId", "token", "user": {"name", "email"}}`;
//! `PUT {base}/users/{userId}/wallet` with a bearer token and `{"address"}`
//! records the wallet address.

use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{IdentityService, Profile, Session};
use crate::{Error, Result};

#[derive(Serialize)]
struct LoginBody<'a> {
    cpf: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    user_id: String,
    token: String,
    user: Profile,
}

#[derive(Serialize)]
struct RegisterBody {
    address: String,
}

#[derive(Debug, Clone)]
pub struct HttpIdentityService {
    client: Client,
    base_url: String,
}

fn identity_error(err: reqwest::Error) -> Error {
    Error::Identity(err.to_string())
}

impl HttpIdentityService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        url::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid identity URL {}: {}", base_url, e)))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Map a non-success identity response
fn status_error(status: StatusCode, operation: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Authentication,
        other => Error::Identity(format!("{} returned {}", operation, other)),
    }
}

#[async_trait]
impl IdentityService for HttpIdentityService {
    async fn login(&self, national_id: &str, password: &SecretString) -> Result<Session> {
        let response = self
            .client
            .post(self.endpoint("auth/login"))
            .json(&LoginBody {
                cpf: national_id,
                password: password.expose_secret(),
            })
            .send()
            .await
            .map_err(identity_error)?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), "login"));
        }

        let body: LoginResponse = response.json().await.map_err(identity_error)?;
        Ok(Session {
            user_id: body.user_id,
            token: SecretString::from(body.token),
            profile: body.user,
        })
    }

    async fn register_wallet_address(&self, session: &Session, address: Address) -> Result<()> {
        let response = self
            .client
            .put(self.endpoint(&format!("users/{}/wallet", session.user_id)))
            .bearer_auth(session.token.expose_secret())
            .json(&RegisterBody {
                address: address.to_checksum(None),
            })
            .send()
            .await
            .map_err(identity_error)?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), "wallet registration"));
        }
        Ok(())
    }
}
