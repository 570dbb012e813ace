//! Test doubles shared across modules

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::{IdentityService, Profile, Session};
use crate::chain::{ChainClient, FeeParameters};
use crate::fiat::Fiat;
use crate::store::MemorySecretStore;
use crate::tokens::TokenInfo;
use crate::transaction::TransactionStatus;
use crate::wallet::{KdfParams, KeyManager};
use crate::{Error, Result};

/// Cheap Argon2 parameters so tests don't spend seconds per unlock
pub fn fast_kdf() -> KdfParams {
    KdfParams {
        m_cost: 1024,
        t_cost: 1,
        p_cost: 1,
    }
}

pub fn password(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

pub fn key_manager() -> Arc<KeyManager> {
    Arc::new(KeyManager::new(Arc::new(MemorySecretStore::new()), fast_kdf()))
}

pub const TEST_FEES: FeeParameters = FeeParameters {
    max_fee_per_gas: 50_000_000_000,
    max_priority_fee_per_gas: 30_000_000_000,
};

/// In-memory chain with scripted balances, rates and failures
///
/// Balances and rates are keyed by token symbol. The pending nonce advances
/// on every accepted broadcast.
pub struct MockChain {
    chain_id: u64,
    balances: Mutex<HashMap<String, U256>>,
    rates: Mutex<HashMap<String, Fiat>>,
    failing_balances: Mutex<HashSet<String>>,
    hanging_balances: Mutex<HashSet<String>>,
    broadcast_errors: Mutex<VecDeque<Error>>,
    stalled_broadcasts: AtomicUsize,
    balance_read_failures: AtomicUsize,
    rate_read_failures: AtomicUsize,
    fee_read_failures: AtomicUsize,
    statuses: Mutex<HashMap<B256, Option<TransactionStatus>>>,
    hang_status: AtomicBool,
    nonce: AtomicU64,
    nonce_delay: Duration,
    pub balance_calls: AtomicUsize,
    pub nonce_calls: AtomicUsize,
    pub fee_calls: AtomicUsize,
    pub broadcast_calls: AtomicUsize,
    pub broadcasts: Mutex<Vec<Bytes>>,
}

/// Consume one scripted failure from `counter`, if any remain
fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            chain_id: 137,
            balances: Mutex::new(HashMap::new()),
            rates: Mutex::new(HashMap::new()),
            failing_balances: Mutex::new(HashSet::new()),
            hanging_balances: Mutex::new(HashSet::new()),
            broadcast_errors: Mutex::new(VecDeque::new()),
            stalled_broadcasts: AtomicUsize::new(0),
            balance_read_failures: AtomicUsize::new(0),
            rate_read_failures: AtomicUsize::new(0),
            fee_read_failures: AtomicUsize::new(0),
            statuses: Mutex::new(HashMap::new()),
            hang_status: AtomicBool::new(false),
            nonce: AtomicU64::new(0),
            nonce_delay: Duration::from_millis(5),
            balance_calls: AtomicUsize::new(0),
            nonce_calls: AtomicUsize::new(0),
            fee_calls: AtomicUsize::new(0),
            broadcast_calls: AtomicUsize::new(0),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_balance(self, symbol: &str, raw: U256) -> Self {
        self.balances.lock().unwrap().insert(symbol.to_string(), raw);
        self
    }

    pub fn with_rate(self, symbol: &str, rate: &str) -> Self {
        self.rates
            .lock()
            .unwrap()
            .insert(symbol.to_string(), rate.parse().unwrap());
        self
    }

    pub fn with_failing_balance(self, symbol: &str) -> Self {
        self.failing_balances
            .lock()
            .unwrap()
            .insert(symbol.to_string());
        self
    }

    pub fn with_hanging_balance(self, symbol: &str) -> Self {
        self.hanging_balances
            .lock()
            .unwrap()
            .insert(symbol.to_string());
        self
    }

    pub fn with_nonce(self, nonce: u64) -> Self {
        self.nonce.store(nonce, Ordering::SeqCst);
        self
    }

    /// Errors returned by the next broadcasts, in order
    pub fn fail_broadcasts(&self, errors: Vec<Error>) {
        self.broadcast_errors.lock().unwrap().extend(errors);
    }

    /// The next `count` broadcasts never answer
    pub fn stall_broadcasts(&self, count: usize) {
        self.stalled_broadcasts.store(count, Ordering::SeqCst);
    }

    /// The next `count` balance reads fail with a network error
    pub fn fail_next_balance_reads(&self, count: usize) {
        self.balance_read_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_rate_reads(&self, count: usize) {
        self.rate_read_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_fee_reads(&self, count: usize) {
        self.fee_read_failures.store(count, Ordering::SeqCst);
    }

    /// `None` makes status queries for `hash` fail
    pub fn set_status(&self, hash: B256, status: Option<TransactionStatus>) {
        self.statuses.lock().unwrap().insert(hash, status);
    }

    pub fn hang_status_queries(&self) {
        self.hang_status.store(true, Ordering::SeqCst);
    }

    pub fn set_balance(&self, symbol: &str, raw: U256) {
        self.balances.lock().unwrap().insert(symbol.to_string(), raw);
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcast_calls.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> Vec<Bytes> {
        self.broadcasts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_nonce(&self, _address: Address) -> Result<u64> {
        self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        let nonce = self.nonce.load(Ordering::SeqCst);
        // Widen the read-then-broadcast window so unserialized callers collide
        tokio::time::sleep(self.nonce_delay).await;
        Ok(nonce)
    }

    async fn get_fee_parameters(&self) -> Result<FeeParameters> {
        self.fee_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.fee_read_failures) {
            return Err(Error::Network("fee history unavailable".to_string()));
        }
        Ok(TEST_FEES)
    }

    async fn broadcast(&self, raw: Bytes) -> Result<B256> {
        self.broadcast_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.stalled_broadcasts) {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.broadcast_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.nonce.fetch_add(1, Ordering::SeqCst);
        let hash = keccak256(&raw);
        self.broadcasts.lock().unwrap().push(raw);
        Ok(hash)
    }

    async fn get_transaction_status(&self, hash: B256) -> Result<TransactionStatus> {
        if self.hang_status.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let scripted = self.statuses.lock().unwrap().get(&hash).copied();
        match scripted {
            Some(Some(status)) => Ok(status),
            Some(None) => Err(Error::Network("status query failed".to_string())),
            None => Ok(TransactionStatus::Unknown),
        }
    }

    async fn get_token_balance(&self, _address: Address, token: &TokenInfo) -> Result<U256> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        let hangs = self.hanging_balances.lock().unwrap().contains(&token.symbol);
        if hangs {
            std::future::pending::<()>().await;
        }
        let failing = self.failing_balances.lock().unwrap().contains(&token.symbol);
        if failing || take_failure(&self.balance_read_failures) {
            return Err(Error::Network(format!("{} balance unavailable", token.symbol)));
        }
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&token.symbol)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn get_fiat_rate(&self, token: &TokenInfo) -> Result<Fiat> {
        if take_failure(&self.rate_read_failures) {
            return Err(Error::Network("price feed unavailable".to_string()));
        }
        self.rates
            .lock()
            .unwrap()
            .get(&token.symbol)
            .copied()
            .ok_or_else(|| Error::Network(format!("no rate for {}", token.symbol)))
    }
}

struct Account {
    password: String,
    user_id: String,
    name: String,
}

/// Identity service with a fixed account table
pub struct MockIdentity {
    accounts: HashMap<String, Account>,
    fail_registration: AtomicBool,
    pub login_ids: Mutex<Vec<String>>,
    pub registrations: Mutex<Vec<(String, Address)>>,
}

impl MockIdentity {
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
            fail_registration: AtomicBool::new(false),
            login_ids: Mutex::new(Vec::new()),
            registrations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_account(mut self, national_id: &str, password: &str, user_id: &str) -> Self {
        self.accounts.insert(
            national_id.to_string(),
            Account {
                password: password.to_string(),
                user_id: user_id.to_string(),
                name: format!("User {}", user_id),
            },
        );
        self
    }

    pub fn set_registration_failing(&self, failing: bool) {
        self.fail_registration.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityService for MockIdentity {
    async fn login(&self, national_id: &str, password: &SecretString) -> Result<Session> {
        self.login_ids.lock().unwrap().push(national_id.to_string());
        match self.accounts.get(national_id) {
            Some(account) if account.password == password.expose_secret() => Ok(Session {
                user_id: account.user_id.clone(),
                token: SecretString::from(format!("token-{}", account.user_id)),
                profile: Profile {
                    name: account.name.clone(),
                    email: None,
                },
            }),
            _ => Err(Error::Authentication),
        }
    }

    async fn register_wallet_address(&self, session: &Session, address: Address) -> Result<()> {
        if self.fail_registration.load(Ordering::SeqCst) {
            return Err(Error::Identity("registration unavailable".to_string()));
        }
        self.registrations
            .lock()
            .unwrap()
            .push((session.user_id.clone(), address));
        Ok(())
    }
}
