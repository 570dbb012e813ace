//! Consolidated multi-token balance
//!
//! Every tracked token is queried concurrently; a token whose balance or rate
//! cannot be fetched, even after retrying transient failures, is reported in
//! `failures` and left out of the total.

use alloy::primitives::{Address, U256};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::chain::ChainClient;
use crate::config::RetryConfig;
use crate::error::{retry_transient, with_timeout};
use crate::fiat::{format_brl, Fiat};
use crate::tokens::{TokenInfo, TokenRegistry};
use crate::{ErrorKind, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenBalance {
    pub symbol: String,
    pub raw_balance: U256,
    pub decimals: u8,
    pub fiat_rate: Fiat,
    pub fiat_value: Fiat,
}

/// A token left out of an aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenFailure {
    pub symbol: String,
    pub error: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidatedBalance {
    pub total_fiat: Fiat,
    /// Successful tokens, in registry order
    pub tokens: Vec<TokenBalance>,
    pub failures: Vec<TokenFailure>,
}

impl ConsolidatedBalance {
    pub fn formatted_total(&self) -> String {
        format_brl(self.total_fiat)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn token(&self, symbol: &str) -> Option<&TokenBalance> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }
}

pub struct BalanceAggregator {
    chain: Arc<dyn ChainClient>,
    tokens: Arc<TokenRegistry>,
    timeout: Duration,
    retry: RetryConfig,
}

impl BalanceAggregator {
    /// `timeout` bounds each read attempt; `retry` governs transient failures
    pub fn new(
        chain: Arc<dyn ChainClient>,
        tokens: Arc<TokenRegistry>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            chain,
            tokens,
            timeout,
            retry,
        }
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    /// Balance of every tracked token held by `address`, valued in fiat
    pub async fn get_consolidated_balance(&self, address: Address) -> ConsolidatedBalance {
        let queries = self
            .tokens
            .tracked()
            .iter()
            .map(|token| async move { (token, self.token_balance(address, token).await) });

        let mut total_fiat = Fiat::ZERO;
        let mut tokens = Vec::new();
        let mut failures = Vec::new();

        for (token, result) in join_all(queries).await {
            match result {
                Ok(balance) => {
                    total_fiat = total_fiat.saturating_add(balance.fiat_value);
                    tokens.push(balance);
                }
                Err(e) => {
                    tracing::warn!(
                        address = %address,
                        symbol = %token.symbol,
                        error = %e,
                        "Token balance query failed"
                    );
                    failures.push(TokenFailure {
                        symbol: token.symbol.clone(),
                        error: e.kind(),
                        message: e.user_message(),
                    });
                }
            }
        }

        tracing::debug!(
            address = %address,
            total = %total_fiat,
            tokens = tokens.len(),
            failures = failures.len(),
            "Aggregated balance"
        );

        ConsolidatedBalance {
            total_fiat,
            tokens,
            failures,
        }
    }

    /// Fresh balance and rate for a single token
    pub async fn token_balance(&self, address: Address, token: &TokenInfo) -> Result<TokenBalance> {
        let chain = &self.chain;
        let timeout = self.timeout;
        let (raw_balance, fiat_rate) = tokio::try_join!(
            retry_transient("balance query", &self.retry, move || {
                with_timeout("balance query", timeout, chain.get_token_balance(address, token))
            }),
            retry_transient("rate query", &self.retry, move || {
                with_timeout("rate query", timeout, chain.get_fiat_rate(token))
            }),
        )?;

        Ok(TokenBalance {
            symbol: token.symbol.clone(),
            raw_balance,
            decimals: token.decimals,
            fiat_rate,
            fiat_value: Fiat::from_raw_units(raw_balance, token.decimals, fiat_rate),
        })
    }

    /// Refresh the balance of `address` every `interval` in the background
    pub fn watch(self: &Arc<Self>, address: Address, interval: Duration) -> BalanceWatcher {
        let (tx, rx) = watch::channel(None);
        let aggregator = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let balance = aggregator.get_consolidated_balance(address).await;
                if tx.send(Some(balance)).is_err() {
                    break;
                }
            }
        });

        BalanceWatcher { rx, handle }
    }
}

/// Handle to a background balance refresh; dropping it stops the refresh
#[derive(Debug)]
pub struct BalanceWatcher {
    rx: watch::Receiver<Option<ConsolidatedBalance>>,
    handle: JoinHandle<()>,
}

impl BalanceWatcher {
    /// Most recent aggregation, if one has completed
    pub fn latest(&self) -> Option<ConsolidatedBalance> {
        self.rx.borrow().clone()
    }

    /// Wait for the next refresh
    pub async fn next(&mut self) -> Option<ConsolidatedBalance> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }

    pub fn stop(self) {}
}

impl Drop for BalanceWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;
    use crate::tokens::polygon_defaults;
    use std::sync::atomic::Ordering;

    fn wei(ether: u64) -> U256 {
        U256::from(ether) * U256::from(10u64).pow(U256::from(18u64))
    }

    fn aggregator(chain: MockChain) -> (Arc<MockChain>, Arc<BalanceAggregator>) {
        let chain = Arc::new(chain);
        let registry = Arc::new(TokenRegistry::new(polygon_defaults()).unwrap());
        let aggregator = Arc::new(BalanceAggregator::new(
            chain.clone(),
            registry,
            Duration::from_millis(50),
            RetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 4,
            },
        ));
        (chain, aggregator)
    }

    fn fully_priced() -> MockChain {
        MockChain::new()
            .with_rate("MATIC", "4.50")
            .with_rate("USDC", "5.00")
            .with_rate("USDT", "5.00")
            .with_rate("WETH", "12000")
    }

    #[tokio::test]
    async fn values_matic_holding() {
        let (_, aggregator) = aggregator(fully_priced().with_balance("MATIC", wei(2)));

        let balance = aggregator
            .get_consolidated_balance(Address::repeat_byte(0x11))
            .await;

        assert!(balance.is_complete());
        assert_eq!(balance.tokens.len(), 4);
        let matic = balance.token("MATIC").unwrap();
        assert_eq!(matic.raw_balance, wei(2));
        assert_eq!(matic.fiat_value, Fiat::from_cents(900));
        assert_eq!(balance.total_fiat, Fiat::from_cents(900));
        assert_eq!(balance.formatted_total(), "R$ 9,00");
    }

    #[tokio::test]
    async fn sums_across_tokens_without_rounding() {
        // 1.5 USDC at 5.00 plus 0.333333 USDT at 5.00
        let (_, aggregator) = aggregator(
            fully_priced()
                .with_balance("USDC", U256::from(1_500_000u64))
                .with_balance("USDT", U256::from(333_333u64)),
        );

        let balance = aggregator
            .get_consolidated_balance(Address::repeat_byte(0x11))
            .await;

        assert_eq!(balance.total_fiat, "9.166665".parse().unwrap());
        assert_eq!(balance.formatted_total(), "R$ 9,17");
    }

    #[tokio::test]
    async fn failed_token_is_reported_not_fatal() {
        let (chain, aggregator) = aggregator(
            fully_priced()
                .with_balance("MATIC", wei(2))
                .with_failing_balance("USDC"),
        );

        let balance = aggregator
            .get_consolidated_balance(Address::repeat_byte(0x11))
            .await;

        assert_eq!(balance.tokens.len(), 3);
        assert!(balance.token("USDC").is_none());
        assert_eq!(balance.failures.len(), 1);
        assert_eq!(balance.failures[0].symbol, "USDC");
        assert_eq!(balance.failures[0].error, ErrorKind::Network);
        assert_eq!(balance.total_fiat, Fiat::from_cents(900));
        // Three attempts for USDC, one for each other token
        assert_eq!(chain.balance_calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn transient_read_failures_are_retried() {
        let (chain, aggregator) = aggregator(fully_priced().with_balance("MATIC", wei(2)));
        chain.fail_next_balance_reads(2);
        chain.fail_next_rate_reads(1);

        let balance = aggregator
            .token_balance(Address::repeat_byte(0x11), aggregator.tokens().get("MATIC").unwrap())
            .await
            .unwrap();

        assert_eq!(balance.fiat_value, Fiat::from_cents(900));
        assert_eq!(chain.balance_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_rate_is_a_failure() {
        let chain = MockChain::new()
            .with_rate("MATIC", "4.50")
            .with_balance("MATIC", wei(1));
        let (_, aggregator) = aggregator(chain);

        let balance = aggregator
            .get_consolidated_balance(Address::repeat_byte(0x11))
            .await;

        assert_eq!(balance.tokens.len(), 1);
        assert_eq!(balance.failures.len(), 3);
        assert_eq!(balance.total_fiat, Fiat::from_cents(450));
    }

    #[tokio::test]
    async fn hung_token_times_out() {
        let (_, aggregator) = aggregator(
            fully_priced()
                .with_balance("MATIC", wei(2))
                .with_hanging_balance("WETH"),
        );

        let balance = aggregator
            .get_consolidated_balance(Address::repeat_byte(0x11))
            .await;

        assert_eq!(balance.failures.len(), 1);
        assert_eq!(balance.failures[0].symbol, "WETH");
        assert_eq!(balance.failures[0].error, ErrorKind::Timeout);
        assert_eq!(balance.total_fiat, Fiat::from_cents(900));
    }

    #[tokio::test]
    async fn watcher_publishes_refreshes() {
        let (chain, aggregator) = aggregator(fully_priced().with_balance("MATIC", wei(2)));

        let mut watcher = aggregator.watch(Address::repeat_byte(0x11), Duration::from_millis(20));
        let first = watcher.next().await.unwrap();
        assert_eq!(first.total_fiat, Fiat::from_cents(900));

        chain.set_balance("MATIC", wei(4));
        let mut latest = watcher.next().await.unwrap();
        while latest.total_fiat != Fiat::from_cents(1800) {
            latest = watcher.next().await.unwrap();
        }
        assert_eq!(watcher.latest().unwrap().total_fiat, Fiat::from_cents(1800));
    }

    #[tokio::test]
    async fn dropping_watcher_stops_refresh() {
        let (chain, aggregator) = aggregator(fully_priced());

        let mut watcher = aggregator.watch(Address::repeat_byte(0x11), Duration::from_millis(10));
        watcher.next().await.unwrap();
        watcher.stop();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let calls = chain.balance_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(chain.balance_calls.load(Ordering::SeqCst), calls);
    }
}
