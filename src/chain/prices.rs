//! Fiat price feed
//!
//! Queries a CoinGecko-compatible `simple/price` endpoint:
//! `GET {base}?ids=matic-network&vs_currencies=brl` →
//! `{"matic-network": {"brl": 4.5}}`.
//! Prices are parsed from their JSON text into [`Fiat`], never through `f64`.
//! Exponent notation (`1.2e-5`) is expanded and precision beyond
//! [`FIAT_DECIMALS`] is truncated.

use reqwest::Client;
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::time::Duration;

use crate::fiat::{Fiat, FIAT_DECIMALS};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct PriceFeed {
    client: Client,
    base_url: String,
    vs_currency: String,
}

impl PriceFeed {
    pub fn new(base_url: &str, vs_currency: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            vs_currency: vs_currency.to_lowercase(),
        })
    }

    /// Current price of one unit of `price_id`
    pub async fn rate(&self, price_id: &str) -> Result<Fiat> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("ids", price_id), ("vs_currencies", self.vs_currency.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "price feed returned {} for {}",
                response.status(),
                price_id
            )));
        }

        let body = response.text().await?;
        parse_rate(&body, price_id, &self.vs_currency)
    }
}

type PriceTable<'a> = HashMap<String, HashMap<String, &'a RawValue>>;

/// Price of `price_id` in `vs_currency` from a `simple/price` response body
fn parse_rate(body: &str, price_id: &str, vs_currency: &str) -> Result<Fiat> {
    let table: PriceTable = serde_json::from_str(body)
        .map_err(|e| Error::Network(format!("malformed price response: {}", e)))?;
    let price = table
        .get(price_id)
        .and_then(|entry| entry.get(vs_currency))
        .ok_or_else(|| {
            Error::Network(format!("no {} price for {}", vs_currency, price_id))
        })?;

    let raw = price.get();
    let text = if raw.starts_with('"') {
        serde_json::from_str::<String>(raw)
            .map_err(|e| Error::Network(format!("bad price string for {}: {}", price_id, e)))?
    } else if raw.starts_with(|c: char| c == '-' || c.is_ascii_digit()) {
        raw.to_string()
    } else {
        return Err(Error::Network(format!(
            "unexpected price value for {}: {}",
            price_id, raw
        )));
    };

    plain_decimal(&text)
        .and_then(|plain| plain.parse::<Fiat>())
        .map_err(|e| Error::Network(format!("unparseable price for {}: {}", price_id, e)))
}

/// Rewrite `text` in plain decimal notation with at most `FIAT_DECIMALS` places
fn plain_decimal(text: &str) -> Result<String> {
    let text = text.trim();
    let (mantissa, exponent) = match text.split_once(['e', 'E']) {
        Some((m, e)) => {
            let exponent: i32 = e
                .parse()
                .map_err(|_| Error::InvalidAmount(format!("bad exponent in {}", text)))?;
            (m, exponent)
        }
        None => (text, 0),
    };
    if exponent.abs() > 80 {
        return Err(Error::InvalidAmount(format!("exponent out of range in {}", text)));
    }

    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = format!("{}{}", int_part, frac_part);
    let point = int_part.len() as i32 + exponent;

    let (whole, frac) = if point <= 0 {
        (
            "0".to_string(),
            format!("{}{}", "0".repeat(point.unsigned_abs() as usize), digits),
        )
    } else if point as usize >= digits.len() {
        (
            format!("{}{}", digits, "0".repeat(point as usize - digits.len())),
            String::new(),
        )
    } else {
        let (w, f) = digits.split_at(point as usize);
        (w.to_string(), f.to_string())
    };

    let frac = &frac[..frac.len().min(FIAT_DECIMALS as usize)];
    if frac.is_empty() {
        Ok(whole)
    } else {
        Ok(format!("{}.{}", whole, frac))
    }
}
