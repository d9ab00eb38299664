//! ETCPOW price lookups against the CoinGecko public API.
//!
//! One `simple/price` request per report returns the fiat rate together with the
//! market figures shown in the notification.
//!
//! # Examples
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let client = PriceClient::new(None)?;
//!     let (value, market) = client.convert(42.5, "usd").await?;
//!     println!("{value} USD at {} per token", market.rate);
//!     Ok(())
//! }
//! ```

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::utils;

/// CoinGecko simple price endpoint.
const PRICE_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// CoinGecko id of the ETCPOW token.
pub const TOKEN_ID: &str = "etcpow";

/// Public CoinGecko page of the token, linked from every notification.
pub const TOKEN_PAGE_URL: &str = "https://www.coingecko.com/en/coins/etcpow";

/// Market data for the token in one fiat currency.
///
/// Only the rate is guaranteed; the API drops the other figures for thinly
/// traded tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    /// Price of one token in the fiat currency.
    pub rate: f64,
    /// Total market capitalisation in the fiat currency.
    pub market_cap: Option<f64>,
    /// Traded volume over the last 24 hours, in the fiat currency.
    pub volume_24h: Option<f64>,
    /// Price change over the last 24 hours, in percent.
    pub change_24h: Option<f64>,
    /// Unix timestamp (seconds) of the last price update.
    pub last_updated_at: Option<i64>,
}

impl MarketSnapshot {
    /// Extracts the snapshot for `token_id` and `fiat` from a `simple/price` response body.
    ///
    /// # Errors
    ///
    /// Returns `Err(String)` if the token or the `<fiat>` rate is missing.
    pub fn from_response(body: &Value, token_id: &str, fiat: &str) -> Result<Self, String> {
        let data = body
            .get(token_id)
            .and_then(Value::as_object)
            .ok_or_else(|| format!("Price response has no entry for {token_id}"))?;

        let number = |key: &str| data.get(key).and_then(Value::as_f64);

        let rate = number(fiat).ok_or_else(|| format!("Price response has no {fiat} rate for {token_id}"))?;

        Ok(Self {
            rate,
            market_cap: number(format!("{fiat}_market_cap").as_str()),
            volume_24h: number(format!("{fiat}_24h_vol").as_str()),
            change_24h: number(format!("{fiat}_24h_change").as_str()),
            last_updated_at: data.get("last_updated_at").and_then(Value::as_i64),
        })
    }

    /// Value of `balance` tokens, rounded to 3 decimals.
    pub fn value_of(&self, balance: f64) -> f64 {
        utils::round_to(balance * self.rate, 3)
    }
}

/// Client for the CoinGecko price API.
pub struct PriceClient {
    client: reqwest::Client,
}

impl PriceClient {
    /// Creates a client. Without a timeout a hung request blocks forever.
    pub fn new(timeout: Option<Duration>) -> Result<Self, String> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;
        Ok(Self { client })
    }

    /// Fetches the current market snapshot of ETCPOW in `fiat`.
    ///
    /// # Errors
    ///
    /// Returns `Err(String)` if:
    /// - The HTTP request fails or returns a non-success status
    /// - The body is not JSON
    /// - The response lacks the requested fiat rate
    pub async fn fetch_market(&self, fiat: &str) -> Result<MarketSnapshot, String> {
        log::debug!("Fetching price token={} fiat={} endpoint={}", TOKEN_ID, fiat, PRICE_API_URL);

        let start = Instant::now();
        let response = self
            .client
            .get(PRICE_API_URL)
            .query(&[
                ("ids", TOKEN_ID),
                ("vs_currencies", fiat),
                ("include_market_cap", "true"),
                ("include_24hr_vol", "true"),
                ("include_24hr_change", "true"),
                ("include_last_updated_at", "true"),
                ("precision", "2"),
            ])
            .send()
            .await
            .map_err(|e| {
                log::error!("Price API request failed fiat={}: {}", fiat, e);
                format!("HTTP request failed: {e}")
            })?;

        log::debug!(
            "Price API responded fiat={} duration_ms={} status={:?}",
            fiat,
            start.elapsed().as_millis(),
            response.status()
        );

        let response = response.error_for_status().map_err(|e| {
            log::error!("Price API returned an error fiat={}: {}", fiat, e);
            format!("Price API error: {e}")
        })?;

        let body: Value = response.json().await.map_err(|e| {
            log::error!("Failed to parse price response fiat={}: {}", fiat, e);
            format!("Failed to parse response: {e}")
        })?;

        let market = MarketSnapshot::from_response(&body, TOKEN_ID, fiat).map_err(|e| {
            log::error!("Unusable price response fiat={} body={}: {}", fiat, body, e);
            e
        })?;

        log::info!("Fetched price fiat={} rate={}", fiat, market.rate);
        Ok(market)
    }

    /// Converts `balance` tokens to `fiat`, returning the rounded value and the
    /// market snapshot it was computed from.
    pub async fn convert(&self, balance: f64, fiat: &str) -> Result<(f64, MarketSnapshot), String> {
        let market = self.fetch_market(fiat).await?;
        Ok((market.value_of(balance), market))
    }
}
