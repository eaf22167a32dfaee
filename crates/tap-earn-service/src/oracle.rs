//! TON price oracle.
//!
//! The ledger converts withdrawal amounts (TON) to points with
//! [`PriceOracle::current_price`]. The oracle never fails and never waits on
//! the upstream API: reads serve the last good quote, or a fixed fallback
//! before the first successful fetch. [`CoinGeckoOracle::spawn_refresh`] keeps
//! the quote current in the background.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::RwLock;

// ============================================================================
// Constants
// ============================================================================

/// Default CoinGecko API base URL.
pub const DEFAULT_COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko id of the TON coin.
const TON_COIN_ID: &str = "the-open-network";

/// TON/USD quote used until the first successful fetch (3.31).
pub const FALLBACK_TON_USD: Decimal = Decimal::from_parts(331, 0, 0, false, 2);

/// Default cache lifetime of a fetched quote.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Timeout for upstream price requests.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from fetching a quote upstream.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// Request failed.
    #[error("price request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("price API returned status {0}")]
    Status(u16),

    /// The response did not contain a usable TON/USD quote.
    #[error("price API response has no valid TON/USD quote")]
    MissingQuote,
}

/// Source of the TON price.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Price of one TON in US dollars.
    async fn ton_usd_price(&self) -> Decimal;

    /// Points per US dollar used for conversion.
    fn points_per_usd(&self) -> Decimal;

    /// Price of one TON in points.
    async fn current_price(&self) -> Decimal {
        self.ton_usd_price().await * self.points_per_usd()
    }
}

// ============================================================================
// Fixed price
// ============================================================================

/// An oracle with a constant quote, for tests and offline runs.
#[derive(Debug, Clone)]
pub struct FixedPriceOracle {
    ton_usd: Decimal,
    points_per_usd: Decimal,
}

impl FixedPriceOracle {
    /// Create an oracle that always quotes `ton_usd`.
    #[must_use]
    pub fn new(ton_usd: Decimal, points_per_usd: Decimal) -> Self {
        Self {
            ton_usd,
            points_per_usd,
        }
    }
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn ton_usd_price(&self) -> Decimal {
        self.ton_usd
    }

    fn points_per_usd(&self) -> Decimal {
        self.points_per_usd
    }
}

// ============================================================================
// CoinGecko
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct CachedQuote {
    ton_usd: Decimal,
    fetched_at: Instant,
}

#[derive(Debug, Deserialize)]
struct SimplePriceEntry {
    usd: Option<Decimal>,
}

/// Oracle backed by the CoinGecko simple-price endpoint.
pub struct CoinGeckoOracle {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    refresh_interval: Duration,
    points_per_usd: Decimal,
    cache: RwLock<Option<CachedQuote>>,
}

impl CoinGeckoOracle {
    /// Create a new oracle.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        refresh_interval: Duration,
        points_per_usd: Decimal,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
            refresh_interval,
            points_per_usd,
            cache: RwLock::new(None),
        })
    }

    /// Fetch a fresh quote and cache it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response has no quote.
    pub async fn refresh(&self) -> Result<Decimal, OracleError> {
        let ton_usd = self.fetch().await?;
        *self.cache.write().await = Some(CachedQuote {
            ton_usd,
            fetched_at: Instant::now(),
        });
        tracing::debug!(ton_usd = %ton_usd, "TON price refreshed");
        Ok(ton_usd)
    }

    async fn fetch(&self) -> Result<Decimal, OracleError> {
        let url = format!("{}/simple/price", self.api_url);
        let mut request = self
            .client
            .get(&url)
            .query(&[("ids", TON_COIN_ID), ("vs_currencies", "usd")]);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }

        let body: std::collections::HashMap<String, SimplePriceEntry> = response.json().await?;
        body.get(TON_COIN_ID)
            .and_then(|entry| entry.usd)
            .filter(|price| *price > Decimal::ZERO)
            .ok_or(OracleError::MissingQuote)
    }

    /// Refresh the quote on a fixed interval until the task is dropped.
    pub fn spawn_refresh(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(self.refresh_interval.max(Duration::from_secs(1)));
            loop {
                interval.tick().await;
                if let Err(e) = self.refresh().await {
                    tracing::warn!(error = %e, "Scheduled TON price refresh failed");
                }
            }
        })
    }
}

#[async_trait]
impl PriceOracle for CoinGeckoOracle {
    async fn ton_usd_price(&self) -> Decimal {
        match *self.cache.read().await {
            Some(quote) => {
                if quote.fetched_at.elapsed() > self.refresh_interval.saturating_mul(2) {
                    tracing::debug!(ton_usd = %quote.ton_usd, "Serving stale TON price");
                }
                quote.ton_usd
            }
            None => FALLBACK_TON_USD,
        }
    }

    fn points_per_usd(&self) -> Decimal {
        self.points_per_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn oracle(server: &MockServer, refresh: Duration) -> CoinGeckoOracle {
        CoinGeckoOracle::new(server.uri(), None, refresh, dec!(1000)).unwrap()
    }

    #[tokio::test]
    async fn fixed_oracle_converts_to_points() {
        let oracle = FixedPriceOracle::new(dec!(3.31), dec!(1000));
        assert_eq!(oracle.current_price().await, dec!(3310));
    }

    #[tokio::test]
    async fn fetches_and_caches_quote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "the-open-network"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"the-open-network": {"usd": 5.5}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let oracle = oracle(&server, Duration::from_secs(300));
        assert_eq!(oracle.refresh().await.unwrap(), dec!(5.5));
        assert_eq!(oracle.ton_usd_price().await, dec!(5.5));
        assert_eq!(oracle.current_price().await, dec!(5500));
    }

    #[tokio::test]
    async fn falls_back_before_first_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let oracle = oracle(&server, Duration::from_secs(300));
        assert!(matches!(oracle.refresh().await, Err(OracleError::Status(500))));
        assert_eq!(oracle.ton_usd_price().await, FALLBACK_TON_USD);
    }

    #[tokio::test]
    async fn keeps_last_quote_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"the-open-network": {"usd": 4}})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let oracle = oracle(&server, Duration::ZERO);
        oracle.refresh().await.unwrap();
        assert!(oracle.refresh().await.is_err());
        assert_eq!(oracle.ton_usd_price().await, dec!(4));
    }

    #[tokio::test]
    async fn reads_never_wait_on_a_slow_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"the-open-network": {"usd": 9}}))
                    .set_delay(Duration::from_secs(30)),
            )
            .expect(0)
            .mount(&server)
            .await;

        // A zero interval makes every cached quote stale.
        let oracle = oracle(&server, Duration::ZERO);
        let price = tokio::time::timeout(Duration::from_millis(500), oracle.ton_usd_price())
            .await
            .expect("price read blocked on upstream");
        assert_eq!(price, FALLBACK_TON_USD);
    }

    #[tokio::test]
    async fn background_refresh_updates_reads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"the-open-network": {"usd": 6}})),
            )
            .mount(&server)
            .await;

        let oracle = Arc::new(oracle(&server, Duration::from_secs(300)));
        let handle = Arc::clone(&oracle).spawn_refresh();

        let mut price = oracle.ton_usd_price().await;
        for _ in 0..100 {
            if price == dec!(6) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            price = oracle.ton_usd_price().await;
        }
        handle.abort();
        assert_eq!(price, dec!(6));
    }

    #[tokio::test]
    async fn missing_quote_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let oracle = oracle(&server, Duration::from_secs(300));
        assert!(matches!(oracle.refresh().await, Err(OracleError::MissingQuote)));
    }
}
