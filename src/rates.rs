//! NGN exchange-rate sources and the process-wide rate cache.
//!
//! The cache holds a single `{value, fetched_at, expires_at}` slot that is
//! replaced atomically on every write. A fresh slot is served without any
//! I/O; an expired slot triggers a refetch through the configured sources
//! (primary, then secondary), each wrapped in the retry helper. When every
//! fetch fails the cache degrades to the stale slot, or to a hardcoded
//! fallback constant if nothing was ever fetched — [`RateCache::get_rate`]
//! never fails outward, so conversions can always produce a number.

use crate::errors::{ChainPayError, Result};
use crate::retry::{retry, RetryPolicy};
use crate::types::{ExchangeRate, RateOrigin};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// How long a fetched rate is served without I/O.
pub const DEFAULT_TTL_SECS: i64 = 300;

/// Upward buffer applied once at cache-write time, to absorb rate
/// movement between quoting and settlement.
pub const RATE_BUFFER: f64 = 1.05;

/// Last-resort NGN-per-USD rate when no provider was ever reachable.
pub const FALLBACK_NGN_RATE: f64 = 1530.0;

/// Fixed timeout for price API requests.
pub const PRICE_API_TIMEOUT: Duration = Duration::from_secs(10);

const COINGECKO_ENDPOINT: &str = "https://api.coingecko.com/api/v3/simple/price";
const BINANCE_ENDPOINT: &str = "https://api.binance.com/api/v3/ticker/price";

/// A provider of the current NGN-per-stablecoin exchange rate.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &str;

    /// Fetches the current rate. Fails with
    /// [`ChainPayError::Network`] on transport errors and
    /// [`ChainPayError::Upstream`] on non-2xx or malformed responses.
    async fn fetch_ngn_rate(&self) -> Result<f64>;
}

/// Primary rate source: CoinGecko-style simple-price endpoint returning
/// `{ <coin>: { "ngn": <number> } }`.
#[derive(Debug, Clone)]
pub struct CoinGeckoSource {
    client: Client,
    endpoint: String,
    coin_id: String,
}

impl CoinGeckoSource {
    /// Creates a source quoting the given coin (e.g., "tether") in NGN.
    pub fn new(coin_id: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(PRICE_API_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: COINGECKO_ENDPOINT.to_string(),
            coin_id: coin_id.into(),
        })
    }

    /// Overrides the endpoint URL (proxies, self-hosted mirrors).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl RateSource for CoinGeckoSource {
    fn name(&self) -> &str {
        "coingecko"
    }

    async fn fetch_ngn_rate(&self) -> Result<f64> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("ids", self.coin_id.as_str()),
                ("vs_currencies", "ngn"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainPayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        extract_coingecko_rate(&body, &self.coin_id)
    }
}

/// Secondary rate source: Binance-style ticker endpoint returning
/// `{ "symbol": ..., "price": "<decimal string>" }`.
#[derive(Debug, Clone)]
pub struct BinanceSource {
    client: Client,
    endpoint: String,
    symbol: String,
}

impl BinanceSource {
    /// Creates a source quoting the given ticker symbol (e.g., "USDTNGN").
    pub fn new(symbol: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(PRICE_API_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: BINANCE_ENDPOINT.to_string(),
            symbol: symbol.into(),
        })
    }

    /// Overrides the endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl RateSource for BinanceSource {
    fn name(&self) -> &str {
        "binance"
    }

    async fn fetch_ngn_rate(&self) -> Result<f64> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("symbol", self.symbol.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainPayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        extract_binance_rate(&body)
    }
}

fn extract_coingecko_rate(body: &Value, coin_id: &str) -> Result<f64> {
    let rate = body
        .get(coin_id)
        .and_then(|coin| coin.get("ngn"))
        .and_then(|ngn| ngn.as_f64())
        .ok_or_else(|| ChainPayError::Upstream {
            status: 200,
            body: format!("missing {}.ngn in price response", coin_id),
        })?;
    validate_rate(rate)
}

fn extract_binance_rate(body: &Value) -> Result<f64> {
    let rate = body
        .get("price")
        .and_then(|price| price.as_str())
        .and_then(|price| price.parse::<f64>().ok())
        .ok_or_else(|| ChainPayError::Upstream {
            status: 200,
            body: "missing or non-numeric price in ticker response".to_string(),
        })?;
    validate_rate(rate)
}

/// A fetched rate must be a positive finite number; anything else is
/// treated as an upstream failure and falls through to stale/fallback.
fn validate_rate(rate: f64) -> Result<f64> {
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(ChainPayError::Upstream {
            status: 200,
            body: format!("non-positive exchange rate: {}", rate),
        })
    }
}

/// Single-slot, TTL-bound exchange-rate cache with a fallback policy.
///
/// Construct one per process and share it behind an `Arc`. The slot is
/// replaced wholesale under a write lock so readers never observe a
/// half-updated `{value, timestamp}` pairing.
pub struct RateCache {
    sources: Vec<Arc<dyn RateSource>>,
    ttl_secs: i64,
    buffer: f64,
    fallback_rate: f64,
    policy: RetryPolicy,
    offline: AtomicBool,
    slot: RwLock<Option<ExchangeRate>>,
}

impl RateCache {
    /// Creates a cache over the given sources, tried in order.
    pub fn new(sources: Vec<Arc<dyn RateSource>>) -> Self {
        Self {
            sources,
            ttl_secs: DEFAULT_TTL_SECS,
            buffer: RATE_BUFFER,
            fallback_rate: FALLBACK_NGN_RATE,
            policy: RetryPolicy::default(),
            offline: AtomicBool::new(false),
            slot: RwLock::new(None),
        }
    }

    /// Overrides the TTL in seconds.
    pub fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Overrides the cache-write buffer factor.
    pub fn with_buffer(mut self, buffer: f64) -> Self {
        self.buffer = buffer;
        self
    }

    /// Overrides the fallback rate constant.
    pub fn with_fallback_rate(mut self, fallback_rate: f64) -> Self {
        self.fallback_rate = fallback_rate;
        self
    }

    /// Overrides the retry policy used around each source.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Marks the host as offline (or back online). While offline no HTTP
    /// is attempted; the cache serves stale/fallback values immediately.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Replaces the cache slot. Intended for startup warm-up and tests.
    pub async fn set(&self, rate: ExchangeRate) {
        *self.slot.write().await = Some(rate);
    }

    /// Returns the current slot contents without triggering a fetch.
    pub async fn cached(&self) -> Option<ExchangeRate> {
        self.slot.read().await.clone()
    }

    /// Returns a usable exchange rate, degraded if necessary.
    ///
    /// Fresh slot → served without I/O. Expired or empty slot → refetch
    /// through the sources; the stored value is the raw rate times the
    /// buffer factor, with a fresh TTL. Total fetch failure → the stale
    /// slot (marked [`RateOrigin::StaleCache`]) or the fallback constant
    /// (marked [`RateOrigin::Fallback`]). Never fails outward.
    pub async fn get_rate(&self) -> ExchangeRate {
        if let Some(rate) = self.slot.read().await.as_ref() {
            if rate.is_fresh() {
                debug!(rate = rate.value, "serving cached exchange rate");
                return rate.clone();
            }
        }

        if self.offline.load(Ordering::SeqCst) {
            warn!("offline, skipping rate fetch");
            return self.degraded().await;
        }

        match self.fetch_any().await {
            Ok(raw) => {
                let buffered = raw * self.buffer;
                let rate = ExchangeRate::new(buffered, self.ttl_secs, RateOrigin::Fresh);
                info!(raw, buffered, "exchange rate refreshed");
                *self.slot.write().await = Some(rate.clone());
                rate
            }
            Err(err) => {
                warn!(error = %err, "all rate sources failed, degrading");
                self.degraded().await
            }
        }
    }

    async fn fetch_any(&self) -> Result<f64> {
        let mut last_err = ChainPayError::Config("no rate sources configured".to_string());

        for source in &self.sources {
            let source = Arc::clone(source);
            match retry(self.policy, || {
                let source = Arc::clone(&source);
                async move { source.fetch_ngn_rate().await }
            })
            .await
            {
                Ok(rate) => return Ok(rate),
                Err(err) => {
                    warn!(source = source.name(), error = %err, "rate source failed");
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }

    /// Stale cached value if one exists, otherwise the fallback constant.
    /// Fallback rates are never written back to the slot, so the next
    /// call refetches.
    async fn degraded(&self) -> ExchangeRate {
        if let Some(rate) = self.slot.read().await.as_ref() {
            return ExchangeRate {
                origin: RateOrigin::StaleCache,
                ..rate.clone()
            };
        }
        ExchangeRate::new(self.fallback_rate, 0, RateOrigin::Fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    /// Scripted rate source: pops results off a queue and counts calls.
    struct MockSource {
        calls: AtomicU32,
        results: Mutex<Vec<Result<f64>>>,
    }

    impl MockSource {
        fn new(results: Vec<Result<f64>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                results: Mutex::new(results),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateSource for MockSource {
        fn name(&self) -> &str {
            "mock"
        }

        async fn fetch_ngn_rate(&self) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock().unwrap();
            if results.is_empty() {
                Err(ChainPayError::Upstream {
                    status: 503,
                    body: "script exhausted".to_string(),
                })
            } else {
                results.remove(0)
            }
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(1, Duration::from_millis(1))
    }

    #[test]
    fn test_extract_coingecko_rate() {
        let body = json!({ "tether": { "ngn": 1530.25 } });
        assert_eq!(extract_coingecko_rate(&body, "tether").unwrap(), 1530.25);

        let missing = json!({ "bitcoin": { "usd": 67000.0 } });
        assert!(extract_coingecko_rate(&missing, "tether").is_err());

        let negative = json!({ "tether": { "ngn": -3.0 } });
        assert!(extract_coingecko_rate(&negative, "tether").is_err());
    }

    #[test]
    fn test_extract_binance_rate() {
        let body = json!({ "symbol": "USDTNGN", "price": "1528.50" });
        assert_eq!(extract_binance_rate(&body).unwrap(), 1528.5);

        let malformed = json!({ "symbol": "USDTNGN", "price": "abc" });
        assert!(extract_binance_rate(&malformed).is_err());

        let zero = json!({ "price": "0" });
        assert!(extract_binance_rate(&zero).is_err());
    }

    #[tokio::test]
    async fn test_fresh_cache_serves_without_fetch() {
        let source = MockSource::new(vec![Ok(1500.0)]);
        let cache = RateCache::new(vec![source.clone()]).with_retry_policy(fast_policy());

        let first = cache.get_rate().await;
        let second = cache.get_rate().await;

        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_buffer_applied_at_write_time() {
        let source = MockSource::new(vec![Ok(1000.0)]);
        let cache = RateCache::new(vec![source]).with_retry_policy(fast_policy());

        let rate = cache.get_rate().await;
        assert!((rate.value - 1050.0).abs() < 1e-9);
        assert_eq!(rate.origin, RateOrigin::Fresh);
    }

    #[tokio::test]
    async fn test_fallback_when_no_cache_and_no_source() {
        let source = MockSource::new(vec![]);
        let cache = RateCache::new(vec![source]).with_retry_policy(fast_policy());

        let rate = cache.get_rate().await;
        assert_eq!(rate.value, FALLBACK_NGN_RATE);
        assert_eq!(rate.origin, RateOrigin::Fallback);
        assert!(rate.is_estimated());

        // Fallback is not cached; the next call refetches.
        let _ = cache.get_rate().await;
        assert!(cache.cached().await.is_none());
    }

    #[tokio::test]
    async fn test_stale_cache_served_when_refetch_fails() {
        let source = MockSource::new(vec![Ok(1500.0)]);
        let cache = RateCache::new(vec![source])
            .with_retry_policy(fast_policy())
            .with_ttl_secs(-1); // everything written is instantly stale

        let first = cache.get_rate().await;
        assert_eq!(first.origin, RateOrigin::Fresh);

        // Script exhausted: refetch fails, the stale slot is served.
        let second = cache.get_rate().await;
        assert_eq!(second.value, first.value);
        assert_eq!(second.origin, RateOrigin::StaleCache);
        assert!(second.is_estimated());
    }

    #[tokio::test]
    async fn test_secondary_source_used_when_primary_fails() {
        let primary = MockSource::new(vec![Err(ChainPayError::Upstream {
            status: 500,
            body: "down".to_string(),
        })]);
        let secondary = MockSource::new(vec![Ok(1520.0)]);
        let cache = RateCache::new(vec![primary.clone(), secondary.clone()])
            .with_retry_policy(fast_policy())
            .with_buffer(1.0);

        let rate = cache.get_rate().await;
        assert_eq!(rate.value, 1520.0);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_offline_hint_skips_http() {
        let source = MockSource::new(vec![Ok(1500.0)]);
        let cache = RateCache::new(vec![source.clone()]).with_retry_policy(fast_policy());
        cache.set_offline(true);

        let rate = cache.get_rate().await;
        assert_eq!(rate.origin, RateOrigin::Fallback);
        assert_eq!(source.calls(), 0);

        cache.set_offline(false);
        let rate = cache.get_rate().await;
        assert_eq!(rate.origin, RateOrigin::Fresh);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_injected_rate_is_served() {
        let source = MockSource::new(vec![]);
        let cache = RateCache::new(vec![source.clone()]);
        cache
            .set(ExchangeRate::new(1530.0, 300, RateOrigin::Fresh))
            .await;

        let rate = cache.get_rate().await;
        assert_eq!(rate.value, 1530.0);
        assert_eq!(source.calls(), 0);
    }
}
