use crate::domain::ports::{Cache, CandleStore, UpstreamQuoteProvider};
use crate::domain::types::{Candle, Instrument};
use crate::infrastructure::core::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Result of `HybridHistoricalProvider::get_recent`, carrying the freshness hints
/// callers need to decide how to react to degraded upstream data (§4.1).
#[derive(Debug, Clone)]
pub struct HistoricalResult {
    pub candles: Vec<Candle>,
    pub stale: bool,
    pub insufficient_data: bool,
}

/// Composes the Market Data Store, Upstream Fetcher and Cache Layer to return
/// "N recent candles" with a bounded freshness guarantee (spec §4.1).
pub struct HybridHistoricalProvider {
    mds: Arc<dyn CandleStore>,
    uf: Arc<dyn UpstreamQuoteProvider>,
    cache: Arc<dyn Cache>,
    circuit_breaker: Arc<CircuitBreaker>,
    uf_timeout: Duration,
}

impl HybridHistoricalProvider {
    pub fn new(
        mds: Arc<dyn CandleStore>,
        uf: Arc<dyn UpstreamQuoteProvider>,
        cache: Arc<dyn Cache>,
        circuit_breaker: Arc<CircuitBreaker>,
        uf_timeout: Duration,
    ) -> Self {
        Self {
            mds,
            uf,
            cache,
            circuit_breaker,
            uf_timeout,
        }
    }

    /// `get_recent(instrument, n) -> [Candle; n]` ordered ascending by timestamp.
    pub async fn get_recent(&self, instrument: Instrument, n: usize) -> anyhow::Result<HistoricalResult> {
        let cache_key = format!("hist:{}:{}", instrument.cache_key(), n);
        if let Some(bytes) = self.cache.get(&cache_key).await {
            if let Ok(result) = serde_json::from_slice::<Vec<Candle>>(&bytes) {
                debug!(instrument = %instrument, "hybrid provider cache hit");
                return Ok(HistoricalResult {
                    candles: result,
                    stale: false,
                    insufficient_data: false,
                });
            }
        }

        let mds_request = self.mds.latest(instrument, n.saturating_sub(1));
        let uf_request = timeout(
            self.uf_timeout,
            self.circuit_breaker.call(self.uf.latest_candle(instrument)),
        );

        let (mds_result, uf_result) = tokio::join!(mds_request, uf_request);

        let mut mds_candles = mds_result.map_err(|e| anyhow::anyhow!("MDS read failed: {e}"))?;

        let insufficient_data = mds_candles.len() < n.saturating_sub(1);

        let mut stale = false;
        match uf_result {
            Ok(Ok(candle)) => {
                if !candle.is_valid() {
                    warn!(instrument = %instrument, "UF candle failed OHLC validation, dropping");
                } else {
                    let exceeds_mds_max = mds_candles
                        .last()
                        .map(|last| candle.timestamp > last.timestamp)
                        .unwrap_or(true);
                    if exceeds_mds_max {
                        mds_candles.push(candle.clone());
                        let mds = self.mds.clone();
                        tokio::spawn(async move {
                            if let Err(e) = mds.upsert(&candle).await {
                                warn!("async upsert of UF candle failed: {e}");
                            }
                        });
                    } else {
                        stale = true;
                    }
                }
            }
            Ok(Err(CircuitBreakerError::Open(msg))) => {
                debug!("UF circuit open, falling back to MDS-only: {msg}");
                stale = true;
            }
            Ok(Err(CircuitBreakerError::Inner(e))) => {
                debug!("UF call failed, falling back to MDS-only: {e}");
                stale = true;
            }
            Err(_elapsed) => {
                debug!("UF call timed out after {:?}, falling back to MDS-only", self.uf_timeout);
                stale = true;
            }
        }

        mds_candles.sort_by_key(|c| c.timestamp);

        let ttl = Duration::from_secs(30.min(instrument.timeframe.to_seconds() as u64 / 3));
        if let Ok(bytes) = serde_json::to_vec(&mds_candles) {
            self.cache.set(&cache_key, bytes, ttl).await;
        }

        Ok(HistoricalResult {
            candles: mds_candles,
            stale,
            insufficient_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Pair, Timeframe};
    use crate::infrastructure::cache::ttl_cache::TtlCache;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::str::FromStr;
    use std::sync::Mutex;

    struct StubStore {
        candles: Mutex<Vec<Candle>>,
    }

    #[async_trait]
    impl CandleStore for StubStore {
        async fn latest(&self, _instrument: Instrument, n: usize) -> anyhow::Result<Vec<Candle>> {
            let candles = self.candles.lock().unwrap();
            let start = candles.len().saturating_sub(n);
            Ok(candles[start..].to_vec())
        }
        async fn upsert(&self, candle: &Candle) -> anyhow::Result<()> {
            self.candles.lock().unwrap().push(candle.clone());
            Ok(())
        }
        async fn upsert_batch(&self, candles: &[Candle]) -> anyhow::Result<usize> {
            self.candles.lock().unwrap().extend_from_slice(candles);
            Ok(candles.len())
        }
    }

    struct StubUpstream {
        candle: Candle,
    }

    #[async_trait]
    impl UpstreamQuoteProvider for StubUpstream {
        async fn latest_candle(&self, _instrument: Instrument) -> anyhow::Result<Candle> {
            Ok(self.candle.clone())
        }
        async fn historical_candles(
            &self,
            _instrument: Instrument,
            _start: chrono::DateTime<Utc>,
            _end: chrono::DateTime<Utc>,
        ) -> anyhow::Result<Vec<Candle>> {
            Ok(vec![])
        }
    }

    fn make_candle(pair: &str, ts: chrono::DateTime<Utc>, close: rust_decimal::Decimal) -> Candle {
        Candle {
            pair: Pair::from_str(pair).unwrap(),
            timeframe: Timeframe::OneHour,
            timestamp: ts,
            open: close,
            high: close + dec!(0.001),
            low: close - dec!(0.001),
            close,
            volume: dec!(100),
            source: "test".into(),
        }
    }

    #[tokio::test]
    async fn prepends_fresh_uf_candle_over_mds_max() {
        let instrument = Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour);
        let old = make_candle("EUR/USD", Utc::now() - chrono::Duration::hours(2), dec!(1.1000));
        let fresh = make_candle("EUR/USD", Utc::now(), dec!(1.1010));

        let store = Arc::new(StubStore {
            candles: Mutex::new(vec![old]),
        });
        let upstream = Arc::new(StubUpstream {
            candle: fresh.clone(),
        });
        let cache = Arc::new(TtlCache::new());
        let cb = Arc::new(CircuitBreaker::new("uf-test", 3, 2, Duration::from_secs(30)));

        let hhp = HybridHistoricalProvider::new(store, upstream, cache, cb, Duration::from_secs(2));
        let result = hhp.get_recent(instrument, 2).await.unwrap();

        assert_eq!(result.candles.len(), 2);
        assert_eq!(result.candles.last().unwrap().close, dec!(1.1010));
        assert!(!result.stale);
    }
}
