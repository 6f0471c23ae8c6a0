use crate::application::rate_limiter::TokenBucket;
use crate::domain::ports::{CandleStore, UpstreamQuoteProvider};
use crate::domain::types::{Candle, Instrument};
use crate::infrastructure::observability::HeartbeatRegistry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

const BACKFILL_BATCH_SIZE: usize = 1000;
const INCREMENTAL_CANDLE_COUNT: usize = 5;

/// Periodic incremental ingestion into the Market Data Store, plus a one-shot
/// historical backfill (spec §4.8). Shares the Upstream Fetcher's token
/// bucket with the Hybrid Historical Provider so a backfill run cannot starve
/// live reads.
pub struct DataCollector {
    store: Arc<dyn CandleStore>,
    upstream: Arc<dyn UpstreamQuoteProvider>,
    token_bucket: Arc<TokenBucket>,
    heartbeats: Arc<HeartbeatRegistry>,
}

#[derive(Debug, Default)]
pub struct BackfillReport {
    pub upserted: usize,
    pub skipped_invalid: usize,
}

impl DataCollector {
    pub fn new(
        store: Arc<dyn CandleStore>,
        upstream: Arc<dyn UpstreamQuoteProvider>,
        token_bucket: Arc<TokenBucket>,
        heartbeats: Arc<HeartbeatRegistry>,
    ) -> Self {
        Self {
            store,
            upstream,
            token_bucket,
            heartbeats,
        }
    }

    /// Every `TICK_SIGNAL`, fetch the last 5 candles per instrument and upsert.
    /// Idempotent via the `(pair, timeframe, timestamp)` unique key.
    pub async fn collect_incremental(&self, instrument: Instrument) -> anyhow::Result<usize> {
        self.heartbeats.beat("data_collector");
        if self.token_bucket.remaining().await < INCREMENTAL_CANDLE_COUNT as u32 {
            info!(%instrument, "data collector deferring incremental fetch, token bucket low");
            return Ok(0);
        }

        let end = Utc::now();
        let start = end - instrument.timeframe.to_duration() * INCREMENTAL_CANDLE_COUNT as i32;

        self.token_bucket.acquire().await?;
        let candles = self.upstream.historical_candles(instrument, start, end).await?;

        let valid: Vec<_> = candles.into_iter().filter(|c| c.is_valid()).collect();
        let count = self.store.upsert_batch(&valid).await?;
        Ok(count)
    }

    /// Ingests externally-sourced candles directly, bypassing the upstream
    /// fetcher and its token bucket (spec §6.2 bulk ingest endpoint). Callers
    /// are expected to have already filtered invalid candles.
    pub async fn ingest_batch(&self, candles: &[Candle]) -> anyhow::Result<usize> {
        self.heartbeats.beat("data_collector");
        self.store.upsert_batch(candles).await
    }

    /// One-shot task: paginates the upstream fetcher in batches of up to
    /// `BACKFILL_BATCH_SIZE` rows, dropping candles that fail OHLC validation.
    pub async fn backfill(&self, instrument: Instrument, days: i64) -> anyhow::Result<BackfillReport> {
        self.heartbeats.beat("data_collector");
        let end = Utc::now();
        let start = end - chrono::Duration::days(days);
        let mut report = BackfillReport::default();

        let mut cursor = start;
        while cursor < end {
            self.token_bucket.acquire().await?;

            let page_end = next_page_end(cursor, end, instrument.timeframe.to_duration());
            let candles = self.upstream.historical_candles(instrument, cursor, page_end).await?;

            let mut batch = Vec::with_capacity(candles.len());
            for candle in candles {
                if candle.is_valid() {
                    batch.push(candle);
                } else {
                    report.skipped_invalid += 1;
                }
            }

            for chunk in batch.chunks(BACKFILL_BATCH_SIZE) {
                let upserted = self.store.upsert_batch(chunk).await?;
                report.upserted += upserted;
            }

            if page_end <= cursor {
                warn!(%instrument, "backfill page did not advance, aborting to avoid an infinite loop");
                break;
            }
            cursor = page_end;
        }

        info!(%instrument, upserted = report.upserted, skipped = report.skipped_invalid, "backfill complete");
        Ok(report)
    }
}

fn next_page_end(cursor: DateTime<Utc>, end: DateTime<Utc>, timeframe_duration: chrono::Duration) -> DateTime<Utc> {
    let page_span = timeframe_duration * BACKFILL_BATCH_SIZE as i32;
    (cursor + page_span).min(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Candle, Pair, Timeframe};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::str::FromStr;
    use std::sync::Mutex;
    use std::time::Duration;

    struct StubStore {
        upserted: Mutex<Vec<Candle>>,
    }

    #[async_trait]
    impl CandleStore for StubStore {
        async fn latest(&self, _instrument: Instrument, _n: usize) -> anyhow::Result<Vec<Candle>> {
            Ok(vec![])
        }
        async fn upsert(&self, candle: &Candle) -> anyhow::Result<()> {
            self.upserted.lock().unwrap().push(candle.clone());
            Ok(())
        }
        async fn upsert_batch(&self, candles: &[Candle]) -> anyhow::Result<usize> {
            self.upserted.lock().unwrap().extend_from_slice(candles);
            Ok(candles.len())
        }
    }

    struct StubUpstream {
        pair: Pair,
    }

    #[async_trait]
    impl UpstreamQuoteProvider for StubUpstream {
        async fn latest_candle(&self, _instrument: Instrument) -> anyhow::Result<Candle> {
            unimplemented!()
        }
        async fn historical_candles(
            &self,
            instrument: Instrument,
            start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> anyhow::Result<Vec<Candle>> {
            Ok(vec![
                Candle {
                    pair: self.pair,
                    timeframe: instrument.timeframe,
                    timestamp: start,
                    open: dec!(1.1),
                    high: dec!(1.2),
                    low: dec!(1.0),
                    close: dec!(1.15),
                    volume: dec!(100),
                    source: "test".into(),
                },
                Candle {
                    pair: self.pair,
                    timeframe: instrument.timeframe,
                    timestamp: start,
                    open: dec!(1.1),
                    high: dec!(0.9),
                    low: dec!(1.0),
                    close: dec!(1.15),
                    volume: dec!(-5),
                    source: "test".into(),
                },
            ])
        }
    }

    #[tokio::test]
    async fn incremental_collect_drops_invalid_candles() {
        let instrument = Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour);
        let store = Arc::new(StubStore {
            upserted: Mutex::new(vec![]),
        });
        let upstream = Arc::new(StubUpstream { pair: instrument.pair });
        let bucket = Arc::new(TokenBucket::new(800, Duration::from_millis(50)));

        let dc = DataCollector::new(store.clone(), upstream, bucket, Arc::new(HeartbeatRegistry::new()));
        let count = dc.collect_incremental(instrument).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(store.upserted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn backfill_reports_skipped_invalid_candles() {
        let instrument = Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneDay);
        let store = Arc::new(StubStore {
            upserted: Mutex::new(vec![]),
        });
        let upstream = Arc::new(StubUpstream { pair: instrument.pair });
        let bucket = Arc::new(TokenBucket::new(800, Duration::from_millis(50)));

        let dc = DataCollector::new(store, upstream, bucket, Arc::new(HeartbeatRegistry::new()));
        let report = dc.backfill(instrument, 2).await.unwrap();

        assert_eq!(report.upserted, 1);
        assert_eq!(report.skipped_invalid, 1);
    }
}
