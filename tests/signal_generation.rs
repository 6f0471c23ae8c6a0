//! End-to-end Signal Generator pipeline: HHP -> TA snapshot -> PC/TA fusion -> geometry.

use aifx_signal_core::application::hybrid_provider::HybridHistoricalProvider;
use aifx_signal_core::application::signal_generator::SignalGenerator;
use aifx_signal_core::config::PredictorConfig;
use aifx_signal_core::domain::ports::{Predictor, UpstreamQuoteProvider};
use aifx_signal_core::domain::types::{
    Candle, Direction, Instrument, Pair, Prediction, SignalSource, Strength,
};
use aifx_signal_core::infrastructure::cache::ttl_cache::TtlCache;
use aifx_signal_core::infrastructure::core::circuit_breaker::CircuitBreaker;
use aifx_signal_core::infrastructure::persistence::in_memory::{InMemoryCandleStore, InMemorySignalRepository};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

fn eurusd_1h() -> Instrument {
    Instrument::new(Pair::from_str("EUR/USD").unwrap(), aifx_signal_core::domain::types::Timeframe::OneHour)
}

/// 70 ascending-close candles, one per hour, ending "now".
fn uptrend_candles(n: usize) -> Vec<Candle> {
    let pair = Pair::from_str("EUR/USD").unwrap();
    (0..n)
        .map(|i| {
            let base = dec!(1.1000) + Decimal::new(i as i64, 4);
            Candle {
                pair,
                timeframe: aifx_signal_core::domain::types::Timeframe::OneHour,
                timestamp: chrono::Utc::now() - chrono::Duration::hours((n - i) as i64),
                open: base,
                high: base + dec!(0.0005),
                low: base - dec!(0.0005),
                close: base + dec!(0.0002),
                volume: dec!(1000),
                source: "test".into(),
            }
        })
        .collect()
}

struct DeadUpstream;

#[async_trait]
impl UpstreamQuoteProvider for DeadUpstream {
    async fn latest_candle(&self, _instrument: Instrument) -> anyhow::Result<Candle> {
        anyhow::bail!("upstream unreachable")
    }
    async fn historical_candles(
        &self,
        _instrument: Instrument,
        _start: chrono::DateTime<chrono::Utc>,
        _end: chrono::DateTime<chrono::Utc>,
    ) -> anyhow::Result<Vec<Candle>> {
        Ok(vec![])
    }
}

struct ConfidentPredictor;

#[async_trait]
impl Predictor for ConfidentPredictor {
    async fn predict(&self, instrument: Instrument, _candles: &[Candle]) -> anyhow::Result<Prediction> {
        Ok(Prediction {
            instrument,
            direction: Direction::Long,
            confidence: 0.82,
            stage1_prob: 0.9,
            stage2_prob: 0.82,
            model_version: Some("test-model".into()),
        })
    }
}

struct SlowPredictor;

#[async_trait]
impl Predictor for SlowPredictor {
    async fn predict(&self, _instrument: Instrument, _candles: &[Candle]) -> anyhow::Result<Prediction> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        unreachable!("predictor call should have timed out before this resolves")
    }
}

fn predictor_config(timeout: Duration) -> PredictorConfig {
    PredictorConfig {
        base_url: "http://localhost:9100".into(),
        timeout,
        acceptance_threshold: 0.6,
    }
}

async fn build_generator(
    predictor: Arc<dyn Predictor>,
    predictor_config: PredictorConfig,
) -> (SignalGenerator, Instrument) {
    let instrument = eurusd_1h();
    let store = Arc::new(InMemoryCandleStore::default());
    for candle in uptrend_candles(70) {
        store.upsert(&candle).await.unwrap();
    }
    let upstream: Arc<dyn UpstreamQuoteProvider> = Arc::new(DeadUpstream);
    let cache = Arc::new(TtlCache::new());
    let cb = Arc::new(CircuitBreaker::new("test-uf", 5, 2, Duration::from_secs(60)));
    let hhp = Arc::new(HybridHistoricalProvider::new(store, upstream, cache, cb, Duration::from_secs(2)));
    let repository = Arc::new(InMemorySignalRepository::default());
    let predictor_cb = Arc::new(CircuitBreaker::new("test-predictor", 5, 2, Duration::from_secs(60)));

    (
        SignalGenerator::new(hhp, predictor, repository, predictor_config, predictor_cb),
        instrument,
    )
}

#[tokio::test]
async fn first_signal_emission_accepts_confident_ml_prediction() {
    let (generator, instrument) = build_generator(Arc::new(ConfidentPredictor), predictor_config(Duration::from_millis(500))).await;

    let signal = generator.generate(instrument).await.unwrap().expect("a signal should be emitted");

    assert_eq!(signal.source, SignalSource::Ml);
    assert_eq!(signal.action, aifx_signal_core::domain::types::Action::Buy);
    assert_eq!(signal.confidence, 0.82);
    assert_eq!(signal.strength, Strength::Strong);
    assert!(signal.has_valid_geometry());
    assert!(signal.stop_loss < signal.entry_price);
    assert!(signal.entry_price < signal.take_profit);
}

#[tokio::test]
async fn predictor_timeout_falls_back_to_technical_analysis() {
    let (generator, instrument) = build_generator(Arc::new(SlowPredictor), predictor_config(Duration::from_millis(50))).await;

    let signal = generator.generate(instrument).await.unwrap().expect("TA fallback should still emit a signal");

    assert_eq!(signal.source, SignalSource::Technical);
    assert!(signal.model_version.is_none());
    assert_eq!(signal.strength, Strength::from_confidence(signal.confidence));
    assert!(signal.has_valid_geometry());
}

#[tokio::test]
async fn predictor_error_falls_back_to_technical_analysis() {
    struct FailingPredictor;
    #[async_trait]
    impl Predictor for FailingPredictor {
        async fn predict(&self, _instrument: Instrument, _candles: &[Candle]) -> anyhow::Result<Prediction> {
            anyhow::bail!("predictor service 503")
        }
    }

    let (generator, instrument) = build_generator(Arc::new(FailingPredictor), predictor_config(Duration::from_millis(500))).await;

    let signal = generator.generate(instrument).await.unwrap().expect("TA fallback should still emit a signal");

    assert_eq!(signal.source, SignalSource::Technical);
}

#[tokio::test]
async fn low_confidence_ml_prediction_falls_back_to_technical_analysis() {
    struct TimidPredictor;
    #[async_trait]
    impl Predictor for TimidPredictor {
        async fn predict(&self, instrument: Instrument, _candles: &[Candle]) -> anyhow::Result<Prediction> {
            Ok(Prediction {
                instrument,
                direction: Direction::Long,
                confidence: 0.4,
                stage1_prob: 0.5,
                stage2_prob: 0.4,
                model_version: Some("test-model".into()),
            })
        }
    }

    let (generator, instrument) = build_generator(Arc::new(TimidPredictor), predictor_config(Duration::from_millis(500))).await;

    let signal = generator.generate(instrument).await.unwrap().expect("a signal should still be emitted");

    assert_eq!(signal.source, SignalSource::Technical);
}
