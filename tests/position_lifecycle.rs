//! End-to-end Position Monitor pipeline: fetching the latest candle through a
//! real HybridHistoricalProvider, detecting SL/TP triggers, persisting the
//! terminal state and publishing the position-closed event.

use aifx_signal_core::application::hybrid_provider::HybridHistoricalProvider;
use aifx_signal_core::application::position_monitor::PositionMonitor;
use aifx_signal_core::domain::ports::{NotificationPublisher, UpstreamQuoteProvider};
use aifx_signal_core::domain::position::{Position, PositionClosed, PositionStatus, Side};
use aifx_signal_core::domain::repositories::PositionRepository;
use aifx_signal_core::domain::types::{Candle, Instrument, Pair, Timeframe};
use aifx_signal_core::infrastructure::cache::ttl_cache::TtlCache;
use aifx_signal_core::infrastructure::core::circuit_breaker::CircuitBreaker;
use aifx_signal_core::infrastructure::persistence::in_memory::{InMemoryCandleStore, InMemoryPositionRepository};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

struct FixedUpstream {
    candle: Candle,
}

#[async_trait]
impl UpstreamQuoteProvider for FixedUpstream {
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

#[derive(Default)]
struct RecordingPublisher {
    closed: Mutex<Vec<PositionClosed>>,
}

#[async_trait]
impl NotificationPublisher for RecordingPublisher {
    async fn publish_signal_change(
        &self,
        _event: aifx_signal_core::domain::instrument_state::SignalChangeEvent,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn publish_position_closed(&self, event: PositionClosed) -> anyhow::Result<()> {
        self.closed.lock().unwrap().push(event);
        Ok(())
    }
}

fn candle(pair: &str, open: rust_decimal::Decimal, high: rust_decimal::Decimal, low: rust_decimal::Decimal, close: rust_decimal::Decimal) -> Candle {
    Candle {
        pair: Pair::from_str(pair).unwrap(),
        timeframe: Timeframe::OneHour,
        timestamp: Utc::now(),
        open,
        high,
        low,
        close,
        volume: dec!(1000),
        source: "test".into(),
    }
}

async fn build_monitor(
    upstream_candle: Candle,
) -> (PositionMonitor, Arc<InMemoryPositionRepository>, Arc<RecordingPublisher>) {
    let store = Arc::new(InMemoryCandleStore::default());
    let upstream: Arc<dyn UpstreamQuoteProvider> = Arc::new(FixedUpstream { candle: upstream_candle });
    let cache = Arc::new(TtlCache::new());
    let cb = Arc::new(CircuitBreaker::new("test-pm-uf", 5, 2, Duration::from_secs(60)));
    let hhp = Arc::new(HybridHistoricalProvider::new(store, upstream, cache, cb, Duration::from_secs(2)));

    let positions = Arc::new(InMemoryPositionRepository::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let monitor = PositionMonitor::new(positions.clone(), hhp, publisher.clone());

    (monitor, positions, publisher)
}

/// Scenario: an open long EUR/USD position is closed at the stop loss once
/// the fetched candle's low pierces it, with realized P&L in pips matching
/// the signed distance from entry and a `PositionClosed` event published.
#[tokio::test]
async fn long_position_closes_at_stop_loss_and_publishes_event() {
    let subscriber_id = Uuid::new_v4();
    let position = Position {
        id: Uuid::new_v4(),
        subscriber_id,
        instrument: Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour),
        side: Side::Long,
        entry_price: dec!(1.1000),
        stop_loss: dec!(1.0980),
        take_profit: dec!(1.1040),
        size: dec!(1.0),
        opened_at: Utc::now(),
        status: PositionStatus::Open,
        exit_price: None,
        closed_at: None,
        realized_pnl_pips: None,
        notes: None,
    };

    let triggering_candle = candle("EUR/USD", dec!(1.0990), dec!(1.1005), dec!(1.0975), dec!(1.0985));
    let (monitor, positions, publisher) = build_monitor(triggering_candle).await;
    positions.save(&position).await.unwrap();

    monitor.tick().await.unwrap();

    let closed = positions.find_by_id(position.id).await.unwrap().expect("position must still exist");
    assert_eq!(closed.status, PositionStatus::ClosedSl);
    assert_eq!(closed.exit_price, Some(dec!(1.0980)));
    assert_eq!(closed.realized_pnl_pips, Some(dec!(-20.0)));
    assert!(closed.closed_at.is_some());

    let events = publisher.closed.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].position_id, position.id);
    assert_eq!(events[0].subscriber_id, subscriber_id);
    assert_eq!(events[0].status, PositionStatus::ClosedSl);
    assert_eq!(events[0].realized_pnl_pips, dec!(-20.0));
}

/// Scenario: a short USD/JPY position stays open when the candle's high/low
/// band doesn't reach either level, using the JPY pip size (0.01) for the
/// unrealized P&L math rather than the 0.0001 used by non-JPY pairs.
#[tokio::test]
async fn short_jpy_position_stays_open_with_correct_pip_sizing() {
    let subscriber_id = Uuid::new_v4();
    let position = Position {
        id: Uuid::new_v4(),
        subscriber_id,
        instrument: Instrument::new(Pair::from_str("USD/JPY").unwrap(), Timeframe::OneHour),
        side: Side::Short,
        entry_price: dec!(150.00),
        stop_loss: dec!(150.30),
        take_profit: dec!(149.40),
        size: dec!(1.0),
        opened_at: Utc::now(),
        status: PositionStatus::Open,
        exit_price: None,
        closed_at: None,
        realized_pnl_pips: None,
        notes: None,
    };

    let non_triggering_candle = candle("USD/JPY", dec!(150.00), dec!(150.10), dec!(149.85), dec!(149.925));
    let (monitor, positions, publisher) = build_monitor(non_triggering_candle).await;
    positions.save(&position).await.unwrap();

    monitor.tick().await.unwrap();

    let still_open = positions.find_by_id(position.id).await.unwrap().expect("position must still exist");
    assert_eq!(still_open.status, PositionStatus::Open);
    assert!(still_open.exit_price.is_none());

    let pip_size = Pair::from_str("USD/JPY").unwrap().pip_size();
    assert_eq!(pip_size, dec!(0.01));
    let unrealized = still_open.pnl_pips(dec!(149.925), pip_size);
    assert_eq!(unrealized, dec!(7.5));

    assert!(publisher.closed.lock().unwrap().is_empty(), "no close event should fire for a non-triggering tick");
}
