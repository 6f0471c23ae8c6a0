use super::position::PositionClosed;
use super::types::{Candle, Instrument, Prediction};
use crate::domain::instrument_state::SignalChangeEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable ordered store of candles, keyed by `(pair, timeframe, timestamp)`. (MDS)
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// The latest `n` candles for `instrument`, ascending by timestamp.
    async fn latest(&self, instrument: Instrument, n: usize) -> anyhow::Result<Vec<Candle>>;

    /// Idempotent upsert keyed by `(pair, timeframe, timestamp)`.
    async fn upsert(&self, candle: &Candle) -> anyhow::Result<()>;

    async fn upsert_batch(&self, candles: &[Candle]) -> anyhow::Result<usize>;
}

/// Adapter over a remote quote provider; rate-limited, retrying. (UF)
#[async_trait]
pub trait UpstreamQuoteProvider: Send + Sync {
    /// Fetches exactly the single latest candle for `instrument`.
    async fn latest_candle(&self, instrument: Instrument) -> anyhow::Result<Candle>;

    /// Paginated historical fetch for backfill, newest page first semantics left to the caller.
    async fn historical_candles(
        &self,
        instrument: Instrument,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Candle>>;
}

/// Short-TTL cache for hot reads. (CL)
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: std::time::Duration);
}

/// Stateless client to the remote ML predictor. (PC)
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, instrument: Instrument, candles: &[Candle]) -> anyhow::Result<Prediction>;
}

/// Outcome of a single delivery attempt, per the delivery contract in spec §4.4.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Ok,
    Retry { after: std::time::Duration },
    Drop,
}

/// Implemented by each subscriber kind (chat DM, chat channel, webhook).
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn deliver(&self, platform_identity: &str, rendered_message: &str) -> anyhow::Result<DeliveryOutcome>;
}

/// Publishes typed envelopes onto the `signals` and `positions` channels. (NB)
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish_signal_change(&self, event: SignalChangeEvent) -> anyhow::Result<()>;
    async fn publish_position_closed(&self, event: PositionClosed) -> anyhow::Result<()>;
}
