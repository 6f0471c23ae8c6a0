//! Repository pattern: each aggregate's persistence is exposed through a narrow
//! trait here and implemented against SQLite in `infrastructure::persistence`.
//! Application-layer components depend only on these traits, never on `sqlx`
//! directly, so tests can swap in in-memory implementations.

use crate::domain::delivery_state::DeliveryAdmission;
use crate::domain::instrument_state::InstrumentState;
use crate::domain::position::{Position, PositionMonitoringSample};
use crate::domain::signal::Signal;
use crate::domain::subscription::{Subscriber, Subscription};
use crate::domain::types::{Action, Instrument};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

#[async_trait]
pub trait SignalRepository: Send + Sync {
    async fn save(&self, signal: &Signal) -> anyhow::Result<()>;
    async fn latest(&self, instrument: Instrument) -> anyhow::Result<Option<Signal>>;
}

#[async_trait]
pub trait InstrumentStateRepository: Send + Sync {
    async fn load(&self, instrument: Instrument) -> anyhow::Result<Option<InstrumentState>>;
    async fn save(&self, state: &InstrumentState) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// UPSERT on `(subscriber_id, instrument)`.
    async fn upsert(&self, subscription: &Subscription) -> anyhow::Result<()>;
    async fn remove(&self, subscriber_id: Uuid, instrument: Option<Instrument>) -> anyhow::Result<u64>;
    async fn remove_by_id(&self, subscription_id: Uuid) -> anyhow::Result<bool>;
    async fn list_for_subscriber(&self, subscriber_id: Uuid) -> anyhow::Result<Vec<Subscription>>;
    async fn list_for_instrument(&self, instrument: Instrument) -> anyhow::Result<Vec<Subscription>>;
}

#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    async fn find_by_platform_identity(&self, platform_identity: &str) -> anyhow::Result<Option<Subscriber>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Subscriber>>;
    async fn save(&self, subscriber: &Subscriber) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn save(&self, position: &Position) -> anyhow::Result<()>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Position>>;
    async fn list_open(&self) -> anyhow::Result<Vec<Position>>;
    async fn list_for_subscriber(&self, subscriber_id: Uuid, pair: Option<&str>) -> anyhow::Result<Vec<Position>>;

    /// Appends one row to the position's monitoring time series.
    async fn save_sample(&self, sample: &PositionMonitoringSample) -> anyhow::Result<()>;
    /// Full time series for a position, ordered oldest first.
    async fn list_samples(&self, position_id: Uuid) -> anyhow::Result<Vec<PositionMonitoringSample>>;
}

/// Durable per-subscriber, per-action cooldown and daily-cap bookkeeping for
/// the Delivery Filter (spec §5): a short-lived transaction per delivery
/// attempt so a process restart can't silently reset either limit.
#[async_trait]
pub trait DeliveryStateRepository: Send + Sync {
    /// Atomically checks cooldown/cap and, if admitted, records the delivery.
    /// `bypass_cooldown` is set for reversal changes, which still count
    /// against the daily cap but ignore the per-action cooldown window.
    async fn try_record(
        &self,
        subscriber_id: Uuid,
        action: Action,
        now: DateTime<Utc>,
        cooldown: Duration,
        daily_cap: u32,
        bypass_cooldown: bool,
    ) -> anyhow::Result<DeliveryAdmission>;
}
