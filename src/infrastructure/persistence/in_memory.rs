//! In-memory test doubles for the repository traits, mirroring the teacher's
//! `infrastructure/repositories/in_memory.rs` convention: same trait surface,
//! `Mutex`-guarded `HashMap`/`Vec` storage, no I/O.

use crate::domain::delivery_state::DeliveryAdmission;
use crate::domain::instrument_state::InstrumentState;
use crate::domain::position::{Position, PositionMonitoringSample};
use crate::domain::ports::CandleStore;
use crate::domain::repositories::{
    DeliveryStateRepository, InstrumentStateRepository, PositionRepository, SignalRepository,
    SubscriberRepository, SubscriptionRepository,
};
use crate::domain::signal::Signal;
use crate::domain::subscription::{Subscriber, Subscription};
use crate::domain::types::{Action, Candle, Instrument};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryCandleStore {
    candles: Mutex<HashMap<Instrument, Vec<Candle>>>,
}

#[async_trait]
impl CandleStore for InMemoryCandleStore {
    async fn latest(&self, instrument: Instrument, n: usize) -> anyhow::Result<Vec<Candle>> {
        let guard = self.candles.lock().unwrap();
        let Some(series) = guard.get(&instrument) else {
            return Ok(Vec::new());
        };
        let start = series.len().saturating_sub(n);
        Ok(series[start..].to_vec())
    }

    async fn upsert(&self, candle: &Candle) -> anyhow::Result<()> {
        let mut guard = self.candles.lock().unwrap();
        let series = guard.entry(candle.instrument()).or_default();
        match series.iter_mut().find(|c| c.timestamp == candle.timestamp) {
            Some(existing) => *existing = candle.clone(),
            None => {
                series.push(candle.clone());
                series.sort_by_key(|c| c.timestamp);
            }
        }
        Ok(())
    }

    async fn upsert_batch(&self, candles: &[Candle]) -> anyhow::Result<usize> {
        for candle in candles {
            self.upsert(candle).await?;
        }
        Ok(candles.len())
    }
}

#[derive(Default)]
pub struct InMemorySignalRepository {
    by_instrument: Mutex<HashMap<Instrument, Vec<Signal>>>,
}

#[async_trait]
impl SignalRepository for InMemorySignalRepository {
    async fn save(&self, signal: &Signal) -> anyhow::Result<()> {
        self.by_instrument
            .lock()
            .unwrap()
            .entry(signal.instrument)
            .or_default()
            .push(signal.clone());
        Ok(())
    }

    async fn latest(&self, instrument: Instrument) -> anyhow::Result<Option<Signal>> {
        Ok(self
            .by_instrument
            .lock()
            .unwrap()
            .get(&instrument)
            .and_then(|v| v.last().cloned()))
    }
}

#[derive(Default)]
pub struct InMemoryInstrumentStateRepository {
    states: Mutex<HashMap<Instrument, InstrumentState>>,
}

#[async_trait]
impl InstrumentStateRepository for InMemoryInstrumentStateRepository {
    async fn load(&self, instrument: Instrument) -> anyhow::Result<Option<InstrumentState>> {
        Ok(self.states.lock().unwrap().get(&instrument).cloned())
    }

    async fn save(&self, state: &InstrumentState) -> anyhow::Result<()> {
        self.states
            .lock()
            .unwrap()
            .insert(state.instrument, state.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    subscriptions: Mutex<Vec<Subscription>>,
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn upsert(&self, subscription: &Subscription) -> anyhow::Result<()> {
        let mut guard = self.subscriptions.lock().unwrap();
        match guard.iter_mut().find(|s| {
            s.subscriber_id == subscription.subscriber_id && s.instrument == subscription.instrument
        }) {
            Some(existing) => *existing = subscription.clone(),
            None => guard.push(subscription.clone()),
        }
        Ok(())
    }

    async fn remove(&self, subscriber_id: Uuid, instrument: Option<Instrument>) -> anyhow::Result<u64> {
        let mut guard = self.subscriptions.lock().unwrap();
        let before = guard.len();
        guard.retain(|s| {
            !(s.subscriber_id == subscriber_id
                && instrument.map(|i| i == s.instrument).unwrap_or(true))
        });
        Ok((before - guard.len()) as u64)
    }

    async fn remove_by_id(&self, subscription_id: Uuid) -> anyhow::Result<bool> {
        let mut guard = self.subscriptions.lock().unwrap();
        let before = guard.len();
        guard.retain(|s| s.id != subscription_id);
        Ok(guard.len() < before)
    }

    async fn list_for_subscriber(&self, subscriber_id: Uuid) -> anyhow::Result<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.subscriber_id == subscriber_id)
            .cloned()
            .collect())
    }

    async fn list_for_instrument(&self, instrument: Instrument) -> anyhow::Result<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.instrument == instrument)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemorySubscriberRepository {
    subscribers: Mutex<HashMap<Uuid, Subscriber>>,
}

#[async_trait]
impl SubscriberRepository for InMemorySubscriberRepository {
    async fn find_by_platform_identity(&self, platform_identity: &str) -> anyhow::Result<Option<Subscriber>> {
        Ok(self
            .subscribers
            .lock()
            .unwrap()
            .values()
            .find(|s| s.platform_identity == platform_identity)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Subscriber>> {
        Ok(self.subscribers.lock().unwrap().get(&id).cloned())
    }

    async fn save(&self, subscriber: &Subscriber) -> anyhow::Result<()> {
        self.subscribers
            .lock()
            .unwrap()
            .insert(subscriber.id, subscriber.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPositionRepository {
    positions: Mutex<HashMap<Uuid, Position>>,
    samples: Mutex<Vec<PositionMonitoringSample>>,
}

#[async_trait]
impl PositionRepository for InMemoryPositionRepository {
    async fn save(&self, position: &Position) -> anyhow::Result<()> {
        self.positions
            .lock()
            .unwrap()
            .insert(position.id, position.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Position>> {
        Ok(self.positions.lock().unwrap().get(&id).cloned())
    }

    async fn list_open(&self) -> anyhow::Result<Vec<Position>> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect())
    }

    async fn list_for_subscriber(&self, subscriber_id: Uuid, pair: Option<&str>) -> anyhow::Result<Vec<Position>> {
        Ok(self
            .positions
            .lock()
            .unwrap()
            .values()
            .filter(|p| {
                p.subscriber_id == subscriber_id
                    && pair.map(|p2| p.instrument.pair.to_string() == p2).unwrap_or(true)
            })
            .cloned()
            .collect())
    }

    async fn save_sample(&self, sample: &PositionMonitoringSample) -> anyhow::Result<()> {
        self.samples.lock().unwrap().push(sample.clone());
        Ok(())
    }

    async fn list_samples(&self, position_id: Uuid) -> anyhow::Result<Vec<PositionMonitoringSample>> {
        Ok(self
            .samples
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.position_id == position_id)
            .cloned()
            .collect())
    }
}

/// In-process mirror of `SqliteDeliveryStateRepository`'s admission logic,
/// used by tests that wire a real `DeliveryFilter` without a database.
#[derive(Default)]
pub struct InMemoryDeliveryStateRepository {
    cooldowns: Mutex<HashMap<(Uuid, Action), DateTime<Utc>>>,
    daily_counts: Mutex<HashMap<Uuid, (NaiveDate, u32)>>,
}

#[async_trait]
impl DeliveryStateRepository for InMemoryDeliveryStateRepository {
    async fn try_record(
        &self,
        subscriber_id: Uuid,
        action: Action,
        now: DateTime<Utc>,
        cooldown: Duration,
        daily_cap: u32,
        bypass_cooldown: bool,
    ) -> anyhow::Result<DeliveryAdmission> {
        let mut cooldowns = self.cooldowns.lock().unwrap();
        let mut daily_counts = self.daily_counts.lock().unwrap();

        if !bypass_cooldown {
            if let Some(last) = cooldowns.get(&(subscriber_id, action)) {
                if now - *last < cooldown {
                    return Ok(DeliveryAdmission::CooldownActive);
                }
            }
        }

        let today = now.date_naive();
        let entry = daily_counts.entry(subscriber_id).or_insert((today, 0));
        if entry.0 != today {
            *entry = (today, 0);
        }
        if entry.1 >= daily_cap {
            return Ok(DeliveryAdmission::DailyCapReached);
        }

        entry.1 += 1;
        cooldowns.insert((subscriber_id, action), now);
        Ok(DeliveryAdmission::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Pair, Timeframe};
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[tokio::test]
    async fn candle_store_upsert_is_idempotent_on_timestamp() {
        let store = InMemoryCandleStore::default();
        let instrument = Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour);
        let ts = chrono::Utc::now();
        let candle = Candle {
            pair: instrument.pair,
            timeframe: instrument.timeframe,
            timestamp: ts,
            open: dec!(1.1),
            high: dec!(1.2),
            low: dec!(1.0),
            close: dec!(1.15),
            volume: dec!(100),
            source: "test".to_string(),
        };
        store.upsert(&candle).await.unwrap();
        store.upsert(&candle).await.unwrap();
        let latest = store.latest(instrument, 10).await.unwrap();
        assert_eq!(latest.len(), 1);
    }

    #[tokio::test]
    async fn subscription_upsert_replaces_on_conflict() {
        let repo = InMemorySubscriptionRepository::default();
        let instrument = Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour);
        let subscriber_id = Uuid::new_v4();
        let mut sub = Subscription {
            id: Uuid::new_v4(),
            subscriber_id,
            instrument,
            filter: Default::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        repo.upsert(&sub).await.unwrap();
        sub.filter.min_confidence = 0.9;
        repo.upsert(&sub).await.unwrap();
        let list = repo.list_for_subscriber(subscriber_id).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].filter.min_confidence, 0.9);
    }
}
