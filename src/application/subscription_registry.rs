use crate::domain::repositories::{SubscriberRepository, SubscriptionRepository};
use crate::domain::subscription::{Preferences, Subscriber, SubscriberKind, Subscription, SubscriptionFilter};
use crate::domain::types::Instrument;
use std::sync::Arc;
use uuid::Uuid;

/// Durable mapping from subscriber identity to `{instruments, filters}`
/// (spec §4.7), with lazy auto-provisioning of `Subscriber` rows on first
/// contact from a messaging-platform identity.
pub struct SubscriptionRegistry {
    subscriptions: Arc<dyn SubscriptionRepository>,
    subscribers: Arc<dyn SubscriberRepository>,
}

impl SubscriptionRegistry {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        subscribers: Arc<dyn SubscriberRepository>,
    ) -> Self {
        Self {
            subscriptions,
            subscribers,
        }
    }

    /// Creates a `Subscriber` with defaulted preferences if `platform_identity`
    /// has never been seen before; otherwise returns the existing record.
    pub async fn ensure_subscriber(&self, kind: SubscriberKind, platform_identity: &str) -> anyhow::Result<Subscriber> {
        if let Some(existing) = self.subscribers.find_by_platform_identity(platform_identity).await? {
            return Ok(existing);
        }
        let subscriber = Subscriber {
            id: Uuid::new_v4(),
            kind,
            platform_identity: platform_identity.to_string(),
            preferences: Preferences::default(),
        };
        self.subscribers.save(&subscriber).await?;
        Ok(subscriber)
    }

    /// Idempotent UPSERT on `(subscriber_id, instrument)`.
    pub async fn subscribe(
        &self,
        subscriber_id: Uuid,
        instrument: Instrument,
        filter: Option<SubscriptionFilter>,
    ) -> anyhow::Result<Uuid> {
        let existing = self
            .subscriptions
            .list_for_subscriber(subscriber_id)
            .await?
            .into_iter()
            .find(|s| s.instrument == instrument);

        let id = existing.as_ref().map(|s| s.id).unwrap_or_else(Uuid::new_v4);
        let now = chrono::Utc::now();

        let subscription = Subscription {
            id,
            subscriber_id,
            instrument,
            filter: filter.unwrap_or_default(),
            created_at: existing.map(|s| s.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.subscriptions.upsert(&subscription).await?;
        Ok(id)
    }

    /// `instrument = None` removes every subscription for `subscriber_id`.
    pub async fn unsubscribe(&self, subscriber_id: Uuid, instrument: Option<Instrument>) -> anyhow::Result<u64> {
        self.subscriptions.remove(subscriber_id, instrument).await
    }

    /// Removes a single subscription row by its own id, regardless of owner.
    pub async fn unsubscribe_by_id(&self, subscription_id: Uuid) -> anyhow::Result<bool> {
        self.subscriptions.remove_by_id(subscription_id).await
    }

    pub async fn list(&self, subscriber_id: Uuid) -> anyhow::Result<Vec<Subscription>> {
        self.subscriptions.list_for_subscriber(subscriber_id).await
    }

    pub async fn update_preferences(&self, subscriber_id: Uuid, preferences: Preferences) -> anyhow::Result<Subscriber> {
        let Some(mut subscriber) = self.subscribers.find_by_id(subscriber_id).await? else {
            anyhow::bail!("subscriber not found");
        };
        subscriber.preferences = preferences;
        self.subscribers.save(&subscriber).await?;
        Ok(subscriber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Pair, Timeframe};
    use crate::infrastructure::persistence::in_memory::{
        InMemorySubscriberRepository, InMemorySubscriptionRepository,
    };
    use std::str::FromStr;

    fn registry() -> SubscriptionRegistry {
        SubscriptionRegistry::new(
            Arc::new(InMemorySubscriptionRepository::default()),
            Arc::new(InMemorySubscriberRepository::default()),
        )
    }

    #[tokio::test]
    async fn ensure_subscriber_is_idempotent_by_platform_identity() {
        let registry = registry();
        let a = registry.ensure_subscriber(SubscriberKind::ChatDm, "user-1").await.unwrap();
        let b = registry.ensure_subscriber(SubscriberKind::ChatDm, "user-1").await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn subscribe_twice_is_a_single_row() {
        let registry = registry();
        let subscriber = registry.ensure_subscriber(SubscriberKind::ChatDm, "user-1").await.unwrap();
        let instrument = Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour);

        registry.subscribe(subscriber.id, instrument, None).await.unwrap();
        registry.subscribe(subscriber.id, instrument, None).await.unwrap();

        let list = registry.list(subscriber.id).await.unwrap();
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_all_removes_every_subscription() {
        let registry = registry();
        let subscriber = registry.ensure_subscriber(SubscriberKind::ChatDm, "user-1").await.unwrap();
        let eurusd = Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour);
        let usdjpy = Instrument::new(Pair::from_str("USD/JPY").unwrap(), Timeframe::OneHour);

        registry.subscribe(subscriber.id, eurusd, None).await.unwrap();
        registry.subscribe(subscriber.id, usdjpy, None).await.unwrap();

        let removed = registry.unsubscribe(subscriber.id, None).await.unwrap();
        assert_eq!(removed, 2);
        assert!(registry.list(subscriber.id).await.unwrap().is_empty());
    }
}
