use crate::config::NotificationConfig;
use crate::domain::delivery_state::DeliveryAdmission;
use crate::domain::instrument_state::SignalChangeEvent;
use crate::domain::repositories::{DeliveryStateRepository, SubscriberRepository, SubscriptionRepository};
use crate::domain::subscription::{Preferences, Subscriber};
use std::sync::Arc;

/// Verdict of running a `SignalChangeEvent` through one subscriber's filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accept,
    DropFilterMismatch,
    DropQuietHours,
    DropCooldown,
    DropDailyCap,
}

/// Applies per-subscriber filters, quiet hours, cooldown and daily cap before
/// delivery is attempted (spec §4.4 steps 1-6). Cooldown/cap bookkeeping is
/// delegated to a `DeliveryStateRepository` so a process restart can't reset
/// either limit.
pub struct DeliveryFilter {
    subscriptions: Arc<dyn SubscriptionRepository>,
    subscribers: Arc<dyn SubscriberRepository>,
    delivery_state: Arc<dyn DeliveryStateRepository>,
    config: NotificationConfig,
}

impl DeliveryFilter {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        subscribers: Arc<dyn SubscriberRepository>,
        delivery_state: Arc<dyn DeliveryStateRepository>,
        config: NotificationConfig,
    ) -> Self {
        Self {
            subscriptions,
            subscribers,
            delivery_state,
            config,
        }
    }

    /// Returns the list of `(Subscriber, FilterVerdict)` for every subscription
    /// on `event.instrument`; `Accept` entries have already recorded their
    /// cooldown/cap bookkeeping and are ready to hand to a `DeliveryClient`.
    pub async fn evaluate(&self, event: &SignalChangeEvent) -> anyhow::Result<Vec<(Subscriber, FilterVerdict)>> {
        let subscriptions = self.subscriptions.list_for_instrument(event.instrument).await?;
        let mut results = Vec::with_capacity(subscriptions.len());

        for subscription in subscriptions {
            let Some(subscriber) = self.subscribers.find_by_id(subscription.subscriber_id).await? else {
                continue;
            };

            if event.new_confidence < subscription.filter.min_confidence
                || !subscription.filter.allowed_actions.contains(&event.new_action)
                || (subscription.filter.strong_only
                    && !matches!(
                        event.strength,
                        crate::domain::types::Strength::Strong | crate::domain::types::Strength::VeryStrong
                    ))
            {
                results.push((subscriber, FilterVerdict::DropFilterMismatch));
                continue;
            }

            if let Some(quiet_hours) = &subscriber.preferences.quiet_hours {
                let local_time = (event.generated_at
                    + chrono::Duration::minutes(subscriber.preferences.utc_offset_minutes as i64))
                .time();
                if quiet_hours.contains(local_time) {
                    results.push((subscriber, FilterVerdict::DropQuietHours));
                    continue;
                }
            }

            let verdict = self
                .check_cooldown_and_cap(&subscriber, event)
                .await?;
            results.push((subscriber, verdict));
        }

        Ok(results)
    }

    async fn check_cooldown_and_cap(&self, subscriber: &Subscriber, event: &SignalChangeEvent) -> anyhow::Result<FilterVerdict> {
        let cooldown = cooldown_for(&subscriber.preferences, self.config.default_cooldown);
        let cap = subscriber.preferences.daily_cap.max(1);

        let admission = self
            .delivery_state
            .try_record(
                subscriber.id,
                event.new_action,
                event.generated_at,
                cooldown,
                cap,
                event.reason.bypasses_cooldown(),
            )
            .await?;

        Ok(match admission {
            DeliveryAdmission::Accepted => FilterVerdict::Accept,
            DeliveryAdmission::CooldownActive => FilterVerdict::DropCooldown,
            DeliveryAdmission::DailyCapReached => FilterVerdict::DropDailyCap,
        })
    }
}

fn cooldown_for(preferences: &Preferences, default: chrono::Duration) -> chrono::Duration {
    preferences.cooldown_override.unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument_state::ChangeReason;
    use crate::domain::subscription::{RiskLevel, SubscriberKind, Subscription, SubscriptionFilter};
    use crate::domain::types::{Action, Instrument, Pair, SignalSource, Strength, Timeframe};
    use crate::infrastructure::persistence::in_memory::{
        InMemoryDeliveryStateRepository, InMemorySubscriberRepository, InMemorySubscriptionRepository,
    };
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;
    use std::str::FromStr;
    use uuid::Uuid;

    fn instrument() -> Instrument {
        Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour)
    }

    fn event(action: Action, confidence: f64, reason: ChangeReason, at: DateTime<Utc>) -> SignalChangeEvent {
        SignalChangeEvent {
            id: Uuid::new_v4(),
            instrument: instrument(),
            prior_action: Some(Action::Hold),
            new_action: action,
            prior_confidence: Some(0.5),
            new_confidence: confidence,
            strength: Strength::from_confidence(confidence),
            reason,
            generated_at: at,
            signal: crate::domain::signal::Signal {
                id: Uuid::new_v4(),
                instrument: instrument(),
                action,
                confidence,
                strength: Strength::from_confidence(confidence),
                entry_price: dec!(1.1),
                stop_loss: dec!(1.09),
                take_profit: dec!(1.12),
                risk_reward_ratio: dec!(2.0),
                position_size_hint: dec!(1.5),
                source: SignalSource::Ml,
                model_version: None,
                generated_at: at,
                expires_at: at + chrono::Duration::hours(4),
                technical_snapshot: serde_json::json!({}),
            },
        }
    }

    async fn setup() -> (DeliveryFilter, Uuid) {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::default());
        let subscribers = Arc::new(InMemorySubscriberRepository::default());
        let delivery_state = Arc::new(InMemoryDeliveryStateRepository::default());

        let subscriber = Subscriber {
            id: Uuid::new_v4(),
            kind: SubscriberKind::ChatDm,
            platform_identity: "u1".into(),
            preferences: Preferences {
                risk_level: RiskLevel::Moderate,
                trading_style: None,
                min_confidence: 0.5,
                daily_cap: 20,
                cooldown_override: None,
                quiet_hours: None,
                utc_offset_minutes: 0,
            },
        };
        subscribers.save(&subscriber).await.unwrap();

        subscriptions
            .upsert(&Subscription {
                id: Uuid::new_v4(),
                subscriber_id: subscriber.id,
                instrument: instrument(),
                filter: SubscriptionFilter::default(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let config = NotificationConfig {
            default_cooldown: chrono::Duration::minutes(30),
            default_daily_cap: 20,
            confidence_jump_threshold: 0.15,
        };

        (
            DeliveryFilter::new(subscriptions, subscribers, delivery_state, config),
            subscriber.id,
        )
    }

    #[tokio::test]
    async fn accepts_first_qualifying_delivery() {
        let (df, _) = setup().await;
        let e = event(Action::Buy, 0.8, ChangeReason::First, Utc::now());
        let results = df.evaluate(&e).await.unwrap();
        assert_eq!(results[0].1, FilterVerdict::Accept);
    }

    #[tokio::test]
    async fn drops_second_delivery_within_cooldown() {
        let (df, _) = setup().await;
        let t0 = Utc::now();
        df.evaluate(&event(Action::Buy, 0.8, ChangeReason::ActionChange, t0)).await.unwrap();
        let second = df
            .evaluate(&event(Action::Buy, 0.8, ChangeReason::ActionChange, t0 + chrono::Duration::minutes(10)))
            .await
            .unwrap();
        assert_eq!(second[0].1, FilterVerdict::DropCooldown);
    }

    #[tokio::test]
    async fn reversal_bypasses_cooldown() {
        let (df, _) = setup().await;
        let t0 = Utc::now();
        df.evaluate(&event(Action::Buy, 0.8, ChangeReason::First, t0)).await.unwrap();
        let reversal = df
            .evaluate(&event(Action::Sell, 0.8, ChangeReason::Reversal, t0 + chrono::Duration::minutes(5)))
            .await
            .unwrap();
        assert_eq!(reversal[0].1, FilterVerdict::Accept);
    }

    #[tokio::test]
    async fn drops_below_min_confidence() {
        let (df, _) = setup().await;
        let e = event(Action::Buy, 0.1, ChangeReason::First, Utc::now());
        let results = df.evaluate(&e).await.unwrap();
        assert_eq!(results[0].1, FilterVerdict::DropFilterMismatch);
    }
}
