use super::delivery_filter::{DeliveryFilter, FilterVerdict};
use crate::config::DeliveryConfig;
use crate::domain::instrument_state::SignalChangeEvent;
use crate::domain::ports::{DeliveryClient, DeliveryOutcome, NotificationPublisher};
use crate::domain::position::PositionClosed;
use crate::domain::repositories::SubscriberRepository;
use crate::domain::subscription::{Subscriber, SubscriberKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

/// Publishes `SignalChangeEvent` and `PositionClosed` envelopes onto bounded
/// channels and fans them out to subscriber-adapter tasks (spec §4.4, §4.6).
/// Publication is non-blocking; delivery runs on its own task.
pub struct NotificationBroker {
    sender: mpsc::Sender<SignalChangeEvent>,
    position_sender: mpsc::Sender<PositionClosed>,
}

impl NotificationBroker {
    /// Spawns the fan-out tasks and returns a handle whose `publish_*` methods
    /// are non-blocking on the hot path, per spec §5.
    pub fn spawn(
        filter: Arc<DeliveryFilter>,
        subscribers: Arc<dyn SubscriberRepository>,
        clients: HashMap<SubscriberKind, Arc<dyn DeliveryClient>>,
        delivery_config: DeliveryConfig,
        buffer: usize,
    ) -> Self {
        let (sender, mut receiver) = mpsc::channel::<SignalChangeEvent>(buffer);
        let (position_sender, mut position_receiver) = mpsc::channel::<PositionClosed>(buffer);

        {
            let clients = clients.clone();
            tokio::spawn(async move {
                while let Some(event) = receiver.recv().await {
                    let verdicts = match filter.evaluate(&event).await {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(error = %e, "delivery filter evaluation failed");
                            continue;
                        }
                    };

                    for (subscriber, verdict) in verdicts {
                        if verdict != FilterVerdict::Accept {
                            continue;
                        }
                        let Some(client) = clients.get(&subscriber.kind).cloned() else {
                            warn!(kind = ?subscriber.kind, "no delivery client registered for subscriber kind");
                            continue;
                        };
                        let message = render_signal_message(&event);
                        let cfg = delivery_config;
                        tokio::spawn(async move {
                            deliver_with_retry(client, subscriber, message, cfg).await;
                        });
                    }
                }
            });
        }

        tokio::spawn(async move {
            while let Some(event) = position_receiver.recv().await {
                let subscriber = match subscribers.find_by_id(event.subscriber_id).await {
                    Ok(Some(s)) => s,
                    Ok(None) => {
                        warn!(subscriber_id = %event.subscriber_id, "position closed for unknown subscriber");
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "subscriber lookup failed for position closed event");
                        continue;
                    }
                };
                let Some(client) = clients.get(&subscriber.kind).cloned() else {
                    warn!(kind = ?subscriber.kind, "no delivery client registered for subscriber kind");
                    continue;
                };
                let message = render_position_closed_message(&event);
                let cfg = delivery_config;
                tokio::spawn(async move {
                    deliver_with_retry(client, subscriber, message, cfg).await;
                });
            }
        });

        Self { sender, position_sender }
    }

    pub async fn publish(&self, event: SignalChangeEvent) -> anyhow::Result<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("notification broker channel closed"))
    }
}

#[async_trait]
impl NotificationPublisher for NotificationBroker {
    async fn publish_signal_change(&self, event: SignalChangeEvent) -> anyhow::Result<()> {
        self.publish(event).await
    }

    async fn publish_position_closed(&self, event: PositionClosed) -> anyhow::Result<()> {
        self.position_sender
            .send(event)
            .await
            .map_err(|_| anyhow::anyhow!("notification broker position channel closed"))
    }
}

async fn deliver_with_retry(
    client: Arc<dyn DeliveryClient>,
    subscriber: Subscriber,
    message: String,
    config: DeliveryConfig,
) {
    for attempt in 0..config.max_attempts {
        let outcome = tokio::time::timeout(
            config.per_attempt_timeout,
            client.deliver(&subscriber.platform_identity, &message),
        )
        .await;

        match outcome {
            Ok(Ok(DeliveryOutcome::Ok)) => {
                info!(subscriber = %subscriber.id, attempt, "delivery succeeded");
                return;
            }
            Ok(Ok(DeliveryOutcome::Drop)) => {
                warn!(subscriber = %subscriber.id, "delivery adapter dropped message");
                return;
            }
            Ok(Ok(DeliveryOutcome::Retry { after })) => {
                warn!(subscriber = %subscriber.id, attempt, "delivery requested retry");
                sleep(after.max(config.backoff_for_attempt(attempt))).await;
            }
            Ok(Err(e)) => {
                warn!(subscriber = %subscriber.id, attempt, error = %e, "delivery attempt failed");
                sleep(config.backoff_for_attempt(attempt)).await;
            }
            Err(_elapsed) => {
                warn!(subscriber = %subscriber.id, attempt, "delivery attempt timed out");
                sleep(config.backoff_for_attempt(attempt)).await;
            }
        }
    }
    warn!(subscriber = %subscriber.id, "delivery exhausted retries, dropping");
}

fn render_signal_message(event: &SignalChangeEvent) -> String {
    format!(
        "{} {} → {} (confidence {:.2}, {:?})",
        event.instrument, event.prior_action.map(|a| a.to_string()).unwrap_or_else(|| "none".into()),
        event.new_action, event.new_confidence, event.reason
    )
}

fn render_position_closed_message(event: &PositionClosed) -> String {
    format!(
        "{} position {} closed at {} ({:?}, {} pips)",
        event.instrument, event.position_id, event.exit_price, event.status, event.realized_pnl_pips
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument_state::ChangeReason;
    use crate::domain::types::{Action, Instrument, Pair, SignalSource, Strength, Timeframe};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingClient {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DeliveryClient for CountingClient {
        async fn deliver(&self, _platform_identity: &str, _rendered_message: &str) -> anyhow::Result<DeliveryOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DeliveryOutcome::Ok)
        }
    }

    fn sample_event() -> SignalChangeEvent {
        let instrument = Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour);
        SignalChangeEvent {
            id: Uuid::new_v4(),
            instrument,
            prior_action: None,
            new_action: Action::Buy,
            prior_confidence: None,
            new_confidence: 0.8,
            strength: Strength::Strong,
            reason: ChangeReason::First,
            generated_at: chrono::Utc::now(),
            signal: crate::domain::signal::Signal {
                id: Uuid::new_v4(),
                instrument,
                action: Action::Buy,
                confidence: 0.8,
                strength: Strength::Strong,
                entry_price: dec!(1.1),
                stop_loss: dec!(1.09),
                take_profit: dec!(1.12),
                risk_reward_ratio: dec!(2.0),
                position_size_hint: dec!(1.6),
                source: SignalSource::Ml,
                model_version: None,
                generated_at: chrono::Utc::now(),
                expires_at: chrono::Utc::now() + chrono::Duration::hours(4),
                technical_snapshot: serde_json::json!({}),
            },
        }
    }

    #[test]
    fn render_message_includes_instrument_and_reason() {
        let message = render_signal_message(&sample_event());
        assert!(message.contains("EUR/USD"));
        assert!(message.contains("First"));
    }
}
