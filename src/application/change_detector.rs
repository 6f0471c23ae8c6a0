use crate::config::NotificationConfig;
use crate::domain::instrument_state::{ChangeReason, InstrumentState, SignalChangeEvent};
use crate::domain::repositories::InstrumentStateRepository;
use crate::domain::signal::Signal;
use crate::domain::types::Strength;
use std::sync::Arc;
use uuid::Uuid;

/// Per-instrument state machine over the stream of regenerated signals (spec §4.3).
/// Emits at most one `SignalChangeEvent` per invocation.
pub struct ChangeDetector {
    repository: Arc<dyn InstrumentStateRepository>,
    config: NotificationConfig,
}

impl ChangeDetector {
    pub fn new(repository: Arc<dyn InstrumentStateRepository>, config: NotificationConfig) -> Self {
        Self { repository, config }
    }

    pub async fn observe(&self, signal: Signal) -> anyhow::Result<Option<SignalChangeEvent>> {
        let mut state = self
            .repository
            .load(signal.instrument)
            .await?
            .unwrap_or_else(|| InstrumentState::new(signal.instrument));

        let reason = classify(&state, &signal, self.config.confidence_jump_threshold);

        let Some(reason) = reason else {
            return Ok(None);
        };

        let event = SignalChangeEvent {
            id: Uuid::new_v4(),
            instrument: signal.instrument,
            prior_action: state.last_signal.as_ref().map(|s| s.action),
            new_action: signal.action,
            prior_confidence: state.last_signal.as_ref().map(|s| s.confidence),
            new_confidence: signal.confidence,
            strength: signal.strength,
            reason,
            generated_at: signal.generated_at,
            signal: signal.clone(),
        };

        state.last_signal = Some(signal);
        state.last_change_at = Some(event.generated_at);
        self.repository.save(&state).await?;

        Ok(Some(event))
    }
}

/// Pure transition rule table (spec §4.3): evaluated in priority order, first match wins.
fn classify(state: &InstrumentState, signal: &Signal, confidence_jump_threshold: f64) -> Option<ChangeReason> {
    let Some(prior) = &state.last_signal else {
        return Some(ChangeReason::First);
    };

    if prior.action != signal.action {
        if prior.action.is_reversal_of(signal.action) {
            return Some(ChangeReason::Reversal);
        }
        return Some(ChangeReason::ActionChange);
    }

    let confidence_delta = (signal.confidence - prior.confidence).abs();
    if confidence_delta >= confidence_jump_threshold && signal.strength >= Strength::Moderate {
        return Some(ChangeReason::ConfidenceJump);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Action, Instrument, Pair, SignalSource, Timeframe};
    use crate::infrastructure::persistence::in_memory::InMemoryInstrumentStateRepository;
    use rust_decimal_macros::dec;
    use std::str::FromStr;
    use uuid::Uuid as UuidGen;

    fn instrument() -> Instrument {
        Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour)
    }

    fn signal(action: Action, confidence: f64, strength: Strength) -> Signal {
        Signal {
            id: UuidGen::new_v4(),
            instrument: instrument(),
            action,
            confidence,
            strength,
            entry_price: dec!(1.1000),
            stop_loss: dec!(1.0980),
            take_profit: dec!(1.1040),
            risk_reward_ratio: dec!(2.0),
            position_size_hint: dec!(1.5),
            source: SignalSource::Ml,
            model_version: None,
            generated_at: chrono::Utc::now(),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(4),
            technical_snapshot: serde_json::json!({}),
        }
    }

    fn detector() -> ChangeDetector {
        ChangeDetector::new(
            Arc::new(InMemoryInstrumentStateRepository::default()),
            NotificationConfig {
                default_cooldown: chrono::Duration::minutes(30),
                default_daily_cap: 20,
                confidence_jump_threshold: 0.15,
            },
        )
    }

    #[tokio::test]
    async fn first_observation_emits_first() {
        let cd = detector();
        let event = cd.observe(signal(Action::Buy, 0.8, Strength::Strong)).await.unwrap().unwrap();
        assert_eq!(event.reason, ChangeReason::First);
    }

    #[tokio::test]
    async fn reversal_detected_on_buy_to_sell() {
        let cd = detector();
        cd.observe(signal(Action::Buy, 0.8, Strength::Strong)).await.unwrap();
        let event = cd.observe(signal(Action::Sell, 0.7, Strength::Moderate)).await.unwrap().unwrap();
        assert_eq!(event.reason, ChangeReason::Reversal);
        assert!(event.reason.bypasses_cooldown());
    }

    #[tokio::test]
    async fn action_change_to_hold_is_not_a_reversal() {
        let cd = detector();
        cd.observe(signal(Action::Buy, 0.8, Strength::Strong)).await.unwrap();
        let event = cd.observe(signal(Action::Hold, 0.5, Strength::Weak)).await.unwrap().unwrap();
        assert_eq!(event.reason, ChangeReason::ActionChange);
    }

    #[tokio::test]
    async fn confidence_jump_requires_moderate_strength_and_threshold() {
        let cd = detector();
        cd.observe(signal(Action::Buy, 0.6, Strength::Moderate)).await.unwrap();
        let event = cd.observe(signal(Action::Buy, 0.8, Strength::Strong)).await.unwrap();
        assert!(event.is_some());
        assert_eq!(event.unwrap().reason, ChangeReason::ConfidenceJump);
    }

    #[tokio::test]
    async fn unchanged_action_below_threshold_emits_nothing() {
        let cd = detector();
        cd.observe(signal(Action::Buy, 0.80, Strength::Strong)).await.unwrap();
        let event = cd.observe(signal(Action::Buy, 0.82, Strength::Strong)).await.unwrap();
        assert!(event.is_none());
    }
}
