use super::hybrid_provider::HybridHistoricalProvider;
use super::technical_analyzer::{compute_snapshot, fallback_direction, TechnicalAnalysisError};
use crate::config::PredictorConfig;
use crate::domain::ports::Predictor;
use crate::domain::repositories::SignalRepository;
use crate::domain::signal::Signal;
use crate::domain::types::{Action, Direction, Instrument, SignalSource, Strength};
use crate::infrastructure::core::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

const K_SL: &str = "1.5";
const P_FLOOR: &str = "0.001";
const RISK_REWARD: &str = "2.0";
const MIN_WARMUP_CANDLES: usize = 60;

/// Fuses the Predictor Client's output with the Technical Analyzer's fallback
/// into a canonical `Signal` (spec §4.2). Pure after its two I/O inputs land.
pub struct SignalGenerator {
    hhp: Arc<HybridHistoricalProvider>,
    predictor: Arc<dyn Predictor>,
    repository: Arc<dyn SignalRepository>,
    predictor_config: PredictorConfig,
    predictor_circuit_breaker: Arc<CircuitBreaker>,
}

impl SignalGenerator {
    pub fn new(
        hhp: Arc<HybridHistoricalProvider>,
        predictor: Arc<dyn Predictor>,
        repository: Arc<dyn SignalRepository>,
        predictor_config: PredictorConfig,
        predictor_circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            hhp,
            predictor,
            repository,
            predictor_config,
            predictor_circuit_breaker,
        }
    }

    pub async fn generate(&self, instrument: Instrument) -> anyhow::Result<Option<Signal>> {
        let warmup = instrument.timeframe.warmup_candles(MIN_WARMUP_CANDLES);
        let n = MIN_WARMUP_CANDLES.max(warmup);

        let historical = self.hhp.get_recent(instrument, n).await?;
        if historical.insufficient_data {
            debug!(instrument = %instrument, "insufficient data, emitting NoSignal");
            return Ok(None);
        }
        let candles = historical.candles;

        let snapshot = match compute_snapshot(&candles) {
            Ok(snapshot) => snapshot,
            Err(TechnicalAnalysisError::InsufficientData { have, need }) => {
                debug!(instrument = %instrument, have, need, "TA warmup not satisfied, NoSignal");
                return Ok(None);
            }
            Err(TechnicalAnalysisError::NonFinite) => {
                warn!(instrument = %instrument, "TA produced non-finite values, NoSignal");
                return Ok(None);
            }
        };
        let fallback = fallback_direction(&candles, &snapshot);

        let (direction, confidence, source, model_version) = match timeout(
            self.predictor_config.timeout,
            self.predictor_circuit_breaker
                .call(self.predictor.predict(instrument, &candles)),
        )
        .await
        {
            Ok(Ok(prediction)) if prediction.confidence >= self.predictor_config.acceptance_threshold => {
                (prediction.direction, prediction.confidence, SignalSource::Ml, prediction.model_version)
            }
            Ok(Ok(prediction)) => {
                debug!(
                    instrument = %instrument,
                    pc_confidence = prediction.confidence,
                    "PC confidence below acceptance threshold, falling back to TA"
                );
                (fallback.direction, fallback.confidence, SignalSource::Technical, None)
            }
            Ok(Err(CircuitBreakerError::Open(reason))) => {
                warn!(instrument = %instrument, reason = %reason, "PC circuit breaker open, falling back to TA");
                (fallback.direction, fallback.confidence, SignalSource::Technical, None)
            }
            Ok(Err(CircuitBreakerError::Inner(e))) => {
                warn!(instrument = %instrument, error = %e, "PC call failed, falling back to TA");
                (fallback.direction, fallback.confidence, SignalSource::Technical, None)
            }
            Err(_elapsed) => {
                warn!(instrument = %instrument, "PC call timed out, falling back to TA");
                (fallback.direction, fallback.confidence, SignalSource::Technical, None)
            }
        };

        let action = Action::from_direction(direction);
        let entry_price = candles.last().map(|c| c.close).unwrap_or(Decimal::ZERO);
        if entry_price.is_zero() {
            return Ok(None);
        }

        let atr = Decimal::try_from(snapshot.atr14).unwrap_or(Decimal::ZERO);
        if atr.is_zero() {
            warn!(instrument = %instrument, "ATR is zero, arithmetic invariant violated, NoSignal");
            return Ok(None);
        }

        let (stop_loss, take_profit, risk_reward_ratio) =
            derive_sl_tp(action, entry_price, atr, direction);

        let strength = Strength::from_confidence(confidence);
        let position_size_hint = clamp_position_size(confidence);
        let expires_at = chrono::Utc::now()
            + instrument.timeframe.to_duration() * instrument.timeframe.expiry_multiplier() as i32;

        let signal = Signal {
            id: Uuid::new_v4(),
            instrument,
            action,
            confidence,
            strength,
            entry_price,
            stop_loss,
            take_profit,
            risk_reward_ratio,
            position_size_hint,
            source,
            model_version,
            generated_at: chrono::Utc::now(),
            expires_at,
            technical_snapshot: serde_json::to_value(&snapshot).unwrap_or(serde_json::json!({})),
        };

        if !signal.has_valid_geometry() {
            warn!(instrument = %instrument, "signal geometry invariant violated, NoSignal");
            return Ok(None);
        }

        self.repository.save(&signal).await?;
        Ok(Some(signal))
    }
}

/// SL/TP distance: `max(k_sl*atr, p*entry)`, TP = R * SL distance, signed by direction.
fn derive_sl_tp(
    action: Action,
    entry: Decimal,
    atr: Decimal,
    direction: Direction,
) -> (Decimal, Decimal, Decimal) {
    if action == Action::Hold {
        return (entry, entry, Decimal::ZERO);
    }

    let k_sl = Decimal::from_str(K_SL).unwrap();
    let p_floor = Decimal::from_str(P_FLOOR).unwrap();
    let r = Decimal::from_str(RISK_REWARD).unwrap();

    let sl_distance = (k_sl * atr).max(p_floor * entry);
    let tp_distance = r * sl_distance;

    match direction {
        Direction::Long => (entry - sl_distance, entry + tp_distance, r),
        Direction::Short => (entry + sl_distance, entry - tp_distance, r),
        Direction::Neutral => (entry, entry, Decimal::ZERO),
    }
}

fn clamp_position_size(confidence: f64) -> Decimal {
    let raw = (2.0 * confidence).clamp(0.25, 5.0);
    Decimal::from_f64_retain(raw).unwrap_or(Decimal::new(25, 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_geometry_has_sl_below_and_tp_above_entry() {
        let (sl, tp, rr) = derive_sl_tp(Action::Buy, dec!(1.1000), dec!(0.0020), Direction::Long);
        assert!(sl < dec!(1.1000));
        assert!(tp > dec!(1.1000));
        assert_eq!(rr, dec!(2.0));
    }

    #[test]
    fn sell_geometry_has_sl_above_and_tp_below_entry() {
        let (sl, tp, rr) = derive_sl_tp(Action::Sell, dec!(150.00), dec!(0.30), Direction::Short);
        assert!(sl > dec!(150.00));
        assert!(tp < dec!(150.00));
        assert_eq!(rr, dec!(2.0));
    }

    #[test]
    fn hold_collapses_sl_tp_to_entry() {
        let (sl, tp, rr) = derive_sl_tp(Action::Hold, dec!(1.1000), dec!(0.0020), Direction::Neutral);
        assert_eq!(sl, dec!(1.1000));
        assert_eq!(tp, dec!(1.1000));
        assert_eq!(rr, Decimal::ZERO);
    }

    #[test]
    fn sl_distance_floors_on_percentage_when_atr_tiny() {
        let (sl, _tp, _rr) = derive_sl_tp(Action::Buy, dec!(100.00), dec!(0.0001), Direction::Long);
        let distance = dec!(100.00) - sl;
        assert!(distance >= dec!(0.1));
    }

    #[test]
    fn position_size_clamped_to_range() {
        assert_eq!(clamp_position_size(0.05), dec!(0.25));
        assert_eq!(clamp_position_size(0.99), dec!(1.98));
        assert_eq!(clamp_position_size(10.0), dec!(5.0));
    }

    #[test]
    fn strength_binning_matches_thresholds() {
        assert_eq!(Strength::from_confidence(0.9), Strength::VeryStrong);
        assert_eq!(Strength::from_confidence(0.8), Strength::Strong);
        assert_eq!(Strength::from_confidence(0.65), Strength::Moderate);
        assert_eq!(Strength::from_confidence(0.3), Strength::Weak);
    }
}
