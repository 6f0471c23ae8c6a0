use super::types::{Action, Instrument, SignalSource, Strength};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A canonical trading recommendation emitted by the Signal Generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub instrument: Instrument,
    pub action: Action,
    pub confidence: f64,
    pub strength: Strength,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub risk_reward_ratio: Decimal,
    pub position_size_hint: Decimal,
    pub source: SignalSource,
    pub model_version: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub technical_snapshot: serde_json::Value,
}

impl Signal {
    /// `action=buy` => `stop_loss < entry_price < take_profit`;
    /// `action=sell` => `take_profit < entry_price < stop_loss`;
    /// `action=hold` => all three equal.
    pub fn has_valid_geometry(&self) -> bool {
        match self.action {
            Action::Buy => self.stop_loss < self.entry_price && self.entry_price < self.take_profit,
            Action::Sell => self.take_profit < self.entry_price && self.entry_price < self.stop_loss,
            Action::Hold => {
                self.stop_loss == self.entry_price && self.take_profit == self.entry_price
            }
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Pair, Timeframe};
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn base_signal(action: Action, entry: Decimal, sl: Decimal, tp: Decimal) -> Signal {
        Signal {
            id: Uuid::new_v4(),
            instrument: Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour),
            action,
            confidence: 0.8,
            strength: Strength::Strong,
            entry_price: entry,
            stop_loss: sl,
            take_profit: tp,
            risk_reward_ratio: dec!(2.0),
            position_size_hint: dec!(1.6),
            source: SignalSource::Ml,
            model_version: None,
            generated_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(4),
            technical_snapshot: serde_json::json!({}),
        }
    }

    #[test]
    fn buy_geometry_valid() {
        let s = base_signal(Action::Buy, dec!(1.1000), dec!(1.0980), dec!(1.1040));
        assert!(s.has_valid_geometry());
    }

    #[test]
    fn sell_geometry_valid() {
        let s = base_signal(Action::Sell, dec!(150.00), dec!(150.30), dec!(149.40));
        assert!(s.has_valid_geometry());
    }

    #[test]
    fn buy_geometry_rejects_inverted_levels() {
        let s = base_signal(Action::Buy, dec!(1.1000), dec!(1.1040), dec!(1.0980));
        assert!(!s.has_valid_geometry());
    }

    #[test]
    fn hold_geometry_collapses_to_entry() {
        let s = base_signal(Action::Hold, dec!(1.1000), dec!(1.1000), dec!(1.1000));
        assert!(s.has_valid_geometry());
    }
}
