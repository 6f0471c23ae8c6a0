use super::types::Instrument;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    ClosedTp,
    ClosedSl,
    ClosedManual,
}

impl PositionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PositionStatus::Open)
    }
}

/// At most one status transition, which is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub instrument: Instrument,
    pub side: Side,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub size: Decimal,
    pub opened_at: DateTime<Utc>,
    pub status: PositionStatus,
    pub exit_price: Option<Decimal>,
    pub closed_at: Option<DateTime<Utc>>,
    pub realized_pnl_pips: Option<Decimal>,
    pub notes: Option<String>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// SL/TP invariant per the signal geometry: long => sl < entry < tp; short => mirrored.
    pub fn has_valid_levels(&self) -> bool {
        match self.side {
            Side::Long => self.stop_loss < self.entry_price && self.entry_price < self.take_profit,
            Side::Short => self.take_profit < self.entry_price && self.entry_price < self.stop_loss,
        }
    }

    /// Pnl in pips, signed with side and price direction.
    pub fn pnl_pips(&self, price: Decimal, pip_size: Decimal) -> Decimal {
        let diff = match self.side {
            Side::Long => price - self.entry_price,
            Side::Short => self.entry_price - price,
        };
        diff / pip_size
    }
}

/// Append-only time series sample per position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionMonitoringSample {
    pub position_id: Uuid,
    pub observed_at: DateTime<Utc>,
    pub current_price: Decimal,
    pub unrealized_pnl_pips: Decimal,
    pub unrealized_pnl_pct: Decimal,
    pub high_watermark: Decimal,
    pub low_watermark: Decimal,
    pub sl_armed: bool,
    pub tp_armed: bool,
}

/// Emitted on the `positions` channel when a position reaches a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionClosed {
    pub position_id: Uuid,
    pub subscriber_id: Uuid,
    pub instrument: Instrument,
    pub status: PositionStatus,
    pub exit_price: Decimal,
    pub realized_pnl_pips: Decimal,
    pub closed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Pair, Timeframe};
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn position(side: Side, entry: Decimal, sl: Decimal, tp: Decimal) -> Position {
        Position {
            id: Uuid::new_v4(),
            subscriber_id: Uuid::new_v4(),
            instrument: Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour),
            side,
            entry_price: entry,
            stop_loss: sl,
            take_profit: tp,
            size: dec!(1.0),
            opened_at: Utc::now(),
            status: PositionStatus::Open,
            exit_price: None,
            closed_at: None,
            realized_pnl_pips: None,
            notes: None,
        }
    }

    #[test]
    fn long_pnl_pips_sl_trigger() {
        let p = position(Side::Long, dec!(1.1000), dec!(1.0980), dec!(1.1040));
        let pnl = p.pnl_pips(dec!(1.0980), Pair::from_str("EUR/USD").unwrap().pip_size());
        assert_eq!(pnl, dec!(-20.0));
    }

    #[test]
    fn short_pnl_pips_jpy() {
        let p = position(Side::Short, dec!(150.00), dec!(150.30), dec!(149.40));
        let pip_size = Pair::from_str("USD/JPY").unwrap().pip_size();
        let pnl = p.pnl_pips(dec!(149.925), pip_size);
        assert_eq!(pnl, dec!(7.5));
    }

    #[test]
    fn terminal_status_detection() {
        assert!(PositionStatus::ClosedSl.is_terminal());
        assert!(!PositionStatus::Open.is_terminal());
    }
}
