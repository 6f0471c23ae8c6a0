use crate::application::hybrid_provider::HybridHistoricalProvider;
use crate::domain::ports::NotificationPublisher;
use crate::domain::position::{Position, PositionClosed, PositionMonitoringSample, PositionStatus, Side};
use crate::domain::repositories::PositionRepository;
use crate::domain::types::Instrument;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Tracks open positions, updates unrealized P&L, and fires SL/TP trigger
/// events (spec §4.6). Per-position operations — including adjustments
/// issued externally — serialize through a per-position mutex rather than a
/// global lock (spec §9), matching the teacher's per-symbol isolation idiom.
pub struct PositionMonitor {
    positions: Arc<dyn PositionRepository>,
    hhp: Arc<HybridHistoricalProvider>,
    publisher: Arc<dyn NotificationPublisher>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl PositionMonitor {
    pub fn new(
        positions: Arc<dyn PositionRepository>,
        hhp: Arc<HybridHistoricalProvider>,
        publisher: Arc<dyn NotificationPublisher>,
    ) -> Self {
        Self {
            positions,
            hhp,
            publisher,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, position_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(position_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// One pass over all open positions, run by the scheduler's 60 s tick.
    pub async fn tick(&self) -> anyhow::Result<()> {
        let open_positions = self.positions.list_open().await?;
        for position in open_positions {
            if let Err(e) = self.observe_one(position.id).await {
                warn!(position_id = %position.id, error = %e, "position monitor observation failed");
            }
        }
        Ok(())
    }

    async fn observe_one(&self, position_id: Uuid) -> anyhow::Result<()> {
        let guard = self.lock_for(position_id).await;
        let _held = guard.lock().await;

        let Some(mut position) = self.positions.find_by_id(position_id).await? else {
            return Ok(());
        };
        if !position.is_open() {
            return Ok(());
        }

        let instrument = position.instrument;
        let historical = self.hhp.get_recent(instrument, 1).await?;
        let Some(candle) = historical.candles.into_iter().last() else {
            warn!(%instrument, "PM: no candle available for open position");
            return Ok(());
        };

        let price = candle.close;
        let pip_size = instrument.pair.pip_size();
        let unrealized_pnl_pips = position.pnl_pips(price, pip_size);
        let unrealized_pnl_pct = unrealized_pnl_pct(&position, price);

        let prior_sample = self.positions.list_samples(position_id).await?.into_iter().last();
        let (high_watermark, low_watermark) = match prior_sample {
            Some(prior) => (
                prior.high_watermark.max(candle.high).max(price),
                prior.low_watermark.min(candle.low).min(price),
            ),
            None => (price.max(candle.high), price.min(candle.low)),
        };

        let sample = PositionMonitoringSample {
            position_id,
            observed_at: chrono::Utc::now(),
            current_price: price,
            unrealized_pnl_pips,
            unrealized_pnl_pct,
            high_watermark,
            low_watermark,
            sl_armed: true,
            tp_armed: true,
        };
        info!(position_id = %position_id, pnl_pips = %sample.unrealized_pnl_pips, "position monitoring sample");
        self.positions.save_sample(&sample).await?;

        if let Some((exit_price, status)) = detect_trigger(&position, candle.high, candle.low) {
            let pip_size = instrument.pair.pip_size();
            position.status = status;
            position.exit_price = Some(exit_price);
            position.closed_at = Some(chrono::Utc::now());
            position.realized_pnl_pips = Some(position.pnl_pips(exit_price, pip_size));
            self.positions.save(&position).await?;

            self.publisher
                .publish_position_closed(PositionClosed {
                    position_id,
                    subscriber_id: position.subscriber_id,
                    instrument,
                    status,
                    exit_price,
                    realized_pnl_pips: position.realized_pnl_pips.unwrap_or(Decimal::ZERO),
                    closed_at: position.closed_at.unwrap_or_else(chrono::Utc::now),
                })
                .await?;
        }

        Ok(())
    }

    /// External adjustment: move the stop loss, re-checking SL/TP ordering.
    pub async fn move_sl(&self, position_id: Uuid, new_sl: Decimal) -> anyhow::Result<Position> {
        let guard = self.lock_for(position_id).await;
        let _held = guard.lock().await;
        self.apply_adjustment(position_id, |p| p.stop_loss = new_sl).await
    }

    pub async fn move_tp(&self, position_id: Uuid, new_tp: Decimal) -> anyhow::Result<Position> {
        let guard = self.lock_for(position_id).await;
        let _held = guard.lock().await;
        self.apply_adjustment(position_id, |p| p.take_profit = new_tp).await
    }

    pub async fn close_partial(&self, position_id: Uuid, pct: Decimal, exit_price: Decimal) -> anyhow::Result<Position> {
        let guard = self.lock_for(position_id).await;
        let _held = guard.lock().await;

        let Some(mut position) = self.positions.find_by_id(position_id).await? else {
            anyhow::bail!("position not found");
        };
        if !position.is_open() {
            anyhow::bail!("position already closed");
        }
        let reduction = position.size * (pct / Decimal::from(100));
        position.size -= reduction;
        if position.size <= Decimal::ZERO {
            let pip_size = position.instrument.pair.pip_size();
            position.status = PositionStatus::ClosedManual;
            position.exit_price = Some(exit_price);
            position.closed_at = Some(chrono::Utc::now());
            position.realized_pnl_pips = Some(position.pnl_pips(exit_price, pip_size));
        }
        self.positions.save(&position).await?;
        Ok(position)
    }

    pub async fn close_manual(&self, position_id: Uuid, exit_price: Decimal, notes: Option<String>) -> anyhow::Result<Position> {
        let guard = self.lock_for(position_id).await;
        let _held = guard.lock().await;

        let Some(mut position) = self.positions.find_by_id(position_id).await? else {
            anyhow::bail!("position not found");
        };
        if !position.is_open() {
            anyhow::bail!("position already closed");
        }
        let pip_size = position.instrument.pair.pip_size();
        position.status = PositionStatus::ClosedManual;
        position.exit_price = Some(exit_price);
        position.closed_at = Some(chrono::Utc::now());
        position.realized_pnl_pips = Some(position.pnl_pips(exit_price, pip_size));
        position.notes = notes.or(position.notes);
        self.positions.save(&position).await?;
        Ok(position)
    }

    async fn apply_adjustment(
        &self,
        position_id: Uuid,
        mutate: impl FnOnce(&mut Position),
    ) -> anyhow::Result<Position> {
        let Some(mut position) = self.positions.find_by_id(position_id).await? else {
            anyhow::bail!("position not found");
        };
        if !position.is_open() {
            anyhow::bail!("cannot adjust a closed position");
        }
        mutate(&mut position);
        if !position.has_valid_levels() {
            anyhow::bail!("adjustment violates SL/TP ordering invariant");
        }
        self.positions.save(&position).await?;
        Ok(position)
    }
}

fn unrealized_pnl_pct(position: &Position, price: Decimal) -> Decimal {
    if position.entry_price.is_zero() {
        return Decimal::ZERO;
    }
    let diff = match position.side {
        Side::Long => price - position.entry_price,
        Side::Short => position.entry_price - price,
    };
    diff / position.entry_price * Decimal::from(100)
}

/// Uses the just-fetched candle's high/low, not only its close (spec §4.6 step 4).
fn detect_trigger(position: &Position, high: Decimal, low: Decimal) -> Option<(Decimal, PositionStatus)> {
    match position.side {
        Side::Long => {
            if low <= position.stop_loss {
                Some((position.stop_loss, PositionStatus::ClosedSl))
            } else if high >= position.take_profit {
                Some((position.take_profit, PositionStatus::ClosedTp))
            } else {
                None
            }
        }
        Side::Short => {
            if high >= position.stop_loss {
                Some((position.stop_loss, PositionStatus::ClosedSl))
            } else if low <= position.take_profit {
                Some((position.take_profit, PositionStatus::ClosedTp))
            } else {
                None
            }
        }
    }
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
            opened_at: chrono::Utc::now(),
            status: PositionStatus::Open,
            exit_price: None,
            closed_at: None,
            realized_pnl_pips: None,
            notes: None,
        }
    }

    #[test]
    fn long_stop_loss_trigger_uses_candle_low() {
        let p = position(Side::Long, dec!(1.1000), dec!(1.0980), dec!(1.1040));
        let trigger = detect_trigger(&p, dec!(1.1005), dec!(1.0975));
        assert_eq!(trigger, Some((dec!(1.0980), PositionStatus::ClosedSl)));
    }

    #[test]
    fn short_not_triggered_within_band() {
        let p = position(Side::Short, dec!(150.00), dec!(150.30), dec!(149.40));
        let trigger = detect_trigger(&p, dec!(150.10), dec!(149.85));
        assert_eq!(trigger, None);
    }

    #[test]
    fn long_take_profit_trigger_uses_candle_high() {
        let p = position(Side::Long, dec!(1.1000), dec!(1.0980), dec!(1.1040));
        let trigger = detect_trigger(&p, dec!(1.1045), dec!(1.0995));
        assert_eq!(trigger, Some((dec!(1.1040), PositionStatus::ClosedTp)));
    }
}
