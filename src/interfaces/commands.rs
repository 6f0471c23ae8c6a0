//! Platform-agnostic command surface invoked by adapter layers (chat bots,
//! HTTP handlers) — spec §6.1. Every command validates against the domain
//! invariants in §3 and returns `Result<_, CoreError>` so both HTTP and chat
//! adapters render the same structured error envelope.

use crate::application::hybrid_provider::HybridHistoricalProvider;
use crate::application::position_monitor::PositionMonitor;
use crate::application::subscription_registry::SubscriptionRegistry;
use crate::domain::errors::CoreError;
use crate::domain::pip;
use crate::domain::position::{Position, PositionStatus, Side};
use crate::domain::repositories::{PositionRepository, SignalRepository};
use crate::domain::signal::Signal;
use crate::domain::subscription::{Preferences, Subscriber, SubscriberKind, Subscription, SubscriptionFilter};
use crate::domain::types::{Instrument, Pair, Timeframe};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// A `Position` enriched with live unrealized P&L for open positions (spec §6.1
/// `position.list`); closed positions carry `None` for all three fields.
#[derive(Debug, Clone, Serialize)]
pub struct PositionView {
    #[serde(flatten)]
    pub position: Position,
    pub current_price: Option<Decimal>,
    pub unrealized_pnl_pips: Option<Decimal>,
    pub unrealized_pnl_pct: Option<Decimal>,
}

/// `period` enumeration mapping to a default timeframe (spec §6.1); an
/// explicit `timeframe` argument always overrides it (spec §9, decision 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Intraday,
    Swing,
    Position,
    LongTerm,
}

impl Period {
    pub fn default_timeframe(&self) -> Timeframe {
        match self {
            Period::Intraday => Timeframe::FifteenMin,
            Period::Swing => Timeframe::OneHour,
            Period::Position => Timeframe::OneDay,
            Period::LongTerm => Timeframe::OneWeek,
        }
    }
}

impl FromStr for Period {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "intraday" => Ok(Period::Intraday),
            "swing" => Ok(Period::Swing),
            "position" => Ok(Period::Position),
            "longterm" | "long_term" => Ok(Period::LongTerm),
            other => Err(CoreError::Validation(format!("unknown period '{other}'"))),
        }
    }
}

/// Resolves `timeframe` overriding `period` overriding the default, per spec §9 decision 1.
pub fn resolve_timeframe(timeframe: Option<&str>, period: Option<&str>) -> Result<Timeframe, CoreError> {
    if let Some(tf) = timeframe {
        return Timeframe::from_str(tf).map_err(|e| CoreError::Validation(e.to_string()));
    }
    if let Some(p) = period {
        return Ok(Period::from_str(p)?.default_timeframe());
    }
    Ok(Timeframe::OneHour)
}

pub struct Commands {
    signals: Arc<dyn SignalRepository>,
    registry: Arc<SubscriptionRegistry>,
    positions: Arc<dyn PositionRepository>,
    position_monitor: Arc<PositionMonitor>,
    hhp: Arc<HybridHistoricalProvider>,
}

impl Commands {
    pub fn new(
        signals: Arc<dyn SignalRepository>,
        registry: Arc<SubscriptionRegistry>,
        positions: Arc<dyn PositionRepository>,
        position_monitor: Arc<PositionMonitor>,
        hhp: Arc<HybridHistoricalProvider>,
    ) -> Self {
        Self {
            signals,
            registry,
            positions,
            position_monitor,
            hhp,
        }
    }

    pub async fn signal(&self, pair: &str, timeframe: Option<&str>, period: Option<&str>) -> Result<Signal, CoreError> {
        let pair = parse_pair(pair)?;
        let timeframe = resolve_timeframe(timeframe, period)?;
        let instrument = Instrument::new(pair, timeframe);

        self.signals
            .latest(instrument)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?
            .ok_or(CoreError::NotFound {
                entity: "signal",
                id: instrument.to_string(),
            })
    }

    pub async fn subscribe(
        &self,
        subscriber_id: Uuid,
        pair: &str,
        timeframe: Option<&str>,
        filter: Option<SubscriptionFilter>,
    ) -> Result<Uuid, CoreError> {
        let pair = parse_pair(pair)?;
        let timeframe = timeframe
            .map(Timeframe::from_str)
            .transpose()
            .map_err(|e| CoreError::Validation(e.to_string()))?
            .unwrap_or(Timeframe::OneHour);
        let instrument = Instrument::new(pair, timeframe);

        self.registry
            .subscribe(subscriber_id, instrument, filter)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    pub async fn unsubscribe(&self, subscriber_id: Uuid, pair: Option<&str>) -> Result<u64, CoreError> {
        let instrument = pair
            .map(|p| parse_pair(p).map(|pair| Instrument::new(pair, Timeframe::OneHour)))
            .transpose()?;

        self.registry
            .unsubscribe(subscriber_id, instrument)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    pub async fn unsubscribe_by_id(&self, subscription_id: Uuid) -> Result<bool, CoreError> {
        self.registry
            .unsubscribe_by_id(subscription_id)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    pub async fn subscriptions(&self, subscriber_id: Uuid) -> Result<Vec<Subscription>, CoreError> {
        self.registry
            .list(subscriber_id)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    pub async fn preferences(&self, subscriber_id: Uuid, preferences: Preferences) -> Result<Subscriber, CoreError> {
        self.registry
            .update_preferences(subscriber_id, preferences)
            .await
            .map_err(|e| CoreError::NotFound {
                entity: "subscriber",
                id: subscriber_id.to_string(),
            })
    }

    pub async fn ensure_subscriber(&self, kind: SubscriberKind, platform_identity: &str) -> Result<Subscriber, CoreError> {
        self.registry
            .ensure_subscriber(kind, platform_identity)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    pub async fn position_list(&self, subscriber_id: Uuid, pair: Option<&str>) -> Result<Vec<PositionView>, CoreError> {
        let positions = self
            .positions
            .list_for_subscriber(subscriber_id, pair)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;

        let mut views = Vec::with_capacity(positions.len());
        for position in positions {
            if !position.is_open() {
                views.push(PositionView {
                    position,
                    current_price: None,
                    unrealized_pnl_pips: None,
                    unrealized_pnl_pct: None,
                });
                continue;
            }

            let price = self
                .hhp
                .get_recent(position.instrument, 1)
                .await
                .ok()
                .and_then(|result| result.candles.last().map(|c| c.close));

            let (unrealized_pnl_pips, unrealized_pnl_pct) = match price {
                Some(price) => (
                    Some(position.pnl_pips(price, position.instrument.pair.pip_size())),
                    Some(pip::pnl_pct(position.side, position.entry_price, price)),
                ),
                None => (None, None),
            };

            views.push(PositionView {
                position,
                current_price: price,
                unrealized_pnl_pips,
                unrealized_pnl_pct,
            });
        }
        Ok(views)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn position_open(
        &self,
        subscriber_id: Uuid,
        pair: &str,
        timeframe: Option<&str>,
        side: Side,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        size: Decimal,
        notes: Option<String>,
    ) -> Result<Position, CoreError> {
        let pair = parse_pair(pair)?;
        let timeframe = timeframe
            .map(Timeframe::from_str)
            .transpose()
            .map_err(|e| CoreError::Validation(e.to_string()))?
            .unwrap_or(Timeframe::OneHour);
        let instrument = Instrument::new(pair, timeframe);

        let position = Position {
            id: Uuid::new_v4(),
            subscriber_id,
            instrument,
            side,
            entry_price,
            stop_loss,
            take_profit,
            size,
            opened_at: chrono::Utc::now(),
            status: PositionStatus::Open,
            exit_price: None,
            closed_at: None,
            realized_pnl_pips: None,
            notes,
        };
        if !position.has_valid_levels() {
            return Err(CoreError::Validation(
                "stop_loss/take_profit do not bracket entry_price for the given side".into(),
            ));
        }

        self.positions
            .save(&position)
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        Ok(position)
    }

    pub async fn position_close(
        &self,
        position_id: Uuid,
        exit_price: Decimal,
        pct: Option<Decimal>,
        notes: Option<String>,
    ) -> Result<Position, CoreError> {
        match pct {
            Some(pct) if pct < Decimal::from(100) => self
                .position_monitor
                .close_partial(position_id, pct, exit_price)
                .await
                .map_err(|e| CoreError::Conflict(e.to_string())),
            _ => self
                .position_monitor
                .close_manual(position_id, exit_price, notes)
                .await
                .map_err(|e| CoreError::Conflict(e.to_string())),
        }
    }
}

fn parse_pair(s: &str) -> Result<Pair, CoreError> {
    Pair::from_str(s).map_err(|e| CoreError::Validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_timeframe_overrides_period() {
        let tf = resolve_timeframe(Some("1d"), Some("intraday")).unwrap();
        assert_eq!(tf, Timeframe::OneDay);
    }

    #[test]
    fn period_maps_to_default_timeframe_when_timeframe_absent() {
        let tf = resolve_timeframe(None, Some("swing")).unwrap();
        assert_eq!(tf, Timeframe::OneHour);
    }

    #[test]
    fn neither_present_falls_back_to_one_hour() {
        let tf = resolve_timeframe(None, None).unwrap();
        assert_eq!(tf, Timeframe::OneHour);
    }

    #[test]
    fn unknown_period_is_validation_error() {
        assert!(resolve_timeframe(None, Some("bogus")).is_err());
    }
}
