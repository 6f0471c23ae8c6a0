//! Pure indicator computation and the fixed-vote fallback direction, with no
//! I/O: everything here is a function of the candle series handed to it.

use crate::domain::types::{Candle, Direction};
use rust_decimal::prelude::ToPrimitive;
use ta::indicators::{
    AverageTrueRange, ExponentialMovingAverage, MovingAverageConvergenceDivergence as Macd,
    RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::{DataItem, Next};

/// Snapshot of indicator values at the close of the series, serialized into
/// `Signal::technical_snapshot`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndicatorSnapshot {
    pub rsi14: f64,
    pub sma20: f64,
    pub ema20: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub atr14: f64,
}

/// The TA fallback: a fixed three-vote rule over RSI/SMA/MACD (spec §4.2 step 2).
#[derive(Debug, Clone, Copy)]
pub struct FallbackDirection {
    pub direction: Direction,
    pub confidence: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum TechnicalAnalysisError {
    #[error("not enough candles for indicator warmup: have {have}, need {need}")]
    InsufficientData { have: usize, need: usize },
    #[error("indicator computation produced a non-finite value")]
    NonFinite,
}

const RSI_PERIOD: usize = 14;
const SMA_PERIOD: usize = 20;
const ATR_PERIOD: usize = 14;

/// Computes the full indicator snapshot over `candles` (ascending by timestamp),
/// evaluated at the close of the series.
pub fn compute_snapshot(candles: &[Candle]) -> Result<IndicatorSnapshot, TechnicalAnalysisError> {
    let need = candles[candles.len().saturating_sub(1)]
        .timeframe
        .warmup_candles(SMA_PERIOD.max(ATR_PERIOD));
    if candles.len() < need {
        return Err(TechnicalAnalysisError::InsufficientData {
            have: candles.len(),
            need,
        });
    }

    let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD).expect("valid RSI period");
    let mut sma = SimpleMovingAverage::new(SMA_PERIOD).expect("valid SMA period");
    let mut ema = ExponentialMovingAverage::new(SMA_PERIOD).expect("valid EMA period");
    let mut macd = Macd::new(12, 26, 9).expect("valid MACD periods");
    let mut atr = AverageTrueRange::new(ATR_PERIOD).expect("valid ATR period");

    let mut rsi_value = 50.0;
    let mut sma_value = 0.0;
    let mut ema_value = 0.0;
    let mut macd_value = 0.0;
    let mut macd_signal_value = 0.0;
    let mut atr_value = 0.0;

    for candle in candles {
        let Some(item) = to_data_item(candle) else {
            continue;
        };
        rsi_value = rsi.next(&item);
        sma_value = sma.next(&item);
        ema_value = ema.next(&item);
        let macd_output = macd.next(&item);
        macd_value = macd_output.macd;
        macd_signal_value = macd_output.signal;
        atr_value = atr.next(&item);
    }

    if [rsi_value, sma_value, ema_value, macd_value, atr_value]
        .iter()
        .any(|v| !v.is_finite())
    {
        return Err(TechnicalAnalysisError::NonFinite);
    }

    Ok(IndicatorSnapshot {
        rsi14: rsi_value,
        sma20: sma_value,
        ema20: ema_value,
        macd: macd_value,
        macd_signal: macd_signal_value,
        atr14: atr_value,
    })
}

/// Three independent votes — RSI extremes, close vs SMA20, MACD sign — majority wins.
pub fn fallback_direction(candles: &[Candle], snapshot: &IndicatorSnapshot) -> FallbackDirection {
    let close = candles.last().and_then(|c| c.close.to_f64()).unwrap_or(0.0);

    let rsi_vote = if snapshot.rsi14 < 30.0 {
        Direction::Long
    } else if snapshot.rsi14 > 70.0 {
        Direction::Short
    } else {
        Direction::Neutral
    };

    let sma_vote = if close > snapshot.sma20 {
        Direction::Long
    } else if close < snapshot.sma20 {
        Direction::Short
    } else {
        Direction::Neutral
    };

    let macd_vote = if snapshot.macd > 0.0 {
        Direction::Long
    } else if snapshot.macd < 0.0 {
        Direction::Short
    } else {
        Direction::Neutral
    };

    let votes = [rsi_vote, sma_vote, macd_vote];
    let long_votes = votes.iter().filter(|v| **v == Direction::Long).count();
    let short_votes = votes.iter().filter(|v| **v == Direction::Short).count();
    let neutral_votes = votes.iter().filter(|v| **v == Direction::Neutral).count();

    let (direction, max_votes) = [
        (Direction::Long, long_votes),
        (Direction::Short, short_votes),
        (Direction::Neutral, neutral_votes),
    ]
    .into_iter()
    .max_by_key(|(_, count)| *count)
    .unwrap_or((Direction::Neutral, 0));

    FallbackDirection {
        direction,
        confidence: max_votes as f64 / votes.len() as f64,
    }
}

fn to_data_item(candle: &Candle) -> Option<DataItem> {
    DataItem::builder()
        .open(candle.open.to_f64()?)
        .high(candle.high.to_f64()?)
        .low(candle.low.to_f64()?)
        .close(candle.close.to_f64()?)
        .volume(candle.volume.to_f64()?)
        .build()
        .ok()
}
