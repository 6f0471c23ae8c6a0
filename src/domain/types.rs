use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A traded currency pair and a candle granularity, together identifying a data series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub pair: Pair,
    pub timeframe: Timeframe,
}

impl Instrument {
    pub fn new(pair: Pair, timeframe: Timeframe) -> Self {
        Self { pair, timeframe }
    }

    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.pair, self.timeframe)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pair, self.timeframe)
    }
}

/// A currency pair in `AAA/BBB` form, e.g. `EUR/USD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    base: [u8; 3],
    quote: [u8; 3],
}

impl Pair {
    pub fn new(base: &str, quote: &str) -> anyhow::Result<Self> {
        if base.len() != 3 || quote.len() != 3 {
            anyhow::bail!("currency codes must be 3 letters: {base}/{quote}");
        }
        let mut b = [0u8; 3];
        let mut q = [0u8; 3];
        b.copy_from_slice(base.to_ascii_uppercase().as_bytes());
        q.copy_from_slice(quote.to_ascii_uppercase().as_bytes());
        Ok(Self { base: b, quote: q })
    }

    pub fn base(&self) -> &str {
        std::str::from_utf8(&self.base).unwrap_or("???")
    }

    pub fn quote(&self) -> &str {
        std::str::from_utf8(&self.quote).unwrap_or("???")
    }

    /// JPY-quoted pairs use 0.01 pip size; everything else uses 0.0001.
    pub fn pip_size(&self) -> Decimal {
        if self.quote() == "JPY" {
            Decimal::new(1, 2)
        } else {
            Decimal::new(1, 4)
        }
    }
}

impl FromStr for Pair {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (base, quote) = s
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("invalid pair '{s}', expected AAA/BBB"))?;
        Pair::new(base, quote)
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base(), self.quote())
    }
}

/// Candle granularity. Extends the six intraday/daily buckets with weekly and monthly bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    OneMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    FourHour,
    OneDay,
    OneWeek,
    OneMonth,
}

impl Timeframe {
    pub fn to_minutes(&self) -> i64 {
        match self {
            Timeframe::OneMin => 1,
            Timeframe::FiveMin => 5,
            Timeframe::FifteenMin => 15,
            Timeframe::ThirtyMin => 30,
            Timeframe::OneHour => 60,
            Timeframe::FourHour => 240,
            Timeframe::OneDay => 1440,
            Timeframe::OneWeek => 1440 * 7,
            Timeframe::OneMonth => 1440 * 30,
        }
    }

    pub fn to_seconds(&self) -> i64 {
        self.to_minutes() * 60
    }

    pub fn to_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.to_seconds())
    }

    pub fn canonical_str(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1min",
            Timeframe::FiveMin => "5min",
            Timeframe::FifteenMin => "15min",
            Timeframe::ThirtyMin => "30min",
            Timeframe::OneHour => "1h",
            Timeframe::FourHour => "4h",
            Timeframe::OneDay => "1d",
            Timeframe::OneWeek => "1w",
            Timeframe::OneMonth => "1M",
        }
    }

    pub fn all() -> Vec<Timeframe> {
        vec![
            Timeframe::OneMin,
            Timeframe::FiveMin,
            Timeframe::FifteenMin,
            Timeframe::ThirtyMin,
            Timeframe::OneHour,
            Timeframe::FourHour,
            Timeframe::OneDay,
            Timeframe::OneWeek,
            Timeframe::OneMonth,
        ]
    }

    pub fn period_start(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let secs = timestamp.timestamp();
        let period = self.to_seconds();
        let start = secs - secs.rem_euclid(period);
        DateTime::from_timestamp(start, 0).unwrap_or(timestamp)
    }

    pub fn warmup_candles(&self, indicator_period: usize) -> usize {
        ((indicator_period as f64) * 1.1).ceil() as usize
    }

    /// `k_tf` multiplier table used by the Signal Generator for `expires_at`.
    pub fn expiry_multiplier(&self) -> i64 {
        match self {
            Timeframe::OneMin | Timeframe::FiveMin | Timeframe::FifteenMin => 4,
            Timeframe::ThirtyMin | Timeframe::OneHour => 4,
            Timeframe::FourHour => 3,
            Timeframe::OneDay => 3,
            Timeframe::OneWeek | Timeframe::OneMonth => 2,
        }
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "1min" | "1m" | "onemin" => Ok(Timeframe::OneMin),
            "5min" | "5m" | "fivemin" => Ok(Timeframe::FiveMin),
            "15min" | "15m" | "fifteenmin" => Ok(Timeframe::FifteenMin),
            "30min" | "30m" | "thirtymin" => Ok(Timeframe::ThirtyMin),
            "1h" | "1hour" | "onehour" => Ok(Timeframe::OneHour),
            "4h" | "4hour" | "fourhour" => Ok(Timeframe::FourHour),
            "1d" | "1day" | "oneday" => Ok(Timeframe::OneDay),
            "1w" | "1week" | "oneweek" => Ok(Timeframe::OneWeek),
            "1mo" | "1month" | "onemonth" => Ok(Timeframe::OneMonth),
            _ => Err(anyhow::anyhow!(
                "invalid timeframe '{s}', valid options: {}",
                Timeframe::all()
                    .iter()
                    .map(|t| t.canonical_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_str())
    }
}

/// An OHLCV bar for one timeframe slot, unique by `(pair, timeframe, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub pair: Pair,
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub source: String,
}

impl Candle {
    pub fn instrument(&self) -> Instrument {
        Instrument::new(self.pair, self.timeframe)
    }

    /// `low <= min(open,close) <= max(open,close) <= high`, `volume >= 0`.
    pub fn is_valid(&self) -> bool {
        let lo = self.open.min(self.close);
        let hi = self.open.max(self.close);
        self.low <= lo && lo <= hi && hi <= self.high && self.volume >= Decimal::ZERO
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

/// Ephemeral output of the remote ML predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub instrument: Instrument,
    pub direction: Direction,
    pub confidence: f64,
    pub stage1_prob: Option<f64>,
    pub stage2_prob: Option<f64>,
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn from_direction(direction: Direction) -> Self {
        match direction {
            Direction::Long => Action::Buy,
            Direction::Short => Action::Sell,
            Direction::Neutral => Action::Hold,
        }
    }

    /// Two actions are a reversal of one another iff they are buy and sell, in either order.
    pub fn is_reversal_of(&self, other: Action) -> bool {
        matches!(
            (self, other),
            (Action::Buy, Action::Sell) | (Action::Sell, Action::Buy)
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Hold => "hold",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl Strength {
    /// `very_strong >= 0.85 > strong >= 0.75 > moderate >= 0.60 > weak`.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.85 {
            Strength::VeryStrong
        } else if confidence >= 0.75 {
            Strength::Strong
        } else if confidence >= 0.60 {
            Strength::Moderate
        } else {
            Strength::Weak
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    Ml,
    Technical,
    Fused,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pip_size_jpy() {
        let pair = Pair::from_str("USD/JPY").unwrap();
        assert_eq!(pair.pip_size(), Decimal::new(1, 2));
    }

    #[test]
    fn pip_size_default() {
        let pair = Pair::from_str("EUR/USD").unwrap();
        assert_eq!(pair.pip_size(), Decimal::new(1, 4));
    }

    #[test]
    fn timeframe_round_trip() {
        for tf in Timeframe::all() {
            let s = tf.canonical_str();
            assert_eq!(Timeframe::from_str(s).unwrap(), tf);
        }
    }

    #[test]
    fn candle_validity() {
        let pair = Pair::from_str("EUR/USD").unwrap();
        let c = Candle {
            pair,
            timeframe: Timeframe::OneHour,
            timestamp: Utc::now(),
            open: Decimal::new(11000, 4),
            high: Decimal::new(11050, 4),
            low: Decimal::new(10950, 4),
            close: Decimal::new(11020, 4),
            volume: Decimal::ONE,
            source: "test".into(),
        };
        assert!(c.is_valid());
    }

    #[test]
    fn reversal_detection() {
        assert!(Action::Buy.is_reversal_of(Action::Sell));
        assert!(Action::Sell.is_reversal_of(Action::Buy));
        assert!(!Action::Buy.is_reversal_of(Action::Hold));
    }
}
