use super::signal::Signal;
use super::types::{Action, Instrument, Strength};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-instrument state owned by the Change Detector, created lazily at first observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentState {
    pub instrument: Instrument,
    pub last_signal: Option<Signal>,
    pub last_change_at: Option<DateTime<Utc>>,
}

impl InstrumentState {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            last_signal: None,
            last_change_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    First,
    ActionChange,
    Reversal,
    ConfidenceJump,
}

impl ChangeReason {
    /// Reversal is the only reason that bypasses the Delivery Filter's cooldown.
    pub fn bypasses_cooldown(&self) -> bool {
        matches!(self, ChangeReason::Reversal)
    }
}

/// Emitted by the Change Detector on a qualifying transition; consumed by the Notification Broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalChangeEvent {
    pub id: Uuid,
    pub instrument: Instrument,
    pub prior_action: Option<Action>,
    pub new_action: Action,
    pub prior_confidence: Option<f64>,
    pub new_confidence: f64,
    pub strength: Strength,
    pub reason: ChangeReason,
    pub generated_at: DateTime<Utc>,
    pub signal: Signal,
}
