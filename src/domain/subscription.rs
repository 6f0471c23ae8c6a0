use super::types::{Action, Instrument};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriberKind {
    ChatDm,
    ChatChannel,
    Webhook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Conservative,
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    /// Wraps past midnight when `start > end` (e.g. 22:00–07:00).
    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            now >= self.start && now < self.end
        } else {
            now >= self.start || now < self.end
        }
    }
}

/// Per-subscriber notification preferences; defaults come from `NotificationConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    pub risk_level: RiskLevel,
    pub trading_style: Option<String>,
    pub min_confidence: f64,
    pub daily_cap: u32,
    pub cooldown_override: Option<chrono::Duration>,
    pub quiet_hours: Option<QuietHours>,
    /// Offset from UTC, in minutes, used to localize `quiet_hours`. Positive east of UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            risk_level: RiskLevel::Moderate,
            trading_style: None,
            min_confidence: 0.6,
            daily_cap: 20,
            cooldown_override: None,
            quiet_hours: None,
            utc_offset_minutes: 0,
        }
    }
}

/// A messaging-platform identity, created lazily on first interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub kind: SubscriberKind,
    pub platform_identity: String,
    pub preferences: Preferences,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub min_confidence: f64,
    pub allowed_actions: Vec<Action>,
    pub strong_only: bool,
}

impl Default for SubscriptionFilter {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            allowed_actions: vec![Action::Buy, Action::Sell, Action::Hold],
            strong_only: false,
        }
    }
}

/// Uniqueness: `(subscriber_id, instrument)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub instrument: Instrument,
    pub filter: SubscriptionFilter,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
