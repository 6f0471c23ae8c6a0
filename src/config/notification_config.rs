use super::env_or_default;
use chrono::Duration as ChronoDuration;

/// Delivery Filter / Change Detector tunables (spec §9 flags these as configuration).
#[derive(Debug, Clone, Copy)]
pub struct NotificationConfig {
    pub default_cooldown: ChronoDuration,
    pub default_daily_cap: u32,
    pub confidence_jump_threshold: f64,
}

impl NotificationConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let cooldown_mins: i64 = env_or_default("NOTIFICATION_COOLDOWN_MINS", 30);
        Ok(Self {
            default_cooldown: ChronoDuration::minutes(cooldown_mins),
            default_daily_cap: env_or_default("NOTIFICATION_DAILY_CAP", 20),
            confidence_jump_threshold: env_or_default("NOTIFICATION_CONFIDENCE_JUMP", 0.15),
        })
    }
}
