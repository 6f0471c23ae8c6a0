use super::env_or_default;
use std::time::Duration;

/// Uniform retry policy applied across all delivery adapters (spec §9: the source's
/// non-uniform retry strategy is replaced with a single prescribed policy).
#[derive(Debug, Clone, Copy)]
pub struct DeliveryConfig {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub per_attempt_timeout: Duration,
}

impl DeliveryConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            max_attempts: env_or_default("DELIVERY_MAX_ATTEMPTS", 3),
            backoff_base: Duration::from_secs(env_or_default("DELIVERY_BACKOFF_BASE_SECS", 1)),
            per_attempt_timeout: Duration::from_secs(env_or_default("DELIVERY_ATTEMPT_TIMEOUT_SECS", 5)),
        })
    }

    /// Exponential backoff: 1, 2, 4s for attempt indices 0, 1, 2.
    pub fn backoff_for_attempt(&self, attempt_index: u32) -> Duration {
        self.backoff_base * 2u32.pow(attempt_index)
    }
}
