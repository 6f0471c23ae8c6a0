use super::env_or_default;
use std::time::Duration;

/// Validated scheduler timing, mirroring the two independent tick drivers of §4.5.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub tick_signal: Duration,
    pub tick_position: Duration,
    pub worker_pool_size: usize,
    pub work_item_timeout_factor: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerConfigError {
    #[error("worker_pool_size must be >= 1, got {0}")]
    InvalidPoolSize(usize),
    #[error("work_item_timeout_factor must be in (0, 1], got {0}")]
    InvalidTimeoutFactor(f64),
}

impl SchedulerConfig {
    pub fn new(
        tick_signal: Duration,
        tick_position: Duration,
        worker_pool_size: usize,
        work_item_timeout_factor: f64,
    ) -> Result<Self, SchedulerConfigError> {
        if worker_pool_size == 0 {
            return Err(SchedulerConfigError::InvalidPoolSize(worker_pool_size));
        }
        if !(0.0..=1.0).contains(&work_item_timeout_factor) || work_item_timeout_factor <= 0.0 {
            return Err(SchedulerConfigError::InvalidTimeoutFactor(work_item_timeout_factor));
        }
        Ok(Self {
            tick_signal,
            tick_position,
            worker_pool_size,
            work_item_timeout_factor,
        })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let tick_signal_secs: u64 = env_or_default("TICK_SIGNAL_SECS", 15 * 60);
        let tick_position_secs: u64 = env_or_default("TICK_POSITION_SECS", 60);
        let worker_pool_size: usize = env_or_default("SCHEDULER_WORKER_POOL_SIZE", 4);
        let work_item_timeout_factor: f64 = env_or_default("SCHEDULER_TIMEOUT_FACTOR", 0.5);

        Ok(Self::new(
            Duration::from_secs(tick_signal_secs),
            Duration::from_secs(tick_position_secs),
            worker_pool_size,
            work_item_timeout_factor,
        )?)
    }

    pub fn work_item_timeout(&self, tick: Duration) -> Duration {
        tick.mul_f64(self.work_item_timeout_factor)
    }
}
