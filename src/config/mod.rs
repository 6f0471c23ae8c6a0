mod delivery_config;
mod notification_config;
mod predictor_config;
mod scheduler_config;
mod upstream_config;

pub use delivery_config::DeliveryConfig;
pub use notification_config::NotificationConfig;
pub use predictor_config::PredictorConfig;
pub use scheduler_config::SchedulerConfig;
pub use upstream_config::UpstreamConfig;

use anyhow::Context;

/// Top-level configuration assembled from sub-config loaders, each validated at
/// construction. Mirrors the composition used throughout the sub-configs below.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub http_bind_addr: String,
    pub jwt_secret: String,
    pub api_key: Option<String>,
    pub scheduler: SchedulerConfig,
    pub upstream: UpstreamConfig,
    pub predictor: PredictorConfig,
    pub notification: NotificationConfig,
    pub delivery: DeliveryConfig,
    pub observability_enabled: bool,
    pub metrics_bind_addr: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/signal_core.db".to_string()),
            http_bind_addr: std::env::var("HTTP_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string()),
            api_key: std::env::var("API_KEY").ok(),
            scheduler: SchedulerConfig::from_env().context("loading scheduler config")?,
            upstream: UpstreamConfig::from_env().context("loading upstream config")?,
            predictor: PredictorConfig::from_env().context("loading predictor config")?,
            notification: NotificationConfig::from_env().context("loading notification config")?,
            delivery: DeliveryConfig::from_env().context("loading delivery config")?,
            observability_enabled: std::env::var("OBSERVABILITY_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            metrics_bind_addr: std::env::var("METRICS_BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:9090".to_string()),
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) use env_or as env_or_default;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_env_defaults() {
        // SAFETY: test-only env mutation, no concurrent access in this process during the test.
        unsafe {
            std::env::remove_var("DATABASE_URL");
            std::env::remove_var("HTTP_BIND_ADDR");
        }
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.database_url, "sqlite://data/signal_core.db");
        assert_eq!(cfg.scheduler.tick_signal, std::time::Duration::from_secs(15 * 60));
    }
}
