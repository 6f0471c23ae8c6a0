use super::env_or_default;
use std::time::Duration;

/// Remote ML predictor connection and the ML-acceptance confidence gate.
#[derive(Debug, Clone)]
pub struct PredictorConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub acceptance_threshold: f64,
}

impl PredictorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            base_url: std::env::var("PREDICTOR_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:9100".to_string()),
            timeout: Duration::from_millis(env_or_default("PREDICTOR_TIMEOUT_MS", 5000)),
            acceptance_threshold: env_or_default("PREDICTOR_ACCEPTANCE_THRESHOLD", 0.6),
        })
    }
}
