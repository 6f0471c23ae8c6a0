use super::env_or_default;
use std::time::Duration;

/// Upstream quote-provider connection and rate-budget settings.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub call_timeout: Duration,
    pub token_bucket_capacity: u32,
    pub wait_budget: Duration,
}

impl UpstreamConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            base_url: std::env::var("UPSTREAM_BASE_URL")
                .unwrap_or_else(|_| "https://quotes.example.com".to_string()),
            api_key: std::env::var("UPSTREAM_API_KEY").ok(),
            call_timeout: Duration::from_millis(env_or_default("UPSTREAM_TIMEOUT_MS", 2000)),
            token_bucket_capacity: env_or_default("UPSTREAM_TOKEN_BUDGET", 800),
            wait_budget: Duration::from_millis(env_or_default("UPSTREAM_WAIT_BUDGET_MS", 500)),
        })
    }
}
