use super::Metrics;
use std::time::Duration;
use tracing::info;

/// Periodically logs a summary metrics line, mirroring the teacher's
/// push-based observability convention (`bin/server.rs`'s `METRICS_JSON:`
/// line) for environments without a scrape-capable Prometheus.
pub struct MetricsReporter {
    metrics: Metrics,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(metrics: Metrics, interval: Duration) -> Self {
        Self { metrics, interval }
    }

    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            match self.metrics.encode_text() {
                Ok(text) => info!(target: "metrics", "METRICS_REPORT:\n{text}"),
                Err(e) => tracing::warn!("failed to encode metrics: {e}"),
            }
        }
    }
}
