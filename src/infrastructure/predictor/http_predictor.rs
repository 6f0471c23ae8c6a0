use crate::domain::ports::Predictor;
use crate::domain::types::{Candle, Direction, Instrument, Prediction};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    pair: String,
    timeframe: String,
    candles: &'a [Candle],
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    direction: String,
    confidence: f64,
    stage1_prob: Option<f64>,
    stage2_prob: Option<f64>,
    model_version: Option<String>,
}

/// Stateless HTTP client to the remote ML predictor (PC). Typed request and
/// response, explicit timeout; no retries (the caller treats a timeout or
/// error as a fallback signal to the Technical Analyzer, not a transient
/// fault worth retrying).
pub struct HttpPredictorClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpPredictorClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url,
            timeout,
        }
    }
}

#[async_trait]
impl Predictor for HttpPredictorClient {
    async fn predict(&self, instrument: Instrument, candles: &[Candle]) -> anyhow::Result<Prediction> {
        let url = format!("{}/predict", self.base_url);
        let body = PredictRequest {
            pair: instrument.pair.to_string(),
            timeframe: instrument.timeframe.to_string(),
            candles,
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.client.post(&url).json(&body).send(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("predictor call timed out after {:?}", self.timeout))??
        .error_for_status()?;

        let parsed: PredictResponse = response.json().await?;
        let direction = match parsed.direction.to_lowercase().as_str() {
            "long" => Direction::Long,
            "short" => Direction::Short,
            _ => Direction::Neutral,
        };

        Ok(Prediction {
            instrument,
            direction,
            confidence: parsed.confidence,
            stage1_prob: parsed.stage1_prob,
            stage2_prob: parsed.stage2_prob,
            model_version: parsed.model_version,
        })
    }
}
