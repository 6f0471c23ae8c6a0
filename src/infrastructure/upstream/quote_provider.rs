use crate::domain::ports::UpstreamQuoteProvider;
use crate::domain::types::{Candle, Instrument, Pair};
use crate::infrastructure::core::http_client_factory::{HttpClientFactory, build_url_with_query};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

/// Adapter over a remote quote provider's REST API. Rate-limiting is applied
/// by the caller (the token bucket shared with the Data Collector); this
/// client only concerns itself with transport and response parsing.
pub struct HttpQuoteProvider {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: Option<String>,
}

impl HttpQuoteProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            base_url,
            api_key,
        }
    }

    fn auth_header(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("X-API-Key", key),
            None => req,
        }
    }

    async fn fetch_candles(
        &self,
        instrument: Instrument,
        params: &[(&str, String)],
    ) -> anyhow::Result<Vec<Candle>> {
        let url = build_url_with_query(
            &format!("{}/candles/{}", self.base_url, instrument.pair),
            params,
        );

        let req = self.client.get(&url);
        let req = self.auth_header(req);
        let response = req.send().await?.error_for_status()?;
        let body: serde_json::Value = response.json().await?;

        let rows = body
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("unexpected response shape from upstream"))?;

        let candles: Vec<Candle> = rows
            .iter()
            .filter_map(|row| parse_candle_row(row, instrument))
            .collect();

        Ok(candles)
    }
}

/// Parses one candle row `[timestamp_ms, open, high, low, close, volume]`,
/// degrading gracefully (drop + log) on malformed entries rather than
/// failing the whole batch.
fn parse_candle_row(row: &serde_json::Value, instrument: Instrument) -> Option<Candle> {
    let arr = row.as_array()?;
    if arr.len() < 6 {
        warn!("upstream candle row too short, dropping: {row:?}");
        return None;
    }
    let ts_ms = arr[0].as_i64()?;
    let timestamp = Utc.timestamp_millis_opt(ts_ms).single()?;

    let parse_dec = |v: &serde_json::Value| -> Option<Decimal> {
        v.as_str()
            .and_then(|s| Decimal::from_str(s).ok())
            .or_else(|| v.as_f64().and_then(Decimal::from_f64_retain))
    };

    let open = parse_dec(&arr[1])?;
    let high = parse_dec(&arr[2])?;
    let low = parse_dec(&arr[3])?;
    let close = parse_dec(&arr[4])?;
    let volume = parse_dec(&arr[5])?;

    Some(Candle {
        pair: instrument.pair,
        timeframe: instrument.timeframe,
        timestamp,
        open,
        high,
        low,
        close,
        volume,
        source: "upstream".to_string(),
    })
}

#[async_trait]
impl UpstreamQuoteProvider for HttpQuoteProvider {
    async fn latest_candle(&self, instrument: Instrument) -> anyhow::Result<Candle> {
        let params = [("limit", "1".to_string())];
        let mut candles = self.fetch_candles(instrument, &params).await?;
        candles
            .pop()
            .ok_or_else(|| anyhow::anyhow!("upstream returned no candles for {instrument}"))
    }

    async fn historical_candles(
        &self,
        instrument: Instrument,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Candle>> {
        let params = [
            ("start", start.timestamp_millis().to_string()),
            ("end", end.timestamp_millis().to_string()),
            ("limit", "1000".to_string()),
        ];
        self.fetch_candles(instrument, &params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Timeframe;

    #[test]
    fn parses_well_formed_row() {
        let instrument = Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour);
        let row = serde_json::json!([1_700_000_000_000i64, "1.1000", "1.1050", "1.0950", "1.1020", "1000"]);
        let candle = parse_candle_row(&row, instrument).unwrap();
        assert!(candle.is_valid());
    }

    #[test]
    fn drops_malformed_row() {
        let instrument = Instrument::new(Pair::from_str("EUR/USD").unwrap(), Timeframe::OneHour);
        let row = serde_json::json!([1_700_000_000_000i64, "not-a-number"]);
        assert!(parse_candle_row(&row, instrument).is_none());
    }
}
