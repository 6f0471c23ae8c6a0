use crate::domain::errors::CoreError;
use crate::domain::types::{Candle, Instrument, Pair, Timeframe};
use crate::interfaces::http::auth::Identity;
use crate::interfaces::http::response::{created, ok, ApiError, ApiResult};
use crate::interfaces::http::AppState;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;

fn parse_instrument(pair: &str, timeframe: Option<&str>) -> Result<Instrument, ApiError> {
    let pair = Pair::from_str(pair).map_err(|e| ApiError(CoreError::Validation(e.to_string())))?;
    let timeframe = timeframe
        .map(Timeframe::from_str)
        .transpose()
        .map_err(|e| ApiError(CoreError::Validation(e.to_string())))?
        .unwrap_or(Timeframe::OneHour);
    Ok(Instrument::new(pair, timeframe))
}

#[derive(Debug, Deserialize)]
pub struct TimeframeQuery {
    timeframe: Option<String>,
}

pub async fn realtime(
    State(state): State<AppState>,
    _identity: Identity,
    Path(pair): Path<String>,
    Query(query): Query<TimeframeQuery>,
) -> ApiResult<Response> {
    let instrument = parse_instrument(&pair, query.timeframe.as_deref())?;
    let result = state
        .hhp
        .get_recent(instrument, 1)
        .await
        .map_err(|e| ApiError(CoreError::Upstream(e.to_string())))?;

    match result.candles.last() {
        Some(candle) => Ok(ok(candle)),
        None => Err(ApiError(CoreError::NotFound {
            entity: "candle",
            id: instrument.to_string(),
        })),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    timeframe: Option<String>,
    #[serde(default = "default_history_count")]
    count: usize,
}

fn default_history_count() -> usize {
    100
}

pub async fn history(
    State(state): State<AppState>,
    _identity: Identity,
    Path(pair): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Response> {
    let instrument = parse_instrument(&pair, query.timeframe.as_deref())?;
    let result = state
        .hhp
        .get_recent(instrument, query.count)
        .await
        .map_err(|e| ApiError(CoreError::Upstream(e.to_string())))?;
    Ok(ok(result.candles))
}

#[derive(Debug, Deserialize)]
pub struct BulkIngestRequest {
    candles: Vec<Candle>,
}

/// Accepts externally-sourced candles for backfilling gaps, validating each
/// through the same OHLC invariant the Data Collector enforces (spec §4.8).
/// Internal only: requires the static API key, not a subscriber's bearer JWT.
pub async fn bulk_ingest(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<BulkIngestRequest>,
) -> ApiResult<Response> {
    if !matches!(identity, Identity::ApiKey) {
        return Err(ApiError(CoreError::Forbidden(
            "bulk candle ingestion requires API-key authentication".into(),
        )));
    }

    let mut upserted = 0usize;
    let mut rejected = 0usize;
    let grouped = req.candles;
    let mut by_instrument: std::collections::HashMap<Instrument, Vec<Candle>> = std::collections::HashMap::new();
    for candle in grouped {
        if candle.is_valid() {
            by_instrument.entry(candle.instrument()).or_default().push(candle);
        } else {
            rejected += 1;
        }
    }

    for (_, batch) in by_instrument {
        let count = state
            .data_collector
            .ingest_batch(&batch)
            .await
            .map_err(|e| ApiError(CoreError::Internal(e.to_string())))?;
        upserted += count;
    }

    Ok(created(serde_json::json!({ "upserted": upserted, "rejected": rejected })))
}
