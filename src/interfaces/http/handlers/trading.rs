use crate::interfaces::http::auth::Identity;
use crate::interfaces::http::response::{ok, ApiError, ApiResult};
use crate::interfaces::http::AppState;
use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
pub struct SignalQuery {
    pair: String,
    timeframe: Option<String>,
    period: Option<String>,
}

pub async fn get_signal(
    State(state): State<AppState>,
    _identity: Identity,
    Query(query): Query<SignalQuery>,
) -> ApiResult<Response> {
    let signal = state
        .commands
        .signal(&query.pair, query.timeframe.as_deref(), query.period.as_deref())
        .await?;
    Ok(ok(signal))
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pair: String,
    timeframe: Option<String>,
}

/// `POST /trading/analyze` forces an on-demand signal generation pass rather
/// than reading the latest cached signal (spec §6.2 distinguishes the two).
pub async fn analyze(State(state): State<AppState>, _identity: Identity, Json(req): Json<AnalyzeRequest>) -> ApiResult<Response> {
    let pair = crate::domain::types::Pair::from_str(&req.pair)
        .map_err(|e| ApiError(crate::domain::errors::CoreError::Validation(e.to_string())))?;
    let timeframe = req
        .timeframe
        .as_deref()
        .map(crate::domain::types::Timeframe::from_str)
        .transpose()
        .map_err(|e| ApiError(crate::domain::errors::CoreError::Validation(e.to_string())))?
        .unwrap_or(crate::domain::types::Timeframe::OneHour);
    let instrument = crate::domain::types::Instrument::new(pair, timeframe);

    let signal = state
        .signal_generator
        .generate(instrument)
        .await
        .map_err(|e| ApiError(crate::domain::errors::CoreError::Internal(e.to_string())))?;

    match signal {
        Some(signal) => Ok(ok(signal)),
        None => Err(ApiError(crate::domain::errors::CoreError::NotFound {
            entity: "signal",
            id: instrument.to_string(),
        })),
    }
}
