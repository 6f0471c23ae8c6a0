use crate::domain::errors::CoreError;
use crate::domain::position::Side;
use crate::interfaces::http::auth::Identity;
use crate::interfaces::http::response::{created, ok, ApiError, ApiResult};
use crate::interfaces::http::AppState;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct OpenPositionRequest {
    subscriber_id: Uuid,
    pair: String,
    timeframe: Option<String>,
    side: Side,
    entry_price: Decimal,
    stop_loss: Decimal,
    take_profit: Decimal,
    size: Decimal,
    notes: Option<String>,
}

pub async fn open(State(state): State<AppState>, _identity: Identity, Json(req): Json<OpenPositionRequest>) -> ApiResult<Response> {
    let position = state
        .commands
        .position_open(
            req.subscriber_id,
            &req.pair,
            req.timeframe.as_deref(),
            req.side,
            req.entry_price,
            req.stop_loss,
            req.take_profit,
            req.size,
            req.notes,
        )
        .await?;
    Ok(created(position))
}

#[derive(Debug, Deserialize)]
pub struct ClosePositionRequest {
    position_id: Uuid,
    exit_price: Decimal,
    pct: Option<Decimal>,
    notes: Option<String>,
}

pub async fn close(State(state): State<AppState>, _identity: Identity, Json(req): Json<ClosePositionRequest>) -> ApiResult<Response> {
    let position = state
        .commands
        .position_close(req.position_id, req.exit_price, req.pct, req.notes)
        .await?;
    Ok(ok(position))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "op")]
pub enum AdjustPositionRequest {
    MoveSl { new_sl: Decimal },
    MoveTp { new_tp: Decimal },
}

pub async fn adjust(
    State(state): State<AppState>,
    _identity: Identity,
    Path(id): Path<Uuid>,
    Json(req): Json<AdjustPositionRequest>,
) -> ApiResult<Response> {
    let position = match req {
        AdjustPositionRequest::MoveSl { new_sl } => state.position_monitor.move_sl(id, new_sl).await,
        AdjustPositionRequest::MoveTp { new_tp } => state.position_monitor.move_tp(id, new_tp).await,
    }
    .map_err(|e| ApiError(CoreError::Conflict(e.to_string())))?;
    Ok(ok(position))
}

pub async fn get_one(State(state): State<AppState>, _identity: Identity, Path(id): Path<Uuid>) -> ApiResult<Response> {
    let position = state
        .positions
        .find_by_id(id)
        .await
        .map_err(|e| ApiError(CoreError::Internal(e.to_string())))?
        .ok_or(ApiError(CoreError::NotFound {
            entity: "position",
            id: id.to_string(),
        }))?;
    Ok(ok(position))
}

#[derive(Debug, Deserialize)]
pub struct ListPositionsQuery {
    pair: Option<String>,
}

pub async fn list_for_user(
    State(state): State<AppState>,
    _identity: Identity,
    Path(subscriber_id): Path<Uuid>,
    axum::extract::Query(query): axum::extract::Query<ListPositionsQuery>,
) -> ApiResult<Response> {
    let positions = state.commands.position_list(subscriber_id, query.pair.as_deref()).await?;
    Ok(ok(positions))
}
