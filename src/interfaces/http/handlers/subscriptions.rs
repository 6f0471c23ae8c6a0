use crate::domain::errors::CoreError;
use crate::domain::subscription::SubscriptionFilter;
use crate::interfaces::http::auth::Identity;
use crate::interfaces::http::response::{created, ok, ApiError, ApiResult};
use crate::interfaces::http::AppState;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    subscriber_id: Uuid,
    pair: String,
    timeframe: Option<String>,
    filter: Option<SubscriptionFilter>,
}

pub async fn create(State(state): State<AppState>, _identity: Identity, Json(req): Json<CreateSubscriptionRequest>) -> ApiResult<Response> {
    let id = state
        .commands
        .subscribe(req.subscriber_id, &req.pair, req.timeframe.as_deref(), req.filter)
        .await?;
    Ok(created(serde_json::json!({ "id": id })))
}

pub async fn remove(State(state): State<AppState>, _identity: Identity, Path(id): Path<Uuid>) -> ApiResult<Response> {
    let removed = state.commands.unsubscribe_by_id(id).await?;
    if !removed {
        return Err(ApiError(CoreError::NotFound {
            entity: "subscription",
            id: id.to_string(),
        }));
    }
    Ok(ok(serde_json::json!({ "removed": true })))
}

pub async fn list_for_user(State(state): State<AppState>, _identity: Identity, Path(subscriber_id): Path<Uuid>) -> ApiResult<Response> {
    let subscriptions = state.commands.subscriptions(subscriber_id).await?;
    Ok(ok(subscriptions))
}
