//! `{success, data|error, code, timestamp}` response envelope (spec §6.2),
//! shared by every handler so HTTP and chat adapters agree on error shape.

use crate::domain::errors::CoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct Envelope {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    timestamp: DateTime<Utc>,
}

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Envelope {
            success: false,
            data: None,
            error: Some(self.0.to_string()),
            code: Some(self.0.code()),
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn ok<T: Serialize>(data: T) -> Response {
    let body = Envelope {
        success: true,
        data: serde_json::to_value(data).ok(),
        error: None,
        code: None,
        timestamp: Utc::now(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

pub fn created<T: Serialize>(data: T) -> Response {
    let body = Envelope {
        success: true,
        data: serde_json::to_value(data).ok(),
        error: None,
        code: None,
        timestamp: Utc::now(),
    };
    (StatusCode::CREATED, Json(body)).into_response()
}

pub type ApiResult<T> = Result<T, ApiError>;
