use thiserror::Error;

/// Language-neutral error kinds surfaced across command and HTTP boundaries.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("stale data: {0}")]
    Stale(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable code carried in the HTTP response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation_error",
            CoreError::NotFound { .. } => "not_found",
            CoreError::Unauthorized => "unauthorized",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::Conflict(_) => "conflict",
            CoreError::RateLimited { .. } => "rate_limited",
            CoreError::Upstream(_) => "upstream",
            CoreError::Stale(_) => "stale",
            CoreError::Internal(_) => "internal",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            CoreError::NotFound { .. } => 404,
            CoreError::Unauthorized => 401,
            CoreError::Forbidden(_) => 403,
            CoreError::Conflict(_) => 409,
            CoreError::RateLimited { .. } => 429,
            CoreError::Upstream(_) | CoreError::Stale(_) => 200,
            CoreError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_includes_id() {
        let err = CoreError::NotFound {
            entity: "position",
            id: "abc-123".into(),
        };
        assert!(err.to_string().contains("abc-123"));
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let err = CoreError::RateLimited {
            retry_after_secs: 30,
        };
        assert!(err.to_string().contains("30"));
        assert_eq!(err.http_status(), 429);
    }
}
