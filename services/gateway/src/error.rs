use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use types::errors::ExchangeError;

/// Central error type for the Gateway application
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Exchange(err) => match err {
                ExchangeError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
                ExchangeError::InsufficientReserve { .. } | ExchangeError::InsufficientBalance { .. } => {
                    StatusCode::CONFLICT
                }
                ExchangeError::Reverted { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                ExchangeError::Allocation { .. } | ExchangeError::Query { .. } => StatusCode::SERVICE_UNAVAILABLE,
                // Outcome unknown; the caller must check the ledger before retrying
                ExchangeError::TransportFailed { .. } => StatusCode::GATEWAY_TIMEOUT,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
            AppError::Exchange(err) => err.code(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let mut error = json!({ "code": code, "message": self.to_string() });
        if let AppError::Exchange(err) = &self {
            error["outcome"] = json!(err.outcome());
            error["retrySafe"] = json!(err.is_retry_safe());
        }

        let body = Json(json!({
            "success": false,
            "error": error
        }));

        (status, body).into_response()
    }
}
