use crate::error::AppError;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Header carrying the caller's address
pub const CALLER_HEADER: &str = "user-address";

const ANONYMOUS: &str = "anonymous";

/// Caller identity as reported by the client, for rate limiting and audit.
///
/// Not authenticated: every submission is signed by the gateway's own
/// identity regardless of who asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerAddress(pub String);

impl CallerAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for CallerAddress
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(header) = parts.headers.get(CALLER_HEADER) else {
            return Ok(CallerAddress(ANONYMOUS.to_string()));
        };

        let value = header
            .to_str()
            .map_err(|_| AppError::BadRequest(format!("Invalid {CALLER_HEADER} header")))?
            .trim();

        if value.is_empty() {
            return Ok(CallerAddress(ANONYMOUS.to_string()));
        }
        Ok(CallerAddress(value.to_string()))
    }
}
