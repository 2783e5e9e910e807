use crate::auth::CallerAddress;
use crate::error::AppError;
use crate::models::{ApiResponse, InfoResponse};
use crate::state::AppState;
use axum::{Json, extract::State};

/// Live rates and reserves with the signing identity
pub async fn get_info(
    State(state): State<AppState>,
    caller: CallerAddress,
) -> Result<Json<ApiResponse<InfoResponse>>, AppError> {
    state.rate_limiter.check(caller.as_str(), "info")?;

    let snapshot = state.orchestrator.snapshot().await?;

    Ok(Json(ApiResponse::ok(InfoResponse {
        snapshot,
        symbols: state.symbols().clone(),
    })))
}
