use crate::auth::CallerAddress;
use crate::error::AppError;
use crate::models::{AmountBody, AmountInput, ApiResponse, ExchangeBody, QuoteParams};
use crate::state::AppState;
use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use rust_decimal::Decimal;
use sequencer::ExchangeRequest;
use types::exchange::{Direction, ExchangeQuote, ExchangeReceipt};

type ExchangeResponse = Result<Json<ApiResponse<ExchangeReceipt>>, AppError>;

/// Syntactic check only: present, non-empty, and a decimal number.
/// Sign and precision are the core's business.
fn require_amount(amount: Option<AmountInput>) -> Result<String, AppError> {
    let amount = amount
        .map(AmountInput::into_string)
        .ok_or_else(|| AppError::BadRequest("amount is required".to_string()))?;

    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("amount is required".to_string()));
    }
    if Decimal::from_str_exact(trimmed).is_err() {
        return Err(AppError::BadRequest(format!("amount is not a number: {trimmed}")));
    }
    Ok(trimmed.to_string())
}

async fn run(state: &AppState, caller: CallerAddress, direction: Direction, amount: Option<AmountInput>) -> ExchangeResponse {
    state.rate_limiter.check(caller.as_str(), "exchange")?;
    let amount = require_amount(amount)?;

    tracing::info!(caller = %caller.as_str(), direction = %direction, amount = %amount, "Exchange requested");

    let receipt = state
        .orchestrator
        .exchange(ExchangeRequest::new(direction, amount, caller.0))
        .await?;

    Ok(Json(ApiResponse::ok(receipt)))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

/// `POST /exchange` with `direction` or legacy `tokenSymbol`/`isBuying`
pub async fn exchange(
    State(state): State<AppState>,
    caller: CallerAddress,
    payload: Result<Json<ExchangeBody>, JsonRejection>,
) -> ExchangeResponse {
    let body = body(payload)?;

    let direction = match (body.direction, body.token_symbol.as_deref(), body.is_buying) {
        (Some(direction), _, _) => direction,
        (None, Some(symbol), Some(is_buying)) => {
            let symbols = state.symbols();
            Direction::from_symbol(symbol, is_buying, &symbols.native, &symbols.custom)
                .ok_or_else(|| AppError::BadRequest(format!("Unsupported token symbol: {symbol}")))?
        }
        _ => {
            return Err(AppError::BadRequest(
                "direction, or tokenSymbol and isBuying, is required".to_string(),
            ));
        }
    };

    run(&state, caller, direction, body.amount).await
}

pub async fn buy_native(
    State(state): State<AppState>,
    caller: CallerAddress,
    payload: Result<Json<AmountBody>, JsonRejection>,
) -> ExchangeResponse {
    run(&state, caller, Direction::BuyNative, body(payload)?.amount).await
}

pub async fn sell_native(
    State(state): State<AppState>,
    caller: CallerAddress,
    payload: Result<Json<AmountBody>, JsonRejection>,
) -> ExchangeResponse {
    run(&state, caller, Direction::SellNative, body(payload)?.amount).await
}

pub async fn buy_custom(
    State(state): State<AppState>,
    caller: CallerAddress,
    payload: Result<Json<AmountBody>, JsonRejection>,
) -> ExchangeResponse {
    run(&state, caller, Direction::BuyCustom, body(payload)?.amount).await
}

pub async fn sell_custom(
    State(state): State<AppState>,
    caller: CallerAddress,
    payload: Result<Json<AmountBody>, JsonRejection>,
) -> ExchangeResponse {
    run(&state, caller, Direction::SellCustom, body(payload)?.amount).await
}

/// `GET /exchange/quote?direction=..&amount=..`
pub async fn quote(
    State(state): State<AppState>,
    caller: CallerAddress,
    params: Result<Query<QuoteParams>, QueryRejection>,
) -> Result<Json<ApiResponse<ExchangeQuote>>, AppError> {
    state.rate_limiter.check(caller.as_str(), "quote")?;

    let Query(params) = params.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let amount = require_amount(Some(AmountInput::Text(params.amount)))?;

    let quote = state.orchestrator.quote(params.direction, &amount).await?;
    Ok(Json(ApiResponse::ok(quote)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_amount() {
        assert_eq!(require_amount(Some(AmountInput::Text(" 120 ".into()))).unwrap(), "120");
        assert_eq!(
            require_amount(Some(AmountInput::Number(serde_json::Number::from(5)))).unwrap(),
            "5"
        );
        assert!(require_amount(None).is_err());
        assert!(require_amount(Some(AmountInput::Text("".into()))).is_err());
        assert!(require_amount(Some(AmountInput::Text("12abc".into()))).is_err());
        // Sign is checked by the core
        assert_eq!(require_amount(Some(AmountInput::Text("-1".into()))).unwrap(), "-1");
    }
}
