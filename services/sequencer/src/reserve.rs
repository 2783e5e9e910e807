//! Reserve and balance preconditions
//!
//! Every check reads live ledger state; nothing is cached between calls.
//! A check made earlier in a multi-step flow is advisory only, so the
//! orchestrator calls `verify` again right before the paying submission.

use std::sync::Arc;

use tracing::{debug, warn};
use types::errors::{AmountError, ExchangeError};
use types::exchange::{Direction, ExchangeQuote, ReserveCheckResult};
use types::ids::Address;
use types::numeric::AssetAmount;

use crate::ledger::{LedgerClient, LedgerError};

pub(crate) fn query_error(err: LedgerError) -> ExchangeError {
    ExchangeError::Query {
        reason: err.to_string(),
    }
}

/// Reject zero amounts and amounts of the wrong asset for `direction`
/// before anything touches the ledger.
pub fn validate_amount(direction: Direction, amount: AssetAmount) -> Result<(), ExchangeError> {
    if amount.asset() != direction.paying() {
        return Err(AmountError::AssetMismatch {
            left: amount.asset(),
            right: direction.paying(),
        }
        .into());
    }
    if amount.is_zero() {
        return Err(AmountError::NonPositive(amount.to_string()).into());
    }
    Ok(())
}

pub struct ReserveVerifier {
    ledger: Arc<dyn LedgerClient>,
}

impl ReserveVerifier {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Output `amount` would buy in `direction` at the live rate
    pub async fn quote(&self, direction: Direction, amount: AssetAmount) -> Result<ExchangeQuote, ExchangeError> {
        validate_amount(direction, amount)?;

        let input_asset = direction.paying();
        let output_asset = direction.receiving();
        let rate = self
            .ledger
            .rate(input_asset, output_asset)
            .await
            .map_err(query_error)?;
        let output_amount = rate.convert(amount, output_asset)?;

        debug!(
            direction = %direction,
            input = %amount,
            rate = %rate,
            output = %output_amount,
            "Quoted exchange"
        );

        Ok(ExchangeQuote {
            direction,
            input_amount: amount,
            input_asset,
            output_asset,
            rate,
            output_amount,
        })
    }

    /// Check the exchange can pay out what `amount` buys in `direction`.
    ///
    /// Fails with `InvalidAmount` before any ledger read for a zero amount,
    /// with `InvalidAmount` when the amount converts to no output at all,
    /// and with `InsufficientReserve` when `available < required`.
    pub async fn verify(&self, direction: Direction, amount: AssetAmount) -> Result<ReserveCheckResult, ExchangeError> {
        let quote = self.quote(direction, amount).await?;
        let required = quote.output_amount;

        if required.is_zero() {
            warn!(direction = %direction, input = %amount, rate = %quote.rate, "Amount converts to zero output");
            return Err(AmountError::ZeroOutput {
                value: amount.to_string(),
                asset: quote.output_asset,
            }
            .into());
        }

        let available = self
            .ledger
            .reserve(quote.output_asset)
            .await
            .map_err(query_error)?;

        let result = ReserveCheckResult {
            sufficient: available.units() >= required.units(),
            required,
            available,
        };

        if !result.sufficient {
            warn!(
                direction = %direction,
                required = %required,
                available = %available,
                "Insufficient exchange reserve"
            );
            return Err(ExchangeError::InsufficientReserve {
                asset: quote.output_asset,
                required: required.to_string(),
                available: available.to_string(),
            });
        }

        Ok(result)
    }

    /// Check `holder` owns at least `amount` of its asset
    pub async fn verify_balance(&self, holder: &Address, amount: AssetAmount) -> Result<AssetAmount, ExchangeError> {
        let balance = self
            .ledger
            .balance(amount.asset(), holder)
            .await
            .map_err(query_error)?;

        if balance.units() < amount.units() {
            warn!(
                holder = %holder,
                asset = %amount.asset(),
                required = %amount,
                available = %balance,
                "Insufficient balance"
            );
            return Err(ExchangeError::InsufficientBalance {
                asset: amount.asset(),
                required: amount.to_string(),
                available: balance.to_string(),
            });
        }

        Ok(balance)
    }
}
