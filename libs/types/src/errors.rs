//! Error types for the exchange gateway
//!
//! Error taxonomy using thiserror. Every [`ExchangeError`] maps onto exactly
//! one terminal [`Outcome`] so callers can tell a rejected operation apart
//! from one whose on-ledger effect is unknown.

use thiserror::Error;

use crate::exchange::{Outcome, Stage};
use crate::numeric::Asset;

/// Amount parsing and arithmetic errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is required")]
    Empty,

    #[error("amount is not a decimal number: {0}")]
    Malformed(String),

    #[error("amount must be positive, got {0}")]
    NonPositive(String),

    #[error("amount {value} has more than {precision} fractional digits for {asset}")]
    TooPrecise {
        value: String,
        asset: Asset,
        precision: u32,
    },

    #[error("cannot combine amounts of {left} and {right}")]
    AssetMismatch { left: Asset, right: Asset },

    #[error("amount {value} buys no {asset} at the current rate")]
    ZeroOutput { value: String, asset: Asset },

    #[error("exchange rate is zero")]
    ZeroRate,

    #[error("arithmetic overflow in amount calculation")]
    Overflow,
}

/// Top-level error for a logical exchange operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("Insufficient {asset} reserves: {required} required, {available} available")]
    InsufficientReserve {
        asset: Asset,
        required: String,
        available: String,
    },

    #[error("Insufficient {asset} balance: {required} required, {available} available")]
    InsufficientBalance {
        asset: Asset,
        required: String,
        available: String,
    },

    #[error("Sequence allocation failed: {reason}")]
    Allocation { reason: String },

    #[error("Ledger query failed: {reason}")]
    Query { reason: String },

    #[error("{stage} submission outcome unknown: {reason}")]
    TransportFailed { stage: Stage, reason: String },

    #[error("{stage} submission reverted by the ledger: {confirmation_id}")]
    Reverted {
        stage: Stage,
        confirmation_id: String,
    },
}

impl ExchangeError {
    /// Terminal outcome this error represents
    pub fn outcome(&self) -> Outcome {
        match self {
            ExchangeError::InvalidAmount(_)
            | ExchangeError::InsufficientReserve { .. }
            | ExchangeError::InsufficientBalance { .. } => Outcome::PreconditionFailed,
            ExchangeError::Reverted { .. } => Outcome::Reverted,
            ExchangeError::Allocation { .. }
            | ExchangeError::Query { .. }
            | ExchangeError::TransportFailed { .. } => Outcome::TransportFailed,
        }
    }

    /// Whether the operation was refused by a local check rather than by
    /// the ledger. The refusal may follow an already confirmed
    /// authorization when the pre-action reserve check fails.
    pub fn is_precondition(&self) -> bool {
        self.outcome() == Outcome::PreconditionFailed
    }

    /// Whether the ledger state is known not to contain the operation's
    /// primary effect, so a fresh retry cannot duplicate it.
    ///
    /// Only a transport failure during or after dispatch leaves doubt.
    pub fn is_retry_safe(&self) -> bool {
        !matches!(self, ExchangeError::TransportFailed { .. })
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ExchangeError::InvalidAmount(_) => "INVALID_AMOUNT",
            ExchangeError::InsufficientReserve { .. } => "INSUFFICIENT_RESERVE",
            ExchangeError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            ExchangeError::Allocation { .. } => "SEQUENCE_UNAVAILABLE",
            ExchangeError::Query { .. } => "LEDGER_UNAVAILABLE",
            ExchangeError::TransportFailed { .. } => "TRANSPORT_FAILED",
            ExchangeError::Reverted { .. } => "LEDGER_REVERTED",
        }
    }
}
