//! Ledger access
//!
//! [`LedgerClient`] is the only way the core touches the external ledger:
//! read-only lookups (sequence count, balances, authorizations, rates,
//! reserves, exchange state) plus submission and confirmation polling. Read-only calls need
//! no coordination; every mutating call goes through the
//! [`SubmissionExecutor`](crate::executor::SubmissionExecutor).

pub mod abi;
pub mod rpc;
pub mod simulated;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use types::exchange::{Direction, ExchangeState};
use types::ids::{Address, ConfirmationId};
use types::numeric::{Asset, AssetAmount, Rate};

pub use rpc::RpcLedger;
pub use simulated::{Fault, SimulatedLedger, SubmittedOperation};

/// Errors returned by a ledger collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("ledger request timed out after {0:?}")]
    Timeout(Duration),

    #[error("ledger rejected request ({code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed ledger response: {0}")]
    Decode(String),

    #[error("unsupported by ledger: {0}")]
    Unsupported(String),

    #[error("ledger configuration mismatch: {0}")]
    Misconfigured(String),
}

/// Mutating operation submitted to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerOperation {
    /// Grant the exchange a spending authorization of `amount`
    Authorize { amount: AssetAmount },
    /// Exchange `amount` of the direction's paying asset
    Exchange {
        direction: Direction,
        amount: AssetAmount,
    },
}

impl LedgerOperation {
    /// Short label for logs
    pub fn label(&self) -> String {
        match self {
            LedgerOperation::Authorize { amount } => {
                format!("authorize {} {}", amount, amount.asset())
            }
            LedgerOperation::Exchange { direction, amount } => {
                format!("{} {} {}", direction, amount, amount.asset())
            }
        }
    }
}

/// Per-submission options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmitOptions {
    /// Sequence number; always set by the executor before dispatch
    pub sequence: Option<u64>,
    /// Ceiling on ledger resources the submission may consume
    pub resource_limit: Option<u64>,
    /// Native value attached to the submission
    pub value_attached: Option<AssetAmount>,
}

impl SubmitOptions {
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_resource_limit(mut self, limit: Option<u64>) -> Self {
        self.resource_limit = limit;
        self
    }

    pub fn with_value(mut self, value: Option<AssetAmount>) -> Self {
        self.value_attached = value;
        self
    }
}

/// Handle for a dispatched, not yet confirmed submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHandle {
    pub id: ConfirmationId,
    pub sequence: u64,
}

/// Final ledger verdict on a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub confirmation_id: ConfirmationId,
    /// `false` means the ledger reverted the submission
    pub succeeded: bool,
    /// Block (or equivalent marker) the verdict was finalized in
    pub block: u64,
    /// Native fee charged to the signing identity
    pub fee: AssetAmount,
}

/// Query/submit interface to the external ledger
///
/// `rate(from, to)` is expressed in whole units of `to` per whole unit of
/// `from`. Only pairs with the stable asset on one side are supported.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Identity submissions are signed as
    fn signer(&self) -> &Address;

    /// Count of operations from `identity` known to the ledger, including
    /// pending ones; the next usable sequence number.
    async fn pending_sequence_count(&self, identity: &Address) -> Result<u64, LedgerError>;

    async fn balance(&self, asset: Asset, holder: &Address) -> Result<AssetAmount, LedgerError>;

    /// Spending authorization `owner` has granted the exchange
    async fn authorization(&self, asset: Asset, owner: &Address) -> Result<AssetAmount, LedgerError>;

    async fn rate(&self, from: Asset, to: Asset) -> Result<Rate, LedgerError>;

    /// Quantity of `asset` the exchange holds to pay out
    async fn reserve(&self, asset: Asset) -> Result<AssetAmount, LedgerError>;

    /// Pause flag, custom token metadata and contract addresses
    async fn exchange_state(&self) -> Result<ExchangeState, LedgerError>;

    async fn submit(
        &self,
        operation: &LedgerOperation,
        options: &SubmitOptions,
    ) -> Result<PendingHandle, LedgerError>;

    /// Wait until the ledger finalizes `handle`. Has no timeout of its own.
    async fn await_confirmation(&self, handle: &PendingHandle) -> Result<Confirmation, LedgerError>;
}
