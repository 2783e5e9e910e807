//! Exchange orchestration
//!
//! One state machine serves all four directions. Per logical operation:
//!
//! 1. Validate the amount
//! 2. Advisory reserve and balance checks (no lock held)
//! 3. Under the operation lock: re-check the balance, then submit a
//!    spending authorization if the paying asset needs one and the granted
//!    amount is short
//! 4. Authoritative reserve check, then the paying action with a
//!    resource-limit ceiling
//! 5. Measure the realized output from balances around the confirmation
//! 6. Audit and return the receipt
//!
//! Terminal outcomes are `Confirmed` (the receipt) or one of the
//! [`ExchangeError`] classes. Nothing is retried here.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use types::errors::ExchangeError;
use types::exchange::{Direction, DirectionRate, ExchangeQuote, ExchangeReceipt, MarketSnapshot, Outcome, Stage};
use types::ids::{Address, ConfirmationId, OperationId};
use types::numeric::{Asset, AssetAmount};

use crate::audit::{AuditEvent, AuditRecord, AuditSink};
use crate::config::SequencerConfig;
use crate::executor::{SubmissionError, SubmissionExecutor};
use crate::ledger::{Confirmation, LedgerClient, LedgerOperation, SubmitOptions};
use crate::reserve::{query_error, ReserveVerifier};
use crate::sequence::SequenceAllocator;

/// Inbound operation request, already syntactically checked by the adapter
#[derive(Debug, Clone)]
pub struct ExchangeRequest {
    pub direction: Direction,
    /// String-encoded decimal in whole units of the paying asset
    pub amount: String,
    /// Caller address for the audit trail
    pub caller: String,
}

impl ExchangeRequest {
    pub fn new(direction: Direction, amount: impl Into<String>, caller: impl Into<String>) -> Self {
        Self {
            direction,
            amount: amount.into(),
            caller: caller.into(),
        }
    }
}

fn submission_error(stage: Stage, err: SubmissionError) -> ExchangeError {
    match err {
        SubmissionError::Allocation(err) => ExchangeError::Allocation {
            reason: err.to_string(),
        },
        other => ExchangeError::TransportFailed {
            stage,
            reason: other.to_string(),
        },
    }
}

fn reverted(stage: Stage, confirmation: &Confirmation) -> ExchangeError {
    ExchangeError::Reverted {
        stage,
        confirmation_id: confirmation.confirmation_id.to_string(),
    }
}

pub struct ExchangeOrchestrator {
    ledger: Arc<dyn LedgerClient>,
    identity: Address,
    executor: SubmissionExecutor,
    verifier: ReserveVerifier,
    audit: Arc<dyn AuditSink>,
    config: SequencerConfig,
    /// Spans authorization through action so one logical operation's
    /// submissions are never interleaved with another's
    operation_lock: Mutex<()>,
}

impl ExchangeOrchestrator {
    pub fn new(ledger: Arc<dyn LedgerClient>, audit: Arc<dyn AuditSink>, config: SequencerConfig) -> Self {
        let identity = ledger.signer().clone();
        let allocator = Arc::new(SequenceAllocator::new(Arc::clone(&ledger), identity.clone()));
        let executor = SubmissionExecutor::new(allocator, Arc::clone(&ledger), config.confirmation_timeout());
        let verifier = ReserveVerifier::new(Arc::clone(&ledger));

        Self {
            ledger,
            identity,
            executor,
            verifier,
            audit,
            config,
            operation_lock: Mutex::new(()),
        }
    }

    /// Signing identity every submission is made as
    pub fn identity(&self) -> &Address {
        &self.identity
    }

    pub fn allocator(&self) -> &Arc<SequenceAllocator> {
        self.executor.allocator()
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// Pay stable, receive native
    pub async fn buy_native_with_stable(&self, amount: &str, caller: &str) -> Result<ExchangeReceipt, ExchangeError> {
        self.exchange(ExchangeRequest::new(Direction::BuyNative, amount, caller))
            .await
    }

    /// Pay native, receive stable
    pub async fn sell_native_for_stable(&self, amount: &str, caller: &str) -> Result<ExchangeReceipt, ExchangeError> {
        self.exchange(ExchangeRequest::new(Direction::SellNative, amount, caller))
            .await
    }

    /// Pay stable, receive custom
    pub async fn convert_stable_for_custom(&self, amount: &str, caller: &str) -> Result<ExchangeReceipt, ExchangeError> {
        self.exchange(ExchangeRequest::new(Direction::BuyCustom, amount, caller))
            .await
    }

    /// Pay custom, receive stable
    pub async fn convert_custom_for_stable(&self, amount: &str, caller: &str) -> Result<ExchangeReceipt, ExchangeError> {
        self.exchange(ExchangeRequest::new(Direction::SellCustom, amount, caller))
            .await
    }

    /// Run one logical exchange operation to a terminal outcome
    pub async fn exchange(&self, request: ExchangeRequest) -> Result<ExchangeReceipt, ExchangeError> {
        let operation_id = OperationId::new();
        let span = info_span!(
            "exchange",
            operation_id = %operation_id,
            direction = %request.direction,
            caller = %request.caller
        );

        async {
            let result = self.run(operation_id, &request).await;
            if let Err(err) = &result {
                warn!(
                    code = err.code(),
                    outcome = ?err.outcome(),
                    retry_safe = err.is_retry_safe(),
                    error = %err,
                    "Exchange did not confirm"
                );
            }
            self.audit_outcome(operation_id, &request, &result);
            result
        }
        .instrument(span)
        .await
    }

    /// Quote without submitting or checking reserves
    pub async fn quote(&self, direction: Direction, amount: &str) -> Result<ExchangeQuote, ExchangeError> {
        let amount = AssetAmount::parse(direction.paying(), amount)?;
        self.verifier.quote(direction, amount).await
    }

    /// Live rate per direction, reserve per asset and exchange state,
    /// read concurrently
    pub async fn snapshot(&self) -> Result<MarketSnapshot, ExchangeError> {
        let ledger = &self.ledger;
        let rate = move |direction: Direction| async move {
            ledger
                .rate(direction.paying(), direction.receiving())
                .await
                .map(|rate| DirectionRate { direction, rate })
        };

        let (buy_native, sell_native, buy_custom, sell_custom, native, stable, custom, state) = tokio::try_join!(
            rate(Direction::BuyNative),
            rate(Direction::SellNative),
            rate(Direction::BuyCustom),
            rate(Direction::SellCustom),
            ledger.reserve(Asset::NATIVE),
            ledger.reserve(Asset::STABLE),
            ledger.reserve(Asset::CUSTOM),
            ledger.exchange_state(),
        )
        .map_err(query_error)?;

        Ok(MarketSnapshot {
            identity: self.identity.clone(),
            rates: vec![buy_native, sell_native, buy_custom, sell_custom],
            reserves: vec![native, stable, custom],
            paused: state.paused,
            token: state.token,
            addresses: state.addresses,
        })
    }

    async fn run(&self, operation_id: OperationId, request: &ExchangeRequest) -> Result<ExchangeReceipt, ExchangeError> {
        let direction = request.direction;
        let paying = direction.paying();
        let receiving = direction.receiving();

        let amount = AssetAmount::parse(paying, &request.amount)?;

        // Advisory; state may move before we hold the lock
        self.verifier.verify(direction, amount).await?;
        self.verifier.verify_balance(&self.identity, amount).await?;

        let _operation = self.operation_lock.lock().await;

        // An operation queued ahead of us may have spent the balance
        self.verifier.verify_balance(&self.identity, amount).await?;

        let authorization_id = if paying.needs_authorization() {
            self.ensure_authorization(amount).await?
        } else {
            None
        };

        // Authoritative check right before the paying submission
        let check = self.verifier.verify(direction, amount).await?;
        let expected_output = check.required;
        let before = self
            .ledger
            .balance(receiving, &self.identity)
            .await
            .map_err(query_error)?;

        let options = SubmitOptions::default()
            .with_resource_limit(self.config.action_resource_limit)
            .with_value((!paying.needs_authorization()).then_some(amount));
        let action = LedgerOperation::Exchange { direction, amount };

        let confirmation = self
            .executor
            .submit(&action, options)
            .await
            .map_err(|e| submission_error(Stage::Action, e))?;
        if !confirmation.succeeded {
            return Err(reverted(Stage::Action, &confirmation));
        }

        let realized_output = self.realized_output(before, &confirmation).await;
        let diverged = realized_output.is_some_and(|realized| realized != expected_output);
        if diverged {
            warn!(
                expected = %expected_output,
                realized = ?realized_output.map(|r| r.to_string()),
                "Realized output diverged from quote"
            );
        }

        info!(
            confirmation_id = %confirmation.confirmation_id,
            block = confirmation.block,
            input = %amount,
            expected = %expected_output,
            "Exchange confirmed"
        );

        Ok(ExchangeReceipt {
            operation_id,
            outcome: Outcome::Confirmed,
            direction,
            confirmation_id: confirmation.confirmation_id,
            authorization_id,
            input_amount: amount,
            expected_output,
            realized_output,
            diverged,
            block: confirmation.block,
        })
    }

    /// Submit a spending authorization for exactly `amount` unless the
    /// currently granted one already covers it.
    async fn ensure_authorization(&self, amount: AssetAmount) -> Result<Option<ConfirmationId>, ExchangeError> {
        let granted = self
            .ledger
            .authorization(amount.asset(), &self.identity)
            .await
            .map_err(query_error)?;

        if granted.units() >= amount.units() {
            debug!(granted = %granted, required = %amount, "Existing authorization suffices");
            return Ok(None);
        }

        debug!(granted = %granted, required = %amount, "Submitting authorization");
        let options = SubmitOptions::default().with_resource_limit(self.config.authorization_resource_limit);
        let confirmation = self
            .executor
            .submit(&LedgerOperation::Authorize { amount }, options)
            .await
            .map_err(|e| submission_error(Stage::Authorization, e))?;

        if !confirmation.succeeded {
            return Err(reverted(Stage::Authorization, &confirmation));
        }
        Ok(Some(confirmation.confirmation_id))
    }

    /// Balance delta of the receiving asset. Native output has the
    /// action's fee added back. `None` if the follow-up read fails.
    async fn realized_output(&self, before: AssetAmount, confirmation: &Confirmation) -> Option<AssetAmount> {
        let asset = before.asset();
        let after = match self.ledger.balance(asset, &self.identity).await {
            Ok(after) => after,
            Err(err) => {
                warn!(error = %err, "Could not read balance after confirmation");
                return None;
            }
        };

        let mut units = after.units().saturating_sub(before.units());
        if asset == Asset::NATIVE {
            units = units.saturating_add(confirmation.fee.units());
        }
        Some(AssetAmount::from_units(asset, units))
    }

    fn audit_outcome(&self, operation_id: OperationId, request: &ExchangeRequest, result: &Result<ExchangeReceipt, ExchangeError>) {
        let (event, details) = match result {
            Ok(receipt) => (
                AuditEvent::ExchangeConfirmed,
                serde_json::to_value(receipt).unwrap_or_default(),
            ),
            Err(err) => {
                let event = match err.outcome() {
                    Outcome::PreconditionFailed => AuditEvent::PreconditionFailed,
                    Outcome::Reverted => AuditEvent::ExchangeReverted,
                    Outcome::TransportFailed | Outcome::Confirmed => AuditEvent::ExchangeFailed,
                };
                let details = json!({
                    "direction": request.direction,
                    "amount": request.amount,
                    "code": err.code(),
                    "message": err.to_string(),
                    "retry_safe": err.is_retry_safe(),
                });
                (event, details)
            }
        };

        self.audit.record(AuditRecord::new(
            event,
            self.identity.clone(),
            request.caller.clone(),
            operation_id,
            details,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::ledger::SimulatedLedger;
    use std::time::Duration;
    use types::numeric::Rate;

    fn signer() -> Address {
        Address::parse("0x00000000000000000000000000000000000000a1").unwrap()
    }

    fn setup() -> (Arc<SimulatedLedger>, Arc<MemoryAuditSink>, ExchangeOrchestrator) {
        let ledger = Arc::new(SimulatedLedger::development(signer()).unwrap());
        let audit = Arc::new(MemoryAuditSink::new());
        let orchestrator = ExchangeOrchestrator::new(ledger.clone(), audit.clone(), SequencerConfig::default());
        (ledger, audit, orchestrator)
    }

    #[tokio::test]
    async fn test_sell_native_attaches_value_and_skips_authorization() {
        let (ledger, audit, orchestrator) = setup();

        let receipt = orchestrator.sell_native_for_stable("0.5", "0xcaller").await.unwrap();
        assert_eq!(receipt.outcome, Outcome::Confirmed);
        assert!(receipt.authorization_id.is_none());
        assert_eq!(receipt.expected_output.to_string(), "1000");
        assert_eq!(receipt.realized_output, Some(receipt.expected_output));
        assert!(!receipt.diverged);

        let submissions = ledger.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].options.value_attached, Some(receipt.input_amount));
        assert_eq!(submissions[0].options.resource_limit, Some(300_000));
        assert_eq!(audit.events(), vec![AuditEvent::ExchangeConfirmed]);
        assert_eq!(audit.records()[0].caller, "0xcaller");
    }

    #[tokio::test]
    async fn test_consumed_authorization_is_granted_again() {
        let (ledger, _audit, orchestrator) = setup();

        orchestrator.convert_custom_for_stable("10", "anonymous").await.unwrap();
        // First call granted exactly 10 and the action consumed it
        let second = orchestrator.convert_custom_for_stable("10", "anonymous").await.unwrap();
        assert!(second.authorization_id.is_some());
        assert_eq!(ledger.submissions().len(), 4);
    }

    #[tokio::test]
    async fn test_sufficient_authorization_is_reused() {
        let ledger = Arc::new(
            SimulatedLedger::development(signer())
                .unwrap()
                .with_authorization(&signer(), AssetAmount::from_units(Asset::CUSTOM, 50 * Asset::CUSTOM.unit())),
        );
        let orchestrator =
            ExchangeOrchestrator::new(ledger.clone(), Arc::new(MemoryAuditSink::new()), SequencerConfig::default());

        let receipt = orchestrator.convert_custom_for_stable("10", "anonymous").await.unwrap();
        assert!(receipt.authorization_id.is_none());
        assert_eq!(receipt.expected_output.to_string(), "12");

        let submissions = ledger.submissions();
        assert_eq!(submissions.len(), 1);
        assert!(matches!(submissions[0].operation, LedgerOperation::Exchange { .. }));
    }

    #[tokio::test]
    async fn test_native_output_adds_back_fee() {
        let ledger = Arc::new(
            SimulatedLedger::development(signer())
                .unwrap()
                .with_fee_per_resource(1_000_000_000),
        );
        let orchestrator =
            ExchangeOrchestrator::new(ledger.clone(), Arc::new(MemoryAuditSink::new()), SequencerConfig::default());

        let receipt = orchestrator.buy_native_with_stable("2000", "anonymous").await.unwrap();
        assert_eq!(receipt.expected_output.to_string(), "1");
        assert_eq!(receipt.realized_output, Some(receipt.expected_output));
        assert!(!receipt.diverged);
    }

    #[tokio::test]
    async fn test_quote_does_not_submit() {
        let (ledger, _audit, orchestrator) = setup();
        let quote = orchestrator.quote(Direction::BuyCustom, "120").await.unwrap();
        assert_eq!(quote.output_amount.to_string(), "100");
        assert_eq!(quote.rate, Rate::new(5, 6).unwrap());
        assert!(ledger.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_reads_every_direction() {
        let (_ledger, _audit, orchestrator) = setup();
        let snapshot = orchestrator.snapshot().await.unwrap();
        assert_eq!(snapshot.identity, signer());
        assert_eq!(snapshot.rates.len(), 4);
        assert_eq!(snapshot.rates[0].direction, Direction::BuyNative);
        assert_eq!(snapshot.rates[1].rate, Rate::new(2000, 1).unwrap());
        assert_eq!(snapshot.reserves.len(), 3);
        assert_eq!(snapshot.reserves[0].to_string(), "100");
        assert!(!snapshot.paused);
        assert_eq!(snapshot.token.name, "Daju Token");
    }

    #[tokio::test]
    async fn test_snapshot_reports_pause() {
        let (ledger, _audit, orchestrator) = setup();
        ledger.set_paused(true);
        assert!(orchestrator.snapshot().await.unwrap().paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_spent_while_queued_is_rechecked() {
        let (ledger, audit, orchestrator) = setup();
        let held = orchestrator.operation_lock.lock().await;

        let queued = orchestrator.convert_stable_for_custom("600", "anonymous");
        tokio::pin!(queued);
        // Passes the advisory checks, then waits for the lock
        assert!(tokio::time::timeout(Duration::from_secs(1), &mut queued).await.is_err());

        // The operation ahead of it spent most of the balance
        ledger.set_balance(&signer(), AssetAmount::from_units(Asset::STABLE, 100 * Asset::STABLE.unit()));
        drop(held);

        let err = queued.await.unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientBalance { asset: Asset::STABLE, .. }));
        assert!(ledger.submissions().is_empty());
        assert_eq!(audit.events(), vec![AuditEvent::PreconditionFailed]);
    }

    #[tokio::test]
    async fn test_insufficient_balance_submits_nothing() {
        let (ledger, audit, orchestrator) = setup();
        let err = orchestrator.buy_native_with_stable("100001", "anonymous").await.unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientBalance { asset: Asset::STABLE, .. }));
        assert!(ledger.submissions().is_empty());
        assert_eq!(audit.events(), vec![AuditEvent::PreconditionFailed]);
    }
}
