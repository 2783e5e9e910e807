//! Sequenced submission of a single ledger-mutating call
//!
//! `execute` holds the in-flight lock from allocation through confirmation,
//! so at most one sequence number is ever outstanding for the identity.
//! The allocator is reset after every attempt, successful or not. A
//! sequence is never retried; a retry is a fresh `execute`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::ledger::{Confirmation, LedgerClient, LedgerError, LedgerOperation, PendingHandle, SubmitOptions};
use crate::sequence::{AllocationError, SequenceAllocator};

/// Failure of one submission attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("dispatch failed at sequence {sequence}: {source}")]
    Dispatch {
        sequence: u64,
        #[source]
        source: LedgerError,
    },

    #[error("confirmation wait failed at sequence {sequence}: {source}")]
    Confirmation {
        sequence: u64,
        #[source]
        source: LedgerError,
    },

    #[error("no confirmation for sequence {sequence} within {timeout:?}")]
    Timeout { sequence: u64, timeout: Duration },
}

/// One submission attempt; lives only for the duration of `execute`.
#[derive(Debug, Clone)]
struct PendingOperation {
    sequence: u64,
    options: SubmitOptions,
}

pub struct SubmissionExecutor {
    allocator: Arc<SequenceAllocator>,
    ledger: Arc<dyn LedgerClient>,
    in_flight: Mutex<()>,
    timeout: Duration,
}

impl SubmissionExecutor {
    /// `timeout` bounds dispatch plus confirmation wait.
    pub fn new(allocator: Arc<SequenceAllocator>, ledger: Arc<dyn LedgerClient>, timeout: Duration) -> Self {
        Self {
            allocator,
            ledger,
            in_flight: Mutex::new(()),
            timeout,
        }
    }

    pub fn allocator(&self) -> &Arc<SequenceAllocator> {
        &self.allocator
    }

    /// Allocate a sequence, merge it into `options`, dispatch through
    /// `submit`, and wait for the ledger's verdict.
    ///
    /// A reverted submission is returned as `Ok` with `succeeded == false`;
    /// only transport-level problems are errors. Errors are passed through
    /// unchanged after the allocator is reset.
    pub async fn execute<F, Fut>(&self, submit: F, options: SubmitOptions) -> Result<Confirmation, SubmissionError>
    where
        F: FnOnce(SubmitOptions) -> Fut + Send,
        Fut: Future<Output = Result<PendingHandle, LedgerError>> + Send,
    {
        let _in_flight = self.in_flight.lock().await;

        let result = self.dispatch_and_confirm(submit, options).await;

        // Either outcome leaves the local counter untrustworthy
        self.allocator.reset().await;

        match &result {
            Ok(confirmation) if confirmation.succeeded => info!(
                confirmation_id = %confirmation.confirmation_id,
                block = confirmation.block,
                "Submission confirmed"
            ),
            Ok(confirmation) => warn!(
                confirmation_id = %confirmation.confirmation_id,
                block = confirmation.block,
                "Submission reverted by ledger"
            ),
            Err(err) => error!(error = %err, "Submission failed; sequence state reset"),
        }

        result
    }

    /// Submit a described operation through this executor
    pub async fn submit(
        &self,
        operation: &LedgerOperation,
        options: SubmitOptions,
    ) -> Result<Confirmation, SubmissionError> {
        let ledger = Arc::clone(&self.ledger);
        debug!(operation = %operation.label(), "Submitting operation");
        self.execute(
            move |options| async move { ledger.submit(operation, &options).await },
            options,
        )
        .await
    }

    async fn dispatch_and_confirm<F, Fut>(
        &self,
        submit: F,
        options: SubmitOptions,
    ) -> Result<Confirmation, SubmissionError>
    where
        F: FnOnce(SubmitOptions) -> Fut + Send,
        Fut: Future<Output = Result<PendingHandle, LedgerError>> + Send,
    {
        let sequence = self.allocator.allocate().await?;
        let pending = PendingOperation {
            sequence,
            options: options.with_sequence(sequence),
        };

        let ledger = Arc::clone(&self.ledger);
        let attempt = async move {
            let handle = submit(pending.options)
                .await
                .map_err(|source| SubmissionError::Dispatch {
                    sequence: pending.sequence,
                    source,
                })?;

            debug!(
                sequence = pending.sequence,
                pending_id = %handle.id,
                "Dispatched; awaiting confirmation"
            );

            ledger
                .await_confirmation(&handle)
                .await
                .map_err(|source| SubmissionError::Confirmation {
                    sequence: pending.sequence,
                    source,
                })
        };

        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(SubmissionError::Timeout {
                sequence,
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Fault, SimulatedLedger};
    use types::ids::Address;
    use types::numeric::{Asset, AssetAmount};

    fn signer() -> Address {
        Address::parse("0x00000000000000000000000000000000000000a1").unwrap()
    }

    fn setup(ledger: SimulatedLedger) -> (Arc<SimulatedLedger>, SubmissionExecutor) {
        let ledger = Arc::new(ledger);
        let allocator = Arc::new(SequenceAllocator::new(ledger.clone(), signer()));
        let executor = SubmissionExecutor::new(allocator, ledger.clone(), Duration::from_secs(5));
        (ledger, executor)
    }

    fn authorize(units: u128) -> LedgerOperation {
        LedgerOperation::Authorize {
            amount: AssetAmount::from_units(Asset::STABLE, units),
        }
    }

    #[tokio::test]
    async fn test_execute_merges_sequence_and_resets() {
        let (ledger, executor) = setup(SimulatedLedger::new(signer()).with_sequence(5));

        let confirmation = executor
            .submit(&authorize(10), SubmitOptions::default().with_resource_limit(Some(90_000)))
            .await
            .unwrap();
        assert!(confirmation.succeeded);

        let submitted = ledger.submissions();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].options.sequence, Some(5));
        assert_eq!(submitted[0].options.resource_limit, Some(90_000));

        // Reset after success: next allocation re-reads and sees 6
        assert_eq!(executor.allocator().state().await.next_sequence, None);
        assert_eq!(executor.allocator().allocate().await.unwrap(), 6);
        assert_eq!(ledger.sequence_reads(), 2);
    }

    #[tokio::test]
    async fn test_closure_receives_allocated_sequence() {
        let (ledger, executor) = setup(SimulatedLedger::new(signer()).with_sequence(2));
        let inner = ledger.clone();
        let op = authorize(1);

        executor
            .execute(
                move |options| async move {
                    assert_eq!(options.sequence, Some(2));
                    inner.submit(&op, &options).await
                },
                SubmitOptions::default(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_failure_resets_and_propagates() {
        let (ledger, executor) = setup(SimulatedLedger::new(signer()).with_sequence(4));
        // Warm the cache so we can observe the reset
        assert_eq!(executor.allocator().allocate().await.unwrap(), 4);
        executor.allocator().reset().await;

        ledger.inject_fault(Fault::DispatchError);
        let err = executor.submit(&authorize(1), SubmitOptions::default()).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Dispatch { sequence: 4, .. }));

        let reads_before = ledger.sequence_reads();
        assert_eq!(executor.allocator().allocate().await.unwrap(), 4);
        assert_eq!(ledger.sequence_reads(), reads_before + 1);
    }

    #[tokio::test]
    async fn test_revert_is_not_an_error() {
        let (ledger, executor) = setup(SimulatedLedger::new(signer()));
        ledger.inject_fault(Fault::Revert);

        let confirmation = executor.submit(&authorize(1), SubmitOptions::default()).await.unwrap();
        assert!(!confirmation.succeeded);
        assert_eq!(executor.allocator().state().await.next_sequence, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_timeout() {
        let (ledger, executor) = setup(SimulatedLedger::new(signer()));
        ledger.inject_fault(Fault::NeverConfirm);

        let err = executor.submit(&authorize(1), SubmitOptions::default()).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Timeout { sequence: 0, .. }));
        assert_eq!(executor.allocator().state().await.next_sequence, None);
    }

    #[tokio::test]
    async fn test_allocation_failure_never_dispatches() {
        let (ledger, executor) = setup(SimulatedLedger::new(signer()));
        ledger.set_sequence_source_available(false);

        let err = executor.submit(&authorize(1), SubmitOptions::default()).await.unwrap_err();
        assert!(matches!(err, SubmissionError::Allocation(_)));
        assert!(ledger.submissions().is_empty());
    }
}
