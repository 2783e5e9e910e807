//! End-to-end scenarios for the exchange orchestrator
//!
//! Every scenario runs against the simulated ledger, which records each
//! accepted submission so order and count can be asserted.

use std::collections::BTreeSet;
use std::sync::Arc;

use sequencer::ledger::{Fault, LedgerOperation, SimulatedLedger};
use sequencer::{AuditEvent, ExchangeOrchestrator, MemoryAuditSink, SequencerConfig};
use types::errors::{AmountError, ExchangeError};
use types::exchange::{Direction, Outcome, Stage};
use types::ids::Address;
use types::numeric::{Asset, AssetAmount, Rate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn signer() -> Address {
    Address::parse("0x00000000000000000000000000000000000000a1").unwrap()
}

fn whole(asset: Asset, n: u128) -> AssetAmount {
    AssetAmount::from_units(asset, n * asset.unit())
}

/// 2000 stable per native, 1000 stable held, no prior authorization
fn native_market(native_reserve: AssetAmount) -> SimulatedLedger {
    SimulatedLedger::new(signer())
        .with_price(Asset::NATIVE, Rate::new(2000, 1).unwrap())
        .with_price(Asset::CUSTOM, Rate::new(6, 5).unwrap())
        .with_reserve(native_reserve)
        .with_reserve(whole(Asset::STABLE, 1_000_000))
        .with_reserve(whole(Asset::CUSTOM, 1_000_000))
        .with_balance(&signer(), whole(Asset::STABLE, 1000))
        .with_balance(&signer(), whole(Asset::NATIVE, 10))
}

fn orchestrator(ledger: SimulatedLedger) -> (Arc<SimulatedLedger>, Arc<MemoryAuditSink>, ExchangeOrchestrator) {
    init_tracing();
    let ledger = Arc::new(ledger);
    let audit = Arc::new(MemoryAuditSink::new());
    let orchestrator = ExchangeOrchestrator::new(ledger.clone(), audit.clone(), SequencerConfig::default());
    (ledger, audit, orchestrator)
}

#[tokio::test]
async fn buy_native_authorizes_then_acts() {
    let (ledger, audit, orchestrator) = orchestrator(native_market(whole(Asset::NATIVE, 1)));

    let quote = orchestrator.quote(Direction::BuyNative, "120").await.unwrap();
    let receipt = orchestrator.buy_native_with_stable("120", "0xcaller").await.unwrap();

    assert_eq!(receipt.outcome, Outcome::Confirmed);
    assert_eq!(receipt.expected_output, quote.output_amount);
    assert_eq!(receipt.expected_output.to_string(), "0.06");
    assert_eq!(receipt.realized_output, Some(receipt.expected_output));
    assert!(receipt.authorization_id.is_some());

    let submissions = ledger.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(
        submissions[0].operation,
        LedgerOperation::Authorize {
            amount: whole(Asset::STABLE, 120)
        }
    );
    assert_eq!(
        submissions[1].operation,
        LedgerOperation::Exchange {
            direction: Direction::BuyNative,
            amount: whole(Asset::STABLE, 120)
        }
    );
    assert_eq!(submissions[0].sequence, 0);
    assert_eq!(submissions[1].sequence, 1);
    assert_eq!(submissions[1].options.resource_limit, Some(300_000));
    assert_eq!(audit.events(), vec![AuditEvent::ExchangeConfirmed]);
}

#[tokio::test]
async fn short_reserve_submits_nothing() {
    // 120 stable buys 0.06 native; the exchange holds 0.05
    let reserve = AssetAmount::from_units(Asset::NATIVE, 5 * 10u128.pow(16));
    let (ledger, audit, orchestrator) = orchestrator(native_market(reserve));

    let err = orchestrator.buy_native_with_stable("120", "anonymous").await.unwrap_err();

    assert!(matches!(err, ExchangeError::InsufficientReserve { asset: Asset::NATIVE, .. }));
    assert_eq!(err.outcome(), Outcome::PreconditionFailed);
    assert!(ledger.submissions().is_empty());
    assert_eq!(ledger.sequence_reads(), 0);
    assert_eq!(audit.events(), vec![AuditEvent::PreconditionFailed]);
}

#[tokio::test]
async fn empty_stable_reserve_submits_nothing() {
    let ledger = native_market(whole(Asset::NATIVE, 1)).with_reserve(AssetAmount::zero(Asset::STABLE));
    let (ledger, audit, orchestrator) = orchestrator(ledger);

    // 1 wei of native floors to zero stable
    let err = orchestrator
        .sell_native_for_stable("0.000000000000000001", "anonymous")
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::InvalidAmount(AmountError::ZeroOutput { .. })));
    assert_eq!(err.outcome(), Outcome::PreconditionFailed);

    let err = orchestrator.sell_native_for_stable("0.5", "anonymous").await.unwrap_err();
    assert!(matches!(err, ExchangeError::InsufficientReserve { asset: Asset::STABLE, .. }));

    assert!(ledger.submissions().is_empty());
    assert_eq!(ledger.sequence_reads(), 0);
    assert_eq!(
        audit.events(),
        vec![AuditEvent::PreconditionFailed, AuditEvent::PreconditionFailed]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queued_operation_cannot_spend_the_same_balance() {
    // 1000 stable held; two requests for 600 each
    let (ledger, _audit, orchestrator) = orchestrator(native_market(whole(Asset::NATIVE, 1)));
    let orchestrator = Arc::new(orchestrator);

    let spawn = |orchestrator: Arc<ExchangeOrchestrator>| {
        tokio::spawn(async move { orchestrator.convert_stable_for_custom("600", "anonymous").await })
    };
    let first = spawn(Arc::clone(&orchestrator));
    let second = spawn(Arc::clone(&orchestrator));
    let results = [first.await.unwrap(), second.await.unwrap()];

    let confirmed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(confirmed, 1);
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(ExchangeError::InsufficientBalance { asset: Asset::STABLE, .. })))
        .count();
    assert_eq!(refused, 1);

    // Only the winner's authorization and action reached the ledger
    let submissions = ledger.submissions();
    assert_eq!(submissions.len(), 2);
    assert!(matches!(submissions[0].operation, LedgerOperation::Authorize { .. }));
    assert!(matches!(submissions[1].operation, LedgerOperation::Exchange { .. }));
}

#[tokio::test]
async fn action_revert_resynchronizes_allocator() {
    let ledger = native_market(whole(Asset::NATIVE, 1)).with_authorization(&signer(), whole(Asset::STABLE, 500));
    let (ledger, audit, orchestrator) = orchestrator(ledger);
    ledger.inject_fault(Fault::Revert);

    let err = orchestrator.buy_native_with_stable("120", "anonymous").await.unwrap_err();

    assert!(matches!(err, ExchangeError::Reverted { stage: Stage::Action, .. }));
    assert_eq!(err.outcome(), Outcome::Reverted);
    assert!(err.is_retry_safe());
    assert_eq!(ledger.submissions().len(), 1);
    assert_eq!(audit.events(), vec![AuditEvent::ExchangeReverted]);

    // The next allocation reads the ledger instead of continuing locally
    let allocator = orchestrator.allocator();
    assert_eq!(allocator.state().await.next_sequence, None);
    let reads_before = ledger.sequence_reads();
    assert_eq!(allocator.allocate().await.unwrap(), 1);
    assert_eq!(ledger.sequence_reads(), reads_before + 1);
}

#[tokio::test(start_paused = true)]
async fn confirmation_timeout_is_transport_failure() {
    let (ledger, audit, orchestrator) = orchestrator(native_market(whole(Asset::NATIVE, 1)));
    ledger.inject_fault(Fault::NeverConfirm);

    let err = orchestrator.sell_native_for_stable("0.5", "anonymous").await.unwrap_err();

    // Only the reported status is asserted; the ledger effect is unknown
    assert!(matches!(err, ExchangeError::TransportFailed { stage: Stage::Action, .. }));
    assert_eq!(err.outcome(), Outcome::TransportFailed);
    assert!(!err.is_retry_safe());
    assert_eq!(orchestrator.allocator().state().await.next_sequence, None);
    assert_eq!(audit.events(), vec![AuditEvent::ExchangeFailed]);
}

#[tokio::test]
async fn invalid_amounts_never_reach_the_ledger() {
    let (ledger, audit, orchestrator) = orchestrator(native_market(whole(Asset::NATIVE, 1)));

    for (input, check) in [
        ("0", "non-positive"),
        ("-5", "non-positive"),
        ("", "empty"),
        ("abc", "malformed"),
        ("0.0000001", "too precise"),
    ] {
        let err = orchestrator.buy_native_with_stable(input, "anonymous").await.unwrap_err();
        let matched = match check {
            "non-positive" => matches!(err, ExchangeError::InvalidAmount(AmountError::NonPositive(_))),
            "empty" => matches!(err, ExchangeError::InvalidAmount(AmountError::Empty)),
            "malformed" => matches!(err, ExchangeError::InvalidAmount(AmountError::Malformed(_))),
            _ => matches!(err, ExchangeError::InvalidAmount(AmountError::TooPrecise { .. })),
        };
        assert!(matched, "{input:?} gave {err:?}");
        assert_eq!(err.outcome(), Outcome::PreconditionFailed);
    }

    assert_eq!(ledger.queries(), 0);
    assert_eq!(ledger.sequence_reads(), 0);
    assert_eq!(audit.events().len(), 5);
}

#[tokio::test]
async fn authorization_revert_stops_before_action() {
    let (ledger, _audit, orchestrator) = orchestrator(native_market(whole(Asset::NATIVE, 1)));
    ledger.inject_fault(Fault::Revert);

    let err = orchestrator.buy_native_with_stable("120", "anonymous").await.unwrap_err();

    assert!(matches!(err, ExchangeError::Reverted { stage: Stage::Authorization, .. }));
    let submissions = ledger.submissions();
    assert_eq!(submissions.len(), 1);
    assert!(matches!(submissions[0].operation, LedgerOperation::Authorize { .. }));
}

#[tokio::test]
async fn authorization_dispatch_failure_is_transport_failure() {
    let (ledger, _audit, orchestrator) = orchestrator(native_market(whole(Asset::NATIVE, 1)));
    ledger.inject_fault(Fault::DispatchError);

    let err = orchestrator.convert_stable_for_custom("12", "anonymous").await.unwrap_err();

    assert!(matches!(err, ExchangeError::TransportFailed { stage: Stage::Authorization, .. }));
    assert!(ledger.submissions().is_empty());
    assert_eq!(orchestrator.allocator().state().await.next_sequence, None);

    // A caller-initiated retry starts over and succeeds
    let receipt = orchestrator.convert_stable_for_custom("12", "anonymous").await.unwrap();
    assert_eq!(receipt.expected_output.to_string(), "10");
    assert_eq!(ledger.submissions().len(), 2);
}

#[tokio::test]
async fn unreachable_sequence_source_is_allocation_error() {
    let (ledger, audit, orchestrator) = orchestrator(native_market(whole(Asset::NATIVE, 1)));
    ledger.set_sequence_source_available(false);

    let err = orchestrator.sell_native_for_stable("1", "anonymous").await.unwrap_err();

    assert!(matches!(err, ExchangeError::Allocation { .. }));
    assert_eq!(err.code(), "SEQUENCE_UNAVAILABLE");
    assert!(ledger.submissions().is_empty());
    assert_eq!(audit.events(), vec![AuditEvent::ExchangeFailed]);
}

#[tokio::test]
async fn rate_move_during_confirmation_is_reported() {
    let (ledger, audit, orchestrator) = orchestrator(native_market(whole(Asset::NATIVE, 1)));
    ledger.move_price_before_next_confirmation(Asset::NATIVE, Rate::new(1900, 1).unwrap());

    let receipt = orchestrator.sell_native_for_stable("0.5", "anonymous").await.unwrap();

    assert_eq!(receipt.outcome, Outcome::Confirmed);
    assert_eq!(receipt.expected_output, whole(Asset::STABLE, 1000));
    assert_eq!(receipt.realized_output, Some(whole(Asset::STABLE, 950)));
    assert!(receipt.diverged);
    assert_eq!(audit.events(), vec![AuditEvent::ExchangeConfirmed]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_operations_never_interleave() {
    let ledger = native_market(whole(Asset::NATIVE, 1)).with_balance(&signer(), whole(Asset::STABLE, 10_000));
    let (ledger, _audit, orchestrator) = orchestrator(ledger);
    let orchestrator = Arc::new(orchestrator);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.convert_stable_for_custom("12", "anonymous").await })
        })
        .collect();

    for handle in handles {
        let receipt = handle.await.unwrap().unwrap();
        assert_eq!(receipt.outcome, Outcome::Confirmed);
    }

    let submissions = ledger.submissions();
    assert_eq!(submissions.len(), 16);

    let sequences: BTreeSet<u64> = submissions.iter().map(|s| s.sequence).collect();
    assert_eq!(sequences, (0..16).collect::<BTreeSet<u64>>());

    // Each authorization is immediately followed by its own action
    for pair in submissions.chunks(2) {
        assert!(matches!(pair[0].operation, LedgerOperation::Authorize { .. }));
        assert!(matches!(pair[1].operation, LedgerOperation::Exchange { .. }));
    }
}
