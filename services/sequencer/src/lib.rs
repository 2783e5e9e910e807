//! Transaction sequencing and submission core
//!
//! Assigns strictly increasing sequence numbers to operations from a single
//! signing identity, checks reserves and balances before submitting, and
//! chains authorize-then-act submissions into one logical operation.
//!
//! # Modules
//! - `ledger`: `LedgerClient` trait, JSON-RPC and simulated implementations
//! - `sequence`: `SequenceAllocator`
//! - `executor`: `SubmissionExecutor`
//! - `reserve`: `ReserveVerifier`
//! - `orchestrator`: `ExchangeOrchestrator`
//! - `audit`: audit records and sinks
//! - `config`: core and ledger configuration

pub mod audit;
pub mod config;
pub mod executor;
pub mod ledger;
pub mod orchestrator;
pub mod reserve;
pub mod sequence;

pub use audit::{AuditEvent, AuditRecord, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use config::{RpcConfig, SequencerConfig};
pub use executor::{SubmissionError, SubmissionExecutor};
pub use ledger::{LedgerClient, LedgerError, RpcLedger, SimulatedLedger};
pub use orchestrator::{ExchangeOrchestrator, ExchangeRequest};
pub use reserve::ReserveVerifier;
pub use sequence::{AllocationError, SequenceAllocator};
