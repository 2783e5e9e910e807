//! Sequence number allocation for the signing identity
//!
//! The allocator is the single source of truth for the next sequence
//! number (nonce). Invariants:
//! - Allocations are serialized; two callers never receive the same value
//! - While cached, the value increases by exactly 1 per allocation
//! - After `reset` the next allocation re-reads the ledger

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use types::ids::Address;

use crate::ledger::{LedgerClient, LedgerError};

/// The sequence source could not be read
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sequence source unavailable for {identity}: {source}")]
pub struct AllocationError {
    pub identity: String,
    #[source]
    pub source: LedgerError,
}

/// Cached allocator state. Empty forces a ledger read on next use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceState {
    pub next_sequence: Option<u64>,
}

/// Hands out strictly increasing sequence numbers for one identity.
pub struct SequenceAllocator {
    ledger: Arc<dyn LedgerClient>,
    identity: Address,
    state: Mutex<SequenceState>,
    /// Total pending-count reads issued against the ledger.
    ledger_reads: AtomicU64,
}

impl SequenceAllocator {
    pub fn new(ledger: Arc<dyn LedgerClient>, identity: Address) -> Self {
        Self {
            ledger,
            identity,
            state: Mutex::new(SequenceState::default()),
            ledger_reads: AtomicU64::new(0),
        }
    }

    pub fn identity(&self) -> &Address {
        &self.identity
    }

    /// Return the next sequence number.
    ///
    /// The lock is held across the ledger read so concurrent callers queue
    /// behind a single fetch instead of racing to adopt the same count.
    pub async fn allocate(&self) -> Result<u64, AllocationError> {
        let mut state = self.state.lock().await;

        let next = match state.next_sequence {
            Some(next) => next,
            None => {
                self.ledger_reads.fetch_add(1, Ordering::Relaxed);
                let fetched = self
                    .ledger
                    .pending_sequence_count(&self.identity)
                    .await
                    .map_err(|source| {
                        error!(
                            identity = %self.identity,
                            error = %source,
                            "Failed to read pending sequence count"
                        );
                        AllocationError {
                            identity: self.identity.to_string(),
                            source,
                        }
                    })?;
                debug!(identity = %self.identity, sequence = fetched, "Synchronized sequence from ledger");
                fetched
            }
        };

        state.next_sequence = Some(next + 1);
        info!(identity = %self.identity, sequence = next, "Assigned sequence");
        Ok(next)
    }

    /// Forget the cached value; the next `allocate` re-reads the ledger.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.next_sequence = None;
        debug!(identity = %self.identity, "Sequence reset");
    }

    /// Snapshot of the cached state
    pub async fn state(&self) -> SequenceState {
        self.state.lock().await.clone()
    }

    /// Number of times the allocator has read the ledger
    pub fn ledger_reads(&self) -> u64 {
        self.ledger_reads.load(Ordering::Relaxed)
    }
}
