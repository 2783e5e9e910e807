//! Audit records for exchange operations
//!
//! The sink is fire-and-forget: `record` is synchronous, returns nothing,
//! and can never fail the operation that emitted it.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use types::ids::{Address, OperationId};

/// Kind of audited event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEvent {
    ExchangeConfirmed,
    ExchangeReverted,
    /// Transport or allocation failure; ledger effect unknown
    ExchangeFailed,
    PreconditionFailed,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::ExchangeConfirmed => "EXCHANGE_CONFIRMED",
            AuditEvent::ExchangeReverted => "EXCHANGE_REVERTED",
            AuditEvent::ExchangeFailed => "EXCHANGE_FAILED",
            AuditEvent::PreconditionFailed => "PRECONDITION_FAILED",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub event: AuditEvent,
    /// Signing identity the operation ran under
    pub identity: Address,
    /// Caller as reported by the adapter
    pub caller: String,
    pub operation_id: OperationId,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
}

impl AuditRecord {
    pub fn new(event: AuditEvent, identity: Address, caller: impl Into<String>, operation_id: OperationId, details: Value) -> Self {
        Self {
            event,
            identity,
            caller: caller.into(),
            operation_id,
            timestamp: Utc::now(),
            details,
        }
    }
}

/// Destination for audit records
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Emits every record as a structured event on the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "audit",
            event_type = %record.event,
            identity = %record.identity,
            caller = %record.caller,
            operation_id = %record.operation_id,
            timestamp = %record.timestamp.to_rfc3339(),
            details = %record.details,
            "Audit record"
        );
    }
}

/// Keeps records in memory; for tests and local inspection
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.records().into_iter().map(|r| r.event).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_screaming_snake() {
        let json = serde_json::to_string(&AuditEvent::PreconditionFailed).unwrap();
        assert_eq!(json, "\"PRECONDITION_FAILED\"");
        assert_eq!(AuditEvent::ExchangeConfirmed.to_string(), "EXCHANGE_CONFIRMED");
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        let identity = Address::zero();
        for event in [AuditEvent::PreconditionFailed, AuditEvent::ExchangeConfirmed] {
            sink.record(AuditRecord::new(
                event,
                identity.clone(),
                "anonymous",
                OperationId::new(),
                serde_json::json!({}),
            ));
        }
        assert_eq!(
            sink.events(),
            vec![AuditEvent::PreconditionFailed, AuditEvent::ExchangeConfirmed]
        );
        assert_eq!(sink.records()[0].caller, "anonymous");
    }
}
