//! Types library for the exchange gateway
//!
//! Core type definitions shared by the sequencing core and the HTTP
//! adapter. Pure data: no I/O, no async.
//!
//! # Modules
//! - `ids`: Identifiers (OperationId, Address, ConfirmationId)
//! - `numeric`: Fixed-point asset amounts and rational rates
//! - `exchange`: Directions, quotes, reserve checks, outcomes, receipts
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod exchange;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::exchange::*;
    pub use crate::errors::*;
}
