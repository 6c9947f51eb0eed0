//! Error types for the DealGrid ledger.

use thiserror::Error;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// A generated voucher code already exists in the code index.
    /// Surfaced distinctly so the caller can retry with a fresh code.
    #[error("voucher code already exists: {0}")]
    DuplicateVoucherCode(String),

    /// A write would break a data-model invariant (negative inventory,
    /// claimed set larger than total vouchers). Never clamped.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
