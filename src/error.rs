//! Error types for ledger operations

use thiserror::Error;

/// Fatal errors. Expected validation failures are reported through
/// [`crate::types::ValidationResult`] instead.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("UTXO pool invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Malformed coinbase: {0}")]
    MalformedCoinbase(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
