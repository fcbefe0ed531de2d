//! Error types for the transaction dispatcher

use thiserror::Error;

/// Main error type for the dispatcher
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid transaction or call arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid batch index: begin {begin}, end {end}")]
    InvalidBatchRange { begin: usize, end: usize },

    #[error("Batch file error: {0}")]
    BatchFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token definition error: {0}")]
    TokenDefinition(String),

    #[error("Macro expansion error: {0}")]
    Macro(String),

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("RPC error during {operation}: {message}")]
    Rpc { operation: String, message: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("No key found in keystore for {address}")]
    KeyNotFound { address: String },

    #[error("Wait transaction {tx_hash} mined timeout after {waited_secs}s")]
    WaitTimeout { tx_hash: String, waited_secs: u64 },
}

impl DispatchError {
    /// Check if error aborts a whole batch rather than a single row
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DispatchError::Config(_)
                | DispatchError::InvalidArguments(_)
                | DispatchError::InvalidBatchRange { .. }
                | DispatchError::BatchFile(_)
                | DispatchError::TokenDefinition(_)
        )
    }

    pub(crate) fn rpc(operation: &str, err: impl std::fmt::Display) -> Self {
        DispatchError::Rpc {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for dispatcher operations
pub type DispatchResult<T> = Result<T, DispatchError>;
