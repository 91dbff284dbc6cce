//! Error types for node inventory and mutation calls.

use thiserror::Error;

/// Result type alias for inventory and store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while reading or writing node state.
#[derive(Debug, Error)]
pub enum StateError {
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

    #[error("node not found: {0}")]
    NotFound(String),

    /// The node changed since its fingerprint was read.
    #[error("fingerprint conflict on {node}: expected {expected}, found {actual}")]
    Conflict {
        node: String,
        expected: String,
        actual: String,
    },

    #[error("transport error: {0}")]
    Transport(String),
}

impl StateError {
    /// Whether this error is an optimistic-concurrency rejection.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StateError::Conflict { .. })
    }
}
