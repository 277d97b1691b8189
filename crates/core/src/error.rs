//! Error types for the graph engine
//!
//! This module defines the error type raised by every engine operation.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::{NodeId, RelationshipId, TxId};
use std::io;
use thiserror::Error;

/// Result type alias for engine operations
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Error types for the embedded graph engine
#[derive(Debug, Error)]
pub enum GraphError {
    /// I/O error (snapshot files, lock files, config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration file could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Node does not exist (or is not visible to the caller's transaction)
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Relationship does not exist (or is not visible to the caller's transaction)
    #[error("Relationship not found: {0}")]
    RelationshipNotFound(RelationshipId),

    /// Write attempted without a transaction bound to the calling thread
    #[error("Not in transaction: write operations require a transaction bound to the calling thread")]
    NotInTransaction,

    /// The calling thread already carries a different transaction
    #[error("Thread already carries transaction {current}; cannot resume transaction {requested}")]
    ThreadAlreadyBound {
        /// Transaction currently bound to the thread
        current: TxId,
        /// Transaction the caller attempted to resume
        requested: TxId,
    },

    /// The transaction is bound to another thread
    #[error("Transaction {0} is bound to another thread")]
    TransactionBoundElsewhere(TxId),

    /// The transaction is not bound to the calling thread
    #[error("Transaction {0} is not bound to the calling thread")]
    TransactionNotBound(TxId),

    /// The transaction has already been finished
    #[error("Transaction {0} is already finished")]
    TransactionFinished(TxId),

    /// Commit could not be applied; the transaction was rolled back
    #[error("Transaction {tx} rolled back: {reason}")]
    CommitFailed {
        /// Transaction that failed to commit
        tx: TxId,
        /// Why the commit failed
        reason: String,
    },

    /// The database has been shut down
    #[error("Database has been shut down")]
    DatabaseShutdown,

    /// Another engine instance holds the directory lock
    #[error("Database at '{0}' is already in use")]
    DatabaseLocked(String),

    /// Operation would leave the graph inconsistent
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GraphError {
    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        GraphError::InvalidInput(msg.into())
    }

    /// Create a constraint-violation error
    pub fn constraint(msg: impl Into<String>) -> Self {
        GraphError::ConstraintViolation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        GraphError::Config(msg.into())
    }

    /// True for errors that report a thread-binding conflict
    pub fn is_binding_conflict(&self) -> bool {
        matches!(
            self,
            GraphError::ThreadAlreadyBound { .. } | GraphError::TransactionBoundElsewhere(_)
        )
    }
}

impl From<rmp_serde::encode::Error> for GraphError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        GraphError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for GraphError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        GraphError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_node_not_found() {
        let err = GraphError::NodeNotFound(NodeId(42));
        let msg = err.to_string();
        assert!(msg.contains("Node not found"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn test_error_display_thread_already_bound() {
        let err = GraphError::ThreadAlreadyBound {
            current: TxId(3),
            requested: TxId(7),
        };
        let msg = err.to_string();
        assert!(msg.contains("3"));
        assert!(msg.contains("7"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err: GraphError = io_err.into();
        assert!(matches!(err, GraphError::Io(_)));
    }

    #[test]
    fn test_error_from_decode() {
        let invalid = [0xc1u8];
        let result: GraphResult<String> = rmp_serde::from_slice(&invalid).map_err(|e| e.into());
        assert!(matches!(result, Err(GraphError::Serialization(_))));
    }

    #[test]
    fn test_binding_conflict_classification() {
        assert!(GraphError::TransactionBoundElsewhere(TxId(1)).is_binding_conflict());
        assert!(GraphError::ThreadAlreadyBound {
            current: TxId(1),
            requested: TxId(2)
        }
        .is_binding_conflict());
        assert!(!GraphError::NotInTransaction.is_binding_conflict());
        assert!(!GraphError::TransactionNotBound(TxId(1)).is_binding_conflict());
    }
}
