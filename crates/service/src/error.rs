//! Error types for the service layer.
//!
//! Inside the service, each component reports its own enum:
//! - [`SessionError`] from the session registry
//! - [`CacheError`] from the database cache
//! - [`GraphError`] from the engine
//!
//! Nothing crosses the call boundary except [`CallError`]: a stable numeric
//! [`ErrorCode`] plus a human-readable message. Every public call on a
//! [`DbHandle`](crate::DbHandle) or [`GraphService`](crate::GraphService)
//! returns [`CallResult`].

use crate::access::CallerId;
use graphd_core::GraphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for calls crossing the service boundary
pub type CallResult<T> = Result<T, CallError>;

/// Result type for session registry operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for database cache operations
pub type CacheResult<T> = Result<T, CacheError>;

// ============================================================================
// Boundary error
// ============================================================================

/// Stable error codes reported to callers.
///
/// The numeric values are part of the wire contract and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ErrorCode {
    /// Session protocol or engine failure
    Transaction = 1,
    /// Database name missing, empty or malformed
    MissingDatabaseName = 2,
    /// Database could not be opened or created
    OpenCreateDatabase = 3,
    /// Node cursor pulled past its end
    NodeIterator = 4,
    /// Relationship cursor pulled past its end
    RelationshipIterator = 5,
    /// Caller lacks write capability
    PermissionDenied = 6,
    /// Storage-level failure (delete, export, list)
    Storage = 7,
}

impl ErrorCode {
    /// Numeric value of the code
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Name of the code as shown in messages
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Transaction => "TRANSACTION",
            ErrorCode::MissingDatabaseName => "MISSING_DATABASE_NAME",
            ErrorCode::OpenCreateDatabase => "OPEN_CREATE_DATABASE",
            ErrorCode::NodeIterator => "NODE_ITERATOR",
            ErrorCode::RelationshipIterator => "RELATIONSHIP_ITERATOR",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::Storage => "STORAGE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.as_u32())
    }
}

/// Structured error handed back across the call boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct CallError {
    /// Error category
    pub code: ErrorCode,
    /// Human-readable detail
    pub message: String,
}

impl CallError {
    /// Create a new boundary error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// `Transaction` error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transaction, message)
    }

    /// `PermissionDenied` error
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }
}

impl From<GraphError> for CallError {
    fn from(e: GraphError) -> Self {
        CallError::transaction(e.to_string())
    }
}

impl From<SessionError> for CallError {
    fn from(e: SessionError) -> Self {
        CallError::transaction(e.to_string())
    }
}

impl From<CacheError> for CallError {
    fn from(e: CacheError) -> Self {
        let code = match &e {
            CacheError::EmptyName | CacheError::InvalidName(_) => ErrorCode::MissingDatabaseName,
            CacheError::Open { .. } => ErrorCode::OpenCreateDatabase,
            CacheError::Io(_) | CacheError::Archive(_) => ErrorCode::Storage,
        };
        CallError::new(code, e.to_string())
    }
}

// ============================================================================
// Session registry
// ============================================================================

/// Errors from the session registry
#[derive(Debug, Error)]
pub enum SessionError {
    /// `begin` for a caller that already has a session
    #[error("caller {0} already has an associated transaction")]
    AlreadyAssociated(CallerId),

    /// Operation needs a session and the caller has none
    #[error("caller {0} has no associated transaction")]
    NoAssociatedSession(CallerId),

    /// The engine refused to bind the transaction to this thread
    #[error("transaction of caller {caller} cannot be bound to this thread: {source}")]
    AlreadyBoundElsewhere {
        /// Caller whose transaction was being resumed
        caller: CallerId,
        /// Engine-level binding error
        source: GraphError,
    },

    /// Any other engine failure
    #[error(transparent)]
    Engine(#[from] GraphError),
}

impl SessionError {
    /// Classify an engine error raised while binding `caller`'s transaction
    pub(crate) fn from_binding(caller: CallerId, e: GraphError) -> Self {
        if e.is_binding_conflict() {
            SessionError::AlreadyBoundElsewhere { caller, source: e }
        } else {
            SessionError::Engine(e)
        }
    }
}

// ============================================================================
// Database cache
// ============================================================================

/// Errors from the database cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// Database name is empty
    #[error("database name is empty")]
    EmptyName,

    /// Database name cannot map to a storage location
    #[error("invalid database name '{0}'")]
    InvalidName(String),

    /// Engine failed to open or create the database
    #[error("failed to open database '{name}': {source}")]
    Open {
        /// Database name
        name: String,
        /// Engine error
        source: GraphError,
    },

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Export archive could not be built
    #[error("archive error: {0}")]
    Archive(String),
}

impl CacheError {
    pub(crate) fn archive(msg: impl Into<String>) -> Self {
        CacheError::Archive(msg.into())
    }
}
