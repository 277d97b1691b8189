//! Caller identity and permission context.
//!
//! A [`CallerId`] names one logical connection for its whole lifetime. The
//! registry keys sessions by it, so ids are random (uuid v4) and never
//! reused. A [`CallerContext`] carries what the caller may do.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identity of one bound caller channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallerId(Uuid);

impl CallerId {
    /// Mint a fresh identity
    pub fn new() -> Self {
        CallerId(Uuid::new_v4())
    }

    /// Wrap an existing uuid
    pub fn from_uuid(uuid: Uuid) -> Self {
        CallerId(uuid)
    }

    /// Underlying uuid
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CallerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caller:{}", self.0)
    }
}

/// Controls whether a caller may mutate data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessMode {
    /// Reads and writes (default)
    #[default]
    ReadWrite,
    /// Read-only: every write call fails with `PermissionDenied`
    ReadOnly,
}

/// Permissions a caller presents when opening a database
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallerContext {
    /// Who the caller says it is (diagnostics only)
    pub principal: Option<String>,
    /// What the caller may do
    pub access_mode: AccessMode,
}

impl CallerContext {
    /// Context with full access
    pub fn read_write() -> Self {
        Self::default()
    }

    /// Context limited to reads
    pub fn read_only() -> Self {
        Self {
            principal: None,
            access_mode: AccessMode::ReadOnly,
        }
    }

    /// Attach a principal name
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Whether write calls are allowed
    pub fn can_write(&self) -> bool {
        self.access_mode == AccessMode::ReadWrite
    }
}
