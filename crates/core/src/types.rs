//! Identifier types
//!
//! Nodes, relationships and transactions are identified by plain `u64`
//! counters wrapped in newtypes so they cannot be mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Identifier of a relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipId(pub u64);

/// Identifier of an engine transaction
///
/// Unique within one database instance. Never reused while the instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

/// Id of the reference node seeded into every fresh store
pub const REFERENCE_NODE_ID: NodeId = NodeId(0);

impl NodeId {
    /// Raw numeric id
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl RelationshipId {
    /// Raw numeric id
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel#{}", self.0)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}
