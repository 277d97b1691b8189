//! Graph entity records as seen by callers
//!
//! These are detached copies: mutating a `Node` does not touch the store.
//! Writes go through the engine (`create_node`, `set_node_properties`, ...).

use crate::types::{NodeId, RelationshipId};
use crate::value::{Properties, PropertyValue};
use serde::{Deserialize, Serialize};

/// Direction of a relationship relative to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Relationships starting at the node
    Outgoing,
    /// Relationships ending at the node
    Incoming,
    /// Either way
    Both,
}

/// A node and its properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node id
    pub id: NodeId,
    /// Property map
    pub properties: Properties,
}

impl Node {
    /// Property lookup
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

/// A typed, directed relationship between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Relationship id
    pub id: RelationshipId,
    /// Start node
    pub start: NodeId,
    /// End node
    pub end: NodeId,
    /// Relationship type name
    pub rel_type: String,
    /// Property map
    pub properties: Properties,
}

impl Relationship {
    /// Property lookup
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// The node on the other side of `node`, if `node` is an endpoint
    pub fn other_node(&self, node: NodeId) -> Option<NodeId> {
        if node == self.start {
            Some(self.end)
        } else if node == self.end {
            Some(self.start)
        } else {
            None
        }
    }
}
