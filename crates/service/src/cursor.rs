//! Remote cursors over query results
//!
//! Results are materialized inside the call envelope, so a cursor never
//! holds a transaction binding or a lock. Pulling past the end is an error
//! reported with the cursor's own code, as callers on the far side of the
//! boundary expect.

use crate::error::{CallError, CallResult, ErrorCode};
use graphd_core::{Node, Relationship};
use std::collections::VecDeque;

/// Cursor over nodes
#[derive(Debug, Clone, Default)]
pub struct NodeCursor {
    items: VecDeque<Node>,
}

impl NodeCursor {
    pub(crate) fn new(items: Vec<Node>) -> Self {
        Self {
            items: items.into(),
        }
    }

    /// Whether another node is available
    pub fn has_next(&self) -> bool {
        !self.items.is_empty()
    }

    /// Nodes not yet pulled
    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    /// Pull the next node
    pub fn next_node(&mut self) -> CallResult<Node> {
        self.items
            .pop_front()
            .ok_or_else(|| CallError::new(ErrorCode::NodeIterator, "no more nodes"))
    }
}

impl Iterator for NodeCursor {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        self.items.pop_front()
    }
}

/// Cursor over relationships
#[derive(Debug, Clone, Default)]
pub struct RelationshipCursor {
    items: VecDeque<Relationship>,
}

impl RelationshipCursor {
    pub(crate) fn new(items: Vec<Relationship>) -> Self {
        Self {
            items: items.into(),
        }
    }

    /// Whether another relationship is available
    pub fn has_next(&self) -> bool {
        !self.items.is_empty()
    }

    /// Relationships not yet pulled
    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    /// Pull the next relationship
    pub fn next_relationship(&mut self) -> CallResult<Relationship> {
        self.items.pop_front().ok_or_else(|| {
            CallError::new(ErrorCode::RelationshipIterator, "no more relationships")
        })
    }
}

impl Iterator for RelationshipCursor {
    type Item = Relationship;

    fn next(&mut self) -> Option<Relationship> {
        self.items.pop_front()
    }
}
