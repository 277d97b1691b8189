//! Traversal descriptions
//!
//! A traversal starts at one node and expands paths along relationships.
//! The description selects the expansion order, which relationships may be
//! followed, and the uniqueness policy that decides when a path is pruned.

use crate::graph::Direction;
use serde::{Deserialize, Serialize};

/// Expansion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Order {
    /// Visit all paths of length n before any path of length n+1
    #[default]
    BreadthFirst,
    /// Follow each branch to its end before backtracking
    DepthFirst,
}

/// Uniqueness policy applied to every newly expanded path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Uniqueness {
    /// No pruning; requires a max depth
    None,
    /// A node is visited at most once per traversal
    #[default]
    NodeGlobal,
    /// A node is not revisited while it is among the recently visited ones
    NodeRecent,
    /// A node appears at most once within a single path
    NodePath,
    /// A relationship is followed at most once per traversal
    RelationshipGlobal,
    /// A relationship is not refollowed while recently followed
    RelationshipRecent,
    /// A relationship appears at most once within a single path
    RelationshipPath,
}

/// Full traversal description
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TraversalDescription {
    /// Expansion order
    pub order: Order,
    /// Uniqueness policy
    pub uniqueness: Uniqueness,
    /// Relationship types to follow and their direction.
    /// Empty means every relationship in both directions.
    pub relationships: Vec<(String, Direction)>,
    /// Maximum path length, in relationships
    pub max_depth: Option<usize>,
}

impl TraversalDescription {
    /// Breadth-first, node-global traversal over every relationship
    pub fn new() -> Self {
        Self::default()
    }

    /// Use breadth-first order
    pub fn breadth_first(mut self) -> Self {
        self.order = Order::BreadthFirst;
        self
    }

    /// Use depth-first order
    pub fn depth_first(mut self) -> Self {
        self.order = Order::DepthFirst;
        self
    }

    /// Set the uniqueness policy
    pub fn uniqueness(mut self, uniqueness: Uniqueness) -> Self {
        self.uniqueness = uniqueness;
        self
    }

    /// Follow relationships of `rel_type` in `direction`
    pub fn relationships(mut self, rel_type: impl Into<String>, direction: Direction) -> Self {
        self.relationships.push((rel_type.into(), direction));
        self
    }

    /// Limit path length
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}
