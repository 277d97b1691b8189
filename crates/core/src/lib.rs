//! Core types for graphd
//!
//! This crate defines the foundational types used throughout the system:
//! - NodeId, RelationshipId, TxId: identifier newtypes
//! - PropertyValue / Properties: entity property model
//! - Node, Relationship, Direction: detached graph records
//! - TraversalDescription: traversal order, uniqueness and expansion filters
//! - GraphError: engine error type

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod graph;
pub mod traversal;
pub mod types;
pub mod value;

pub use error::{GraphError, GraphResult};
pub use graph::{Direction, Node, Relationship};
pub use traversal::{Order, TraversalDescription, Uniqueness};
pub use types::{NodeId, RelationshipId, TxId, REFERENCE_NODE_ID};
pub use value::{Properties, PropertyValue};
