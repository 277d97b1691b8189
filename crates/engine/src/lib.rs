//! Embedded graph engine for graphd
//!
//! This crate owns everything below the service layer:
//! - GraphDatabase: open/shutdown, directory lock, snapshot persistence
//! - Thread-affine transactions (begin, suspend, resume, finish)
//! - Nodes, relationships, property indexes, traversals
//!
//! The engine knows nothing about callers or sessions; it only knows which
//! transaction the calling thread carries.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod binding;
pub mod database;
mod index;
mod store;
pub mod transaction;
mod traversal;

pub use database::{DurabilityMode, EngineConfig, GraphDatabase, CONFIG_FILE_NAME, LOCK_FILE_NAME};
pub use index::IndexKind;
pub use store::SNAPSHOT_FILE_NAME;
pub use transaction::{Transaction, TxOutcome};
pub use traversal::RECENT_WINDOW;
