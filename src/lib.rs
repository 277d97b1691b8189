//! graphd - embedded transactional graph database served to many callers
//!
//! graphd wraps a thread-affine graph engine so that many remote callers can
//! each hold one long-lived transaction while their individual calls land on
//! arbitrary worker threads.
//!
//! # Quick Start
//!
//! ```ignore
//! use graphd::{CallerContext, GraphService, Properties, ServiceConfig};
//!
//! let service = GraphService::activate(ServiceConfig::new("/var/lib/graphd"))?;
//! let db = service.open_or_create("social", CallerContext::read_write())?;
//!
//! db.begin_tx()?;
//! let alice = db.create_node(Properties::new())?;
//! db.tx_success()?;
//! db.tx_finish()?;
//! ```
//!
//! # Architecture
//!
//! - `graphd-core`: identifiers, properties, graph records, errors
//! - `graphd-engine`: the embedded database and its transactions
//! - `graphd-service`: session registry, database cache, call envelope, reaper

pub use graphd_core::*;
pub use graphd_engine::{DurabilityMode, EngineConfig, GraphDatabase, IndexKind, Transaction, TxOutcome};
pub use graphd_service::*;
