//! Multi-caller service layer for graphd
//!
//! Serves embedded graph databases to many concurrent callers:
//! - SessionRegistry: caller identity to in-flight transaction, moved onto
//!   whichever thread services the caller's current call
//! - DatabaseCache: name-keyed engine instances, reopened transparently
//! - DbHandle: the per-call envelope (permission check, resume, suspend)
//! - Reaper: terminates sessions abandoned by their callers
//! - GraphService: owns all of the above for the life of the process

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod access;
pub mod cache;
pub mod config;
pub mod cursor;
pub mod error;
pub mod export;
pub mod handle;
pub mod reaper;
pub mod service;
pub mod session;

pub use access::{AccessMode, CallerContext, CallerId};
pub use cache::{validate_name, DatabaseCache};
pub use config::ServiceConfig;
pub use cursor::{NodeCursor, RelationshipCursor};
pub use error::{CacheError, CallError, CallResult, ErrorCode, SessionError};
pub use export::{ExportInfo, ExportManifest, EXPORT_EXTENSION, MANIFEST_FILE_NAME};
pub use handle::DbHandle;
pub use reaper::{sweep, Reaper, REAPER_THREAD_NAME};
pub use service::GraphService;
pub use session::{SessionInfo, SessionRegistry, MAX_OPERATION_LOG};
