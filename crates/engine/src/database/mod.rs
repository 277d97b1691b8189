//! GraphDatabase struct and open/shutdown logic
//!
//! This module provides the main GraphDatabase struct that orchestrates:
//! - Directory, config and lock-file initialization
//! - Snapshot loading on startup
//! - Thread-affine transactions
//! - Graph, index and traversal operations
//!
//! ## Transactions and threads
//!
//! A transaction belongs to whichever thread currently holds it.
//! `begin_tx()` binds the new transaction to the calling thread; every graph
//! operation then runs inside the transaction bound to the calling thread.
//! Reads with no bound transaction see the last committed state; writes
//! with no bound transaction fail with `NotInTransaction`.
//!
//! Isolation is read-committed: a transaction reads committed state until
//! its first write, after which it reads its own private working copy.

pub mod config;

pub use config::{DurabilityMode, EngineConfig, CONFIG_FILE_NAME};

use crate::binding::ThreadBindings;
use crate::index::IndexKind;
use crate::store::{self, GraphState, Mutation};
use crate::transaction::{Transaction, TxInner};
use crate::traversal;
use dashmap::DashMap;
use graphd_core::{
    GraphError, GraphResult, Node, NodeId, Properties, PropertyValue, Relationship,
    RelationshipId, TraversalDescription, TxId, REFERENCE_NODE_ID,
};
use parking_lot::{Mutex, RwLock};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lock file name placed in the database data directory.
pub const LOCK_FILE_NAME: &str = ".lock";

// ============================================================================
// Database Struct
// ============================================================================

/// Embedded graph database
///
/// Create one by calling `GraphDatabase::open()`. The returned `Arc` is the
/// only way to reach the instance; when the last `Arc` (including those held
/// by live transaction handles) is dropped, the directory lock is released.
///
/// # Example
///
/// ```text
/// let db = GraphDatabase::open("/path/to/graph")?;
/// let tx = db.begin_tx()?;
/// let alice = db.create_node(props)?;
/// tx.success()?;
/// tx.finish()?;
/// ```
pub struct GraphDatabase {
    /// Data directory path (empty for in-memory databases)
    data_dir: PathBuf,

    /// Last committed graph
    committed: RwLock<GraphState>,

    /// Thread-to-transaction bindings
    bindings: ThreadBindings,

    /// Transactions that have begun and not finished
    active: DashMap<TxId, Arc<TxInner>>,

    next_node_id: AtomicU64,
    next_relationship_id: AtomicU64,
    next_tx_id: AtomicU64,

    /// Configuration as read from `graphd.toml`
    config: EngineConfig,

    durability_mode: DurabilityMode,

    /// Cleared by `shutdown()`; every call afterwards fails
    accepting: AtomicBool,

    /// Exclusive directory lock, released on shutdown or drop.
    /// None for in-memory databases.
    lock_file: Mutex<Option<File>>,
}

impl GraphDatabase {
    /// Open the database at `path`, creating it if needed.
    ///
    /// Reads `graphd.toml` from the data directory; if no config file
    /// exists, one is created with defaults.
    ///
    /// # Errors
    ///
    /// - Config is invalid
    /// - Directory or lock file cannot be created
    /// - Another instance holds the directory lock (`DatabaseLocked`)
    /// - The snapshot cannot be decoded
    pub fn open<P: AsRef<Path>>(path: P) -> GraphResult<Arc<Self>> {
        Self::open_internal(path.as_ref(), None)
    }

    /// Open the database at `path` with an explicit configuration.
    ///
    /// The supplied config is written to `graphd.toml` so that subsequent
    /// `open()` calls pick up the same settings.
    pub fn open_with_config<P: AsRef<Path>>(path: P, cfg: EngineConfig) -> GraphResult<Arc<Self>> {
        Self::open_internal(path.as_ref(), Some(cfg))
    }

    fn open_internal(path: &Path, explicit: Option<EngineConfig>) -> GraphResult<Arc<Self>> {
        if let Some(cfg) = &explicit {
            cfg.durability_mode()?;
        }
        std::fs::create_dir_all(path)?;
        let canonical_path = path.canonicalize()?;

        // Nothing in the directory is touched before the lock is held.
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(canonical_path.join(LOCK_FILE_NAME))?;
        fs2::FileExt::try_lock_exclusive(&lock_file)
            .map_err(|_| GraphError::DatabaseLocked(canonical_path.display().to_string()))?;

        let config_path = canonical_path.join(CONFIG_FILE_NAME);
        let cfg = match explicit {
            Some(cfg) => {
                cfg.write_to_file(&config_path)?;
                cfg
            }
            None => {
                EngineConfig::write_default_if_missing(&config_path)?;
                EngineConfig::from_file(&config_path)?
            }
        };
        let durability_mode = cfg.durability_mode()?;

        let (state, next_node_id, next_relationship_id) =
            match store::load_snapshot(&canonical_path)? {
                Some(snapshot) => {
                    // Counters must stay ahead of every stored id.
                    let next_node = snapshot
                        .next_node_id
                        .max(snapshot.state.max_node_id().map_or(0, |id| id + 1));
                    let next_rel = snapshot
                        .next_relationship_id
                        .max(snapshot.state.max_relationship_id().map_or(0, |id| id + 1));
                    (snapshot.state, next_node, next_rel)
                }
                None => {
                    let state = GraphState::seeded();
                    let next_node = REFERENCE_NODE_ID.as_u64() + 1;
                    store::write_snapshot(
                        &canonical_path,
                        &state,
                        next_node,
                        0,
                        durability_mode.syncs(),
                    )?;
                    info!(target: "graphd::db", path = ?canonical_path, "Created new graph store");
                    (state, next_node, 0)
                }
            };

        info!(
            target: "graphd::db",
            path = ?canonical_path,
            nodes = state.node_count(),
            durability = ?durability_mode,
            "Database opened"
        );

        Ok(Arc::new(Self {
            data_dir: canonical_path,
            committed: RwLock::new(state),
            bindings: ThreadBindings::new(),
            active: DashMap::new(),
            next_node_id: AtomicU64::new(next_node_id),
            next_relationship_id: AtomicU64::new(next_relationship_id),
            next_tx_id: AtomicU64::new(1),
            config: cfg,
            durability_mode,
            accepting: AtomicBool::new(true),
            lock_file: Mutex::new(Some(lock_file)),
        }))
    }

    /// Create a database with no disk I/O
    ///
    /// Nothing is persisted; all data is lost when the last `Arc` drops.
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self {
            data_dir: PathBuf::new(),
            committed: RwLock::new(GraphState::seeded()),
            bindings: ThreadBindings::new(),
            active: DashMap::new(),
            next_node_id: AtomicU64::new(REFERENCE_NODE_ID.as_u64() + 1),
            next_relationship_id: AtomicU64::new(0),
            next_tx_id: AtomicU64::new(1),
            config: EngineConfig::default(),
            durability_mode: DurabilityMode::Standard,
            accepting: AtomicBool::new(true),
            lock_file: Mutex::new(None),
        })
    }

    // ========================================================================
    // Lifecycle & accessors
    // ========================================================================

    /// Stop accepting calls and release the directory lock. Idempotent.
    ///
    /// Transactions still open afterwards can only roll back.
    pub fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return;
        }
        self.release_lock();
        info!(
            target: "graphd::db",
            path = ?self.data_dir,
            open_transactions = self.active.len(),
            "Database shut down"
        );
    }

    /// Unlock and close the directory lock file, if held
    fn release_lock(&self) {
        if let Some(file) = self.lock_file.lock().take() {
            if let Err(e) = fs2::FileExt::unlock(&file) {
                warn!(target: "graphd::db", error = %e, "Failed to release directory lock");
            }
        }
    }

    /// Whether `shutdown()` has been called
    pub fn is_shutdown(&self) -> bool {
        !self.accepting.load(Ordering::Acquire)
    }

    /// Data directory (empty for in-memory databases)
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Whether this database writes to disk
    pub fn is_persistent(&self) -> bool {
        !self.data_dir.as_os_str().is_empty()
    }

    /// Configuration in effect
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of transactions begun and not yet finished
    pub fn open_transaction_count(&self) -> usize {
        self.active.len()
    }

    /// Number of committed nodes
    pub fn node_count(&self) -> usize {
        self.committed.read().node_count()
    }

    pub(crate) fn bindings(&self) -> &ThreadBindings {
        &self.bindings
    }

    fn ensure_open(&self) -> GraphResult<()> {
        if self.is_shutdown() {
            Err(GraphError::DatabaseShutdown)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a transaction bound to the calling thread.
    ///
    /// # Errors
    ///
    /// - `DatabaseShutdown`
    /// - `ThreadAlreadyBound` if the thread already carries a transaction
    pub fn begin_tx(self: &Arc<Self>) -> GraphResult<Transaction> {
        self.ensure_open()?;
        let id = TxId(self.next_tx_id.fetch_add(1, Ordering::Relaxed));
        self.bindings.bind(id)?;

        let inner = Arc::new(TxInner::new(id));
        self.active.insert(id, Arc::clone(&inner));
        debug!(target: "graphd::db", tx = %id, "Transaction begun");
        Ok(Transaction::new(Arc::clone(self), inner))
    }

    /// Handle for the transaction bound to the calling thread
    pub fn current_transaction(self: &Arc<Self>) -> Option<Transaction> {
        self.current_tx()
            .map(|inner| Transaction::new(Arc::clone(self), inner))
    }

    /// Unbind whatever transaction the calling thread carries.
    ///
    /// Returns the suspended transaction, if there was one.
    pub fn suspend_current(self: &Arc<Self>) -> Option<Transaction> {
        let tx = self.current_transaction()?;
        tx.suspend();
        Some(tx)
    }

    fn current_tx(&self) -> Option<Arc<TxInner>> {
        let id = self.bindings.current()?;
        self.active.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Drop a finished transaction's binding and active entry
    pub(crate) fn retire(&self, tx: TxId) {
        self.bindings.release(tx);
        self.active.remove(&tx);
    }

    /// Replay `mutations` onto the committed state and persist it.
    ///
    /// All-or-nothing: on any error the committed state is unchanged.
    pub(crate) fn apply_commit(&self, tx: TxId, mutations: &[Mutation]) -> GraphResult<()> {
        self.ensure_open()?;
        if mutations.is_empty() {
            return Ok(());
        }

        let mut committed = self.committed.write();
        let mut next = committed.clone();
        for mutation in mutations {
            next.apply(mutation).map_err(|e| GraphError::CommitFailed {
                tx,
                reason: e.to_string(),
            })?;
        }

        if self.is_persistent() {
            store::write_snapshot(
                &self.data_dir,
                &next,
                self.next_node_id.load(Ordering::Acquire),
                self.next_relationship_id.load(Ordering::Acquire),
                self.durability_mode.syncs(),
            )?;
        }

        *committed = next;
        debug!(
            target: "graphd::db",
            tx = %tx,
            mutations = mutations.len(),
            "Transaction committed"
        );
        Ok(())
    }

    // ========================================================================
    // Operation plumbing
    // ========================================================================

    fn read<T>(&self, f: impl FnOnce(&GraphState) -> GraphResult<T>) -> GraphResult<T> {
        self.ensure_open()?;
        if let Some(tx) = self.current_tx() {
            let state = tx.state.lock();
            if let Some(working) = &state.working {
                return f(working);
            }
        }
        let committed = self.committed.read();
        f(&committed)
    }

    fn write(&self, mutation: Mutation) -> GraphResult<()> {
        self.ensure_open()?;
        let tx = self.current_tx().ok_or(GraphError::NotInTransaction)?;
        let mut guard = tx.state.lock();
        let state = &mut *guard;
        if state.finished {
            return Err(GraphError::TransactionFinished(tx.id));
        }
        let working = state
            .working
            .get_or_insert_with(|| self.committed.read().clone());
        working.apply(&mutation)?;
        state.mutations.push(mutation);
        Ok(())
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Create a node with the given properties
    pub fn create_node(&self, properties: Properties) -> GraphResult<NodeId> {
        let id = self.next_node_id.fetch_add(1, Ordering::AcqRel);
        self.write(Mutation::CreateNode { id, properties })?;
        Ok(NodeId(id))
    }

    /// Fetch a node
    pub fn get_node(&self, id: NodeId) -> GraphResult<Node> {
        self.read(|state| state.node(id))
    }

    /// Replace all properties of a node
    pub fn set_node_properties(&self, id: NodeId, properties: Properties) -> GraphResult<()> {
        self.write(Mutation::SetNodeProperties {
            id: id.as_u64(),
            properties,
        })
    }

    /// Delete a node. Fails while it still has relationships.
    pub fn delete_node(&self, id: NodeId) -> GraphResult<()> {
        self.write(Mutation::DeleteNode { id: id.as_u64() })
    }

    /// Every node, in id order
    pub fn all_nodes(&self) -> GraphResult<Vec<Node>> {
        self.read(|state| Ok(state.all_nodes()))
    }

    /// The reference node seeded into every store
    pub fn reference_node(&self) -> GraphResult<Node> {
        self.get_node(REFERENCE_NODE_ID)
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Create a relationship `start -[rel_type]-> end`
    pub fn create_relationship(
        &self,
        start: NodeId,
        end: NodeId,
        rel_type: &str,
        properties: Properties,
    ) -> GraphResult<RelationshipId> {
        let id = self.next_relationship_id.fetch_add(1, Ordering::AcqRel);
        self.write(Mutation::CreateRelationship {
            id,
            start: start.as_u64(),
            end: end.as_u64(),
            rel_type: rel_type.to_string(),
            properties,
        })?;
        Ok(RelationshipId(id))
    }

    /// Fetch a relationship
    pub fn get_relationship(&self, id: RelationshipId) -> GraphResult<Relationship> {
        self.read(|state| state.relationship(id))
    }

    /// Replace all properties of a relationship
    pub fn set_relationship_properties(
        &self,
        id: RelationshipId,
        properties: Properties,
    ) -> GraphResult<()> {
        self.write(Mutation::SetRelationshipProperties {
            id: id.as_u64(),
            properties,
        })
    }

    /// Delete a relationship
    pub fn delete_relationship(&self, id: RelationshipId) -> GraphResult<()> {
        self.write(Mutation::DeleteRelationship { id: id.as_u64() })
    }

    /// Relationships attached to `node` in the given direction
    pub fn relationships_of(
        &self,
        node: NodeId,
        direction: graphd_core::Direction,
    ) -> GraphResult<Vec<Relationship>> {
        self.read(|state| state.relationships_of(node, direction))
    }

    /// Every relationship type name ever used
    pub fn relationship_types(&self) -> GraphResult<Vec<String>> {
        self.read(|state| Ok(state.relationship_types()))
    }

    // ========================================================================
    // Indexes
    // ========================================================================

    /// Create an index (no-op if it exists)
    pub fn create_index(&self, kind: IndexKind, name: &str) -> GraphResult<()> {
        self.write(Mutation::CreateIndex {
            kind,
            name: name.to_string(),
        })
    }

    /// Whether an index exists
    pub fn index_exists(&self, kind: IndexKind, name: &str) -> GraphResult<bool> {
        self.read(|state| Ok(state.index_exists(kind, name)))
    }

    /// Delete an index and all its entries (no-op if missing)
    pub fn delete_index(&self, kind: IndexKind, name: &str) -> GraphResult<()> {
        self.write(Mutation::DeleteIndex {
            kind,
            name: name.to_string(),
        })
    }

    /// Add `entity` under `key = value`; creates the index if needed
    pub fn index_add(
        &self,
        kind: IndexKind,
        name: &str,
        entity: u64,
        key: &str,
        value: PropertyValue,
    ) -> GraphResult<()> {
        self.write(Mutation::IndexAdd {
            kind,
            name: name.to_string(),
            id: entity,
            key: key.to_string(),
            value,
        })
    }

    /// Remove `entity` from the index.
    ///
    /// With no key every entry of the entity goes; with a key but no value
    /// every value under that key goes.
    pub fn index_remove(
        &self,
        kind: IndexKind,
        name: &str,
        entity: u64,
        key: Option<&str>,
        value: Option<PropertyValue>,
    ) -> GraphResult<()> {
        self.write(Mutation::IndexRemove {
            kind,
            name: name.to_string(),
            id: entity,
            key: key.map(str::to_string),
            value,
        })
    }

    /// Nodes indexed under `key = value`
    pub fn nodes_from_index(
        &self,
        name: &str,
        key: &str,
        value: &PropertyValue,
    ) -> GraphResult<Vec<Node>> {
        self.read(|state| {
            state
                .index_query(IndexKind::Node, name, key, value)
                .into_iter()
                .map(|id| state.node(NodeId(id)))
                .collect()
        })
    }

    /// Relationships indexed under `key = value`
    pub fn relationships_from_index(
        &self,
        name: &str,
        key: &str,
        value: &PropertyValue,
    ) -> GraphResult<Vec<Relationship>> {
        self.read(|state| {
            state
                .index_query(IndexKind::Relationship, name, key, value)
                .into_iter()
                .map(|id| state.relationship(RelationshipId(id)))
                .collect()
        })
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Nodes reached by `desc` from `start`, in visit order
    pub fn traverse(&self, start: NodeId, desc: &TraversalDescription) -> GraphResult<Vec<Node>> {
        self.read(|state| traversal::traverse(state, start, desc))
    }
}

impl Drop for GraphDatabase {
    fn drop(&mut self) {
        // Before the graph state is freed, so a reopen is not locked out
        // while a large store is being deallocated.
        self.release_lock();
    }
}

impl std::fmt::Debug for GraphDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphDatabase")
            .field("data_dir", &self.data_dir)
            .field("shutdown", &self.is_shutdown())
            .field("open_transactions", &self.active.len())
            .finish()
    }
}
