//! Call protocol wrapper
//!
//! A [`DbHandle`] is what a remote caller holds after opening a database:
//! one engine instance, one caller identity, one permission context. Every
//! graph, index and traversal call runs through the same envelope:
//!
//! 1. Write calls check the caller's write permission (`PermissionDenied`,
//!    nothing else happens).
//! 2. The caller's transaction is bound to this thread: writes require a
//!    session (`resume`); reads use one if present (`resume_if_present`).
//! 3. The operation runs against the engine.
//! 4. On every exit path a guard suspends the session.
//! 5. Errors and panics come back as a [`CallError`]; nothing unwinds
//!    across the boundary.
//!
//! A caller transaction therefore survives any number of calls, each of
//! which may land on a different thread.

use crate::access::{CallerContext, CallerId};
use crate::cursor::{NodeCursor, RelationshipCursor};
use crate::error::{CallError, CallResult};
use crate::session::SessionRegistry;
use graphd_core::{
    Direction, Node, NodeId, Properties, PropertyValue, Relationship, RelationshipId,
    TraversalDescription,
};
use graphd_engine::{GraphDatabase, IndexKind, Transaction, TxOutcome};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

/// How a call binds the caller's transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Runs with or without a caller transaction
    Read,
    /// Needs write permission and a caller transaction
    Write,
    /// Needs a caller transaction (success / failure / finish)
    Session,
    /// Needs write permission; creates the caller transaction
    Begin,
}

/// Suspends the caller's session when the call envelope unwinds
struct SuspendGuard<'a> {
    handle: &'a DbHandle,
    label: &'static str,
    tx: Option<Transaction>,
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        self.handle.registry.suspend(self.handle.caller, self.label);

        // Still bound after suspend: the session was removed mid-call
        // (force-terminated), so nobody else can end this transaction.
        if let Some(tx) = &self.tx {
            if tx.is_bound_to_current_thread() {
                warn!(
                    target: "graphd::call",
                    caller = %self.handle.caller,
                    tx = %tx.id(),
                    op = self.label,
                    "Rolling back transaction orphaned during call"
                );
                tx.mark_rollback_only();
                if let Err(e) = tx.finish() {
                    error!(target: "graphd::call", tx = %tx.id(), error = %e, "Orphan rollback failed");
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A caller's bound handle to one database
pub struct DbHandle {
    name: String,
    caller: CallerId,
    context: CallerContext,
    db: Arc<GraphDatabase>,
    registry: Arc<SessionRegistry>,
}

impl std::fmt::Debug for DbHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbHandle")
            .field("name", &self.name)
            .field("caller", &self.caller)
            .field("access_mode", &self.context.access_mode)
            .finish()
    }
}

impl DbHandle {
    pub(crate) fn new(
        name: impl Into<String>,
        caller: CallerId,
        context: CallerContext,
        db: Arc<GraphDatabase>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            caller,
            context,
            db,
            registry,
        }
    }

    /// Database name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity this handle calls as
    pub fn caller(&self) -> CallerId {
        self.caller
    }

    /// Permission context
    pub fn context(&self) -> &CallerContext {
        &self.context
    }

    /// Whether the caller has an open transaction
    pub fn has_transaction(&self) -> bool {
        self.registry.contains(self.caller)
    }

    // ========================================================================
    // Envelope
    // ========================================================================

    fn call<T>(
        &self,
        access: Access,
        label: &'static str,
        op: impl FnOnce(&GraphDatabase) -> CallResult<T>,
    ) -> CallResult<T> {
        if matches!(access, Access::Write | Access::Begin) && !self.context.can_write() {
            return Err(self.report(
                label,
                CallError::permission_denied(format!(
                    "caller {} lacks write permission for '{}'",
                    self.caller, label
                )),
            ));
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> CallResult<T> {
            let tx = match access {
                Access::Read => self.registry.resume_if_present(self.caller)?,
                Access::Write | Access::Session => Some(self.registry.resume(self.caller)?),
                Access::Begin => None,
            };
            let _guard = SuspendGuard {
                handle: self,
                label,
                tx,
            };
            op(&self.db)
        }));

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.report(label, e)),
            Err(payload) => Err(self.report(
                label,
                CallError::transaction(format!("operation panicked: {}", panic_message(&*payload))),
            )),
        }
    }

    fn report(&self, label: &'static str, e: CallError) -> CallError {
        warn!(
            target: "graphd::call",
            db = %self.name,
            caller = %self.caller,
            op = label,
            code = %e.code,
            message = %e.message,
            "Call failed"
        );
        e
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Open a transaction for this caller
    pub fn begin_tx(&self) -> CallResult<()> {
        self.call(Access::Begin, "begin_tx", |_| {
            self.registry.begin(self.caller, &self.db)?;
            Ok(())
        })
    }

    /// Mark the caller's transaction for commit
    pub fn tx_success(&self) -> CallResult<()> {
        self.call(Access::Session, "tx_success", |_| {
            Ok(self.registry.mark_success(self.caller)?)
        })
    }

    /// Mark the caller's transaction for rollback
    pub fn tx_failure(&self) -> CallResult<()> {
        self.call(Access::Session, "tx_failure", |_| {
            Ok(self.registry.mark_failure(self.caller)?)
        })
    }

    /// Commit or roll back the caller's transaction and end the session
    pub fn tx_finish(&self) -> CallResult<TxOutcome> {
        let result = self.call(Access::Session, "tx_finish", |_| {
            Ok(self.registry.finish(self.caller)?)
        });
        // resume itself may have failed; the session still has to go
        if result.is_err() && self.registry.contains(self.caller) {
            if let Err(e) = self.registry.finish(self.caller) {
                warn!(target: "graphd::call", caller = %self.caller, error = %e, "Finish cleanup failed");
            }
        }
        result
    }

    // ========================================================================
    // Nodes & relationships
    // ========================================================================

    /// Every node
    pub fn all_nodes(&self) -> CallResult<NodeCursor> {
        self.call(Access::Read, "all_nodes", |db| {
            Ok(NodeCursor::new(db.all_nodes()?))
        })
    }

    /// Every relationship type name in use
    pub fn relationship_types(&self) -> CallResult<Vec<String>> {
        self.call(Access::Read, "relationship_types", |db| {
            Ok(db.relationship_types()?)
        })
    }

    /// The reference node
    pub fn reference_node(&self) -> CallResult<Node> {
        self.call(Access::Read, "reference_node", |db| Ok(db.reference_node()?))
    }

    /// Node by id
    pub fn get_node(&self, id: NodeId) -> CallResult<Node> {
        self.call(Access::Read, "get_node", |db| Ok(db.get_node(id)?))
    }

    /// Relationship by id
    pub fn get_relationship(&self, id: RelationshipId) -> CallResult<Relationship> {
        self.call(Access::Read, "get_relationship", |db| {
            Ok(db.get_relationship(id)?)
        })
    }

    /// Relationships attached to `node`
    pub fn relationships_of(
        &self,
        node: NodeId,
        direction: Direction,
    ) -> CallResult<RelationshipCursor> {
        self.call(Access::Read, "relationships_of", |db| {
            Ok(RelationshipCursor::new(db.relationships_of(node, direction)?))
        })
    }

    /// Create a node
    pub fn create_node(&self, properties: Properties) -> CallResult<NodeId> {
        self.call(Access::Write, "create_node", |db| {
            Ok(db.create_node(properties)?)
        })
    }

    /// Replace the properties of `node.id` with `node.properties`
    pub fn update_node(&self, node: &Node) -> CallResult<()> {
        self.call(Access::Write, "update_node", |db| {
            Ok(db.set_node_properties(node.id, node.properties.clone())?)
        })
    }

    /// Delete a node
    pub fn delete_node(&self, id: NodeId) -> CallResult<()> {
        self.call(Access::Write, "delete_node", |db| Ok(db.delete_node(id)?))
    }

    /// Create a relationship `start -[rel_type]-> end`
    pub fn create_relationship(
        &self,
        start: NodeId,
        end: NodeId,
        rel_type: &str,
        properties: Properties,
    ) -> CallResult<RelationshipId> {
        self.call(Access::Write, "create_relationship", |db| {
            Ok(db.create_relationship(start, end, rel_type, properties)?)
        })
    }

    /// Replace the properties of `rel.id` with `rel.properties`
    pub fn update_relationship(&self, rel: &Relationship) -> CallResult<()> {
        self.call(Access::Write, "update_relationship", |db| {
            Ok(db.set_relationship_properties(rel.id, rel.properties.clone())?)
        })
    }

    /// Delete a relationship
    pub fn delete_relationship(&self, id: RelationshipId) -> CallResult<()> {
        self.call(Access::Write, "delete_relationship", |db| {
            Ok(db.delete_relationship(id)?)
        })
    }

    /// Nodes reached from `start` by `desc`
    pub fn traverse(&self, desc: &TraversalDescription, start: NodeId) -> CallResult<NodeCursor> {
        self.call(Access::Read, "traverse", |db| {
            Ok(NodeCursor::new(db.traverse(start, desc)?))
        })
    }

    // ========================================================================
    // Node indexes
    // ========================================================================

    /// Create a node index
    pub fn create_node_index(&self, name: &str) -> CallResult<()> {
        self.call(Access::Write, "create_node_index", |db| {
            Ok(db.create_index(IndexKind::Node, name)?)
        })
    }

    /// Whether a node index exists
    pub fn node_index_exists(&self, name: &str) -> CallResult<bool> {
        self.call(Access::Read, "node_index_exists", |db| {
            Ok(db.index_exists(IndexKind::Node, name)?)
        })
    }

    /// Delete a node index
    pub fn delete_node_index(&self, name: &str) -> CallResult<()> {
        self.call(Access::Write, "delete_node_index", |db| {
            Ok(db.delete_index(IndexKind::Node, name)?)
        })
    }

    /// Index `node` under `key = value`
    pub fn add_node_to_index(
        &self,
        name: &str,
        node: NodeId,
        key: &str,
        value: PropertyValue,
    ) -> CallResult<()> {
        self.call(Access::Write, "add_node_to_index", |db| {
            Ok(db.index_add(IndexKind::Node, name, node.as_u64(), key, value)?)
        })
    }

    /// Re-index `node` under `key = value`
    pub fn update_node_in_index(
        &self,
        name: &str,
        node: NodeId,
        key: &str,
        value: PropertyValue,
    ) -> CallResult<()> {
        self.call(Access::Write, "update_node_in_index", |db| {
            update_in_index(db, IndexKind::Node, name, node.as_u64(), key, value)
        })
    }

    /// Remove every index entry of `node`
    pub fn remove_node_from_index(&self, name: &str, node: NodeId) -> CallResult<()> {
        self.call(Access::Write, "remove_node_from_index", |db| {
            Ok(db.index_remove(IndexKind::Node, name, node.as_u64(), None, None)?)
        })
    }

    /// Remove `node` from every value under `key`
    pub fn remove_node_key_from_index(&self, name: &str, node: NodeId, key: &str) -> CallResult<()> {
        self.call(Access::Write, "remove_node_key_from_index", |db| {
            Ok(db.index_remove(IndexKind::Node, name, node.as_u64(), Some(key), None)?)
        })
    }

    /// Remove `node` from `key = value`
    pub fn remove_node_key_value_from_index(
        &self,
        name: &str,
        node: NodeId,
        key: &str,
        value: PropertyValue,
    ) -> CallResult<()> {
        self.call(Access::Write, "remove_node_key_value_from_index", |db| {
            Ok(db.index_remove(IndexKind::Node, name, node.as_u64(), Some(key), Some(value))?)
        })
    }

    /// Nodes indexed under `key = value`
    pub fn nodes_from_index(
        &self,
        name: &str,
        key: &str,
        value: &PropertyValue,
    ) -> CallResult<NodeCursor> {
        self.call(Access::Read, "nodes_from_index", |db| {
            Ok(NodeCursor::new(db.nodes_from_index(name, key, value)?))
        })
    }

    // ========================================================================
    // Relationship indexes
    // ========================================================================

    /// Create a relationship index
    pub fn create_relationship_index(&self, name: &str) -> CallResult<()> {
        self.call(Access::Write, "create_relationship_index", |db| {
            Ok(db.create_index(IndexKind::Relationship, name)?)
        })
    }

    /// Whether a relationship index exists
    pub fn relationship_index_exists(&self, name: &str) -> CallResult<bool> {
        self.call(Access::Read, "relationship_index_exists", |db| {
            Ok(db.index_exists(IndexKind::Relationship, name)?)
        })
    }

    /// Delete a relationship index
    pub fn delete_relationship_index(&self, name: &str) -> CallResult<()> {
        self.call(Access::Write, "delete_relationship_index", |db| {
            Ok(db.delete_index(IndexKind::Relationship, name)?)
        })
    }

    /// Index `rel` under `key = value`
    pub fn add_relationship_to_index(
        &self,
        name: &str,
        rel: RelationshipId,
        key: &str,
        value: PropertyValue,
    ) -> CallResult<()> {
        self.call(Access::Write, "add_relationship_to_index", |db| {
            Ok(db.index_add(IndexKind::Relationship, name, rel.as_u64(), key, value)?)
        })
    }

    /// Re-index `rel` under `key = value`
    pub fn update_relationship_in_index(
        &self,
        name: &str,
        rel: RelationshipId,
        key: &str,
        value: PropertyValue,
    ) -> CallResult<()> {
        self.call(Access::Write, "update_relationship_in_index", |db| {
            update_in_index(db, IndexKind::Relationship, name, rel.as_u64(), key, value)
        })
    }

    /// Remove every index entry of `rel`
    pub fn remove_relationship_from_index(&self, name: &str, rel: RelationshipId) -> CallResult<()> {
        self.call(Access::Write, "remove_relationship_from_index", |db| {
            Ok(db.index_remove(IndexKind::Relationship, name, rel.as_u64(), None, None)?)
        })
    }

    /// Remove `rel` from every value under `key`
    pub fn remove_relationship_key_from_index(
        &self,
        name: &str,
        rel: RelationshipId,
        key: &str,
    ) -> CallResult<()> {
        self.call(Access::Write, "remove_relationship_key_from_index", |db| {
            Ok(db.index_remove(IndexKind::Relationship, name, rel.as_u64(), Some(key), None)?)
        })
    }

    /// Remove `rel` from `key = value`
    pub fn remove_relationship_key_value_from_index(
        &self,
        name: &str,
        rel: RelationshipId,
        key: &str,
        value: PropertyValue,
    ) -> CallResult<()> {
        self.call(Access::Write, "remove_relationship_key_value_from_index", |db| {
            Ok(db.index_remove(
                IndexKind::Relationship,
                name,
                rel.as_u64(),
                Some(key),
                Some(value),
            )?)
        })
    }

    /// Relationships indexed under `key = value`
    pub fn relationships_from_index(
        &self,
        name: &str,
        key: &str,
        value: &PropertyValue,
    ) -> CallResult<RelationshipCursor> {
        self.call(Access::Read, "relationships_from_index", |db| {
            Ok(RelationshipCursor::new(db.relationships_from_index(name, key, value)?))
        })
    }
}

fn update_in_index(
    db: &GraphDatabase,
    kind: IndexKind,
    name: &str,
    entity: u64,
    key: &str,
    value: PropertyValue,
) -> CallResult<()> {
    db.index_remove(kind, name, entity, Some(key), Some(value.clone()))?;
    db.index_add(kind, name, entity, key, value)?;
    Ok(())
}
