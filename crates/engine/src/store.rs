//! In-memory graph state, mutations, and the on-disk snapshot
//!
//! ## Mutation model
//!
//! Every write is expressed as a [`Mutation`]. A transaction applies each
//! mutation to its private working copy as it is issued (so errors surface
//! at the call that caused them) and records it. Commit replays the recorded
//! mutations against the current committed state; if any fails to apply the
//! whole commit is rejected and the committed state is left untouched.
//!
//! ## Snapshot format
//!
//! The committed state plus the id counters is written as MessagePack to
//! `graph.snapshot`. Writes go to a temp file which is renamed over the old
//! snapshot, so a crash leaves either the old or the new state on disk.

use crate::index::{EntityIndex, IndexKind};
use graphd_core::{
    Direction, GraphError, GraphResult, Node, NodeId, Properties, PropertyValue, Relationship,
    RelationshipId, REFERENCE_NODE_ID,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Snapshot file name placed in the database data directory.
pub const SNAPSHOT_FILE_NAME: &str = "graph.snapshot";

const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct NodeRecord {
    properties: Properties,
    relationships: BTreeSet<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RelationshipRecord {
    start: u64,
    end: u64,
    rel_type: String,
    properties: Properties,
}

/// A single write, replayable against any state
#[derive(Debug, Clone)]
pub(crate) enum Mutation {
    CreateNode {
        id: u64,
        properties: Properties,
    },
    SetNodeProperties {
        id: u64,
        properties: Properties,
    },
    DeleteNode {
        id: u64,
    },
    CreateRelationship {
        id: u64,
        start: u64,
        end: u64,
        rel_type: String,
        properties: Properties,
    },
    SetRelationshipProperties {
        id: u64,
        properties: Properties,
    },
    DeleteRelationship {
        id: u64,
    },
    CreateIndex {
        kind: IndexKind,
        name: String,
    },
    DeleteIndex {
        kind: IndexKind,
        name: String,
    },
    IndexAdd {
        kind: IndexKind,
        name: String,
        id: u64,
        key: String,
        value: PropertyValue,
    },
    IndexRemove {
        kind: IndexKind,
        name: String,
        id: u64,
        key: Option<String>,
        value: Option<PropertyValue>,
    },
}

/// Full graph: nodes, relationships, relationship type names, indexes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct GraphState {
    nodes: BTreeMap<u64, NodeRecord>,
    relationships: BTreeMap<u64, RelationshipRecord>,
    relationship_types: BTreeSet<String>,
    node_indexes: BTreeMap<String, EntityIndex>,
    relationship_indexes: BTreeMap<String, EntityIndex>,
}

impl GraphState {
    /// Fresh store holding only the reference node
    pub(crate) fn seeded() -> Self {
        let mut state = GraphState::default();
        state
            .nodes
            .insert(REFERENCE_NODE_ID.as_u64(), NodeRecord::default());
        state
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Apply one mutation. On error the state is unchanged.
    pub(crate) fn apply(&mut self, mutation: &Mutation) -> GraphResult<()> {
        match mutation {
            Mutation::CreateNode { id, properties } => {
                if self.nodes.contains_key(id) {
                    return Err(GraphError::constraint(format!(
                        "{} already exists",
                        NodeId(*id)
                    )));
                }
                self.nodes.insert(
                    *id,
                    NodeRecord {
                        properties: properties.clone(),
                        relationships: BTreeSet::new(),
                    },
                );
            }
            Mutation::SetNodeProperties { id, properties } => {
                let record = self
                    .nodes
                    .get_mut(id)
                    .ok_or(GraphError::NodeNotFound(NodeId(*id)))?;
                record.properties = properties.clone();
            }
            Mutation::DeleteNode { id } => {
                let record = self
                    .nodes
                    .get(id)
                    .ok_or(GraphError::NodeNotFound(NodeId(*id)))?;
                if !record.relationships.is_empty() {
                    return Err(GraphError::constraint(format!(
                        "{} still has {} relationship(s)",
                        NodeId(*id),
                        record.relationships.len()
                    )));
                }
                self.nodes.remove(id);
                for index in self.node_indexes.values_mut() {
                    index.remove(*id, None, None);
                }
            }
            Mutation::CreateRelationship {
                id,
                start,
                end,
                rel_type,
                properties,
            } => {
                if self.relationships.contains_key(id) {
                    return Err(GraphError::constraint(format!(
                        "{} already exists",
                        RelationshipId(*id)
                    )));
                }
                if rel_type.is_empty() {
                    return Err(GraphError::invalid_input("relationship type is empty"));
                }
                for endpoint in [start, end] {
                    if !self.nodes.contains_key(endpoint) {
                        return Err(GraphError::NodeNotFound(NodeId(*endpoint)));
                    }
                }
                self.relationships.insert(
                    *id,
                    RelationshipRecord {
                        start: *start,
                        end: *end,
                        rel_type: rel_type.clone(),
                        properties: properties.clone(),
                    },
                );
                self.relationship_types.insert(rel_type.clone());
                for endpoint in [start, end] {
                    if let Some(node) = self.nodes.get_mut(endpoint) {
                        node.relationships.insert(*id);
                    }
                }
            }
            Mutation::SetRelationshipProperties { id, properties } => {
                let record = self
                    .relationships
                    .get_mut(id)
                    .ok_or(GraphError::RelationshipNotFound(RelationshipId(*id)))?;
                record.properties = properties.clone();
            }
            Mutation::DeleteRelationship { id } => {
                let record = self
                    .relationships
                    .remove(id)
                    .ok_or(GraphError::RelationshipNotFound(RelationshipId(*id)))?;
                for endpoint in [record.start, record.end] {
                    if let Some(node) = self.nodes.get_mut(&endpoint) {
                        node.relationships.remove(id);
                    }
                }
                for index in self.relationship_indexes.values_mut() {
                    index.remove(*id, None, None);
                }
            }
            Mutation::CreateIndex { kind, name } => {
                self.indexes_mut(*kind).entry(name.clone()).or_default();
            }
            Mutation::DeleteIndex { kind, name } => {
                self.indexes_mut(*kind).remove(name);
            }
            Mutation::IndexAdd {
                kind,
                name,
                id,
                key,
                value,
            } => {
                self.require_entity(*kind, *id)?;
                self.indexes_mut(*kind)
                    .entry(name.clone())
                    .or_default()
                    .add(*id, key, value);
            }
            Mutation::IndexRemove {
                kind,
                name,
                id,
                key,
                value,
            } => {
                self.require_entity(*kind, *id)?;
                if let Some(index) = self.indexes_mut(*kind).get_mut(name) {
                    index.remove(*id, key.as_deref(), value.as_ref());
                }
            }
        }
        Ok(())
    }

    fn indexes_mut(&mut self, kind: IndexKind) -> &mut BTreeMap<String, EntityIndex> {
        match kind {
            IndexKind::Node => &mut self.node_indexes,
            IndexKind::Relationship => &mut self.relationship_indexes,
        }
    }

    fn indexes(&self, kind: IndexKind) -> &BTreeMap<String, EntityIndex> {
        match kind {
            IndexKind::Node => &self.node_indexes,
            IndexKind::Relationship => &self.relationship_indexes,
        }
    }

    fn require_entity(&self, kind: IndexKind, id: u64) -> GraphResult<()> {
        match kind {
            IndexKind::Node if !self.nodes.contains_key(&id) => {
                Err(GraphError::NodeNotFound(NodeId(id)))
            }
            IndexKind::Relationship if !self.relationships.contains_key(&id) => {
                Err(GraphError::RelationshipNotFound(RelationshipId(id)))
            }
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub(crate) fn node(&self, id: NodeId) -> GraphResult<Node> {
        self.nodes
            .get(&id.as_u64())
            .map(|record| Node {
                id,
                properties: record.properties.clone(),
            })
            .ok_or(GraphError::NodeNotFound(id))
    }

    pub(crate) fn relationship(&self, id: RelationshipId) -> GraphResult<Relationship> {
        self.relationships
            .get(&id.as_u64())
            .map(|record| Relationship {
                id,
                start: NodeId(record.start),
                end: NodeId(record.end),
                rel_type: record.rel_type.clone(),
                properties: record.properties.clone(),
            })
            .ok_or(GraphError::RelationshipNotFound(id))
    }

    pub(crate) fn all_nodes(&self) -> Vec<Node> {
        self.nodes
            .iter()
            .map(|(id, record)| Node {
                id: NodeId(*id),
                properties: record.properties.clone(),
            })
            .collect()
    }

    pub(crate) fn relationship_types(&self) -> Vec<String> {
        self.relationship_types.iter().cloned().collect()
    }

    /// Relationships attached to `node` that match `direction`
    pub(crate) fn relationships_of(
        &self,
        node: NodeId,
        direction: Direction,
    ) -> GraphResult<Vec<Relationship>> {
        let record = self
            .nodes
            .get(&node.as_u64())
            .ok_or(GraphError::NodeNotFound(node))?;
        let mut out = Vec::with_capacity(record.relationships.len());
        for rel_id in &record.relationships {
            let rel = self.relationship(RelationshipId(*rel_id))?;
            let matches = match direction {
                Direction::Outgoing => rel.start == node,
                Direction::Incoming => rel.end == node,
                Direction::Both => true,
            };
            if matches {
                out.push(rel);
            }
        }
        Ok(out)
    }

    pub(crate) fn index_exists(&self, kind: IndexKind, name: &str) -> bool {
        self.indexes(kind).contains_key(name)
    }

    pub(crate) fn index_query(
        &self,
        kind: IndexKind,
        name: &str,
        key: &str,
        value: &PropertyValue,
    ) -> Vec<u64> {
        self.indexes(kind)
            .get(name)
            .map(|index| index.get(key, value))
            .unwrap_or_default()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn max_node_id(&self) -> Option<u64> {
        self.nodes.keys().next_back().copied()
    }

    pub(crate) fn max_relationship_id(&self) -> Option<u64> {
        self.relationships.keys().next_back().copied()
    }
}

// ============================================================================
// Snapshot persistence
// ============================================================================

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format_version: u32,
    next_node_id: u64,
    next_relationship_id: u64,
    state: &'a GraphState,
}

/// Decoded snapshot
#[derive(Deserialize)]
pub(crate) struct Snapshot {
    format_version: u32,
    pub(crate) next_node_id: u64,
    pub(crate) next_relationship_id: u64,
    pub(crate) state: GraphState,
}

/// Read the snapshot in `dir`, if one exists
pub(crate) fn load_snapshot(dir: &Path) -> GraphResult<Option<Snapshot>> {
    let path = dir.join(SNAPSHOT_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path)?;
    let snapshot: Snapshot = rmp_serde::from_slice(&bytes)?;
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(GraphError::Serialization(format!(
            "unsupported snapshot format version {} in '{}'",
            snapshot.format_version,
            path.display()
        )));
    }
    Ok(Some(snapshot))
}

/// Atomically replace the snapshot in `dir`
pub(crate) fn write_snapshot(
    dir: &Path,
    state: &GraphState,
    next_node_id: u64,
    next_relationship_id: u64,
    sync: bool,
) -> GraphResult<()> {
    let bytes = rmp_serde::to_vec_named(&SnapshotRef {
        format_version: SNAPSHOT_FORMAT_VERSION,
        next_node_id,
        next_relationship_id,
        state,
    })?;

    let path = dir.join(SNAPSHOT_FILE_NAME);
    let temp_path = path.with_extension("tmp");

    let result = (|| -> GraphResult<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        if sync {
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
