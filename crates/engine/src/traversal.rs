//! Traversal over a graph state
//!
//! Paths are expanded from the start node one relationship at a time. Each
//! candidate path is checked against the uniqueness policy before it is
//! admitted; the end node of every admitted path (including the zero-length
//! path at the start node) is emitted in visit order.

use crate::store::GraphState;
use graphd_core::{
    Direction, GraphError, GraphResult, Node, NodeId, Order, Relationship, RelationshipId,
    TraversalDescription, Uniqueness,
};
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Number of entities remembered by the `*Recent` uniqueness policies
pub const RECENT_WINDOW: usize = 1000;

#[derive(Clone)]
struct Path {
    nodes: Vec<NodeId>,
    relationships: Vec<RelationshipId>,
}

impl Path {
    fn end(&self) -> NodeId {
        self.nodes[self.nodes.len() - 1]
    }

    fn depth(&self) -> usize {
        self.relationships.len()
    }

    fn extend(&self, rel: RelationshipId, node: NodeId) -> Path {
        let mut next = self.clone();
        next.relationships.push(rel);
        next.nodes.push(node);
        next
    }
}

/// Bounded set of recently seen ids
struct RecentSet<T> {
    order: VecDeque<T>,
    members: HashSet<T>,
    capacity: usize,
}

impl<T: Copy + Eq + Hash> RecentSet<T> {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity,
        }
    }

    /// Insert; false if already present
    fn insert(&mut self, item: T) -> bool {
        if !self.members.insert(item) {
            return false;
        }
        self.order.push_back(item);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }
}

enum Filter {
    None,
    NodeGlobal(HashSet<NodeId>),
    NodeRecent(RecentSet<NodeId>),
    NodePath,
    RelationshipGlobal(HashSet<RelationshipId>),
    RelationshipRecent(RecentSet<RelationshipId>),
    RelationshipPath,
}

impl Filter {
    fn new(uniqueness: Uniqueness) -> Self {
        match uniqueness {
            Uniqueness::None => Filter::None,
            Uniqueness::NodeGlobal => Filter::NodeGlobal(HashSet::new()),
            Uniqueness::NodeRecent => Filter::NodeRecent(RecentSet::new(RECENT_WINDOW)),
            Uniqueness::NodePath => Filter::NodePath,
            Uniqueness::RelationshipGlobal => Filter::RelationshipGlobal(HashSet::new()),
            Uniqueness::RelationshipRecent => {
                Filter::RelationshipRecent(RecentSet::new(RECENT_WINDOW))
            }
            Uniqueness::RelationshipPath => Filter::RelationshipPath,
        }
    }

    /// Decide whether `path` is admitted, recording it if so
    fn admit(&mut self, path: &Path) -> bool {
        let end = path.end();
        let last_rel = path.relationships.last().copied();
        match self {
            Filter::None => true,
            Filter::NodeGlobal(seen) => seen.insert(end),
            Filter::NodeRecent(recent) => recent.insert(end),
            Filter::NodePath => !path.nodes[..path.nodes.len() - 1].contains(&end),
            Filter::RelationshipGlobal(seen) => last_rel.map_or(true, |rel| seen.insert(rel)),
            Filter::RelationshipRecent(recent) => last_rel.map_or(true, |rel| recent.insert(rel)),
            Filter::RelationshipPath => last_rel.map_or(true, |rel| {
                !path.relationships[..path.relationships.len() - 1].contains(&rel)
            }),
        }
    }
}

fn expand(
    state: &GraphState,
    node: NodeId,
    desc: &TraversalDescription,
) -> GraphResult<Vec<Relationship>> {
    if desc.relationships.is_empty() {
        return state.relationships_of(node, Direction::Both);
    }
    let mut out = Vec::new();
    for rel in state.relationships_of(node, Direction::Both)? {
        let followed = desc.relationships.iter().any(|(rel_type, direction)| {
            *rel_type == rel.rel_type
                && match direction {
                    Direction::Outgoing => rel.start == node,
                    Direction::Incoming => rel.end == node,
                    Direction::Both => true,
                }
        });
        if followed {
            out.push(rel);
        }
    }
    Ok(out)
}

/// Run `desc` from `start` over `state`
pub(crate) fn traverse(
    state: &GraphState,
    start: NodeId,
    desc: &TraversalDescription,
) -> GraphResult<Vec<Node>> {
    if desc.uniqueness == Uniqueness::None && desc.max_depth.is_none() {
        return Err(GraphError::invalid_input(
            "traversal without uniqueness requires a max depth",
        ));
    }
    state.node(start)?;

    let mut filter = Filter::new(desc.uniqueness);
    let mut frontier: VecDeque<Path> = VecDeque::new();
    let mut visited = Vec::new();

    let origin = Path {
        nodes: vec![start],
        relationships: Vec::new(),
    };
    if filter.admit(&origin) {
        frontier.push_back(origin);
    }

    while let Some(path) = match desc.order {
        Order::BreadthFirst => frontier.pop_front(),
        Order::DepthFirst => frontier.pop_back(),
    } {
        let end = path.end();
        visited.push(state.node(end)?);

        if desc.max_depth.map_or(false, |max| path.depth() >= max) {
            continue;
        }

        let mut children = Vec::new();
        for rel in expand(state, end, desc)? {
            let other = rel.other_node(end).unwrap_or(end);
            let candidate = path.extend(rel.id, other);
            if filter.admit(&candidate) {
                children.push(candidate);
            }
        }

        match desc.order {
            Order::BreadthFirst => frontier.extend(children),
            // Reverse so the first child is popped first.
            Order::DepthFirst => frontier.extend(children.into_iter().rev()),
        }
    }

    Ok(visited)
}
