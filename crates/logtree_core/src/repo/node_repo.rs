//! Node store contracts and in-memory implementation.
//!
//! # Responsibility
//! - Provide keyed storage and the frontier query used by aggregation.
//! - Keep locking and ordering details inside the store boundary.
//!
//! # Invariants
//! - The store never validates tree shape; callers own tree invariants.
//! - Frontier listing is deterministic: `created_at ASC, insertion ASC`.
//! - `link_children` is all-or-nothing and never re-parents a node.

use crate::model::node::{Level, Node, NodeId};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::RwLock;

/// Result type used by node store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from node store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Referenced node id is not present in the store.
    NodeNotFound(NodeId),
    /// Node already belongs to another summary.
    ParentAlreadySet {
        node_id: NodeId,
        existing: NodeId,
        requested: NodeId,
    },
    /// A thread panicked while holding the store lock.
    LockPoisoned,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeNotFound(id) => write!(f, "node not found: {id}"),
            Self::ParentAlreadySet {
                node_id,
                existing,
                requested,
            } => write!(
                f,
                "node {node_id} already has parent {existing}; refusing to link to {requested}"
            ),
            Self::LockPoisoned => write!(f, "node store lock poisoned"),
        }
    }
}

impl Error for StoreError {}

/// Storage interface for tree nodes.
pub trait NodeStore {
    /// Inserts or overwrites one node by id.
    fn put(&self, node: Node) -> StoreResult<()>;
    /// Loads one node by id.
    fn get(&self, id: NodeId) -> StoreResult<Option<Node>>;
    /// Lists every node in no particular order.
    fn all(&self) -> StoreResult<Vec<Node>>;
    /// Lists unparented nodes at `level`, oldest first.
    fn unparented_at_level(&self, level: Level) -> StoreResult<Vec<Node>>;
    /// Sets `parent_id` on every node in `ids`.
    fn link_children(&self, ids: &[NodeId], parent_id: NodeId) -> StoreResult<()>;
    /// Removes one node. Used only to roll back an aborted summary.
    fn remove(&self, id: NodeId) -> StoreResult<Option<Node>>;
    /// Number of stored nodes.
    fn len(&self) -> StoreResult<usize>;
    /// Drops all state.
    fn clear(&self) -> StoreResult<()>;

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Counts nodes per level, split into total and frontier.
    fn level_counts(&self) -> StoreResult<BTreeMap<Level, LevelCount>> {
        let mut counts: BTreeMap<Level, LevelCount> = BTreeMap::new();
        for node in self.all()? {
            let entry = counts.entry(node.level).or_default();
            entry.total += 1;
            if node.is_frontier() {
                entry.frontier += 1;
            }
        }
        Ok(counts)
    }
}

/// Per-level node counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelCount {
    /// All nodes at the level.
    pub total: usize,
    /// Nodes at the level still waiting for a parent.
    pub frontier: usize,
}

struct StoredNode {
    seq: u64,
    node: Node,
}

#[derive(Default)]
struct StoreState {
    nodes: HashMap<NodeId, StoredNode>,
    next_seq: u64,
}

/// Process-local node store guarded by a reader/writer lock.
#[derive(Default)]
pub struct InMemoryNodeStore {
    state: RwLock<StoreState>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NodeStore for InMemoryNodeStore {
    fn put(&self, node: Node) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(existing) = state.nodes.get_mut(&node.id) {
            existing.node = node;
            return Ok(());
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.nodes.insert(node.id, StoredNode { seq, node });
        Ok(())
    }

    fn get(&self, id: NodeId) -> StoreResult<Option<Node>> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.nodes.get(&id).map(|stored| stored.node.clone()))
    }

    fn all(&self) -> StoreResult<Vec<Node>> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state
            .nodes
            .values()
            .map(|stored| stored.node.clone())
            .collect())
    }

    fn unparented_at_level(&self, level: Level) -> StoreResult<Vec<Node>> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut frontier: Vec<&StoredNode> = state
            .nodes
            .values()
            .filter(|stored| stored.node.level == level && stored.node.is_frontier())
            .collect();
        frontier.sort_by(|a, b| {
            a.node
                .created_at
                .cmp(&b.node.created_at)
                .then(a.seq.cmp(&b.seq))
        });
        Ok(frontier
            .into_iter()
            .map(|stored| stored.node.clone())
            .collect())
    }

    fn link_children(&self, ids: &[NodeId], parent_id: NodeId) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;

        for id in ids {
            let stored = state.nodes.get(id).ok_or(StoreError::NodeNotFound(*id))?;
            match stored.node.parent_id {
                Some(existing) if existing != parent_id => {
                    return Err(StoreError::ParentAlreadySet {
                        node_id: *id,
                        existing,
                        requested: parent_id,
                    });
                }
                _ => {}
            }
        }

        for id in ids {
            if let Some(stored) = state.nodes.get_mut(id) {
                stored.node.parent_id = Some(parent_id);
            }
        }
        Ok(())
    }

    fn remove(&self, id: NodeId) -> StoreResult<Option<Node>> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.nodes.remove(&id).map(|stored| stored.node))
    }

    fn len(&self) -> StoreResult<usize> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.nodes.len())
    }

    fn clear(&self) -> StoreResult<()> {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        state.nodes.clear();
        state.next_seq = 0;
        Ok(())
    }
}
