//! Incremental aggregation use-case service.
//!
//! # Responsibility
//! - Ingest log entries and fold them into the summary tree.
//! - Report every node created or mutated by one ingest.
//!
//! # Invariants
//! - Ingests are serialized; one collapse cascade runs at a time.
//! - Each collapse consumes exactly `factor` oldest frontier nodes.
//! - A summary is stored before any child points at it.
//! - A failed link aborts the ingest and removes the new summary.
//! - Commit observers run under the ingest lock, in commit order.

use crate::model::node::{Level, Node, NodeId};
use crate::repo::node_repo::{LevelCount, NodeStore, StoreError};
use log::{debug, error, info};
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Mutex;

/// Fan-in used when no explicit factor is configured.
pub const DEFAULT_AGGREGATION_FACTOR: usize = 5;

/// Smallest fan-in that still forms a tree.
pub const MIN_AGGREGATION_FACTOR: usize = 2;

/// Errors from aggregation service operations.
#[derive(Debug)]
pub enum AggregationError {
    /// Fan-in below `MIN_AGGREGATION_FACTOR`.
    InvalidFactor(usize),
    /// Linking children to a fresh summary failed; tree invariants were
    /// already broken before this ingest.
    Inconsistent {
        level: Level,
        summary_id: NodeId,
        child_ids: Vec<NodeId>,
        source: StoreError,
    },
    /// Store-level failure outside of linking.
    Store(StoreError),
    /// Another ingest panicked while holding the ingest lock.
    IngestLockPoisoned,
}

impl Display for AggregationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFactor(factor) => write!(
                f,
                "aggregation factor must be at least {MIN_AGGREGATION_FACTOR}, got {factor}"
            ),
            Self::Inconsistent {
                level,
                summary_id,
                source,
                ..
            } => write!(
                f,
                "inconsistent tree while collapsing level {level} into summary {summary_id}: {source}"
            ),
            Self::Store(err) => write!(f, "{err}"),
            Self::IngestLockPoisoned => write!(f, "ingest lock poisoned"),
        }
    }
}

impl Error for AggregationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Inconsistent { source, .. } => Some(source),
            Self::Store(err) => Some(err),
            Self::InvalidFactor(_) | Self::IngestLockPoisoned => None,
        }
    }
}

impl From<StoreError> for AggregationError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Result of one ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Created leaf in its final state after the cascade.
    pub leaf: Node,
    /// Every node created or mutated by this ingest, each once, in
    /// first-touched order. Includes `leaf`.
    pub changed: Vec<Node>,
    /// Summaries created by this ingest, lowest level first.
    pub summary_ids: Vec<NodeId>,
}

/// Tree shape snapshot for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub levels: BTreeMap<Level, LevelCount>,
}

impl TreeStats {
    /// Highest populated level, `None` for an empty tree.
    pub fn height(&self) -> Option<Level> {
        self.levels.keys().next_back().copied()
    }
}

/// Ordered, de-duplicated record of nodes touched by one ingest.
#[derive(Default)]
struct ChangeSet {
    order: Vec<NodeId>,
    latest: HashMap<NodeId, Node>,
}

impl ChangeSet {
    fn record(&mut self, node: Node) {
        if !self.latest.contains_key(&node.id) {
            self.order.push(node.id);
        }
        self.latest.insert(node.id, node);
    }

    fn into_nodes(mut self) -> Vec<Node> {
        self.order
            .iter()
            .filter_map(|id| self.latest.remove(id))
            .collect()
    }
}

/// Aggregation engine facade over one owned node store.
pub struct AggregationService<S: NodeStore> {
    store: S,
    factor: usize,
    ingest_lock: Mutex<()>,
}

impl<S: NodeStore> AggregationService<S> {
    /// Creates service with the default fan-in of 5.
    pub fn new(store: S) -> Self {
        Self {
            store,
            factor: DEFAULT_AGGREGATION_FACTOR,
            ingest_lock: Mutex::new(()),
        }
    }

    /// Creates service with a custom fan-in.
    ///
    /// # Errors
    /// - Returns `InvalidFactor` when `factor < 2`.
    pub fn with_factor(store: S, factor: usize) -> Result<Self, AggregationError> {
        if factor < MIN_AGGREGATION_FACTOR {
            return Err(AggregationError::InvalidFactor(factor));
        }
        Ok(Self {
            store,
            factor,
            ingest_lock: Mutex::new(()),
        })
    }

    pub fn factor(&self) -> usize {
        self.factor
    }

    /// Read access to the owned store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stores a new leaf and collapses every level that becomes ready.
    ///
    /// Content is stored as given; input validation belongs to the caller.
    ///
    /// # Errors
    /// - `Inconsistent` when linking children fails; the new summary is
    ///   rolled back and the cascade stops.
    /// - `Store` / `IngestLockPoisoned` on storage or lock failures.
    pub fn ingest(&self, content: impl Into<String>) -> Result<IngestOutcome, AggregationError> {
        self.ingest_with(content, |_| {})
    }

    /// Same as [`ingest`](Self::ingest), and hands the committed nodes to
    /// `on_commit` before the ingest lock is released.
    ///
    /// `on_commit` runs once per ingest that committed anything, including
    /// an ingest that fails after storing its leaf. Callers observe commits
    /// in the order they happened. `on_commit` must not call back into this
    /// service's ingest or reset.
    pub fn ingest_with<F>(
        &self,
        content: impl Into<String>,
        on_commit: F,
    ) -> Result<IngestOutcome, AggregationError>
    where
        F: FnOnce(&[Node]),
    {
        let _guard = self
            .ingest_lock
            .lock()
            .map_err(|_| AggregationError::IngestLockPoisoned)?;

        let mut changes = ChangeSet::default();
        let result = self.store_and_cascade(content.into(), &mut changes);
        let changed = changes.into_nodes();
        if !changed.is_empty() {
            on_commit(&changed);
        }

        let (leaf_id, summary_ids) = result?;
        let leaf = changed
            .iter()
            .find(|node| node.id == leaf_id)
            .cloned()
            .ok_or(AggregationError::Store(StoreError::NodeNotFound(leaf_id)))?;
        Ok(IngestOutcome {
            leaf,
            changed,
            summary_ids,
        })
    }

    /// Loads one node by id; unknown ids yield `Ok(None)`.
    pub fn get_node(&self, id: NodeId) -> Result<Option<Node>, AggregationError> {
        self.store.get(id).map_err(Into::into)
    }

    /// Lists every node, oldest first.
    pub fn list_nodes(&self) -> Result<Vec<Node>, AggregationError> {
        let mut nodes = self.store.all()?;
        nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.level.cmp(&b.level)));
        Ok(nodes)
    }

    /// Per-level counts for the current tree.
    pub fn stats(&self) -> Result<TreeStats, AggregationError> {
        let levels = self.store.level_counts()?;
        let total_nodes = levels.values().map(|count| count.total).sum();
        Ok(TreeStats {
            total_nodes,
            levels,
        })
    }

    /// Drops the whole tree. Waits for any in-flight ingest.
    pub fn reset(&self) -> Result<(), AggregationError> {
        let _guard = self
            .ingest_lock
            .lock()
            .map_err(|_| AggregationError::IngestLockPoisoned)?;
        self.store.clear()?;
        info!("event=tree_reset module=aggregation status=ok");
        Ok(())
    }

    fn store_and_cascade(
        &self,
        content: String,
        changes: &mut ChangeSet,
    ) -> Result<(NodeId, Vec<NodeId>), AggregationError> {
        let leaf = Node::new_log(content);
        let leaf_id = leaf.id;
        self.store.put(leaf.clone())?;
        debug!(
            "event=log_ingested module=aggregation status=ok node_id={} content_chars={}",
            leaf_id,
            leaf.content.chars().count()
        );
        changes.record(leaf);

        let summary_ids = self.cascade(0, changes)?;
        Ok((leaf_id, summary_ids))
    }

    fn cascade(
        &self,
        start: Level,
        changes: &mut ChangeSet,
    ) -> Result<Vec<NodeId>, AggregationError> {
        let mut created = Vec::new();
        let mut level = start;
        while let Some(summary) = self.collapse(level, changes)? {
            created.push(summary.id);
            level = summary.level;
        }
        Ok(created)
    }

    /// Collapses the oldest `factor` frontier nodes at `level`, if present.
    ///
    /// Re-queries the store on every call; returns the new summary or `None`
    /// when the level is not ready.
    fn collapse(
        &self,
        level: Level,
        changes: &mut ChangeSet,
    ) -> Result<Option<Node>, AggregationError> {
        let mut frontier = self.store.unparented_at_level(level)?;
        if frontier.len() < self.factor {
            return Ok(None);
        }
        frontier.truncate(self.factor);

        let summary = Node::new_summary(&frontier);
        let summary_id = summary.id;
        let child_ids: Vec<NodeId> = frontier.iter().map(|node| node.id).collect();
        self.store.put(summary.clone())?;

        if let Err(source) = self.store.link_children(&child_ids, summary_id) {
            error!(
                "event=summary_link_failed module=aggregation status=error level={} summary_id={} child_ids={:?} error={}",
                level, summary_id, child_ids, source
            );
            if let Err(rollback) = self.store.remove(summary_id) {
                error!(
                    "event=summary_rollback_failed module=aggregation status=error summary_id={} error={}",
                    summary_id, rollback
                );
            }
            return Err(AggregationError::Inconsistent {
                level,
                summary_id,
                child_ids,
                source,
            });
        }

        info!(
            "event=summary_created module=aggregation status=ok summary_id={} level={} child_count={}",
            summary_id,
            summary.level,
            child_ids.len()
        );

        changes.record(summary.clone());
        for mut child in frontier {
            child.parent_id = Some(summary_id);
            changes.record(child);
        }
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::{AggregationError, ChangeSet, TreeStats};
    use crate::model::node::Node;
    use crate::repo::node_repo::{LevelCount, StoreError};
    use std::collections::BTreeMap;
    use std::error::Error;

    #[test]
    fn change_set_keeps_first_position_and_latest_state() {
        let first = Node::new_log("first");
        let second = Node::new_log("second");
        let mut updated_first = first.clone();
        updated_first.parent_id = Some(second.id);

        let mut changes = ChangeSet::default();
        changes.record(first.clone());
        changes.record(second.clone());
        changes.record(updated_first.clone());

        assert_eq!(changes.into_nodes(), vec![updated_first, second]);
    }

    #[test]
    fn tree_stats_height_is_highest_level() {
        assert_eq!(TreeStats::default().height(), None);

        let mut levels = BTreeMap::new();
        levels.insert(0, LevelCount::default());
        levels.insert(2, LevelCount::default());
        let stats = TreeStats {
            total_nodes: 0,
            levels,
        };
        assert_eq!(stats.height(), Some(2));
    }

    #[test]
    fn store_errors_are_chained_as_source() {
        let err = AggregationError::from(StoreError::LockPoisoned);
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "node store lock poisoned");
    }
}
