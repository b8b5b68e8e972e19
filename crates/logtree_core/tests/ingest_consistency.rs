use logtree_core::{
    AggregationError, AggregationService, InMemoryNodeStore, Level, Node, NodeId, NodeStore,
    StoreError, StoreResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Store that can be told to fail the nth upcoming `link_children` call.
#[derive(Default)]
struct FlakyLinkStore {
    inner: InMemoryNodeStore,
    links_until_failure: AtomicUsize,
}

impl FlakyLinkStore {
    fn fail_link(&self, nth: usize) {
        self.links_until_failure.store(nth, Ordering::SeqCst);
    }
}

impl NodeStore for FlakyLinkStore {
    fn put(&self, node: Node) -> StoreResult<()> {
        self.inner.put(node)
    }

    fn get(&self, id: NodeId) -> StoreResult<Option<Node>> {
        self.inner.get(id)
    }

    fn all(&self) -> StoreResult<Vec<Node>> {
        self.inner.all()
    }

    fn unparented_at_level(&self, level: Level) -> StoreResult<Vec<Node>> {
        self.inner.unparented_at_level(level)
    }

    fn link_children(&self, ids: &[NodeId], parent_id: NodeId) -> StoreResult<()> {
        let remaining = self.links_until_failure.load(Ordering::SeqCst);
        if remaining > 0 {
            self.links_until_failure.store(remaining - 1, Ordering::SeqCst);
            if remaining == 1 {
                return Err(StoreError::NodeNotFound(ids[0]));
            }
        }
        self.inner.link_children(ids, parent_id)
    }

    fn remove(&self, id: NodeId) -> StoreResult<Option<Node>> {
        self.inner.remove(id)
    }

    fn len(&self) -> StoreResult<usize> {
        self.inner.len()
    }

    fn clear(&self) -> StoreResult<()> {
        self.inner.clear()
    }
}

#[test]
fn failed_link_aborts_ingest_and_rolls_back_summary() {
    let service = AggregationService::new(FlakyLinkStore::default());
    for i in 1..=4 {
        service.ingest(format!("L{i}")).unwrap();
    }
    service.store().fail_link(1);

    let err = service.ingest("L5").unwrap_err();

    match &err {
        AggregationError::Inconsistent {
            level, child_ids, ..
        } => {
            assert_eq!(*level, 0);
            assert_eq!(child_ids.len(), 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(std::error::Error::source(&err).is_some());

    let nodes = service.list_nodes().unwrap();
    assert_eq!(nodes.len(), 5);
    assert!(nodes.iter().all(|node| node.is_log() && node.parent_id.is_none()));
}

#[test]
fn next_ingest_recovers_after_aborted_link() {
    let service = AggregationService::new(FlakyLinkStore::default());
    for i in 1..=4 {
        service.ingest(format!("L{i}")).unwrap();
    }
    service.store().fail_link(1);
    service.ingest("L5").unwrap_err();

    let outcome = service.ingest("L6").unwrap();

    assert_eq!(outcome.summary_ids.len(), 1);
    let summary = service.get_node(outcome.summary_ids[0]).unwrap().unwrap();
    assert_eq!(summary.child_ids().len(), 5);
    assert!(!summary.child_ids().contains(&outcome.leaf.id));
    assert_eq!(service.store().unparented_at_level(0).unwrap().len(), 1);
}

#[test]
fn commit_hook_sees_nodes_of_successful_ingest() {
    let service = AggregationService::new(InMemoryNodeStore::new());
    for i in 1..=4 {
        service.ingest(format!("L{i}")).unwrap();
    }

    let mut committed = Vec::new();
    let outcome = service
        .ingest_with("L5", |changed| committed = changed.to_vec())
        .unwrap();

    assert_eq!(committed, outcome.changed);
    assert_eq!(committed.len(), 6);
}

#[test]
fn commit_hook_reports_nodes_kept_by_failed_cascade() {
    let service = AggregationService::with_factor(FlakyLinkStore::default(), 2).unwrap();
    // L1 + L2 -> level 1 summary; L3 waits on level 0.
    for i in 1..=3 {
        service.ingest(format!("L{i}")).unwrap();
    }
    // Level 0 collapse succeeds, level 1 collapse fails.
    service.store().fail_link(2);

    let mut committed = Vec::new();
    let err = service
        .ingest_with("L4", |changed| committed = changed.to_vec())
        .unwrap_err();

    assert!(matches!(err, AggregationError::Inconsistent { level: 1, .. }));
    assert_eq!(committed.len(), 3);
    assert_eq!(committed[0].content, "L4");
    let summary = committed.iter().find(|node| node.is_summary()).unwrap();
    assert_eq!(summary.level, 1);
    assert!(committed.iter().all(|node| node.level < 2));
    for node in &committed {
        assert_eq!(service.get_node(node.id).unwrap().as_ref(), Some(node));
    }
    for child in committed.iter().filter(|node| node.is_log()) {
        assert_eq!(child.parent_id, Some(summary.id));
    }
}

#[test]
fn commit_hook_runs_once_per_ingest() {
    let service = AggregationService::new(InMemoryNodeStore::new());
    let mut calls = 0;
    for i in 1..=5 {
        service.ingest_with(format!("L{i}"), |_| calls += 1).unwrap();
    }
    assert_eq!(calls, 5);
}

#[test]
fn concurrent_ingests_keep_tree_consistent() {
    let service = Arc::new(AggregationService::new(InMemoryNodeStore::new()));
    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let service = Arc::clone(&service);
            thread::spawn(move || {
                for i in 0..25 {
                    service.ingest(format!("w{worker}-{i}")).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let nodes = service.list_nodes().unwrap();
    assert_eq!(nodes.len(), 200 + 40 + 8 + 1);

    let stats = service.stats().unwrap();
    assert_eq!(stats.levels[&0].frontier, 0);
    assert_eq!(stats.levels[&1].frontier, 0);
    assert_eq!(stats.levels[&2].frontier, 3);
    assert_eq!(stats.levels[&3].frontier, 1);

    let mut linked = std::collections::HashSet::new();
    for node in nodes.iter().filter(|node| node.is_summary()) {
        assert_eq!(node.child_ids().len(), 5);
        for child in node.child_ids() {
            assert!(linked.insert(*child), "child {child} appears under two summaries");
        }
    }
}

#[test]
fn readers_never_see_dangling_parent_ids() {
    let service = Arc::new(AggregationService::new(InMemoryNodeStore::new()));
    let writer = {
        let service = Arc::clone(&service);
        thread::spawn(move || {
            for i in 0..250 {
                service.ingest(format!("entry {i}")).unwrap();
            }
        })
    };

    while !writer.is_finished() {
        let nodes = service.list_nodes().unwrap();
        let ids: std::collections::HashSet<NodeId> = nodes.iter().map(|node| node.id).collect();
        for node in &nodes {
            if let Some(parent_id) = node.parent_id {
                assert!(ids.contains(&parent_id), "dangling parent {parent_id}");
            }
        }
    }
    writer.join().unwrap();
}
