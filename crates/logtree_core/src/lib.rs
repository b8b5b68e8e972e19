//! Core domain logic for the log summary tree.
//! This crate is the single source of truth for aggregation invariants.

pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging};
pub use model::node::{derive_summary_content, Level, Node, NodeId, NodeKind};
pub use repo::node_repo::{InMemoryNodeStore, LevelCount, NodeStore, StoreError, StoreResult};
pub use service::aggregation_service::{
    AggregationError, AggregationService, IngestOutcome, TreeStats, DEFAULT_AGGREGATION_FACTOR,
    MIN_AGGREGATION_FACTOR,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
