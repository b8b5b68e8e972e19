//! Domain model for the log summary tree.
//!
//! # Responsibility
//! - Define the node record shared by leaves and summaries.
//!
//! # Invariants
//! - Every node is identified by a stable `NodeId`.
//! - Nodes are never deleted during normal operation; the tree is
//!   append-and-link only.

pub mod node;
