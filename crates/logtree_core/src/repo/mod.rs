//! Storage layer abstractions and implementations.
//!
//! # Responsibility
//! - Define the data access contract used by aggregation.
//! - Isolate locking and ordering details from service orchestration.
//!
//! # Invariants
//! - Lookups on unknown ids return `Ok(None)`, not an error.

pub mod node_repo;
