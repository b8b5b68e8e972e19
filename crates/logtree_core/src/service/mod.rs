//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into ingest and query APIs.
//! - Keep transport layers decoupled from storage details.

pub mod aggregation_service;
