//! Shared server state.
//!
//! # Responsibility
//! - Own the aggregation engine and the push fan-out channel.
//! - Turn one ingest into exactly one `nodes_updated` broadcast.
//!
//! # Invariants
//! - Broadcast happens after the store mutation has committed and before
//!   the next ingest starts, so updates are sent in commit order.
//! - An ingest that fails after storing nodes still broadcasts them.
//! - Broadcasting never blocks and never fails the ingest.

use crate::config::Config;
use log::{debug, error};
use logtree_core::{AggregationError, AggregationService, InMemoryNodeStore, IngestOutcome, Node};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Engine type served over HTTP and WebSocket.
pub type Engine = AggregationService<InMemoryNodeStore>;

/// Message envelope pushed to subscribers.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PushMessage<'a> {
    /// Full snapshot sent once per subscriber on connect or resync.
    InitialNodes(&'a [Node]),
    /// Nodes created or mutated by one ingest.
    NodesUpdated(&'a [Node]),
}

impl PushMessage<'_> {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
    updates: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(engine: Engine, broadcast_capacity: usize) -> Self {
        let (updates, _rx) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            engine: Arc::new(engine),
            updates,
        }
    }

    /// Builds a fresh in-memory engine from configuration.
    pub fn from_config(config: &Config) -> Result<Self, AggregationError> {
        let engine =
            AggregationService::with_factor(InMemoryNodeStore::new(), config.aggregation_factor)?;
        Ok(Self::new(engine, config.broadcast_capacity))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Registers a new push subscriber.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.updates.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.updates.receiver_count()
    }

    /// Ingests one validated entry and broadcasts the changed nodes.
    ///
    /// Blocking: takes the engine's ingest lock.
    pub fn submit_log(&self, content: String) -> Result<IngestOutcome, AggregationError> {
        self.engine.ingest_with(content, |changed| self.publish(changed))
    }

    /// Encodes the current tree as an `initial_nodes` message.
    pub fn snapshot_message(&self) -> Result<String, SnapshotError> {
        let nodes = self.engine.list_nodes().map_err(SnapshotError::Engine)?;
        PushMessage::InitialNodes(&nodes)
            .encode()
            .map_err(SnapshotError::Encode)
    }

    fn publish(&self, changed: &[Node]) {
        let text = match PushMessage::NodesUpdated(changed).encode() {
            Ok(text) => text,
            Err(err) => {
                error!(
                    "event=push_encode_failed module=push status=error node_count={} error={}",
                    changed.len(),
                    err
                );
                return;
            }
        };
        match self.updates.send(text) {
            Ok(receivers) => debug!(
                "event=nodes_broadcast module=push status=ok node_count={} receivers={}",
                changed.len(),
                receivers
            ),
            Err(_) => debug!(
                "event=nodes_broadcast module=push status=ok node_count={} receivers=0",
                changed.len()
            ),
        }
    }
}

/// Errors while building a snapshot message.
#[derive(Debug)]
pub enum SnapshotError {
    Engine(AggregationError),
    Encode(serde_json::Error),
}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Engine(err) => write!(f, "{err}"),
            Self::Encode(err) => write!(f, "failed to encode snapshot: {err}"),
        }
    }
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Engine(err) => Some(err),
            Self::Encode(err) => Some(err),
        }
    }
}
