//! HTTP ingestion and query boundary.
//!
//! # Responsibility
//! - Validate submitted log content before it reaches the engine.
//! - Map engine results onto status codes and JSON bodies.
//!
//! # Invariants
//! - Invalid input never touches the store.
//! - Every error body has the shape `{"error": "<message>"}`.

use crate::push;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, info, warn};
use logtree_core::{AggregationError, Node, NodeId};
use serde_json::{json, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const INVALID_CONTENT_MESSAGE: &str = "Log content is required and must be a string.";

/// Errors surfaced by HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Body missing, unparsable, or `content` absent/blank/non-string.
    InvalidContent,
    /// Path segment is not a node id.
    InvalidNodeId(String),
    /// No node with this id.
    NodeNotFound(NodeId),
    /// Engine-level failure.
    Engine(AggregationError),
    /// Blocking ingest task did not complete.
    Task(String),
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidContent => write!(f, "{INVALID_CONTENT_MESSAGE}"),
            Self::InvalidNodeId(raw) => write!(f, "Invalid node id `{raw}`."),
            Self::NodeNotFound(id) => write!(f, "Node with id {id} not found."),
            Self::Engine(err) => write!(f, "{err}"),
            Self::Task(message) => write!(f, "ingest task failed: {message}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AggregationError> for ApiError {
    fn from(value: AggregationError) -> Self {
        Self::Engine(value)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidContent | Self::InvalidNodeId(_) => StatusCode::BAD_REQUEST,
            Self::NodeNotFound(_) => StatusCode::NOT_FOUND,
            Self::Engine(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(
                "event=request_failed module=api status=error http_status={} error={}",
                status.as_u16(),
                self
            );
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Extracts non-blank string `content` from a submission body.
pub fn parse_submission(body: &Value) -> Result<String, ApiError> {
    match body.get("content") {
        Some(Value::String(content)) if !content.trim().is_empty() => Ok(content.clone()),
        _ => Err(ApiError::InvalidContent),
    }
}

/// `POST /logs`
pub async fn create_log(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Node>), ApiError> {
    let Json(body) = body.map_err(|rejection| {
        warn!(
            "event=log_rejected module=api status=error reason=body error={}",
            rejection.body_text()
        );
        ApiError::InvalidContent
    })?;
    let content = parse_submission(&body).inspect_err(|_| {
        warn!("event=log_rejected module=api status=error reason=content");
    })?;

    let outcome = tokio::task::spawn_blocking(move || state.submit_log(content))
        .await
        .map_err(|err| ApiError::Task(err.to_string()))??;

    info!(
        "event=log_created module=api status=ok node_id={} summaries_created={} nodes_changed={}",
        outcome.leaf.id,
        outcome.summary_ids.len(),
        outcome.changed.len()
    );
    Ok((StatusCode::CREATED, Json(outcome.leaf)))
}

/// `GET /logs`
pub async fn list_nodes(State(state): State<AppState>) -> Result<Json<Vec<Node>>, ApiError> {
    Ok(Json(state.engine().list_nodes()?))
}

/// `GET /logs/:id`
pub async fn get_node(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Node>, ApiError> {
    let id: NodeId = raw_id
        .parse()
        .map_err(|_| ApiError::InvalidNodeId(raw_id.clone()))?;
    state
        .engine()
        .get_node(id)?
        .map(Json)
        .ok_or(ApiError::NodeNotFound(id))
}

/// `GET /`: banner for plain requests, push channel for WebSocket handshakes.
pub async fn root(State(state): State<AppState>, ws: Option<WebSocketUpgrade>) -> Response {
    match ws {
        Some(ws) => push::upgrade(ws, state),
        None => "Log Summarizer API with WebSocket is running!".into_response(),
    }
}
