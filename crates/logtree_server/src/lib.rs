//! HTTP and WebSocket surface for the log summary tree.
//!
//! Routes:
//! - `POST /logs`: submit `{content}`, returns the created log node
//! - `GET /logs`: every node
//! - `GET /logs/:id`: one node
//! - `GET /ws` (or a WebSocket handshake on `/`): push channel

pub mod api;
pub mod config;
pub mod push;
pub mod state;

use axum::routing::get;
use axum::Router;
use log::info;
use logtree_core::AggregationError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use tower_http::cors::CorsLayer;

pub use config::{Config, ConfigError};
pub use state::{AppState, Engine, PushMessage};

/// Errors that stop the server.
#[derive(Debug)]
pub enum ServerError {
    Engine(AggregationError),
    Io(std::io::Error),
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Engine(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Engine(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<AggregationError> for ServerError {
    fn from(value: AggregationError) -> Self {
        Self::Engine(value)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Builds the application router over shared state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::root))
        .route("/ws", get(push::ws_handler))
        .route("/logs", get(api::list_nodes).post(api::create_log))
        .route("/logs/:id", get(api::get_node))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn serve(config: Config) -> Result<(), ServerError> {
    let state = AppState::from_config(&config)?;
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(
        "event=server_listening module=server status=ok addr={} aggregation_factor={} broadcast_capacity={}",
        listener.local_addr()?,
        config.aggregation_factor,
        config.broadcast_capacity
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("event=server_stopped module=server status=ok");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!(
            "event=signal_listen_failed module=server status=error error={}",
            err
        );
        std::future::pending::<()>().await;
    }
}
