//! WebSocket push boundary.
//!
//! # Responsibility
//! - Send one `initial_nodes` snapshot per subscriber on connect.
//! - Forward every `nodes_updated` broadcast to the subscriber.
//!
//! # Invariants
//! - A subscriber is registered on the broadcast channel before its snapshot
//!   is taken, so no update committed after the snapshot is missed.
//! - Delivery failures end only the failing subscriber's session.
//! - A lagging subscriber is resynchronized with a fresh snapshot.

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast::error::RecvError;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    upgrade(ws, state)
}

pub(crate) fn upgrade(ws: WebSocketUpgrade, state: AppState) -> Response {
    ws.on_upgrade(move |socket| serve_subscriber(socket, state))
}

async fn serve_subscriber(socket: WebSocket, state: AppState) {
    let subscriber = NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed);
    let mut updates = state.subscribe();
    let (mut sender, mut receiver) = socket.split();
    info!(
        "event=subscriber_connected module=push status=ok subscriber={} subscribers={}",
        subscriber,
        state.subscriber_count()
    );

    if !send_snapshot(&mut sender, &state, subscriber).await {
        return;
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(text) => {
                    if let Err(err) = sender.send(Message::Text(text)).await {
                        warn!(
                            "event=push_send_failed module=push status=error subscriber={} error={}",
                            subscriber, err
                        );
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        "event=subscriber_lagged module=push status=error subscriber={} skipped={}",
                        subscriber, skipped
                    );
                    if !send_snapshot(&mut sender, &state, subscriber).await {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => debug!(
                    "event=client_message module=push status=ok subscriber={} chars={}",
                    subscriber,
                    text.chars().count()
                ),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(
                        "event=subscriber_error module=push status=error subscriber={} error={}",
                        subscriber, err
                    );
                    break;
                }
            },
        }
    }

    info!(
        "event=subscriber_disconnected module=push status=ok subscriber={}",
        subscriber
    );
}

async fn send_snapshot(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &AppState,
    subscriber: u64,
) -> bool {
    let text = match state.snapshot_message() {
        Ok(text) => text,
        Err(err) => {
            error!(
                "event=snapshot_failed module=push status=error subscriber={} error={}",
                subscriber, err
            );
            return false;
        }
    };
    match sender.send(Message::Text(text)).await {
        Ok(()) => true,
        Err(err) => {
            warn!(
                "event=push_send_failed module=push status=error subscriber={} error={}",
                subscriber, err
            );
            false
        }
    }
}
