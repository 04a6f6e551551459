pub mod handlers;
mod host;
mod player;

use axum::{
    extract::{
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::Stream, stream::StreamExt, FutureExt};
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::broadcast::{self, Outbound, Outbox};
use crate::error::CLOSE_POLICY_VIOLATION;
use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::{ConnectionId, Identity, SessionContext};

/// Transport-level frame ceiling; protocol limits are enforced per message
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// How long a finished session waits for its writer to flush a close frame
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long an accepted socket may hold a slot before identifying itself
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::debug!("WebSocket connection request");

    ws.max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Supervise one accepted socket: register it, run its reader and writer, clean up
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, receiver) = socket.split();
    let (outbox, mut outbox_rx) = broadcast::outbox();

    let conn_id = match state.register(outbox.clone()).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("Rejecting connection: {}", e);
            let _ = sender.send(close_message(e.close_code(), e.code())).await;
            return;
        }
    };

    // Writer: drain the outbox onto the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(item) = outbox_rx.recv().await {
            match item {
                Outbound::Text(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let _ = sender.send(close_message(code, reason)).await;
                    break;
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(run_session(receiver, state.clone(), conn_id, outbox));

    // If either side finishes, the connection is over
    tokio::select! {
        _ = &mut recv_task => {
            // The writer stops once the last outbox handle is gone, after
            // flushing anything still queued (such as a close frame)
            if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
        _ = &mut send_task => {
            recv_task.abort();
            state.disconnect(conn_id).await;
        }
    }

    tracing::info!(conn = %conn_id, "WebSocket connection closed");
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    }))
}

/// Per-connection receive loop.
///
/// The first text frame is the identity handshake; every later text frame is a
/// command. Replies go through `outbox`. When the stream ends (or errors), or
/// the connection was cleaned up elsewhere, the connection is cleaned up.
pub async fn run_session<S, E>(
    mut frames: S,
    state: Arc<AppState>,
    conn_id: ConnectionId,
    outbox: Outbox,
) where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let closed = outbox.close_signal();

    if let Some(identity) = handshake(&mut frames, &closed, &state, conn_id, &outbox).await {
        let ctx = SessionContext::new(conn_id, identity);
        receive_commands(&mut frames, &closed, &state, &ctx, &outbox).await;
    }

    state.disconnect(conn_id).await;
}

/// Next frame, or `None` once the connection has been cleaned up
async fn next_frame<S>(frames: &mut S, closed: &Notify) -> Option<S::Item>
where
    S: Stream + Unpin,
{
    tokio::select! {
        frame = frames.next() => frame,
        _ = closed.notified() => None,
    }
}

async fn handshake<S, E>(
    frames: &mut S,
    closed: &Notify,
    state: &Arc<AppState>,
    conn_id: ConnectionId,
    outbox: &Outbox,
) -> Option<Identity>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let deadline = Instant::now() + HANDSHAKE_TIMEOUT;

    loop {
        let Ok(frame) = tokio::time::timeout_at(deadline, next_frame(frames, closed)).await else {
            tracing::warn!(conn = %conn_id, "No handshake within {:?}", HANDSHAKE_TIMEOUT);
            let _ = outbox.push(Outbound::Close {
                code: CLOSE_POLICY_VIOLATION,
                reason: "HANDSHAKE_TIMEOUT",
            });
            return None;
        };

        match frame? {
            Ok(Message::Text(raw)) => {
                state.touch(conn_id).await;
                return match state.authenticate(conn_id, raw.as_str()).await {
                    Ok(identity) => Some(identity),
                    Err(e) => {
                        tracing::warn!(conn = %conn_id, "Handshake rejected: {}", e);
                        let _ = outbox.push(Outbound::Close {
                            code: e.close_code(),
                            reason: e.code(),
                        });
                        None
                    }
                };
            }
            Ok(Message::Close(_)) => return None,
            Ok(_) => state.touch(conn_id).await,
            Err(e) => {
                tracing::debug!(conn = %conn_id, "WebSocket error during handshake: {}", e);
                return None;
            }
        }
    }
}

async fn receive_commands<S, E>(
    frames: &mut S,
    closed: &Notify,
    state: &Arc<AppState>,
    ctx: &SessionContext,
    outbox: &Outbox,
) where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = next_frame(frames, closed).await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                tracing::info!(conn = %ctx.id, name = %ctx.name(), "Client closed connection");
                break;
            }
            // Pings, pongs and binary frames only count as liveness
            Ok(_) => {
                state.touch(ctx.id).await;
                continue;
            }
            Err(e) => {
                tracing::debug!(conn = %ctx.id, "WebSocket error: {}", e);
                break;
            }
        };

        state.touch(ctx.id).await;
        tracing::debug!(conn = %ctx.id, name = %ctx.name(), bytes = text.len(), "Received frame");

        let reply = isolate_panics(ctx, handlers::handle_frame(state, ctx, text.as_str())).await;

        if let Some(reply) = reply {
            if outbox.push(Outbound::Text(reply.to_text())).is_err() {
                break;
            }
        }
    }
}

/// A panic while handling one frame answers `INTERNAL_ERROR` instead of
/// taking the connection down
async fn isolate_panics<F>(ctx: &SessionContext, handling: F) -> Option<ServerMessage>
where
    F: Future<Output = Option<ServerMessage>>,
{
    match AssertUnwindSafe(handling).catch_unwind().await {
        Ok(reply) => reply,
        Err(_) => {
            tracing::error!(conn = %ctx.id, name = %ctx.name(), "Panic while handling frame");
            Some(ServerMessage::internal_error())
        }
    }
}
