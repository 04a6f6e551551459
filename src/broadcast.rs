//! Fan-out to connection outboxes
//!
//! Every connection is written to only through its outbox; a writer task per
//! connection drains it onto the socket. Sending into an outbox never waits,
//! so one slow or dead socket cannot hold up delivery to the others. An outbox
//! that fills up is treated like a closed one: its connection is cleaned up.

use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;

use crate::protocol::ServerMessage;
use crate::types::ConnectionId;

/// Frames a connection may have queued before it counts as gone
pub const OUTBOX_CAPACITY: usize = 64;

/// One item queued for a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Send a close frame and stop writing
    Close { code: u16, reason: &'static str },
}

/// Sending half of a connection's queue, plus the signal that tells its
/// supervisor the connection was cleaned up
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Outbound>,
    closed: Arc<Notify>,
}

pub type OutboxReceiver = mpsc::Receiver<Outbound>;

pub fn outbox() -> (Outbox, OutboxReceiver) {
    outbox_with_capacity(OUTBOX_CAPACITY)
}

pub fn outbox_with_capacity(capacity: usize) -> (Outbox, OutboxReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let outbox = Outbox {
        tx,
        closed: Arc::new(Notify::new()),
    };
    (outbox, rx)
}

impl Outbox {
    /// Queue without waiting. Fails when the writer is gone or has fallen
    /// `OUTBOX_CAPACITY` frames behind.
    pub fn push(&self, item: Outbound) -> Result<(), TrySendError<Outbound>> {
        self.tx.try_send(item)
    }

    /// Wake the connection's supervisor so it tears the socket down
    pub fn close(&self) {
        self.closed.notify_one();
    }

    /// Handle the supervisor waits on; holding it does not keep the queue open
    pub fn close_signal(&self) -> Arc<Notify> {
        self.closed.clone()
    }
}

/// Send `message` to every recipient.
///
/// The frame is encoded once. Recipients whose writer is gone or full are
/// collected and returned so the caller can run their cleanup; they never stop
/// delivery to the rest.
pub fn deliver(recipients: &[(ConnectionId, Outbox)], message: &ServerMessage) -> Vec<ConnectionId> {
    if recipients.is_empty() {
        return Vec::new();
    }

    let text = message.to_text();
    let mut failed = Vec::new();

    for (id, outbox) in recipients {
        match outbox.push(Outbound::Text(text.clone())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!(conn = %id, "Outbox full, scheduling cleanup");
                failed.push(*id);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(conn = %id, "Outbox closed, scheduling cleanup");
                failed.push(*id);
            }
        }
    }

    failed
}
