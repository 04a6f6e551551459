mod game;
mod score;
pub mod session;

pub use game::GameState;
pub use session::{Connection, SessionRegistry};

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use crate::abuse::WindowKind;
use crate::broadcast::{deliver, Outbound, Outbox};
use crate::config::ServerConfig;
use crate::error::{GameResult, CLOSE_GOING_AWAY};
use crate::protocol::{GameSnapshot, ServerMessage};
use crate::types::{ConnectionId, Identity, PlayerName, Role};

/// Registry and game share one lock so every mutation is serialized
#[derive(Debug)]
pub struct Shared {
    pub sessions: SessionRegistry,
    pub game: GameState,
}

/// What a state change tells the connected clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announce {
    Nothing,
    /// A fresh snapshot to every authenticated connection
    State,
    /// A snapshot naming the round's winner
    Winner(PlayerName),
    /// `RESET_GAME` to everyone, then a fresh snapshot
    Reset,
    ToPlayers(ServerMessage),
    /// Only the current host; dropped when no host is connected
    ToHost(ServerMessage),
    /// The host plus every player except the sender
    ToHostAndPlayers {
        message: ServerMessage,
        except: ConnectionId,
    },
}

impl Shared {
    pub fn snapshot(&self, winner: Option<PlayerName>) -> GameSnapshot {
        self.game.snapshot(self.sessions.player_names(), winner)
    }

    /// Queue `announce` on the recipients' outboxes. Returns the connections
    /// that could not take it.
    fn announce(&self, announce: Announce) -> Vec<ConnectionId> {
        match announce {
            Announce::Nothing => Vec::new(),
            Announce::State => self.deliver_state(None),
            Announce::Winner(winner) => self.deliver_state(Some(winner)),
            Announce::Reset => {
                let mut failed = deliver(&self.sessions.authenticated(), &ServerMessage::Reset);
                failed.extend(self.deliver_state(None));
                failed
            }
            Announce::ToPlayers(message) => deliver(&self.sessions.players_except(None), &message),
            Announce::ToHost(message) => self.deliver_to_host(&message),
            Announce::ToHostAndPlayers { message, except } => {
                let mut failed = self.deliver_to_host(&message);
                failed.extend(deliver(&self.sessions.players_except(Some(except)), &message));
                failed
            }
        }
    }

    fn deliver_state(&self, winner: Option<PlayerName>) -> Vec<ConnectionId> {
        let snapshot = self.snapshot(winner);
        deliver(&self.sessions.authenticated(), &ServerMessage::State(snapshot))
    }

    fn deliver_to_host(&self, message: &ServerMessage) -> Vec<ConnectionId> {
        let recipients = self.sessions.host_recipient();
        if recipients.is_empty() {
            tracing::debug!("No host connected, dropping host-only message");
        }
        deliver(&recipients, message)
    }
}

/// Shared application state
pub struct AppState {
    pub config: Arc<ServerConfig>,
    shared: Mutex<Shared>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            shared: Mutex::new(Shared {
                sessions: SessionRegistry::new(config.max_connections),
                game: GameState::new(),
            }),
            config: Arc::new(config),
        }
    }

    /// Direct access to the locked state (for read-only inspection)
    pub async fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().await
    }

    /// Register an accepted transport; fails when the server is full
    pub async fn register(&self, outbox: Outbox) -> GameResult<ConnectionId> {
        let id = self.lock().await.sessions.register(outbox, Instant::now())?;
        tracing::debug!(conn = %id, "Connection registered");
        Ok(id)
    }

    /// Complete the handshake for `id`.
    ///
    /// On success players get a score entry and everyone receives a fresh
    /// snapshot. On failure nothing in the game changes.
    pub async fn authenticate(&self, id: ConnectionId, raw: &str) -> GameResult<Identity> {
        let (identity, failed) = {
            let mut shared = self.lock().await;
            let identity = shared
                .sessions
                .authenticate(id, raw, &self.config.auth)?;
            if identity.role == Role::Player {
                shared.game.register_player(&identity.name);
            }
            let failed = shared.announce(Announce::State);
            (identity, failed)
        };

        tracing::info!(conn = %id, name = %identity.name, role = ?identity.role, "Connection authenticated");
        self.cleanup_all(failed).await;
        Ok(identity)
    }

    pub async fn touch(&self, id: ConnectionId) {
        self.lock().await.sessions.touch(id, Instant::now());
    }

    /// Charge one event against `id`'s budget for `kind`
    pub async fn admit(&self, id: ConnectionId, kind: WindowKind) -> bool {
        self.lock()
            .await
            .sessions
            .admit(id, kind, &self.config.abuse, Instant::now())
    }

    /// Mutate the game and queue the resulting announcement in one critical
    /// section, so clients see changes in the order they happened.
    /// Connections that could not take the announcement are cleaned up after
    /// the lock is released.
    pub async fn apply<R>(&self, f: impl FnOnce(&mut GameState) -> (R, Announce)) -> R {
        let (result, failed) = {
            let mut shared = self.lock().await;
            let (result, announce) = f(&mut shared.game);
            (result, shared.announce(announce))
        };
        self.cleanup_all(failed).await;
        result
    }

    /// `apply` for changes that always broadcast a snapshot
    pub async fn update_and_broadcast<R>(&self, f: impl FnOnce(&mut GameState) -> R) -> R {
        self.apply(|game| (f(game), Announce::State)).await
    }

    pub async fn relay_to_players(&self, message: ServerMessage) {
        self.apply(|_| ((), Announce::ToPlayers(message))).await
    }

    pub async fn send_to_host(&self, message: ServerMessage) {
        self.apply(|_| ((), Announce::ToHost(message))).await
    }

    /// The single cleanup path for a connection (normal close, send failure
    /// or eviction). Returns true only for the call that actually removed it.
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        let Some(failed) = self.remove_connection(id).await else {
            return false;
        };
        self.cleanup_all(failed).await;
        true
    }

    /// Close and clean up every connection silent for longer than the
    /// heartbeat timeout. Returns the evicted ids.
    pub async fn evict_stale(&self, now: Instant) -> Vec<ConnectionId> {
        let stale = {
            let shared = self.lock().await;
            let stale = shared.sessions.stale(now, self.config.heartbeat_timeout);
            for id in &stale {
                if let Some(connection) = shared.sessions.get(*id) {
                    let _ = connection.outbox.push(Outbound::Close {
                        code: CLOSE_GOING_AWAY,
                        reason: "heartbeat timeout",
                    });
                }
            }
            stale
        };

        for id in &stale {
            tracing::info!(conn = %id, "Evicting idle connection");
            self.disconnect(*id).await;
        }
        stale
    }

    async fn cleanup_all(&self, mut pending: Vec<ConnectionId>) {
        while let Some(id) = pending.pop() {
            if let Some(failed) = self.remove_connection(id).await {
                pending.extend(failed);
            }
        }
    }

    /// Deregister `id`, wake its supervisor and tell everyone else. `None` if
    /// it was already gone; otherwise the connections the follow-up snapshot
    /// failed to reach.
    async fn remove_connection(&self, id: ConnectionId) -> Option<Vec<ConnectionId>> {
        let mut shared = self.lock().await;
        let connection = shared.sessions.deregister(id)?;
        connection.outbox.close();

        let Some(identity) = connection.identity else {
            tracing::debug!(conn = %id, "Unauthenticated connection removed");
            return Some(Vec::new());
        };
        if identity.role == Role::Player {
            shared.game.forget_player(&identity.name);
        }
        tracing::info!(conn = %id, name = %identity.name, "Connection cleaned up");
        Some(shared.announce(Announce::State))
    }
}
