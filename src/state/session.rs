//! Registry of live connections
//!
//! The registry owns one [`Connection`] per live transport. Game state refers
//! to players by name only, so a player reconnecting under the same name is a
//! brand new connection here (fresh liveness and rate-limit budgets).

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::Instant;

use crate::abuse::{AbuseConfig, RateLimits, WindowKind};
use crate::auth::AuthConfig;
use crate::broadcast::Outbox;
use crate::error::{GameError, GameResult};
use crate::types::{ConnectionId, Identity, PlayerName, Role};

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub outbox: Outbox,
    /// None until the handshake completes
    pub identity: Option<Identity>,
    pub connected_at: DateTime<Utc>,
    pub last_seen: Instant,
    limits: RateLimits,
}

impl Connection {
    pub fn role(&self) -> Option<Role> {
        self.identity.as_ref().map(|i| i.role)
    }

    pub fn is_player(&self) -> bool {
        self.role() == Some(Role::Player)
    }
}

#[derive(Debug)]
pub struct SessionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    /// The connection host-only relays go to
    host: Option<ConnectionId>,
    max_connections: usize,
}

impl SessionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            host: None,
            max_connections,
        }
    }

    /// Track a freshly accepted transport, before its handshake
    pub fn register(&mut self, outbox: Outbox, now: Instant) -> GameResult<ConnectionId> {
        if self.connections.len() >= self.max_connections {
            return Err(GameError::Capacity(self.max_connections));
        }

        let id = ConnectionId::new();
        self.connections.insert(
            id,
            Connection {
                id,
                outbox,
                identity: None,
                connected_at: Utc::now(),
                last_seen: now,
                limits: RateLimits::default(),
            },
        );
        Ok(id)
    }

    /// Resolve the handshake identity of `id`.
    ///
    /// A host login replaces any previous host reference. Player names must be
    /// unique among live sessions.
    pub fn authenticate(
        &mut self,
        id: ConnectionId,
        raw: &str,
        auth: &AuthConfig,
    ) -> GameResult<Identity> {
        if !self.connections.contains_key(&id) {
            return Err(GameError::UnknownConnection);
        }

        let identity = auth.identify(raw)?;

        if identity.role == Role::Player
            && self.connections.values().any(|c| {
                c.id != id && c.identity.as_ref().map(|i| &i.name) == Some(&identity.name)
            })
        {
            return Err(GameError::NameTaken(identity.name));
        }

        if identity.is_host() {
            if let Some(previous) = self.host.replace(id) {
                if previous != id {
                    tracing::info!(conn = %id, previous = %previous, "Host replaced");
                }
            }
        }

        if let Some(connection) = self.connections.get_mut(&id) {
            connection.identity = Some(identity.clone());
        }
        Ok(identity)
    }

    /// Forget a connection. Returns it only the first time, so cleanup runs once.
    pub fn deregister(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        if self.host == Some(id) {
            self.host = None;
        }
        Some(connection)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn host(&self) -> Option<ConnectionId> {
        self.host
    }

    /// Names of authenticated players (host excluded), sorted
    pub fn player_names(&self) -> BTreeSet<PlayerName> {
        self.connections
            .values()
            .filter_map(|c| match &c.identity {
                Some(identity) if identity.role == Role::Player && !identity.name.is_empty() => {
                    Some(identity.name.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Any received frame counts as a sign of life
    pub fn touch(&mut self, id: ConnectionId, now: Instant) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.last_seen = now;
        }
    }

    pub fn admit(
        &mut self,
        id: ConnectionId,
        kind: WindowKind,
        config: &AbuseConfig,
        now: Instant,
    ) -> bool {
        match self.connections.get_mut(&id) {
            Some(connection) => connection.limits.admit(config, kind, now),
            None => false,
        }
    }

    /// Connections that have been silent for longer than `timeout`
    pub fn stale(&self, now: Instant, timeout: Duration) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| now.saturating_duration_since(c.last_seen) > timeout)
            .map(|c| c.id)
            .collect()
    }

    /// Every authenticated connection
    pub fn authenticated(&self) -> Vec<(ConnectionId, Outbox)> {
        self.recipients(|c| c.identity.is_some())
    }

    /// Every authenticated player, optionally skipping one connection
    pub fn players_except(&self, except: Option<ConnectionId>) -> Vec<(ConnectionId, Outbox)> {
        self.recipients(|c| c.is_player() && Some(c.id) != except)
    }

    /// The current host, if one is connected
    pub fn host_recipient(&self) -> Vec<(ConnectionId, Outbox)> {
        self.host
            .and_then(|id| self.connections.get(&id))
            .map(|c| vec![(c.id, c.outbox.clone())])
            .unwrap_or_default()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    fn recipients(&self, filter: impl Fn(&Connection) -> bool) -> Vec<(ConnectionId, Outbox)> {
        self.connections
            .values()
            .filter(|c| filter(c))
            .map(|c| (c.id, c.outbox.clone()))
            .collect()
    }
}
