use serde::{Deserialize, Serialize};

/// Opaque identifier for one live transport
pub type ConnectionId = ulid::Ulid;

/// Display name a player authenticated with (also the key into scores and the buzz queue)
pub type PlayerName = String;

/// Name every authenticated host connection is normalized to
pub const HOST_NAME: &str = "host";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Player,
}

/// Who a connection turned out to be after its handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: PlayerName,
    pub role: Role,
}

impl Identity {
    pub fn host() -> Self {
        Self {
            name: HOST_NAME.to_string(),
            role: Role::Host,
        }
    }

    pub fn player(name: impl Into<PlayerName>) -> Self {
        Self {
            name: name.into(),
            role: Role::Player,
        }
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }
}

/// Everything a command handler needs to know about the sender
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: ConnectionId,
    pub identity: Identity,
}

impl SessionContext {
    pub fn new(id: ConnectionId, identity: Identity) -> Self {
        Self { id, identity }
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn role(&self) -> Role {
        self.identity.role
    }
}
