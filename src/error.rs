//! Error taxonomy shared by the handshake and per-frame handling

/// WebSocket close code for a rejected handshake
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// WebSocket close code when the server is at capacity
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;
/// WebSocket close code for heartbeat eviction
pub const CLOSE_GOING_AWAY: u16 = 1001;

pub type GameResult<T> = Result<T, GameError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Malformed, oversized or empty field
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Authentication failed")]
    Auth,

    #[error("Name '{0}' is already in use")]
    NameTaken(String),

    #[error("Server is full ({0} connections)")]
    Capacity(usize),

    /// Claimed name in a directed message differs from the session's name
    #[error("Name '{claimed}' does not match your session")]
    AuthMismatch { claimed: String },

    #[error("Rate limit exceeded, slow down")]
    RateLimited,

    #[error("{0}")]
    Unauthorized(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Malformed {command} payload: {reason}")]
    Malformed {
        command: &'static str,
        reason: String,
    },

    #[error("Unknown player: {0}")]
    UnknownPlayer(String),

    #[error("Drawing mode is off")]
    DrawingModeOff,

    #[error("Connection is not registered")]
    UnknownConnection,
}

impl GameError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn malformed(command: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            command,
            reason: reason.into(),
        }
    }

    /// Stable identifier sent in error replies
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Auth => "AUTH_FAILED",
            Self::NameTaken(_) => "NAME_TAKEN",
            Self::Capacity(_) => "SERVER_FULL",
            Self::AuthMismatch { .. } => "AUTH_MISMATCH",
            Self::RateLimited => "RATE_LIMITED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::UnknownCommand(_) => "UNKNOWN_COMMAND",
            Self::Malformed { .. } => "MALFORMED",
            Self::UnknownPlayer(_) => "UNKNOWN_PLAYER",
            Self::DrawingModeOff => "DRAWING_MODE_OFF",
            Self::UnknownConnection => "UNKNOWN_CONNECTION",
        }
    }

    /// Close code used when this error ends a connection during the handshake
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Capacity(_) => CLOSE_TRY_AGAIN_LATER,
            _ => CLOSE_POLICY_VIOLATION,
        }
    }
}
