//! Wire format
//!
//! Clients send plain text frames (`BUZZ`, `SCORE_UPDATE:alice:5`, ...). They
//! are decoded once into [`Command`] and everything downstream matches on the
//! enum. Server frames are either bare keywords (`PONG`, `PENALTY`), JSON
//! objects tagged with `type`, or relayed command frames.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::GameError;
use crate::types::PlayerName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Buzz,
    Lock,
    Unlock,
    Boot,
    Win,
    /// Empty the buzz queue without touching the lock
    Clear,
    ResetGame,
    Final,
    WagerRequest,
    ToggleScoreboard(bool),
    ScoreUpdate { name: PlayerName, delta: i64 },
    FinalAnswer { name: PlayerName, text: String },
    Wager { name: PlayerName, amount: String },
    DrawingMode(bool),
    ClearDrawings,
    /// Raw JSON object, relayed verbatim once validated
    DrawingSubmit(String),
}

impl Command {
    /// Keyword as it appears on the wire
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::Buzz => "BUZZ",
            Self::Lock => "LOCK",
            Self::Unlock => "UNLOCK",
            Self::Boot => "BOOT",
            Self::Win => "WIN",
            Self::Clear => "CLEAR",
            Self::ResetGame => "RESET_GAME",
            Self::Final => "FINAL",
            Self::WagerRequest => "WAGER_REQUEST",
            Self::ToggleScoreboard(_) => "TOGGLE_SCOREBOARD",
            Self::ScoreUpdate { .. } => "SCORE_UPDATE",
            Self::FinalAnswer { .. } => "FINAL_ANSWER",
            Self::Wager { .. } => "WAGER",
            Self::DrawingMode(_) => "DRAWING_MODE",
            Self::ClearDrawings => "CLEAR_DRAWINGS",
            Self::DrawingSubmit(_) => "DRAWING_SUBMIT",
        }
    }
}

impl FromStr for Command {
    type Err = GameError;

    fn from_str(frame: &str) -> Result<Self, Self::Err> {
        let (keyword, payload) = match frame.split_once(':') {
            Some((keyword, payload)) => (keyword, Some(payload)),
            None => (frame, None),
        };

        let command = match (keyword, payload) {
            ("PING", None) => Self::Ping,
            ("BUZZ", None) => Self::Buzz,
            ("LOCK", None) => Self::Lock,
            ("UNLOCK", None) => Self::Unlock,
            ("BOOT", None) => Self::Boot,
            ("WIN", None) => Self::Win,
            ("CLEAR", None) => Self::Clear,
            ("RESET_GAME", None) => Self::ResetGame,
            ("FINAL", None) => Self::Final,
            ("WAGER_REQUEST", None) => Self::WagerRequest,
            ("CLEAR_DRAWINGS", None) => Self::ClearDrawings,
            ("TOGGLE_SCOREBOARD", Some(p)) => {
                Self::ToggleScoreboard(parse_switch("TOGGLE_SCOREBOARD", p)?)
            }
            ("DRAWING_MODE", Some(p)) => Self::DrawingMode(parse_switch("DRAWING_MODE", p)?),
            ("SCORE_UPDATE", Some(p)) => {
                // Delta is always the last segment
                let (name, delta) = p
                    .rsplit_once(':')
                    .ok_or_else(|| GameError::malformed("SCORE_UPDATE", "expected name:delta"))?;
                let delta = delta.trim().parse::<i64>().map_err(|_| {
                    GameError::malformed("SCORE_UPDATE", format!("'{}' is not an integer", delta))
                })?;
                Self::ScoreUpdate {
                    name: name.to_string(),
                    delta,
                }
            }
            ("FINAL_ANSWER", Some(p)) => {
                let (name, text) = split_name("FINAL_ANSWER", p)?;
                Self::FinalAnswer { name, text }
            }
            ("WAGER", Some(p)) => {
                let (name, amount) = split_name("WAGER", p)?;
                Self::Wager { name, amount }
            }
            ("DRAWING_SUBMIT", Some(p)) => Self::DrawingSubmit(p.to_string()),
            _ => {
                let shown: String = keyword.chars().take(32).collect();
                return Err(GameError::UnknownCommand(shown));
            }
        };

        Ok(command)
    }
}

fn parse_switch(command: &'static str, payload: &str) -> Result<bool, GameError> {
    match payload {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        other => Err(GameError::malformed(
            command,
            format!("expected ON or OFF, got '{}'", other),
        )),
    }
}

fn split_name(command: &'static str, payload: &str) -> Result<(PlayerName, String), GameError> {
    payload
        .split_once(':')
        .map(|(name, rest)| (name.to_string(), rest.to_string()))
        .ok_or_else(|| GameError::malformed(command, "expected name:value"))
}

/// Body of a `DRAWING_SUBMIT` frame
#[derive(Debug, Clone, Deserialize)]
pub struct DrawingSubmission {
    pub username: String,
    pub timestamp: serde_json::Value,
    #[serde(rename = "imageData")]
    pub image_data: String,
}

/// The view of game state every connection receives after a state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Buzz order, first to buzz first
    pub queue: Vec<PlayerName>,
    /// True while buzzing is permitted
    pub buzz_lock: bool,
    /// Connected, authenticated players (host excluded)
    pub players: Vec<PlayerName>,
    /// Only present while the scoreboard is visible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<BTreeMap<PlayerName, i64>>,
    /// Set only on the snapshot that announces a WIN
    #[serde(default)]
    pub winner: Option<PlayerName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Pong,
    /// Buzz denied (locked, already queued, or rate limited)
    Penalty,
    /// Tells every client the game was reset
    Reset,
    Error { code: String, message: String },
    State(GameSnapshot),
    /// A command frame passed through to other connections
    Relay(String),
}

/// JSON-encoded server frames
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JsonFrame<'a> {
    Error { code: &'a str, message: &'a str },
    State(&'a GameSnapshot),
}

impl ServerMessage {
    pub fn error(err: &GameError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    pub fn internal_error() -> Self {
        Self::Error {
            code: "INTERNAL_ERROR".to_string(),
            message: "Internal server error".to_string(),
        }
    }

    /// Encode as the text frame sent over the transport
    pub fn to_text(&self) -> String {
        let json = match self {
            Self::Pong => return "PONG".to_string(),
            Self::Penalty => return "PENALTY".to_string(),
            Self::Reset => return "RESET_GAME".to_string(),
            Self::Relay(frame) => return frame.clone(),
            Self::Error { code, message } => JsonFrame::Error { code, message },
            Self::State(snapshot) => JsonFrame::State(snapshot),
        };

        serde_json::to_string(&json).unwrap_or_else(|e| {
            tracing::error!("Failed to encode server frame: {}", e);
            r#"{"type":"error","code":"INTERNAL_ERROR","message":"Internal server error"}"#
                .to_string()
        })
    }
}
