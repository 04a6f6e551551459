//! Command dispatch
//!
//! This module provides the main entry point for handling client frames.
//! Rate limiting, decoding and role authorization happen here, then commands
//! are dispatched to role-specific handler modules.

use std::sync::Arc;

use crate::abuse::WindowKind;
use crate::error::{GameError, GameResult};
use crate::protocol::{Command, ServerMessage};
use crate::state::AppState;
use crate::types::{Role, SessionContext};
use crate::validate::MAX_MESSAGE_BYTES;

use super::{host, player};

/// Macro to check host authorization and return early if unauthorized
macro_rules! check_host {
    ($ctx:expr, $action:expr) => {
        if $ctx.role() != Role::Host {
            return Err(GameError::Unauthorized(format!(
                "Only the host can {}",
                $action
            )));
        }
    };
}

/// Macro to check that the sender is a player
macro_rules! check_player {
    ($ctx:expr, $action:expr) => {
        if $ctx.role() != Role::Player {
            return Err(GameError::Unauthorized(format!(
                "Only players can {}",
                $action
            )));
        }
    };
}

/// Handle one inbound text frame and return the optional direct reply.
///
/// Never fails: every error becomes an error reply and the connection stays open.
pub async fn handle_frame(
    state: &Arc<AppState>,
    ctx: &SessionContext,
    frame: &str,
) -> Option<ServerMessage> {
    if !state.admit(ctx.id, WindowKind::General).await {
        tracing::warn!(conn = %ctx.id, name = %ctx.name(), "Rate limited");
        return Some(ServerMessage::error(&GameError::RateLimited));
    }

    if frame.len() > MAX_MESSAGE_BYTES {
        let err = GameError::validation(
            "message",
            format!("must be at most {} bytes", MAX_MESSAGE_BYTES),
        );
        return Some(ServerMessage::error(&err));
    }

    let command = match frame.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!(conn = %ctx.id, name = %ctx.name(), "Rejected frame: {}", e);
            return Some(ServerMessage::error(&e));
        }
    };

    let keyword = command.keyword();
    match handle_command(state, ctx, command).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(conn = %ctx.id, name = %ctx.name(), command = keyword, "{}", e);
            Some(ServerMessage::error(&e))
        }
    }
}

/// Dispatch a decoded command after checking the sender's role
pub async fn handle_command(
    state: &Arc<AppState>,
    ctx: &SessionContext,
    command: Command,
) -> GameResult<Option<ServerMessage>> {
    match command {
        Command::Ping => Ok(Some(ServerMessage::Pong)),

        // Player commands
        Command::Buzz => {
            check_player!(ctx, "buzz");
            player::handle_buzz(state, ctx).await
        }

        Command::FinalAnswer { name, text } => {
            check_player!(ctx, "submit final answers");
            player::handle_final_answer(state, ctx, name, text).await
        }

        Command::Wager { name, amount } => {
            check_player!(ctx, "wager");
            player::handle_wager(state, ctx, name, amount).await
        }

        Command::DrawingSubmit(payload) => {
            check_player!(ctx, "submit drawings");
            player::handle_drawing_submit(state, ctx, payload).await
        }

        // Host-only commands
        Command::Lock => {
            check_host!(ctx, "lock buzzing");
            host::handle_lock(state).await
        }

        Command::Unlock => {
            check_host!(ctx, "unlock buzzing");
            host::handle_unlock(state).await
        }

        Command::Boot => {
            check_host!(ctx, "boot players");
            host::handle_boot(state).await
        }

        Command::Win => {
            check_host!(ctx, "award wins");
            host::handle_win(state).await
        }

        Command::Clear => {
            check_host!(ctx, "clear the queue");
            host::handle_clear(state).await
        }

        Command::ResetGame => {
            check_host!(ctx, "reset the game");
            host::handle_reset_game(state).await
        }

        Command::ToggleScoreboard(visible) => {
            check_host!(ctx, "toggle the scoreboard");
            host::handle_toggle_scoreboard(state, visible).await
        }

        Command::ScoreUpdate { name, delta } => {
            check_host!(ctx, "update scores");
            host::handle_score_update(state, name, delta).await
        }

        Command::Final => {
            check_host!(ctx, "start the final round");
            host::handle_relay_to_players(state, "FINAL").await
        }

        Command::WagerRequest => {
            check_host!(ctx, "request wagers");
            host::handle_relay_to_players(state, "WAGER_REQUEST").await
        }

        Command::DrawingMode(on) => {
            check_host!(ctx, "toggle drawing mode");
            host::handle_drawing_mode(state, on).await
        }

        Command::ClearDrawings => {
            check_host!(ctx, "clear drawings");
            host::handle_relay_to_players(state, "CLEAR_DRAWINGS").await
        }
    }
}
