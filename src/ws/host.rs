//! Host-only command handlers
//!
//! All handlers in this module require the Host role.
//! Authorization is checked in the main dispatch layer before calling these.

use crate::error::GameResult;
use crate::protocol::ServerMessage;
use crate::state::{Announce, AppState};
use crate::validate::{validate, MAX_USERNAME_CHARS};
use std::sync::Arc;

pub async fn handle_lock(state: &Arc<AppState>) -> GameResult<Option<ServerMessage>> {
    tracing::info!("Host locked buzzing");
    state.update_and_broadcast(|game| game.lock()).await;
    Ok(None)
}

pub async fn handle_unlock(state: &Arc<AppState>) -> GameResult<Option<ServerMessage>> {
    tracing::info!("Host unlocked buzzing");
    state.update_and_broadcast(|game| game.unlock()).await;
    Ok(None)
}

pub async fn handle_boot(state: &Arc<AppState>) -> GameResult<Option<ServerMessage>> {
    let booted = state.update_and_broadcast(|game| game.boot()).await;
    tracing::info!("Host booted {:?}", booted);
    Ok(None)
}

pub async fn handle_win(state: &Arc<AppState>) -> GameResult<Option<ServerMessage>> {
    let winner = state
        .apply(|game| match game.win() {
            Some(winner) => (Some(winner.clone()), Announce::Winner(winner)),
            None => (None, Announce::Nothing),
        })
        .await;

    match winner {
        Some(winner) => tracing::info!("Host awarded the round to {}", winner),
        None => tracing::info!("Host pressed WIN with an empty queue"),
    }
    Ok(None)
}

pub async fn handle_clear(state: &Arc<AppState>) -> GameResult<Option<ServerMessage>> {
    tracing::info!("Host cleared the buzz queue");
    state.update_and_broadcast(|game| game.clear_queue()).await;
    Ok(None)
}

pub async fn handle_reset_game(state: &Arc<AppState>) -> GameResult<Option<ServerMessage>> {
    tracing::info!("Host reset the game");
    state
        .apply(|game| {
            game.reset();
            ((), Announce::Reset)
        })
        .await;
    Ok(None)
}

pub async fn handle_toggle_scoreboard(
    state: &Arc<AppState>,
    visible: bool,
) -> GameResult<Option<ServerMessage>> {
    tracing::info!("Host set scoreboard visible={}", visible);
    state
        .update_and_broadcast(|game| game.set_scoreboard_visible(visible))
        .await;
    Ok(None)
}

pub async fn handle_score_update(
    state: &Arc<AppState>,
    name: String,
    delta: i64,
) -> GameResult<Option<ServerMessage>> {
    let name = validate(&name, MAX_USERNAME_CHARS, "name")?;
    // An unknown name changes nothing and broadcasts nothing
    let total = state
        .apply(|game| match game.adjust_score(&name, delta) {
            Ok(total) => (Ok(total), Announce::State),
            Err(e) => (Err(e), Announce::Nothing),
        })
        .await?;
    tracing::info!("Score for {} changed by {} to {}", name, delta, total);
    Ok(None)
}

pub async fn handle_drawing_mode(
    state: &Arc<AppState>,
    on: bool,
) -> GameResult<Option<ServerMessage>> {
    tracing::info!("Host set drawing mode on={}", on);
    let frame = if on { "DRAWING_MODE:ON" } else { "DRAWING_MODE:OFF" };
    state
        .apply(|game| {
            game.set_drawing_mode(on);
            ((), Announce::ToPlayers(ServerMessage::Relay(frame.to_string())))
        })
        .await;
    Ok(None)
}

/// Signals that change nothing server-side and are passed on to every player
pub async fn handle_relay_to_players(
    state: &Arc<AppState>,
    signal: &'static str,
) -> GameResult<Option<ServerMessage>> {
    tracing::info!("Host signalled {}", signal);
    state
        .relay_to_players(ServerMessage::Relay(signal.to_string()))
        .await;
    Ok(None)
}
