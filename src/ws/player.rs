//! Player message handlers
//!
//! Handlers for player-specific messages: buzzing, final-round answers and
//! wagers, drawing submissions.

use crate::abuse::WindowKind;
use crate::error::{GameError, GameResult};
use crate::protocol::{DrawingSubmission, ServerMessage};
use crate::state::{Announce, AppState};
use crate::types::SessionContext;
use crate::validate::{
    validate, MAX_ANSWER_CHARS, MAX_DRAWING_BYTES, MAX_USERNAME_CHARS, MAX_WAGER_CHARS,
};
use std::sync::Arc;

/// A denied buzz looks the same whether the lock was closed or the buzz
/// window ran out
pub async fn handle_buzz(
    state: &Arc<AppState>,
    ctx: &SessionContext,
) -> GameResult<Option<ServerMessage>> {
    if !state.admit(ctx.id, WindowKind::Buzz).await {
        tracing::warn!(conn = %ctx.id, name = %ctx.name(), "Buzz rate limited");
        return Ok(Some(ServerMessage::Penalty));
    }

    let name = ctx.name().to_string();
    let admitted = state
        .apply(|game| {
            if game.buzz(&name) {
                (true, Announce::State)
            } else {
                (false, Announce::Nothing)
            }
        })
        .await;

    if admitted {
        tracing::info!("{} buzzed in!", name);
        Ok(None)
    } else {
        tracing::debug!("Buzz from {} denied", name);
        Ok(Some(ServerMessage::Penalty))
    }
}

pub async fn handle_final_answer(
    state: &Arc<AppState>,
    ctx: &SessionContext,
    name: String,
    text: String,
) -> GameResult<Option<ServerMessage>> {
    check_claim(ctx, &name)?;
    let text = validate(&text, MAX_ANSWER_CHARS, "answer")?;

    tracing::info!("Final answer received from {}", ctx.name());
    state
        .send_to_host(ServerMessage::Relay(format!(
            "FINAL_ANSWER:{}:{}",
            ctx.name(),
            text
        )))
        .await;
    Ok(None)
}

pub async fn handle_wager(
    state: &Arc<AppState>,
    ctx: &SessionContext,
    name: String,
    amount: String,
) -> GameResult<Option<ServerMessage>> {
    check_claim(ctx, &name)?;
    let amount = validate(&amount, MAX_WAGER_CHARS, "wager")?;

    tracing::info!("Wager received from {}", ctx.name());
    state
        .send_to_host(ServerMessage::Relay(format!("WAGER:{}:{}", ctx.name(), amount)))
        .await;
    Ok(None)
}

/// Validate a drawing and pass it, untouched, to the host and the other players
pub async fn handle_drawing_submit(
    state: &Arc<AppState>,
    ctx: &SessionContext,
    payload: String,
) -> GameResult<Option<ServerMessage>> {
    if payload.len() > MAX_DRAWING_BYTES {
        return Err(GameError::validation(
            "drawing",
            format!("must be at most {} bytes", MAX_DRAWING_BYTES),
        ));
    }

    let submission: DrawingSubmission = serde_json::from_str(&payload)
        .map_err(|e| GameError::malformed("DRAWING_SUBMIT", e.to_string()))?;
    if submission.timestamp.is_null() {
        return Err(GameError::malformed("DRAWING_SUBMIT", "timestamp is null"));
    }
    if submission.image_data.is_empty() {
        return Err(GameError::malformed("DRAWING_SUBMIT", "imageData is empty"));
    }
    check_claim(ctx, &submission.username)?;

    let name = ctx.name().to_string();
    let size = payload.len();
    let relay = ServerMessage::Relay(format!("DRAWING_SUBMIT:{}", payload));
    let except = ctx.id;
    let accepted = state
        .apply(|game| {
            if game.drawing_mode() {
                game.record_drawing(&name);
                (true, Announce::ToHostAndPlayers { message: relay, except })
            } else {
                (false, Announce::Nothing)
            }
        })
        .await;
    if !accepted {
        return Err(GameError::DrawingModeOff);
    }

    tracing::info!("Drawing submitted by {} ({} bytes)", name, size);
    Ok(None)
}

/// The name a player writes into a directed message must be their own
fn check_claim(ctx: &SessionContext, claimed: &str) -> GameResult<()> {
    let claimed = validate(claimed, MAX_USERNAME_CHARS, "name")?;
    if claimed != ctx.name() {
        return Err(GameError::AuthMismatch { claimed });
    }
    Ok(())
}
