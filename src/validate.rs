//! Sanitizing and bounding of every externally supplied string
//!
//! Nothing a client sends reaches shared state or gets echoed to other
//! connections without passing through [`validate`].

use crate::error::{GameError, GameResult};

pub const MAX_USERNAME_CHARS: usize = 50;
pub const MAX_ANSWER_CHARS: usize = 500;
pub const MAX_WAGER_CHARS: usize = 50;
/// Upper bound for any single inbound protocol frame
pub const MAX_MESSAGE_BYTES: usize = 500_000;
/// Upper bound for the JSON body of a drawing submission
pub const MAX_DRAWING_BYTES: usize = 500_000;

/// Normalize `text` and enforce `max_chars` on the result.
///
/// Control characters other than `\n`, `\r` and `\t` are dropped, whitespace
/// runs collapse to a single space and the result is trimmed.
pub fn validate(text: &str, max_chars: usize, field: &'static str) -> GameResult<String> {
    let normalized = normalize(text);

    if normalized.is_empty() {
        return Err(GameError::validation(field, "must not be empty"));
    }

    let len = normalized.chars().count();
    if len > max_chars {
        return Err(GameError::validation(
            field,
            format!("must be at most {} characters (got {})", max_chars, len),
        ));
    }

    Ok(normalized)
}

fn normalize(text: &str) -> String {
    let stripped = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'));

    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in stripped {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}
