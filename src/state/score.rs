use super::GameState;
use crate::error::{GameError, GameResult};
use crate::types::PlayerName;

impl GameState {
    /// Ensure a score entry exists; an existing score survives reconnects
    pub fn register_player(&mut self, name: &str) {
        self.scores.entry(name.to_string()).or_insert(0);
    }

    pub fn score(&self, name: &str) -> Option<i64> {
        self.scores.get(name).copied()
    }

    pub fn scores(&self) -> impl Iterator<Item = (&PlayerName, &i64)> {
        self.scores.iter()
    }

    /// Add `delta` to a known player's score. Unknown names are never created.
    pub fn adjust_score(&mut self, name: &str, delta: i64) -> GameResult<i64> {
        let score = self
            .scores
            .get_mut(name)
            .ok_or_else(|| GameError::UnknownPlayer(name.to_string()))?;
        *score = score.saturating_add(delta);
        Ok(*score)
    }

    /// Zero every score, keeping the keys
    pub fn reset_scores(&mut self) {
        for score in self.scores.values_mut() {
            *score = 0;
        }
    }
}
