use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::protocol::GameSnapshot;
use crate::types::PlayerName;

/// The shared buzzer game.
///
/// Invariants:
/// - `buzz_queue` never holds a name twice
/// - while buzzing is closed the queue is empty
/// - every player that ever authenticated this epoch has a score entry
#[derive(Debug, Clone, Default)]
pub struct GameState {
    /// True while buzzing is permitted (set by UNLOCK)
    pub(super) buzz_lock: bool,
    pub(super) buzz_queue: VecDeque<PlayerName>,
    pub(super) scores: BTreeMap<PlayerName, i64>,
    pub(super) scoreboard_visible: bool,
    pub(super) drawing_mode: bool,
    pub(super) currently_drawing: BTreeSet<PlayerName>,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_buzz_open(&self) -> bool {
        self.buzz_lock
    }

    pub fn queue(&self) -> impl Iterator<Item = &PlayerName> {
        self.buzz_queue.iter()
    }

    pub fn scoreboard_visible(&self) -> bool {
        self.scoreboard_visible
    }

    pub fn drawing_mode(&self) -> bool {
        self.drawing_mode
    }

    pub fn currently_drawing(&self) -> &BTreeSet<PlayerName> {
        &self.currently_drawing
    }

    /// Append `name` to the queue if buzzing is open and it is not queued yet.
    /// Returns false when the buzz is denied.
    pub fn buzz(&mut self, name: &str) -> bool {
        if !self.buzz_lock || self.buzz_queue.iter().any(|n| n == name) {
            return false;
        }
        self.buzz_queue.push_back(name.to_string());
        true
    }

    /// Close buzzing and drop everyone from the queue
    pub fn lock(&mut self) {
        self.buzz_lock = false;
        self.buzz_queue.clear();
    }

    pub fn unlock(&mut self) {
        self.buzz_lock = true;
    }

    /// Drop the front of the queue (wrong answer); the next player is up
    pub fn boot(&mut self) -> Option<PlayerName> {
        self.buzz_queue.pop_front()
    }

    /// Award the round to the front of the queue.
    ///
    /// Clears the queue and closes buzzing. With an empty queue nothing changes
    /// and `None` is returned.
    pub fn win(&mut self) -> Option<PlayerName> {
        let winner = self.buzz_queue.pop_front()?;
        self.lock();
        Some(winner)
    }

    /// Empty the queue without touching the lock
    pub fn clear_queue(&mut self) {
        self.buzz_queue.clear();
    }

    pub fn set_scoreboard_visible(&mut self, visible: bool) {
        self.scoreboard_visible = visible;
    }

    /// Turning drawing mode off also forgets who is drawing
    pub fn set_drawing_mode(&mut self, on: bool) {
        self.drawing_mode = on;
        if !on {
            self.currently_drawing.clear();
        }
    }

    pub fn record_drawing(&mut self, name: &str) {
        self.currently_drawing.insert(name.to_string());
    }

    /// Start a new game epoch. Known players keep their score entries at zero.
    pub fn reset(&mut self) {
        self.lock();
        self.set_drawing_mode(false);
        self.reset_scores();
    }

    /// Remove a departed player from transient state; their score stays
    pub fn forget_player(&mut self, name: &str) {
        self.buzz_queue.retain(|n| n != name);
        self.currently_drawing.remove(name);
    }

    pub fn snapshot(
        &self,
        players: impl IntoIterator<Item = PlayerName>,
        winner: Option<PlayerName>,
    ) -> GameSnapshot {
        GameSnapshot {
            queue: self.buzz_queue.iter().cloned().collect(),
            buzz_lock: self.buzz_lock,
            players: players.into_iter().collect(),
            scores: self.scoreboard_visible.then(|| self.scores.clone()),
            winner,
        }
    }
}
