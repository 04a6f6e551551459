//! Per-connection admission control
//!
//! Every connection carries two independent sliding windows:
//! - general traffic (every inbound frame)
//! - buzz attempts (only `BUZZ`)
//!
//! There is no global limiter; one noisy client only ever exhausts its own budget.

use std::{collections::VecDeque, time::Duration};
use tokio::time::Instant;

/// Which budget a frame is charged against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    General,
    Buzz,
}

/// Limit definition: at most `max_events` within any `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    pub max_events: usize,
    pub window: Duration,
}

impl RateLimiter {
    pub const fn new(max_events: usize, window: Duration) -> Self {
        Self { max_events, window }
    }

    /// 100 frames per 60 seconds
    pub const fn general() -> Self {
        Self::new(100, Duration::from_secs(60))
    }

    /// 3 buzzes per 5 seconds
    pub const fn buzz() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Rolling list of admitted event timestamps for one connection and one kind
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow {
    events: VecDeque<Instant>,
}

impl SlidingWindow {
    /// Record an event at `now` if the window has room.
    /// Returns true if allowed, false if rate limited (rejections are not recorded).
    pub fn admit(&mut self, limiter: &RateLimiter, now: Instant) -> bool {
        while let Some(oldest) = self.events.front() {
            if now.saturating_duration_since(*oldest) >= limiter.window {
                self.events.pop_front();
            } else {
                break;
            }
        }

        if self.events.len() >= limiter.max_events {
            return false;
        }

        self.events.push_back(now);
        true
    }
}

/// Both windows of a single connection
#[derive(Debug, Clone, Default)]
pub struct RateLimits {
    general: SlidingWindow,
    buzz: SlidingWindow,
}

impl RateLimits {
    pub fn admit(&mut self, config: &AbuseConfig, kind: WindowKind, now: Instant) -> bool {
        match kind {
            WindowKind::General => self.general.admit(&config.general, now),
            WindowKind::Buzz => self.buzz.admit(&config.buzz, now),
        }
    }
}

/// Anti-abuse configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbuseConfig {
    pub general: RateLimiter,
    pub buzz: RateLimiter,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            general: RateLimiter::general(),
            buzz: RateLimiter::buzz(),
        }
    }
}

impl AbuseConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let general = RateLimiter::new(
            env_parse("BUZZER_RATE_LIMIT_MAX").unwrap_or(defaults.general.max_events),
            env_parse("BUZZER_RATE_LIMIT_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.general.window),
        );

        let buzz = RateLimiter::new(
            env_parse("BUZZER_BUZZ_LIMIT_MAX").unwrap_or(defaults.buzz.max_events),
            env_parse("BUZZER_BUZZ_LIMIT_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.buzz.window),
        );

        tracing::info!(
            general_max = general.max_events,
            general_window = ?general.window,
            buzz_max = buzz.max_events,
            buzz_window = ?buzz.window,
            "Anti-abuse config loaded"
        );

        Self { general, buzz }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
