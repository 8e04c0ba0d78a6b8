//! Behavioral checks around and after the join.

use std::sync::Arc;

use tracing::debug;

use crate::attack::AttackTracker;
use crate::config::{FirstJoinConfig, PostJoinConfig};
use crate::profile::ConnectionProfile;

use super::Check;

/// Scores what a session did inside its first moments in the world.
///
/// The verdict waits for the full analysis window, then freezes: the first
/// computed score is cached on the profile and replayed for the rest of
/// the session, so later good behavior cannot launder a botlike entrance.
pub struct FirstJoinCheck {
    config: FirstJoinConfig,
}

impl FirstJoinCheck {
    /// Create the check.
    #[must_use]
    pub fn new(config: FirstJoinConfig) -> Self {
        Self { config }
    }

    fn compute(&self, profile: &ConnectionProfile) -> u32 {
        let mut score = 0;

        if !profile.sent_position() {
            score += self.config.no_position_score;
        }

        let variety = profile.distinct_yaw().max(profile.distinct_pitch());
        if variety < self.config.min_look_variety {
            score += self.config.low_variety_score;
        }

        let first_move = profile.join_to_first_move_ms();
        let slow_ms = self.config.slow_start.as_millis() as i64;
        if first_move < 0 || first_move > slow_ms {
            score += self.config.slow_start_score;
        }

        score.min(self.config.max_score)
    }
}

impl Check for FirstJoinCheck {
    fn name(&self) -> &'static str {
        "first-join"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn attack_multiplier(&self) -> f64 {
        self.config.attack_multiplier
    }

    fn score(&self, profile: &ConnectionProfile) -> u32 {
        if !profile.has_joined() {
            return 0;
        }
        let cached = profile.first_join_score();
        if cached >= 0 {
            return cached as u32;
        }
        if profile.ticks_since_join() < self.config.window_ticks {
            // Window still open; no verdict yet.
            return 0;
        }
        let score = self.compute(profile);
        profile.cache_first_join_score(score);
        debug!(score, "first-join window closed");
        score
    }
}

/// Scores long-lived sessions that never start acting like players.
///
/// Only consulted once a session has real tenure. The interaction signal
/// is reserved for attack mode: plenty of genuine players idle, but an
/// idle session during a bot wave reads differently.
pub struct PostJoinCheck {
    config: PostJoinConfig,
    tracker: Arc<AttackTracker>,
}

impl PostJoinCheck {
    /// Create the check.
    #[must_use]
    pub fn new(config: PostJoinConfig, tracker: Arc<AttackTracker>) -> Self {
        Self { config, tracker }
    }
}

impl Check for PostJoinCheck {
    fn name(&self) -> &'static str {
        "post-join"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn attack_multiplier(&self) -> f64 {
        self.config.attack_multiplier
    }

    fn score(&self, profile: &ConnectionProfile) -> u32 {
        if !profile.has_joined() || profile.ticks_since_join() < self.config.min_ticks {
            return 0;
        }
        let mut score = 0;

        if !profile.has_chatted() {
            score += self.config.no_chat_score;
        }

        if profile.distinct_positions() < self.config.min_position_variety {
            score += self.config.low_variety_score;
        }

        if self.tracker.is_under_attack() && !profile.has_interacted() {
            score += self.config.no_interaction_score;
        }

        score.min(self.config.max_score)
    }
}
