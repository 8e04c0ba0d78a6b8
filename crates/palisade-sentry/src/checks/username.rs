//! Username-pattern check.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use crate::attack::AttackTracker;
use crate::config::{SimilarityGate, UsernameCheckConfig};
use crate::profile::ConnectionProfile;

use super::{Check, levenshtein, shannon_entropy};

/// Shared prefix long enough to mark two names as the same template.
const SHARED_PREFIX_LEN: usize = 6;

/// Name shapes typical of throwaway bot generators.
static BOT_NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Stock prefixes with an optional counter.
        r"(?i)^(bot|test|user|player|guest|spam)[0-9_]*$",
        // Word, underscore, counter.
        r"^[A-Za-z]+_[0-9]{2,}$",
        // One letter riding a digit flood.
        r"^[A-Za-z][0-9]{5,}$",
        // Vowel-free keyboard mash of meaningful length.
        r"(?i)^[bcdfghjklmnpqrstvwxz]{7,}$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap_or_else(|_| unreachable!()))
    .collect()
});

/// Scores login names that look generated.
///
/// Four signals: template match, out-of-bounds length, low character
/// entropy, and similarity to recently seen names. Similarity is the only
/// gated signal; whether it runs depends on [`SimilarityGate`] and on the
/// ring holding enough history to compare against.
pub struct UsernameCheck {
    config: UsernameCheckConfig,
    tracker: Arc<AttackTracker>,
}

impl UsernameCheck {
    /// Create the check.
    #[must_use]
    pub fn new(config: UsernameCheckConfig, tracker: Arc<AttackTracker>) -> Self {
        Self { config, tracker }
    }

    fn similarity_active(&self) -> bool {
        match self.config.similarity_gate {
            SimilarityGate::Always => true,
            SimilarityGate::AttackOnly => self.tracker.is_under_attack(),
            SimilarityGate::Disabled => false,
        }
    }

    fn is_similar(&self, a: &str, b: &str) -> bool {
        // Edit distance only means anything when the names are long enough
        // that the allowed distance is a small fraction of them.
        let shorter = a.chars().count().min(b.chars().count());
        if shorter > self.config.similarity_distance * 2
            && levenshtein(a, b) <= self.config.similarity_distance
        {
            return true;
        }
        let prefix = a
            .chars()
            .zip(b.chars())
            .take_while(|(ca, cb)| ca == cb)
            .count();
        prefix >= SHARED_PREFIX_LEN
    }

    fn similar_to_recent(&self, name: &str) -> bool {
        let ring = self.tracker.recent_names();
        if ring.len() < self.config.min_history {
            return false;
        }
        // The ring already holds this login's own entry; skip one echo.
        let mut self_skipped = false;
        for other in &ring {
            if !self_skipped && other == name {
                self_skipped = true;
                continue;
            }
            if self.is_similar(name, other) {
                trace!(name, other, "login name similar to recent history");
                return true;
            }
        }
        false
    }
}

impl Check for UsernameCheck {
    fn name(&self) -> &'static str {
        "username"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn attack_multiplier(&self) -> f64 {
        self.config.attack_multiplier
    }

    fn score(&self, profile: &ConnectionProfile) -> u32 {
        let Some(name) = profile.name() else {
            return 0;
        };
        let mut score = 0;

        if BOT_NAME_PATTERNS.iter().any(|re| re.is_match(&name)) {
            score += self.config.pattern_score;
        }

        let len = name.chars().count();
        if len < self.config.min_length || len > self.config.max_length {
            score += self.config.length_score;
        }

        if shannon_entropy(&name) < self.config.entropy_floor {
            score += self.config.entropy_score;
        }

        if self.similarity_active() && self.similar_to_recent(&name) {
            score += self.config.similarity_score;
        }

        score.min(self.config.max_score)
    }
}
