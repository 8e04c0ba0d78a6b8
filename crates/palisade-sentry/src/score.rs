//! Threat scoring.
//!
//! Runs every enabled check against a profile, sums the capped scores into
//! one total, and maps the total onto an action through the configured
//! thresholds. While an attack is in progress each raw score is scaled by
//! its check's attack multiplier and the thresholds themselves shrink, so
//! the same behavior draws a harsher response.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use crate::attack::AttackTracker;
use crate::checks::Check;
use crate::config::ThresholdConfig;
use crate::events::Action;
use crate::lists::Whitelist;
use crate::profile::ConnectionProfile;

/// Outcome of scoring one profile.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Combined score across all checks.
    pub total: u32,
    /// Action the total maps to.
    pub action: Action,
    /// Per-check contributions, zero scores omitted.
    pub breakdown: Vec<(&'static str, u32)>,
}

impl Evaluation {
    /// An all-clear result, used for whitelisted sessions.
    #[must_use]
    pub fn clean() -> Self {
        Self {
            total: 0,
            action: Action::Allow,
            breakdown: Vec::new(),
        }
    }

    /// Whether no check contributed anything.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.total == 0
    }
}

/// Combines check scores and maps totals onto actions.
pub struct ThreatCalculator {
    thresholds: ThresholdConfig,
    checks: Vec<Box<dyn Check>>,
    tracker: Arc<AttackTracker>,
    whitelist: Arc<Whitelist>,
}

impl fmt::Debug for ThreatCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreatCalculator")
            .field("thresholds", &self.thresholds)
            .field("checks", &self.checks.len())
            .finish_non_exhaustive()
    }
}

impl ThreatCalculator {
    /// Create a calculator over an installed check set.
    #[must_use]
    pub fn new(
        thresholds: ThresholdConfig,
        checks: Vec<Box<dyn Check>>,
        tracker: Arc<AttackTracker>,
        whitelist: Arc<Whitelist>,
    ) -> Self {
        Self {
            thresholds,
            checks,
            tracker,
            whitelist,
        }
    }

    /// Score a profile and pick an action.
    ///
    /// Whitelisted players short-circuit to an all-clear without running
    /// any check. A check that panics is scored zero and the rest still
    /// run. The profile's running threat maximum is updated before the
    /// action is chosen.
    pub fn evaluate(&self, profile: &ConnectionProfile) -> Evaluation {
        if let Some(player) = profile.player() {
            if self.whitelist.contains(player) {
                return Evaluation::clean();
            }
        }

        let under_attack = self.tracker.is_under_attack();
        let mut total: u32 = 0;
        let mut breakdown = Vec::new();

        for check in &self.checks {
            if !check.enabled() {
                continue;
            }
            let raw = match panic::catch_unwind(AssertUnwindSafe(|| check.score(profile))) {
                Ok(raw) => raw,
                Err(_) => {
                    error!(check = check.name(), "check panicked, scoring zero");
                    0
                }
            };
            let scored = if under_attack {
                (f64::from(raw) * check.attack_multiplier()).round() as u32
            } else {
                raw
            };
            if scored > 0 {
                total = total.saturating_add(scored);
                breakdown.push((check.name(), scored));
            }
        }

        profile.note_threat(total);
        let action = self.action_with_mode(total, under_attack);
        if total > 0 {
            debug!(
                addr = %profile.addr(),
                total,
                action = %action,
                under_attack,
                ?breakdown,
                "profile scored"
            );
        }

        Evaluation {
            total,
            action,
            breakdown,
        }
    }

    /// Map a total onto an action under the current attack mode.
    ///
    /// A total equal to a threshold lands in the harsher band.
    #[must_use]
    pub fn action_for(&self, total: u32) -> Action {
        self.action_with_mode(total, self.tracker.is_under_attack())
    }

    fn action_with_mode(&self, total: u32, under_attack: bool) -> Action {
        let (delay, kick, blacklist) = self.effective_thresholds(under_attack);
        if total < delay {
            Action::Allow
        } else if total < kick {
            Action::Delay
        } else if total < blacklist {
            Action::Kick
        } else {
            Action::Blacklist
        }
    }

    /// Thresholds currently in force.
    fn effective_thresholds(&self, under_attack: bool) -> (u32, u32, u32) {
        if !under_attack {
            return (
                self.thresholds.delay,
                self.thresholds.kick,
                self.thresholds.blacklist,
            );
        }
        let scale = self.thresholds.attack_scale;
        // A shrunk threshold stays within [1, normal]; zero stays zero.
        let shrink = |t: u32| t.min(((f64::from(t) * scale).round() as u32).max(1));
        (
            shrink(self.thresholds.delay),
            shrink(self.thresholds.kick),
            shrink(self.thresholds.blacklist),
        )
    }

    /// Number of installed checks, enabled or not.
    #[must_use]
    pub fn check_count(&self) -> usize {
        self.checks.len()
    }
}
