//! Timing-based checks: the pre-login ping gate and packet cadence.

use std::sync::Arc;

use tracing::trace;

use crate::attack::AttackTracker;
use crate::config::{PacketTimingConfig, PingGateConfig};
use crate::profile::ConnectionProfile;

use super::Check;

/// Scores connections that skipped or rushed the status ping.
///
/// Real clients browse the server list before joining, which leaves a
/// status ping on the address shortly before login. Bots connect cold, or
/// fire the ping and the login in the same breath.
pub struct PingGateCheck {
    config: PingGateConfig,
    tracker: Arc<AttackTracker>,
}

impl PingGateCheck {
    /// Create the check.
    #[must_use]
    pub fn new(config: PingGateConfig, tracker: Arc<AttackTracker>) -> Self {
        Self { config, tracker }
    }
}

impl Check for PingGateCheck {
    fn name(&self) -> &'static str {
        "ping-gate"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn attack_multiplier(&self) -> f64 {
        self.config.attack_multiplier
    }

    fn score(&self, profile: &ConnectionProfile) -> u32 {
        if !profile.pinged_before_login() {
            // A cold join is mildly odd normally, loud during an attack.
            let score = if self.tracker.is_under_attack() {
                self.config.missing_attack_score
            } else {
                self.config.missing_score
            };
            return score.min(self.config.max_score);
        }

        let interval = profile.handshake_to_ping_ms();
        if interval >= 0 && (interval as u128) < self.config.min_interval.as_millis() {
            trace!(interval_ms = interval, "handshake to ping implausibly fast");
            return self.config.fast_score.min(self.config.max_score);
        }

        0
    }
}

/// Scores machine-like packet cadence.
///
/// Three independent signals: a mean inter-movement interval faster than
/// human input, a near-zero variance in that cadence, and a keep-alive
/// round trip below what a real network produces.
pub struct PacketTimingCheck {
    config: PacketTimingConfig,
}

impl PacketTimingCheck {
    /// Create the check.
    #[must_use]
    pub fn new(config: PacketTimingConfig) -> Self {
        Self { config }
    }
}

impl Check for PacketTimingCheck {
    fn name(&self) -> &'static str {
        "packet-timing"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn attack_multiplier(&self) -> f64 {
        self.config.attack_multiplier
    }

    fn score(&self, profile: &ConnectionProfile) -> u32 {
        let mut score = 0;

        if profile.move_interval_count() >= self.config.min_intervals {
            let mean = profile.mean_move_interval_ms();
            if mean >= 0.0 && mean < self.config.min_mean.as_secs_f64() * 1000.0 {
                score += self.config.fast_mean_score;
            }
            let variance = profile.move_interval_variance();
            if variance >= 0.0 && variance < self.config.variance_floor {
                trace!(variance, "machine-regular movement cadence");
                score += self.config.regular_score;
            }
        }

        let rtt = profile.mean_rtt_ms();
        if rtt >= 0.0 && rtt < self.config.min_rtt.as_secs_f64() * 1000.0 {
            score += self.config.fast_rtt_score;
        }

        score.min(self.config.max_score)
    }
}
