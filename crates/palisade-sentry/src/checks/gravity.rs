//! Gravity-consistency check.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::config::GravityCheckConfig;
use crate::profile::ConnectionProfile;

use super::Check;

/// Downward acceleration per tick in the simulated world.
const GRAVITY: f64 = 0.08;
/// Per-tick air drag multiplier on vertical velocity.
const DRAG: f64 = 0.98;
/// Vertical deltas at or under this are idle, not motion.
const IDLE_EPSILON: f64 = 1e-4;

/// Host-reported tick health, shared with the gravity check.
///
/// Stored as raw bits so readers never take a lock on the hot path.
#[derive(Debug)]
pub struct TickMonitor {
    tps_bits: AtomicU64,
}

impl TickMonitor {
    /// Create a monitor assuming a healthy 20 ticks per second.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tps_bits: AtomicU64::new(20.0_f64.to_bits()),
        }
    }

    /// Record the host's current tick rate.
    pub fn set_tps(&self, tps: f64) {
        self.tps_bits.store(tps.to_bits(), Ordering::Relaxed);
    }

    /// Current tick rate.
    #[must_use]
    pub fn tps(&self) -> f64 {
        f64::from_bits(self.tps_bits.load(Ordering::Relaxed))
    }
}

impl Default for TickMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Scores vertical motion that ignores the world's physics.
///
/// Airborne vertical velocity follows `v' = (v - gravity) * drag` each
/// tick. Successive position samples give observed velocities; each
/// velocity pair where the second deviates from the prediction beyond
/// tolerance is a violation. Idle deltas (standing, walking on flat
/// ground) carry no physics information and are excluded, as are pairs
/// around a landing. A degraded server tick rate stretches packet spacing,
/// so tolerance widens while the monitor reports one.
pub struct GravityCheck {
    config: GravityCheckConfig,
    ticks: Arc<TickMonitor>,
}

impl GravityCheck {
    /// Create the check.
    #[must_use]
    pub fn new(config: GravityCheckConfig, ticks: Arc<TickMonitor>) -> Self {
        Self { config, ticks }
    }

    fn tolerance(&self) -> f64 {
        if self.ticks.tps() < self.config.degraded_tps {
            self.config.tolerance * self.config.lag_tolerance_factor
        } else {
            self.config.tolerance
        }
    }
}

impl Check for GravityCheck {
    fn name(&self) -> &'static str {
        "gravity"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn attack_multiplier(&self) -> f64 {
        self.config.attack_multiplier
    }

    fn score(&self, profile: &ConnectionProfile) -> u32 {
        let samples = profile.vertical_samples();
        if samples.len() < self.config.min_samples {
            return 0;
        }

        let velocities: Vec<f64> = samples.windows(2).map(|w| w[1] - w[0]).collect();
        let tolerance = self.tolerance();
        let mut active = 0_usize;
        let mut violations = 0_usize;

        for pair in velocities.windows(2) {
            let (v, next) = (pair[0], pair[1]);
            if v.abs() <= IDLE_EPSILON || next.abs() <= IDLE_EPSILON {
                continue;
            }
            active += 1;
            let predicted = (v - GRAVITY) * DRAG;
            if (next - predicted).abs() > tolerance {
                violations += 1;
            }
        }

        if active < self.config.min_active_deltas {
            return 0;
        }

        let ratio = violations as f64 / active as f64;
        let score = if ratio >= self.config.severe_ratio {
            self.config.severe_score
        } else if ratio >= self.config.major_ratio {
            self.config.major_score
        } else if ratio >= self.config.minor_ratio {
            self.config.minor_score
        } else {
            0
        };
        if score > 0 {
            trace!(ratio, active, violations, score, "gravity model violated");
        }
        score.min(self.config.max_score)
    }
}
