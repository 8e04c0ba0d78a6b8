//! Server-wide attack detection.
//!
//! The tracker counts inbound connections into a fixed evaluation window
//! and flips the server between normal and attack posture. Entering attack
//! mode arms the score multipliers and lowered thresholds across the
//! engine; leaving it requires a full quiet cooldown.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::AttackConfig;
use crate::notify::Notifier;

/// Connection-burst state machine and recent-name memory.
pub struct AttackTracker {
    config: AttackConfig,
    under_attack: AtomicBool,
    window_connections: AtomicU32,
    last_window: AtomicU32,
    last_detection: RwLock<Option<Instant>>,
    recent_names: RwLock<VecDeque<String>>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for AttackTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttackTracker")
            .field("under_attack", &self.is_under_attack())
            .field("window_connections", &self.window_connections.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl AttackTracker {
    /// Create a tracker from configuration.
    #[must_use]
    pub fn from_config(config: &AttackConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config: config.clone(),
            under_attack: AtomicBool::new(false),
            window_connections: AtomicU32::new(0),
            last_window: AtomicU32::new(0),
            last_detection: RwLock::new(None),
            recent_names: RwLock::new(VecDeque::new()),
            notifier,
        }
    }

    /// Count one inbound connection toward the current window.
    pub fn record_connection(&self) {
        self.window_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Remember a login name for similarity analysis.
    pub fn push_name(&self, name: &str) {
        let mut names = self.recent_names.write();
        if names.len() == self.config.name_history {
            names.pop_front();
        }
        names.push_back(name.to_owned());
    }

    /// Login names seen recently, oldest first.
    #[must_use]
    pub fn recent_names(&self) -> Vec<String> {
        self.recent_names.read().iter().cloned().collect()
    }

    /// Whether the server is currently in attack posture.
    #[must_use]
    pub fn is_under_attack(&self) -> bool {
        self.under_attack.load(Ordering::Relaxed)
    }

    /// Connections counted in the last completed window.
    #[must_use]
    pub fn last_window_connections(&self) -> u32 {
        self.last_window.load(Ordering::Relaxed)
    }

    /// Close the current window and update posture.
    ///
    /// The counter is read and cleared in one atomic step, so connections
    /// landing during evaluation are never lost or double counted; they
    /// belong to the next window. Re-evaluating without a condition change
    /// neither re-notifies nor oscillates.
    pub fn evaluate_window(&self) {
        let count = self.window_connections.swap(0, Ordering::Relaxed);
        self.last_window.store(count, Ordering::Relaxed);

        if count >= self.config.threshold {
            *self.last_detection.write() = Some(Instant::now());
            if !self.under_attack.swap(true, Ordering::Relaxed) {
                warn!(
                    connections = count,
                    threshold = self.config.threshold,
                    "attack detected"
                );
                self.notifier.attack_detected(count, self.config.window);
            }
            return;
        }

        if self.under_attack.load(Ordering::Relaxed) {
            let cooled = self
                .last_detection
                .read()
                .is_some_and(|at| at.elapsed() > self.config.cooldown);
            if cooled {
                self.under_attack.store(false, Ordering::Relaxed);
                debug!("attack cooldown elapsed");
                self.notifier.attack_ended();
            }
        }
    }
}
