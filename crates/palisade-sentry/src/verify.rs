//! Session verification.
//!
//! Every joined session gets its own watcher task that re-scores the
//! profile on an interval until the session either earns allow-list
//! membership or draws a terminating verdict. Watchers are cheap, one
//! evaluation per interval per unverified session, and cancel themselves
//! the moment the profile disappears from the store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::{TICK, VerifyConfig};
use crate::executor::ActionExecutor;
use crate::lists::{PromotionRule, Whitelist};
use crate::notify::Notifier;
use crate::persist::ListStore;
use crate::profile::{ConnId, ConnectionProfile, ProfileStore};
use crate::score::ThreatCalculator;

/// Handle controlling one session's verification task.
#[derive(Debug)]
pub struct VerifyHandle {
    running: Arc<AtomicBool>,
}

impl VerifyHandle {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the task is still ticking.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the task at its next wakeup.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Runs per-session verification tasks and allow-list promotion.
pub struct VerificationScheduler {
    config: VerifyConfig,
    rule: PromotionRule,
    store: Arc<ProfileStore>,
    calculator: Arc<ThreatCalculator>,
    executor: Arc<ActionExecutor>,
    whitelist: Arc<Whitelist>,
    lists: Arc<ListStore>,
    notifier: Arc<dyn Notifier>,
    handles: RwLock<HashMap<ConnId, Arc<VerifyHandle>>>,
}

impl fmt::Debug for VerificationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationScheduler")
            .field("config", &self.config)
            .field("active", &self.active())
            .finish_non_exhaustive()
    }
}

impl VerificationScheduler {
    /// Create a scheduler over the shared engine state.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: VerifyConfig,
        rule: PromotionRule,
        store: Arc<ProfileStore>,
        calculator: Arc<ThreatCalculator>,
        executor: Arc<ActionExecutor>,
        whitelist: Arc<Whitelist>,
        lists: Arc<ListStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            rule,
            store,
            calculator,
            executor,
            whitelist,
            lists,
            notifier,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Start watching a joined session.
    ///
    /// A session whose identity is already allow-listed is never watched.
    /// Must run inside a tokio runtime.
    pub fn start_session(self: &Arc<Self>, conn: ConnId) {
        let Some(profile) = self.store.get(conn) else {
            return;
        };
        if let Some(player) = profile.player() {
            if self.whitelist.contains(player) {
                debug!(conn = %conn, player = %player, "already verified, not watched");
                return;
            }
        }

        let handle = Arc::new(VerifyHandle::new());
        handle.running.store(true, Ordering::SeqCst);
        if let Some(old) = self.handles.write().insert(conn, Arc::clone(&handle)) {
            old.stop();
        }

        let scheduler = Arc::clone(self);
        let running = Arc::clone(&handle.running);
        let interval = self.config.interval;
        let ticks_per_pass = (interval.as_millis() / TICK.as_millis()).max(1) as u32;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // The first interval tick fires immediately; swallow it so the
            // first pass lands a full interval after the join.
            timer.tick().await;

            while running.load(Ordering::SeqCst) {
                timer.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                if scheduler.verify_pass(conn, ticks_per_pass) {
                    running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        });
    }

    /// Stop watching a session, usually on disconnect.
    pub fn stop_session(&self, conn: ConnId) {
        if let Some(handle) = self.handles.write().remove(&conn) {
            handle.stop();
        }
    }

    /// Stop every watcher. Used at shutdown.
    pub fn stop_all(&self) {
        let mut handles = self.handles.write();
        for handle in handles.values() {
            handle.stop();
        }
        handles.clear();
    }

    /// Drop handles whose task already finished. Returns how many.
    pub fn prune(&self) -> usize {
        let mut handles = self.handles.write();
        let before = handles.len();
        handles.retain(|_, handle| handle.is_running());
        before - handles.len()
    }

    /// Number of sessions currently being watched.
    #[must_use]
    pub fn active(&self) -> usize {
        self.handles
            .read()
            .values()
            .filter(|handle| handle.is_running())
            .count()
    }

    /// One verification pass. Returns true when the watcher should stop.
    fn verify_pass(&self, conn: ConnId, ticks: u32) -> bool {
        let Some(profile) = self.store.get(conn) else {
            debug!(conn = %conn, "profile gone, verification abandoned");
            return true;
        };
        profile.advance_ticks(ticks);

        if self.try_promote(&profile) {
            return true;
        }

        let evaluation = self.calculator.evaluate(&profile);
        self.executor.apply_in_session(conn, &profile, &evaluation)
    }

    /// Attempt allow-list promotion.
    ///
    /// Returns true when the session is verified, whether this pass
    /// promoted it or an earlier one already had. Only a first insertion
    /// persists and notifies.
    fn try_promote(&self, profile: &ConnectionProfile) -> bool {
        if !self.rule.qualifies(profile) {
            return false;
        }
        let Some(player) = profile.player() else {
            return false;
        };
        if self.whitelist.add(player) {
            let name = profile.name();
            info!(
                player = %player,
                name = ?name,
                ticks = profile.ticks_since_join(),
                "session verified, player promoted"
            );
            self.lists.enqueue_whitelist(self.whitelist.players());
            self.notifier.player_promoted(player, name.as_deref());
        }
        true
    }
}
