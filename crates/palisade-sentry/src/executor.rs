//! Action execution.
//!
//! Turns an [`Evaluation`] into enforcement. Pre-login verdicts answer the
//! caller directly. In-session verdicts become [`SessionDirective`]s queued
//! on a channel, because only the embedding server can close a live
//! session. Blacklist verdicts also ban the source address and queue a
//! persistence snapshot.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

use crate::config::ExecutorConfig;
use crate::events::{Action, PreLoginVerdict, SessionDirective};
use crate::lists::Blacklist;
use crate::notify::Notifier;
use crate::persist::ListStore;
use crate::profile::{ConnId, ConnectionProfile};
use crate::score::Evaluation;

/// Applies scored actions to connections.
pub struct ActionExecutor {
    config: ExecutorConfig,
    blacklist: Arc<Blacklist>,
    lists: Arc<ListStore>,
    notifier: Arc<dyn Notifier>,
    directive_tx: UnboundedSender<SessionDirective>,
    directive_rx: Mutex<UnboundedReceiver<SessionDirective>>,
    delayed: AtomicU64,
    kicked: AtomicU64,
    blacklisted: AtomicU64,
}

impl fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("config", &self.config)
            .field("delayed", &self.delayed)
            .field("kicked", &self.kicked)
            .field("blacklisted", &self.blacklisted)
            .finish_non_exhaustive()
    }
}

impl ActionExecutor {
    /// Create an executor over the shared deny list and persistence store.
    #[must_use]
    pub fn new(
        config: ExecutorConfig,
        blacklist: Arc<Blacklist>,
        lists: Arc<ListStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (directive_tx, directive_rx) = mpsc::unbounded_channel();
        Self {
            config,
            blacklist,
            lists,
            notifier,
            directive_tx,
            directive_rx: Mutex::new(directive_rx),
            delayed: AtomicU64::new(0),
            kicked: AtomicU64::new(0),
            blacklisted: AtomicU64::new(0),
        }
    }

    /// Enforce a verdict on a connection that has not logged in yet.
    ///
    /// With `delay_blocking` set the executor sleeps out the delay itself
    /// before returning; otherwise the caller owns the wait.
    pub fn apply_pre_login(
        &self,
        profile: &ConnectionProfile,
        evaluation: &Evaluation,
    ) -> PreLoginVerdict {
        match evaluation.action {
            Action::Allow => PreLoginVerdict::Allow,
            Action::Delay => {
                self.delayed.fetch_add(1, Ordering::Relaxed);
                let duration = self.config.delay.min(self.config.delay_max);
                info!(
                    addr = %profile.addr(),
                    total = evaluation.total,
                    duration_ms = duration.as_millis() as u64,
                    "login delayed"
                );
                if self.config.delay_blocking {
                    std::thread::sleep(duration);
                }
                PreLoginVerdict::Delay { duration }
            }
            Action::Kick => {
                self.kicked.fetch_add(1, Ordering::Relaxed);
                warn!(
                    addr = %profile.addr(),
                    total = evaluation.total,
                    breakdown = ?evaluation.breakdown,
                    "connection rejected before login"
                );
                self.notifier
                    .connection_rejected(profile.addr(), &self.config.kick_message);
                PreLoginVerdict::Reject {
                    reason: self.config.kick_message.clone(),
                }
            }
            Action::Blacklist => {
                self.blacklisted.fetch_add(1, Ordering::Relaxed);
                let ban_reason = format!("threat score {}", evaluation.total);
                warn!(
                    addr = %profile.addr(),
                    total = evaluation.total,
                    breakdown = ?evaluation.breakdown,
                    "connection rejected and address banned"
                );
                self.blacklist
                    .add(profile.addr(), self.config.auto_ban_duration, ban_reason);
                self.lists.enqueue_blacklist(self.blacklist.entries());
                self.notifier
                    .connection_rejected(profile.addr(), &self.config.kick_message);
                PreLoginVerdict::Reject {
                    reason: self.config.kick_message.clone(),
                }
            }
        }
    }

    /// Enforce a verdict on an established session.
    ///
    /// Returns true when the session is being terminated, which tells the
    /// verification task to stop. Kick and blacklist verdicts only queue a
    /// directive; the session layer performs the disconnect.
    pub fn apply_in_session(
        &self,
        conn: ConnId,
        profile: &ConnectionProfile,
        evaluation: &Evaluation,
    ) -> bool {
        match evaluation.action {
            Action::Allow | Action::Delay => false,
            Action::Kick => {
                self.kicked.fetch_add(1, Ordering::Relaxed);
                warn!(
                    conn = %conn,
                    addr = %profile.addr(),
                    total = evaluation.total,
                    breakdown = ?evaluation.breakdown,
                    "session flagged for disconnect"
                );
                self.send_directive(conn, profile, false);
                true
            }
            Action::Blacklist => {
                self.blacklisted.fetch_add(1, Ordering::Relaxed);
                let ban = self.config.blacklist_on_session_verdict;
                warn!(
                    conn = %conn,
                    addr = %profile.addr(),
                    total = evaluation.total,
                    breakdown = ?evaluation.breakdown,
                    banned = ban,
                    "session flagged for disconnect at blacklist severity"
                );
                if ban {
                    let reason = format!("threat score {}", evaluation.total);
                    self.blacklist
                        .add(profile.addr(), self.config.auto_ban_duration, reason);
                    self.lists.enqueue_blacklist(self.blacklist.entries());
                }
                self.send_directive(conn, profile, ban);
                true
            }
        }
    }

    fn send_directive(&self, conn: ConnId, profile: &ConnectionProfile, blacklisted: bool) {
        let directive = SessionDirective {
            conn,
            addr: profile.addr(),
            reason: self.config.kick_message.clone(),
            blacklisted,
        };
        if self.directive_tx.send(directive).is_err() {
            warn!(conn = %conn, "directive channel closed, disconnect lost");
        }
    }

    /// Drain all pending session directives.
    ///
    /// The embedding server polls this from its own loop and performs the
    /// disconnects it describes.
    #[must_use]
    pub fn take_directives(&self) -> Vec<SessionDirective> {
        let mut rx = self.directive_rx.lock();
        let mut directives = Vec::new();
        while let Ok(directive) = rx.try_recv() {
            directives.push(directive);
        }
        directives
    }

    /// Logins held so far.
    #[must_use]
    pub fn delayed(&self) -> u64 {
        self.delayed.load(Ordering::Relaxed)
    }

    /// Connections kicked so far.
    #[must_use]
    pub fn kicked(&self) -> u64 {
        self.kicked.load(Ordering::Relaxed)
    }

    /// Blacklist verdicts executed so far.
    #[must_use]
    pub fn blacklisted(&self) -> u64 {
        self.blacklisted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PersistConfig, SentryConfig};
    use crate::profile::ProfileStore;
    use std::net::IpAddr;
    use std::time::{Duration, Instant};
    use uuid::Uuid;

    struct RejectLog {
        rejections: Mutex<Vec<(IpAddr, String)>>,
    }

    impl RejectLog {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                rejections: Mutex::new(Vec::new()),
            })
        }
    }

    impl Notifier for RejectLog {
        fn attack_detected(&self, _connections: u32, _window: Duration) {}
        fn attack_ended(&self) {}
        fn player_promoted(&self, _player: Uuid, _name: Option<&str>) {}
        fn connection_rejected(&self, addr: IpAddr, reason: &str) {
            self.rejections.lock().push((addr, reason.to_string()));
        }
    }

    fn evaluation(total: u32, action: Action) -> Evaluation {
        Evaluation {
            total,
            action,
            breakdown: Vec::new(),
        }
    }

    fn executor_with(config: ExecutorConfig) -> (ActionExecutor, Arc<Blacklist>, Arc<RejectLog>) {
        let blacklist = Arc::new(Blacklist::new());
        let lists = Arc::new(ListStore::from_config(&PersistConfig::default()));
        let notifier = RejectLog::new();
        let executor = ActionExecutor::new(
            config,
            Arc::clone(&blacklist),
            lists,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        );
        (executor, blacklist, notifier)
    }

    fn profile_at(last: u8) -> (ConnId, Arc<ConnectionProfile>) {
        let store = ProfileStore::from_config(&SentryConfig::default());
        store.create(format!("10.6.0.{last}").parse().unwrap())
    }

    // ==================== Pre-Login Tests ====================

    #[test]
    fn test_allow_passes_through() {
        let (executor, blacklist, notifier) = executor_with(ExecutorConfig::default());
        let (_, profile) = profile_at(1);
        let verdict = executor.apply_pre_login(&profile, &evaluation(0, Action::Allow));
        assert_eq!(verdict, PreLoginVerdict::Allow);
        assert!(blacklist.is_empty());
        assert!(notifier.rejections.lock().is_empty());
    }

    #[test]
    fn test_delay_returns_configured_duration() {
        let (executor, _, _) = executor_with(ExecutorConfig::default());
        let (_, profile) = profile_at(1);
        let verdict = executor.apply_pre_login(&profile, &evaluation(30, Action::Delay));
        assert_eq!(
            verdict,
            PreLoginVerdict::Delay {
                duration: Duration::from_secs(2)
            }
        );
        assert_eq!(executor.delayed(), 1);
    }

    #[test]
    fn test_delay_clamped_to_ceiling() {
        let config = ExecutorConfig {
            delay: Duration::from_secs(30),
            delay_max: Duration::from_secs(5),
            ..ExecutorConfig::default()
        };
        let (executor, _, _) = executor_with(config);
        let (_, profile) = profile_at(1);
        let verdict = executor.apply_pre_login(&profile, &evaluation(30, Action::Delay));
        assert_eq!(
            verdict,
            PreLoginVerdict::Delay {
                duration: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn test_blocking_delay_sleeps_inline() {
        let config = ExecutorConfig {
            delay: Duration::from_millis(40),
            delay_blocking: true,
            ..ExecutorConfig::default()
        };
        let (executor, _, _) = executor_with(config);
        let (_, profile) = profile_at(1);
        let started = Instant::now();
        let verdict = executor.apply_pre_login(&profile, &evaluation(30, Action::Delay));
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert!(matches!(verdict, PreLoginVerdict::Delay { .. }));
    }

    #[test]
    fn test_kick_rejects_without_banning() {
        let (executor, blacklist, notifier) = executor_with(ExecutorConfig::default());
        let (_, profile) = profile_at(2);
        let verdict = executor.apply_pre_login(&profile, &evaluation(60, Action::Kick));
        assert!(!verdict.is_allowed());
        let PreLoginVerdict::Reject { reason } = verdict else {
            panic!("expected rejection");
        };
        assert_eq!(reason, "Connection rejected by server protection");
        assert!(blacklist.is_empty());
        assert_eq!(executor.kicked(), 1);
        assert_eq!(notifier.rejections.lock().len(), 1);
    }

    #[test]
    fn test_blacklist_rejects_and_bans() {
        let (executor, blacklist, notifier) = executor_with(ExecutorConfig::default());
        let (_, profile) = profile_at(3);
        let verdict = executor.apply_pre_login(&profile, &evaluation(90, Action::Blacklist));
        assert!(!verdict.is_allowed());
        assert!(blacklist.is_blocked(profile.addr()));
        assert_eq!(blacklist.entries()[0].reason, "threat score 90");
        assert_eq!(executor.blacklisted(), 1);
        assert_eq!(notifier.rejections.lock().len(), 1);
    }

    // ==================== In-Session Tests ====================

    #[test]
    fn test_session_allow_is_noop() {
        let (executor, _, _) = executor_with(ExecutorConfig::default());
        let (conn, profile) = profile_at(4);
        assert!(!executor.apply_in_session(conn, &profile, &evaluation(10, Action::Allow)));
        assert!(!executor.apply_in_session(conn, &profile, &evaluation(30, Action::Delay)));
        assert!(executor.take_directives().is_empty());
    }

    #[test]
    fn test_session_kick_queues_directive() {
        let (executor, blacklist, _) = executor_with(ExecutorConfig::default());
        let (conn, profile) = profile_at(5);
        assert!(executor.apply_in_session(conn, &profile, &evaluation(60, Action::Kick)));

        let directives = executor.take_directives();
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].conn, conn);
        assert_eq!(directives[0].addr, profile.addr());
        assert!(!directives[0].blacklisted);
        // Kick disconnects the session without touching the deny list.
        assert!(blacklist.is_empty());
    }

    #[test]
    fn test_session_blacklist_bans_and_flags() {
        let (executor, blacklist, _) = executor_with(ExecutorConfig::default());
        let (conn, profile) = profile_at(6);
        assert!(executor.apply_in_session(conn, &profile, &evaluation(90, Action::Blacklist)));

        let directives = executor.take_directives();
        assert!(directives[0].blacklisted);
        assert!(blacklist.is_blocked(profile.addr()));
    }

    #[test]
    fn test_session_blacklist_gate_disables_ban() {
        let config = ExecutorConfig {
            blacklist_on_session_verdict: false,
            ..ExecutorConfig::default()
        };
        let (executor, blacklist, _) = executor_with(config);
        let (conn, profile) = profile_at(7);
        assert!(executor.apply_in_session(conn, &profile, &evaluation(90, Action::Blacklist)));

        let directives = executor.take_directives();
        assert!(!directives[0].blacklisted);
        assert!(blacklist.is_empty());
    }

    #[test]
    fn test_take_directives_drains_queue() {
        let (executor, _, _) = executor_with(ExecutorConfig::default());
        let (conn_a, profile_a) = profile_at(8);
        let (conn_b, profile_b) = profile_at(9);
        executor.apply_in_session(conn_a, &profile_a, &evaluation(60, Action::Kick));
        executor.apply_in_session(conn_b, &profile_b, &evaluation(60, Action::Kick));

        assert_eq!(executor.take_directives().len(), 2);
        assert!(executor.take_directives().is_empty());
    }
}
