//! Engine facade.
//!
//! [`Sentry`] wires the profile store, heuristic checks, threat
//! calculator, attack tracker, executor, lists, and verification
//! scheduler into one embeddable object. The host server feeds it
//! connection lifecycle and packet events; it answers with pre-login
//! verdicts and queued session directives. Background maintenance runs on
//! tokio tasks controlled through [`MaintenanceHandles`].

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::attack::AttackTracker;
use crate::checks::{RateWindows, TickMonitor, build_checks};
use crate::config::SentryConfig;
use crate::error::SentryResult;
use crate::events::{PreLoginVerdict, SessionDirective, SessionEvent};
use crate::executor::ActionExecutor;
use crate::lists::{Blacklist, BlacklistEntry, PromotionRule, Whitelist};
use crate::notify::{Notifier, TracingNotifier};
use crate::persist::ListStore;
use crate::profile::{ConnId, ProfileStore};
use crate::score::ThreatCalculator;
use crate::verify::VerificationScheduler;

/// Cancellation handles for the background maintenance tasks.
///
/// Returned by [`Sentry::start`] and consumed by [`Sentry::shutdown`].
/// Dropping the handles without stopping them leaves the tasks running.
#[derive(Debug)]
pub struct MaintenanceHandles {
    window: Arc<AtomicBool>,
    sweep: Arc<AtomicBool>,
    writer: JoinHandle<()>,
}

impl MaintenanceHandles {
    /// Signal the window and sweep tasks to stop at their next wakeup.
    pub fn stop(&self) {
        self.window.store(false, Ordering::SeqCst);
        self.sweep.store(false, Ordering::SeqCst);
    }

    /// Whether any maintenance task is still scheduled to run.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.window.load(Ordering::SeqCst) || self.sweep.load(Ordering::SeqCst)
    }

    /// The persistence writer task, for callers that want to await the
    /// final drain.
    #[must_use]
    pub fn into_writer_handle(self) -> JoinHandle<()> {
        self.stop();
        self.writer
    }
}

/// Point-in-time engine counters for operator tooling.
#[derive(Debug, Clone, Serialize)]
pub struct SentryStats {
    /// Live connection profiles.
    pub profiles: usize,
    /// Profiles parked for reconnect continuity.
    pub retained: usize,
    /// Whether the server is in attack posture.
    pub under_attack: bool,
    /// Connections counted in the last completed attack window.
    pub last_window_connections: u32,
    /// Logins held so far.
    pub delayed: u64,
    /// Connections kicked so far.
    pub kicked: u64,
    /// Blacklist verdicts executed so far.
    pub blacklisted: u64,
    /// Addresses currently banned.
    pub blacklist_len: usize,
    /// Players currently allow-listed.
    pub whitelist_len: usize,
    /// Sessions currently under verification.
    pub watchers: usize,
}

/// The exploit mitigation engine.
///
/// One instance per server. All inbound methods are synchronous and safe
/// to call from any thread or task; background work runs on tokio tasks
/// started with [`Sentry::start`].
pub struct Sentry {
    config: Arc<SentryConfig>,
    store: Arc<ProfileStore>,
    windows: Arc<RateWindows>,
    ticks: Arc<TickMonitor>,
    tracker: Arc<AttackTracker>,
    calculator: Arc<ThreatCalculator>,
    blacklist: Arc<Blacklist>,
    whitelist: Arc<Whitelist>,
    lists: Arc<ListStore>,
    executor: Arc<ActionExecutor>,
    scheduler: Arc<VerificationScheduler>,
    notifier: Arc<dyn Notifier>,
}

impl fmt::Debug for Sentry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sentry")
            .field("profiles", &self.store.len())
            .field("under_attack", &self.tracker.is_under_attack())
            .finish_non_exhaustive()
    }
}

impl Sentry {
    /// Create an engine that reports through tracing only.
    #[must_use]
    pub fn new(config: SentryConfig) -> Self {
        Self::with_notifier(config, Arc::new(TracingNotifier))
    }

    /// Create an engine with a caller-provided notifier.
    #[must_use]
    pub fn with_notifier(config: SentryConfig, notifier: Arc<dyn Notifier>) -> Self {
        let config = Arc::new(config.sanitized());
        let store = Arc::new(ProfileStore::from_config(&config));
        let windows = Arc::new(RateWindows::new(config.rate.window));
        let ticks = Arc::new(TickMonitor::new());
        let tracker = Arc::new(AttackTracker::from_config(
            &config.attack,
            Arc::clone(&notifier),
        ));
        let blacklist = Arc::new(Blacklist::new());
        let whitelist = Arc::new(Whitelist::new());
        let lists = Arc::new(ListStore::from_config(&config.persist));

        let checks = build_checks(&config, &tracker, &windows, &ticks);
        let calculator = Arc::new(ThreatCalculator::new(
            config.thresholds.clone(),
            checks,
            Arc::clone(&tracker),
            Arc::clone(&whitelist),
        ));
        let executor = Arc::new(ActionExecutor::new(
            config.executor.clone(),
            Arc::clone(&blacklist),
            Arc::clone(&lists),
            Arc::clone(&notifier),
        ));
        let scheduler = Arc::new(VerificationScheduler::new(
            config.verify.clone(),
            PromotionRule::from_config(&config.promotion),
            Arc::clone(&store),
            Arc::clone(&calculator),
            Arc::clone(&executor),
            Arc::clone(&whitelist),
            Arc::clone(&lists),
            Arc::clone(&notifier),
        ));

        Self {
            config,
            store,
            windows,
            ticks,
            tracker,
            calculator,
            blacklist,
            whitelist,
            lists,
            executor,
            scheduler,
            notifier,
        }
    }

    // ==================== Lifecycle ====================

    /// Load both persisted lists. Returns installed (banned, allowed)
    /// counts. Missing or damaged files load as empty.
    pub fn load_lists(&self) -> (usize, usize) {
        self.lists.load(&self.blacklist, &self.whitelist)
    }

    /// Spawn the background maintenance tasks.
    ///
    /// One task closes attack windows, one sweeps stale state, one writes
    /// list snapshots. Must run inside a tokio runtime.
    pub fn start(&self) -> MaintenanceHandles {
        let writer = self.lists.start_writer();

        let window = Arc::new(AtomicBool::new(true));
        {
            let running = Arc::clone(&window);
            let tracker = Arc::clone(&self.tracker);
            let period = self.config.attack.window;
            tokio::spawn(async move {
                let mut timer = tokio::time::interval(period);
                timer.tick().await;
                while running.load(Ordering::SeqCst) {
                    timer.tick().await;
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    tracker.evaluate_window();
                }
            });
        }

        let sweep = Arc::new(AtomicBool::new(true));
        {
            let running = Arc::clone(&sweep);
            let store = Arc::clone(&self.store);
            let windows = Arc::clone(&self.windows);
            let scheduler = Arc::clone(&self.scheduler);
            let idle = self.config.profile.idle_timeout;
            let period = self.config.profile.sweep_interval;
            tokio::spawn(async move {
                let mut timer = tokio::time::interval(period);
                timer.tick().await;
                while running.load(Ordering::SeqCst) {
                    timer.tick().await;
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    let evicted = store.sweep_stale(idle);
                    windows.prune();
                    let reaped = scheduler.prune();
                    if evicted > 0 || reaped > 0 {
                        debug!(evicted, reaped, "maintenance sweep");
                    }
                }
            });
        }

        info!("sentry maintenance started");
        MaintenanceHandles {
            window,
            sweep,
            writer,
        }
    }

    /// Stop background work and flush both lists to disk.
    pub fn shutdown(&self, handles: MaintenanceHandles) -> SentryResult<()> {
        handles.stop();
        self.scheduler.stop_all();
        self.lists.stop_writer();
        self.lists.flush(&self.blacklist, &self.whitelist)?;
        info!("sentry stopped, lists flushed");
        Ok(())
    }

    // ==================== Connection Lifecycle ====================

    /// Track a new inbound connection.
    ///
    /// Creates (or revives) the profile for the address, counts the
    /// connection toward the rate windows and the attack window, and
    /// returns the handle all further calls use.
    pub fn connect(&self, addr: IpAddr) -> ConnId {
        let (conn, _) = self.store.create(addr);
        self.windows.record(addr);
        self.tracker.record_connection();
        debug!(conn = %conn, addr = %addr, "connection tracked");
        conn
    }

    /// Record a protocol event against a connection's profile.
    ///
    /// Events for unknown handles are dropped; the profile may have been
    /// swept or the host never registered the connection.
    pub fn handle_session_event(&self, conn: ConnId, event: &SessionEvent) {
        let Some(profile) = self.store.get(conn) else {
            debug!(conn = %conn, kind = event.kind(), "event for unknown connection dropped");
            return;
        };
        match event {
            SessionEvent::Handshake {
                protocol_version,
                hostname,
            } => profile.record_handshake(*protocol_version, hostname),
            SessionEvent::StatusPing => profile.record_ping(),
            SessionEvent::LoginStart { name } => {
                profile.record_login_start(name);
                self.tracker.push_name(name);
            }
            SessionEvent::EncryptionRequest => profile.record_encryption_request(),
            SessionEvent::EncryptionResponse => profile.record_encryption_response(),
            SessionEvent::ClientSettings => profile.record_client_settings(),
            SessionEvent::Brand { brand } => profile.record_brand(brand),
            SessionEvent::Movement { x, y, z, look } => {
                profile.record_movement(*x, *y, *z, look.map(|l| (l.yaw, l.pitch)));
            }
            SessionEvent::Rotation { look } => profile.record_rotation(look.yaw, look.pitch),
            SessionEvent::Chat => profile.record_chat(),
            SessionEvent::KeepAliveSent => profile.record_keepalive_sent(),
            SessionEvent::KeepAliveAck => profile.record_keepalive_ack(),
            SessionEvent::InventoryClick | SessionEvent::WorldInteract => {
                profile.record_interaction();
            }
        }
    }

    /// Gate a login attempt.
    ///
    /// The deny list is consulted before any scoring; a banned address is
    /// refused outright. Otherwise the claimed identity is bound to the
    /// profile, every check runs, and the executor turns the verdict into
    /// an answer the session layer acts on.
    pub fn pre_login(&self, conn: ConnId, player: Option<Uuid>) -> PreLoginVerdict {
        let Some(profile) = self.store.get(conn) else {
            warn!(conn = %conn, "pre-login for unknown connection, allowing");
            return PreLoginVerdict::Allow;
        };

        let addr = profile.addr();
        if self.blacklist.is_blocked(addr) {
            info!(addr = %addr, "blacklisted address refused at login");
            self.notifier
                .connection_rejected(addr, &self.config.executor.kick_message);
            return PreLoginVerdict::Reject {
                reason: self.config.executor.kick_message.clone(),
            };
        }

        if let Some(player) = player {
            self.store.bind_identity(conn, player);
        }

        let evaluation = self.calculator.evaluate(&profile);
        self.executor.apply_pre_login(&profile, &evaluation)
    }

    /// Mark a connection as fully joined and start watching it.
    pub fn on_join(&self, conn: ConnId) {
        let Some(profile) = self.store.get(conn) else {
            return;
        };
        profile.mark_joined();
        self.scheduler.start_session(conn);
        debug!(conn = %conn, addr = %profile.addr(), "session joined");
    }

    /// Stop watching a disconnected session and park its profile.
    pub fn on_disconnect(&self, conn: ConnId) {
        self.scheduler.stop_session(conn);
        if self.store.release(conn).is_some() {
            debug!(conn = %conn, "session released");
        }
    }

    // ==================== Enforcement Surface ====================

    /// Drain pending disconnect directives for the session layer.
    #[must_use]
    pub fn take_directives(&self) -> Vec<SessionDirective> {
        self.executor.take_directives()
    }

    /// Report the host's current tick rate for lag compensation.
    pub fn set_tick_rate(&self, tps: f64) {
        self.ticks.set_tps(tps);
    }

    /// Ban an address manually. Zero duration means permanent.
    pub fn ban(&self, addr: IpAddr, duration: Duration, reason: impl Into<String>) {
        self.blacklist.add(addr, duration, reason);
        self.lists.enqueue_blacklist(self.blacklist.entries());
    }

    /// Lift a ban manually. Returns whether one existed.
    pub fn unban(&self, addr: IpAddr) -> bool {
        let removed = self.blacklist.remove(addr);
        if removed {
            self.lists.enqueue_blacklist(self.blacklist.entries());
        }
        removed
    }

    // ==================== Read-Only Queries ====================

    /// Whether an address is currently banned.
    #[must_use]
    pub fn is_blocked(&self, addr: IpAddr) -> bool {
        self.blacklist.is_blocked(addr)
    }

    /// Whether the server is in attack posture.
    #[must_use]
    pub fn is_under_attack(&self) -> bool {
        self.tracker.is_under_attack()
    }

    /// Current deny-list entries.
    #[must_use]
    pub fn blacklist_entries(&self) -> Vec<BlacklistEntry> {
        self.blacklist.entries()
    }

    /// Current allow-listed players.
    #[must_use]
    pub fn whitelisted_players(&self) -> Vec<Uuid> {
        self.whitelist.players()
    }

    /// Point-in-time counters.
    #[must_use]
    pub fn stats(&self) -> SentryStats {
        SentryStats {
            profiles: self.store.len(),
            retained: self.store.retained_len(),
            under_attack: self.tracker.is_under_attack(),
            last_window_connections: self.tracker.last_window_connections(),
            delayed: self.executor.delayed(),
            kicked: self.executor.kicked(),
            blacklisted: self.executor.blacklisted(),
            blacklist_len: self.blacklist.len(),
            whitelist_len: self.whitelist.len(),
            watchers: self.scheduler.active(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PersistConfig, ThresholdConfig};
    use crate::events::Look;

    fn addr(last: u8) -> IpAddr {
        format!("10.4.0.{last}").parse().unwrap()
    }

    fn strict_engine(kick: u32, blacklist: u32) -> Sentry {
        let config = SentryConfig::builder()
            .thresholds(ThresholdConfig {
                delay: kick.saturating_sub(1).max(1),
                kick,
                blacklist,
                attack_scale: 0.6,
            })
            .build();
        Sentry::new(config)
    }

    // ==================== Lifecycle Tests ====================

    #[test]
    fn test_connect_tracks_profile() {
        let sentry = Sentry::new(SentryConfig::default());
        let conn = sentry.connect(addr(1));
        assert_eq!(sentry.stats().profiles, 1);

        sentry.handle_session_event(
            conn,
            &SessionEvent::Handshake {
                protocol_version: 767,
                hostname: "play.example.net".into(),
            },
        );
        sentry.handle_session_event(conn, &SessionEvent::StatusPing);
        assert_eq!(sentry.stats().profiles, 1);
    }

    #[test]
    fn test_debug_reports_live_state() {
        let sentry = Sentry::new(SentryConfig::default());
        sentry.connect(addr(9));
        let rendered = format!("{sentry:?}");
        assert!(rendered.contains("Sentry"));
        assert!(rendered.contains("profiles: 1"));
        assert!(rendered.contains("under_attack: false"));
    }

    #[test]
    fn test_event_for_unknown_connection_is_dropped() {
        let sentry = Sentry::new(SentryConfig::default());
        let conn = sentry.connect(addr(1));
        sentry.on_disconnect(conn);
        sentry.store.remove(conn);
        // Must not panic or resurrect the profile.
        sentry.handle_session_event(conn, &SessionEvent::Chat);
        assert_eq!(sentry.stats().profiles, 0);
    }

    // ==================== Pre-Login Tests ====================

    #[test]
    fn test_clean_connection_allowed() {
        let sentry = Sentry::new(SentryConfig::default());
        let conn = sentry.connect(addr(1));
        sentry.handle_session_event(conn, &SessionEvent::StatusPing);
        std::thread::sleep(Duration::from_millis(5));
        sentry.handle_session_event(
            conn,
            &SessionEvent::LoginStart {
                name: "Herobrine".into(),
            },
        );
        let verdict = sentry.pre_login(conn, Some(Uuid::new_v4()));
        assert_eq!(verdict, PreLoginVerdict::Allow);
    }

    #[test]
    fn test_bot_name_cold_join_kicked_under_strict_thresholds() {
        let sentry = strict_engine(12, 90);
        let conn = sentry.connect(addr(2));
        sentry.handle_session_event(
            conn,
            &SessionEvent::LoginStart {
                name: "Bot12345".into(),
            },
        );
        let verdict = sentry.pre_login(conn, None);
        assert!(!verdict.is_allowed());
        assert_eq!(sentry.stats().kicked, 1);
        // Kick alone never bans the address.
        assert!(!sentry.is_blocked(addr(2)));
    }

    #[test]
    fn test_blacklist_verdict_bans_address() {
        let sentry = strict_engine(5, 12);
        let conn = sentry.connect(addr(3));
        sentry.handle_session_event(
            conn,
            &SessionEvent::LoginStart {
                name: "Bot12345".into(),
            },
        );
        let verdict = sentry.pre_login(conn, None);
        assert!(!verdict.is_allowed());
        assert!(sentry.is_blocked(addr(3)));
        assert_eq!(sentry.stats().blacklisted, 1);
        assert_eq!(sentry.blacklist_entries().len(), 1);
    }

    #[test]
    fn test_banned_address_refused_before_scoring() {
        let sentry = Sentry::new(SentryConfig::default());
        sentry.ban(addr(4), Duration::ZERO, "operator ban");

        let conn = sentry.connect(addr(4));
        let verdict = sentry.pre_login(conn, None);
        assert!(!verdict.is_allowed());
        // The gate fires before the executor, so no verdict counter moves.
        let stats = sentry.stats();
        assert_eq!(stats.kicked, 0);
        assert_eq!(stats.blacklisted, 0);
    }

    #[test]
    fn test_unban_lifts_refusal() {
        let sentry = Sentry::new(SentryConfig::default());
        sentry.ban(addr(5), Duration::ZERO, "operator ban");
        assert!(sentry.unban(addr(5)));
        assert!(!sentry.is_blocked(addr(5)));

        let conn = sentry.connect(addr(5));
        sentry.handle_session_event(conn, &SessionEvent::StatusPing);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(sentry.pre_login(conn, None), PreLoginVerdict::Allow);
    }

    #[test]
    fn test_whitelisted_player_bypasses_checks() {
        let sentry = strict_engine(12, 90);
        let player = Uuid::new_v4();
        sentry.whitelist.add(player);

        let conn = sentry.connect(addr(6));
        sentry.handle_session_event(
            conn,
            &SessionEvent::LoginStart {
                name: "Bot12345".into(),
            },
        );
        assert_eq!(sentry.pre_login(conn, Some(player)), PreLoginVerdict::Allow);
    }

    // ==================== Session Tests ====================

    #[tokio::test]
    async fn test_join_and_disconnect_manage_watcher() {
        let sentry = Sentry::new(SentryConfig::default());
        let conn = sentry.connect(addr(7));
        sentry.handle_session_event(
            conn,
            &SessionEvent::LoginStart {
                name: "Herobrine".into(),
            },
        );
        sentry.pre_login(conn, Some(Uuid::new_v4()));
        sentry.on_join(conn);
        assert_eq!(sentry.stats().watchers, 1);

        sentry.on_disconnect(conn);
        assert_eq!(sentry.stats().watchers, 0);
        // The profile is parked for reconnect continuity, not destroyed.
        assert_eq!(sentry.stats().profiles, 0);
        assert_eq!(sentry.stats().retained, 1);
    }

    #[test]
    fn test_movement_events_feed_gravity_evidence() {
        let sentry = Sentry::new(SentryConfig::default());
        let conn = sentry.connect(addr(8));
        sentry.handle_session_event(
            conn,
            &SessionEvent::Movement {
                x: 0.0,
                y: 80.0,
                z: 0.0,
                look: Some(Look {
                    yaw: 90.0,
                    pitch: 10.0,
                }),
            },
        );
        sentry.handle_session_event(
            conn,
            &SessionEvent::Rotation {
                look: Look {
                    yaw: 91.0,
                    pitch: 11.0,
                },
            },
        );
        let profile = sentry.store.get(conn).unwrap();
        assert_eq!(profile.vertical_samples(), vec![80.0]);
        assert_eq!(profile.distinct_yaw(), 2);
    }

    #[test]
    fn test_tick_rate_reaches_monitor() {
        let sentry = Sentry::new(SentryConfig::default());
        sentry.set_tick_rate(14.5);
        assert!((sentry.ticks.tps() - 14.5).abs() < f64::EPSILON);
    }

    // ==================== Maintenance Tests ====================

    #[tokio::test]
    async fn test_start_and_shutdown_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let config = SentryConfig::builder()
            .persist(PersistConfig {
                dir: tmp.path().to_path_buf(),
                ..PersistConfig::default()
            })
            .build();
        let sentry = Sentry::new(config);
        sentry.ban(addr(9), Duration::ZERO, "operator ban");

        let handles = sentry.start();
        assert!(handles.is_running());

        sentry.shutdown(handles).unwrap();
        assert!(tmp.path().join(crate::persist::BLACKLIST_FILE).exists());

        // A fresh engine over the same directory sees the ban.
        let config = SentryConfig::builder()
            .persist(PersistConfig {
                dir: tmp.path().to_path_buf(),
                ..PersistConfig::default()
            })
            .build();
        let reloaded = Sentry::new(config);
        assert_eq!(reloaded.load_lists(), (1, 0));
        assert!(reloaded.is_blocked(addr(9)));
    }

    #[tokio::test]
    async fn test_attack_window_task_flips_posture() {
        let config = SentryConfig::builder()
            .attack(crate::config::AttackConfig {
                window: Duration::from_millis(20),
                threshold: 5,
                ..crate::config::AttackConfig::default()
            })
            .build();
        let sentry = Sentry::new(config);
        let handles = sentry.start();

        for i in 0..10 {
            sentry.connect(addr(10 + i));
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(sentry.is_under_attack());

        handles.stop();
    }
}
