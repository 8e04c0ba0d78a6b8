//! Test helpers for E2E tests.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use palisade_sentry::{
    ConnId, Notifier, PreLoginVerdict, Sentry, SentryConfig, SessionEvent,
};
use uuid::Uuid;

/// Downward acceleration per tick in the simulated world.
pub const GRAVITY: f64 = 0.08;
/// Per-tick air drag multiplier on vertical velocity.
pub const DRAG: f64 = 0.98;

/// A distinct test address inside 10.77.0.0/16.
pub fn addr(octet3: u8, octet4: u8) -> IpAddr {
    format!("10.77.{octet3}.{octet4}").parse().unwrap()
}

/// Notifier that records every callback for later assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    attacks: AtomicUsize,
    recoveries: AtomicUsize,
    promotions: Mutex<Vec<Uuid>>,
    rejections: Mutex<Vec<(IpAddr, String)>>,
}

impl RecordingNotifier {
    /// Attack detections reported so far.
    pub fn attacks(&self) -> usize {
        self.attacks.load(Ordering::Relaxed)
    }

    /// Attack recoveries reported so far.
    pub fn recoveries(&self) -> usize {
        self.recoveries.load(Ordering::Relaxed)
    }

    /// Players promoted so far, in promotion order.
    pub fn promotions(&self) -> Vec<Uuid> {
        self.promotions.lock().unwrap().clone()
    }

    /// Rejected connections so far, with their reasons.
    pub fn rejections(&self) -> Vec<(IpAddr, String)> {
        self.rejections.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn attack_detected(&self, _connections: u32, _window: Duration) {
        self.attacks.fetch_add(1, Ordering::Relaxed);
    }

    fn attack_ended(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    fn player_promoted(&self, player: Uuid, _name: Option<&str>) {
        self.promotions.lock().unwrap().push(player);
    }

    fn connection_rejected(&self, addr: IpAddr, reason: &str) {
        self.rejections.lock().unwrap().push((addr, reason.to_owned()));
    }
}

/// Build an engine wired to a [`RecordingNotifier`].
pub fn recording_engine(config: SentryConfig) -> (Sentry, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let sentry = Sentry::with_notifier(config, Arc::clone(&notifier) as Arc<dyn Notifier>);
    (sentry, notifier)
}

/// Connect, ping the server list the way a real client does, then log in.
pub fn clean_login(
    sentry: &Sentry,
    addr: IpAddr,
    name: &str,
    player: Option<Uuid>,
) -> (ConnId, PreLoginVerdict) {
    let conn = sentry.connect(addr);
    sentry.handle_session_event(conn, &SessionEvent::StatusPing);
    sentry.handle_session_event(
        conn,
        &SessionEvent::LoginStart { name: name.into() },
    );
    let verdict = sentry.pre_login(conn, player);
    (conn, verdict)
}

/// Connect and log in cold, without the status ping real clients send.
pub fn cold_login(
    sentry: &Sentry,
    addr: IpAddr,
    name: &str,
    player: Option<Uuid>,
) -> (ConnId, PreLoginVerdict) {
    let conn = sentry.connect(addr);
    sentry.handle_session_event(
        conn,
        &SessionEvent::LoginStart { name: name.into() },
    );
    let verdict = sentry.pre_login(conn, player);
    (conn, verdict)
}

/// Feed a falling arc that obeys the world's physics exactly.
pub fn free_fall(sentry: &Sentry, conn: ConnId, start_y: f64, steps: usize) {
    let mut y = start_y;
    let mut vel = 0.0;
    movement(sentry, conn, y);
    for _ in 0..steps {
        vel = (vel - GRAVITY) * DRAG;
        y += vel;
        movement(sentry, conn, y);
    }
}

/// Feed a constant-rate descent no falling body can produce.
pub fn linear_descent(sentry: &Sentry, conn: ConnId, start_y: f64, steps: usize, rate: f64) {
    let mut y = start_y;
    movement(sentry, conn, y);
    for _ in 0..steps {
        y -= rate;
        movement(sentry, conn, y);
    }
}

fn movement(sentry: &Sentry, conn: ConnId, y: f64) {
    sentry.handle_session_event(
        conn,
        &SessionEvent::Movement {
            x: 0.0,
            y,
            z: 0.0,
            look: None,
        },
    );
}
