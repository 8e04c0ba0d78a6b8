//! Per-connection profiles and the store that owns them.
//!
//! A [`ConnectionProfile`] is the single accumulation point for everything
//! the engine knows about one connection. Profiles live in a
//! [`ProfileStore`] arena keyed by opaque [`ConnId`] handles; address and
//! identity lookups go through secondary indexes that only ever hold
//! handles, so there is exactly one owner for profile memory.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::SentryConfig;

/// Opaque handle to a profile in the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ConnId(u64);

impl ConnId {
    /// Raw handle value, for logs and host-side correlation.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who this connection claims (and is verified) to be.
#[derive(Debug, Default)]
struct Identity {
    player: Option<Uuid>,
    name: Option<String>,
    protocol_version: Option<i32>,
    brand: Option<String>,
    hostname: Option<String>,
}

/// When the notable protocol milestones happened.
#[derive(Debug)]
struct Timeline {
    first_seen: Instant,
    last_seen: Instant,
    handshake: Option<Instant>,
    ping: Option<Instant>,
    login_start: Option<Instant>,
    encryption_request: Option<Instant>,
    encryption_response: Option<Instant>,
    join: Option<Instant>,
    first_movement: Option<Instant>,
    first_chat: Option<Instant>,
}

impl Timeline {
    fn new(now: Instant) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            handshake: None,
            ping: None,
            login_start: None,
            encryption_request: None,
            encryption_response: None,
            join: None,
            first_movement: None,
            first_chat: None,
        }
    }

    fn clear_session(&mut self) {
        // The ping stamp survives: status pings arrive on their own
        // short-lived connections, and the login that follows needs to see
        // that this address browsed the server list first.
        self.handshake = None;
        self.login_start = None;
        self.encryption_request = None;
        self.encryption_response = None;
        self.join = None;
        self.first_movement = None;
        self.first_chat = None;
    }
}

/// Bounded observation buffers. Every buffer evicts its oldest entry at
/// capacity; the sets stop growing instead, which saturates the variety
/// signals they feed.
#[derive(Debug)]
struct Samples {
    vertical: VecDeque<f64>,
    move_times: VecDeque<Instant>,
    yaw_bits: HashSet<u32>,
    pitch_bits: HashSet<u32>,
    positions: HashSet<(i64, i64, i64)>,
    rtts: VecDeque<u32>,
    keepalive_pending: Option<Instant>,
}

impl Samples {
    fn new() -> Self {
        Self {
            vertical: VecDeque::new(),
            move_times: VecDeque::new(),
            yaw_bits: HashSet::new(),
            pitch_bits: HashSet::new(),
            positions: HashSet::new(),
            rtts: VecDeque::new(),
            keepalive_pending: None,
        }
    }

    fn clear(&mut self) {
        self.vertical.clear();
        self.move_times.clear();
        self.yaw_bits.clear();
        self.pitch_bits.clear();
        self.positions.clear();
        self.rtts.clear();
        self.keepalive_pending = None;
    }
}

/// Buffer capacities a profile was built with.
#[derive(Debug, Clone, Copy)]
struct Caps {
    vertical: usize,
    move_times: usize,
    looks: usize,
    positions: usize,
    rtts: usize,
}

/// Everything the engine knows about one connection.
///
/// All recorders are cheap and lock-scoped; they are safe to call from any
/// thread the transport layer runs on. Derived accessors return `-1`
/// sentinels instead of panicking when the underlying data has not been
/// observed yet.
#[derive(Debug)]
pub struct ConnectionProfile {
    addr: IpAddr,
    caps: Caps,
    identity: RwLock<Identity>,
    timeline: RwLock<Timeline>,
    samples: RwLock<Samples>,
    live: AtomicBool,
    ticks_since_join: AtomicU32,
    sent_client_settings: AtomicBool,
    sent_position: AtomicBool,
    has_interacted: AtomicBool,
    first_join_score: AtomicI32,
    max_threat: AtomicU32,
    sessions: AtomicU32,
}

impl ConnectionProfile {
    fn new(addr: IpAddr, caps: Caps, now: Instant) -> Self {
        Self {
            addr,
            caps,
            identity: RwLock::new(Identity::default()),
            timeline: RwLock::new(Timeline::new(now)),
            samples: RwLock::new(Samples::new()),
            live: AtomicBool::new(true),
            ticks_since_join: AtomicU32::new(0),
            sent_client_settings: AtomicBool::new(false),
            sent_position: AtomicBool::new(false),
            has_interacted: AtomicBool::new(false),
            first_join_score: AtomicI32::new(-1),
            max_threat: AtomicU32::new(0),
            sessions: AtomicU32::new(0),
        }
    }

    /// Source address of this connection.
    #[must_use]
    pub const fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Whether the connection is currently attached to a live session.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Relaxed);
    }

    fn touch(&self) {
        self.timeline.write().last_seen = Instant::now();
    }

    // ---- recorders ----

    /// Record a status (server list) ping.
    pub fn record_ping(&self) {
        let mut timeline = self.timeline.write();
        timeline.last_seen = Instant::now();
        if timeline.ping.is_none() {
            timeline.ping = Some(timeline.last_seen);
        }
    }

    /// Record the protocol handshake.
    pub fn record_handshake(&self, protocol_version: i32, hostname: &str) {
        {
            let mut identity = self.identity.write();
            identity.protocol_version = Some(protocol_version);
            identity.hostname = Some(hostname.to_owned());
        }
        let mut timeline = self.timeline.write();
        timeline.last_seen = Instant::now();
        if timeline.handshake.is_none() {
            timeline.handshake = Some(timeline.last_seen);
        }
    }

    /// Record the start of the login sequence.
    pub fn record_login_start(&self, name: &str) {
        self.identity.write().name = Some(name.to_owned());
        let mut timeline = self.timeline.write();
        timeline.last_seen = Instant::now();
        if timeline.login_start.is_none() {
            timeline.login_start = Some(timeline.last_seen);
        }
    }

    /// Record the server's encryption request going out.
    pub fn record_encryption_request(&self) {
        let mut timeline = self.timeline.write();
        timeline.last_seen = Instant::now();
        if timeline.encryption_request.is_none() {
            timeline.encryption_request = Some(timeline.last_seen);
        }
    }

    /// Record the client's encryption response.
    pub fn record_encryption_response(&self) {
        let mut timeline = self.timeline.write();
        timeline.last_seen = Instant::now();
        if timeline.encryption_response.is_none() {
            timeline.encryption_response = Some(timeline.last_seen);
        }
    }

    /// Record client settings arriving.
    pub fn record_client_settings(&self) {
        self.sent_client_settings.store(true, Ordering::Relaxed);
        self.touch();
    }

    /// Record the client brand.
    pub fn record_brand(&self, brand: &str) {
        self.identity.write().brand = Some(brand.to_owned());
        self.touch();
    }

    /// Record a movement packet.
    pub fn record_movement(&self, x: f64, y: f64, z: f64, look: Option<(f32, f32)>) {
        let now = Instant::now();
        {
            let mut samples = self.samples.write();
            if samples.vertical.len() == self.caps.vertical {
                samples.vertical.pop_front();
            }
            samples.vertical.push_back(y);
            if samples.move_times.len() == self.caps.move_times {
                samples.move_times.pop_front();
            }
            samples.move_times.push_back(now);
            if samples.positions.len() < self.caps.positions {
                let key = (
                    (x * 100.0).round() as i64,
                    (y * 100.0).round() as i64,
                    (z * 100.0).round() as i64,
                );
                samples.positions.insert(key);
            }
            if let Some((yaw, pitch)) = look {
                if samples.yaw_bits.len() < self.caps.looks {
                    samples.yaw_bits.insert(yaw.to_bits());
                }
                if samples.pitch_bits.len() < self.caps.looks {
                    samples.pitch_bits.insert(pitch.to_bits());
                }
            }
        }
        self.sent_position.store(true, Ordering::Relaxed);
        let mut timeline = self.timeline.write();
        timeline.last_seen = now;
        if timeline.first_movement.is_none() {
            timeline.first_movement = Some(now);
        }
    }

    /// Record a rotation-only packet.
    pub fn record_rotation(&self, yaw: f32, pitch: f32) {
        {
            let mut samples = self.samples.write();
            if samples.yaw_bits.len() < self.caps.looks {
                samples.yaw_bits.insert(yaw.to_bits());
            }
            if samples.pitch_bits.len() < self.caps.looks {
                samples.pitch_bits.insert(pitch.to_bits());
            }
        }
        self.touch();
    }

    /// Record a keep-alive going out to this client.
    pub fn record_keepalive_sent(&self) {
        self.samples.write().keepalive_pending = Some(Instant::now());
        self.touch();
    }

    /// Record the client answering the pending keep-alive.
    pub fn record_keepalive_ack(&self) {
        {
            let mut samples = self.samples.write();
            if let Some(sent) = samples.keepalive_pending.take() {
                let rtt = sent.elapsed().as_millis().min(u128::from(u32::MAX)) as u32;
                if samples.rtts.len() == self.caps.rtts {
                    samples.rtts.pop_front();
                }
                samples.rtts.push_back(rtt);
            }
        }
        self.touch();
    }

    /// Record a chat message.
    pub fn record_chat(&self) {
        let mut timeline = self.timeline.write();
        timeline.last_seen = Instant::now();
        if timeline.first_chat.is_none() {
            timeline.first_chat = Some(timeline.last_seen);
        }
    }

    /// Record an inventory or world interaction.
    pub fn record_interaction(&self) {
        self.has_interacted.store(true, Ordering::Relaxed);
        self.touch();
    }

    /// Stamp the join moment and count the session.
    pub fn mark_joined(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
        let mut timeline = self.timeline.write();
        timeline.last_seen = Instant::now();
        timeline.join = Some(timeline.last_seen);
    }

    /// Advance the verified-tick counter.
    pub fn advance_ticks(&self, ticks: u32) {
        self.ticks_since_join.fetch_add(ticks, Ordering::Relaxed);
    }

    /// Clear join-scoped state ahead of a new session on this profile.
    ///
    /// Identity, the session count, and the running threat maximum survive;
    /// everything observed within the previous session does not.
    pub fn reset_for_reconnect(&self) {
        self.ticks_since_join.store(0, Ordering::Relaxed);
        self.sent_client_settings.store(false, Ordering::Relaxed);
        self.sent_position.store(false, Ordering::Relaxed);
        self.has_interacted.store(false, Ordering::Relaxed);
        self.first_join_score.store(-1, Ordering::Relaxed);
        self.samples.write().clear();
        let mut timeline = self.timeline.write();
        timeline.clear_session();
        timeline.last_seen = Instant::now();
        self.set_live(true);
    }

    // ---- counters and flags ----

    /// Ticks survived since the current join.
    #[must_use]
    pub fn ticks_since_join(&self) -> u32 {
        self.ticks_since_join.load(Ordering::Relaxed)
    }

    /// Whether client settings have been observed this session.
    #[must_use]
    pub fn sent_client_settings(&self) -> bool {
        self.sent_client_settings.load(Ordering::Relaxed)
    }

    /// Whether any position packet has been observed this session.
    #[must_use]
    pub fn sent_position(&self) -> bool {
        self.sent_position.load(Ordering::Relaxed)
    }

    /// Whether any inventory or world interaction has been observed.
    #[must_use]
    pub fn has_interacted(&self) -> bool {
        self.has_interacted.load(Ordering::Relaxed)
    }

    /// Cached first-join score, `-1` until computed.
    #[must_use]
    pub fn first_join_score(&self) -> i32 {
        self.first_join_score.load(Ordering::Relaxed)
    }

    /// Cache the first-join score. First write wins.
    pub fn cache_first_join_score(&self, score: u32) {
        let _ = self.first_join_score.compare_exchange(
            -1,
            score as i32,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    /// Highest total threat score this profile has ever evaluated to.
    #[must_use]
    pub fn max_threat(&self) -> u32 {
        self.max_threat.load(Ordering::Relaxed)
    }

    /// Fold a new evaluation total into the running maximum.
    pub fn note_threat(&self, total: u32) {
        self.max_threat.fetch_max(total, Ordering::Relaxed);
    }

    /// Sessions this profile has joined across reconnects.
    #[must_use]
    pub fn sessions(&self) -> u32 {
        self.sessions.load(Ordering::Relaxed)
    }

    // ---- identity reads ----

    /// Bound player identity, if any.
    #[must_use]
    pub fn player(&self) -> Option<Uuid> {
        self.identity.read().player
    }

    /// Login name, if seen.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.identity.read().name.clone()
    }

    /// Claimed protocol version, if the handshake was seen.
    #[must_use]
    pub fn protocol_version(&self) -> Option<i32> {
        self.identity.read().protocol_version
    }

    /// Client brand, if seen.
    #[must_use]
    pub fn brand(&self) -> Option<String> {
        self.identity.read().brand.clone()
    }

    /// Handshake hostname, if seen.
    #[must_use]
    pub fn hostname(&self) -> Option<String> {
        self.identity.read().hostname.clone()
    }

    /// Whether this session has joined the world.
    #[must_use]
    pub fn has_joined(&self) -> bool {
        self.timeline.read().join.is_some()
    }

    /// Whether a status ping was seen before login.
    #[must_use]
    pub fn pinged_before_login(&self) -> bool {
        self.timeline.read().ping.is_some()
    }

    /// Whether any chat message has been observed this session.
    #[must_use]
    pub fn has_chatted(&self) -> bool {
        self.timeline.read().first_chat.is_some()
    }

    /// How long this profile has been idle.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.timeline.read().last_seen.elapsed()
    }

    /// Age of the profile since first contact.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.timeline.read().first_seen.elapsed()
    }

    // ---- derived accessors (−1 on insufficient data) ----

    /// Milliseconds between handshake and status ping, `-1` without both.
    #[must_use]
    pub fn handshake_to_ping_ms(&self) -> i64 {
        let timeline = self.timeline.read();
        match (timeline.handshake, timeline.ping) {
            (Some(hs), Some(ping)) if ping >= hs => {
                ping.duration_since(hs).as_millis().min(i64::MAX as u128) as i64
            }
            _ => -1,
        }
    }

    /// Milliseconds between join and first movement, `-1` without both.
    #[must_use]
    pub fn join_to_first_move_ms(&self) -> i64 {
        let timeline = self.timeline.read();
        match (timeline.join, timeline.first_movement) {
            (Some(join), Some(mv)) if mv >= join => {
                mv.duration_since(join).as_millis().min(i64::MAX as u128) as i64
            }
            _ => -1,
        }
    }

    /// Milliseconds between join and first chat, `-1` without both.
    #[must_use]
    pub fn join_to_first_chat_ms(&self) -> i64 {
        let timeline = self.timeline.read();
        match (timeline.join, timeline.first_chat) {
            (Some(join), Some(chat)) if chat >= join => {
                chat.duration_since(join).as_millis().min(i64::MAX as u128) as i64
            }
            _ => -1,
        }
    }

    /// Number of inter-movement intervals observed.
    #[must_use]
    pub fn move_interval_count(&self) -> usize {
        self.samples.read().move_times.len().saturating_sub(1)
    }

    /// Mean inter-movement interval in milliseconds, `-1.0` with fewer
    /// than two movement packets.
    #[must_use]
    pub fn mean_move_interval_ms(&self) -> f64 {
        let samples = self.samples.read();
        if samples.move_times.len() < 2 {
            return -1.0;
        }
        let intervals = intervals_ms(&samples.move_times);
        intervals.iter().sum::<f64>() / intervals.len() as f64
    }

    /// Population variance of inter-movement intervals in ms squared,
    /// `-1.0` with fewer than two intervals.
    #[must_use]
    pub fn move_interval_variance(&self) -> f64 {
        let samples = self.samples.read();
        if samples.move_times.len() < 3 {
            return -1.0;
        }
        let intervals = intervals_ms(&samples.move_times);
        let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
        intervals
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / intervals.len() as f64
    }

    /// Mean keep-alive round trip in milliseconds, `-1.0` without samples.
    #[must_use]
    pub fn mean_rtt_ms(&self) -> f64 {
        let samples = self.samples.read();
        if samples.rtts.is_empty() {
            return -1.0;
        }
        samples.rtts.iter().map(|&v| f64::from(v)).sum::<f64>() / samples.rtts.len() as f64
    }

    /// Distinct yaw angles observed.
    #[must_use]
    pub fn distinct_yaw(&self) -> usize {
        self.samples.read().yaw_bits.len()
    }

    /// Distinct pitch angles observed.
    #[must_use]
    pub fn distinct_pitch(&self) -> usize {
        self.samples.read().pitch_bits.len()
    }

    /// Distinct positions observed, at centi-block resolution.
    #[must_use]
    pub fn distinct_positions(&self) -> usize {
        self.samples.read().positions.len()
    }

    /// Copy of the retained vertical position samples, oldest first.
    #[must_use]
    pub fn vertical_samples(&self) -> Vec<f64> {
        self.samples.read().vertical.iter().copied().collect()
    }
}

fn intervals_ms(times: &VecDeque<Instant>) -> Vec<f64> {
    times
        .iter()
        .zip(times.iter().skip(1))
        .map(|(a, b)| b.duration_since(*a).as_secs_f64() * 1000.0)
        .collect()
}

/// Arena of live profiles plus a short-lived retention shelf for
/// reconnecting addresses.
///
/// The handle map is the single owner; `by_addr` and `by_player` map into
/// it and are pruned whenever the handle they point at disappears.
#[derive(Debug)]
pub struct ProfileStore {
    caps: Caps,
    next_id: AtomicU64,
    profiles: RwLock<HashMap<ConnId, Arc<ConnectionProfile>>>,
    by_addr: RwLock<HashMap<IpAddr, ConnId>>,
    by_player: RwLock<HashMap<Uuid, ConnId>>,
    retained: RwLock<HashMap<IpAddr, Arc<ConnectionProfile>>>,
}

impl ProfileStore {
    /// Create a store sized from configuration.
    #[must_use]
    pub fn from_config(config: &SentryConfig) -> Self {
        Self {
            caps: Caps {
                vertical: config.gravity.sample_capacity.max(2),
                move_times: config.packet_timing.sample_capacity.max(2),
                looks: config.profile.look_capacity.max(1),
                positions: config.profile.position_capacity.max(1),
                rtts: config.profile.rtt_capacity.max(1),
            },
            next_id: AtomicU64::new(1),
            profiles: RwLock::new(HashMap::new()),
            by_addr: RwLock::new(HashMap::new()),
            by_player: RwLock::new(HashMap::new()),
            retained: RwLock::new(HashMap::new()),
        }
    }

    /// Create a profile for a new connection, reviving recent state for
    /// the address when a released profile is still on the shelf.
    pub fn create(&self, addr: IpAddr) -> (ConnId, Arc<ConnectionProfile>) {
        let id = ConnId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let profile = if let Some(parked) = self.retained.write().remove(&addr) {
            parked.reset_for_reconnect();
            trace!(conn = %id, addr = %addr, sessions = parked.sessions(), "profile revived");
            parked
        } else {
            Arc::new(ConnectionProfile::new(addr, self.caps, Instant::now()))
        };
        self.profiles.write().insert(id, Arc::clone(&profile));
        self.by_addr.write().insert(addr, id);
        if let Some(player) = profile.player() {
            self.by_player.write().insert(player, id);
        }
        (id, profile)
    }

    /// Bind a verified player identity to a connection.
    ///
    /// The identity index always ends up pointing at this connection's
    /// profile; a stale binding from a previous session is replaced.
    pub fn bind_identity(&self, conn: ConnId, player: Uuid) -> Option<Arc<ConnectionProfile>> {
        let profile = self.get(conn)?;
        profile.identity.write().player = Some(player);
        self.by_player.write().insert(player, conn);
        debug!(conn = %conn, player = %player, "identity bound");
        Some(profile)
    }

    /// Look up a profile by handle.
    #[must_use]
    pub fn get(&self, conn: ConnId) -> Option<Arc<ConnectionProfile>> {
        self.profiles.read().get(&conn).cloned()
    }

    /// Look up the most recent profile for an address.
    #[must_use]
    pub fn get_by_addr(&self, addr: IpAddr) -> Option<Arc<ConnectionProfile>> {
        let conn = *self.by_addr.read().get(&addr)?;
        self.get(conn)
    }

    /// Look up the profile currently bound to a player identity.
    #[must_use]
    pub fn get_by_identity(&self, player: Uuid) -> Option<Arc<ConnectionProfile>> {
        let conn = *self.by_player.read().get(&player)?;
        self.get(conn)
    }

    /// Release a closed connection.
    ///
    /// The handle dies immediately; the profile itself is parked on the
    /// retention shelf so a quick reconnect from the same address keeps its
    /// session count and threat history. The stale sweep reaps the shelf.
    pub fn release(&self, conn: ConnId) -> Option<Arc<ConnectionProfile>> {
        let profile = self.profiles.write().remove(&conn)?;
        profile.set_live(false);
        self.prune_indexes(conn);
        self.retained
            .write()
            .insert(profile.addr(), Arc::clone(&profile));
        debug!(conn = %conn, addr = %profile.addr(), "profile released");
        Some(profile)
    }

    /// Remove a profile outright, skipping the retention shelf.
    pub fn remove(&self, conn: ConnId) -> Option<Arc<ConnectionProfile>> {
        let profile = self.profiles.write().remove(&conn)?;
        profile.set_live(false);
        self.prune_indexes(conn);
        Some(profile)
    }

    fn prune_indexes(&self, conn: ConnId) {
        self.by_addr.write().retain(|_, c| *c != conn);
        self.by_player.write().retain(|_, c| *c != conn);
    }

    /// Evict profiles idle beyond the timeout. Returns how many went.
    ///
    /// Live handles held by in-flight callers stay valid; eviction only
    /// drops the store's own references.
    pub fn sweep_stale(&self, idle_timeout: Duration) -> usize {
        let stale: Vec<ConnId> = self
            .profiles
            .read()
            .iter()
            .filter(|(_, p)| p.idle_for() > idle_timeout)
            .map(|(id, _)| *id)
            .collect();
        for conn in &stale {
            self.profiles.write().remove(conn);
            self.prune_indexes(*conn);
        }
        let mut evicted = stale.len();
        let mut retained = self.retained.write();
        let before = retained.len();
        retained.retain(|_, p| p.idle_for() <= idle_timeout);
        evicted += before - retained.len();
        if evicted > 0 {
            debug!(evicted, "stale profiles swept");
        }
        evicted
    }

    /// Number of live profiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    /// Whether the store holds no live profiles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }

    /// Number of released profiles waiting on the retention shelf.
    #[must_use]
    pub fn retained_len(&self) -> usize {
        self.retained.read().len()
    }
}
