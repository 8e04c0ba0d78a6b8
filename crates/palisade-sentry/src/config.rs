//! Sentry engine configuration.
//!
//! Every component reads its tunables from one section of [`SentryConfig`].
//! The engine never reloads in place; hosts build a config (serde makes it
//! loadable from any format they like), hand it to [`crate::Sentry::new`],
//! and swap the whole engine to change it.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Length of one simulation tick.
pub const TICK: Duration = Duration::from_millis(50);

/// Threat score thresholds mapping a total score to an action.
///
/// Bands are strict upper bounds: a total equal to a threshold falls into
/// the band above it. Under attack all three are scaled down by
/// `attack_scale` before comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Scores at or above this are delayed.
    pub delay: u32,
    /// Scores at or above this are kicked.
    pub kick: u32,
    /// Scores at or above this are blacklisted.
    pub blacklist: u32,
    /// Multiplier applied to all thresholds while under attack (0, 1].
    pub attack_scale: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            delay: 25,
            kick: 50,
            blacklist: 80,
            attack_scale: 0.6,
        }
    }
}

/// Configuration for the connection-rate check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateCheckConfig {
    /// Whether the check runs.
    pub enabled: bool,
    /// Sliding window the connection counts are measured over.
    pub window: Duration,
    /// Server-wide connections tolerated per window before scoring.
    pub global_limit: u32,
    /// Connections per source address tolerated per window before scoring.
    pub per_addr_limit: u32,
    /// Points per connection above the global limit.
    pub global_excess_points: u32,
    /// Points per connection above the per-address limit.
    pub addr_excess_points: u32,
    /// Cap on this check's contribution.
    pub max_score: u32,
    /// Raw score multiplier while under attack.
    pub attack_multiplier: f64,
}

impl Default for RateCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_secs(10),
            global_limit: 20,
            per_addr_limit: 3,
            global_excess_points: 2,
            addr_excess_points: 4,
            max_score: 30,
            attack_multiplier: 2.0,
        }
    }
}

/// Configuration for the pre-login ping gate check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingGateConfig {
    /// Whether the check runs.
    pub enabled: bool,
    /// Score when no status ping preceded login.
    pub missing_score: u32,
    /// Score when no status ping preceded login while under attack.
    pub missing_attack_score: u32,
    /// Handshake-to-ping intervals below this are machine territory.
    pub min_interval: Duration,
    /// Score for an implausibly fast handshake-to-ping interval.
    pub fast_score: u32,
    /// Cap on this check's contribution.
    pub max_score: u32,
    /// Raw score multiplier while under attack.
    pub attack_multiplier: f64,
}

impl Default for PingGateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            missing_score: 4,
            missing_attack_score: 10,
            min_interval: Duration::from_millis(10),
            fast_score: 6,
            max_score: 15,
            attack_multiplier: 1.5,
        }
    }
}

/// When the username-similarity signal is allowed to score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityGate {
    /// Score similarity only while the server is under attack.
    #[default]
    AttackOnly,
    /// Score similarity in every mode.
    Always,
    /// Never score similarity.
    Disabled,
}

/// Configuration for the username-pattern check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsernameCheckConfig {
    /// Whether the check runs.
    pub enabled: bool,
    /// Score for matching a known bot-generator template.
    pub pattern_score: u32,
    /// Shortest unsuspicious name length.
    pub min_length: usize,
    /// Longest unsuspicious name length.
    pub max_length: usize,
    /// Score for a name outside the length bounds.
    pub length_score: u32,
    /// Names with character entropy below this many bits are suspicious.
    pub entropy_floor: f64,
    /// Score for low-entropy names.
    pub entropy_score: u32,
    /// Edit distance at or under which two names count as similar.
    pub similarity_distance: usize,
    /// Score for similarity to recently seen names.
    pub similarity_score: u32,
    /// When the similarity signal is consulted.
    pub similarity_gate: SimilarityGate,
    /// Recent names required before similarity can score at all.
    pub min_history: usize,
    /// Cap on this check's contribution.
    pub max_score: u32,
    /// Raw score multiplier while under attack.
    pub attack_multiplier: f64,
}

impl Default for UsernameCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pattern_score: 10,
            min_length: 3,
            max_length: 16,
            length_score: 4,
            entropy_floor: 1.5,
            entropy_score: 6,
            similarity_distance: 2,
            similarity_score: 12,
            similarity_gate: SimilarityGate::default(),
            min_history: 5,
            max_score: 25,
            attack_multiplier: 2.0,
        }
    }
}

/// Configuration for the protocol-compliance check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolCheckConfig {
    /// Whether the check runs.
    pub enabled: bool,
    /// Ticks after join by which client settings must have arrived.
    pub settings_deadline_ticks: u32,
    /// Score for settings missing past the deadline.
    pub missing_settings_score: u32,
    /// Ticks after join by which a brand message must have arrived.
    pub brand_deadline_ticks: u32,
    /// Score for a brand missing past the deadline.
    pub missing_brand_score: u32,
    /// Longest plausible brand string.
    pub max_brand_len: usize,
    /// Score for an empty or overlong brand.
    pub invalid_brand_score: u32,
    /// Longest plausible handshake hostname.
    pub max_hostname_len: usize,
    /// Score for an empty, overlong, or NUL-bearing hostname.
    pub invalid_hostname_score: u32,
    /// Cap on this check's contribution.
    pub max_score: u32,
    /// Raw score multiplier while under attack.
    pub attack_multiplier: f64,
}

impl Default for ProtocolCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            settings_deadline_ticks: 100,
            missing_settings_score: 8,
            brand_deadline_ticks: 150,
            missing_brand_score: 6,
            max_brand_len: 64,
            invalid_brand_score: 5,
            max_hostname_len: 255,
            invalid_hostname_score: 5,
            max_score: 20,
            attack_multiplier: 1.5,
        }
    }
}

/// Configuration for the first-join behavior check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirstJoinConfig {
    /// Whether the check runs.
    pub enabled: bool,
    /// Analysis window after join, in ticks; the verdict is computed once
    /// the window has fully elapsed and is cached for the session.
    pub window_ticks: u32,
    /// Score for never sending a position packet inside the window.
    pub no_position_score: u32,
    /// Distinct look angles below this count as a frozen camera.
    pub min_look_variety: usize,
    /// Score for a frozen camera.
    pub low_variety_score: u32,
    /// Join-to-first-movement delays above this are suspicious.
    pub slow_start: Duration,
    /// Score for a slow (or absent) first movement.
    pub slow_start_score: u32,
    /// Cap on this check's contribution.
    pub max_score: u32,
    /// Raw score multiplier while under attack.
    pub attack_multiplier: f64,
}

impl Default for FirstJoinConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ticks: 40,
            no_position_score: 12,
            min_look_variety: 5,
            low_variety_score: 8,
            slow_start: Duration::from_secs(3),
            slow_start_score: 5,
            max_score: 25,
            attack_multiplier: 1.8,
        }
    }
}

/// Configuration for the gravity-consistency check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GravityCheckConfig {
    /// Whether the check runs.
    pub enabled: bool,
    /// Vertical samples retained per profile.
    pub sample_capacity: usize,
    /// Samples required before the check scores.
    pub min_samples: usize,
    /// Non-idle velocity deltas required before the check scores.
    pub min_active_deltas: usize,
    /// Allowed deviation from the predicted velocity, in blocks per tick.
    pub tolerance: f64,
    /// Tolerance multiplier applied while the server tick rate is degraded.
    pub lag_tolerance_factor: f64,
    /// Tick rates below this count as degraded.
    pub degraded_tps: f64,
    /// Violation ratio at or above which the severe score applies.
    pub severe_ratio: f64,
    /// Score for a severe violation ratio.
    pub severe_score: u32,
    /// Violation ratio at or above which the major score applies.
    pub major_ratio: f64,
    /// Score for a major violation ratio.
    pub major_score: u32,
    /// Violation ratio at or above which the minor score applies.
    pub minor_ratio: f64,
    /// Score for a minor violation ratio.
    pub minor_score: u32,
    /// Cap on this check's contribution.
    pub max_score: u32,
    /// Raw score multiplier while under attack.
    pub attack_multiplier: f64,
}

impl Default for GravityCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_capacity: 24,
            min_samples: 8,
            min_active_deltas: 4,
            tolerance: 0.01,
            lag_tolerance_factor: 3.0,
            degraded_tps: 16.0,
            severe_ratio: 0.75,
            severe_score: 30,
            major_ratio: 0.5,
            major_score: 18,
            minor_ratio: 0.25,
            minor_score: 8,
            max_score: 30,
            attack_multiplier: 1.0,
        }
    }
}

/// Configuration for the packet-timing check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketTimingConfig {
    /// Whether the check runs.
    pub enabled: bool,
    /// Movement packet instants retained per profile.
    pub sample_capacity: usize,
    /// Inter-packet intervals required before the check scores.
    pub min_intervals: usize,
    /// Mean intervals below this are faster than human input.
    pub min_mean: Duration,
    /// Score for a too-fast mean interval.
    pub fast_mean_score: u32,
    /// Interval variance below this (ms squared) is machine-regular.
    pub variance_floor: f64,
    /// Score for machine-regular cadence.
    pub regular_score: u32,
    /// Keep-alive round trips below this are loopback territory.
    pub min_rtt: Duration,
    /// Score for an implausibly low round trip.
    pub fast_rtt_score: u32,
    /// Cap on this check's contribution.
    pub max_score: u32,
    /// Raw score multiplier while under attack.
    pub attack_multiplier: f64,
}

impl Default for PacketTimingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_capacity: 32,
            min_intervals: 8,
            min_mean: Duration::from_millis(40),
            fast_mean_score: 10,
            variance_floor: 4.0,
            regular_score: 10,
            min_rtt: Duration::from_millis(5),
            fast_rtt_score: 5,
            max_score: 25,
            attack_multiplier: 1.5,
        }
    }
}

/// Configuration for the post-join behavior check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostJoinConfig {
    /// Whether the check runs.
    pub enabled: bool,
    /// Ticks after join before the check starts scoring.
    pub min_ticks: u32,
    /// Score for a session that has never chatted.
    pub no_chat_score: u32,
    /// Distinct positions below this count as low movement variety.
    pub min_position_variety: usize,
    /// Score for low movement variety.
    pub low_variety_score: u32,
    /// Score for zero inventory or world interaction (attack mode only).
    pub no_interaction_score: u32,
    /// Cap on this check's contribution.
    pub max_score: u32,
    /// Raw score multiplier while under attack.
    pub attack_multiplier: f64,
}

impl Default for PostJoinConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_ticks: 200,
            no_chat_score: 4,
            min_position_variety: 10,
            low_variety_score: 8,
            no_interaction_score: 8,
            max_score: 20,
            attack_multiplier: 1.5,
        }
    }
}

/// Configuration for attack detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackConfig {
    /// Evaluation window the connection counter is sampled over.
    pub window: Duration,
    /// Connections per window at or above which an attack is declared.
    pub threshold: u32,
    /// Quiet time after the last detection before leaving attack mode.
    pub cooldown: Duration,
    /// Recently seen login names retained for similarity analysis.
    pub name_history: usize,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(5),
            threshold: 15,
            cooldown: Duration::from_secs(60),
            name_history: 32,
        }
    }
}

/// Configuration for verdict execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// How long a delay verdict holds a connection.
    pub delay: Duration,
    /// Hard ceiling on any single delay.
    pub delay_max: Duration,
    /// Whether the pre-login path sleeps for the delay itself. When false
    /// the caller receives the duration and owns the wait.
    pub delay_blocking: bool,
    /// Disconnect message for kicked connections.
    pub kick_message: String,
    /// Ban duration for automatic blacklisting. Zero means permanent.
    pub auto_ban_duration: Duration,
    /// Whether a blacklist verdict from the periodic path also bans the
    /// source address, or only disconnects the session.
    pub blacklist_on_session_verdict: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            delay_max: Duration::from_secs(5),
            delay_blocking: false,
            kick_message: "Connection rejected by server protection".into(),
            auto_ban_duration: Duration::from_secs(600),
            blacklist_on_session_verdict: true,
        }
    }
}

/// Configuration for allow-list promotion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionConfig {
    /// Verified ticks a session must survive before promotion.
    pub min_ticks: u32,
    /// Highest running-max threat score a promotable session may carry.
    pub max_threat: u32,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            min_ticks: 1200,
            max_threat: 10,
        }
    }
}

/// Configuration for the per-session verification scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Interval between verification passes over a session.
    pub interval: Duration,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// Configuration for list persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Directory holding `blacklist.json` and `whitelist.json`.
    pub dir: PathBuf,
    /// Write attempts per snapshot before surrendering.
    pub retry_attempts: u32,
    /// Pause between write attempts.
    pub retry_backoff: Duration,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/palisade"),
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Configuration for profile bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Idle time after which a profile is eligible for eviction.
    pub idle_timeout: Duration,
    /// Interval between stale-profile sweeps.
    pub sweep_interval: Duration,
    /// Distinct look angles retained per profile.
    pub look_capacity: usize,
    /// Distinct positions retained per profile.
    pub position_capacity: usize,
    /// Keep-alive round trips retained per profile.
    pub rtt_capacity: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            look_capacity: 64,
            position_capacity: 128,
            rtt_capacity: 16,
        }
    }
}

/// Main sentry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentryConfig {
    /// Score-to-action thresholds.
    pub thresholds: ThresholdConfig,
    /// Connection-rate check settings.
    pub rate: RateCheckConfig,
    /// Ping gate check settings.
    pub ping_gate: PingGateConfig,
    /// Username check settings.
    pub username: UsernameCheckConfig,
    /// Protocol-compliance check settings.
    pub protocol: ProtocolCheckConfig,
    /// First-join check settings.
    pub first_join: FirstJoinConfig,
    /// Gravity check settings.
    pub gravity: GravityCheckConfig,
    /// Packet-timing check settings.
    pub packet_timing: PacketTimingConfig,
    /// Post-join check settings.
    pub post_join: PostJoinConfig,
    /// Attack detection settings.
    pub attack: AttackConfig,
    /// Verdict execution settings.
    pub executor: ExecutorConfig,
    /// Allow-list promotion settings.
    pub promotion: PromotionConfig,
    /// Verification scheduler settings.
    pub verify: VerifyConfig,
    /// List persistence settings.
    pub persist: PersistConfig,
    /// Profile bookkeeping settings.
    pub profile: ProfileConfig,
}

impl SentryConfig {
    /// Create a new builder for sentry configuration.
    #[must_use]
    pub fn builder() -> SentryConfigBuilder {
        SentryConfigBuilder::default()
    }

    /// Clamp out-of-range values back to their documented defaults.
    ///
    /// Construction never fails on a bad knob; each clamp is logged so
    /// operators can see what their config actually resolved to.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let defaults = ThresholdConfig::default();
        if self.thresholds.delay >= self.thresholds.kick
            || self.thresholds.kick >= self.thresholds.blacklist
        {
            warn!(
                delay = self.thresholds.delay,
                kick = self.thresholds.kick,
                blacklist = self.thresholds.blacklist,
                "threshold ordering invalid, using defaults"
            );
            self.thresholds.delay = defaults.delay;
            self.thresholds.kick = defaults.kick;
            self.thresholds.blacklist = defaults.blacklist;
        }
        if !(self.thresholds.attack_scale > 0.0 && self.thresholds.attack_scale <= 1.0) {
            warn!(
                scale = self.thresholds.attack_scale,
                "attack threshold scale outside (0, 1], using default"
            );
            self.thresholds.attack_scale = defaults.attack_scale;
        }
        if self.attack.window.is_zero() {
            warn!("attack window must be nonzero, using default");
            self.attack.window = AttackConfig::default().window;
        }
        if self.attack.threshold == 0 {
            warn!("attack threshold must be nonzero, using default");
            self.attack.threshold = AttackConfig::default().threshold;
        }
        if self.verify.interval.is_zero() {
            warn!("verification interval must be nonzero, using default");
            self.verify.interval = VerifyConfig::default().interval;
        }
        if self.executor.delay > self.executor.delay_max {
            warn!(
                delay_ms = self.executor.delay.as_millis() as u64,
                max_ms = self.executor.delay_max.as_millis() as u64,
                "delay exceeds its ceiling, clamping"
            );
            self.executor.delay = self.executor.delay_max;
        }
        if self.gravity.tolerance <= 0.0 {
            warn!("gravity tolerance must be positive, using default");
            self.gravity.tolerance = GravityCheckConfig::default().tolerance;
        }
        if self.gravity.min_samples < 2 {
            warn!("gravity needs at least two samples, using default");
            self.gravity.min_samples = GravityCheckConfig::default().min_samples;
        }
        if self.profile.sweep_interval.is_zero() {
            warn!("sweep interval must be nonzero, using default");
            self.profile.sweep_interval = ProfileConfig::default().sweep_interval;
        }
        self
    }
}

/// Builder for [`SentryConfig`].
#[derive(Debug, Clone, Default)]
pub struct SentryConfigBuilder {
    config: SentryConfig,
}

impl SentryConfigBuilder {
    /// Set threshold configuration.
    #[must_use]
    pub fn thresholds(mut self, config: ThresholdConfig) -> Self {
        self.config.thresholds = config;
        self
    }

    /// Set connection-rate check configuration.
    #[must_use]
    pub fn rate(mut self, config: RateCheckConfig) -> Self {
        self.config.rate = config;
        self
    }

    /// Set ping gate configuration.
    #[must_use]
    pub fn ping_gate(mut self, config: PingGateConfig) -> Self {
        self.config.ping_gate = config;
        self
    }

    /// Set username check configuration.
    #[must_use]
    pub fn username(mut self, config: UsernameCheckConfig) -> Self {
        self.config.username = config;
        self
    }

    /// Set protocol check configuration.
    #[must_use]
    pub fn protocol(mut self, config: ProtocolCheckConfig) -> Self {
        self.config.protocol = config;
        self
    }

    /// Set first-join check configuration.
    #[must_use]
    pub fn first_join(mut self, config: FirstJoinConfig) -> Self {
        self.config.first_join = config;
        self
    }

    /// Set gravity check configuration.
    #[must_use]
    pub fn gravity(mut self, config: GravityCheckConfig) -> Self {
        self.config.gravity = config;
        self
    }

    /// Set packet-timing check configuration.
    #[must_use]
    pub fn packet_timing(mut self, config: PacketTimingConfig) -> Self {
        self.config.packet_timing = config;
        self
    }

    /// Set post-join check configuration.
    #[must_use]
    pub fn post_join(mut self, config: PostJoinConfig) -> Self {
        self.config.post_join = config;
        self
    }

    /// Set attack detection configuration.
    #[must_use]
    pub fn attack(mut self, config: AttackConfig) -> Self {
        self.config.attack = config;
        self
    }

    /// Set executor configuration.
    #[must_use]
    pub fn executor(mut self, config: ExecutorConfig) -> Self {
        self.config.executor = config;
        self
    }

    /// Set promotion configuration.
    #[must_use]
    pub fn promotion(mut self, config: PromotionConfig) -> Self {
        self.config.promotion = config;
        self
    }

    /// Set verification scheduler configuration.
    #[must_use]
    pub fn verify(mut self, config: VerifyConfig) -> Self {
        self.config.verify = config;
        self
    }

    /// Set persistence configuration.
    #[must_use]
    pub fn persist(mut self, config: PersistConfig) -> Self {
        self.config.persist = config;
        self
    }

    /// Set profile bookkeeping configuration.
    #[must_use]
    pub fn profile(mut self, config: ProfileConfig) -> Self {
        self.config.profile = config;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> SentryConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SentryConfig::default();
        assert!(config.thresholds.delay < config.thresholds.kick);
        assert!(config.thresholds.kick < config.thresholds.blacklist);
        assert!(config.rate.enabled);
        assert!(config.gravity.enabled);
        assert_eq!(config.attack.threshold, 15);
        assert_eq!(config.attack.window, Duration::from_secs(5));
        assert_eq!(config.username.similarity_gate, SimilarityGate::AttackOnly);
    }

    #[test]
    fn test_builder_overrides_sections() {
        let config = SentryConfig::builder()
            .thresholds(ThresholdConfig {
                delay: 10,
                kick: 20,
                blacklist: 30,
                attack_scale: 0.5,
            })
            .attack(AttackConfig {
                threshold: 5,
                ..AttackConfig::default()
            })
            .build();
        assert_eq!(config.thresholds.delay, 10);
        assert_eq!(config.attack.threshold, 5);
        // Untouched sections keep defaults.
        assert_eq!(config.verify.interval, Duration::from_secs(1));
    }

    #[test]
    fn test_sanitized_fixes_threshold_ordering() {
        let config = SentryConfig::builder()
            .thresholds(ThresholdConfig {
                delay: 80,
                kick: 50,
                blacklist: 25,
                attack_scale: 0.6,
            })
            .build()
            .sanitized();
        let defaults = ThresholdConfig::default();
        assert_eq!(config.thresholds.delay, defaults.delay);
        assert_eq!(config.thresholds.kick, defaults.kick);
        assert_eq!(config.thresholds.blacklist, defaults.blacklist);
    }

    #[test]
    fn test_sanitized_clamps_attack_scale() {
        let mut config = SentryConfig::default();
        config.thresholds.attack_scale = 1.8;
        let config = config.sanitized();
        assert!((config.thresholds.attack_scale - 0.6).abs() < f64::EPSILON);

        let mut config = SentryConfig::default();
        config.thresholds.attack_scale = 0.0;
        let config = config.sanitized();
        assert!(config.thresholds.attack_scale > 0.0);
    }

    #[test]
    fn test_sanitized_clamps_delay_to_ceiling() {
        let mut config = SentryConfig::default();
        config.executor.delay = Duration::from_secs(30);
        let config = config.sanitized();
        assert_eq!(config.executor.delay, config.executor.delay_max);
    }

    #[test]
    fn test_sanitized_keeps_valid_config() {
        let config = SentryConfig::default().sanitized();
        let defaults = SentryConfig::default();
        assert_eq!(config.thresholds.delay, defaults.thresholds.delay);
        assert_eq!(config.attack.threshold, defaults.attack.threshold);
        assert_eq!(config.executor.delay, defaults.executor.delay);
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let config = SentryConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: SentryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.thresholds.delay, config.thresholds.delay);
        assert_eq!(back.username.similarity_gate, config.username.similarity_gate);
        assert_eq!(back.persist.dir, config.persist.dir);
    }

    #[test]
    fn test_similarity_gate_serde_names() {
        let json = serde_json::to_string(&SimilarityGate::AttackOnly).unwrap();
        assert_eq!(json, "\"attack_only\"");
        let gate: SimilarityGate = serde_json::from_str("\"disabled\"").unwrap();
        assert_eq!(gate, SimilarityGate::Disabled);
    }
}
