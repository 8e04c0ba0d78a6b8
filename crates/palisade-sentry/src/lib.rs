//! # palisade-sentry
//!
//! Adaptive bot detection and threat scoring for Palisade game servers.
//!
//! The engine profiles every connection from the first handshake byte,
//! scores it with independent behavioral heuristics, and converts the
//! combined score into an enforcement action. Scoring runs once at login
//! and then periodically for the whole session, so bots that behave at
//! the door and misbehave later still get caught.
//!
//! ## Scoring Pipeline
//!
//! - [`ProfileStore`] - Per-address connection profiles with evidence timelines
//! - [`ThreatCalculator`] - Sums check scores and maps totals to actions
//! - [`AttackTracker`] - Flips the server into attack posture on join floods
//! - [`ActionExecutor`] - Applies delay, kick, and blacklist verdicts
//!
//! ## Checks
//!
//! Eight heuristics, each scoring one signal: connection rate, status-ping
//! presence, username shape, protocol plausibility, first-join behavior,
//! gravity conformance, packet timing regularity, and post-join activity.
//! All of them implement [`Check`] and can be toggled per deployment.
//!
//! ## Lists & Verification
//!
//! - [`Blacklist`] - TTL-aware address bans, persisted as JSON lines
//! - [`Whitelist`] - Players promoted past all future scoring
//! - [`VerificationScheduler`] - Per-session re-scoring until promotion
//! - [`ListStore`] - Async snapshot persistence with retry
//!
//! ## Configuration
//!
//! - [`SentryConfig`] - Unified configuration with tuned defaults
//! - Builder-style overrides per check, threshold, and timer
//! - Sanitization clamps nonsense values instead of erroring
//!
//! # Example
//!
//! ```rust
//! use palisade_sentry::{PreLoginVerdict, Sentry, SentryConfig, SessionEvent};
//!
//! let sentry = Sentry::new(SentryConfig::default());
//!
//! // A client pings the server list, then starts logging in.
//! let conn = sentry.connect("203.0.113.7".parse().unwrap());
//! sentry.handle_session_event(conn, &SessionEvent::StatusPing);
//! sentry.handle_session_event(
//!     conn,
//!     &SessionEvent::LoginStart { name: "Herobrine".into() },
//! );
//!
//! // Score the connection before the login completes.
//! match sentry.pre_login(conn, None) {
//!     PreLoginVerdict::Allow => println!("Connection allowed"),
//!     PreLoginVerdict::Delay { duration } => {
//!         println!("Login throttled for {duration:?}");
//!     }
//!     PreLoginVerdict::Reject { reason } => println!("Refused: {reason}"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attack;
pub mod checks;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod lists;
pub mod notify;
pub mod persist;
pub mod profile;
pub mod score;
pub mod verify;

// Re-export main types
pub use attack::AttackTracker;
pub use checks::{build_checks, Check, RateWindows, TickMonitor};
pub use config::{
    AttackConfig, ExecutorConfig, FirstJoinConfig, GravityCheckConfig, PacketTimingConfig,
    PersistConfig, PingGateConfig, PostJoinConfig, ProfileConfig, PromotionConfig,
    ProtocolCheckConfig, RateCheckConfig, SentryConfig, SentryConfigBuilder, SimilarityGate,
    ThresholdConfig, UsernameCheckConfig, VerifyConfig, TICK,
};
pub use engine::{MaintenanceHandles, Sentry, SentryStats};
pub use error::{SentryError, SentryResult};
pub use events::{Action, Look, PreLoginVerdict, SessionDirective, SessionEvent};
pub use executor::ActionExecutor;
pub use lists::{Blacklist, BlacklistEntry, PromotionRule, Whitelist};
pub use notify::{Notifier, TracingNotifier};
pub use persist::{ListStore, PersistJob, BLACKLIST_FILE, WHITELIST_FILE};
pub use profile::{ConnId, ConnectionProfile, ProfileStore};
pub use score::{Evaluation, ThreatCalculator};
pub use verify::{VerificationScheduler, VerifyHandle};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::SentryConfig;
    pub use crate::engine::{Sentry, SentryStats};
    pub use crate::error::{SentryError, SentryResult};
    pub use crate::events::{Action, PreLoginVerdict, SessionDirective, SessionEvent};
    pub use crate::lists::{Blacklist, Whitelist};
    pub use crate::profile::{ConnId, ConnectionProfile, ProfileStore};
    pub use crate::score::{Evaluation, ThreatCalculator};
}
