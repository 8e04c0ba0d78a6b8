//! Admin notification seam.
//!
//! The engine reports noteworthy state changes through a [`Notifier`];
//! hosts plug in webhook or chat integrations by implementing the trait.
//! The default [`TracingNotifier`] keeps everything in the log stream.

use std::net::IpAddr;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

/// Receives engine-level notifications.
pub trait Notifier: Send + Sync {
    /// A connection burst crossed the attack threshold.
    fn attack_detected(&self, connections: u32, window: Duration);

    /// The attack cooldown elapsed and the server returned to normal.
    fn attack_ended(&self);

    /// A verified session was promoted onto the allow list.
    fn player_promoted(&self, player: Uuid, name: Option<&str>);

    /// A pre-login connection was rejected.
    fn connection_rejected(&self, addr: IpAddr, reason: &str);
}

/// Notifier that writes to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn attack_detected(&self, connections: u32, window: Duration) {
        warn!(
            connections,
            window_ms = window.as_millis() as u64,
            "connection burst detected, entering attack mode"
        );
    }

    fn attack_ended(&self) {
        info!("attack cooldown elapsed, leaving attack mode");
    }

    fn player_promoted(&self, player: Uuid, name: Option<&str>) {
        info!(player = %player, name = name.unwrap_or("<unknown>"), "player promoted to allow list");
    }

    fn connection_rejected(&self, addr: IpAddr, reason: &str) {
        info!(addr = %addr, reason, "connection rejected");
    }
}
