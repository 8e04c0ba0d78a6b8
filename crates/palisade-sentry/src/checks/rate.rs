//! Connection-rate check.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::trace;

use crate::config::RateCheckConfig;
use crate::profile::ConnectionProfile;

use super::Check;

/// Sliding connection-count windows, server-wide and per address.
///
/// The engine stamps every inbound connection here; the rate check reads
/// the windows when it scores. Stamping prunes expired entries, so the
/// buffers stay proportional to the live rate.
#[derive(Debug)]
pub struct RateWindows {
    window: Duration,
    global: RwLock<VecDeque<Instant>>,
    per_addr: RwLock<HashMap<IpAddr, VecDeque<Instant>>>,
}

impl RateWindows {
    /// Create windows with the given span.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            global: RwLock::new(VecDeque::new()),
            per_addr: RwLock::new(HashMap::new()),
        }
    }

    /// Stamp one inbound connection from an address.
    pub fn record(&self, addr: IpAddr) {
        let now = Instant::now();
        {
            let mut global = self.global.write();
            Self::prune_one(&mut global, now, self.window);
            global.push_back(now);
        }
        let mut per_addr = self.per_addr.write();
        let entry = per_addr.entry(addr).or_default();
        Self::prune_one(entry, now, self.window);
        entry.push_back(now);
    }

    /// Connections seen server-wide inside the window.
    #[must_use]
    pub fn global_count(&self) -> u32 {
        let now = Instant::now();
        self.global
            .read()
            .iter()
            .filter(|t| now.duration_since(**t) <= self.window)
            .count() as u32
    }

    /// Connections seen from one address inside the window.
    #[must_use]
    pub fn addr_count(&self, addr: IpAddr) -> u32 {
        let now = Instant::now();
        self.per_addr.read().get(&addr).map_or(0, |times| {
            times
                .iter()
                .filter(|t| now.duration_since(**t) <= self.window)
                .count() as u32
        })
    }

    /// Drop expired stamps and empty per-address buckets.
    pub fn prune(&self) {
        let now = Instant::now();
        Self::prune_one(&mut self.global.write(), now, self.window);
        let mut per_addr = self.per_addr.write();
        for times in per_addr.values_mut() {
            Self::prune_one(times, now, self.window);
        }
        per_addr.retain(|_, times| !times.is_empty());
    }

    fn prune_one(times: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(front) = times.front() {
            if now.duration_since(*front) > window {
                times.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Scores connection bursts, server-wide and from the profile's address.
///
/// Every connection above a limit contributes linearly, so a burst twice
/// the limit scores harder than one just over it.
pub struct ConnectionRateCheck {
    config: RateCheckConfig,
    windows: Arc<RateWindows>,
}

impl ConnectionRateCheck {
    /// Create the check over shared windows.
    #[must_use]
    pub fn new(config: RateCheckConfig, windows: Arc<RateWindows>) -> Self {
        Self { config, windows }
    }
}

impl Check for ConnectionRateCheck {
    fn name(&self) -> &'static str {
        "connection-rate"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn attack_multiplier(&self) -> f64 {
        self.config.attack_multiplier
    }

    fn score(&self, profile: &ConnectionProfile) -> u32 {
        let global = self.windows.global_count();
        let from_addr = self.windows.addr_count(profile.addr());
        let global_excess = global.saturating_sub(self.config.global_limit);
        let addr_excess = from_addr.saturating_sub(self.config.per_addr_limit);
        let score = global_excess * self.config.global_excess_points
            + addr_excess * self.config.addr_excess_points;
        if score > 0 {
            trace!(
                addr = %profile.addr(),
                global,
                from_addr,
                score,
                "connection rate over limit"
            );
        }
        score.min(self.config.max_score)
    }
}
