//! Block and allow lists.
//!
//! The blacklist holds address bans with a TTL (zero means permanent) and
//! evicts lazily: an expired entry is removed the moment a lookup trips
//! over it. The whitelist is a permanent set of player identities that
//! bypass scoring entirely. Both serialize to flat JSON-lines files via
//! [`crate::persist::ListStore`].

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PromotionConfig;
use crate::profile::ConnectionProfile;

/// One banned address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    /// Banned address.
    pub addr: IpAddr,
    /// When the ban was issued.
    pub created_at: DateTime<Utc>,
    /// Ban length in milliseconds. Zero means permanent.
    pub duration_ms: u64,
    /// Why the ban was issued.
    pub reason: String,
}

impl BlacklistEntry {
    /// When the ban lapses, if it ever does.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.duration_ms == 0 {
            return None;
        }
        let ms = i64::try_from(self.duration_ms).unwrap_or(i64::MAX);
        Some(self.created_at + chrono::Duration::milliseconds(ms))
    }

    /// Whether the ban has lapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at().is_some_and(|at| Utc::now() >= at)
    }
}

/// TTL-aware address deny list.
#[derive(Debug, Default)]
pub struct Blacklist {
    entries: RwLock<HashMap<IpAddr, BlacklistEntry>>,
}

impl Blacklist {
    /// Create an empty blacklist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ban an address. Re-banning replaces the existing entry wholesale.
    pub fn add(&self, addr: IpAddr, duration: Duration, reason: impl Into<String>) {
        let entry = BlacklistEntry {
            addr,
            created_at: Utc::now(),
            duration_ms: duration.as_millis().min(u128::from(u64::MAX)) as u64,
            reason: reason.into(),
        };
        info!(addr = %addr, duration_ms = entry.duration_ms, reason = %entry.reason, "address blacklisted");
        self.entries.write().insert(addr, entry);
    }

    /// Whether an address is currently banned.
    ///
    /// An expired entry found here is removed before answering.
    #[must_use]
    pub fn is_blocked(&self, addr: IpAddr) -> bool {
        {
            let entries = self.entries.read();
            match entries.get(&addr) {
                None => return false,
                Some(entry) if !entry.is_expired() => return true,
                Some(_) => {}
            }
        }
        // A re-ban can land between the two locks; evict only an entry
        // that is still expired.
        let mut entries = self.entries.write();
        match entries.get(&addr) {
            Some(entry) if entry.is_expired() => {
                entries.remove(&addr);
                debug!(addr = %addr, "expired blacklist entry evicted");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Lift a ban. Returns whether one existed.
    pub fn remove(&self, addr: IpAddr) -> bool {
        self.entries.write().remove(&addr).is_some()
    }

    /// Current live entries, expired ones pruned on the way out.
    #[must_use]
    pub fn entries(&self) -> Vec<BlacklistEntry> {
        let mut entries = self.entries.write();
        entries.retain(|_, e| !e.is_expired());
        entries.values().cloned().collect()
    }

    /// Number of entries, counting any not yet lazily evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Install loaded records, skipping any that lapsed while on disk.
    /// Returns how many were installed.
    pub fn load_records(&self, records: Vec<BlacklistEntry>) -> usize {
        let mut entries = self.entries.write();
        let mut installed = 0;
        for record in records {
            if record.is_expired() {
                continue;
            }
            entries.insert(record.addr, record);
            installed += 1;
        }
        installed
    }
}

/// Permanent allow list of player identities.
#[derive(Debug, Default)]
pub struct Whitelist {
    players: RwLock<HashSet<Uuid>>,
}

impl Whitelist {
    /// Create an empty whitelist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a player. Returns false if they were already listed.
    pub fn add(&self, player: Uuid) -> bool {
        self.players.write().insert(player)
    }

    /// Whether a player is listed.
    #[must_use]
    pub fn contains(&self, player: Uuid) -> bool {
        self.players.read().contains(&player)
    }

    /// All listed players.
    #[must_use]
    pub fn players(&self) -> Vec<Uuid> {
        self.players.read().iter().copied().collect()
    }

    /// Number of listed players.
    #[must_use]
    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }

    /// Install loaded players. Returns how many were new.
    pub fn load_players(&self, players: Vec<Uuid>) -> usize {
        let mut set = self.players.write();
        players.into_iter().filter(|p| set.insert(*p)).count()
    }
}

/// Decides when a verified session has earned allow-list membership.
#[derive(Debug, Clone)]
pub struct PromotionRule {
    config: PromotionConfig,
}

impl PromotionRule {
    /// Create the rule from configuration.
    #[must_use]
    pub fn from_config(config: &PromotionConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Whether a profile currently qualifies for promotion.
    ///
    /// Requires a bound identity, enough verified tenure, a running threat
    /// maximum under the ceiling, and the basic liveness proofs (settings
    /// and at least one position packet).
    #[must_use]
    pub fn qualifies(&self, profile: &ConnectionProfile) -> bool {
        profile.player().is_some()
            && profile.ticks_since_join() >= self.config.min_ticks
            && profile.max_threat() <= self.config.max_threat
            && profile.sent_client_settings()
            && profile.sent_position()
    }
}
