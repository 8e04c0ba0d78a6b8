//! Protocol-compliance check.

use crate::config::ProtocolCheckConfig;
use crate::profile::ConnectionProfile;

use super::Check;

/// Scores sessions that skip or mangle routine protocol traffic.
///
/// Real clients volunteer their settings and brand shortly after joining
/// and put a sane hostname in the handshake. Minimal bot stacks skip the
/// optional packets entirely or fill them with garbage.
pub struct ProtocolCheck {
    config: ProtocolCheckConfig,
}

impl ProtocolCheck {
    /// Create the check.
    #[must_use]
    pub fn new(config: ProtocolCheckConfig) -> Self {
        Self { config }
    }

    fn hostname_invalid(&self, hostname: &str) -> bool {
        hostname.is_empty()
            || hostname.len() > self.config.max_hostname_len
            || hostname.contains('\0')
    }

    fn brand_invalid(&self, brand: &str) -> bool {
        brand.is_empty() || brand.len() > self.config.max_brand_len
    }
}

impl Check for ProtocolCheck {
    fn name(&self) -> &'static str {
        "protocol"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn attack_multiplier(&self) -> f64 {
        self.config.attack_multiplier
    }

    fn score(&self, profile: &ConnectionProfile) -> u32 {
        let mut score = 0;
        let ticks = profile.ticks_since_join();

        if profile.has_joined() {
            if ticks > self.config.settings_deadline_ticks && !profile.sent_client_settings() {
                score += self.config.missing_settings_score;
            }
            if ticks > self.config.brand_deadline_ticks && profile.brand().is_none() {
                score += self.config.missing_brand_score;
            }
        }

        if let Some(brand) = profile.brand() {
            if self.brand_invalid(&brand) {
                score += self.config.invalid_brand_score;
            }
        }

        if let Some(hostname) = profile.hostname() {
            if self.hostname_invalid(&hostname) {
                score += self.config.invalid_hostname_score;
            }
        }

        score.min(self.config.max_score)
    }
}
