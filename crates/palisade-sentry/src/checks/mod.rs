//! Heuristic checks.
//!
//! Each check turns one behavioral signal into a bounded score. Checks are
//! independent: they share no state with each other, never see another
//! check's result, and score zero whenever their signal lacks data. The
//! calculator owns combining them.

pub mod behavior;
pub mod gravity;
pub mod protocol;
pub mod rate;
pub mod timing;
pub mod username;

use std::sync::Arc;

use crate::attack::AttackTracker;
use crate::config::SentryConfig;
use crate::profile::ConnectionProfile;

pub use gravity::TickMonitor;
pub use rate::RateWindows;

/// A single behavioral heuristic.
///
/// Implementations read the profile and return a score already capped at
/// their configured maximum. Insufficient data scores zero, never a guess.
pub trait Check: Send + Sync {
    /// Stable name, used in breakdowns and logs.
    fn name(&self) -> &'static str;

    /// Whether the check participates in evaluation.
    fn enabled(&self) -> bool;

    /// Raw-score multiplier applied while under attack.
    fn attack_multiplier(&self) -> f64;

    /// Score the profile.
    fn score(&self, profile: &ConnectionProfile) -> u32;
}

/// Build the full check set in evaluation order.
#[must_use]
pub fn build_checks(
    config: &SentryConfig,
    tracker: &Arc<AttackTracker>,
    windows: &Arc<RateWindows>,
    ticks: &Arc<TickMonitor>,
) -> Vec<Box<dyn Check>> {
    vec![
        Box::new(rate::ConnectionRateCheck::new(
            config.rate.clone(),
            Arc::clone(windows),
        )),
        Box::new(timing::PingGateCheck::new(
            config.ping_gate.clone(),
            Arc::clone(tracker),
        )),
        Box::new(username::UsernameCheck::new(
            config.username.clone(),
            Arc::clone(tracker),
        )),
        Box::new(protocol::ProtocolCheck::new(config.protocol.clone())),
        Box::new(behavior::FirstJoinCheck::new(config.first_join.clone())),
        Box::new(gravity::GravityCheck::new(
            config.gravity.clone(),
            Arc::clone(ticks),
        )),
        Box::new(timing::PacketTimingCheck::new(config.packet_timing.clone())),
        Box::new(behavior::PostJoinCheck::new(
            config.post_join.clone(),
            Arc::clone(tracker),
        )),
    ]
}

/// Edit distance between two strings, two-row dynamic programming.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0_usize; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (curr[j] + 1).min(prev[j + 1] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Shannon entropy of a string in bits per character.
#[must_use]
pub fn shannon_entropy(s: &str) -> f64 {
    let mut freq: std::collections::HashMap<char, usize> = std::collections::HashMap::new();
    let mut len = 0_usize;
    for ch in s.chars() {
        len += 1;
        *freq.entry(ch).or_insert(0) += 1;
    }
    if len == 0 {
        return 0.0;
    }
    let len_f = len as f64;
    freq.values()
        .map(|&count| {
            let p = count as f64 / len_f;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    // ==================== Levenshtein Tests ====================

    #[test_case("", "", 0; "both empty")]
    #[test_case("abc", "", 3; "second empty")]
    #[test_case("", "abc", 3; "first empty")]
    #[test_case("kitten", "sitting", 3; "classic")]
    #[test_case("Bot_001", "Bot_002", 1; "generated neighbors")]
    #[test_case("same", "same", 0; "identical")]
    fn test_levenshtein(a: &str, b: &str, expected: usize) {
        assert_eq!(levenshtein(a, b), expected);
        assert_eq!(levenshtein(b, a), expected);
    }

    // ==================== Entropy Tests ====================

    #[test]
    fn test_entropy_of_empty_is_zero() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_entropy_of_repeated_char_is_zero() {
        assert!(shannon_entropy("aaaaaaaa") < f64::EPSILON);
    }

    #[test]
    fn test_entropy_orders_by_variety() {
        let low = shannon_entropy("aaaaaaab");
        let high = shannon_entropy("a8Kq2zXw");
        assert!(low < high);
        // Eight distinct characters carry exactly three bits each.
        assert!((high - 3.0).abs() < 1e-9);
    }
}
