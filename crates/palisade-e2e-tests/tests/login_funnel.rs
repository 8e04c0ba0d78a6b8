//! End-to-end tests for the pre-login verdict funnel.
//!
//! These tests verify:
//! 1. Mild scores are delayed with the configured duration, not rejected
//! 2. The kick band disconnects with the configured message
//! 3. The blacklist band bans the source and gates later reconnects
//! 4. A total exactly on a threshold lands in the severer band

mod helpers;

use std::time::{Duration, Instant};

use helpers::*;
use palisade_sentry::{ExecutorConfig, PreLoginVerdict, SentryConfig, ThresholdConfig};

fn banded_config(delay: u32, kick: u32, blacklist: u32) -> SentryConfig {
    SentryConfig::builder()
        .thresholds(ThresholdConfig {
            delay,
            kick,
            blacklist,
            ..ThresholdConfig::default()
        })
        .build()
}

// ============================================================================
// Delay Band Tests
// ============================================================================

#[tokio::test]
async fn test_mild_score_is_delayed_not_rejected() {
    let config = SentryConfig::builder()
        .thresholds(ThresholdConfig {
            delay: 2,
            kick: 50,
            blacklist: 80,
            ..ThresholdConfig::default()
        })
        .executor(ExecutorConfig {
            delay: Duration::from_millis(120),
            ..ExecutorConfig::default()
        })
        .build();
    let (sentry, _) = recording_engine(config);

    // A cold join with an ordinary name carries only the missing-ping
    // score, enough for the lowest band and nothing more.
    let started = Instant::now();
    let (_, verdict) = cold_login(&sentry, addr(10, 1), "Herobrine", None);
    let elapsed = started.elapsed();

    assert!(verdict.is_allowed());
    let PreLoginVerdict::Delay { duration } = verdict else {
        panic!("expected a delay verdict, got {verdict:?}");
    };
    assert_eq!(duration, Duration::from_millis(120));
    // The default executor hands the wait to the caller instead of
    // sleeping on the login path.
    assert!(elapsed < Duration::from_millis(100));
    assert_eq!(sentry.stats().delayed, 1);
}

// ============================================================================
// Kick Band Tests
// ============================================================================

#[tokio::test]
async fn test_kick_band_reports_configured_message() {
    let config = SentryConfig::builder()
        .thresholds(ThresholdConfig {
            delay: 5,
            kick: 12,
            blacklist: 90,
            ..ThresholdConfig::default()
        })
        .executor(ExecutorConfig {
            kick_message: "No bots today".into(),
            ..ExecutorConfig::default()
        })
        .build();
    let (sentry, notifier) = recording_engine(config);

    let (_, verdict) = cold_login(&sentry, addr(10, 2), "Bot12345", None);
    assert_eq!(
        verdict,
        PreLoginVerdict::Reject {
            reason: "No bots today".into()
        }
    );
    assert_eq!(sentry.stats().kicked, 1);
    assert!(!sentry.is_blocked(addr(10, 2)));
    assert_eq!(
        notifier.rejections(),
        vec![(addr(10, 2), "No bots today".to_owned())]
    );
}

// ============================================================================
// Blacklist Band Tests
// ============================================================================

#[tokio::test]
async fn test_blacklist_band_bans_and_gates_reconnects() {
    let (sentry, notifier) = recording_engine(banded_config(2, 5, 12));

    let hostile = addr(10, 3);
    let (_, verdict) = cold_login(&sentry, hostile, "Bot12345", None);
    assert!(!verdict.is_allowed());
    assert!(sentry.is_blocked(hostile));

    let entries = sentry.blacklist_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, "threat score 14");

    // The reconnect is refused by the list gate before any check runs,
    // so no verdict counter moves a second time.
    let conn = sentry.connect(hostile);
    assert!(!sentry.pre_login(conn, None).is_allowed());
    let stats = sentry.stats();
    assert_eq!(stats.blacklisted, 1);
    assert_eq!(stats.kicked, 0);
    assert_eq!(notifier.rejections().len(), 2);
}

// ============================================================================
// Band Boundary Tests
// ============================================================================

#[tokio::test]
async fn test_exact_threshold_lands_in_severer_band() {
    // A cold bot-named join totals exactly fourteen points.
    let (on_kick, _) = recording_engine(banded_config(2, 14, 90));
    let (_, verdict) = cold_login(&on_kick, addr(10, 4), "Bot12345", None);
    assert!(!verdict.is_allowed());
    assert!(!on_kick.is_blocked(addr(10, 4)));
    assert_eq!(on_kick.stats().kicked, 1);

    let (on_blacklist, _) = recording_engine(banded_config(2, 13, 14));
    let (_, verdict) = cold_login(&on_blacklist, addr(10, 5), "Bot12345", None);
    assert!(!verdict.is_allowed());
    assert!(on_blacklist.is_blocked(addr(10, 5)));
    assert_eq!(on_blacklist.stats().blacklisted, 1);
}
