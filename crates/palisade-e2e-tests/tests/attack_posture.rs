//! End-to-end tests for attack detection and posture-driven escalation.
//!
//! These tests verify:
//! 1. A connection flood flips the engine into attack posture
//! 2. The same hostile join that passes when calm is rejected mid-attack
//! 3. Name-templated waves are recognized and banned once posture flips
//! 4. Posture recovers after a full quiet cooldown

mod helpers;

use std::time::Duration;

use helpers::*;
use palisade_sentry::{AttackConfig, SentryConfig};
use tokio::time::sleep;

fn flood_config(window_ms: u64, threshold: u32, cooldown: Duration) -> SentryConfig {
    SentryConfig::builder()
        .attack(AttackConfig {
            window: Duration::from_millis(window_ms),
            threshold,
            cooldown,
            ..AttackConfig::default()
        })
        .build()
}

// ============================================================================
// Escalation Tests
// ============================================================================

#[tokio::test]
async fn test_flood_flips_posture_and_escalates_verdicts() {
    let (sentry, notifier) = recording_engine(flood_config(40, 5, Duration::from_secs(60)));
    let handles = sentry.start();

    // Calm server: a cold bot-named join scores under every threshold.
    let (_, verdict) = cold_login(&sentry, addr(0, 1), "Bot12345", None);
    assert!(verdict.is_allowed());
    assert!(!sentry.is_under_attack());

    // A burst of bare connections crosses the window threshold.
    for i in 0..10 {
        sentry.connect(addr(0, 100 + i));
    }
    sleep(Duration::from_millis(120)).await;
    assert!(sentry.is_under_attack());
    assert_eq!(notifier.attacks(), 1);

    // The same join shape is now multiplied over shrunken thresholds.
    let (_, verdict) = cold_login(&sentry, addr(0, 2), "Bot54321", None);
    assert!(!verdict.is_allowed());
    let stats = sentry.stats();
    assert_eq!(stats.kicked, 1);
    // Kick, not blacklist: the address stays off the deny list.
    assert!(!sentry.is_blocked(addr(0, 2)));
    assert_eq!(notifier.rejections().len(), 1);

    handles.stop();
}

#[tokio::test]
async fn test_templated_name_wave_banned_once_posture_flips() {
    let (sentry, notifier) = recording_engine(flood_config(40, 8, Duration::from_secs(60)));
    let handles = sentry.start();

    // The wave arrives before the window closes, so every member still
    // scores in normal mode and slips through.
    for i in 0..10 {
        let name = format!("Raider_{}", 10 + i);
        let (_, verdict) = cold_login(&sentry, addr(1, 10 + i), &name, None);
        assert!(verdict.is_allowed());
    }
    sleep(Duration::from_millis(120)).await;
    assert!(sentry.is_under_attack());
    assert_eq!(notifier.attacks(), 1);

    // A straggler from the same template now trips the similarity signal
    // on top of the doubled pattern score and lands in the blacklist band.
    let (_, verdict) = cold_login(&sentry, addr(1, 99), "Raider_99", None);
    assert!(!verdict.is_allowed());
    assert!(sentry.is_blocked(addr(1, 99)));
    assert_eq!(sentry.stats().blacklisted, 1);

    let entries = sentry.blacklist_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].addr, addr(1, 99));
    assert_eq!(entries[0].reason, "threat score 59");

    handles.stop();
}

// ============================================================================
// Recovery Tests
// ============================================================================

#[tokio::test]
async fn test_posture_recovers_after_quiet_cooldown() {
    let (sentry, notifier) = recording_engine(flood_config(30, 5, Duration::from_millis(100)));
    let handles = sentry.start();

    for i in 0..8 {
        sentry.connect(addr(2, 10 + i));
    }
    sleep(Duration::from_millis(70)).await;
    assert!(sentry.is_under_attack());

    // Quiet windows past the cooldown bring the server back to normal.
    sleep(Duration::from_millis(250)).await;
    assert!(!sentry.is_under_attack());
    assert_eq!(notifier.attacks(), 1);
    assert_eq!(notifier.recoveries(), 1);

    // Scoring is back on normal thresholds.
    let (_, verdict) = clean_login(&sentry, addr(2, 99), "Herobrine", None);
    assert!(verdict.is_allowed());

    handles.stop();
}
