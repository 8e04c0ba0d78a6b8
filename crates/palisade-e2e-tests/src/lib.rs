//! End-to-end scenario tests for Palisade Sentry.
//!
//! These tests exercise the full engine surface:
//! - Pre-login verdicts across every action band
//! - Attack posture detection, escalation, and recovery
//! - In-session verification, directives, and allow-list promotion
//! - List persistence across restarts

#![cfg(test)]
