//! Property-based tests for kayley_core.
//!
//! Decay, confidence growth and eligibility gates must hold for every input,
//! including the malformed values that can come back from storage.

use chrono::{Duration, TimeZone, Utc};
use kayley_core::dynamics::{
    confidence_after_repeats, decay_thread, decayed_intensity, pattern_eligible, reinforced_confidence,
    thread_decay_rate, thread_eligible, THREAD_INTENSITY_FLOOR,
};
use kayley_core::mood::MoodState;
use kayley_core::{OngoingThread, PatternType, RelationshipTier, ThreadTheme, Timestamp, UserPattern};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn base_time() -> Timestamp {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// A thread with arbitrary intensity, age (hours) and mention history.
fn arb_thread() -> impl Strategy<Value = OngoingThread> {
    (
        0.0f32..=1.0,
        0i64..=24 * 10,
        prop::option::of(0i64..=72),
        any::<bool>(),
    )
        .prop_map(|(intensity, age_hours, mentioned_hours_ago, user_related)| {
            let now = base_time();
            let mut t = OngoingThread::new(
                ThreadTheme::Work,
                "thinking about a brand deal",
                intensity,
                now - Duration::hours(age_hours),
            );
            t.user_related = user_related;
            t.last_mentioned = mentioned_hours_ago.map(|h| now - Duration::hours(h));
            t
        })
}

fn arb_pattern() -> impl Strategy<Value = UserPattern> {
    (0u32..=10, 0.0f32..=1.0, 0u32..=4, prop::option::of(0i64..=30))
        .prop_map(|(frequency, confidence, surface_count, surfaced_days_ago)| {
            let now = base_time();
            let mut p = UserPattern::new(PatternType::MoodTime, "quiet on sundays", now - Duration::days(40));
            p.frequency = frequency;
            p.confidence = confidence;
            p.surface_count = surface_count;
            p.last_surfaced_at = surfaced_days_ago.map(|d| now - Duration::days(d));
            p
        })
}

// ============================================================================
// Thread decay
// ============================================================================

proptest! {
    /// Decay is exactly `max(floor, before - hours * rate)` with the rate picked
    /// only by `user_related`.
    #[test]
    fn decay_matches_closed_form(
        intensity in 0.0f32..=1.0,
        hours in 0.0f32..=500.0,
        user_related in any::<bool>(),
    ) {
        let after = decayed_intensity(intensity, hours, user_related);
        let expected = (intensity - hours * thread_decay_rate(user_related)).max(THREAD_INTENSITY_FLOOR);
        prop_assert!((after - expected).abs() < 1e-5);
    }

    /// Decay never raises intensity above where it started (unless it was below the floor).
    #[test]
    fn decay_never_increases(intensity in 0.1f32..=1.0, hours in -100.0f32..=500.0, user in any::<bool>()) {
        prop_assert!(decayed_intensity(intensity, hours, user) <= intensity + 1e-6);
    }

    /// Decaying twice at the same instant is the same as decaying once.
    #[test]
    fn decay_is_idempotent_at_same_instant(thread in arb_thread()) {
        let now = base_time();
        let mut t = thread;
        decay_thread(&mut t, now);
        let once = t.intensity;
        decay_thread(&mut t, now);
        prop_assert_eq!(once, t.intensity);
    }
}

// ============================================================================
// Patterns
// ============================================================================

proptest! {
    #[test]
    fn confidence_after_k_repeats(k in 0u32..=20) {
        let mut c = confidence_after_repeats(0);
        for _ in 0..k {
            c = reinforced_confidence(c);
        }
        let expected = (0.30 + 0.12 * k as f32).min(1.0);
        prop_assert!((c - expected).abs() < 1e-4);
    }

    #[test]
    fn confidence_never_decreases(c in 0.0f32..=1.0) {
        prop_assert!(reinforced_confidence(c) >= c);
    }

    /// An eligible pattern always satisfies every individual gate.
    #[test]
    fn eligible_pattern_satisfies_all_gates(p in arb_pattern()) {
        let now = base_time();
        if pattern_eligible(&p, now) {
            prop_assert!(p.frequency >= 3);
            prop_assert!(p.confidence >= 0.6);
            prop_assert!(p.surface_count < 2);
            if let Some(last) = p.last_surfaced_at {
                prop_assert!(now - last >= Duration::days(7));
            }
        }
    }
}

// ============================================================================
// Thread eligibility
// ============================================================================

proptest! {
    #[test]
    fn eligible_thread_satisfies_all_gates(t in arb_thread()) {
        let now = base_time();
        if thread_eligible(&t, now) {
            prop_assert!(t.intensity >= 0.6);
            prop_assert!(now - t.created_at >= Duration::hours(4));
            if let Some(m) = t.last_mentioned {
                prop_assert!(now - m >= Duration::hours(24));
            }
        }
    }
}

// ============================================================================
// Mood and tiers
// ============================================================================

proptest! {
    #[test]
    fn mood_stays_in_range(
        valences in prop::collection::vec(-5.0f32..=5.0, 0..30),
        genuine in any::<bool>(),
        idle_hours in 0i64..=100,
    ) {
        let mut mood = MoodState::default();
        let mut now = base_time();
        for v in valences {
            now += Duration::minutes(5);
            mood.record_interaction(v, now);
        }
        if genuine {
            mood.apply_genuine_moment(now);
        }
        mood.relax(now + Duration::hours(idle_hours));
        prop_assert!((-1.0..=1.0).contains(&mood.mood_level));
        prop_assert!((-1.0..=1.0).contains(&mood.momentum));
        prop_assert!((0.0..=1.0).contains(&mood.social_battery));
    }

    /// Tier is monotonic in score.
    #[test]
    fn tier_is_monotonic(a in -100.0f32..=100.0, b in -100.0f32..=100.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let rank = |t: RelationshipTier| RelationshipTier::ALL.iter().position(|x| *x == t).unwrap();
        prop_assert!(rank(RelationshipTier::from_score(lo)) <= rank(RelationshipTier::from_score(hi)));
    }
}
