//! Pick at most one candidate per entity kind.
//!
//! Every selector filters through the matching eligibility predicate first,
//! so a winner is always surfacable right now.

use kayley_core::dynamics::{milestone_eligible, open_loop_eligible, pattern_eligible, thread_eligible};
use kayley_core::{OngoingThread, OpenLoop, RelationshipMilestone, Timestamp, UserPattern};
use rand::{Rng, RngCore};
use std::cmp::Ordering;

/// Bonus added to user-related threads in the deterministic proactive pick.
pub const USER_THREAD_BONUS: f32 = 0.1;

/// Weighted-random thread choice, proportional to intensity.
///
/// The cumulative scan takes the first candidate whose running total exceeds
/// the draw, so equal weights resolve by iteration order.
pub fn select_weighted_thread<'a, R: RngCore + ?Sized>(
    threads: &'a [OngoingThread],
    now: Timestamp,
    rng: &mut R,
) -> Option<&'a OngoingThread> {
    let candidates: Vec<&OngoingThread> = threads.iter().filter(|t| thread_eligible(t, now)).collect();
    let total: f32 = candidates.iter().map(|t| t.intensity).sum();
    if candidates.is_empty() || !(total > 0.0) {
        return None;
    }

    let draw = rng.gen::<f32>() * total;
    let mut running = 0.0;
    for t in &candidates {
        running += t.intensity;
        if running > draw {
            return Some(t);
        }
    }
    // Float rounding can leave the draw at the very end.
    candidates.last().copied()
}

fn proactive_score(t: &OngoingThread) -> f32 {
    t.intensity + if t.user_related { USER_THREAD_BONUS } else { 0.0 }
}

/// Deterministic proactive pick: highest `intensity + user bonus` that is eligible.
pub fn select_proactive_thread(threads: &[OngoingThread], now: Timestamp) -> Option<&OngoingThread> {
    let mut sorted: Vec<&OngoingThread> = threads.iter().collect();
    sorted.sort_by(|a, b| proactive_score(b).total_cmp(&proactive_score(a)));
    sorted.into_iter().find(|t| thread_eligible(t, now))
}

/// Highest confidence, then highest frequency.
pub fn select_pattern(patterns: &[UserPattern], now: Timestamp) -> Option<&UserPattern> {
    let mut sorted: Vec<&UserPattern> = patterns.iter().collect();
    sorted.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| b.frequency.cmp(&a.frequency))
    });
    sorted.into_iter().find(|p| pattern_eligible(p, now))
}

/// Highest priority type, then the oldest.
pub fn select_milestone(
    milestones: &[RelationshipMilestone],
    total_interactions: u32,
    now: Timestamp,
) -> Option<&RelationshipMilestone> {
    let mut sorted: Vec<&RelationshipMilestone> = milestones.iter().collect();
    sorted.sort_by(|a, b| {
        a.milestone_type
            .priority()
            .cmp(&b.milestone_type.priority())
            .then_with(|| a.occurred_at.cmp(&b.occurred_at))
    });
    sorted
        .into_iter()
        .find(|m| milestone_eligible(m, total_interactions, now))
}

/// Highest salience, then the oldest.
pub fn select_open_loop(loops: &[OpenLoop], now: Timestamp) -> Option<&OpenLoop> {
    let mut sorted: Vec<&OpenLoop> = loops.iter().collect();
    sorted.sort_by(|a, b| match b.salience.total_cmp(&a.salience) {
        Ordering::Equal => a.created_at.cmp(&b.created_at),
        other => other,
    });
    sorted.into_iter().find(|l| open_loop_eligible(l, now))
}
