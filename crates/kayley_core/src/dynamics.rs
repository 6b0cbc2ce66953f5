//! Decay and surfacing-eligibility rules.
//!
//! Every function here is pure: it takes the entity and the current time and
//! returns a new value or a yes/no answer. Malformed inputs (non-finite
//! intensities, missing timestamps) resolve to "not eligible" instead of
//! erroring.

use crate::milestone::RelationshipMilestone;
use crate::open_loop::{LoopStatus, OpenLoop};
use crate::pattern::UserPattern;
use crate::thread::OngoingThread;
use crate::Timestamp;
use chrono::Duration;

// ============================================================================
// Threads
// ============================================================================

pub const MIN_ACTIVE_THREADS: usize = 2;
pub const MAX_ACTIVE_THREADS: usize = 5;

/// Intensity never decays below this.
pub const THREAD_INTENSITY_FLOOR: f32 = 0.1;
pub const USER_THREAD_DECAY_PER_HOUR: f32 = 0.05;
pub const AUTONOMOUS_THREAD_DECAY_PER_HOUR: f32 = 0.02;
/// Autonomous threads are pruned below this; user threads at the floor.
pub const AUTONOMOUS_PRUNE_INTENSITY: f32 = 0.15;
pub const THREAD_MAX_AGE_SECS: i64 = 7 * 24 * 3600;

pub fn thread_decay_rate(user_related: bool) -> f32 {
    if user_related {
        USER_THREAD_DECAY_PER_HOUR
    } else {
        AUTONOMOUS_THREAD_DECAY_PER_HOUR
    }
}

/// `max(floor, intensity - hours * rate)`. Negative elapsed time decays nothing.
pub fn decayed_intensity(intensity: f32, hours: f32, user_related: bool) -> f32 {
    if !intensity.is_finite() {
        return THREAD_INTENSITY_FLOOR;
    }
    let hours = if hours.is_finite() { hours.max(0.0) } else { 0.0 };
    (intensity - hours * thread_decay_rate(user_related)).max(THREAD_INTENSITY_FLOOR)
}

/// Decay a thread in place for the hours since it was last updated.
pub fn decay_thread(thread: &mut OngoingThread, now: Timestamp) {
    let hours = hours_between(thread.last_updated, now);
    thread.intensity = decayed_intensity(thread.intensity, hours, thread.user_related);
    if now > thread.last_updated {
        thread.last_updated = now;
    }
}

/// Raise intensity (capped at 1.0) and mark the thread as just mentioned.
pub fn boost_thread(thread: &mut OngoingThread, amount: f32, now: Timestamp) {
    decay_thread(thread, now);
    let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };
    thread.intensity = (thread.intensity + amount).min(1.0);
    thread.last_mentioned = Some(now);
}

pub fn should_prune_thread(thread: &OngoingThread, now: Timestamp) -> bool {
    if (now - thread.created_at).num_seconds() > THREAD_MAX_AGE_SECS {
        return true;
    }
    if !thread.intensity.is_finite() || thread.intensity < THREAD_INTENSITY_FLOOR {
        return true;
    }
    !thread.user_related && thread.intensity < AUTONOMOUS_PRUNE_INTENSITY
}

// ============================================================================
// Patterns
// ============================================================================

pub const INITIAL_PATTERN_CONFIDENCE: f32 = 0.30;
pub const PATTERN_CONFIDENCE_STEP: f32 = 0.12;

/// Confidence after one more matching observation. Never decreases.
pub fn reinforced_confidence(confidence: f32) -> f32 {
    let base = if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        INITIAL_PATTERN_CONFIDENCE
    };
    (base + PATTERN_CONFIDENCE_STEP).min(1.0)
}

/// Closed form of `k` repeats from the initial value.
pub fn confidence_after_repeats(k: u32) -> f32 {
    (INITIAL_PATTERN_CONFIDENCE + PATTERN_CONFIDENCE_STEP * k as f32).min(1.0)
}

// ============================================================================
// Generic surfacing rule
// ============================================================================

/// Shape shared by all surfacing predicates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacingRule {
    pub min_observations: u32,
    pub min_strength: f32,
    pub max_surfaces: u32,
    pub cooldown_secs: i64,
    pub min_age_secs: i64,
}

/// Normalized view of an entity for [`SurfacingRule::allows`].
#[derive(Debug, Clone, Copy)]
pub struct SurfacingInput {
    pub observations: u32,
    pub strength: f32,
    pub surface_count: u32,
    pub last_surfaced_at: Option<Timestamp>,
    pub created_at: Option<Timestamp>,
}

impl SurfacingRule {
    pub fn allows(&self, input: &SurfacingInput, now: Timestamp) -> bool {
        if input.observations < self.min_observations {
            return false;
        }
        if !input.strength.is_finite() || input.strength < self.min_strength {
            return false;
        }
        if input.surface_count >= self.max_surfaces {
            return false;
        }
        if let Some(last) = input.last_surfaced_at {
            if (now - last).num_seconds() < self.cooldown_secs {
                return false;
            }
        }
        if self.min_age_secs > 0 {
            match input.created_at {
                Some(created) if (now - created).num_seconds() >= self.min_age_secs => {}
                _ => return false,
            }
        }
        true
    }
}

const HOUR: i64 = 3600;

pub const THREAD_SURFACING: SurfacingRule = SurfacingRule {
    min_observations: 0,
    min_strength: 0.6,
    max_surfaces: u32::MAX,
    cooldown_secs: 24 * HOUR,
    min_age_secs: 4 * HOUR,
};

pub const PATTERN_SURFACING: SurfacingRule = SurfacingRule {
    min_observations: 3,
    min_strength: 0.6,
    max_surfaces: 2,
    cooldown_secs: 7 * 24 * HOUR,
    min_age_secs: 0,
};

/// `min_observations` here is the relationship's total interaction count.
pub const MILESTONE_SURFACING: SurfacingRule = SurfacingRule {
    min_observations: 50,
    min_strength: 0.0,
    max_surfaces: 3,
    cooldown_secs: 72 * HOUR,
    min_age_secs: 24 * HOUR,
};

pub const OPEN_LOOP_SURFACING: SurfacingRule = SurfacingRule {
    min_observations: 0,
    min_strength: 0.0,
    max_surfaces: u32::MAX,
    cooldown_secs: 12 * HOUR,
    min_age_secs: 0,
};

pub const OPEN_LOOP_MAX_AGE_SECS: i64 = 7 * 24 * HOUR;

pub fn thread_eligible(thread: &OngoingThread, now: Timestamp) -> bool {
    THREAD_SURFACING.allows(
        &SurfacingInput {
            observations: 0,
            strength: thread.intensity,
            surface_count: 0,
            last_surfaced_at: thread.last_mentioned,
            created_at: Some(thread.created_at),
        },
        now,
    )
}

pub fn pattern_eligible(pattern: &UserPattern, now: Timestamp) -> bool {
    PATTERN_SURFACING.allows(
        &SurfacingInput {
            observations: pattern.frequency,
            strength: pattern.confidence,
            surface_count: pattern.surface_count,
            last_surfaced_at: pattern.last_surfaced_at,
            created_at: Some(pattern.first_observed),
        },
        now,
    )
}

pub fn milestone_eligible(
    milestone: &RelationshipMilestone,
    total_interactions: u32,
    now: Timestamp,
) -> bool {
    MILESTONE_SURFACING.allows(
        &SurfacingInput {
            observations: total_interactions,
            strength: 1.0,
            surface_count: milestone.reference_count,
            last_surfaced_at: milestone.last_referenced_at,
            created_at: Some(milestone.occurred_at),
        },
        now,
    )
}

pub fn open_loop_expired(open_loop: &OpenLoop, now: Timestamp) -> bool {
    (now - open_loop.created_at).num_seconds() > OPEN_LOOP_MAX_AGE_SECS
}

pub fn open_loop_eligible(open_loop: &OpenLoop, now: Timestamp) -> bool {
    if open_loop.status != LoopStatus::Active && open_loop.status != LoopStatus::Surfaced {
        return false;
    }
    if open_loop_expired(open_loop, now) {
        return false;
    }
    if let Some(after) = open_loop.surface_after {
        if now < after {
            return false;
        }
    }
    if open_loop.surface_count >= open_loop.max_surfaces {
        return false;
    }
    OPEN_LOOP_SURFACING.allows(
        &SurfacingInput {
            observations: 0,
            strength: open_loop.salience,
            surface_count: open_loop.surface_count,
            last_surfaced_at: open_loop.last_surfaced_at,
            created_at: Some(open_loop.created_at),
        },
        now,
    )
}

fn hours_between(from: Timestamp, to: Timestamp) -> f32 {
    let secs = (to - from).num_seconds();
    if secs <= 0 {
        0.0
    } else {
        secs as f32 / 3600.0
    }
}

/// Helper for callers that need a `chrono::Duration` view of a rule.
pub fn cooldown(rule: &SurfacingRule) -> Duration {
    Duration::seconds(rule.cooldown_secs)
}
