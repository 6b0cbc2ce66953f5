//! Mood state with between-session relaxation and instant shifts.
//!
//! Mood is a single row: it relaxes toward neutral while nobody is talking,
//! folds each turn's valence into an emotional momentum, and can jump up
//! immediately when a genuine moment is detected.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Mood relaxation toward 0 per idle hour.
pub const MOOD_RELAX_PER_HOUR: f32 = 0.05;
/// Social battery recharge per idle hour.
pub const SOCIAL_RECHARGE_PER_HOUR: f32 = 0.1;
/// Social battery drained by one interaction.
pub const SOCIAL_DRAIN_PER_TURN: f32 = 0.02;
/// Instant mood boost applied by a genuine moment.
pub const GENUINE_MOMENT_BOOST: f32 = 0.3;
/// Momentum floor after a genuine moment.
pub const GENUINE_MOMENT_MOMENTUM: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodLabel {
    Low,
    Guarded,
    Neutral,
    Upbeat,
    Glowing,
}

impl MoodLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoodLabel::Low => "low",
            MoodLabel::Guarded => "guarded",
            MoodLabel::Neutral => "neutral",
            MoodLabel::Upbeat => "upbeat",
            MoodLabel::Glowing => "glowing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodState {
    /// 0.0 - 1.0, set once per day by the caller.
    pub daily_energy: f32,
    /// 0.0 - 1.0
    pub social_battery: f32,
    /// -1.0 - 1.0
    pub mood_level: f32,
    /// -1.0 - 1.0, smoothed valence of recent turns.
    pub momentum: f32,
    /// Consecutive turns with positive valence.
    pub positive_streak: u32,
    pub last_interaction_at: Option<Timestamp>,
    pub last_genuine_moment_at: Option<Timestamp>,
}

impl Default for MoodState {
    fn default() -> Self {
        Self {
            daily_energy: 0.7,
            social_battery: 1.0,
            mood_level: 0.0,
            momentum: 0.0,
            positive_streak: 0,
            last_interaction_at: None,
            last_genuine_moment_at: None,
        }
    }
}

impl MoodState {
    /// Relax the state for the idle time since the last interaction.
    pub fn relax(&mut self, now: Timestamp) {
        let Some(last) = self.last_interaction_at else {
            return;
        };
        let hours = (now - last).num_seconds() as f32 / 3600.0;
        if !(hours > 0.0) {
            return;
        }
        let relax = (MOOD_RELAX_PER_HOUR * hours).min(self.mood_level.abs());
        self.mood_level -= relax * self.mood_level.signum();
        self.social_battery = (self.social_battery + SOCIAL_RECHARGE_PER_HOUR * hours).min(1.0);
        self.normalize();
    }

    /// Fold one conversational turn into the state.
    pub fn record_interaction(&mut self, valence: f32, now: Timestamp) {
        self.relax(now);
        let valence = if valence.is_finite() { valence.clamp(-1.0, 1.0) } else { 0.0 };
        self.momentum = self.momentum * 0.7 + valence * 0.3;
        self.mood_level += valence * 0.1;
        if valence > 0.1 {
            self.positive_streak = self.positive_streak.saturating_add(1);
        } else if valence < -0.1 {
            self.positive_streak = 0;
        }
        self.social_battery = (self.social_battery - SOCIAL_DRAIN_PER_TURN).max(0.0);
        self.last_interaction_at = Some(now);
        self.normalize();
    }

    /// Instant shift for a strongly genuine moment, applied before the prompt is built.
    pub fn apply_genuine_moment(&mut self, now: Timestamp) {
        self.mood_level += GENUINE_MOMENT_BOOST;
        self.momentum = self.momentum.max(GENUINE_MOMENT_MOMENTUM);
        self.positive_streak = self.positive_streak.saturating_add(1);
        self.last_genuine_moment_at = Some(now);
        self.normalize();
    }

    pub fn label(&self) -> MoodLabel {
        let score = self.mood_level * 0.6 + self.momentum * 0.4;
        if score < -0.4 {
            MoodLabel::Low
        } else if score < -0.1 {
            MoodLabel::Guarded
        } else if score < 0.2 {
            MoodLabel::Neutral
        } else if score < 0.5 {
            MoodLabel::Upbeat
        } else {
            MoodLabel::Glowing
        }
    }

    fn normalize(&mut self) {
        self.daily_energy = sanitize(self.daily_energy, 0.7).clamp(0.0, 1.0);
        self.social_battery = sanitize(self.social_battery, 1.0).clamp(0.0, 1.0);
        self.mood_level = sanitize(self.mood_level, 0.0).clamp(-1.0, 1.0);
        self.momentum = sanitize(self.momentum, 0.0).clamp(-1.0, 1.0);
    }
}

#[inline]
fn sanitize(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        tracing::warn!("NaN/Inf detected in mood state, resetting to fallback {}", fallback);
        fallback
    }
}
