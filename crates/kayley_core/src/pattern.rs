//! Cross-session observations about the user.

use crate::{StoredEnum, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// e.g. "seems stressed on Monday mornings"
    MoodTime,
    /// e.g. "gets quiet whenever work comes up"
    TopicCorrelation,
    /// e.g. "usually checks in late at night"
    Behavior,
}

impl StoredEnum for PatternType {
    fn as_str(&self) -> &'static str {
        match self {
            PatternType::MoodTime => "mood_time",
            PatternType::TopicCorrelation => "topic_correlation",
            PatternType::Behavior => "behavior",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "mood_time" => Some(PatternType::MoodTime),
            "topic_correlation" => Some(PatternType::TopicCorrelation),
            "behavior" => Some(PatternType::Behavior),
            _ => None,
        }
    }
}

/// A repeated behavioral or mood correlation.
///
/// `(pattern_type, observation)` is the natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPattern {
    pub id: Uuid,
    pub pattern_type: PatternType,
    pub observation: String,
    pub frequency: u32,
    pub confidence: f32,
    pub first_observed: Timestamp,
    pub last_observed: Timestamp,
    pub surface_count: u32,
    pub last_surfaced_at: Option<Timestamp>,
}

impl UserPattern {
    pub fn new(pattern_type: PatternType, observation: &str, now: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            pattern_type,
            observation: observation.to_string(),
            frequency: 1,
            confidence: crate::dynamics::INITIAL_PATTERN_CONFIDENCE,
            first_observed: now,
            last_observed: now,
            surface_count: 0,
            last_surfaced_at: None,
        }
    }

    /// Fold in one more matching observation.
    pub fn reinforce(&mut self, now: Timestamp) {
        self.frequency = self.frequency.saturating_add(1);
        self.confidence = crate::dynamics::reinforced_confidence(self.confidence);
        if now > self.last_observed {
            self.last_observed = now;
        }
    }
}
