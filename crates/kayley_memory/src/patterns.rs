//! Cross-session pattern detection and bookkeeping.

use crate::store::CompanionStore;
use anyhow::Result;
use chrono::{Datelike, Timelike, Weekday};
use kayley_core::{PatternType, Timestamp, UserPattern};
use std::sync::Arc;

/// Topic keywords used for topic/mood correlations.
const TOPICS: &[(&str, &[&str])] = &[
    ("work", &["work", "job", "boss", "meeting", "deadline", "coworker"]),
    ("school", &["school", "class", "exam", "homework", "professor"]),
    ("family", &["mom", "dad", "sister", "brother", "family", "parents"]),
    ("dating", &["date", "boyfriend", "girlfriend", "crush", "ex "]),
    ("health", &["doctor", "sick", "gym", "sleep", "headache"]),
];

/// One candidate observation extracted from a message.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternObservation {
    pub pattern_type: PatternType,
    pub observation: String,
}

fn weekday_name(d: Weekday) -> &'static str {
    match d {
        Weekday::Mon => "Mondays",
        Weekday::Tue => "Tuesdays",
        Weekday::Wed => "Wednesdays",
        Weekday::Thu => "Thursdays",
        Weekday::Fri => "Fridays",
        Weekday::Sat => "Saturdays",
        Weekday::Sun => "Sundays",
    }
}

fn mood_word(valence: f32) -> Option<&'static str> {
    if valence <= -0.3 {
        Some("down")
    } else if valence >= 0.3 {
        Some("upbeat")
    } else {
        None
    }
}

/// Extract observations from one user message.
///
/// `valence` is the message sentiment in [-1, 1]; `at` is the local send time.
pub fn detect_patterns(message: &str, valence: f32, at: Timestamp) -> Vec<PatternObservation> {
    let lower = message.to_lowercase();
    let mut out = Vec::new();

    if let Some(mood) = mood_word(valence) {
        out.push(PatternObservation {
            pattern_type: PatternType::MoodTime,
            observation: format!("seems {} on {}", mood, weekday_name(at.weekday())),
        });

        for (topic, keywords) in TOPICS {
            if keywords.iter().any(|k| lower.contains(k)) {
                out.push(PatternObservation {
                    pattern_type: PatternType::TopicCorrelation,
                    observation: format!("feels {} when talking about {}", mood, topic),
                });
            }
        }
    }

    let hour = at.hour();
    if hour >= 23 || hour < 4 {
        out.push(PatternObservation {
            pattern_type: PatternType::Behavior,
            observation: "tends to check in late at night".to_string(),
        });
    }

    out
}

pub struct PatternTracker {
    store: Arc<dyn CompanionStore>,
}

impl PatternTracker {
    pub fn new(store: Arc<dyn CompanionStore>) -> Self {
        Self { store }
    }

    /// Insert a new pattern or reinforce the existing row for the same key.
    pub async fn observe(&self, pattern_type: PatternType, observation: &str, now: Timestamp) -> Result<UserPattern> {
        let pattern = match self.store.find_pattern(pattern_type, observation).await? {
            Some(mut existing) => {
                existing.reinforce(now);
                tracing::debug!(
                    "Reinforced pattern '{}' (freq={}, conf={:.2})",
                    observation,
                    existing.frequency,
                    existing.confidence
                );
                existing
            }
            None => {
                tracing::debug!("New pattern '{}'", observation);
                UserPattern::new(pattern_type, observation, now)
            }
        };
        self.store.upsert_pattern(&pattern).await?;
        Ok(pattern)
    }

    /// Detect and record every pattern found in a message.
    pub async fn analyze_message(&self, message: &str, valence: f32, now: Timestamp) -> Result<Vec<UserPattern>> {
        let mut recorded = Vec::new();
        for obs in detect_patterns(message, valence, now) {
            recorded.push(self.observe(obs.pattern_type, &obs.observation, now).await?);
        }
        Ok(recorded)
    }

    pub async fn list(&self) -> Result<Vec<UserPattern>> {
        self.store.list_patterns().await
    }

    pub async fn mark_surfaced(&self, pattern: &UserPattern, now: Timestamp) -> Result<UserPattern> {
        let mut updated = pattern.clone();
        updated.surface_count = updated.surface_count.saturating_add(1);
        updated.last_surfaced_at = Some(now);
        self.store.upsert_pattern(&updated).await?;
        Ok(updated)
    }
}
