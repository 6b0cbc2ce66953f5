//! Narrative arcs: longer-lived storylines in Kayley's simulated life.

use crate::error::KayleyError;
use crate::{StoredEnum, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcType {
    Ongoing,
    Resolved,
    Paused,
    Abandoned,
}

impl ArcType {
    /// One-way transitions, except paused <-> ongoing.
    pub fn can_transition_to(&self, next: ArcType) -> bool {
        matches!(
            (self, next),
            (ArcType::Ongoing, ArcType::Resolved)
                | (ArcType::Ongoing, ArcType::Paused)
                | (ArcType::Ongoing, ArcType::Abandoned)
                | (ArcType::Paused, ArcType::Ongoing)
                | (ArcType::Paused, ArcType::Resolved)
                | (ArcType::Paused, ArcType::Abandoned)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ArcType::Resolved | ArcType::Abandoned)
    }
}

impl StoredEnum for ArcType {
    fn as_str(&self) -> &'static str {
        match self {
            ArcType::Ongoing => "ongoing",
            ArcType::Resolved => "resolved",
            ArcType::Paused => "paused",
            ArcType::Abandoned => "abandoned",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "ongoing" => Some(ArcType::Ongoing),
            "resolved" => Some(ArcType::Resolved),
            "paused" => Some(ArcType::Paused),
            "abandoned" => Some(ArcType::Abandoned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcEvent {
    pub date: Timestamp,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeArc {
    /// Natural key, e.g. "collab_with_sarah".
    pub arc_key: String,
    pub title: String,
    pub arc_type: ArcType,
    pub started_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub resolution: Option<String>,
    /// Ordered by insertion.
    pub events: Vec<ArcEvent>,
    pub mentioned_to: BTreeSet<String>,
}

impl NarrativeArc {
    pub fn new(arc_key: &str, title: &str, now: Timestamp) -> Self {
        Self {
            arc_key: arc_key.to_string(),
            title: title.to_string(),
            arc_type: ArcType::Ongoing,
            started_at: now,
            resolved_at: None,
            resolution: None,
            events: Vec::new(),
            mentioned_to: BTreeSet::new(),
        }
    }

    pub fn add_event(&mut self, description: &str, date: Timestamp) {
        self.events.push(ArcEvent {
            date,
            description: description.to_string(),
        });
    }

    /// Apply an explicit state change, rejecting anything the ladder forbids.
    pub fn transition(
        &mut self,
        next: ArcType,
        resolution: Option<&str>,
        now: Timestamp,
    ) -> Result<(), KayleyError> {
        if !self.arc_type.can_transition_to(next) {
            return Err(KayleyError::InvalidTransition {
                entity: "narrative_arc",
                from: self.arc_type.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.arc_type = next;
        if next.is_terminal() {
            self.resolved_at = Some(now);
            self.resolution = resolution.map(str::to_string);
        }
        Ok(())
    }

    pub fn latest_event(&self) -> Option<&ArcEvent> {
        self.events.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_arc_lifecycle() {
        let now = Utc::now();
        let mut arc = NarrativeArc::new("collab", "Collab video with Sarah", now);
        assert_eq!(arc.arc_type, ArcType::Ongoing);

        arc.transition(ArcType::Paused, None, now).unwrap();
        arc.transition(ArcType::Ongoing, None, now).unwrap();
        assert!(arc.resolved_at.is_none());

        arc.transition(ArcType::Resolved, Some("video went live"), now)
            .unwrap();
        assert_eq!(arc.resolved_at, Some(now));
        assert_eq!(arc.resolution.as_deref(), Some("video went live"));
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let now = Utc::now();
        let mut arc = NarrativeArc::new("k", "t", now);
        arc.transition(ArcType::Abandoned, None, now).unwrap();
        let err = arc.transition(ArcType::Ongoing, None, now).unwrap_err();
        assert!(matches!(err, KayleyError::InvalidTransition { .. }));
        assert_eq!(arc.arc_type, ArcType::Abandoned);
    }

    #[test]
    fn test_self_transition_rejected() {
        let now = Utc::now();
        let mut arc = NarrativeArc::new("k", "t", now);
        assert!(arc.transition(ArcType::Ongoing, None, now).is_err());
    }
}
