//! Ongoing threads: what Kayley is "currently thinking about".

use crate::{StoredEnum, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadTheme {
    CreativeProject,
    Family,
    SelfImprovement,
    Social,
    Work,
    Existential,
    UserReflection,
    CurrentEvent,
}

impl ThreadTheme {
    pub const ALL: [ThreadTheme; 8] = [
        ThreadTheme::CreativeProject,
        ThreadTheme::Family,
        ThreadTheme::SelfImprovement,
        ThreadTheme::Social,
        ThreadTheme::Work,
        ThreadTheme::Existential,
        ThreadTheme::UserReflection,
        ThreadTheme::CurrentEvent,
    ];

    /// Themes the autonomous generator may pick from.
    pub const AUTONOMOUS: [ThreadTheme; 6] = [
        ThreadTheme::CreativeProject,
        ThreadTheme::Family,
        ThreadTheme::SelfImprovement,
        ThreadTheme::Social,
        ThreadTheme::Work,
        ThreadTheme::Existential,
    ];
}

impl StoredEnum for ThreadTheme {
    fn as_str(&self) -> &'static str {
        match self {
            ThreadTheme::CreativeProject => "creative_project",
            ThreadTheme::Family => "family",
            ThreadTheme::SelfImprovement => "self_improvement",
            ThreadTheme::Social => "social",
            ThreadTheme::Work => "work",
            ThreadTheme::Existential => "existential",
            ThreadTheme::UserReflection => "user_reflection",
            ThreadTheme::CurrentEvent => "current_event",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OngoingThread {
    pub id: Uuid,
    pub theme: ThreadTheme,
    /// Free-text description of where the thought currently stands.
    pub current_state: String,
    /// 0.0 - 1.0
    pub intensity: f32,
    pub created_at: Timestamp,
    /// Reference point for time-based decay; advanced whenever intensity is
    /// recomputed so decay never double-counts the same hours.
    pub last_updated: Timestamp,
    /// When the thread was last brought up in conversation.
    pub last_mentioned: Option<Timestamp>,
    pub user_related: bool,
    /// The user message that spawned a reflection thread.
    pub user_trigger: Option<String>,
}

impl OngoingThread {
    pub fn new(theme: ThreadTheme, current_state: &str, intensity: f32, now: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            theme,
            current_state: current_state.to_string(),
            intensity: intensity.clamp(0.0, 1.0),
            created_at: now,
            last_updated: now,
            last_mentioned: None,
            user_related: false,
            user_trigger: None,
        }
    }

    /// A thread spawned by something the user said.
    pub fn user_reflection(trigger: &str, current_state: &str, intensity: f32, now: Timestamp) -> Self {
        Self {
            user_related: true,
            user_trigger: Some(trigger.to_string()),
            ..Self::new(ThreadTheme::UserReflection, current_state, intensity, now)
        }
    }
}
