use crate::{StoredEnum, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeEventCategory {
    Personal,
    Family,
    Career,
    Creative,
    Social,
}

impl StoredEnum for LifeEventCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LifeEventCategory::Personal => "personal",
            LifeEventCategory::Family => "family",
            LifeEventCategory::Career => "career",
            LifeEventCategory::Creative => "creative",
            LifeEventCategory::Social => "social",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "personal" => Some(LifeEventCategory::Personal),
            "family" => Some(LifeEventCategory::Family),
            "career" => Some(LifeEventCategory::Career),
            "creative" => Some(LifeEventCategory::Creative),
            "social" => Some(LifeEventCategory::Social),
            _ => None,
        }
    }
}

/// Something that happened in Kayley's own life.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifeEvent {
    pub id: Uuid,
    pub description: String,
    pub category: LifeEventCategory,
    pub intensity: f32,
    pub created_at: Timestamp,
}

impl LifeEvent {
    pub fn new(description: &str, category: LifeEventCategory, intensity: f32, now: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.to_string(),
            category,
            intensity: intensity.clamp(0.0, 1.0),
            created_at: now,
        }
    }
}
