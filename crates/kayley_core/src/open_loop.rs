//! Open loops: things the user mentioned that deserve a follow-up.

use crate::{StoredEnum, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopType {
    /// "I have an interview tomorrow"
    PendingEvent,
    /// "I've been feeling really low"
    EmotionalFollowup,
    /// "I'm going to start running again"
    CommitmentCheck,
    /// A topic left hanging mid-conversation
    CuriosityThread,
}

impl StoredEnum for LoopType {
    fn as_str(&self) -> &'static str {
        match self {
            LoopType::PendingEvent => "pending_event",
            LoopType::EmotionalFollowup => "emotional_followup",
            LoopType::CommitmentCheck => "commitment_check",
            LoopType::CuriosityThread => "curiosity_thread",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_event" => Some(LoopType::PendingEvent),
            "emotional_followup" => Some(LoopType::EmotionalFollowup),
            "commitment_check" => Some(LoopType::CommitmentCheck),
            "curiosity_thread" => Some(LoopType::CuriosityThread),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Active,
    Surfaced,
    Resolved,
    Expired,
}

impl StoredEnum for LoopStatus {
    fn as_str(&self) -> &'static str {
        match self {
            LoopStatus::Active => "active",
            LoopStatus::Surfaced => "surfaced",
            LoopStatus::Resolved => "resolved",
            LoopStatus::Expired => "expired",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(LoopStatus::Active),
            "surfaced" => Some(LoopStatus::Surfaced),
            "resolved" => Some(LoopStatus::Resolved),
            "expired" => Some(LoopStatus::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenLoop {
    pub id: Uuid,
    pub topic: String,
    pub loop_type: LoopType,
    pub trigger_context: String,
    /// 0.0 - 1.0
    pub salience: f32,
    /// Do not bring it up before this time (e.g. after the interview).
    pub surface_after: Option<Timestamp>,
    pub surface_count: u32,
    pub max_surfaces: u32,
    pub status: LoopStatus,
    pub created_at: Timestamp,
    pub last_surfaced_at: Option<Timestamp>,
}

impl OpenLoop {
    pub fn new(topic: &str, loop_type: LoopType, trigger_context: &str, salience: f32, now: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            loop_type,
            trigger_context: trigger_context.to_string(),
            salience: salience.clamp(0.0, 1.0),
            surface_after: None,
            surface_count: 0,
            max_surfaces: 2,
            status: LoopStatus::Active,
            created_at: now,
            last_surfaced_at: None,
        }
    }

    pub fn with_surface_after(mut self, at: Timestamp) -> Self {
        self.surface_after = Some(at);
        self
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, LoopStatus::Active | LoopStatus::Surfaced)
    }
}
