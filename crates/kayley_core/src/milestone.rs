//! One-time relationship milestones used for later callbacks.

use crate::{StoredEnum, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneType {
    FirstVulnerability,
    FirstJoke,
    FirstSupport,
    FirstDeepTalk,
    FirstReturn,
    BreakthroughMoment,
    AnniversaryWeek,
    AnniversaryMonth,
}

impl MilestoneType {
    pub const ALL: [MilestoneType; 8] = [
        MilestoneType::FirstVulnerability,
        MilestoneType::FirstJoke,
        MilestoneType::FirstSupport,
        MilestoneType::FirstDeepTalk,
        MilestoneType::FirstReturn,
        MilestoneType::BreakthroughMoment,
        MilestoneType::AnniversaryWeek,
        MilestoneType::AnniversaryMonth,
    ];

    /// Anniversaries may be recorded more than once; everything else is unique.
    pub fn is_anniversary(&self) -> bool {
        matches!(self, MilestoneType::AnniversaryWeek | MilestoneType::AnniversaryMonth)
    }

    /// Callback priority, lower wins.
    pub fn priority(&self) -> u8 {
        match self {
            MilestoneType::BreakthroughMoment => 0,
            MilestoneType::FirstVulnerability => 1,
            MilestoneType::FirstSupport => 2,
            MilestoneType::FirstDeepTalk => 3,
            MilestoneType::FirstReturn => 4,
            MilestoneType::FirstJoke => 5,
            MilestoneType::AnniversaryMonth => 6,
            MilestoneType::AnniversaryWeek => 7,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            MilestoneType::FirstVulnerability => "the first time they opened up about something hard",
            MilestoneType::FirstJoke => "the first joke you two shared",
            MilestoneType::FirstSupport => "the first time they leaned on you for support",
            MilestoneType::FirstDeepTalk => "your first really deep conversation",
            MilestoneType::FirstReturn => "when they came back after some time away",
            MilestoneType::BreakthroughMoment => "a breakthrough moment between you",
            MilestoneType::AnniversaryWeek => "one week of talking",
            MilestoneType::AnniversaryMonth => "one month of talking",
        }
    }
}

impl StoredEnum for MilestoneType {
    fn as_str(&self) -> &'static str {
        match self {
            MilestoneType::FirstVulnerability => "first_vulnerability",
            MilestoneType::FirstJoke => "first_joke",
            MilestoneType::FirstSupport => "first_support",
            MilestoneType::FirstDeepTalk => "first_deep_talk",
            MilestoneType::FirstReturn => "first_return",
            MilestoneType::BreakthroughMoment => "breakthrough_moment",
            MilestoneType::AnniversaryWeek => "anniversary_week",
            MilestoneType::AnniversaryMonth => "anniversary_month",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipMilestone {
    pub id: Uuid,
    pub user_id: String,
    pub milestone_type: MilestoneType,
    pub description: String,
    pub trigger_context: String,
    pub occurred_at: Timestamp,
    pub reference_count: u32,
    pub last_referenced_at: Option<Timestamp>,
}

impl RelationshipMilestone {
    pub fn new(
        user_id: &str,
        milestone_type: MilestoneType,
        description: &str,
        trigger_context: &str,
        now: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            milestone_type,
            description: description.to_string(),
            trigger_context: trigger_context.to_string(),
            occurred_at: now,
            reference_count: 0,
            last_referenced_at: None,
        }
    }
}
