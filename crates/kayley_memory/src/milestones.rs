//! Relationship milestone detection and recording.
//!
//! Non-anniversary milestones are recorded at most once per user. The store
//! enforces this with a unique index, so two detection paths firing in the
//! same turn still produce one row.

use crate::store::CompanionStore;
use anyhow::Result;
use kayley_core::{MilestoneType, RelationshipMilestone, Timestamp};
use regex::Regex;
use std::sync::{Arc, LazyLock};

static VULNERABILITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(never told anyone|hard for me to say|i('m| am) (really )?(scared|struggling)|i feel so alone|i('ve| have) been (really )?(depressed|anxious))\b").unwrap()
});

static JOKE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(lol|lmao|haha+|rofl)\b|😂|🤣").unwrap());

static SUPPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(i need (some )?(advice|help)|can you help me|i need someone to talk to|what should i do)\b").unwrap()
});

static DEEP_TALK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(meaning of life|what happens when we die|do you ever wonder|purpose in life|what really matters)\b").unwrap()
});

static BREAKTHROUGH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(you really get me|thank you for listening|that (really )?helped( so much)?|i feel so much better)\b").unwrap()
});

/// Messages at least this long count as a deep talk on their own.
const DEEP_TALK_MIN_CHARS: usize = 280;
/// Silence after which a message counts as a return.
const RETURN_GAP_DAYS: i64 = 3;

/// Milestone types suggested by one message, in priority order.
///
/// `days_since_last` is the idle gap before this message, `days_since_first`
/// is the age of the relationship in whole days.
pub fn detect_milestones(message: &str, days_since_last: Option<i64>, days_since_first: Option<i64>) -> Vec<MilestoneType> {
    let mut found = Vec::new();
    if BREAKTHROUGH_RE.is_match(message) {
        found.push(MilestoneType::BreakthroughMoment);
    }
    if VULNERABILITY_RE.is_match(message) {
        found.push(MilestoneType::FirstVulnerability);
    }
    if SUPPORT_RE.is_match(message) {
        found.push(MilestoneType::FirstSupport);
    }
    if DEEP_TALK_RE.is_match(message) || message.chars().count() >= DEEP_TALK_MIN_CHARS {
        found.push(MilestoneType::FirstDeepTalk);
    }
    if days_since_last.is_some_and(|d| d >= RETURN_GAP_DAYS) {
        found.push(MilestoneType::FirstReturn);
    }
    if JOKE_RE.is_match(message) {
        found.push(MilestoneType::FirstJoke);
    }
    match days_since_first {
        Some(30) => found.push(MilestoneType::AnniversaryMonth),
        Some(7) => found.push(MilestoneType::AnniversaryWeek),
        _ => {}
    }
    found
}

pub struct MilestoneTracker {
    store: Arc<dyn CompanionStore>,
    user_id: String,
}

impl MilestoneTracker {
    pub fn new(store: Arc<dyn CompanionStore>, user_id: &str) -> Self {
        Self {
            store,
            user_id: user_id.to_string(),
        }
    }

    /// Record a milestone. Returns `None` if it already existed.
    ///
    /// Anniversaries are deduplicated per calendar day instead of per type.
    pub async fn record(
        &self,
        milestone_type: MilestoneType,
        trigger_context: &str,
        now: Timestamp,
    ) -> Result<Option<RelationshipMilestone>> {
        if milestone_type.is_anniversary() {
            let existing = self.store.list_milestones(&self.user_id).await?;
            if existing
                .iter()
                .any(|m| m.milestone_type == milestone_type && m.occurred_at.date_naive() == now.date_naive())
            {
                return Ok(None);
            }
        }

        let milestone = RelationshipMilestone::new(
            &self.user_id,
            milestone_type,
            milestone_type.describe(),
            trigger_context,
            now,
        );
        if self.store.insert_milestone(&milestone).await? {
            tracing::info!("Milestone reached: {:?}", milestone_type);
            Ok(Some(milestone))
        } else {
            tracing::debug!("Milestone {:?} already recorded", milestone_type);
            Ok(None)
        }
    }

    /// Detect milestones in a message and record the new ones.
    pub async fn analyze_message(
        &self,
        message: &str,
        days_since_last: Option<i64>,
        days_since_first: Option<i64>,
        now: Timestamp,
    ) -> Result<Vec<RelationshipMilestone>> {
        let mut recorded = Vec::new();
        for milestone_type in detect_milestones(message, days_since_last, days_since_first) {
            if let Some(m) = self.record(milestone_type, message, now).await? {
                recorded.push(m);
            }
        }
        Ok(recorded)
    }

    pub async fn list(&self) -> Result<Vec<RelationshipMilestone>> {
        self.store.list_milestones(&self.user_id).await
    }

    pub async fn mark_referenced(&self, milestone: &RelationshipMilestone, now: Timestamp) -> Result<RelationshipMilestone> {
        let mut updated = milestone.clone();
        updated.reference_count = updated.reference_count.saturating_add(1);
        updated.last_referenced_at = Some(now);
        self.store.update_milestone(&updated).await?;
        Ok(updated)
    }
}
