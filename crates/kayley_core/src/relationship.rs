//! Relationship metrics and the tier ladder that drives tone rules.
//!
//! Scores are supplied by an external collaborator; this module only derives
//! the coarse tier and familiarity stage from them.

use crate::StoredEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipTier {
    Adversarial,
    Rival,
    Neutral,
    Acquaintance,
    Friend,
    CloseFriend,
    DeeplyLoving,
}

impl RelationshipTier {
    pub const ALL: [RelationshipTier; 7] = [
        RelationshipTier::Adversarial,
        RelationshipTier::Rival,
        RelationshipTier::Neutral,
        RelationshipTier::Acquaintance,
        RelationshipTier::Friend,
        RelationshipTier::CloseFriend,
        RelationshipTier::DeeplyLoving,
    ];

    /// Map a relationship score in [-100, 100] onto the tier ladder.
    pub fn from_score(score: f32) -> Self {
        if !score.is_finite() {
            return RelationshipTier::Neutral;
        }
        if score < -50.0 {
            RelationshipTier::Adversarial
        } else if score < -10.0 {
            RelationshipTier::Rival
        } else if score < 10.0 {
            RelationshipTier::Neutral
        } else if score < 25.0 {
            RelationshipTier::Acquaintance
        } else if score < 50.0 {
            RelationshipTier::Friend
        } else if score < 75.0 {
            RelationshipTier::CloseFriend
        } else {
            RelationshipTier::DeeplyLoving
        }
    }

    pub fn is_hostile(&self) -> bool {
        matches!(self, RelationshipTier::Adversarial | RelationshipTier::Rival)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RelationshipTier::Adversarial => "adversarial",
            RelationshipTier::Rival => "rival",
            RelationshipTier::Neutral => "neutral",
            RelationshipTier::Acquaintance => "acquaintance",
            RelationshipTier::Friend => "friend",
            RelationshipTier::CloseFriend => "close friend",
            RelationshipTier::DeeplyLoving => "deeply loving",
        }
    }
}

impl StoredEnum for RelationshipTier {
    fn as_str(&self) -> &'static str {
        match self {
            RelationshipTier::Adversarial => "adversarial",
            RelationshipTier::Rival => "rival",
            RelationshipTier::Neutral => "neutral",
            RelationshipTier::Acquaintance => "acquaintance",
            RelationshipTier::Friend => "friend",
            RelationshipTier::CloseFriend => "close_friend",
            RelationshipTier::DeeplyLoving => "deeply_loving",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamiliarityStage {
    Early,
    Developing,
    Established,
}

impl FamiliarityStage {
    pub fn from_interactions(total_interactions: u32) -> Self {
        if total_interactions < 5 {
            FamiliarityStage::Early
        } else if total_interactions < 25 {
            FamiliarityStage::Developing
        } else {
            FamiliarityStage::Established
        }
    }
}

/// Aggregate relationship scores plus the derived classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipMetrics {
    pub warmth: f32,
    pub trust: f32,
    pub playfulness: f32,
    pub stability: f32,
    pub relationship_score: f32,
    pub total_interactions: u32,
    pub tier: RelationshipTier,
    pub familiarity: FamiliarityStage,
    pub is_ruptured: bool,
}

impl Default for RelationshipMetrics {
    fn default() -> Self {
        Self::from_scores(0.0, 0.0, 0.0, 0.0, 0.0, 0)
    }
}

impl RelationshipMetrics {
    /// Build metrics from raw scores, deriving tier and familiarity.
    pub fn from_scores(
        warmth: f32,
        trust: f32,
        playfulness: f32,
        stability: f32,
        relationship_score: f32,
        total_interactions: u32,
    ) -> Self {
        let clamp_dim = |v: f32| if v.is_finite() { v.clamp(-50.0, 50.0) } else { 0.0 };
        let score = if relationship_score.is_finite() {
            relationship_score.clamp(-100.0, 100.0)
        } else {
            0.0
        };
        Self {
            warmth: clamp_dim(warmth),
            trust: clamp_dim(trust),
            playfulness: clamp_dim(playfulness),
            stability: clamp_dim(stability),
            relationship_score: score,
            total_interactions,
            tier: RelationshipTier::from_score(score),
            familiarity: FamiliarityStage::from_interactions(total_interactions),
            is_ruptured: false,
        }
    }

    pub fn with_rupture(mut self, ruptured: bool) -> Self {
        self.is_ruptured = ruptured;
        self
    }

    /// Record one more interaction, keeping familiarity in sync.
    pub fn record_interaction(&mut self) {
        self.total_interactions = self.total_interactions.saturating_add(1);
        self.familiarity = FamiliarityStage::from_interactions(self.total_interactions);
    }
}
