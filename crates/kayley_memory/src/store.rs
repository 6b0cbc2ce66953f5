use anyhow::Result;
use async_trait::async_trait;
use kayley_core::{
    ArcType, ChatTurn, Fact, LifeEvent, MilestoneType, MoodState, NarrativeArc, OngoingThread, OpenLoop,
    PatternType, RelationshipMetrics, RelationshipMilestone, UserPattern,
};

/// Key of the "already briefed today" flag.
pub const BRIEFED_ON_KEY: &str = "briefed_on";
/// Key of the calendar check-in map (`event_id -> [checkin types]`).
pub const CALENDAR_CHECKINS_KEY: &str = "calendar_checkins";

/// Persistence boundary for all companion state.
///
/// Rows are keyed by their natural keys; facts and patterns upsert on
/// conflict, everything else is plain insert/update.
#[async_trait]
pub trait CompanionStore: Send + Sync {
    // --- threads ---
    async fn load_threads(&self) -> Result<Vec<OngoingThread>>;
    /// Replace the whole active thread set.
    async fn save_threads(&self, threads: &[OngoingThread]) -> Result<()>;

    // --- patterns ---
    async fn find_pattern(&self, pattern_type: PatternType, observation: &str) -> Result<Option<UserPattern>>;
    async fn upsert_pattern(&self, pattern: &UserPattern) -> Result<()>;
    async fn list_patterns(&self) -> Result<Vec<UserPattern>>;

    // --- milestones ---
    /// Insert a milestone. Returns `false` when a non-anniversary milestone of
    /// the same type already exists for the user.
    async fn insert_milestone(&self, milestone: &RelationshipMilestone) -> Result<bool>;
    async fn find_milestone(&self, user_id: &str, milestone_type: MilestoneType) -> Result<Option<RelationshipMilestone>>;
    async fn list_milestones(&self, user_id: &str) -> Result<Vec<RelationshipMilestone>>;
    async fn update_milestone(&self, milestone: &RelationshipMilestone) -> Result<()>;

    // --- narrative arcs ---
    async fn get_arc(&self, arc_key: &str) -> Result<Option<NarrativeArc>>;
    async fn save_arc(&self, arc: &NarrativeArc) -> Result<()>;
    async fn list_arcs(&self, arc_type: Option<ArcType>) -> Result<Vec<NarrativeArc>>;

    // --- life events ---
    async fn insert_life_event(&self, event: &LifeEvent) -> Result<()>;
    /// Most recent first.
    async fn recent_life_events(&self, limit: usize) -> Result<Vec<LifeEvent>>;

    // --- open loops ---
    async fn insert_open_loop(&self, open_loop: &OpenLoop) -> Result<()>;
    async fn update_open_loop(&self, open_loop: &OpenLoop) -> Result<()>;
    /// Loops whose status is active or surfaced.
    async fn list_open_loops(&self) -> Result<Vec<OpenLoop>>;

    // --- conversation history ---
    async fn append_turn(&self, turn: &ChatTurn) -> Result<()>;
    /// The last `limit` turns in chronological order.
    async fn recent_turns(&self, limit: usize) -> Result<Vec<ChatTurn>>;

    // --- facts ---
    async fn upsert_user_fact(&self, category: &str, fact_key: &str, fact_value: &str) -> Result<()>;
    async fn user_facts(&self) -> Result<Vec<Fact>>;
    async fn upsert_character_fact(
        &self,
        character_id: &str,
        category: &str,
        fact_key: &str,
        fact_value: &str,
    ) -> Result<()>;
    async fn character_facts(&self, character_id: &str) -> Result<Vec<Fact>>;

    // --- singleton state rows ---
    async fn load_mood(&self) -> Result<Option<MoodState>>;
    async fn save_mood(&self, mood: &MoodState) -> Result<()>;
    async fn load_relationship(&self) -> Result<Option<RelationshipMetrics>>;
    async fn save_relationship(&self, metrics: &RelationshipMetrics) -> Result<()>;

    // --- local key-value flags ---
    async fn get_flag(&self, key: &str) -> Result<Option<String>>;
    async fn set_flag(&self, key: &str, value: &str) -> Result<()>;
}
