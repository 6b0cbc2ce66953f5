//! # Kayley Core
//!
//! Data model and pure rules for the companion state engine:
//! relationship tiers, mood, the trackable entities (threads, patterns,
//! milestones, narrative arcs, open loops, life events) and the
//! decay/eligibility functions that decide what may be surfaced.
//!
//! The calendar and task boundaries are declared here as traits; apart from
//! their in-memory implementations, nothing in this crate performs I/O
//! except [`Character::load`] and [`KayleyConfig::load`].

pub mod calendar;
pub mod character;
pub mod config;
pub mod dynamics;
pub mod error;
pub mod history;
pub mod life_event;
pub mod milestone;
pub mod mood;
pub mod narrative;
pub mod open_loop;
pub mod pattern;
pub mod relationship;
pub mod sentiment;
pub mod tasks;
pub mod thread;

pub use calendar::{CalendarClient, CalendarEvent, EventTime};
pub use character::Character;
pub use config::KayleyConfig;
pub use error::{KayleyError, ProviderError};
pub use history::{ChatRole, ChatTurn, Fact};
pub use life_event::{LifeEvent, LifeEventCategory};
pub use milestone::{MilestoneType, RelationshipMilestone};
pub use mood::{MoodLabel, MoodState};
pub use narrative::{ArcEvent, ArcType, NarrativeArc};
pub use open_loop::{LoopStatus, LoopType, OpenLoop};
pub use pattern::{PatternType, UserPattern};
pub use relationship::{FamiliarityStage, RelationshipMetrics, RelationshipTier};
pub use tasks::{Task, TaskClient, TaskPriority};
pub use thread::{OngoingThread, ThreadTheme};

/// Shorthand for the UTC timestamps used across every entity.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Entry point for the enum `as_str`/`parse` pairs used by the store layer.
///
/// Implemented by every closed enum that is persisted as a text column.
pub trait StoredEnum: Sized + Copy {
    fn as_str(&self) -> &'static str;
    fn parse(s: &str) -> Option<Self>;
}
