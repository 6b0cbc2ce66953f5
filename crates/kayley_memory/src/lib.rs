//! # Kayley Memory
//!
//! Persistence and state tracking: the [`CompanionStore`] boundary with its
//! SQLite implementation, the explicit [`ThreadCache`], and one tracker per
//! trackable entity.

pub mod arcs;
pub mod cache;
pub mod milestones;
pub mod open_loops;
pub mod patterns;
pub mod sqlite;
pub mod store;
pub mod threads;

pub use arcs::NarrativeArcService;
pub use cache::{ThreadCache, ThreadSnapshot};
pub use milestones::{detect_milestones, MilestoneTracker};
pub use open_loops::{detect_open_loops, LoopCandidate, OpenLoopTracker};
pub use patterns::{detect_patterns, PatternObservation, PatternTracker};
pub use sqlite::SqliteStore;
pub use store::{CompanionStore, BRIEFED_ON_KEY, CALENDAR_CHECKINS_KEY};
pub use threads::ThreadManager;

#[cfg(test)]
mod tests;
