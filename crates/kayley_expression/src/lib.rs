//! Surfacing and proactive behaviour.
//!
//! Selection picks at most one stored item per turn; the schedulers decide
//! when Kayley may reach out on her own (daily catch-up, calendar check-ins),
//! gated by the user's presence and the configured active hours.

mod briefing;
mod catchup;
mod checkins;
mod planner;
mod presence;
pub mod selection;

pub use briefing::BriefingTracker;
pub use catchup::{next_fire_after, should_fire_catchup, ActivityClock, DailyCatchupScheduler, ProactiveEvent, ScheduleHandle};
pub use checkins::{due_checkin, CalendarCheckins, CheckinKind, CheckinState};
pub use planner::{choose_item, GreetingContent, SurfacedItem, SurfacingCandidates, SurfacingPlanner, OPEN_LOOP_PRIORITY_SALIENCE};
pub use presence::{detect_presence, AwayReason, PresenceScheduler, PresenceSignal, PresenceState, PresenceTracker, USER_PRESENCE_KEY};
pub use selection::{select_milestone, select_open_loop, select_pattern, select_proactive_thread, select_weighted_thread};
