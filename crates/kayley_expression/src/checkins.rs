//! Calendar check-ins: short proactive nudges around the user's events.
//!
//! Each event gets at most one check-in of each kind. Which kinds were sent
//! is kept in the `calendar_checkins` flag as `event_id -> [kind]` so a
//! restart does not repeat them.

use crate::catchup::{ProactiveEvent, ScheduleHandle};
use crate::presence::{PresenceScheduler, PresenceTracker};
use anyhow::{Context, Result};
use chrono::{Duration, Local, Utc};
use kayley_core::{CalendarClient, CalendarEvent, Timestamp};
use kayley_memory::{CompanionStore, CALENDAR_CHECKINS_KEY};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckinKind {
    /// 12-24h before start
    DayBefore,
    /// 15 minutes to 2 hours before start
    Approaching,
    /// From 15 minutes before until 5 minutes after start
    Starting,
    /// 15 minutes to 3 hours after the end
    PostEvent,
}

impl CheckinKind {
    pub const ALL: [CheckinKind; 4] = [
        CheckinKind::DayBefore,
        CheckinKind::Approaching,
        CheckinKind::Starting,
        CheckinKind::PostEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckinKind::DayBefore => "day_before",
            CheckinKind::Approaching => "approaching",
            CheckinKind::Starting => "starting",
            CheckinKind::PostEvent => "post_event",
        }
    }

    fn window(&self, start: Timestamp, end: Timestamp) -> (Timestamp, Timestamp) {
        match self {
            CheckinKind::DayBefore => (start - Duration::hours(24), start - Duration::hours(12)),
            CheckinKind::Approaching => (start - Duration::hours(2), start - Duration::minutes(15)),
            CheckinKind::Starting => (start - Duration::minutes(15), start + Duration::minutes(5)),
            CheckinKind::PostEvent => (end + Duration::minutes(15), end + Duration::hours(3)),
        }
    }
}

/// The check-in whose window contains `now`, if any.
///
/// All-day events only get the day-before nudge; their midnight start would
/// make the other windows fire at odd hours.
pub fn due_checkin(event: &CalendarEvent, now: Timestamp) -> Option<CheckinKind> {
    let start = event.start.at()?;
    let end = event.end.at().unwrap_or(start);
    let kinds: &[CheckinKind] = if event.start.is_all_day() {
        &[CheckinKind::DayBefore]
    } else {
        &CheckinKind::ALL
    };
    kinds.iter().copied().find(|k| {
        let (from, to) = k.window(start, end);
        now >= from && now < to
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckinState(pub HashMap<String, Vec<CheckinKind>>);

impl CheckinState {
    pub fn has(&self, event_id: &str, kind: CheckinKind) -> bool {
        self.0.get(event_id).is_some_and(|kinds| kinds.contains(&kind))
    }

    pub fn record(&mut self, event_id: &str, kind: CheckinKind) {
        let kinds = self.0.entry(event_id.to_string()).or_default();
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    /// Forget events that are no longer on the calendar window.
    pub fn retain_events(&mut self, live_ids: &[&str]) {
        self.0.retain(|id, _| live_ids.contains(&id.as_str()));
    }
}

pub struct CalendarCheckins {
    calendar: Arc<dyn CalendarClient>,
    store: Arc<dyn CompanionStore>,
    presence: Arc<PresenceTracker>,
    hours: PresenceScheduler,
}

impl CalendarCheckins {
    pub fn new(
        calendar: Arc<dyn CalendarClient>,
        store: Arc<dyn CompanionStore>,
        presence: Arc<PresenceTracker>,
        hours: PresenceScheduler,
    ) -> Self {
        Self {
            calendar,
            store,
            presence,
            hours,
        }
    }

    pub async fn load_state(&self) -> Result<CheckinState> {
        let Some(raw) = self.store.get_flag(CALENDAR_CHECKINS_KEY).await? else {
            return Ok(CheckinState::default());
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!("Resetting malformed {} flag: {}", CALENDAR_CHECKINS_KEY, e);
                Ok(CheckinState::default())
            }
        }
    }

    async fn save_state(&self, state: &CheckinState) -> Result<()> {
        let raw = serde_json::to_string(state).context("Failed to serialize check-in state")?;
        self.store.set_flag(CALENDAR_CHECKINS_KEY, &raw).await
    }

    /// Check-ins due at `now`, recorded as sent before they are returned.
    pub async fn due(&self, now: Timestamp) -> Result<Vec<ProactiveEvent>> {
        let events = self
            .calendar
            .list_events(now - Duration::days(1), now + Duration::hours(25))
            .await
            .context("Failed to list calendar events")?;

        let mut state = self.load_state().await?;
        let before = state.clone();
        let mut out = Vec::new();
        for event in &events {
            let Some(kind) = due_checkin(event, now) else {
                continue;
            };
            if state.has(&event.id, kind) {
                continue;
            }
            state.record(&event.id, kind);
            out.push(ProactiveEvent::CalendarCheckin {
                event_id: event.id.clone(),
                summary: event.summary.clone(),
                kind,
            });
        }

        let live: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        state.retain_events(&live);
        if state != before {
            self.save_state(&state).await?;
        }
        Ok(out)
    }

    /// Whether a nudge may be delivered right now.
    async fn may_reach_out(&self, now: Timestamp) -> bool {
        if !self.hours.is_appropriate_at(now.with_timezone(&Local).naive_local()) {
            return false;
        }
        match self.presence.is_available(now).await {
            Ok(available) => available,
            Err(e) => {
                tracing::warn!("Presence lookup failed: {:#}", e);
                true
            }
        }
    }

    /// Poll every `interval` until cancelled.
    pub fn spawn(self: Arc<Self>, interval: std::time::Duration, tx: mpsc::Sender<ProactiveEvent>) -> ScheduleHandle {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = cancel_rx.changed() => {
                        tracing::debug!("Calendar check-in poller cancelled");
                        return;
                    }
                }
                let now = Utc::now();
                if !self.may_reach_out(now).await {
                    continue;
                }
                let events = match self.due(now).await {
                    Ok(events) => events,
                    Err(e) => {
                        tracing::warn!("Calendar check-in poll failed: {:#}", e);
                        continue;
                    }
                };
                for event in events {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });
        ScheduleHandle::new(cancel_tx, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kayley_core::calendar::InMemoryCalendar;
    use kayley_core::EventTime;
    use kayley_memory::SqliteStore;

    fn timed(id: &str, start: Timestamp, minutes: i64) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            summary: format!("event {}", id),
            start: EventTime::timed(&start.to_rfc3339()),
            end: EventTime::timed(&(start + Duration::minutes(minutes)).to_rfc3339()),
        }
    }

    #[test]
    fn test_windows() {
        let start = Utc::now();
        let e = timed("e", start, 60);
        assert_eq!(due_checkin(&e, start - Duration::hours(30)), None);
        assert_eq!(due_checkin(&e, start - Duration::hours(18)), Some(CheckinKind::DayBefore));
        assert_eq!(due_checkin(&e, start - Duration::hours(6)), None);
        assert_eq!(due_checkin(&e, start - Duration::hours(1)), Some(CheckinKind::Approaching));
        assert_eq!(due_checkin(&e, start - Duration::minutes(5)), Some(CheckinKind::Starting));
        assert_eq!(due_checkin(&e, start + Duration::minutes(30)), None);
        assert_eq!(due_checkin(&e, start + Duration::minutes(90)), Some(CheckinKind::PostEvent));
        assert_eq!(due_checkin(&e, start + Duration::hours(5)), None);
    }

    #[test]
    fn test_all_day_only_day_before() {
        let e = CalendarEvent {
            id: "d".into(),
            summary: "Birthday".into(),
            start: EventTime::all_day("2025-06-03"),
            end: EventTime::all_day("2025-06-04"),
        };
        let midnight = e.start.at().unwrap();
        assert_eq!(due_checkin(&e, midnight - Duration::hours(18)), Some(CheckinKind::DayBefore));
        assert_eq!(due_checkin(&e, midnight - Duration::minutes(5)), None);
        assert_eq!(due_checkin(&e, midnight + Duration::hours(25)), None);
    }

    #[test]
    fn test_state_wire_format() {
        let mut state = CheckinState::default();
        state.record("e1", CheckinKind::DayBefore);
        state.record("e1", CheckinKind::DayBefore);
        assert_eq!(serde_json::to_string(&state).unwrap(), r#"{"e1":["day_before"]}"#);
    }

    #[tokio::test]
    async fn test_each_checkin_sent_once() {
        let now = Utc::now();
        let calendar = Arc::new(InMemoryCalendar::with_events(vec![timed("e1", now + Duration::hours(1), 30)]));
        let store: Arc<dyn CompanionStore> = Arc::new(SqliteStore::new(":memory:").await.unwrap());
        let presence = Arc::new(PresenceTracker::new(store.clone()));
        let checkins = CalendarCheckins::new(calendar, store, presence, PresenceScheduler::new());

        let first = checkins.due(now).await.unwrap();
        assert_eq!(
            first,
            vec![ProactiveEvent::CalendarCheckin {
                event_id: "e1".into(),
                summary: "event e1".into(),
                kind: CheckinKind::Approaching,
            }]
        );
        assert!(checkins.due(now + Duration::minutes(5)).await.unwrap().is_empty());
        assert!(checkins.load_state().await.unwrap().has("e1", CheckinKind::Approaching));

        // Next window for the same event still fires
        let starting = checkins.due(now + Duration::minutes(55)).await.unwrap();
        assert_eq!(starting.len(), 1);
    }
}
