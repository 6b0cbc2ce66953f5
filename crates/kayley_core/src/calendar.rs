//! Calendar boundary: event shape and the client trait.

use crate::Timestamp;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// Either a timed (`dateTime`) or an all-day (`date`) boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn timed(rfc3339: &str) -> Self {
        Self {
            date_time: Some(rfc3339.to_string()),
            ..Default::default()
        }
    }

    pub fn all_day(date: &str) -> Self {
        Self {
            date: Some(date.to_string()),
            ..Default::default()
        }
    }

    pub fn is_all_day(&self) -> bool {
        self.date_time.is_none() && self.date.is_some()
    }

    /// Resolve to an instant. All-day dates resolve to midnight UTC.
    pub fn at(&self) -> Option<Timestamp> {
        if let Some(dt) = &self.date_time {
            return DateTime::parse_from_rfc3339(dt).ok().map(|d| d.with_timezone(&Utc));
        }
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Events starting inside `[from, to)`, ordered by start.
    async fn list_events(&self, from: Timestamp, to: Timestamp) -> Result<Vec<CalendarEvent>>;
    /// `start`/`end` are RFC3339; `time_zone` is an IANA name.
    async fn create_event(&self, summary: &str, start: &str, end: &str, time_zone: &str) -> Result<CalendarEvent>;
    async fn delete_event(&self, event_id: &str) -> Result<()>;
}

/// Process-local calendar, used when no remote calendar is configured.
#[derive(Default)]
pub struct InMemoryCalendar {
    events: Mutex<Vec<CalendarEvent>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        Self {
            events: Mutex::new(events),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CalendarEvent>> {
        match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl CalendarClient for InMemoryCalendar {
    async fn list_events(&self, from: Timestamp, to: Timestamp) -> Result<Vec<CalendarEvent>> {
        let mut events: Vec<CalendarEvent> = self
            .lock()
            .iter()
            .filter(|e| e.start.at().is_some_and(|s| s >= from && s < to))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start.at());
        Ok(events)
    }

    async fn create_event(&self, summary: &str, start: &str, end: &str, time_zone: &str) -> Result<CalendarEvent> {
        let mut start = EventTime::timed(start);
        let mut end = EventTime::timed(end);
        if start.at().is_none() || end.at().is_none() {
            anyhow::bail!("Invalid RFC3339 event boundaries: {} / {:?}", summary, (start.date_time, end.date_time));
        }
        start.time_zone = Some(time_zone.to_string());
        end.time_zone = Some(time_zone.to_string());
        let event = CalendarEvent {
            id: Uuid::new_v4().to_string(),
            summary: summary.to_string(),
            start,
            end,
        };
        self.lock().push(event.clone());
        Ok(event)
    }

    async fn delete_event(&self, event_id: &str) -> Result<()> {
        let mut events = self.lock();
        let before = events.len();
        events.retain(|e| e.id != event_id);
        if events.len() == before {
            anyhow::bail!("No calendar event with id {}", event_id);
        }
        Ok(())
    }
}
