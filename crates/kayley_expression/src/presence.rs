//! Presence: when Kayley may reach out unprompted.
//!
//! Two gates. The configured active hours (and days), and what the user last
//! told us about their availability ("going to bed", "brb", "I'm back").

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Weekday};
use kayley_core::config::ScheduleConfig;
use kayley_core::Timestamp;
use kayley_memory::CompanionStore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

/// Flag key holding the serialized [`PresenceState`].
pub const USER_PRESENCE_KEY: &str = "user_presence";

static RETURN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(i'?m back|back now|just woke up|good morning)\b").unwrap());
static SLEEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(going to (bed|sleep)|heading to bed|off to bed|time for bed|good ?night)\b").unwrap()
});
static BRB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(brb|be right back|one sec|give me a (sec|minute))\b").unwrap());
static WORK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((heading|going|off) to (work|class|school)|at work now|in a meeting)\b").unwrap()
});
static BUSY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(gotta go|got to go|have to go|talk (to you )?later|ttyl|catch you later)\b").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwayReason {
    Sleeping,
    Working,
    Busy,
    BeRightBack,
}

impl AwayReason {
    /// How long the user is assumed unavailable if they never say they're back.
    pub fn expected_duration(&self) -> Duration {
        match self {
            AwayReason::Sleeping => Duration::hours(8),
            AwayReason::Working => Duration::hours(8),
            AwayReason::Busy => Duration::hours(3),
            AwayReason::BeRightBack => Duration::minutes(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceSignal {
    Away(AwayReason),
    Returned,
}

/// Classify a message as an availability statement, if it is one.
pub fn detect_presence(message: &str) -> Option<PresenceSignal> {
    if RETURN_RE.is_match(message) {
        return Some(PresenceSignal::Returned);
    }
    let reason = if SLEEP_RE.is_match(message) {
        AwayReason::Sleeping
    } else if BRB_RE.is_match(message) {
        AwayReason::BeRightBack
    } else if WORK_RE.is_match(message) {
        AwayReason::Working
    } else if BUSY_RE.is_match(message) {
        AwayReason::Busy
    } else {
        return None;
    };
    Some(PresenceSignal::Away(reason))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceState {
    pub reason: AwayReason,
    pub since: Timestamp,
    pub until: Timestamp,
}

/// Persists the last availability statement in the flag table.
pub struct PresenceTracker {
    store: Arc<dyn CompanionStore>,
}

impl PresenceTracker {
    pub fn new(store: Arc<dyn CompanionStore>) -> Self {
        Self { store }
    }

    pub async fn observe(&self, message: &str, now: Timestamp) -> Result<Option<PresenceSignal>> {
        let Some(signal) = detect_presence(message) else {
            return Ok(None);
        };
        let value = match signal {
            PresenceSignal::Returned => String::new(),
            PresenceSignal::Away(reason) => {
                let state = PresenceState {
                    reason,
                    since: now,
                    until: now + reason.expected_duration(),
                };
                serde_json::to_string(&state).context("Failed to serialize presence state")?
            }
        };
        self.store.set_flag(USER_PRESENCE_KEY, &value).await?;
        tracing::debug!("Presence updated: {:?}", signal);
        Ok(Some(signal))
    }

    /// Current away state, if any is still in effect.
    pub async fn away(&self, now: Timestamp) -> Result<Option<PresenceState>> {
        let Some(raw) = self.store.get_flag(USER_PRESENCE_KEY).await? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<PresenceState>(&raw) {
            Ok(state) if state.until > now => Ok(Some(state)),
            Ok(_) => Ok(None),
            Err(e) => {
                tracing::warn!("Ignoring malformed presence flag: {}", e);
                Ok(None)
            }
        }
    }

    pub async fn is_available(&self, now: Timestamp) -> Result<bool> {
        Ok(self.away(now).await?.is_none())
    }
}

/// Presence scheduler that filters proactive messages by local time
pub struct PresenceScheduler {
    pub active_start: NaiveTime,
    pub active_end: NaiveTime,
    pub active_days: Vec<Weekday>,
}

impl PresenceScheduler {
    /// Default scheduler (8:00-23:00, all days)
    pub fn new() -> Self {
        Self::with_hours(8, 23)
    }

    pub fn with_hours(start_hour: u32, end_hour: u32) -> Self {
        Self {
            active_start: hour_of_day(start_hour),
            active_end: hour_of_day(end_hour),
            active_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ],
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::with_hours(config.active_start_hour, config.active_end_hour)
    }

    pub fn is_appropriate_at(&self, local: NaiveDateTime) -> bool {
        if !self.active_days.contains(&local.weekday()) {
            return false;
        }
        let t = local.time();
        // Overnight ranges like 22:00-06:00 wrap midnight
        if self.active_start <= self.active_end {
            t >= self.active_start && t <= self.active_end
        } else {
            t >= self.active_start || t <= self.active_end
        }
    }
}

impl Default for PresenceScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn hour_of_day(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour % 24, 0, 0).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use kayley_memory::SqliteStore;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        // 2025-06-02 is a Monday
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_default_scheduler_creation() {
        let scheduler = PresenceScheduler::default();
        assert_eq!(scheduler.active_start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert_eq!(scheduler.active_end, NaiveTime::from_hms_opt(23, 0, 0).unwrap());
        assert_eq!(scheduler.active_days.len(), 7);
    }

    #[test]
    fn test_active_hours() {
        let s = PresenceScheduler::with_hours(9, 21);
        assert!(!s.is_appropriate_at(at(8, 59)));
        assert!(s.is_appropriate_at(at(9, 0)));
        assert!(!s.is_appropriate_at(at(21, 30)));
    }

    #[test]
    fn test_overnight_range() {
        let s = PresenceScheduler::with_hours(22, 6);
        assert!(s.is_appropriate_at(at(23, 0)));
        assert!(s.is_appropriate_at(at(3, 0)));
        assert!(!s.is_appropriate_at(at(12, 0)));
    }

    #[test]
    fn test_inactive_day() {
        let mut s = PresenceScheduler::new();
        s.active_days.retain(|d| *d != Weekday::Mon);
        assert!(!s.is_appropriate_at(at(12, 0)));
    }

    #[test]
    fn test_detect_presence() {
        assert_eq!(detect_presence("ok going to bed, night!"), Some(PresenceSignal::Away(AwayReason::Sleeping)));
        assert_eq!(detect_presence("brb"), Some(PresenceSignal::Away(AwayReason::BeRightBack)));
        assert_eq!(detect_presence("heading to work"), Some(PresenceSignal::Away(AwayReason::Working)));
        assert_eq!(detect_presence("gotta go, ttyl"), Some(PresenceSignal::Away(AwayReason::Busy)));
        assert_eq!(detect_presence("I'm back!"), Some(PresenceSignal::Returned));
        assert_eq!(detect_presence("what do you think about jazz?"), None);
    }

    #[tokio::test]
    async fn test_tracker_away_then_back() {
        let store: Arc<dyn CompanionStore> = Arc::new(SqliteStore::new(":memory:").await.unwrap());
        let tracker = PresenceTracker::new(store);
        let now = Utc::now();

        assert!(tracker.is_available(now).await.unwrap());
        tracker.observe("brb, one sec", now).await.unwrap();
        assert!(!tracker.is_available(now + Duration::minutes(5)).await.unwrap());
        // Expires on its own
        assert!(tracker.is_available(now + Duration::hours(1)).await.unwrap());

        tracker.observe("going to sleep", now).await.unwrap();
        tracker.observe("i'm back", now + Duration::hours(1)).await.unwrap();
        assert!(tracker.is_available(now + Duration::hours(1)).await.unwrap());
    }
}
