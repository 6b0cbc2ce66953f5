//! Daily catch-up timer and the plumbing shared by proactive timers.

use crate::checkins::CheckinKind;
use crate::presence::PresenceScheduler;
use chrono::{Duration, Local, NaiveDateTime, NaiveTime, TimeZone, Utc};
use kayley_core::Timestamp;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Something Kayley wants to say without being asked.
#[derive(Debug, Clone, PartialEq)]
pub enum ProactiveEvent {
    DailyCatchup {
        at: Timestamp,
    },
    CalendarCheckin {
        event_id: String,
        summary: String,
        kind: CheckinKind,
    },
}

/// Time of the user's most recent message, shared with the timers.
#[derive(Debug, Clone, Default)]
pub struct ActivityClock {
    last: Arc<RwLock<Option<Timestamp>>>,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self, at: Timestamp) {
        let mut guard = match self.last.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.map_or(true, |prev| at > prev) {
            *guard = Some(at);
        }
    }

    pub fn last(&self) -> Option<Timestamp> {
        match self.last.read() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Cancels a spawned timer loop. Dropping the handle stops the loop too.
pub struct ScheduleHandle {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    pub(crate) fn new(cancel_tx: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { cancel_tx, task }
    }

    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("Timer task ended abnormally: {}", e);
        }
    }
}

/// Next local wall-clock instant at `hour:minute` strictly after `now`.
pub fn next_fire_after(now: NaiveDateTime, hour: u32, minute: u32) -> Option<NaiveDateTime> {
    let at = NaiveTime::from_hms_opt(hour, minute, 0)?;
    let today = now.date().and_time(at);
    if today > now {
        Some(today)
    } else {
        Some(now.date().succ_opt()?.and_time(at))
    }
}

/// The catch-up is skipped once the user already talked to Kayley today.
pub fn should_fire_catchup(last_interaction: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
    match last_interaction {
        Some(last) => last.date() != now.date(),
        None => true,
    }
}

/// Returns false if cancelled before `wait` elapsed.
async fn sleep_unless_cancelled(wait: std::time::Duration, cancel_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(wait) => !*cancel_rx.borrow(),
        _ = cancel_rx.changed() => {
            tracing::debug!("Daily catch-up scheduler cancelled");
            false
        }
    }
}

pub struct DailyCatchupScheduler {
    hour: u32,
    minute: u32,
    activity: ActivityClock,
    presence: PresenceScheduler,
}

impl DailyCatchupScheduler {
    pub fn new(hour: u32, minute: u32, activity: ActivityClock, presence: PresenceScheduler) -> Self {
        Self {
            hour,
            minute,
            activity,
            presence,
        }
    }

    fn sleep_until_next(&self) -> Option<std::time::Duration> {
        let now = Local::now();
        let next = next_fire_after(now.naive_local(), self.hour, self.minute)?;
        // DST gaps have no local instant; skip to an hour later
        let fire = Local
            .from_local_datetime(&next)
            .earliest()
            .or_else(|| Local.from_local_datetime(&(next + Duration::hours(1))).earliest())?;
        (fire - now).to_std().ok()
    }

    fn check_and_build(&self) -> Option<ProactiveEvent> {
        let now_local = Local::now().naive_local();
        let last = self.activity.last().map(|t| t.with_timezone(&Local).naive_local());
        if !should_fire_catchup(last, now_local) {
            tracing::debug!("Daily catch-up skipped: user already active today");
            return None;
        }
        if !self.presence.is_appropriate_at(now_local) {
            tracing::debug!("Daily catch-up skipped: outside active hours");
            return None;
        }
        Some(ProactiveEvent::DailyCatchup { at: Utc::now() })
    }

    pub fn spawn(self, tx: mpsc::Sender<ProactiveEvent>) -> ScheduleHandle {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            loop {
                let Some(wait) = self.sleep_until_next() else {
                    tracing::warn!(
                        "Invalid daily catch-up time {:02}:{:02}, scheduler stopped",
                        self.hour,
                        self.minute
                    );
                    return;
                };
                tracing::debug!("Next daily catch-up in {}s", wait.as_secs());
                if !sleep_unless_cancelled(wait, &mut cancel_rx).await {
                    return;
                }
                if let Some(event) = self.check_and_build() {
                    if tx.send(event).await.is_err() {
                        tracing::debug!("Proactive receiver dropped, stopping catch-up scheduler");
                        return;
                    }
                }
                // Step past the fire minute before recomputing
                if !sleep_unless_cancelled(std::time::Duration::from_secs(61), &mut cancel_rx).await {
                    return;
                }
            }
        });
        ScheduleHandle::new(cancel_tx, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_next_fire_same_day_and_rollover() {
        assert_eq!(next_fire_after(at(2, 7, 30), 9, 0), Some(at(2, 9, 0)));
        assert_eq!(next_fire_after(at(2, 9, 0), 9, 0), Some(at(3, 9, 0)));
        assert_eq!(next_fire_after(at(2, 22, 0), 9, 0), Some(at(3, 9, 0)));
        assert_eq!(next_fire_after(at(2, 8, 0), 25, 0), None);
    }

    #[test]
    fn test_catchup_skipped_after_activity_today() {
        assert!(should_fire_catchup(None, at(2, 9, 0)));
        assert!(!should_fire_catchup(Some(at(2, 8, 15)), at(2, 9, 0)));
        assert!(should_fire_catchup(Some(at(1, 23, 50)), at(2, 9, 0)));
    }

    #[test]
    fn test_activity_clock_only_moves_forward() {
        let clock = ActivityClock::new();
        let now = Utc::now();
        clock.touch(now);
        clock.touch(now - Duration::hours(1));
        assert_eq!(clock.last(), Some(now));
        let shared = clock.clone();
        shared.touch(now + Duration::minutes(1));
        assert_eq!(clock.last(), Some(now + Duration::minutes(1)));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_cooldown() {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let sleeper = tokio::spawn(async move {
            sleep_unless_cancelled(std::time::Duration::from_secs(61), &mut cancel_rx).await
        });
        cancel_tx.send(true).unwrap();
        let finished = tokio::time::timeout(std::time::Duration::from_secs(2), sleeper)
            .await
            .expect("cooldown ignored cancellation")
            .unwrap();
        assert!(!finished);
    }

    #[tokio::test]
    async fn test_sleep_completes_without_cancel() {
        let (_cancel_tx, mut cancel_rx) = watch::channel(false);
        assert!(sleep_unless_cancelled(std::time::Duration::from_millis(5), &mut cancel_rx).await);
    }

    #[tokio::test]
    async fn test_cancel_stops_scheduler() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = DailyCatchupScheduler::new(9, 0, ActivityClock::new(), PresenceScheduler::new()).spawn(tx);
        handle.shutdown().await;
        // The sender was dropped with the task
        assert!(rx.recv().await.is_none());
    }
}
