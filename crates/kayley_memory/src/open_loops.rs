//! Open loops: pending user topics worth a follow-up.

use crate::store::CompanionStore;
use anyhow::Result;
use chrono::Duration;
use kayley_core::dynamics::open_loop_expired;
use kayley_core::{LoopStatus, LoopType, OpenLoop, Timestamp};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use uuid::Uuid;

static PENDING_EVENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:i have|i've got|there's|got) (?:an? |my )?(?:[a-z]+ )?(interview|exam|test|appointment|date|presentation|flight|surgery)\b.*?\b(tomorrow|tonight|next week|on (?:monday|tuesday|wednesday|thursday|friday|saturday|sunday))\b").unwrap()
});

static EMOTIONAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bi(?:'m| am|'ve been| have been) (?:feeling |been )?(?:really |so )?(down|low|sad|anxious|lonely|overwhelmed|burnt out|stressed)\b").unwrap()
});

static COMMITMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bi(?:'m going to| am going to|'m gonna| will|'ll) (?:finally |really )?(start|stop|try|quit|finish)\s+([a-z][a-z ]{2,40})").unwrap()
});

/// A detected loop before it is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopCandidate {
    pub topic: String,
    pub loop_type: LoopType,
    pub salience: f32,
    /// Delay before the loop may be brought up.
    pub surface_delay: Option<Duration>,
}

fn delay_for(when: &str) -> Duration {
    match when.to_lowercase().as_str() {
        "tonight" => Duration::hours(12),
        "next week" => Duration::days(7),
        "tomorrow" => Duration::hours(24),
        _ => Duration::days(2),
    }
}

pub fn detect_open_loops(message: &str) -> Vec<LoopCandidate> {
    let mut out = Vec::new();
    if let Some(caps) = PENDING_EVENT_RE.captures(message) {
        let what = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        let when = caps.get(2).map(|m| m.as_str()).unwrap_or("soon");
        out.push(LoopCandidate {
            topic: format!("their {}", what),
            loop_type: LoopType::PendingEvent,
            salience: 0.8,
            surface_delay: Some(delay_for(when)),
        });
    }
    if let Some(caps) = EMOTIONAL_RE.captures(message) {
        let feeling = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        out.push(LoopCandidate {
            topic: format!("how they've been feeling ({})", feeling),
            loop_type: LoopType::EmotionalFollowup,
            salience: 0.75,
            surface_delay: Some(Duration::hours(12)),
        });
    }
    if let Some(caps) = COMMITMENT_RE.captures(message) {
        let verb = caps.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        let object = caps.get(2).map(|m| m.as_str().trim().to_lowercase()).unwrap_or_default();
        out.push(LoopCandidate {
            topic: format!("their plan to {} {}", verb, object),
            loop_type: LoopType::CommitmentCheck,
            salience: 0.55,
            surface_delay: Some(Duration::days(3)),
        });
    }
    out
}

pub struct OpenLoopTracker {
    store: Arc<dyn CompanionStore>,
}

impl OpenLoopTracker {
    pub fn new(store: Arc<dyn CompanionStore>) -> Self {
        Self { store }
    }

    /// Detect loops in a message and persist the ones not already open.
    pub async fn analyze_message(&self, message: &str, now: Timestamp) -> Result<Vec<OpenLoop>> {
        let candidates = detect_open_loops(message);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let open = self.store.list_open_loops().await?;
        let mut created = Vec::new();
        for c in candidates {
            if open.iter().any(|l| l.topic == c.topic) {
                continue;
            }
            let mut l = OpenLoop::new(&c.topic, c.loop_type, message, c.salience, now);
            if let Some(delay) = c.surface_delay {
                l = l.with_surface_after(now + delay);
            }
            self.store.insert_open_loop(&l).await?;
            tracing::debug!("Opened loop: {}", l.topic);
            created.push(l);
        }
        Ok(created)
    }

    /// Open loops, expiring the ones past their lifetime.
    pub async fn active(&self, now: Timestamp) -> Result<Vec<OpenLoop>> {
        let mut live = Vec::new();
        for mut l in self.store.list_open_loops().await? {
            if open_loop_expired(&l, now) {
                l.status = LoopStatus::Expired;
                self.store.update_open_loop(&l).await?;
                tracing::debug!("Expired loop: {}", l.topic);
            } else {
                live.push(l);
            }
        }
        Ok(live)
    }

    pub async fn mark_surfaced(&self, open_loop: &OpenLoop, now: Timestamp) -> Result<OpenLoop> {
        let mut updated = open_loop.clone();
        updated.surface_count = updated.surface_count.saturating_add(1);
        updated.last_surfaced_at = Some(now);
        updated.status = if updated.surface_count >= updated.max_surfaces {
            LoopStatus::Resolved
        } else {
            LoopStatus::Surfaced
        };
        self.store.update_open_loop(&updated).await?;
        Ok(updated)
    }

    pub async fn resolve(&self, id: Uuid) -> Result<bool> {
        let open = self.store.list_open_loops().await?;
        let Some(mut l) = open.into_iter().find(|l| l.id == id) else {
            return Ok(false);
        };
        l.status = LoopStatus::Resolved;
        self.store.update_open_loop(&l).await?;
        Ok(true)
    }
}
