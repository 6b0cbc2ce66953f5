//! Per-turn surfacing plan: at most one stored item goes into the prompt.

use crate::selection::{select_milestone, select_open_loop, select_pattern, select_proactive_thread, select_weighted_thread};
use anyhow::Result;
use kayley_core::{KayleyError, OngoingThread, OpenLoop, RelationshipMilestone, Timestamp, UserPattern};
use kayley_memory::{MilestoneTracker, OpenLoopTracker, PatternTracker, ThreadManager};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};

/// Open loops only jump the queue above this salience.
pub const OPEN_LOOP_PRIORITY_SALIENCE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub enum SurfacedItem {
    OpenLoop(OpenLoop),
    Milestone(RelationshipMilestone),
    Pattern(UserPattern),
    Thread(OngoingThread),
}

impl SurfacedItem {
    pub fn kind(&self) -> &'static str {
        match self {
            SurfacedItem::OpenLoop(_) => "open_loop",
            SurfacedItem::Milestone(_) => "milestone",
            SurfacedItem::Pattern(_) => "pattern",
            SurfacedItem::Thread(_) => "thread",
        }
    }
}

/// Everything the planner considered, loaded once per turn.
#[derive(Debug, Clone, Default)]
pub struct SurfacingCandidates {
    pub open_loops: Vec<OpenLoop>,
    pub milestones: Vec<RelationshipMilestone>,
    pub patterns: Vec<UserPattern>,
    pub threads: Vec<OngoingThread>,
}

/// Precedence: strong open loop, milestone, pattern, then a weighted thread.
pub fn choose_item<R: rand::RngCore + ?Sized>(
    candidates: &SurfacingCandidates,
    total_interactions: u32,
    now: Timestamp,
    rng: &mut R,
) -> Option<SurfacedItem> {
    if let Some(l) = select_open_loop(&candidates.open_loops, now) {
        if l.salience > OPEN_LOOP_PRIORITY_SALIENCE {
            return Some(SurfacedItem::OpenLoop(l.clone()));
        }
    }
    if let Some(m) = select_milestone(&candidates.milestones, total_interactions, now) {
        return Some(SurfacedItem::Milestone(m.clone()));
    }
    if let Some(p) = select_pattern(&candidates.patterns, now) {
        return Some(SurfacedItem::Pattern(p.clone()));
    }
    select_weighted_thread(&candidates.threads, now, rng).map(|t| SurfacedItem::Thread(t.clone()))
}

/// What a greeting may bring up: an open loop, else the proactive thread.
#[derive(Debug, Clone, Default)]
pub struct GreetingContent {
    pub open_loop: Option<OpenLoop>,
    pub proactive_thread: Option<OngoingThread>,
}

pub struct SurfacingPlanner {
    threads: Arc<ThreadManager>,
    patterns: Arc<PatternTracker>,
    milestones: Arc<MilestoneTracker>,
    open_loops: Arc<OpenLoopTracker>,
    rng: Mutex<StdRng>,
}

impl SurfacingPlanner {
    pub fn new(
        threads: Arc<ThreadManager>,
        patterns: Arc<PatternTracker>,
        milestones: Arc<MilestoneTracker>,
        open_loops: Arc<OpenLoopTracker>,
    ) -> Self {
        Self {
            threads,
            patterns,
            milestones,
            open_loops,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub async fn load_candidates(&self, now: Timestamp) -> Result<SurfacingCandidates, KayleyError> {
        let threads = self.threads.refresh(now).await?.threads;
        Ok(SurfacingCandidates {
            open_loops: self.open_loops.active(now).await?,
            milestones: self.milestones.list().await?,
            patterns: self.patterns.list().await?,
            threads,
        })
    }

    /// Choose this turn's item without recording it.
    pub async fn plan(&self, total_interactions: u32, now: Timestamp) -> Result<(Option<SurfacedItem>, SurfacingCandidates), KayleyError> {
        let candidates = self.load_candidates(now).await?;
        let item = {
            let mut rng = match self.rng.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            choose_item(&candidates, total_interactions, now, &mut *rng)
        };
        if let Some(item) = &item {
            tracing::debug!("Surfacing {} this turn", item.kind());
        }
        Ok((item, candidates))
    }

    /// Record that an item was surfaced (count and time).
    pub async fn commit(&self, item: &SurfacedItem, now: Timestamp) -> Result<(), KayleyError> {
        match item {
            SurfacedItem::OpenLoop(l) => {
                self.open_loops.mark_surfaced(l, now).await?;
            }
            SurfacedItem::Milestone(m) => {
                self.milestones.mark_referenced(m, now).await?;
            }
            SurfacedItem::Pattern(p) => {
                self.patterns.mark_surfaced(p, now).await?;
            }
            SurfacedItem::Thread(t) => {
                self.threads.mark_mentioned(t.id, now).await?;
            }
        }
        Ok(())
    }

    pub async fn greeting_content(&self, now: Timestamp) -> Result<GreetingContent> {
        let loops = self.open_loops.active(now).await?;
        let open_loop = select_open_loop(&loops, now)
            .filter(|l| l.salience > OPEN_LOOP_PRIORITY_SALIENCE)
            .cloned();
        let proactive_thread = if open_loop.is_none() {
            let snapshot = self.threads.refresh(now).await?;
            select_proactive_thread(&snapshot.threads, now).cloned()
        } else {
            None
        };
        Ok(GreetingContent {
            open_loop,
            proactive_thread,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use kayley_core::{LoopType, MilestoneType, PatternType, ThreadTheme};

    fn candidates(now: Timestamp) -> SurfacingCandidates {
        let mut pattern = UserPattern::new(PatternType::MoodTime, "down on Mondays", now - Duration::days(30));
        pattern.frequency = 4;
        pattern.confidence = 0.7;
        SurfacingCandidates {
            open_loops: vec![OpenLoop::new("their interview", LoopType::PendingEvent, "", 0.8, now - Duration::hours(1))],
            milestones: vec![RelationshipMilestone::new("u", MilestoneType::FirstJoke, "", "", now - Duration::days(3))],
            patterns: vec![pattern],
            threads: vec![OngoingThread::new(ThreadTheme::Work, "edit", 0.8, now - Duration::hours(10))],
        }
    }

    #[test]
    fn test_precedence_chain() {
        let now = Utc::now();
        let mut rng = StdRng::seed_from_u64(3);
        let mut c = candidates(now);

        assert_eq!(choose_item(&c, 100, now, &mut rng).unwrap().kind(), "open_loop");

        c.open_loops[0].salience = 0.7;
        assert_eq!(choose_item(&c, 100, now, &mut rng).unwrap().kind(), "milestone");

        // Below the interaction floor milestones drop out
        assert_eq!(choose_item(&c, 10, now, &mut rng).unwrap().kind(), "pattern");

        c.patterns.clear();
        assert_eq!(choose_item(&c, 10, now, &mut rng).unwrap().kind(), "thread");

        c.threads.clear();
        assert!(choose_item(&c, 10, now, &mut rng).is_none());
    }
}
