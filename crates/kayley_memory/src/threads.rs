//! Ongoing-thread lifecycle: decay, prune, top-up, boost and user reflections.
//!
//! All mutation goes through [`ThreadCache`] so concurrent writers built on
//! stale reads are rejected.

use crate::cache::{ThreadCache, ThreadSnapshot};
use kayley_core::dynamics::{
    boost_thread, decay_thread, should_prune_thread, MAX_ACTIVE_THREADS, MIN_ACTIVE_THREADS,
};
use kayley_core::{KayleyError, OngoingThread, ThreadTheme, Timestamp};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

/// Intensity given to freshly generated autonomous threads.
const GENERATED_INTENSITY_RANGE: (f32, f32) = (0.45, 0.75);
/// Starting intensity of a thread spawned by something the user said.
pub const USER_REFLECTION_INTENSITY: f32 = 0.7;
pub const MENTION_BOOST: f32 = 0.1;

/// Template pool for the autonomous generator.
pub fn thread_templates(theme: ThreadTheme) -> &'static [&'static str] {
    match theme {
        ThreadTheme::CreativeProject => &[
            "Trying to figure out the edit for my thrift haul video",
            "Sketching out a concept for a cozy morning-routine series",
            "Can't stop thinking about redoing my channel intro",
        ],
        ThreadTheme::Family => &[
            "My mom keeps texting me about coming home for the holidays",
            "Wondering if I should call my brother, it's been a while",
        ],
        ThreadTheme::SelfImprovement => &[
            "Trying to actually stick to waking up before 8",
            "Thinking about taking a pottery class to get off screens",
            "Working on saying no to things I don't want to do",
        ],
        ThreadTheme::Social => &[
            "Planning a game night and stressing over who to invite",
            "My friend Lena and I had a weird moment and I keep replaying it",
        ],
        ThreadTheme::Work => &[
            "A brand reached out about a sponsorship and I'm not sure it fits",
            "My upload schedule is slipping and it's bugging me",
        ],
        ThreadTheme::Existential => &[
            "Wondering whether making content is what I actually want long term",
            "Thinking about how fast this year went",
        ],
        ThreadTheme::UserReflection | ThreadTheme::CurrentEvent => &[],
    }
}

pub struct ThreadManager {
    cache: ThreadCache,
    rng: Mutex<StdRng>,
}

impl ThreadManager {
    pub fn new(cache: ThreadCache) -> Self {
        Self {
            cache,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator for tests.
    pub fn with_seed(cache: ThreadCache, seed: u64) -> Self {
        Self {
            cache,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn cache(&self) -> &ThreadCache {
        &self.cache
    }

    /// Decay, prune and top up the active set, persisting the result.
    ///
    /// Returns the snapshot after the write so callers can select from it.
    pub async fn refresh(&self, now: Timestamp) -> Result<ThreadSnapshot, KayleyError> {
        let snapshot = self.cache.read().await?;
        let mut threads = snapshot.threads;

        for t in threads.iter_mut() {
            decay_thread(t, now);
        }
        let before = threads.len();
        threads.retain(|t| !should_prune_thread(t, now));
        if threads.len() < before {
            tracing::debug!("Pruned {} threads", before - threads.len());
        }

        self.top_up(&mut threads, now);
        enforce_max(&mut threads, None);

        let version = self.cache.write(snapshot.version, threads.clone()).await?;
        Ok(ThreadSnapshot { threads, version })
    }

    /// Add a thread, dropping the weakest of the existing ones when over the
    /// maximum. The added thread itself is never dropped.
    pub async fn add_thread(&self, thread: OngoingThread) -> Result<(), KayleyError> {
        let snapshot = self.cache.read().await?;
        let mut threads = snapshot.threads;
        let added = thread.id;
        threads.push(thread);
        enforce_max(&mut threads, Some(added));
        self.cache.write(snapshot.version, threads).await?;
        Ok(())
    }

    /// Record that a user message prompted a new line of thought.
    pub async fn create_user_reflection(
        &self,
        trigger: &str,
        current_state: &str,
        now: Timestamp,
    ) -> Result<OngoingThread, KayleyError> {
        let thread = OngoingThread::user_reflection(trigger, current_state, USER_REFLECTION_INTENSITY, now);
        tracing::info!("New user reflection thread: {}", current_state);
        self.add_thread(thread.clone()).await?;
        Ok(thread)
    }

    /// Mark a thread as mentioned and raise its intensity.
    pub async fn mark_mentioned(&self, id: Uuid, now: Timestamp) -> Result<bool, KayleyError> {
        let snapshot = self.cache.read().await?;
        let mut threads = snapshot.threads;
        let Some(t) = threads.iter_mut().find(|t| t.id == id) else {
            return Ok(false);
        };
        boost_thread(t, MENTION_BOOST, now);
        self.cache.write(snapshot.version, threads).await?;
        Ok(true)
    }

    fn top_up(&self, threads: &mut Vec<OngoingThread>, now: Timestamp) {
        if threads.len() >= MIN_ACTIVE_THREADS {
            return;
        }
        let present: HashSet<ThreadTheme> = threads.iter().map(|t| t.theme).collect();
        let mut candidates: Vec<ThreadTheme> = ThreadTheme::AUTONOMOUS
            .iter()
            .copied()
            .filter(|theme| !present.contains(theme))
            .collect();

        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        candidates.shuffle(&mut *rng);

        for theme in candidates {
            if threads.len() >= MIN_ACTIVE_THREADS {
                break;
            }
            let Some(state) = thread_templates(theme).choose(&mut *rng) else {
                continue;
            };
            let intensity = rng.gen_range(GENERATED_INTENSITY_RANGE.0..GENERATED_INTENSITY_RANGE.1);
            tracing::debug!("Generated {:?} thread: {}", theme, state);
            threads.push(OngoingThread::new(theme, state, intensity, now));
        }
    }
}

/// Drop the lowest-intensity threads until the set fits, sparing `keep`.
fn enforce_max(threads: &mut Vec<OngoingThread>, keep: Option<Uuid>) {
    while threads.len() > MAX_ACTIVE_THREADS {
        let Some((weakest, _)) = threads
            .iter()
            .enumerate()
            .filter(|(_, t)| Some(t.id) != keep)
            .min_by(|(_, a), (_, b)| a.intensity.total_cmp(&b.intensity))
        else {
            break;
        };
        let dropped = threads.remove(weakest);
        tracing::debug!("Dropped weakest thread: {}", dropped.current_state);
    }
}
