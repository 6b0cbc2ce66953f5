use crate::store::CompanionStore;
use anyhow::{Context, Result};
use kayley_core::{ArcType, KayleyError, LifeEvent, LifeEventCategory, NarrativeArc, Timestamp};
use std::sync::Arc;

/// How many life events feed the "what's new with you" section.
pub const RECENT_LIFE_EVENTS: usize = 5;

/// Storylines and life events from Kayley's own life.
pub struct NarrativeArcService {
    store: Arc<dyn CompanionStore>,
}

impl NarrativeArcService {
    pub fn new(store: Arc<dyn CompanionStore>) -> Self {
        Self { store }
    }

    /// Start a new ongoing arc. An existing arc with the same key is returned unchanged.
    pub async fn create(&self, arc_key: &str, title: &str, first_event: Option<&str>, now: Timestamp) -> Result<NarrativeArc> {
        if let Some(existing) = self.store.get_arc(arc_key).await? {
            tracing::debug!("Arc {} already exists", arc_key);
            return Ok(existing);
        }
        let mut arc = NarrativeArc::new(arc_key, title, now);
        if let Some(desc) = first_event {
            arc.add_event(desc, now);
        }
        self.store.save_arc(&arc).await?;
        tracing::info!("Started narrative arc '{}'", title);
        Ok(arc)
    }

    pub async fn add_event(&self, arc_key: &str, description: &str, date: Timestamp) -> Result<NarrativeArc> {
        let mut arc = self
            .store
            .get_arc(arc_key)
            .await?
            .with_context(|| format!("Narrative arc {} not found", arc_key))?;
        arc.add_event(description, date);
        self.store.save_arc(&arc).await?;
        Ok(arc)
    }

    /// Move an arc to a new state. Disallowed transitions are rejected.
    pub async fn transition(
        &self,
        arc_key: &str,
        next: ArcType,
        resolution: Option<&str>,
        now: Timestamp,
    ) -> Result<NarrativeArc, KayleyError> {
        let mut arc = self
            .store
            .get_arc(arc_key)
            .await?
            .ok_or_else(|| KayleyError::Store(format!("Narrative arc {} not found", arc_key)))?;
        arc.transition(next, resolution, now)?;
        self.store.save_arc(&arc).await?;
        tracing::info!("Arc '{}' is now {:?}", arc.title, arc.arc_type);
        Ok(arc)
    }

    pub async fn get(&self, arc_key: &str) -> Result<Option<NarrativeArc>> {
        self.store.get_arc(arc_key).await
    }

    pub async fn list(&self, arc_type: Option<ArcType>) -> Result<Vec<NarrativeArc>> {
        self.store.list_arcs(arc_type).await
    }

    /// Record that an arc has been told to a user.
    pub async fn mark_mentioned_to(&self, arc_key: &str, user_id: &str) -> Result<()> {
        if let Some(mut arc) = self.store.get_arc(arc_key).await? {
            if arc.mentioned_to.insert(user_id.to_string()) {
                self.store.save_arc(&arc).await?;
            }
        }
        Ok(())
    }

    pub async fn record_life_event(
        &self,
        description: &str,
        category: LifeEventCategory,
        intensity: f32,
        now: Timestamp,
    ) -> Result<LifeEvent> {
        let event = LifeEvent::new(description, category, intensity, now);
        self.store.insert_life_event(&event).await?;
        Ok(event)
    }

    pub async fn recent_life_events(&self) -> Result<Vec<LifeEvent>> {
        self.store.recent_life_events(RECENT_LIFE_EVENTS).await
    }
}
