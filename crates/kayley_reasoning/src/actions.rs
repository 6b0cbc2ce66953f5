//! Side effects requested by a structured response: calendar, tasks, selfies,
//! videos. A failed action is reported as an outcome and never fails the turn.

use crate::api_types::{ActionKind, AiActionResponse, CalendarAction, CalendarOp, TaskAction, TaskOp};
use crate::media::{selfie_prompt, video_prompt, GeneratedMedia, MediaGenerator};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use kayley_core::{CalendarClient, CalendarEvent, Task, TaskClient};
use std::sync::Arc;

/// How far ahead calendar context and bulk deletes reach.
pub const CALENDAR_LOOKAHEAD_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    CalendarCreated(CalendarEvent),
    CalendarDeleted(Vec<String>),
    TaskCreated(Task),
    TaskCompleted(String),
    TaskDeleted(String),
    TaskListed(Vec<Task>),
    Media(GeneratedMedia),
    /// Passed through for the client to act on.
    OpenApp(String),
    Whiteboard(String),
    Skipped { action: &'static str, reason: String },
    Failed { action: &'static str, error: String },
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ActionOutcome::Failed { .. })
    }
}

pub struct ActionRouter {
    calendar: Arc<dyn CalendarClient>,
    tasks: Arc<dyn TaskClient>,
    media: Option<Arc<dyn MediaGenerator>>,
    character_name: String,
}

impl ActionRouter {
    pub fn new(calendar: Arc<dyn CalendarClient>, tasks: Arc<dyn TaskClient>) -> Self {
        Self {
            calendar,
            tasks,
            media: None,
            character_name: "Kayley".to_string(),
        }
    }

    pub fn with_media(mut self, media: Arc<dyn MediaGenerator>) -> Self {
        self.set_media(media);
        self
    }

    pub fn set_media(&mut self, media: Arc<dyn MediaGenerator>) {
        self.media = Some(media);
    }

    pub fn set_character_name(&mut self, name: &str) {
        self.character_name = name.to_string();
    }

    pub fn calendar(&self) -> &Arc<dyn CalendarClient> {
        &self.calendar
    }

    pub fn tasks(&self) -> &Arc<dyn TaskClient> {
        &self.tasks
    }

    /// Run every action in the response, in field order.
    pub async fn route(&self, response: &AiActionResponse) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::new();
        for action in response.actions() {
            let name = action.name();
            let outcome = match self.execute(action).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(action = name, "Action failed: {:#}", e);
                    ActionOutcome::Failed {
                        action: name,
                        error: format!("{:#}", e),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn execute(&self, action: ActionKind) -> Result<ActionOutcome> {
        match action {
            ActionKind::Calendar(cal) => self.calendar_action(&cal).await,
            ActionKind::Task(task) => self.task_action(&task).await,
            ActionKind::Selfie(selfie) => {
                let Some(media) = &self.media else {
                    return Ok(skipped("selfie", "media generation is not configured"));
                };
                let prompt = selfie_prompt(&self.character_name, &selfie);
                Ok(ActionOutcome::Media(media.generate_image(&prompt).await?))
            }
            ActionKind::Video(video) => {
                let Some(media) = &self.media else {
                    return Ok(skipped("video", "media generation is not configured"));
                };
                let generated = media
                    .generate_video(&video_prompt(&video), video.image_url.as_deref())
                    .await?;
                Ok(ActionOutcome::Media(generated))
            }
            ActionKind::OpenApp(app) => Ok(ActionOutcome::OpenApp(app)),
            ActionKind::Whiteboard(wb) => Ok(ActionOutcome::Whiteboard(wb.action_type)),
        }
    }

    async fn calendar_action(&self, action: &CalendarAction) -> Result<ActionOutcome> {
        let Some(op) = action.op() else {
            return Ok(skipped("calendar", &format!("unknown calendar action '{}'", action.action)));
        };
        match op {
            CalendarOp::Create => {
                let summary = action.summary.as_deref().context("calendar create needs a summary")?;
                let start = action.start.as_deref().context("calendar create needs a start")?;
                let end = action.end.as_deref().unwrap_or(start);
                let tz = action.time_zone.as_deref().unwrap_or("UTC");
                let event = self.calendar.create_event(summary, start, end, tz).await?;
                tracing::info!(event_id = %event.id, "Calendar event created");
                Ok(ActionOutcome::CalendarCreated(event))
            }
            CalendarOp::Delete => {
                let mut ids: Vec<String> = action.event_ids.clone().unwrap_or_default();
                if let Some(id) = &action.event_id {
                    if !ids.contains(id) {
                        ids.push(id.clone());
                    }
                }
                if ids.is_empty() {
                    anyhow::bail!("calendar delete needs event_id or event_ids");
                }
                self.delete_events(ids).await
            }
            CalendarOp::DeleteAll => {
                let now = Utc::now();
                let events = self
                    .calendar
                    .list_events(now - Duration::hours(1), now + Duration::days(CALENDAR_LOOKAHEAD_DAYS))
                    .await?;
                self.delete_events(events.into_iter().map(|e| e.id).collect()).await
            }
        }
    }

    async fn delete_events(&self, ids: Vec<String>) -> Result<ActionOutcome> {
        for id in &ids {
            self.calendar
                .delete_event(id)
                .await
                .with_context(|| format!("Failed to delete event {}", id))?;
        }
        tracing::info!(count = ids.len(), "Calendar events deleted");
        Ok(ActionOutcome::CalendarDeleted(ids))
    }

    /// An explicit id wins; otherwise match an open task by its text.
    async fn resolve_task_id(&self, action: &TaskAction) -> Result<String> {
        if let Some(id) = action.task_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }
        let text = action.task_text.as_deref().context("task action needs task_id or task_text")?;
        let tasks = self.tasks.list().await?;
        tasks
            .iter()
            .find(|t| !t.completed && t.text.eq_ignore_ascii_case(text.trim()))
            .map(|t| t.id.clone())
            .with_context(|| format!("No open task matching '{}'", text))
    }

    async fn task_action(&self, action: &TaskAction) -> Result<ActionOutcome> {
        let Some(op) = action.op() else {
            return Ok(skipped("task", &format!("unknown task action '{}'", action.action)));
        };
        match op {
            TaskOp::Create => {
                let text = action
                    .task_text
                    .as_deref()
                    .filter(|t| !t.trim().is_empty())
                    .context("task create needs task_text")?;
                let task = self.tasks.create(text.trim(), action.priority.unwrap_or_default()).await?;
                Ok(ActionOutcome::TaskCreated(task))
            }
            TaskOp::Complete => {
                let id = self.resolve_task_id(action).await?;
                self.tasks.complete(&id).await?;
                Ok(ActionOutcome::TaskCompleted(id))
            }
            TaskOp::Delete => {
                let id = self.resolve_task_id(action).await?;
                self.tasks.delete(&id).await?;
                Ok(ActionOutcome::TaskDeleted(id))
            }
            TaskOp::List => Ok(ActionOutcome::TaskListed(self.tasks.list().await?)),
        }
    }
}

fn skipped(action: &'static str, reason: &str) -> ActionOutcome {
    tracing::debug!(action, reason, "Action skipped");
    ActionOutcome::Skipped {
        action,
        reason: reason.to_string(),
    }
}
