//! Wire schema of the structured reply every provider must return.

use kayley_core::TaskPriority;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AiActionResponse {
    #[serde(default)]
    pub text_response: String,
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_transcription: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_action: Option<TaskAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_action: Option<CalendarAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_move: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_move_detected: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whiteboard_action: Option<WhiteboardAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selfie_action: Option<SelfieAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_action: Option<VideoAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOp {
    Create,
    Complete,
    Delete,
    List,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskAction {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
}

impl TaskAction {
    pub fn op(&self) -> Option<TaskOp> {
        match self.action.trim().to_ascii_lowercase().as_str() {
            "create" | "add" => Some(TaskOp::Create),
            "complete" | "done" => Some(TaskOp::Complete),
            "delete" | "remove" => Some(TaskOp::Delete),
            "list" => Some(TaskOp::List),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarOp {
    Create,
    Delete,
    DeleteAll,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarAction {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_all: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// RFC3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    /// IANA name
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl CalendarAction {
    pub fn op(&self) -> Option<CalendarOp> {
        if self.delete_all == Some(true) {
            return Some(CalendarOp::DeleteAll);
        }
        match self.action.trim().to_ascii_lowercase().as_str() {
            "create" => Some(CalendarOp::Create),
            "delete" => Some(CalendarOp::Delete),
            "delete_all" => Some(CalendarOp::DeleteAll),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhiteboardAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Shape-specific payload passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelfieAction {
    pub scene: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoAction {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Side effect requested by a reply, derived from which optional field is set.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Calendar(CalendarAction),
    Task(TaskAction),
    Selfie(SelfieAction),
    Video(VideoAction),
    OpenApp(String),
    Whiteboard(WhiteboardAction),
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Calendar(_) => "calendar",
            ActionKind::Task(_) => "task",
            ActionKind::Selfie(_) => "selfie",
            ActionKind::Video(_) => "video",
            ActionKind::OpenApp(_) => "open_app",
            ActionKind::Whiteboard(_) => "whiteboard",
        }
    }
}

impl AiActionResponse {
    pub fn text(text: &str) -> Self {
        Self {
            text_response: text.to_string(),
            ..Default::default()
        }
    }

    pub fn actions(&self) -> Vec<ActionKind> {
        let mut out = Vec::new();
        if let Some(a) = &self.calendar_action {
            out.push(ActionKind::Calendar(a.clone()));
        }
        if let Some(a) = &self.task_action {
            out.push(ActionKind::Task(a.clone()));
        }
        if let Some(a) = &self.selfie_action {
            out.push(ActionKind::Selfie(a.clone()));
        }
        if let Some(a) = &self.video_action {
            out.push(ActionKind::Video(a.clone()));
        }
        if let Some(app) = &self.open_app {
            if !app.trim().is_empty() {
                out.push(ActionKind::OpenApp(app.clone()));
            }
        }
        if let Some(a) = &self.whiteboard_action {
            out.push(ActionKind::Whiteboard(a.clone()));
        }
        out
    }
}

/// Parse a provider reply, tolerating code fences and prose around the JSON.
/// Anything that still isn't the schema becomes a plain text reply.
pub fn parse_action_response(raw: &str) -> AiActionResponse {
    let trimmed = raw.trim();

    if let Ok(resp) = serde_json::from_str::<AiActionResponse>(trimmed) {
        return resp;
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(resp) = serde_json::from_str::<AiActionResponse>(&trimmed[start..=end]) {
                return resp;
            }
        }
    }

    tracing::debug!("Reply is not structured JSON, using it as text");
    AiActionResponse::text(trimmed)
}

/// What the user sent this turn.
#[derive(Debug, Clone, PartialEq)]
pub enum UserContent {
    Text(String),
    Audio {
        data_base64: String,
        mime_type: String,
    },
    ImageText {
        text: String,
        image_base64: String,
        mime_type: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Text,
    Audio,
    ImageText,
}

impl UserContent {
    pub fn text(text: &str) -> Self {
        UserContent::Text(text.to_string())
    }

    pub fn mode(&self) -> InputMode {
        match self {
            UserContent::Text(_) => InputMode::Text,
            UserContent::Audio { .. } => InputMode::Audio,
            UserContent::ImageText { .. } => InputMode::ImageText,
        }
    }

    /// Text available before any transcription.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            UserContent::Text(t) => Some(t),
            UserContent::ImageText { text, .. } => Some(text),
            UserContent::Audio { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_schema() {
        let raw = r#"{
            "text_response": "On it!",
            "action_id": null,
            "calendar_action": {"action": "create", "summary": "Dentist", "start": "2025-06-02T15:00:00-05:00", "end": "2025-06-02T16:00:00-05:00", "timeZone": "America/Chicago"},
            "task_action": {"action": "create", "task_text": "call mom", "priority": "high"},
            "whiteboard_action": {"type": "draw", "description": "a cat", "color": "red"}
        }"#;
        let resp = parse_action_response(raw);
        assert_eq!(resp.text_response, "On it!");
        let cal = resp.calendar_action.as_ref().unwrap();
        assert_eq!(cal.op(), Some(CalendarOp::Create));
        assert_eq!(cal.time_zone.as_deref(), Some("America/Chicago"));
        assert_eq!(resp.task_action.as_ref().unwrap().priority, Some(TaskPriority::High));
        assert_eq!(resp.whiteboard_action.as_ref().unwrap().extra["color"], "red");

        let names: Vec<&str> = resp.actions().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["calendar", "task", "whiteboard"]);
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"text_response\": \"hey you\"}\n```";
        assert_eq!(parse_action_response(raw).text_response, "hey you");
    }

    #[test]
    fn test_non_json_becomes_text() {
        let resp = parse_action_response("  just chatting, no json here  ");
        assert_eq!(resp.text_response, "just chatting, no json here");
        assert!(resp.actions().is_empty());
    }

    #[test]
    fn test_delete_all_flag_wins() {
        let a = CalendarAction {
            action: "delete".into(),
            delete_all: Some(true),
            ..Default::default()
        };
        assert_eq!(a.op(), Some(CalendarOp::DeleteAll));
    }

    #[test]
    fn test_blank_open_app_ignored() {
        let resp = AiActionResponse {
            open_app: Some("  ".into()),
            ..Default::default()
        };
        assert!(resp.actions().is_empty());
    }
}
