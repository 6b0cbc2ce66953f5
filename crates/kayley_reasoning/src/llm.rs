use crate::api_types::{AiActionResponse, InputMode, UserContent};
use anyhow::Result;
use async_trait::async_trait;
use kayley_core::{ChatTurn, ProviderError};
use uuid::Uuid;

/// Sampling parameters for one completion.
#[derive(Debug, Clone, Copy)]
pub struct CompletionParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.8,
        }
    }
}

/// Input modes a provider can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderCapabilities {
    pub text: bool,
    pub audio: bool,
    pub image: bool,
}

impl ProviderCapabilities {
    pub const TEXT_ONLY: Self = Self {
        text: true,
        audio: false,
        image: false,
    };
    pub const MULTIMODAL: Self = Self {
        text: true,
        audio: true,
        image: true,
    };

    pub fn accepts(&self, mode: InputMode) -> bool {
        match mode {
            InputMode::Text => self.text,
            InputMode::Audio => self.audio,
            InputMode::ImageText => self.image,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system_prompt: String,
    /// Oldest first.
    pub history: Vec<ChatTurn>,
    pub input: UserContent,
    pub params: CompletionParams,
}

/// Provider-side conversation handle, threaded through every turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    pub session_id: Uuid,
    pub exchanges: u32,
    /// Id of the provider's last response, when it returns one.
    pub last_response_id: Option<String>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            exchanges: 0,
            last_response_id: None,
        }
    }
}

impl ChatSession {
    pub fn advanced(&self, response_id: Option<String>) -> Self {
        Self {
            session_id: self.session_id,
            exchanges: self.exchanges.saturating_add(1),
            last_response_id: response_id.or_else(|| self.last_response_id.clone()),
        }
    }
}

/// The main structured-reply boundary.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> ProviderCapabilities;

    async fn generate(
        &self,
        request: ChatRequest,
        session: ChatSession,
    ) -> std::result::Result<(AiActionResponse, ChatSession), ProviderError>;
}

/// Plain text completion, used for cheap side calls like intent analysis.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str, params: CompletionParams) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert!(ProviderCapabilities::TEXT_ONLY.accepts(InputMode::Text));
        assert!(!ProviderCapabilities::TEXT_ONLY.accepts(InputMode::Audio));
        assert!(ProviderCapabilities::MULTIMODAL.accepts(InputMode::ImageText));
    }

    #[test]
    fn test_session_advances() {
        let s = ChatSession::default();
        let next = s.advanced(Some("resp_1".into()));
        assert_eq!(next.session_id, s.session_id);
        assert_eq!(next.exchanges, 1);
        let again = next.advanced(None);
        assert_eq!(again.last_response_id.as_deref(), Some("resp_1"));
    }
}
