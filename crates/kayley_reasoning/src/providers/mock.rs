//! Mock provider: deterministic replies for tests and key-less runs.

use crate::api_types::AiActionResponse;
use crate::llm::{ChatProvider, ChatRequest, ChatSession, CompletionParams, LlmClient, ProviderCapabilities};
use anyhow::Result;
use kayley_core::ProviderError;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

type Reply = std::result::Result<AiActionResponse, ProviderError>;

/// Pops queued replies in order; once empty it echoes a canned answer.
pub struct MockProvider {
    replies: Mutex<VecDeque<Reply>>,
    completions: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ChatRequest>>,
    capabilities: ProviderCapabilities,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            completions: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            capabilities: ProviderCapabilities::MULTIMODAL,
        }
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn push_reply(&self, reply: AiActionResponse) {
        lock(&self.replies).push_back(Ok(reply));
    }

    pub fn push_error(&self, error: ProviderError) {
        lock(&self.replies).push_back(Err(error));
    }

    /// Queue a raw text completion (intent analysis and other side calls).
    pub fn push_completion(&self, text: &str) {
        lock(&self.completions).push_back(text.to_string());
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        lock(&self.requests).last().cloned()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    async fn generate(
        &self,
        request: ChatRequest,
        session: ChatSession,
    ) -> std::result::Result<(AiActionResponse, ChatSession), ProviderError> {
        lock(&self.requests).push(request);
        let next = lock(&self.replies).pop_front();
        let reply = match next {
            Some(reply) => reply?,
            None => AiActionResponse::text("(mock) I hear you!"),
        };
        Ok((reply, session.advanced(None)))
    }
}

#[async_trait::async_trait]
impl LlmClient for MockProvider {
    async fn complete(&self, _system: &str, _user: &str, _params: CompletionParams) -> Result<String> {
        match lock(&self.completions).pop_front() {
            Some(text) => Ok(text),
            None => anyhow::bail!("mock has no completion queued"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_types::UserContent;

    fn request() -> ChatRequest {
        ChatRequest {
            system_prompt: "sys".into(),
            history: vec![],
            input: UserContent::text("hi"),
            params: CompletionParams::default(),
        }
    }

    #[tokio::test]
    async fn test_mock_queue_order() {
        let mock = MockProvider::new();
        mock.push_reply(AiActionResponse::text("first"));
        mock.push_error(ProviderError::Network("down".into()));

        let (r, s) = mock.generate(request(), ChatSession::default()).await.unwrap();
        assert_eq!(r.text_response, "first");
        assert_eq!(s.exchanges, 1);
        assert!(mock.generate(request(), s.clone()).await.is_err());
        let (r, _) = mock.generate(request(), s).await.unwrap();
        assert!(r.text_response.contains("mock"));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_completion_queue() {
        let mock = MockProvider::new();
        assert!(mock.complete("s", "u", CompletionParams::default()).await.is_err());
        mock.push_completion("{}");
        assert_eq!(mock.complete("s", "u", CompletionParams::default()).await.unwrap(), "{}");
    }
}
