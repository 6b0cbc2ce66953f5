//! xAI Grok over the OpenAI-compatible chat completions API. Text input only.

use crate::api_types::{parse_action_response, AiActionResponse, UserContent};
use crate::llm::{ChatProvider, ChatRequest, ChatSession, CompletionParams, LlmClient, ProviderCapabilities};
use anyhow::Result;
use kayley_core::{ChatRole, ChatTurn, ProviderError};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";

/// Fixed reply for audio or image input.
pub const TEXT_ONLY_APOLOGY: &str = "I'm sorry, I can only read text messages right now.";

#[derive(Debug, Clone)]
pub struct GrokClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GrokClient {
    pub fn new(api_key: &str, base_url: Option<&str>, model: &str) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(60)).build()?,
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn history_messages(system: &str, history: &[ChatTurn]) -> Vec<Value> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(json!({"role": "system", "content": system}));
        for turn in history {
            let role = match turn.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": turn.text}));
        }
        messages
    }

    /// Returns the message content and the response id.
    async fn send(
        &self,
        messages: Vec<Value>,
        params: CompletionParams,
        json_mode: bool,
    ) -> std::result::Result<(String, Option<String>), ProviderError> {
        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        });
        if json_mode {
            payload["response_format"] = json!({"type": "json_object"});
        }

        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(
            "Grok request: model={}, max_tokens={}, temperature={:.2}",
            self.model,
            params.max_tokens,
            params.temperature
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status_code: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ProviderError::InvalidResponse("missing choices[0].message.content".into()))?
            .to_string();
        let id = body["id"].as_str().map(str::to_string);
        Ok((content, id))
    }
}

#[async_trait::async_trait]
impl ChatProvider for GrokClient {
    fn name(&self) -> &'static str {
        "grok"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::TEXT_ONLY
    }

    #[tracing::instrument(skip(self, request, session), fields(model = %self.model))]
    async fn generate(
        &self,
        request: ChatRequest,
        session: ChatSession,
    ) -> std::result::Result<(AiActionResponse, ChatSession), ProviderError> {
        let UserContent::Text(text) = &request.input else {
            tracing::info!("Grok received {:?} input, replying with the text-only apology", request.input.mode());
            return Ok((AiActionResponse::text(TEXT_ONLY_APOLOGY), session));
        };

        let mut messages = Self::history_messages(&request.system_prompt, &request.history);
        messages.push(json!({"role": "user", "content": text}));

        let (content, id) = self.send(messages, request.params, true).await?;
        Ok((parse_action_response(&content), session.advanced(id)))
    }
}

#[async_trait::async_trait]
impl LlmClient for GrokClient {
    async fn complete(&self, system: &str, user: &str, params: CompletionParams) -> Result<String> {
        let messages = vec![
            json!({"role": "system", "content": system}),
            json!({"role": "user", "content": user}),
        ];
        let (content, _) = self.send(messages, params, false).await?;
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_request(text: &str) -> ChatRequest {
        ChatRequest {
            system_prompt: "sys".into(),
            history: vec![ChatTurn::assistant("hey!", Utc::now())],
            input: UserContent::text(text),
            params: CompletionParams::default(),
        }
    }

    #[tokio::test]
    async fn test_generate_against_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "resp-1",
                "choices": [{"message": {"role": "assistant", "content": "{\"text_response\": \"hi there\"}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GrokClient::new("key", Some(&server.uri()), "grok-test").unwrap();
        let (resp, session) = client
            .generate(text_request("hello"), ChatSession::default())
            .await
            .unwrap();
        assert_eq!(resp.text_response, "hi there");
        assert_eq!(session.exchanges, 1);
        assert_eq!(session.last_response_id.as_deref(), Some("resp-1"));

        let received = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["model"], "grok-test");
        assert_eq!(body["response_format"]["type"], "json_object");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["content"], "hello");
    }

    #[tokio::test]
    async fn test_error_status_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = GrokClient::new("key", Some(&server.uri()), "grok-test").unwrap();
        let err = client
            .generate(text_request("hello"), ChatSession::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { status_code: 429, ref message } if message == "slow down"));
    }

    #[tokio::test]
    async fn test_missing_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let client = GrokClient::new("key", Some(&server.uri()), "grok-test").unwrap();
        let err = client.complete("sys", "hi", CompletionParams::default()).await.unwrap_err();
        assert!(err.to_string().contains("choices"));
    }

    #[tokio::test]
    async fn test_rejects_audio_with_apology() {
        // Unroutable base url: the test fails loudly if a request is attempted
        let client = GrokClient::new("key", Some("http://127.0.0.1:9"), "grok-test").unwrap();
        let session = ChatSession::default();
        let request = ChatRequest {
            system_prompt: "sys".into(),
            history: vec![],
            input: UserContent::Audio {
                data_base64: "AAAA".into(),
                mime_type: "audio/webm".into(),
            },
            params: CompletionParams::default(),
        };
        let (resp, next) = client.generate(request, session.clone()).await.unwrap();
        assert_eq!(resp.text_response, TEXT_ONLY_APOLOGY);
        assert_eq!(next, session);
    }

    #[test]
    fn test_history_layout() {
        let now = Utc::now();
        let history = vec![ChatTurn::user("hi", now), ChatTurn::assistant("hey!", now)];
        let msgs = GrokClient::history_messages("sys", &history);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[2]["role"], "assistant");
        assert_eq!(msgs[2]["content"], "hey!");
    }
}
