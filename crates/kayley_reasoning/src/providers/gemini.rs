//! Google Gemini over the `generateContent` REST endpoint. Accepts text,
//! audio and image+text input.

use crate::api_types::{parse_action_response, AiActionResponse, UserContent};
use crate::llm::{ChatProvider, ChatRequest, ChatSession, CompletionParams, LlmClient, ProviderCapabilities};
use anyhow::Result;
use kayley_core::{ChatRole, ChatTurn, ProviderError};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, base_url: Option<&str>, model: &str) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(90)).build()?,
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    fn user_parts(input: &UserContent) -> Vec<Value> {
        match input {
            UserContent::Text(text) => vec![json!({"text": text})],
            UserContent::Audio { data_base64, mime_type } => vec![
                json!({"inlineData": {"mimeType": mime_type, "data": data_base64}}),
                json!({"text": "(voice message; include what you heard in user_transcription)"}),
            ],
            UserContent::ImageText {
                text,
                image_base64,
                mime_type,
            } => vec![
                json!({"inlineData": {"mimeType": mime_type, "data": image_base64}}),
                json!({"text": text}),
            ],
        }
    }

    fn build_body(system: &str, history: &[ChatTurn], parts: Vec<Value>, params: CompletionParams, json_mode: bool) -> Value {
        let mut contents: Vec<Value> = history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "model",
                };
                json!({"role": role, "parts": [{"text": turn.text}]})
            })
            .collect();
        contents.push(json!({"role": "user", "parts": parts}));

        let mut generation = json!({
            "temperature": params.temperature,
            "maxOutputTokens": params.max_tokens,
        });
        if json_mode {
            generation["responseMimeType"] = json!("application/json");
        }
        json!({
            "systemInstruction": {"parts": [{"text": system}]},
            "contents": contents,
            "generationConfig": generation,
        })
    }

    async fn send(&self, body: Value) -> std::result::Result<String, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
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
        extract_text(&body).ok_or_else(|| ProviderError::InvalidResponse("no text in candidates[0]".into()))
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(body: &Value) -> Option<String> {
    let parts = body["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait::async_trait]
impl ChatProvider for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::MULTIMODAL
    }

    #[tracing::instrument(skip(self, request, session), fields(model = %self.model))]
    async fn generate(
        &self,
        request: ChatRequest,
        session: ChatSession,
    ) -> std::result::Result<(AiActionResponse, ChatSession), ProviderError> {
        let parts = Self::user_parts(&request.input);
        let body = Self::build_body(&request.system_prompt, &request.history, parts, request.params, true);
        let content = self.send(body).await?;
        Ok((parse_action_response(&content), session.advanced(None)))
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, system: &str, user: &str, params: CompletionParams) -> Result<String> {
        let body = Self::build_body(system, &[], vec![json!({"text": user})], params, false);
        Ok(self.send(body).await?)
    }
}
