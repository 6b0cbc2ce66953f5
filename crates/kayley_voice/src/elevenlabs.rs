use crate::tts::TextToSpeech;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

/// ElevenLabs `text-to-speech/{voice_id}` client, MP3 output.
pub struct ElevenLabsClient {
    client: Client,
    api_key: String,
    base_url: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabsClient {
    pub fn new(api_key: &str, base_url: &str, voice_id: &str, model_id: &str) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(60)).build()?,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            voice_id: voice_id.to_string(),
            model_id: model_id.to_string(),
        })
    }
}

#[async_trait]
impl TextToSpeech for ElevenLabsClient {
    #[tracing::instrument(skip(self, text), fields(voice = %self.voice_id, chars = text.len()))]
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        if text.trim().is_empty() {
            anyhow::bail!("Nothing to synthesize");
        }
        let url = format!(
            "{}/text-to-speech/{}?output_format=mp3_44100_128",
            self.base_url, self.voice_id
        );
        let body = json!({
            "text": text,
            "model_id": self.model_id,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.75,
            },
        });

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .context("ElevenLabs request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("ElevenLabs API error ({}): {}", status, text);
        }
        let bytes = response.bytes().await.context("Failed to read ElevenLabs audio")?;
        tracing::debug!(bytes = bytes.len(), "Speech synthesized");
        Ok(bytes.to_vec())
    }

    fn voice_id(&self) -> &str {
        &self.voice_id
    }

    fn provider_name(&self) -> &'static str {
        "elevenlabs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_synthesize_base64() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text-to-speech/voice-1"))
            .and(query_param("output_format", "mp3_44100_128"))
            .and(header("xi-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3".to_vec()))
            .mount(&server)
            .await;

        let tts = ElevenLabsClient::new("secret", &server.uri(), "voice-1", "eleven_flash_v2_5").unwrap();
        assert_eq!(tts.synthesize_base64("hi there").await.unwrap(), "SUQz");
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let tts = ElevenLabsClient::new("nope", &server.uri(), "v", "m").unwrap();
        let err = tts.synthesize("hello").await.unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(tts.synthesize("   ").await.is_err());
    }
}
