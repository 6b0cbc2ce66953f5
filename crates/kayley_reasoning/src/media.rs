//! Selfie and video generation against the xAI media endpoints.

use crate::api_types::{SelfieAction, VideoAction};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{sleep, Instant};

pub const XAI_BASE_URL: &str = "https://api.x.ai/v1";
pub const IMAGE_MODEL: &str = "grok-2-image";
pub const VIDEO_MODEL: &str = "grok-imagine-video";
pub const VIDEO_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const VIDEO_MAX_WAIT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMedia {
    pub kind: MediaKind,
    pub url: String,
}

#[async_trait]
pub trait MediaGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedMedia>;
    async fn generate_video(&self, prompt: &str, image_url: Option<&str>) -> Result<GeneratedMedia>;
}

/// Poll state of an asynchronous video job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoStatus {
    Pending,
    Completed { url: String },
    Failed { error: String },
}

pub fn parse_video_status(body: &Value) -> Result<VideoStatus> {
    match body["status"].as_str() {
        Some("completed") => {
            let url = body["url"]
                .as_str()
                .or_else(|| body["video"]["url"].as_str())
                .context("Video completed without a url")?;
            Ok(VideoStatus::Completed { url: url.to_string() })
        }
        Some("failed") => Ok(VideoStatus::Failed {
            error: body["error"].as_str().unwrap_or("unknown error").to_string(),
        }),
        _ => Ok(VideoStatus::Pending),
    }
}

pub fn video_request_body(prompt: &str, image_url: Option<&str>) -> Value {
    let mut body = json!({
        "model": VIDEO_MODEL,
        "prompt": prompt,
        "duration": 5,
        "aspect_ratio": "9:16",
        "resolution": "720p",
    });
    if let Some(url) = image_url {
        body["image"] = json!({ "url": url });
    }
    body
}

/// Turn a selfie request into an image prompt of the character in the scene.
pub fn selfie_prompt(character_name: &str, selfie: &SelfieAction) -> String {
    let mut prompt = format!(
        "A candid smartphone selfie of {}, a 28-year-old woman with curly brown hair, {}.",
        character_name,
        selfie.scene.trim_end_matches('.')
    );
    if let Some(mood) = selfie.mood.as_deref().filter(|m| !m.is_empty()) {
        prompt.push_str(&format!(" Her expression is {}.", mood));
    }
    prompt.push_str(" Natural lighting, vertical framing, realistic photo.");
    prompt
}

pub fn video_prompt(video: &VideoAction) -> String {
    video.prompt.trim().to_string()
}

pub struct XaiMediaClient {
    client: Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl XaiMediaClient {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(120)).build()?,
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or(XAI_BASE_URL).trim_end_matches('/').to_string(),
            poll_interval: VIDEO_POLL_INTERVAL,
            max_wait: VIDEO_MAX_WAIT,
        })
    }

    pub fn with_polling(mut self, interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = interval;
        self.max_wait = max_wait;
        self
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", path))?;
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::ACCEPTED {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("xAI {} returned {}: {}", path, status, text);
        }
        response.json().await.context("Failed to parse xAI response")
    }

    async fn poll_video(&self, request_id: &str) -> Result<String> {
        let url = format!("{}/videos/{}", self.base_url, request_id);
        let started = Instant::now();
        while started.elapsed() < self.max_wait {
            let response = self.client.get(&url).bearer_auth(&self.api_key).send().await?;
            let status = response.status();
            if status != StatusCode::OK && status != StatusCode::ACCEPTED {
                let text = response.text().await.unwrap_or_default();
                anyhow::bail!("Video poll returned {}: {}", status, text);
            }
            let body: Value = response.json().await.context("Failed to parse video poll")?;
            match parse_video_status(&body)? {
                VideoStatus::Completed { url } => return Ok(url),
                VideoStatus::Failed { error } => anyhow::bail!("Video generation failed: {}", error),
                VideoStatus::Pending => {
                    tracing::debug!(request_id, elapsed = ?started.elapsed(), "Video still rendering");
                    sleep(self.poll_interval).await;
                }
            }
        }
        anyhow::bail!("Video generation timed out after {:?}", self.max_wait)
    }
}

#[async_trait]
impl MediaGenerator for XaiMediaClient {
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedMedia> {
        let body = json!({
            "model": IMAGE_MODEL,
            "prompt": prompt,
            "n": 1,
            "response_format": "url",
        });
        let response = self.post("/images/generations", &body).await?;
        let url = response["data"][0]["url"]
            .as_str()
            .context("Image response had no url")?;
        Ok(GeneratedMedia {
            kind: MediaKind::Image,
            url: url.to_string(),
        })
    }

    async fn generate_video(&self, prompt: &str, image_url: Option<&str>) -> Result<GeneratedMedia> {
        let started = self.post("/videos/generations", &video_request_body(prompt, image_url)).await?;
        let request_id = started["request_id"]
            .as_str()
            .context("Video response had no request_id")?;
        tracing::info!(request_id, "Video generation started");
        let url = self.poll_video(request_id).await?;
        Ok(GeneratedMedia {
            kind: MediaKind::Video,
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> XaiMediaClient {
        XaiMediaClient::new("key", Some(&server.uri()))
            .unwrap()
            .with_polling(Duration::from_millis(5), Duration::from_secs(5))
    }

    #[test]
    fn test_video_body() {
        let body = video_request_body("wave", Some("https://x/img.png"));
        assert_eq!(body["model"], VIDEO_MODEL);
        assert_eq!(body["duration"], 5);
        assert_eq!(body["aspect_ratio"], "9:16");
        assert_eq!(body["resolution"], "720p");
        assert_eq!(body["image"]["url"], "https://x/img.png");
        assert!(video_request_body("wave", None).get("image").is_none());
    }

    #[test]
    fn test_video_status() {
        assert_eq!(
            parse_video_status(&json!({"status": "completed", "url": "u"})).unwrap(),
            VideoStatus::Completed { url: "u".into() }
        );
        assert_eq!(
            parse_video_status(&json!({"status": "failed", "error": "nsfw"})).unwrap(),
            VideoStatus::Failed { error: "nsfw".into() }
        );
        assert_eq!(parse_video_status(&json!({"status": "processing"})).unwrap(), VideoStatus::Pending);
        assert!(parse_video_status(&json!({"status": "completed"})).is_err());
    }

    #[test]
    fn test_selfie_prompt() {
        let p = selfie_prompt(
            "Kayley",
            &SelfieAction {
                scene: "at a coffee shop.".into(),
                mood: Some("playful".into()),
            },
        );
        assert!(p.contains("Kayley"));
        assert!(p.contains("at a coffee shop."));
        assert!(p.contains("playful"));
    }

    #[tokio::test]
    async fn test_image_generation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .and(header("authorization", "Bearer key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"url": "https://img/1.png"}]})))
            .mount(&server)
            .await;

        let media = client(&server).generate_image("selfie").await.unwrap();
        assert_eq!(media.kind, MediaKind::Image);
        assert_eq!(media.url, "https://img/1.png");
    }

    #[tokio::test]
    async fn test_video_polls_until_complete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/videos/generations"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"request_id": "req-1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/videos/req-1"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({"status": "processing"})))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/videos/req-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "completed", "url": "https://v/1.mp4"})))
            .mount(&server)
            .await;

        let media = client(&server).generate_video("wave", None).await.unwrap();
        assert_eq!(media.url, "https://v/1.mp4");
    }

    #[tokio::test]
    async fn test_video_poll_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/videos/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"request_id": "req-2"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/videos/req-2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(client(&server).generate_video("wave", None).await.is_err());
    }
}
