//! Speech synthesis boundary: text in, audio bytes out.

use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Mp3,
    Pcm,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "audio/mpeg",
            OutputFormat::Pcm => "audio/pcm",
        }
    }
}

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Raw audio in [`TextToSpeech::default_format`].
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Audio as standard base64, the form handed to clients.
    async fn synthesize_base64(&self, text: &str) -> Result<String> {
        let audio = self.synthesize(text).await?;
        Ok(BASE64.encode(audio))
    }

    fn default_format(&self) -> OutputFormat {
        OutputFormat::Mp3
    }

    fn voice_id(&self) -> &str;

    fn provider_name(&self) -> &'static str;
}
