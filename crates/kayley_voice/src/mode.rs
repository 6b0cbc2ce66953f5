//! Whether a reply is spoken, and whether the caller waits for it.

use crate::elevenlabs::ElevenLabsClient;
use crate::tts::TextToSpeech;
use anyhow::Result;
use kayley_core::config::{SpeechModeSetting, VoiceConfig};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechOutput {
    pub audio_base64: String,
    pub mime_type: &'static str,
}

/// Receives audio synthesized in the background.
pub type SpeechCallback = Arc<dyn Fn(SpeechOutput) + Send + Sync>;

#[derive(Clone)]
pub enum SpeechMode {
    /// Synthesize before the turn returns.
    Sync,
    /// Return at once; the callback gets the audio when it is ready.
    Async(SpeechCallback),
    Off,
}

impl fmt::Debug for SpeechMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeechMode::Sync => write!(f, "Sync"),
            SpeechMode::Async(_) => write!(f, "Async(<callback>)"),
            SpeechMode::Off => write!(f, "Off"),
        }
    }
}

impl SpeechMode {
    /// Async without a callback has nowhere to deliver audio and degrades to Off.
    pub fn from_setting(setting: SpeechModeSetting, callback: Option<SpeechCallback>) -> Self {
        match (setting, callback) {
            (SpeechModeSetting::Sync, _) => SpeechMode::Sync,
            (SpeechModeSetting::Async, Some(cb)) => SpeechMode::Async(cb),
            (SpeechModeSetting::Async, None) => {
                tracing::warn!("Async speech configured without a callback, speech disabled");
                SpeechMode::Off
            }
            (SpeechModeSetting::Off, _) => SpeechMode::Off,
        }
    }

    pub fn is_off(&self) -> bool {
        matches!(self, SpeechMode::Off)
    }
}

/// Build the configured TTS engine, or `None` when speech is off or unkeyed.
pub fn build_tts(config: &VoiceConfig) -> Result<Option<Arc<dyn TextToSpeech>>> {
    if config.mode == SpeechModeSetting::Off {
        return Ok(None);
    }
    let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) else {
        tracing::warn!("ELEVENLABS_API_KEY not set, speech disabled");
        return Ok(None);
    };
    let client = ElevenLabsClient::new(key, &config.base_url, &config.voice_id, &config.model_id)?;
    Ok(Some(Arc::new(client)))
}

async fn synthesize(tts: &dyn TextToSpeech, text: &str) -> Option<SpeechOutput> {
    match tts.synthesize_base64(text).await {
        Ok(audio_base64) => Some(SpeechOutput {
            audio_base64,
            mime_type: tts.default_format().mime_type(),
        }),
        Err(e) => {
            tracing::warn!(provider = tts.provider_name(), "Speech synthesis failed: {:#}", e);
            None
        }
    }
}

/// Speak `text` according to `mode`. Only `Sync` returns audio; failures are
/// logged and yield `None`.
pub async fn speak(mode: &SpeechMode, tts: Option<&Arc<dyn TextToSpeech>>, text: &str) -> Option<SpeechOutput> {
    let tts = tts?;
    if text.trim().is_empty() {
        return None;
    }
    match mode {
        SpeechMode::Off => None,
        SpeechMode::Sync => synthesize(&**tts, text).await,
        SpeechMode::Async(callback) => {
            let tts = tts.clone();
            let callback = callback.clone();
            let text = text.to_string();
            tokio::spawn(async move {
                if let Some(output) = synthesize(&*tts, &text).await {
                    callback(output);
                }
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTts;
    use tokio::sync::mpsc;

    fn mock() -> Arc<dyn TextToSpeech> {
        Arc::new(MockTts::new())
    }

    #[tokio::test]
    async fn test_sync_returns_audio() {
        let tts = mock();
        let out = speak(&SpeechMode::Sync, Some(&tts), "hey").await.unwrap();
        assert_eq!(out.audio_base64, "aGV5");
        assert_eq!(out.mime_type, "audio/mpeg");
        assert!(speak(&SpeechMode::Off, Some(&tts), "hey").await.is_none());
        assert!(speak(&SpeechMode::Sync, None, "hey").await.is_none());
    }

    #[tokio::test]
    async fn test_async_delivers_through_callback() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mode = SpeechMode::Async(Arc::new(move |out: SpeechOutput| {
            let _ = tx.send(out);
        }));
        let tts = mock();
        assert!(speak(&mode, Some(&tts), "later").await.is_none());
        assert_eq!(rx.recv().await.unwrap().audio_base64, "bGF0ZXI=");
    }

    #[tokio::test]
    async fn test_sync_failure_is_swallowed() {
        let tts: Arc<dyn TextToSpeech> = Arc::new(MockTts::failing());
        assert!(speak(&SpeechMode::Sync, Some(&tts), "hey").await.is_none());
    }

    #[test]
    fn test_mode_from_setting() {
        assert!(SpeechMode::from_setting(SpeechModeSetting::Async, None).is_off());
        assert!(matches!(SpeechMode::from_setting(SpeechModeSetting::Sync, None), SpeechMode::Sync));

        let cfg = VoiceConfig {
            mode: SpeechModeSetting::Sync,
            api_key: None,
            ..Default::default()
        };
        assert!(build_tts(&cfg).unwrap().is_none());
        let cfg = VoiceConfig {
            api_key: Some("k".into()),
            ..cfg
        };
        assert_eq!(build_tts(&cfg).unwrap().unwrap().provider_name(), "elevenlabs");
    }
}
