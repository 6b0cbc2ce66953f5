use crate::tts::TextToSpeech;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Deterministic TTS: the "audio" is the UTF-8 text itself.
#[derive(Default)]
pub struct MockTts {
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl MockTts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextToSpeech for MockTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("mock tts failure");
        }
        Ok(text.as_bytes().to_vec())
    }

    fn voice_id(&self) -> &str {
        "mock"
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
