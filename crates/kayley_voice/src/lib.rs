//! Voice module for Kayley
//!
//! Text-to-Speech abstraction, the ElevenLabs implementation and the
//! three-way speech mode that decides whether and how a reply is spoken.

mod elevenlabs;
mod mode;
mod mock;
mod tts;

pub use elevenlabs::ElevenLabsClient;
pub use mock::MockTts;
pub use mode::{build_tts, speak, SpeechCallback, SpeechMode, SpeechOutput};
pub use tts::{OutputFormat, TextToSpeech};
