//! # Kayley Reasoning
//!
//! Prompt construction and the per-turn orchestration pipeline: provider
//! boundary and implementations, intent pre-pass, system and greeting
//! prompts, action routing, media generation and the background queue.

pub mod actions;
pub mod api_types;
pub mod background;
pub mod greeting;
pub mod intent;
pub mod llm;
pub mod media;
pub mod orchestrator;
pub mod prompts;
pub mod providers;

pub use api_types::{AiActionResponse, UserContent};
pub use llm::{ChatProvider, ChatSession, LlmClient};
pub use orchestrator::{Orchestrator, TurnContext, TurnResult};
