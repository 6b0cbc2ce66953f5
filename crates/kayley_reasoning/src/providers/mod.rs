pub mod gemini;
pub mod grok;
pub mod mock;

pub use gemini::GeminiClient;
pub use grok::{GrokClient, TEXT_ONLY_APOLOGY};
pub use mock::MockProvider;

use crate::llm::{ChatProvider, LlmClient};
use anyhow::{Context, Result};
use kayley_core::config::LlmConfig;
use std::sync::Arc;

/// The configured provider, seen through both boundaries.
#[derive(Clone)]
pub struct ProviderHandles {
    pub chat: Arc<dyn ChatProvider>,
    pub llm: Arc<dyn LlmClient>,
}

impl ProviderHandles {
    pub fn from_shared<P: ChatProvider + LlmClient + 'static>(provider: Arc<P>) -> Self {
        Self {
            chat: provider.clone(),
            llm: provider,
        }
    }
}

pub fn build_provider(config: &LlmConfig) -> Result<ProviderHandles> {
    match config.provider.as_str() {
        "grok" => {
            let key = config
                .xai_api_key
                .as_deref()
                .context("XAI_API_KEY is required for the grok provider")?;
            let client = GrokClient::new(key, config.base_url.as_deref(), &config.model)?;
            Ok(ProviderHandles::from_shared(Arc::new(client)))
        }
        "gemini" => {
            let key = config
                .gemini_api_key
                .as_deref()
                .context("GEMINI_API_KEY is required for the gemini provider")?;
            let client = GeminiClient::new(key, config.base_url.as_deref(), &config.model)?;
            Ok(ProviderHandles::from_shared(Arc::new(client)))
        }
        "mock" => Ok(ProviderHandles::from_shared(Arc::new(MockProvider::new()))),
        other => anyhow::bail!("Unknown LLM provider '{}' (expected grok, gemini or mock)", other),
    }
}
