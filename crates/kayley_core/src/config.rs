use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KayleyConfig {
    pub llm: LlmConfig,
    pub voice: VoiceConfig,
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    pub schedule: ScheduleConfig,
    pub character: CharacterConfig,
}

impl KayleyConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: KayleyConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("LLM_MAX_TOKENS") {
            if let Ok(n) = v.parse() {
                self.llm.max_tokens = n;
            }
        }
        if let Ok(v) = std::env::var("LLM_TEMPERATURE") {
            if let Ok(n) = v.parse() {
                self.llm.temperature = n;
            }
        }
        if let Ok(v) = std::env::var("XAI_API_KEY") {
            self.llm.xai_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("GEMINI_API_KEY") {
            self.llm.gemini_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("ELEVENLABS_API_KEY") {
            self.voice.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("KAYLEY_DB_PATH") {
            self.storage.db_path = v;
        }
        if let Ok(v) = std::env::var("KAYLEY_USER_ID") {
            self.storage.user_id = v;
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "grok", "gemini" or "mock"
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub xai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Number of most recent history turns sent with each request.
    pub history_window: usize,
    /// Model used for the cheap intent pre-pass.
    pub intent_model: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "grok".to_string(),
            model: "grok-4-fast-reasoning".to_string(),
            base_url: None,
            xai_api_key: None,
            gemini_api_key: None,
            max_tokens: 1024,
            temperature: 0.8,
            history_window: 20,
            intent_model: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechModeSetting {
    /// Synthesize before returning the turn.
    Sync,
    /// Return immediately, deliver audio through a callback.
    Async,
    /// No speech.
    #[default]
    Off,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub mode: SpeechModeSetting,
    pub voice_id: String,
    pub model_id: String,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            mode: SpeechModeSetting::Off,
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model_id: "eleven_flash_v2_5".to_string(),
            api_key: None,
            base_url: "https://api.elevenlabs.io/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub user_id: String,
    /// TTL of the in-memory thread cache.
    pub cache_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "kayley.db".to_string(),
            user_id: "default_user".to_string(),
            cache_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub intent_cache_ttl_secs: u64,
    pub intent_cache_capacity: usize,
    /// Confidence at which a genuine moment shifts mood before the prompt is built.
    pub genuine_moment_threshold: f32,
    pub background_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            intent_cache_ttl_secs: 300,
            intent_cache_capacity: 128,
            genuine_moment_threshold: 0.8,
            background_queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Hour (local, 0-23) for the daily catch-up prompt.
    pub daily_catchup_hour: u32,
    pub daily_catchup_minute: u32,
    /// How often upcoming calendar events are checked for check-ins.
    pub checkin_poll_secs: u64,
    /// Proactive messages are only sent inside these local hours.
    pub active_start_hour: u32,
    pub active_end_hour: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            daily_catchup_hour: 9,
            daily_catchup_minute: 0,
            checkin_poll_secs: 300,
            active_start_hour: 8,
            active_end_hour: 23,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    /// Optional markdown file replacing the built-in character profile.
    pub profile_path: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = KayleyConfig::default();
        assert_eq!(cfg.llm.provider, "grok");
        assert_eq!(cfg.llm.history_window, 20);
        assert_eq!(cfg.storage.cache_ttl_secs, 60);
        assert_eq!(cfg.voice.mode, SpeechModeSetting::Off);
        assert!(cfg.character.profile_path.is_none());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[llm]
provider = "gemini"
model = "gemini-2.5-flash"
"#;
        let cfg: KayleyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.llm.provider, "gemini");
        assert_eq!(cfg.llm.model, "gemini-2.5-flash");
        // Defaults for unspecified fields
        assert_eq!(cfg.llm.max_tokens, 1024);
        assert_eq!(cfg.storage.db_path, "kayley.db");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[llm]
provider = "grok"
model = "grok-3"
base_url = "https://api.x.ai/v1"
max_tokens = 2048
temperature = 0.9
history_window = 10

[voice]
mode = "sync"
voice_id = "abc"

[storage]
db_path = "data/kayley.db"
user_id = "steven"
cache_ttl_secs = 30

[engine]
genuine_moment_threshold = 0.9

[schedule]
daily_catchup_hour = 8
checkin_poll_secs = 60

[character]
profile_path = "persona/kayley.md"
"#;
        let cfg: KayleyConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.llm.max_tokens, 2048);
        assert_eq!(cfg.llm.history_window, 10);
        assert_eq!(cfg.voice.mode, SpeechModeSetting::Sync);
        assert_eq!(cfg.voice.voice_id, "abc");
        assert_eq!(cfg.storage.user_id, "steven");
        assert_eq!(cfg.storage.cache_ttl_secs, 30);
        assert!((cfg.engine.genuine_moment_threshold - 0.9).abs() < 1e-6);
        assert_eq!(cfg.schedule.daily_catchup_hour, 8);
        assert_eq!(cfg.schedule.daily_catchup_minute, 0);
        assert_eq!(cfg.character.profile_path.as_deref(), Some("persona/kayley.md"));
    }

    #[test]
    fn test_env_overrides_and_defaults() {
        // Part 1: env overrides
        std::env::set_var("LLM_PROVIDER", "mock");
        std::env::set_var("KAYLEY_USER_ID", "env-user");

        let mut cfg = KayleyConfig::default();
        cfg.apply_env_overrides();

        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.storage.user_id, "env-user");

        std::env::remove_var("LLM_PROVIDER");
        std::env::remove_var("KAYLEY_USER_ID");

        // Part 2: nonexistent path returns defaults (no env interference)
        let cfg = KayleyConfig::load_or_default("/nonexistent/path.toml");
        assert_eq!(cfg.llm.provider, "grok");
    }
}
