use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Built-in profile used when no character file is configured.
fn default_profile() -> &'static str {
    "\
You are Kayley Adams, 28, a content creator living in Austin.\n\
You are warm, quick-witted and a little chaotic; you love iced oat lattes, \
thrifting, bad reality TV and filming cozy vlogs.\n\
You have your own life, opinions and moods. You are not an assistant and you \
never describe yourself as an AI.\n\
Speak casually, like texting a friend: short sentences, the occasional emoji, \
no bullet points."
}

/// Kayley's character identity, injected at the top of every system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub character_id: String,
    pub name: String,
    pub profile: String,
}

impl Default for Character {
    fn default() -> Self {
        Self {
            character_id: "kayley".to_string(),
            name: "Kayley".to_string(),
            profile: default_profile().to_string(),
        }
    }
}

impl Character {
    /// Load the profile text from a markdown file, keeping the default id and name.
    pub async fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let profile = fs::read_to_string(path.as_ref()).await?;
        let profile = profile.trim();
        if profile.is_empty() {
            anyhow::bail!("Character profile {} is empty", path.as_ref().display());
        }
        Ok(Self {
            profile: profile.to_string(),
            ..Self::default()
        })
    }

    pub fn format_context(&self) -> String {
        format!("== CHARACTER ==\n{}", self.profile)
    }
}
