//! Per-message intent pre-pass.
//!
//! One cheap LLM call classifies sentiment and a few relationship signals.
//! Results are cached by a sha256 of message + context; when the call or its
//! parsing fails, keyword rules fill in so the turn never waits on a retry.

use crate::llm::{CompletionParams, LlmClient};
use anyhow::{Context, Result};
use kayley_core::sentiment::analyze_sentiment;
use regex::Regex;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

static GENUINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(you mean (so much|a lot|everything) to me|i (really )?love talking to you|you (really )?get me|you always make me feel|i'?m (so )?glad i (met|found) you|you'?re the best)\b").unwrap()
});
static JOKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\b(lol|lmao|haha+|jk|just kidding)\b|😂|🤣)").unwrap());
static VULNERABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(i'?ve never told anyone|i'?m scared|i feel (so )?alone|i'?m struggling|honestly i'?m not ok)\b").unwrap()
});
static SUPPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(i need (some )?(advice|help)|what should i do|can i vent|rough (day|week))\b").unwrap()
});
static TOPIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(work|job|school|family|mom|dad|dating|boyfriend|girlfriend|health|money)\b").unwrap());

const INTENT_SYSTEM_PROMPT: &str = r#"You classify one chat message sent to a companion character.
Reply with JSON only:
{"sentiment": -1.0..1.0, "intensity": 0.0..1.0,
 "genuine_moment": {"category": "appreciation|affection|trust|gratitude", "confidence": 0.0..1.0} or null,
 "is_joke": bool, "is_vulnerable": bool, "seeking_support": bool,
 "topics": ["short", "nouns"]}
A genuine moment is the user sincerely expressing that the character matters to them."#;

/// Confidence assigned to a genuine moment found by keyword rules.
pub const FALLBACK_GENUINE_CONFIDENCE: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentSource {
    Llm,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenuineMoment {
    pub category: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageIntent {
    /// -1.0 - 1.0
    pub sentiment: f32,
    pub intensity: f32,
    pub genuine_moment: Option<GenuineMoment>,
    pub is_joke: bool,
    pub is_vulnerable: bool,
    pub seeking_support: bool,
    pub topics: Vec<String>,
    pub source: IntentSource,
}

impl MessageIntent {
    pub fn is_genuine_at(&self, threshold: f32) -> bool {
        self.genuine_moment
            .as_ref()
            .is_some_and(|g| g.confidence.is_finite() && g.confidence >= threshold)
    }
}

#[derive(Debug, Deserialize)]
struct RawIntent {
    #[serde(default)]
    sentiment: f32,
    #[serde(default)]
    intensity: f32,
    #[serde(default)]
    genuine_moment: Option<GenuineMoment>,
    #[serde(default)]
    is_joke: bool,
    #[serde(default)]
    is_vulnerable: bool,
    #[serde(default)]
    seeking_support: bool,
    #[serde(default)]
    topics: Vec<String>,
}

fn finite_or(v: f32, default: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        default
    }
}

impl From<RawIntent> for MessageIntent {
    fn from(raw: RawIntent) -> Self {
        Self {
            sentiment: finite_or(raw.sentiment, 0.0).clamp(-1.0, 1.0),
            intensity: finite_or(raw.intensity, 0.0).clamp(0.0, 1.0),
            genuine_moment: raw.genuine_moment.map(|g| GenuineMoment {
                confidence: finite_or(g.confidence, 0.0).clamp(0.0, 1.0),
                category: g.category,
            }),
            is_joke: raw.is_joke,
            is_vulnerable: raw.is_vulnerable,
            seeking_support: raw.seeking_support,
            topics: raw.topics,
            source: IntentSource::Llm,
        }
    }
}

fn parse_intent(text: &str) -> Option<MessageIntent> {
    let trimmed = text.trim();
    if let Ok(raw) = serde_json::from_str::<RawIntent>(trimmed) {
        return Some(raw.into());
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if start >= end {
        return None;
    }
    serde_json::from_str::<RawIntent>(&trimmed[start..=end]).ok().map(Into::into)
}

/// Keyword-only classification.
pub fn fallback_intent(message: &str) -> MessageIntent {
    let (sentiment, intensity) = analyze_sentiment(message);
    let genuine_moment = GENUINE_RE.find(message).map(|_| GenuineMoment {
        category: "appreciation".to_string(),
        confidence: FALLBACK_GENUINE_CONFIDENCE,
    });
    let mut topics: Vec<String> = TOPIC_RE
        .find_iter(message)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    topics.dedup();
    MessageIntent {
        sentiment,
        intensity,
        genuine_moment,
        is_joke: JOKE_RE.is_match(message),
        is_vulnerable: VULNERABLE_RE.is_match(message),
        seeking_support: SUPPORT_RE.is_match(message),
        topics,
        source: IntentSource::Fallback,
    }
}

pub fn cache_key(message: &str, context: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hasher.update([0u8]);
    hasher.update(context.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// TTL cache bounded by insertion order.
pub struct IntentCache {
    entries: HashMap<String, (Instant, MessageIntent)>,
    order: VecDeque<String>,
    capacity: usize,
    ttl: Duration,
}

impl IntentCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<MessageIntent> {
        let (at, intent) = self.entries.get(key)?;
        if at.elapsed() < self.ttl {
            return Some(intent.clone());
        }
        self.entries.remove(key);
        self.order.retain(|k| k != key);
        None
    }

    pub fn insert(&mut self, key: String, intent: MessageIntent) {
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        }
        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, (Instant::now(), intent));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct IntentAnalyzer {
    client: Arc<dyn LlmClient>,
    cache: Mutex<IntentCache>,
}

impl IntentAnalyzer {
    pub fn new(client: Arc<dyn LlmClient>, capacity: usize, ttl: Duration) -> Self {
        Self {
            client,
            cache: Mutex::new(IntentCache::new(capacity, ttl)),
        }
    }

    fn cache(&self) -> MutexGuard<'_, IntentCache> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Never fails: LLM or parse errors fall back to keyword rules.
    pub async fn analyze(&self, message: &str, context: &str) -> MessageIntent {
        let key = cache_key(message, context);
        if let Some(hit) = self.cache().get(&key) {
            tracing::debug!("Intent cache hit: key={}", &key[..8]);
            return hit;
        }

        let intent = match self.analyze_llm(message, context).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!("Intent analysis failed, using keyword fallback: {:#}", e);
                // Fallbacks are not cached so the next turn retries the LLM
                return fallback_intent(message);
            }
        };
        self.cache().insert(key, intent.clone());
        intent
    }

    async fn analyze_llm(&self, message: &str, context: &str) -> Result<MessageIntent> {
        let user = if context.is_empty() {
            format!("Message: {}", message)
        } else {
            format!("Previous reply: {}\nMessage: {}", context, message)
        };
        let params = CompletionParams {
            max_tokens: 256,
            temperature: 0.1,
        };
        let text = self
            .client
            .complete(INTENT_SYSTEM_PROMPT, &user, params)
            .await
            .context("Intent LLM call failed")?;
        parse_intent(&text).with_context(|| format!("Unparseable intent reply: {}", text.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockProvider;

    #[test]
    fn test_cache_key_depends_on_context() {
        assert_eq!(cache_key("hi", "a"), cache_key("hi", "a"));
        assert_ne!(cache_key("hi", "a"), cache_key("hi", "b"));
        assert_ne!(cache_key("hia", ""), cache_key("hi", "a"));
        assert_eq!(cache_key("x", "").len(), 64);
    }

    #[test]
    fn test_parse_and_clamp() {
        let intent = parse_intent(
            r#"Sure: {"sentiment": 3.0, "intensity": 0.5, "genuine_moment": {"category": "trust", "confidence": 0.9}, "is_joke": true}"#,
        )
        .unwrap();
        assert_eq!(intent.sentiment, 1.0);
        assert!(intent.is_joke);
        assert!(intent.is_genuine_at(0.8));
        assert!(parse_intent("no json").is_none());
    }

    #[test]
    fn test_fallback_detection() {
        let intent = fallback_intent("honestly you mean so much to me lol");
        assert_eq!(intent.source, IntentSource::Fallback);
        assert!(intent.is_genuine_at(0.8));
        assert!(intent.is_joke);
        let plain = fallback_intent("what's for dinner");
        assert!(plain.genuine_moment.is_none());
    }

    #[test]
    fn test_cache_evicts_in_insertion_order() {
        let mut cache = IntentCache::new(2, Duration::from_secs(60));
        let i = fallback_intent("x");
        cache.insert("a".into(), i.clone());
        cache.insert("b".into(), i.clone());
        cache.insert("c".into(), i);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_ttl() {
        let mut cache = IntentCache::new(4, Duration::from_secs(300));
        cache.insert("k".into(), fallback_intent("x"));
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get("k").is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_analyzer_caches_llm_results_only() {
        let mock = Arc::new(MockProvider::new());
        mock.push_completion(r#"{"sentiment": 0.6, "intensity": 0.4, "topics": ["work"]}"#);
        let analyzer = IntentAnalyzer::new(mock.clone(), 8, Duration::from_secs(300));

        let first = analyzer.analyze("work was great", "").await;
        assert_eq!(first.source, IntentSource::Llm);
        // Served from cache: the mock has nothing left to return
        let second = analyzer.analyze("work was great", "").await;
        assert_eq!(second, first);

        let failed = analyzer.analyze("something else", "").await;
        assert_eq!(failed.source, IntentSource::Fallback);
    }
}
