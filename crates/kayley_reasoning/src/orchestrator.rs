//! Per-turn pipeline: intent, mood, surfacing, prompt, provider, actions,
//! background analysis, speech.
//!
//! Only the provider call can fail a turn. Everything else degrades to a
//! default and logs a warning.

use crate::actions::{ActionOutcome, ActionRouter, CALENDAR_LOOKAHEAD_DAYS};
use crate::api_types::{AiActionResponse, UserContent};
use crate::background::BackgroundQueue;
use crate::greeting::{build_greeting_prompt, GreetingContext, PendingKind, PendingMessage};
use crate::intent::{fallback_intent, IntentAnalyzer, MessageIntent};
use crate::llm::{ChatProvider, ChatRequest, ChatSession, CompletionParams};
use crate::media::MediaGenerator;
use crate::prompts::{build_system_prompt, SystemPromptContext};
use crate::providers::ProviderHandles;
use chrono::{DateTime, Duration, Local, Timelike, Utc};
use kayley_core::{
    CalendarClient, Character, ChatRole, ChatTurn, KayleyConfig, KayleyError, MilestoneType, MoodState,
    OngoingThread, RelationshipMetrics, TaskClient, Timestamp,
};
use kayley_expression::{
    ActivityClock, BriefingTracker, CheckinKind, GreetingContent, PresenceTracker, ProactiveEvent, SurfacedItem,
    SurfacingPlanner,
};
use kayley_memory::{
    CompanionStore, MilestoneTracker, NarrativeArcService, OpenLoopTracker, PatternTracker, ThreadCache, ThreadManager,
};
use kayley_voice::{speak, SpeechMode, SpeechOutput, TextToSpeech};
use std::future::Future;
use std::sync::Arc;

/// Flag holding a JSON [`PendingMessage`] for the next greeting.
pub const PENDING_MESSAGE_KEY: &str = "pending_message";
/// Flag holding the RFC3339 time of the very first user message.
pub const FIRST_INTERACTION_KEY: &str = "first_interaction_at";

const LIFE_EVENTS_IN_PROMPT: usize = 5;
const GREETING_INPUT: &str = "(They just opened the chat. Send the first message.)";

#[derive(Debug, Clone)]
pub struct TurnContext {
    pub session: ChatSession,
    pub user_name: Option<String>,
    pub now: Timestamp,
}

impl TurnContext {
    pub fn new(session: ChatSession) -> Self {
        Self {
            session,
            user_name: None,
            now: Utc::now(),
        }
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = Some(name.to_string());
        self
    }

    pub fn at(mut self, now: Timestamp) -> Self {
        self.now = now;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TurnResult {
    pub response: AiActionResponse,
    pub session: ChatSession,
    /// `None` for greetings.
    pub intent: Option<MessageIntent>,
    pub surfaced: Option<SurfacedItem>,
    pub actions: Vec<ActionOutcome>,
    pub speech: Option<SpeechOutput>,
}

pub struct Orchestrator {
    store: Arc<dyn CompanionStore>,
    chat: Arc<dyn ChatProvider>,
    intent: IntentAnalyzer,
    planner: SurfacingPlanner,
    threads: Arc<ThreadManager>,
    patterns: Arc<PatternTracker>,
    milestones: Arc<MilestoneTracker>,
    open_loops: Arc<OpenLoopTracker>,
    arcs: NarrativeArcService,
    presence: Arc<PresenceTracker>,
    briefing: BriefingTracker,
    actions: ActionRouter,
    background: BackgroundQueue,
    activity: ActivityClock,
    character: Character,
    speech: SpeechMode,
    tts: Option<Arc<dyn TextToSpeech>>,
    params: CompletionParams,
    history_window: usize,
    genuine_threshold: f32,
}

impl Orchestrator {
    /// Wire every tracker onto one store. Spawns the background worker, so it
    /// must be called inside a tokio runtime.
    pub fn new(
        config: &KayleyConfig,
        store: Arc<dyn CompanionStore>,
        providers: ProviderHandles,
        calendar: Arc<dyn CalendarClient>,
        tasks: Arc<dyn TaskClient>,
    ) -> Self {
        let cache = ThreadCache::new(
            store.clone(),
            std::time::Duration::from_secs(config.storage.cache_ttl_secs),
        );
        let threads = Arc::new(ThreadManager::new(cache));
        let patterns = Arc::new(PatternTracker::new(store.clone()));
        let milestones = Arc::new(MilestoneTracker::new(store.clone(), &config.storage.user_id));
        let open_loops = Arc::new(OpenLoopTracker::new(store.clone()));
        let planner = SurfacingPlanner::new(threads.clone(), patterns.clone(), milestones.clone(), open_loops.clone());
        let intent = IntentAnalyzer::new(
            providers.llm.clone(),
            config.engine.intent_cache_capacity,
            std::time::Duration::from_secs(config.engine.intent_cache_ttl_secs),
        );

        Self {
            arcs: NarrativeArcService::new(store.clone()),
            presence: Arc::new(PresenceTracker::new(store.clone())),
            briefing: BriefingTracker::new(store.clone()),
            actions: ActionRouter::new(calendar, tasks),
            background: BackgroundQueue::spawn(config.engine.background_queue_capacity),
            activity: ActivityClock::new(),
            character: Character::default(),
            speech: SpeechMode::Off,
            tts: None,
            params: CompletionParams {
                max_tokens: config.llm.max_tokens,
                temperature: config.llm.temperature,
            },
            history_window: config.llm.history_window,
            genuine_threshold: config.engine.genuine_moment_threshold,
            chat: providers.chat,
            store,
            intent,
            planner,
            threads,
            patterns,
            milestones,
            open_loops,
        }
    }

    pub fn set_character(&mut self, character: Character) {
        self.actions.set_character_name(&character.name);
        self.character = character;
    }

    pub fn set_speech(&mut self, mode: SpeechMode, tts: Option<Arc<dyn TextToSpeech>>) {
        self.speech = mode;
        self.tts = tts;
    }

    pub fn set_media(&mut self, media: Arc<dyn MediaGenerator>) {
        self.actions.set_media(media);
    }

    /// Fix the surfacing RNG for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.planner = self.planner.with_seed(seed);
        self
    }

    pub fn store(&self) -> &Arc<dyn CompanionStore> {
        &self.store
    }

    pub fn activity_clock(&self) -> ActivityClock {
        self.activity.clone()
    }

    pub fn presence(&self) -> Arc<PresenceTracker> {
        self.presence.clone()
    }

    pub fn calendar(&self) -> Arc<dyn CalendarClient> {
        self.actions.calendar().clone()
    }

    pub fn threads(&self) -> &Arc<ThreadManager> {
        &self.threads
    }

    pub fn arcs(&self) -> &NarrativeArcService {
        &self.arcs
    }

    /// Seed the activity clock from stored history after a restart.
    pub async fn restore_activity(&self) {
        match self.store.recent_turns(self.history_window.max(1)).await {
            Ok(turns) => {
                if let Some(last) = turns.iter().rev().find(|t| t.role == ChatRole::User) {
                    self.activity.touch(last.created_at);
                }
            }
            Err(e) => tracing::warn!("Could not restore last activity: {:#}", e),
        }
    }

    /// Wait for queued background jobs, then stop the worker.
    pub async fn shutdown(&self) {
        self.background.shutdown().await;
    }

    /// Resolve once all background work submitted so far has run.
    pub async fn flush_background(&self) {
        self.background.flush().await;
    }

    // ========================================================================
    // Turn
    // ========================================================================

    #[tracing::instrument(skip_all, fields(provider = self.chat.name()))]
    pub async fn process_message(&self, input: UserContent, ctx: TurnContext) -> Result<TurnResult, KayleyError> {
        let now = ctx.now;
        let previous_activity = self.activity.last();
        let history = or_default("history", self.store.recent_turns(self.history_window)).await;
        let message = input.as_text().unwrap_or_default().to_string();

        // 1. Intent and the synchronous mood update
        let last_reply = history
            .iter()
            .rev()
            .find(|t| t.role == ChatRole::Assistant)
            .map(|t| t.text.as_str())
            .unwrap_or_default();
        let intent = if message.trim().is_empty() {
            None
        } else {
            Some(self.intent.analyze(&message, last_reply).await)
        };
        let mood = self.update_mood(intent.as_ref(), now).await;

        // 2. Surfacing plan and system prompt
        let relationship = or_default("relationship", self.store.load_relationship()).await;
        let total = relationship.as_ref().map_or(0, |r| r.total_interactions);
        let (surfaced, threads) = self.plan_surfacing(total, now).await;
        let system_prompt = self.system_prompt(&ctx, relationship, mood, surfaced.clone(), &threads).await;

        // 3. Provider
        let request = ChatRequest {
            system_prompt,
            history,
            input,
            params: self.params,
        };
        let (response, session) = self.chat.generate(request, ctx.session).await?;

        // Surfacing is only recorded once the item actually reached a reply
        if let Some(item) = &surfaced {
            self.commit_surfaced(item, now).await;
        }

        // 4. Side effects
        let actions = self.actions.route(&response).await;

        // 5. Background analysis
        let heard = response
            .user_transcription
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .unwrap_or(message);
        self.submit_turn_jobs(heard, response.text_response.clone(), intent.clone(), previous_activity, now)
            .await;

        // 6. Speech
        let speech = speak(&self.speech, self.tts.as_ref(), &response.text_response).await;

        self.activity.touch(now);
        Ok(TurnResult {
            response,
            session,
            intent,
            surfaced,
            actions,
            speech,
        })
    }

    async fn update_mood(&self, intent: Option<&MessageIntent>, now: Timestamp) -> MoodState {
        let mut mood = or_default("mood", self.store.load_mood()).await.unwrap_or_default();
        let Some(intent) = intent else {
            mood.relax(now);
            return mood;
        };
        mood.record_interaction(intent.sentiment, now);
        if intent.is_genuine_at(self.genuine_threshold) {
            tracing::info!("Genuine moment detected, shifting mood");
            mood.apply_genuine_moment(now);
        }
        if let Err(e) = self.store.save_mood(&mood).await {
            tracing::warn!("Failed to persist mood: {:#}", e);
        }
        mood
    }

    /// Pick this turn's surfaced item without recording it; also returns the active threads.
    async fn plan_surfacing(&self, total: u32, now: Timestamp) -> (Option<SurfacedItem>, Vec<OngoingThread>) {
        match self.planner.plan(total, now).await {
            Ok((item, candidates)) => (item, candidates.threads),
            Err(e) => {
                tracing::warn!("Surfacing plan failed: {}", e);
                (None, Vec::new())
            }
        }
    }

    async fn commit_surfaced(&self, item: &SurfacedItem, now: Timestamp) {
        if let Err(e) = self.planner.commit(item, now).await {
            tracing::warn!("Failed to record surfaced {}: {}", item.kind(), e);
        }
    }

    async fn system_prompt(
        &self,
        ctx: &TurnContext,
        relationship: Option<RelationshipMetrics>,
        mood: MoodState,
        surfaced: Option<SurfacedItem>,
        threads: &[OngoingThread],
    ) -> String {
        let now = ctx.now;
        let calendar = self.actions.calendar().clone();
        let tasks = self.actions.tasks().clone();
        let (arcs, life_events, calendar, tasks) = tokio::join!(
            or_default("arcs", self.arcs.list(None)),
            or_default("life_events", self.store.recent_life_events(LIFE_EVENTS_IN_PROMPT)),
            or_default(
                "calendar",
                calendar.list_events(now - Duration::hours(1), now + Duration::days(CALENDAR_LOOKAHEAD_DAYS)),
            ),
            or_default("tasks", tasks.list()),
        );
        let current_thread = threads
            .iter()
            .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
            .cloned();

        let context = SystemPromptContext {
            character: self.character.clone(),
            user_name: ctx.user_name.clone(),
            relationship,
            mood,
            current_thread,
            surfaced,
            arcs,
            life_events,
            calendar,
            tasks,
        };
        build_system_prompt(&context, now)
    }

    async fn submit_turn_jobs(
        &self,
        message: String,
        reply: String,
        intent: Option<MessageIntent>,
        previous_activity: Option<Timestamp>,
        now: Timestamp,
    ) {
        let store = self.store.clone();
        let user_text = message.clone();
        self.background
            .submit("history", async move {
                if !user_text.trim().is_empty() {
                    store.append_turn(&ChatTurn::user(&user_text, now)).await?;
                }
                store.append_turn(&ChatTurn::assistant(&reply, now)).await?;
                Ok(())
            })
            .await;

        let store = self.store.clone();
        self.background
            .submit("relationship", async move {
                let mut metrics = store.load_relationship().await?.unwrap_or_default();
                metrics.record_interaction();
                store.save_relationship(&metrics).await
            })
            .await;

        if message.trim().is_empty() {
            return;
        }
        // Transcribed audio had no text to analyze before the provider call
        let intent = intent.unwrap_or_else(|| fallback_intent(&message));

        let patterns = self.patterns.clone();
        let text = message.clone();
        let sentiment = intent.sentiment;
        self.background
            .submit("patterns", async move {
                patterns.analyze_message(&text, sentiment, now).await?;
                Ok(())
            })
            .await;

        let milestones = self.milestones.clone();
        let store = self.store.clone();
        let text = message.clone();
        let flags = intent.clone();
        self.background
            .submit("milestones", async move {
                let first = first_interaction(store.as_ref(), now).await?;
                let since_first = Some((now - first).num_days());
                let since_last = previous_activity.map(|p| (now - p).num_days());
                milestones.analyze_message(&text, since_last, since_first, now).await?;
                // Duplicates of what the keyword pass found are rejected by the store
                for (hit, kind) in [
                    (flags.is_joke, MilestoneType::FirstJoke),
                    (flags.is_vulnerable, MilestoneType::FirstVulnerability),
                    (flags.seeking_support, MilestoneType::FirstSupport),
                ] {
                    if hit {
                        milestones.record(kind, &text, now).await?;
                    }
                }
                Ok(())
            })
            .await;

        if intent.is_vulnerable || intent.is_genuine_at(self.genuine_threshold) {
            let threads = self.threads.clone();
            let text = message.clone();
            let state = match intent.topics.first() {
                Some(topic) => format!("still thinking about what they shared about {}", topic),
                None => "still thinking about what they shared".to_string(),
            };
            self.background
                .submit("threads", async move {
                    threads.create_user_reflection(&text, &state, now).await?;
                    Ok(())
                })
                .await;
        }

        let open_loops = self.open_loops.clone();
        let text = message.clone();
        self.background
            .submit("open_loops", async move {
                open_loops.analyze_message(&text, now).await?;
                Ok(())
            })
            .await;

        let presence = self.presence.clone();
        self.background
            .submit("presence", async move {
                presence.observe(&message, now).await?;
                Ok(())
            })
            .await;
    }

    // ========================================================================
    // Greeting and proactive messages
    // ========================================================================

    /// Opening message of a conversation. Marks today's briefing as done.
    #[tracing::instrument(skip_all, fields(provider = self.chat.name()))]
    pub async fn generate_greeting(&self, ctx: TurnContext) -> Result<TurnResult, KayleyError> {
        let now = ctx.now;
        let local = ctx.now.with_timezone(&Local);
        let today = local.date_naive();

        let relationship = or_default("relationship", self.store.load_relationship()).await;
        let has_user_facts = !or_default("user_facts", self.store.user_facts()).await.is_empty();
        let content = match self.planner.greeting_content(now).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Greeting content unavailable: {:#}", e);
                GreetingContent::default()
            }
        };
        let first_contact_today = match self.briefing.is_first_contact(today).await {
            Ok(first) => first,
            Err(e) => {
                tracing::warn!("Briefing flag unreadable: {:#}", e);
                true
            }
        };
        let pending_message = self.peek_pending_message().await;

        let greeting = GreetingContext {
            user_name: ctx.user_name.clone(),
            tier: relationship.as_ref().map(|r| r.tier),
            total_interactions: relationship.as_ref().map_or(0, |r| r.total_interactions),
            has_user_facts,
            open_loop: content.open_loop.clone(),
            proactive_thread: content.proactive_thread.clone(),
            pending_message: pending_message.clone(),
            first_contact_today,
            local_hour: local.hour(),
        };
        let mood = or_default("mood", self.store.load_mood()).await.unwrap_or_default();
        let threads = content.proactive_thread.iter().cloned().collect::<Vec<_>>();
        let base = self.system_prompt(&ctx, relationship, mood, None, &threads).await;
        let system_prompt = format!("{}\n\n{}", base, build_greeting_prompt(&greeting));

        let request = ChatRequest {
            system_prompt,
            history: Vec::new(),
            input: UserContent::text(GREETING_INPUT),
            params: self.params,
        };
        let (response, session) = self.chat.generate(request, ctx.session).await?;

        if first_contact_today {
            if let Err(e) = self.briefing.mark_briefed(today).await {
                tracing::warn!("Failed to mark briefing: {:#}", e);
            }
        }
        if pending_message.is_some() {
            if let Err(e) = self.store.set_flag(PENDING_MESSAGE_KEY, "").await {
                tracing::warn!("Failed to clear pending message: {:#}", e);
            }
        }
        let surfaced = self.commit_greeting_content(content, now).await;

        let store = self.store.clone();
        let reply = response.text_response.clone();
        self.background
            .submit("history", async move { store.append_turn(&ChatTurn::assistant(&reply, now)).await })
            .await;

        let speech = speak(&self.speech, self.tts.as_ref(), &response.text_response).await;
        Ok(TurnResult {
            response,
            session,
            intent: None,
            surfaced,
            actions: Vec::new(),
            speech,
        })
    }

    async fn commit_greeting_content(&self, content: GreetingContent, now: Timestamp) -> Option<SurfacedItem> {
        let item = match (content.open_loop, content.proactive_thread) {
            (Some(l), _) => SurfacedItem::OpenLoop(l),
            (None, Some(t)) => SurfacedItem::Thread(t),
            (None, None) => return None,
        };
        self.commit_surfaced(&item, now).await;
        Some(item)
    }

    /// Store a message to deliver at the start of the next greeting.
    pub async fn queue_pending_message(&self, pending: &PendingMessage) -> Result<(), KayleyError> {
        let json = serde_json::to_string(pending)?;
        self.store.set_flag(PENDING_MESSAGE_KEY, &json).await?;
        Ok(())
    }

    /// The queued message, left in place until a greeting carrying it succeeds.
    async fn peek_pending_message(&self) -> Option<PendingMessage> {
        let raw = or_default("pending_message", self.store.get_flag(PENDING_MESSAGE_KEY)).await?;
        if raw.is_empty() {
            return None;
        }
        match serde_json::from_str(&raw) {
            Ok(pending) => Some(pending),
            Err(e) => {
                tracing::warn!("Dropping malformed pending message: {}", e);
                if let Err(e) = self.store.set_flag(PENDING_MESSAGE_KEY, "").await {
                    tracing::warn!("Failed to clear pending message: {:#}", e);
                }
                None
            }
        }
    }

    /// Turn a timer event into an outgoing message.
    pub async fn handle_proactive(&self, event: ProactiveEvent, ctx: TurnContext) -> Result<TurnResult, KayleyError> {
        if let ProactiveEvent::CalendarCheckin { summary, kind, .. } = &event {
            self.queue_pending_message(&PendingMessage {
                kind: PendingKind::Calendar,
                text: checkin_text(summary, *kind),
            })
            .await?;
        }
        tracing::info!(event = ?event, "Sending proactive message");
        self.generate_greeting(ctx).await
    }
}

pub fn checkin_text(summary: &str, kind: CheckinKind) -> String {
    match kind {
        CheckinKind::DayBefore => format!("{} is tomorrow", summary),
        CheckinKind::Approaching => format!("{} is coming up soon", summary),
        CheckinKind::Starting => format!("{} is starting about now", summary),
        CheckinKind::PostEvent => format!("{} just wrapped up, ask how it went", summary),
    }
}

/// Time of the very first message, recorded on first sight.
async fn first_interaction(store: &dyn CompanionStore, now: Timestamp) -> anyhow::Result<Timestamp> {
    if let Some(raw) = store.get_flag(FIRST_INTERACTION_KEY).await? {
        if let Ok(at) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(at.with_timezone(&Utc));
        }
        tracing::warn!("Malformed {} flag: {}", FIRST_INTERACTION_KEY, raw);
    }
    store.set_flag(FIRST_INTERACTION_KEY, &now.to_rfc3339()).await?;
    Ok(now)
}

/// Await a non-critical read, logging and defaulting on failure.
async fn or_default<T: Default>(what: &str, fut: impl Future<Output = anyhow::Result<T>>) -> T {
    match fut.await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Failed to load {}: {:#}", what, e);
            T::default()
        }
    }
}
