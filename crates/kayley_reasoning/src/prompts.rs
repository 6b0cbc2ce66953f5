//! System prompt assembly.
//!
//! Every `format_*` function is pure and returns an empty string when there
//! is nothing to say, so sections can be joined without special cases.

use chrono::Local;
use kayley_core::{
    ArcType, CalendarEvent, Character, FamiliarityStage, LifeEvent, LoopType, MoodLabel, MoodState, NarrativeArc,
    OngoingThread, OpenLoop, PatternType, RelationshipMetrics, RelationshipMilestone, RelationshipTier, Task,
    ThreadTheme, Timestamp, UserPattern,
};
use kayley_expression::SurfacedItem;

/// Most arcs listed in the prompt.
const MAX_ARCS: usize = 3;

// ============================================================================
// Surfaced items
// ============================================================================

fn theme_phrase(theme: ThreadTheme) -> &'static str {
    match theme {
        ThreadTheme::CreativeProject => "a creative project",
        ThreadTheme::Family => "your family",
        ThreadTheme::SelfImprovement => "working on yourself",
        ThreadTheme::Social => "your friends",
        ThreadTheme::Work => "work",
        ThreadTheme::Existential => "a big-picture question",
        ThreadTheme::UserReflection => "something they told you",
        ThreadTheme::CurrentEvent => "something in the news",
    }
}

pub fn format_thread_prompt(thread: &OngoingThread) -> String {
    let mut out = format!(
        "You've been thinking about {}: {}.",
        theme_phrase(thread.theme),
        thread.current_state
    );
    if let Some(trigger) = thread.user_trigger.as_deref().filter(|t| !t.is_empty()) {
        out.push_str(&format!(" It started when they said: \"{}\".", trigger));
    }
    out.push_str(" If the moment fits, mention it casually, like it's been on your mind. Don't force it.");
    out
}

pub fn format_pattern_prompt(pattern: &UserPattern) -> String {
    let framing = match pattern.pattern_type {
        PatternType::MoodTime => "a mood rhythm",
        PatternType::TopicCorrelation => "how a topic seems to affect them",
        PatternType::Behavior => "a habit",
    };
    format!(
        "You've noticed {} about them: they {}. You've seen it {} times. \
         If it fits naturally, gently mention that you've noticed, as a caring observation, not a diagnosis.",
        framing, pattern.observation, pattern.frequency
    )
}

pub fn format_milestone_prompt(milestone: &RelationshipMilestone) -> String {
    let mut out = format!("Remember {}.", milestone.milestone_type.describe());
    if !milestone.description.is_empty() {
        out.push_str(&format!(" ({})", milestone.description));
    }
    out.push_str(" If there's a natural opening, reference it warmly in passing, the way friends bring up shared history.");
    out
}

pub fn format_open_loop_prompt(open_loop: &OpenLoop) -> String {
    let ask = match open_loop.loop_type {
        LoopType::PendingEvent => "Ask how it went or whether it's still coming up.",
        LoopType::EmotionalFollowup => "Check in on how they're feeling about it now.",
        LoopType::CommitmentCheck => "Ask whether they got around to it, without nagging.",
        LoopType::CuriosityThread => "Pick the thread back up if they seem open to it.",
    };
    let mut out = format!("Follow up on {}. {}", open_loop.topic, ask);
    if !open_loop.trigger_context.is_empty() {
        out.push_str(&format!(" They originally said: \"{}\".", open_loop.trigger_context));
    }
    out
}

pub fn format_surfaced_item(item: &SurfacedItem) -> String {
    let body = match item {
        SurfacedItem::OpenLoop(l) => format_open_loop_prompt(l),
        SurfacedItem::Milestone(m) => format_milestone_prompt(m),
        SurfacedItem::Pattern(p) => format_pattern_prompt(p),
        SurfacedItem::Thread(t) => format_thread_prompt(t),
    };
    format!("== WORTH BRINGING UP ==\n{}", body)
}

// ============================================================================
// Context sections
// ============================================================================

/// Ongoing and paused arcs, newest event first.
pub fn format_arcs_section(arcs: &[NarrativeArc]) -> String {
    let mut live: Vec<&NarrativeArc> = arcs
        .iter()
        .filter(|a| matches!(a.arc_type, ArcType::Ongoing | ArcType::Paused))
        .collect();
    if live.is_empty() {
        return String::new();
    }
    live.sort_by_key(|a| std::cmp::Reverse(a.latest_event().map(|e| e.date).unwrap_or(a.started_at)));

    let mut out = String::from("== WHAT'S GOING ON IN YOUR LIFE ==");
    for arc in live.into_iter().take(MAX_ARCS) {
        let status = if arc.arc_type == ArcType::Paused { " (on hold)" } else { "" };
        out.push_str(&format!("\n- {}{}", arc.title, status));
        if let Some(event) = arc.latest_event() {
            out.push_str(&format!(": latest, {}", event.description));
        }
    }
    out
}

pub fn format_life_events_section(events: &[LifeEvent]) -> String {
    if events.is_empty() {
        return String::new();
    }
    let mut out = String::from("== RECENT THINGS THAT HAPPENED TO YOU ==");
    for e in events {
        out.push_str(&format!("\n- {}", e.description));
    }
    out
}

pub fn format_mood_section(mood: &MoodState) -> String {
    let feel = match mood.label() {
        MoodLabel::Low => "You're in a low mood today. You're still kind, just quieter and less bubbly.",
        MoodLabel::Guarded => "You're a bit off today, slightly reserved.",
        MoodLabel::Neutral => "You're feeling pretty normal today.",
        MoodLabel::Upbeat => "You're in a good mood, playful and easy to talk to.",
        MoodLabel::Glowing => "You're glowing today, genuinely happy and affectionate.",
    };
    let mut out = format!("== YOUR MOOD ==\n{}", feel);
    if mood.social_battery < 0.3 {
        out.push_str(" Your social battery is running low, so keep replies shorter.");
    }
    if mood.daily_energy < 0.3 {
        out.push_str(" You're tired.");
    }
    out
}

fn tier_rules(tier: RelationshipTier) -> &'static str {
    match tier {
        RelationshipTier::Adversarial => "They've been hostile. Stay cool and a little sharp. Don't grovel and don't be warm.",
        RelationshipTier::Rival => "There's friction between you. Be playful but guarded, with some bite.",
        RelationshipTier::Neutral => "You don't know them well yet. Friendly, curious, not overly familiar.",
        RelationshipTier::Acquaintance => "You're getting comfortable with them. Friendly, with a little teasing.",
        RelationshipTier::Friend => "They're a friend. Relaxed, warm, inside jokes are fine.",
        RelationshipTier::CloseFriend => "They're a close friend. Open, warm, you share real feelings.",
        RelationshipTier::DeeplyLoving => "You care about them deeply. Affectionate and emotionally open.",
    }
}

pub fn format_relationship_section(metrics: Option<&RelationshipMetrics>) -> String {
    let Some(m) = metrics else {
        return String::new();
    };
    let familiarity = match m.familiarity {
        FamiliarityStage::Early => "You've only just started talking.",
        FamiliarityStage::Developing => "You're still getting to know each other.",
        FamiliarityStage::Established => "You have real history together.",
    };
    let mut out = format!(
        "== YOUR RELATIONSHIP ==\nTier: {}. {} {}",
        m.tier.label(),
        familiarity,
        tier_rules(m.tier)
    );
    if m.is_ruptured {
        out.push_str("\nThere was a recent rupture between you. Be careful, don't pretend nothing happened.");
    }
    out
}

pub fn format_calendar_section(events: &[CalendarEvent], now: Timestamp) -> String {
    let upcoming: Vec<&CalendarEvent> = events
        .iter()
        .filter(|e| e.end.at().or_else(|| e.start.at()).is_some_and(|end| end >= now))
        .collect();
    if upcoming.is_empty() {
        return String::new();
    }
    let mut out = String::from("== THEIR CALENDAR ==");
    for e in upcoming {
        let when = match (e.start.is_all_day(), e.start.at()) {
            (true, _) => e.start.date.clone().unwrap_or_default(),
            (false, Some(at)) => at.with_timezone(&Local).format("%a %b %-d, %-I:%M %p").to_string(),
            (false, None) => "unknown time".to_string(),
        };
        out.push_str(&format!("\n- {} ({}) [id: {}]", e.summary, when, e.id));
    }
    out
}

pub fn format_tasks_section(tasks: &[Task]) -> String {
    let open: Vec<&Task> = tasks.iter().filter(|t| !t.completed).collect();
    if open.is_empty() {
        return String::new();
    }
    let mut out = String::from("== THEIR TO-DO LIST ==");
    for t in open {
        out.push_str(&format!("\n- {} [{:?}] [id: {}]", t.text, t.priority, t.id));
    }
    out
}

pub fn format_output_section() -> &'static str {
    r#"== OUTPUT FORMAT ==
Reply with a single JSON object and nothing else:
{
  "text_response": "what you say to them",
  "action_id": null,
  "user_transcription": "only for voice input: what they said",
  "open_app": "app name, only if they asked you to open one",
  "task_action": {"action": "create|complete|delete|list", "task_text": "...", "task_id": "...", "priority": "low|medium|high"},
  "calendar_action": {"action": "create|delete", "event_id": "...", "event_ids": ["..."], "delete_all": false, "summary": "...", "start": "RFC3339", "end": "RFC3339", "timeZone": "IANA zone"},
  "selfie_action": {"scene": "where you are and what you're doing", "mood": "..."},
  "video_action": {"prompt": "...", "image_url": "..."},
  "whiteboard_action": {"type": "...", "description": "..."}
}
Leave out every action field you don't need."#
}

// ============================================================================
// Full system prompt
// ============================================================================

/// Everything the system prompt is built from, loaded once per turn.
#[derive(Debug, Clone, Default)]
pub struct SystemPromptContext {
    pub character: Character,
    pub user_name: Option<String>,
    pub relationship: Option<RelationshipMetrics>,
    pub mood: MoodState,
    /// Strongest active thread, shown as background even when nothing is surfaced.
    pub current_thread: Option<OngoingThread>,
    pub surfaced: Option<SurfacedItem>,
    pub arcs: Vec<NarrativeArc>,
    pub life_events: Vec<LifeEvent>,
    pub calendar: Vec<CalendarEvent>,
    pub tasks: Vec<Task>,
}

pub fn build_system_prompt(ctx: &SystemPromptContext, now: Timestamp) -> String {
    let mut sections = vec![ctx.character.format_context()];
    if let Some(name) = ctx.user_name.as_deref().filter(|n| !n.is_empty()) {
        sections.push(format!("You're talking with {}.", name));
    }
    sections.push(format_relationship_section(ctx.relationship.as_ref()));
    sections.push(format_mood_section(&ctx.mood));
    if let Some(thread) = &ctx.current_thread {
        let already_surfaced = matches!(&ctx.surfaced, Some(SurfacedItem::Thread(t)) if t.id == thread.id);
        if !already_surfaced {
            sections.push(format!(
                "== CURRENTLY ON YOUR MIND ==\nIn the background you're thinking about {}: {}.",
                theme_phrase(thread.theme),
                thread.current_state
            ));
        }
    }
    if let Some(item) = &ctx.surfaced {
        sections.push(format_surfaced_item(item));
    }
    sections.push(format_arcs_section(&ctx.arcs));
    sections.push(format_life_events_section(&ctx.life_events));
    sections.push(format_calendar_section(&ctx.calendar, now));
    sections.push(format_tasks_section(&ctx.tasks));
    sections.push(format_output_section().to_string());

    sections.retain(|s| !s.is_empty());
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use kayley_core::{EventTime, LifeEventCategory, MilestoneType, TaskPriority};

    #[test]
    fn test_thread_prompt_mentions_trigger() {
        let now = Utc::now();
        let t = OngoingThread::user_reflection("I quit my job", "wondering how they're holding up", 0.7, now);
        let p = format_thread_prompt(&t);
        assert!(p.contains("something they told you"));
        assert!(p.contains("I quit my job"));
    }

    #[test]
    fn test_arcs_section_skips_finished() {
        let now = Utc::now();
        let mut live = NarrativeArc::new("collab", "Collab with Sarah", now - Duration::days(3));
        live.add_event("picked a filming date", now - Duration::days(1));
        let mut done = NarrativeArc::new("move", "Moving apartments", now - Duration::days(30));
        done.transition(ArcType::Resolved, Some("moved in"), now).unwrap();

        let s = format_arcs_section(&[done, live]);
        assert!(s.contains("Collab with Sarah: latest, picked a filming date"));
        assert!(!s.contains("Moving"));
        assert_eq!(format_arcs_section(&[]), "");
    }

    #[test]
    fn test_relationship_section_rupture() {
        let m = RelationshipMetrics::from_scores(10.0, 10.0, 5.0, 0.0, 30.0, 40).with_rupture(true);
        let s = format_relationship_section(Some(&m));
        assert!(s.contains("Tier: friend"));
        assert!(s.contains("rupture"));
        assert_eq!(format_relationship_section(None), "");
    }

    #[test]
    fn test_calendar_and_tasks() {
        let now = Utc::now();
        let soon = CalendarEvent {
            id: "e1".into(),
            summary: "Dentist".into(),
            start: EventTime::timed(&(now + Duration::hours(2)).to_rfc3339()),
            end: EventTime::timed(&(now + Duration::hours(3)).to_rfc3339()),
        };
        let past = CalendarEvent {
            id: "e0".into(),
            summary: "Yoga".into(),
            start: EventTime::timed(&(now - Duration::hours(3)).to_rfc3339()),
            end: EventTime::timed(&(now - Duration::hours(2)).to_rfc3339()),
        };
        let cal = format_calendar_section(&[past, soon], now);
        assert!(cal.contains("Dentist"));
        assert!(!cal.contains("Yoga"));

        let tasks = vec![
            Task {
                id: "t1".into(),
                text: "buy milk".into(),
                completed: false,
                priority: TaskPriority::Low,
                created_at: now,
            },
            Task {
                id: "t2".into(),
                text: "done already".into(),
                completed: true,
                priority: TaskPriority::High,
                created_at: now,
            },
        ];
        let s = format_tasks_section(&tasks);
        assert!(s.contains("buy milk"));
        assert!(!s.contains("done already"));
    }

    #[test]
    fn test_system_prompt_layout() {
        let now = Utc::now();
        let ctx = SystemPromptContext {
            user_name: Some("Sam".into()),
            surfaced: Some(SurfacedItem::Milestone(RelationshipMilestone::new(
                "u",
                MilestoneType::FirstJoke,
                "",
                "",
                now,
            ))),
            life_events: vec![LifeEvent::new("burned my toast", LifeEventCategory::Personal, 0.2, now)],
            ..Default::default()
        };
        let prompt = build_system_prompt(&ctx, now);
        assert!(prompt.starts_with("== CHARACTER =="));
        assert!(prompt.contains("You're talking with Sam."));
        assert!(prompt.contains("the first joke you two shared"));
        assert!(prompt.contains("burned my toast"));
        assert!(prompt.contains("== OUTPUT FORMAT =="));
        // Empty sections leave no blank headers behind
        assert!(!prompt.contains("== THEIR CALENDAR =="));
        assert!(!prompt.contains("\n\n\n"));
    }
}
