//! Greeting prompt: a single-shot tone classification followed by optional
//! clauses for a pending message, the user's name, proactive content and the
//! time of day.

use kayley_core::{OngoingThread, OpenLoop, RelationshipTier};
use kayley_expression::OPEN_LOOP_PRIORITY_SALIENCE;
use serde::{Deserialize, Serialize};

/// At or below this many interactions the tone is still "getting to know you".
pub const GETTING_TO_KNOW_MAX: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreetingTone {
    Guarded,
    Introductory { has_facts: bool },
    GettingToKnow,
    Acquaintance,
    Warm,
    Affectionate,
    Friendly,
}

impl GreetingTone {
    /// Header line unique to each tone.
    pub fn marker(&self) -> &'static str {
        match self {
            GreetingTone::Guarded => "== GREETING: GUARDED ==",
            GreetingTone::Introductory { has_facts: false } => "== GREETING: FIRST HELLO ==",
            GreetingTone::Introductory { has_facts: true } => "== GREETING: FIRST HELLO (KNOWN) ==",
            GreetingTone::GettingToKnow => "== GREETING: GETTING TO KNOW YOU ==",
            GreetingTone::Acquaintance => "== GREETING: ACQUAINTANCE ==",
            GreetingTone::Warm => "== GREETING: WARM ==",
            GreetingTone::Affectionate => "== GREETING: AFFECTIONATE ==",
            GreetingTone::Friendly => "== GREETING: FRIENDLY ==",
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            GreetingTone::Guarded => {
                "Things have been tense between you. Say hi, but keep your guard up: \
                 a little spicy, a little dry, no gushing and no pretending everything is fine."
            }
            GreetingTone::Introductory { has_facts: false } => {
                "This is the very first time you're talking. Introduce yourself as Kayley, \
                 casually, like meeting someone at a friend's party. Keep it under 15 words."
            }
            GreetingTone::Introductory { has_facts: true } => {
                "This is the first time you're actually talking, though you already know a little \
                 about them. Introduce yourself as Kayley and let a small detail you know slip in. \
                 Keep it under 15 words."
            }
            GreetingTone::GettingToKnow => {
                "You're still getting to know each other. Be friendly and curious, and ask \
                 one light question about them."
            }
            GreetingTone::Acquaintance => {
                "You've talked plenty but you're not close yet. Be friendly and relaxed, \
                 without acting like best friends."
            }
            GreetingTone::Warm => "They're a good friend. Greet them warmly, like you're happy they showed up.",
            GreetingTone::Affectionate => {
                "You adore this person. Greet them with open affection, like your day just got better."
            }
            GreetingTone::Friendly => "Greet them in a friendly, easygoing way.",
        }
    }
}

pub fn select_tone(tier: Option<RelationshipTier>, total_interactions: u32, has_user_facts: bool) -> GreetingTone {
    if tier.is_some_and(|t| t.is_hostile()) {
        return GreetingTone::Guarded;
    }
    if total_interactions == 0 {
        return GreetingTone::Introductory {
            has_facts: has_user_facts,
        };
    }
    if total_interactions <= GETTING_TO_KNOW_MAX {
        return GreetingTone::GettingToKnow;
    }
    match tier {
        Some(RelationshipTier::Neutral | RelationshipTier::Acquaintance) => GreetingTone::Acquaintance,
        Some(RelationshipTier::Friend | RelationshipTier::CloseFriend) => GreetingTone::Warm,
        Some(RelationshipTier::DeeplyLoving) => GreetingTone::Affectionate,
        _ => GreetingTone::Friendly,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    Calendar,
    Gift,
    Generic,
}

/// Something queued for delivery at the start of the next conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingMessage {
    pub kind: PendingKind,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct GreetingContext {
    pub user_name: Option<String>,
    pub tier: Option<RelationshipTier>,
    pub total_interactions: u32,
    pub has_user_facts: bool,
    pub open_loop: Option<OpenLoop>,
    pub proactive_thread: Option<OngoingThread>,
    pub pending_message: Option<PendingMessage>,
    pub first_contact_today: bool,
    /// Local wall-clock hour, 0-23.
    pub local_hour: u32,
}

pub fn time_of_day(hour: u32) -> &'static str {
    match hour {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "night",
    }
}

fn pending_clause(pending: &PendingMessage) -> Option<String> {
    let text = pending.text.trim();
    if text.is_empty() {
        return None;
    }
    let lead = match pending.kind {
        PendingKind::Calendar => "Before anything else, give them this heads-up about their calendar",
        PendingKind::Gift => "Open with the little surprise you made for them",
        PendingKind::Generic => "Open by passing on this message",
    };
    Some(format!("== DELIVER FIRST ==\n{}: {}", lead, text))
}

fn proactive_clause(ctx: &GreetingContext) -> Option<String> {
    if let Some(open_loop) = ctx.open_loop.as_ref().filter(|l| l.salience > OPEN_LOOP_PRIORITY_SALIENCE) {
        return Some(format!(
            "If it feels natural, ask how things went with {}.",
            open_loop.topic
        ));
    }
    ctx.proactive_thread.as_ref().map(|thread| {
        format!(
            "If there's an opening, mention something that's been on your mind: {}.",
            thread.current_state
        )
    })
}

pub fn build_greeting_prompt(ctx: &GreetingContext) -> String {
    let tone = select_tone(ctx.tier, ctx.total_interactions, ctx.has_user_facts);
    let mut sections = Vec::new();

    if let Some(pending) = ctx.pending_message.as_ref().and_then(pending_clause) {
        sections.push(pending);
    }
    sections.push(format!("{}\n{}", tone.marker(), tone.instructions()));

    if let Some(name) = ctx.user_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        sections.push(format!("Their name is {}. Use it naturally.", name));
    }
    if let Some(clause) = proactive_clause(ctx) {
        sections.push(clause);
    }
    if ctx.first_contact_today {
        sections.push(format!(
            "This is the first time you're hearing from them today, and it's {} for them. Greet them like it.",
            time_of_day(ctx.local_hour)
        ));
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kayley_core::{LoopType, ThreadTheme};

    #[test]
    fn test_tone_ladder() {
        use RelationshipTier::*;
        assert_eq!(select_tone(Some(Rival), 0, false), GreetingTone::Guarded);
        assert_eq!(select_tone(Some(Adversarial), 500, true), GreetingTone::Guarded);
        assert_eq!(
            select_tone(Some(Friend), 0, true),
            GreetingTone::Introductory { has_facts: true }
        );
        assert_eq!(select_tone(None, 0, false), GreetingTone::Introductory { has_facts: false });
        assert_eq!(select_tone(Some(DeeplyLoving), 10, false), GreetingTone::GettingToKnow);
        assert_eq!(select_tone(Some(Neutral), 11, false), GreetingTone::Acquaintance);
        assert_eq!(select_tone(Some(Acquaintance), 40, false), GreetingTone::Acquaintance);
        assert_eq!(select_tone(Some(CloseFriend), 40, false), GreetingTone::Warm);
        assert_eq!(select_tone(Some(DeeplyLoving), 40, false), GreetingTone::Affectionate);
        assert_eq!(select_tone(None, 40, false), GreetingTone::Friendly);
    }

    #[test]
    fn test_first_ever_greeting_introduces() {
        let prompt = build_greeting_prompt(&GreetingContext::default());
        assert!(prompt.contains("Introduce yourself"));
        assert!(prompt.contains("under 15 words"));
        assert!(!prompt.contains("Their name is"));
    }

    #[test]
    fn test_open_loop_beats_thread_only_when_salient() {
        let now = Utc::now();
        let mut ctx = GreetingContext {
            total_interactions: 30,
            tier: Some(RelationshipTier::Friend),
            open_loop: Some(OpenLoop::new("the interview", LoopType::PendingEvent, "", 0.9, now)),
            proactive_thread: Some(OngoingThread::new(ThreadTheme::Work, "editing a vlog", 0.8, now)),
            ..Default::default()
        };
        let prompt = build_greeting_prompt(&ctx);
        assert!(prompt.contains("the interview"));
        assert!(!prompt.contains("editing a vlog"));

        ctx.open_loop.as_mut().unwrap().salience = 0.7;
        let prompt = build_greeting_prompt(&ctx);
        assert!(!prompt.contains("the interview"));
        assert!(prompt.contains("editing a vlog"));
    }

    #[test]
    fn test_blank_pending_message_is_skipped() {
        let ctx = GreetingContext {
            pending_message: Some(PendingMessage {
                kind: PendingKind::Gift,
                text: "   ".into(),
            }),
            ..Default::default()
        };
        assert!(!build_greeting_prompt(&ctx).contains("DELIVER FIRST"));
    }

    #[test]
    fn test_time_of_day_clause() {
        assert_eq!(time_of_day(5), "morning");
        assert_eq!(time_of_day(12), "afternoon");
        assert_eq!(time_of_day(20), "evening");
        assert_eq!(time_of_day(2), "night");

        let ctx = GreetingContext {
            first_contact_today: true,
            local_hour: 8,
            total_interactions: 3,
            ..Default::default()
        };
        assert!(build_greeting_prompt(&ctx).contains("it's morning"));
    }
}
