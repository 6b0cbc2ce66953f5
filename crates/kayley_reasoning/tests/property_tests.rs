//! Property-based tests for greeting prompt assembly.
//!
//! Tone selection and section ordering must hold for every tier and
//! interaction count, not just the handful covered by unit tests.

use kayley_core::RelationshipTier;
use kayley_reasoning::greeting::{
    build_greeting_prompt, select_tone, GreetingContext, GreetingTone, PendingKind, PendingMessage,
    GETTING_TO_KNOW_MAX,
};
use proptest::prelude::*;

fn arb_tier() -> impl Strategy<Value = Option<RelationshipTier>> {
    prop_oneof![
        Just(None),
        proptest::sample::select(RelationshipTier::ALL.to_vec()).prop_map(Some),
    ]
}

fn arb_kind() -> impl Strategy<Value = PendingKind> {
    prop_oneof![
        Just(PendingKind::Calendar),
        Just(PendingKind::Gift),
        Just(PendingKind::Generic),
    ]
}

proptest! {
    #[test]
    fn deeply_loving_veterans_get_affection(
        interactions in (GETTING_TO_KNOW_MAX + 1)..10_000u32,
        has_facts in any::<bool>(),
        hour in 0u32..24,
    ) {
        let ctx = GreetingContext {
            tier: Some(RelationshipTier::DeeplyLoving),
            total_interactions: interactions,
            has_user_facts: has_facts,
            local_hour: hour,
            first_contact_today: true,
            ..Default::default()
        };
        let prompt = build_greeting_prompt(&ctx);
        prop_assert!(prompt.contains(GreetingTone::Affectionate.marker()));
        prop_assert!(!prompt.contains(GreetingTone::Guarded.marker()));
    }

    #[test]
    fn pending_message_precedes_tone(
        tier in arb_tier(),
        interactions in 0u32..1_000,
        kind in arb_kind(),
        text in "[a-zA-Z0-9]{1,40}",
    ) {
        let ctx = GreetingContext {
            tier,
            total_interactions: interactions,
            pending_message: Some(PendingMessage { kind, text: text.clone() }),
            ..Default::default()
        };
        let prompt = build_greeting_prompt(&ctx);
        let tone = select_tone(tier, interactions, false);
        let deliver = prompt.find("== DELIVER FIRST ==");
        let marker = prompt.find(tone.marker());
        prop_assert!(deliver.is_some(), "missing pending section: {}", prompt);
        prop_assert!(marker.is_some(), "missing tone marker: {}", prompt);
        prop_assert!(deliver < marker);
        prop_assert!(prompt.contains(&text));
    }

    #[test]
    fn deeply_loving_is_never_guarded(
        interactions in 0u32..10_000,
        has_facts in any::<bool>(),
        pending in proptest::option::of((arb_kind(), "[a-z]{1,20}")),
    ) {
        let ctx = GreetingContext {
            tier: Some(RelationshipTier::DeeplyLoving),
            total_interactions: interactions,
            has_user_facts: has_facts,
            pending_message: pending.map(|(kind, text)| PendingMessage { kind, text }),
            ..Default::default()
        };
        prop_assert_ne!(select_tone(ctx.tier, interactions, has_facts), GreetingTone::Guarded);
        let prompt = build_greeting_prompt(&ctx);
        prop_assert!(!prompt.contains(GreetingTone::Guarded.marker()), "guarded marker at {}: {}", interactions, prompt);
    }

    #[test]
    fn hostile_tiers_are_always_guarded(
        interactions in 0u32..10_000,
        has_facts in any::<bool>(),
    ) {
        for tier in [RelationshipTier::Adversarial, RelationshipTier::Rival] {
            prop_assert_eq!(select_tone(Some(tier), interactions, has_facts), GreetingTone::Guarded);
        }
    }

    #[test]
    fn tone_is_deterministic(
        tier in arb_tier(),
        interactions in 0u32..1_000,
        has_facts in any::<bool>(),
    ) {
        prop_assert_eq!(
            select_tone(tier, interactions, has_facts),
            select_tone(tier, interactions, has_facts)
        );
    }
}
