use crate::arcs::NarrativeArcService;
use crate::milestones::MilestoneTracker;
use crate::open_loops::OpenLoopTracker;
use crate::patterns::PatternTracker;
use crate::sqlite::SqliteStore;
use crate::store::{CompanionStore, BRIEFED_ON_KEY};
use chrono::{Duration, Utc};
use kayley_core::dynamics::{pattern_eligible, PATTERN_SURFACING};
use kayley_core::{
    ArcType, ChatRole, ChatTurn, KayleyError, LifeEventCategory, LoopStatus, MilestoneType, MoodState, PatternType,
    RelationshipMetrics, RelationshipTier,
};
use std::sync::Arc;

async fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::new(":memory:").await.expect("Failed to create store"))
}

#[tokio::test]
async fn test_first_joke_recorded_once() {
    let store = store().await;
    let tracker = MilestoneTracker::new(store.clone(), "u1");
    let now = Utc::now();

    let first = tracker.record(MilestoneType::FirstJoke, "lol", now).await.unwrap();
    assert!(first.is_some());
    let second = tracker.record(MilestoneType::FirstJoke, "haha", now).await.unwrap();
    assert!(second.is_none());

    let all = tracker.list().await.unwrap();
    assert_eq!(all.iter().filter(|m| m.milestone_type == MilestoneType::FirstJoke).count(), 1);
}

#[tokio::test]
async fn test_same_turn_detection_paths_dedupe() {
    let store = store().await;
    let tracker = MilestoneTracker::new(store.clone(), "u1");
    let now = Utc::now();
    // Both the keyword detector and an explicit record fire for the same turn
    tracker.analyze_message("lmao you're hilarious", None, None, now).await.unwrap();
    tracker.record(MilestoneType::FirstJoke, "lmao you're hilarious", now).await.unwrap();
    assert_eq!(tracker.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_anniversaries_repeat_across_days() {
    let store = store().await;
    let tracker = MilestoneTracker::new(store.clone(), "u1");
    let now = Utc::now();
    assert!(tracker.record(MilestoneType::AnniversaryWeek, "", now).await.unwrap().is_some());
    assert!(tracker.record(MilestoneType::AnniversaryWeek, "", now).await.unwrap().is_none());
    assert!(tracker
        .record(MilestoneType::AnniversaryWeek, "", now + Duration::days(30))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_milestone_reference_bookkeeping() {
    let store = store().await;
    let tracker = MilestoneTracker::new(store.clone(), "u1");
    let now = Utc::now();
    let m = tracker.record(MilestoneType::FirstSupport, "help", now).await.unwrap().unwrap();
    tracker.mark_referenced(&m, now).await.unwrap();
    let stored = store.find_milestone("u1", MilestoneType::FirstSupport).await.unwrap().unwrap();
    assert_eq!(stored.reference_count, 1);
    assert_eq!(stored.last_referenced_at, Some(now));
    // Other users are independent
    assert!(store.find_milestone("u2", MilestoneType::FirstSupport).await.unwrap().is_none());
}

#[tokio::test]
async fn test_pattern_upsert_reinforces() {
    let store = store().await;
    let tracker = PatternTracker::new(store.clone());
    let now = Utc::now();
    for i in 0..3 {
        tracker
            .observe(PatternType::MoodTime, "seems down on Mondays", now + Duration::days(7 * i))
            .await
            .unwrap();
    }
    let patterns = tracker.list().await.unwrap();
    assert_eq!(patterns.len(), 1);
    let p = &patterns[0];
    assert_eq!(p.frequency, 3);
    assert!((p.confidence - 0.54).abs() < 1e-4);
    assert!(!pattern_eligible(p, now + Duration::days(14)));

    // Fourth observation pushes confidence past the surfacing threshold
    let p = tracker
        .observe(PatternType::MoodTime, "seems down on Mondays", now + Duration::days(21))
        .await
        .unwrap();
    assert!(p.confidence >= PATTERN_SURFACING.min_strength);
    assert!(pattern_eligible(&p, now + Duration::days(21)));

    let surfaced = tracker.mark_surfaced(&p, now + Duration::days(21)).await.unwrap();
    assert_eq!(surfaced.surface_count, 1);
    let reloaded = store
        .find_pattern(PatternType::MoodTime, "seems down on Mondays")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.surface_count, 1);
    assert_eq!(reloaded.frequency, 4);
}

#[tokio::test]
async fn test_arc_persist_and_reload_preserves_event_order() {
    let store = store().await;
    let arcs = NarrativeArcService::new(store.clone());
    let now = Utc::now();
    arcs.create("collab_sarah", "Collab with Sarah", Some("Sarah DM'd about a collab"), now)
        .await
        .unwrap();
    arcs.add_event("collab_sarah", "Filmed the first half", now + Duration::days(2))
        .await
        .unwrap();

    let arc = arcs.get("collab_sarah").await.unwrap().unwrap();
    assert_eq!(arc.events.len(), 2);
    assert_eq!(arc.events[0].description, "Sarah DM'd about a collab");
    assert_eq!(arc.events[1].description, "Filmed the first half");
    assert_eq!(arc.events[1].date, now + Duration::days(2));
}

#[tokio::test]
async fn test_arc_transitions_persist() {
    let store = store().await;
    let arcs = NarrativeArcService::new(store.clone());
    let now = Utc::now();
    arcs.create("pottery", "Pottery class", None, now).await.unwrap();

    let resolved = arcs
        .transition("pottery", ArcType::Resolved, Some("made a lopsided mug"), now)
        .await
        .unwrap();
    assert_eq!(resolved.resolved_at, Some(now));

    let err = arcs.transition("pottery", ArcType::Ongoing, None, now).await.unwrap_err();
    assert!(matches!(err, KayleyError::InvalidTransition { .. }));

    assert_eq!(arcs.list(Some(ArcType::Resolved)).await.unwrap().len(), 1);
    assert!(arcs.list(Some(ArcType::Ongoing)).await.unwrap().is_empty());
    assert!(matches!(
        arcs.transition("missing", ArcType::Paused, None, now).await,
        Err(KayleyError::Store(_))
    ));
}

#[tokio::test]
async fn test_life_events_most_recent_five() {
    let store = store().await;
    let arcs = NarrativeArcService::new(store.clone());
    let now = Utc::now();
    for i in 0..7 {
        arcs.record_life_event(&format!("event {}", i), LifeEventCategory::Personal, 0.5, now + Duration::minutes(i))
            .await
            .unwrap();
    }
    let recent = arcs.recent_life_events().await.unwrap();
    assert_eq!(recent.len(), 5);
    assert_eq!(recent[0].description, "event 6");
}

#[tokio::test]
async fn test_facts_upsert_on_conflict() {
    let store = store().await;
    store.upsert_user_fact("identity", "name", "Steven").await.unwrap();
    store.upsert_user_fact("identity", "name", "Steve").await.unwrap();
    store.upsert_user_fact("pets", "dog", "Biscuit").await.unwrap();
    let facts = store.user_facts().await.unwrap();
    assert_eq!(facts.len(), 2);
    assert!(facts.iter().any(|f| f.fact_key == "name" && f.fact_value == "Steve"));

    store.upsert_character_fact("kayley", "food", "coffee", "iced oat latte").await.unwrap();
    store.upsert_character_fact("kayley", "food", "coffee", "cold brew").await.unwrap();
    let cf = store.character_facts("kayley").await.unwrap();
    assert_eq!(cf.len(), 1);
    assert_eq!(cf[0].fact_value, "cold brew");
    assert!(store.character_facts("someone_else").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_history_returns_last_n_chronologically() {
    let store = store().await;
    let now = Utc::now();
    for i in 0..5 {
        store
            .append_turn(&ChatTurn::user(&format!("msg {}", i), now + Duration::seconds(i)))
            .await
            .unwrap();
    }
    store.append_turn(&ChatTurn::assistant("reply", now + Duration::seconds(10))).await.unwrap();
    let turns = store.recent_turns(3).await.unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[0].text, "msg 3");
    assert_eq!(turns[2].role, ChatRole::Assistant);
}

#[tokio::test]
async fn test_singleton_rows_and_flags() {
    let store = store().await;
    assert!(store.load_mood().await.unwrap().is_none());
    let mut mood = MoodState::default();
    mood.apply_genuine_moment(Utc::now());
    store.save_mood(&mood).await.unwrap();
    assert_eq!(store.load_mood().await.unwrap(), Some(mood));

    let metrics = RelationshipMetrics::from_scores(20.0, 10.0, 5.0, 0.0, 60.0, 42);
    store.save_relationship(&metrics).await.unwrap();
    let loaded = store.load_relationship().await.unwrap().unwrap();
    assert_eq!(loaded.tier, RelationshipTier::CloseFriend);

    assert!(store.get_flag(BRIEFED_ON_KEY).await.unwrap().is_none());
    store.set_flag(BRIEFED_ON_KEY, "2025-06-01").await.unwrap();
    store.set_flag(BRIEFED_ON_KEY, "2025-06-02").await.unwrap();
    assert_eq!(store.get_flag(BRIEFED_ON_KEY).await.unwrap().as_deref(), Some("2025-06-02"));
}

#[tokio::test]
async fn test_open_loop_lifecycle() {
    let store = store().await;
    let loops = OpenLoopTracker::new(store.clone());
    let now = Utc::now();

    let created = loops
        .analyze_message("I have a job interview tomorrow, wish me luck", now)
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    // Same topic again does not duplicate
    assert!(loops
        .analyze_message("I have an interview tomorrow!!", now)
        .await
        .unwrap()
        .is_empty());

    let l = &created[0];
    let once = loops.mark_surfaced(l, now + Duration::days(1)).await.unwrap();
    assert_eq!(once.status, LoopStatus::Surfaced);
    let twice = loops.mark_surfaced(&once, now + Duration::days(2)).await.unwrap();
    assert_eq!(twice.status, LoopStatus::Resolved);
    assert!(loops.active(now + Duration::days(2)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_open_loops_expire_after_a_week() {
    let store = store().await;
    let loops = OpenLoopTracker::new(store.clone());
    let now = Utc::now();
    loops
        .analyze_message("I've been so stressed", now - Duration::days(8))
        .await
        .unwrap();
    assert!(loops.active(now).await.unwrap().is_empty());
    assert!(store.list_open_loops().await.unwrap().is_empty());
}
