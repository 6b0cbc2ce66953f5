use crate::store::CompanionStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use kayley_core::{
    ArcEvent, ArcType, ChatRole, ChatTurn, Fact, LifeEvent, LifeEventCategory, LoopStatus, LoopType,
    MilestoneType, MoodState, NarrativeArc, OngoingThread, OpenLoop, PatternType, RelationshipMetrics,
    RelationshipMilestone, StoredEnum, ThreadTheme, Timestamp, UserPattern,
};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::collections::BTreeSet;
use std::path::Path;
use uuid::Uuid;

/// SQLite-backed [`CompanionStore`].
///
/// Timestamps are stored as fixed-width RFC3339 text so that `ORDER BY`
/// on the column is chronological.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref().display().to_string();
        let in_memory = path == ":memory:";

        let mut options = SqlitePoolOptions::new();
        let db_url = if in_memory {
            // Every connection to :memory: is its own database, so pin the pool
            // to one connection that never gets recycled.
            options = options
                .max_connections(1)
                .idle_timeout(None::<std::time::Duration>)
                .max_lifetime(None::<std::time::Duration>);
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", path)
        };

        let pool = options
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!("Opened companion store at {}", path);
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let statements: &[(&str, &str)] = &[
            (
                "threads",
                r#"
                CREATE TABLE IF NOT EXISTS threads (
                    id TEXT PRIMARY KEY,
                    theme TEXT NOT NULL,
                    current_state TEXT NOT NULL,
                    intensity REAL NOT NULL,
                    created_at TEXT NOT NULL,
                    last_updated TEXT NOT NULL,
                    last_mentioned TEXT,
                    user_related INTEGER NOT NULL DEFAULT 0,
                    user_trigger TEXT
                );
                "#,
            ),
            (
                "patterns",
                r#"
                CREATE TABLE IF NOT EXISTS patterns (
                    id TEXT PRIMARY KEY,
                    pattern_type TEXT NOT NULL,
                    observation TEXT NOT NULL,
                    frequency INTEGER NOT NULL,
                    confidence REAL NOT NULL,
                    first_observed TEXT NOT NULL,
                    last_observed TEXT NOT NULL,
                    surface_count INTEGER NOT NULL DEFAULT 0,
                    last_surfaced_at TEXT,
                    UNIQUE (pattern_type, observation)
                );
                "#,
            ),
            (
                "milestones",
                r#"
                CREATE TABLE IF NOT EXISTS milestones (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    milestone_type TEXT NOT NULL,
                    description TEXT NOT NULL,
                    trigger_context TEXT NOT NULL,
                    occurred_at TEXT NOT NULL,
                    reference_count INTEGER NOT NULL DEFAULT 0,
                    last_referenced_at TEXT
                );
                "#,
            ),
            (
                "milestones unique index",
                r#"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_milestones_once
                ON milestones(user_id, milestone_type)
                WHERE milestone_type NOT IN ('anniversary_week', 'anniversary_month');
                "#,
            ),
            (
                "narrative_arcs",
                r#"
                CREATE TABLE IF NOT EXISTS narrative_arcs (
                    arc_key TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    arc_type TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    resolved_at TEXT,
                    resolution TEXT,
                    events_json TEXT NOT NULL,
                    mentioned_to_json TEXT NOT NULL
                );
                "#,
            ),
            (
                "life_events",
                r#"
                CREATE TABLE IF NOT EXISTS life_events (
                    id TEXT PRIMARY KEY,
                    description TEXT NOT NULL,
                    category TEXT NOT NULL,
                    intensity REAL NOT NULL,
                    created_at TEXT NOT NULL
                );
                "#,
            ),
            (
                "open_loops",
                r#"
                CREATE TABLE IF NOT EXISTS open_loops (
                    id TEXT PRIMARY KEY,
                    topic TEXT NOT NULL,
                    loop_type TEXT NOT NULL,
                    trigger_context TEXT NOT NULL,
                    salience REAL NOT NULL,
                    surface_after TEXT,
                    surface_count INTEGER NOT NULL DEFAULT 0,
                    max_surfaces INTEGER NOT NULL DEFAULT 2,
                    status TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    last_surfaced_at TEXT
                );
                "#,
            ),
            (
                "conversation_history",
                r#"
                CREATE TABLE IF NOT EXISTS conversation_history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    role TEXT NOT NULL,
                    text TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                "#,
            ),
            (
                "user_facts",
                r#"
                CREATE TABLE IF NOT EXISTS user_facts (
                    category TEXT NOT NULL,
                    fact_key TEXT NOT NULL,
                    fact_value TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (category, fact_key)
                );
                "#,
            ),
            (
                "character_facts",
                r#"
                CREATE TABLE IF NOT EXISTS character_facts (
                    character_id TEXT NOT NULL,
                    category TEXT NOT NULL,
                    fact_key TEXT NOT NULL,
                    fact_value TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (character_id, category, fact_key)
                );
                "#,
            ),
            (
                "mood_state",
                r#"
                CREATE TABLE IF NOT EXISTS mood_state (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    state_json TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                "#,
            ),
            (
                "relationship_state",
                r#"
                CREATE TABLE IF NOT EXISTS relationship_state (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    state_json TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                "#,
            ),
            (
                "kv_flags",
                r#"
                CREATE TABLE IF NOT EXISTS kv_flags (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
                "#,
            ),
        ];

        for (name, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to create {}", name))?;
        }
        Ok(())
    }
}

// ============================================================================
// Column helpers
// ============================================================================

fn ts_to_db(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn opt_ts_to_db(ts: &Option<Timestamp>) -> Option<String> {
    ts.as_ref().map(ts_to_db)
}

fn ts_from_db(s: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

fn opt_ts_from_db(s: Option<String>) -> Option<Timestamp> {
    s.as_deref().and_then(ts_from_db)
}

fn count_from_db(v: i64) -> u32 {
    u32::try_from(v.max(0)).unwrap_or(u32::MAX)
}

fn thread_from_row(row: &SqliteRow) -> Option<OngoingThread> {
    let id: String = row.get("id");
    let theme: String = row.get("theme");
    let created_at: String = row.get("created_at");
    let last_updated: String = row.get("last_updated");
    let intensity: f64 = row.get("intensity");
    let created_at = ts_from_db(&created_at)?;
    Some(OngoingThread {
        id: Uuid::parse_str(&id).ok()?,
        theme: ThreadTheme::parse(&theme)?,
        current_state: row.get("current_state"),
        intensity: intensity as f32,
        created_at,
        last_updated: ts_from_db(&last_updated).unwrap_or(created_at),
        last_mentioned: opt_ts_from_db(row.get("last_mentioned")),
        user_related: row.get::<i64, _>("user_related") != 0,
        user_trigger: row.get("user_trigger"),
    })
}

fn pattern_from_row(row: &SqliteRow) -> Option<UserPattern> {
    let id: String = row.get("id");
    let pattern_type: String = row.get("pattern_type");
    let first_observed: String = row.get("first_observed");
    let last_observed: String = row.get("last_observed");
    let confidence: f64 = row.get("confidence");
    Some(UserPattern {
        id: Uuid::parse_str(&id).ok()?,
        pattern_type: PatternType::parse(&pattern_type)?,
        observation: row.get("observation"),
        frequency: count_from_db(row.get("frequency")),
        confidence: confidence as f32,
        first_observed: ts_from_db(&first_observed)?,
        last_observed: ts_from_db(&last_observed)?,
        surface_count: count_from_db(row.get("surface_count")),
        last_surfaced_at: opt_ts_from_db(row.get("last_surfaced_at")),
    })
}

fn milestone_from_row(row: &SqliteRow) -> Option<RelationshipMilestone> {
    let id: String = row.get("id");
    let milestone_type: String = row.get("milestone_type");
    let occurred_at: String = row.get("occurred_at");
    Some(RelationshipMilestone {
        id: Uuid::parse_str(&id).ok()?,
        user_id: row.get("user_id"),
        milestone_type: MilestoneType::parse(&milestone_type)?,
        description: row.get("description"),
        trigger_context: row.get("trigger_context"),
        occurred_at: ts_from_db(&occurred_at)?,
        reference_count: count_from_db(row.get("reference_count")),
        last_referenced_at: opt_ts_from_db(row.get("last_referenced_at")),
    })
}

fn arc_from_row(row: &SqliteRow) -> Result<Option<NarrativeArc>> {
    let arc_key: String = row.get("arc_key");
    let arc_type: String = row.get("arc_type");
    let started_at: String = row.get("started_at");
    let events_json: String = row.get("events_json");
    let mentioned_json: String = row.get("mentioned_to_json");

    let (Some(arc_type), Some(started_at)) = (ArcType::parse(&arc_type), ts_from_db(&started_at)) else {
        tracing::warn!("Skipping malformed narrative arc row {}", arc_key);
        return Ok(None);
    };
    let events: Vec<ArcEvent> = serde_json::from_str(&events_json)
        .with_context(|| format!("Failed to deserialize events of arc {}", arc_key))?;
    let mentioned_to: BTreeSet<String> = serde_json::from_str(&mentioned_json)
        .with_context(|| format!("Failed to deserialize mentioned_to of arc {}", arc_key))?;

    Ok(Some(NarrativeArc {
        arc_key,
        title: row.get("title"),
        arc_type,
        started_at,
        resolved_at: opt_ts_from_db(row.get("resolved_at")),
        resolution: row.get("resolution"),
        events,
        mentioned_to,
    }))
}

fn life_event_from_row(row: &SqliteRow) -> Option<LifeEvent> {
    let id: String = row.get("id");
    let category: String = row.get("category");
    let created_at: String = row.get("created_at");
    let intensity: f64 = row.get("intensity");
    Some(LifeEvent {
        id: Uuid::parse_str(&id).ok()?,
        description: row.get("description"),
        category: LifeEventCategory::parse(&category)?,
        intensity: intensity as f32,
        created_at: ts_from_db(&created_at)?,
    })
}

fn open_loop_from_row(row: &SqliteRow) -> Option<OpenLoop> {
    let id: String = row.get("id");
    let loop_type: String = row.get("loop_type");
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    let salience: f64 = row.get("salience");
    Some(OpenLoop {
        id: Uuid::parse_str(&id).ok()?,
        topic: row.get("topic"),
        loop_type: LoopType::parse(&loop_type)?,
        trigger_context: row.get("trigger_context"),
        salience: salience as f32,
        surface_after: opt_ts_from_db(row.get("surface_after")),
        surface_count: count_from_db(row.get("surface_count")),
        max_surfaces: count_from_db(row.get("max_surfaces")),
        status: LoopStatus::parse(&status)?,
        created_at: ts_from_db(&created_at)?,
        last_surfaced_at: opt_ts_from_db(row.get("last_surfaced_at")),
    })
}

fn fact_from_row(row: &SqliteRow) -> Option<Fact> {
    let updated_at: String = row.get("updated_at");
    Some(Fact {
        category: row.get("category"),
        fact_key: row.get("fact_key"),
        fact_value: row.get("fact_value"),
        updated_at: ts_from_db(&updated_at)?,
    })
}

/// Convert rows, logging and skipping the ones that no longer parse.
fn collect_rows<T>(rows: &[SqliteRow], table: &str, convert: impl Fn(&SqliteRow) -> Option<T>) -> Vec<T> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        match convert(row) {
            Some(v) => out.push(v),
            None => tracing::warn!("Skipping malformed row in {}", table),
        }
    }
    out
}

// ============================================================================
// CompanionStore
// ============================================================================

#[async_trait]
impl CompanionStore for SqliteStore {
    async fn load_threads(&self) -> Result<Vec<OngoingThread>> {
        let rows = sqlx::query("SELECT * FROM threads ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load threads")?;
        Ok(collect_rows(&rows, "threads", thread_from_row))
    }

    async fn save_threads(&self, threads: &[OngoingThread]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin thread transaction")?;
        sqlx::query("DELETE FROM threads")
            .execute(&mut *tx)
            .await
            .context("Failed to clear threads")?;
        for t in threads {
            sqlx::query(
                "INSERT INTO threads (id, theme, current_state, intensity, created_at, last_updated, last_mentioned, user_related, user_trigger) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(t.id.to_string())
            .bind(t.theme.as_str())
            .bind(&t.current_state)
            .bind(t.intensity as f64)
            .bind(ts_to_db(&t.created_at))
            .bind(ts_to_db(&t.last_updated))
            .bind(opt_ts_to_db(&t.last_mentioned))
            .bind(t.user_related as i64)
            .bind(&t.user_trigger)
            .execute(&mut *tx)
            .await
            .context("Failed to insert thread")?;
        }
        tx.commit().await.context("Failed to commit threads")?;
        tracing::debug!("Saved {} threads", threads.len());
        Ok(())
    }

    async fn find_pattern(&self, pattern_type: PatternType, observation: &str) -> Result<Option<UserPattern>> {
        let row = sqlx::query("SELECT * FROM patterns WHERE pattern_type = ? AND observation = ?")
            .bind(pattern_type.as_str())
            .bind(observation)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query pattern")?;
        Ok(row.as_ref().and_then(pattern_from_row))
    }

    async fn upsert_pattern(&self, p: &UserPattern) -> Result<()> {
        sqlx::query(
            "INSERT INTO patterns (id, pattern_type, observation, frequency, confidence, first_observed, last_observed, surface_count, last_surfaced_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(pattern_type, observation) DO UPDATE SET \
                frequency = excluded.frequency, \
                confidence = MAX(patterns.confidence, excluded.confidence), \
                last_observed = excluded.last_observed, \
                surface_count = excluded.surface_count, \
                last_surfaced_at = excluded.last_surfaced_at",
        )
        .bind(p.id.to_string())
        .bind(p.pattern_type.as_str())
        .bind(&p.observation)
        .bind(p.frequency as i64)
        .bind(p.confidence as f64)
        .bind(ts_to_db(&p.first_observed))
        .bind(ts_to_db(&p.last_observed))
        .bind(p.surface_count as i64)
        .bind(opt_ts_to_db(&p.last_surfaced_at))
        .execute(&self.pool)
        .await
        .context("Failed to upsert pattern")?;
        Ok(())
    }

    async fn list_patterns(&self) -> Result<Vec<UserPattern>> {
        let rows = sqlx::query("SELECT * FROM patterns ORDER BY confidence DESC, frequency DESC")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list patterns")?;
        Ok(collect_rows(&rows, "patterns", pattern_from_row))
    }

    async fn insert_milestone(&self, m: &RelationshipMilestone) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO milestones (id, user_id, milestone_type, description, trigger_context, occurred_at, reference_count, last_referenced_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(m.id.to_string())
        .bind(&m.user_id)
        .bind(m.milestone_type.as_str())
        .bind(&m.description)
        .bind(&m.trigger_context)
        .bind(ts_to_db(&m.occurred_at))
        .bind(m.reference_count as i64)
        .bind(opt_ts_to_db(&m.last_referenced_at))
        .execute(&self.pool)
        .await
        .context("Failed to insert milestone")?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_milestone(&self, user_id: &str, milestone_type: MilestoneType) -> Result<Option<RelationshipMilestone>> {
        let row = sqlx::query(
            "SELECT * FROM milestones WHERE user_id = ? AND milestone_type = ? ORDER BY occurred_at ASC LIMIT 1",
        )
        .bind(user_id)
        .bind(milestone_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query milestone")?;
        Ok(row.as_ref().and_then(milestone_from_row))
    }

    async fn list_milestones(&self, user_id: &str) -> Result<Vec<RelationshipMilestone>> {
        let rows = sqlx::query("SELECT * FROM milestones WHERE user_id = ? ORDER BY occurred_at ASC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list milestones")?;
        Ok(collect_rows(&rows, "milestones", milestone_from_row))
    }

    async fn update_milestone(&self, m: &RelationshipMilestone) -> Result<()> {
        sqlx::query("UPDATE milestones SET reference_count = ?, last_referenced_at = ? WHERE id = ?")
            .bind(m.reference_count as i64)
            .bind(opt_ts_to_db(&m.last_referenced_at))
            .bind(m.id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update milestone")?;
        Ok(())
    }

    async fn get_arc(&self, arc_key: &str) -> Result<Option<NarrativeArc>> {
        let row = sqlx::query("SELECT * FROM narrative_arcs WHERE arc_key = ?")
            .bind(arc_key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query narrative arc")?;
        match row {
            Some(row) => arc_from_row(&row),
            None => Ok(None),
        }
    }

    async fn save_arc(&self, arc: &NarrativeArc) -> Result<()> {
        let events_json = serde_json::to_string(&arc.events).context("Failed to serialize arc events")?;
        let mentioned_json =
            serde_json::to_string(&arc.mentioned_to).context("Failed to serialize arc mentioned_to")?;
        sqlx::query(
            "INSERT INTO narrative_arcs (arc_key, title, arc_type, started_at, resolved_at, resolution, events_json, mentioned_to_json) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(arc_key) DO UPDATE SET \
                title = excluded.title, \
                arc_type = excluded.arc_type, \
                resolved_at = excluded.resolved_at, \
                resolution = excluded.resolution, \
                events_json = excluded.events_json, \
                mentioned_to_json = excluded.mentioned_to_json",
        )
        .bind(&arc.arc_key)
        .bind(&arc.title)
        .bind(arc.arc_type.as_str())
        .bind(ts_to_db(&arc.started_at))
        .bind(opt_ts_to_db(&arc.resolved_at))
        .bind(&arc.resolution)
        .bind(&events_json)
        .bind(&mentioned_json)
        .execute(&self.pool)
        .await
        .context("Failed to save narrative arc")?;
        Ok(())
    }

    async fn list_arcs(&self, arc_type: Option<ArcType>) -> Result<Vec<NarrativeArc>> {
        let rows = match arc_type {
            Some(t) => sqlx::query("SELECT * FROM narrative_arcs WHERE arc_type = ? ORDER BY started_at DESC")
                .bind(t.as_str())
                .fetch_all(&self.pool)
                .await,
            None => sqlx::query("SELECT * FROM narrative_arcs ORDER BY started_at DESC")
                .fetch_all(&self.pool)
                .await,
        }
        .context("Failed to list narrative arcs")?;

        let mut arcs = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(arc) = arc_from_row(row)? {
                arcs.push(arc);
            }
        }
        Ok(arcs)
    }

    async fn insert_life_event(&self, e: &LifeEvent) -> Result<()> {
        sqlx::query("INSERT INTO life_events (id, description, category, intensity, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(e.id.to_string())
            .bind(&e.description)
            .bind(e.category.as_str())
            .bind(e.intensity as f64)
            .bind(ts_to_db(&e.created_at))
            .execute(&self.pool)
            .await
            .context("Failed to insert life event")?;
        Ok(())
    }

    async fn recent_life_events(&self, limit: usize) -> Result<Vec<LifeEvent>> {
        let rows = sqlx::query("SELECT * FROM life_events ORDER BY created_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query life events")?;
        Ok(collect_rows(&rows, "life_events", life_event_from_row))
    }

    async fn insert_open_loop(&self, l: &OpenLoop) -> Result<()> {
        sqlx::query(
            "INSERT INTO open_loops (id, topic, loop_type, trigger_context, salience, surface_after, surface_count, max_surfaces, status, created_at, last_surfaced_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(l.id.to_string())
        .bind(&l.topic)
        .bind(l.loop_type.as_str())
        .bind(&l.trigger_context)
        .bind(l.salience as f64)
        .bind(opt_ts_to_db(&l.surface_after))
        .bind(l.surface_count as i64)
        .bind(l.max_surfaces as i64)
        .bind(l.status.as_str())
        .bind(ts_to_db(&l.created_at))
        .bind(opt_ts_to_db(&l.last_surfaced_at))
        .execute(&self.pool)
        .await
        .context("Failed to insert open loop")?;
        Ok(())
    }

    async fn update_open_loop(&self, l: &OpenLoop) -> Result<()> {
        sqlx::query(
            "UPDATE open_loops SET salience = ?, surface_after = ?, surface_count = ?, status = ?, last_surfaced_at = ? WHERE id = ?",
        )
        .bind(l.salience as f64)
        .bind(opt_ts_to_db(&l.surface_after))
        .bind(l.surface_count as i64)
        .bind(l.status.as_str())
        .bind(opt_ts_to_db(&l.last_surfaced_at))
        .bind(l.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update open loop")?;
        Ok(())
    }

    async fn list_open_loops(&self) -> Result<Vec<OpenLoop>> {
        let rows = sqlx::query(
            "SELECT * FROM open_loops WHERE status IN ('active', 'surfaced') ORDER BY salience DESC, created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list open loops")?;
        Ok(collect_rows(&rows, "open_loops", open_loop_from_row))
    }

    async fn append_turn(&self, turn: &ChatTurn) -> Result<()> {
        sqlx::query("INSERT INTO conversation_history (role, text, created_at) VALUES (?, ?, ?)")
            .bind(turn.role.as_str())
            .bind(&turn.text)
            .bind(ts_to_db(&turn.created_at))
            .execute(&self.pool)
            .await
            .context("Failed to append conversation turn")?;
        Ok(())
    }

    async fn recent_turns(&self, limit: usize) -> Result<Vec<ChatTurn>> {
        let rows = sqlx::query("SELECT role, text, created_at FROM conversation_history ORDER BY id DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query conversation history")?;
        let mut turns = collect_rows(&rows, "conversation_history", |row| {
            let role: String = row.get("role");
            let created_at: String = row.get("created_at");
            Some(ChatTurn {
                role: ChatRole::parse(&role)?,
                text: row.get("text"),
                created_at: ts_from_db(&created_at)?,
            })
        });
        // Oldest first
        turns.reverse();
        Ok(turns)
    }

    async fn upsert_user_fact(&self, category: &str, fact_key: &str, fact_value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO user_facts (category, fact_key, fact_value, updated_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(category, fact_key) DO UPDATE SET fact_value = excluded.fact_value, updated_at = excluded.updated_at",
        )
        .bind(category)
        .bind(fact_key)
        .bind(fact_value)
        .bind(ts_to_db(&Utc::now()))
        .execute(&self.pool)
        .await
        .context("Failed to upsert user fact")?;
        tracing::debug!("Stored user fact {}.{}", category, fact_key);
        Ok(())
    }

    async fn user_facts(&self) -> Result<Vec<Fact>> {
        let rows = sqlx::query("SELECT * FROM user_facts ORDER BY category, fact_key")
            .fetch_all(&self.pool)
            .await
            .context("Failed to query user facts")?;
        Ok(collect_rows(&rows, "user_facts", fact_from_row))
    }

    async fn upsert_character_fact(
        &self,
        character_id: &str,
        category: &str,
        fact_key: &str,
        fact_value: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO character_facts (character_id, category, fact_key, fact_value, updated_at) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(character_id, category, fact_key) DO UPDATE SET fact_value = excluded.fact_value, updated_at = excluded.updated_at",
        )
        .bind(character_id)
        .bind(category)
        .bind(fact_key)
        .bind(fact_value)
        .bind(ts_to_db(&Utc::now()))
        .execute(&self.pool)
        .await
        .context("Failed to upsert character fact")?;
        Ok(())
    }

    async fn character_facts(&self, character_id: &str) -> Result<Vec<Fact>> {
        let rows = sqlx::query("SELECT * FROM character_facts WHERE character_id = ? ORDER BY category, fact_key")
            .bind(character_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query character facts")?;
        Ok(collect_rows(&rows, "character_facts", fact_from_row))
    }

    async fn load_mood(&self) -> Result<Option<MoodState>> {
        let row = sqlx::query("SELECT state_json FROM mood_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query mood_state")?;
        match row {
            Some(row) => {
                let json: String = row.get("state_json");
                Ok(Some(serde_json::from_str(&json).context("Failed to deserialize mood state")?))
            }
            None => Ok(None),
        }
    }

    async fn save_mood(&self, mood: &MoodState) -> Result<()> {
        let json = serde_json::to_string(mood).context("Failed to serialize mood state")?;
        sqlx::query(
            "INSERT INTO mood_state (id, state_json, updated_at) VALUES (1, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at",
        )
        .bind(&json)
        .bind(ts_to_db(&Utc::now()))
        .execute(&self.pool)
        .await
        .context("Failed to save mood state")?;
        tracing::debug!("Mood state saved");
        Ok(())
    }

    async fn load_relationship(&self) -> Result<Option<RelationshipMetrics>> {
        let row = sqlx::query("SELECT state_json FROM relationship_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query relationship_state")?;
        match row {
            Some(row) => {
                let json: String = row.get("state_json");
                Ok(Some(serde_json::from_str(&json).context("Failed to deserialize relationship metrics")?))
            }
            None => Ok(None),
        }
    }

    async fn save_relationship(&self, metrics: &RelationshipMetrics) -> Result<()> {
        let json = serde_json::to_string(metrics).context("Failed to serialize relationship metrics")?;
        sqlx::query(
            "INSERT INTO relationship_state (id, state_json, updated_at) VALUES (1, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at",
        )
        .bind(&json)
        .bind(ts_to_db(&Utc::now()))
        .execute(&self.pool)
        .await
        .context("Failed to save relationship metrics")?;
        Ok(())
    }

    async fn get_flag(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_flags WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query flag")?;
        Ok(row.map(|r| r.get("value")))
    }

    async fn set_flag(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query("INSERT INTO kv_flags (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .context("Failed to set flag")?;
        Ok(())
    }
}
