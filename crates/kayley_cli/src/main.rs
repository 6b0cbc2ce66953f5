use anyhow::Context;
use clap::Parser;
use kayley_core::calendar::InMemoryCalendar;
use kayley_core::tasks::InMemoryTaskList;
use kayley_core::{Character, KayleyConfig};
use kayley_expression::{CalendarCheckins, DailyCatchupScheduler, PresenceScheduler, ProactiveEvent};
use kayley_memory::{CompanionStore, SqliteStore};
use kayley_reasoning::actions::ActionOutcome;
use kayley_reasoning::media::XaiMediaClient;
use kayley_reasoning::providers::build_provider;
use kayley_reasoning::{ChatSession, Orchestrator, TurnContext, TurnResult, UserContent};
use kayley_voice::{build_tts, SpeechCallback, SpeechMode, SpeechOutput};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "kayley.toml")]
    config: String,

    /// Override the database path from config
    #[arg(short, long, env = "KAYLEY_DB_PATH")]
    db: Option<String>,

    /// Your name, so Kayley can use it
    #[arg(short = 'n', long, env = "KAYLEY_USER_NAME")]
    name: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Skip the opening greeting
    #[arg(long)]
    no_greeting: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn prompt() -> std::io::Result<()> {
    print!("> ");
    std::io::stdout().flush()
}

fn print_turn(name: &str, turn: &TurnResult) {
    println!("\n{}: {}\n", name, turn.response.text_response);
    for outcome in &turn.actions {
        match outcome {
            ActionOutcome::CalendarCreated(e) => println!("  [calendar] added {}", e.summary),
            ActionOutcome::CalendarDeleted(ids) => println!("  [calendar] removed {} event(s)", ids.len()),
            ActionOutcome::TaskCreated(t) => println!("  [tasks] added {}", t.text),
            ActionOutcome::TaskCompleted(id) => println!("  [tasks] completed {}", id),
            ActionOutcome::TaskDeleted(id) => println!("  [tasks] removed {}", id),
            ActionOutcome::TaskListed(tasks) => {
                for t in tasks {
                    let mark = if t.completed { "x" } else { " " };
                    println!("  [{}] {}", mark, t.text);
                }
            }
            ActionOutcome::Media(m) => println!("  [{:?}] {}", m.kind, m.url),
            ActionOutcome::OpenApp(app) => println!("  [open] {}", app),
            ActionOutcome::Whiteboard(kind) => println!("  [whiteboard] {}", kind),
            ActionOutcome::Skipped { action, reason } => println!("  [{}] skipped: {}", action, reason),
            ActionOutcome::Failed { action, error } => println!("  [{}] failed: {}", action, error),
        }
    }
    if let Some(speech) = &turn.speech {
        println!("  [voice] {} ({} base64 chars)", speech.mime_type, speech.audio_base64.len());
    }
}

fn turn_context(session: &ChatSession, name: Option<&str>) -> TurnContext {
    let ctx = TurnContext::new(session.clone());
    match name {
        Some(n) => ctx.with_user_name(n),
        None => ctx,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("Initializing Kayley...");
    let mut config = KayleyConfig::load_or_default(&args.config);
    if let Some(db) = args.db {
        config.storage.db_path = db;
    }

    // 1. Storage
    info!("Opening store at {}...", config.storage.db_path);
    let store: Arc<dyn CompanionStore> = Arc::new(
        SqliteStore::new(&config.storage.db_path)
            .await
            .context("Failed to open companion store")?,
    );

    // 2. Providers
    info!("Using {} provider with model {}...", config.llm.provider, config.llm.model);
    let providers = build_provider(&config.llm)?;

    // 3. Orchestrator
    let calendar = Arc::new(InMemoryCalendar::new());
    let tasks = Arc::new(InMemoryTaskList::new());
    let mut orchestrator = Orchestrator::new(&config, store.clone(), providers, calendar, tasks);

    let character = match &config.character.profile_path {
        Some(path) => match Character::load(path).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to load character profile {}: {:#}, using default", path, e);
                Character::default()
            }
        },
        None => Character::default(),
    };
    let character_name = character.name.clone();
    orchestrator.set_character(character);

    let on_audio: SpeechCallback = Arc::new(|out: SpeechOutput| {
        info!(mime = out.mime_type, bytes = out.audio_base64.len(), "Speech ready");
    });
    let tts = build_tts(&config.voice)?;
    orchestrator.set_speech(SpeechMode::from_setting(config.voice.mode, Some(on_audio)), tts);

    if let Some(key) = config.llm.xai_api_key.as_deref().filter(|k| !k.is_empty()) {
        orchestrator.set_media(Arc::new(XaiMediaClient::new(key, None)?));
    } else {
        info!("XAI_API_KEY not set, selfies and videos disabled");
    }
    orchestrator.restore_activity().await;

    // 4. Proactive schedulers
    let (proactive_tx, mut proactive_rx) = mpsc::channel::<ProactiveEvent>(16);
    let catchup = DailyCatchupScheduler::new(
        config.schedule.daily_catchup_hour,
        config.schedule.daily_catchup_minute,
        orchestrator.activity_clock(),
        PresenceScheduler::from_config(&config.schedule),
    )
    .spawn(proactive_tx.clone());
    let checkins = Arc::new(CalendarCheckins::new(
        orchestrator.calendar(),
        store.clone(),
        orchestrator.presence(),
        PresenceScheduler::from_config(&config.schedule),
    ))
    .spawn(
        std::time::Duration::from_secs(config.schedule.checkin_poll_secs.max(1)),
        proactive_tx,
    );

    let user_name = args.name.as_deref();
    let mut session = ChatSession::default();

    println!("{} is here. Type 'quit' to exit.", character_name);
    if !args.no_greeting {
        match orchestrator.generate_greeting(turn_context(&session, user_name)).await {
            Ok(turn) => {
                print_turn(&character_name, &turn);
                session = turn.session;
            }
            Err(e) => error!("Greeting failed: {}", e),
        }
    }
    prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let trimmed = line.trim();
                if trimmed == "quit" || trimmed == "exit" {
                    break;
                }
                if trimmed.is_empty() {
                    prompt()?;
                    continue;
                }
                let ctx = turn_context(&session, user_name);
                match orchestrator.process_message(UserContent::text(trimmed), ctx).await {
                    Ok(turn) => {
                        print_turn(&character_name, &turn);
                        session = turn.session;
                    }
                    Err(e) => {
                        error!("Turn failed: {}", e);
                        println!("\n[System Error]: {}\n", e);
                    }
                }
                prompt()?;
            }
            Some(event) = proactive_rx.recv() => {
                info!("Proactive event: {:?}", event);
                match orchestrator.handle_proactive(event, turn_context(&session, user_name)).await {
                    Ok(turn) => {
                        print_turn(&character_name, &turn);
                        session = turn.session;
                    }
                    Err(e) => error!("Proactive message failed: {}", e),
                }
                prompt()?;
            }
        }
    }

    info!("Shutting down...");
    catchup.shutdown().await;
    checkins.shutdown().await;
    orchestrator.shutdown().await;
    Ok(())
}
