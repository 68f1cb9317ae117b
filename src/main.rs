//! Quiz Arena Back binary entrypoint wiring REST and SSE layers.

use std::{collections::HashMap, env, fs, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use quiz_arena_back::{
    config::AppConfig,
    dao::{
        memory::{
            FlatRewardService, MemoryAnswerLog, MemoryHistoryStore, MemoryInventoryStore,
            MemoryMatchRepository, MemoryQuestionSource, MemoryRosterStore,
            RecordingProgressHooks,
        },
        models::{ConsumableKind, MatchRecord, QuestionEntity},
    },
    routes,
    state::{AppState, Collaborators, SharedState},
};

/// Environment variable pointing at an optional JSON seed file.
const SEED_PATH_ENV: &str = "QUIZ_ARENA_BACK_SEED_PATH";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config, in_memory_collaborators()?);
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Roster entry in a seed file.
#[derive(Debug, Deserialize)]
struct SeedPlayer {
    player_id: Uuid,
    name: String,
}

/// Content loaded into the in-memory backends at startup. Every section is
/// optional so a partial file only seeds what it names.
#[derive(Debug, Default, Deserialize)]
struct SeedFile {
    #[serde(default)]
    matches: Vec<MatchRecord>,
    #[serde(default)]
    question_sets: HashMap<Uuid, Vec<QuestionEntity>>,
    #[serde(default)]
    rosters: HashMap<Uuid, Vec<SeedPlayer>>,
    #[serde(default)]
    inventories: HashMap<Uuid, HashMap<ConsumableKind, u32>>,
}

/// Wire the in-memory collaborator backends used by standalone deployments,
/// seeding them from the configured seed file when one is present.
fn in_memory_collaborators() -> anyhow::Result<Collaborators> {
    let matches = Arc::new(MemoryMatchRepository::new());
    let questions = Arc::new(MemoryQuestionSource::new());
    let roster = Arc::new(MemoryRosterStore::new());
    let inventory = Arc::new(MemoryInventoryStore::new());

    if let Some(path) = env::var_os(SEED_PATH_ENV).filter(|value| !value.is_empty()) {
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading seed file {}", path.to_string_lossy()))?;
        let seed: SeedFile = serde_json::from_str(&contents)
            .with_context(|| format!("parsing seed file {}", path.to_string_lossy()))?;

        info!(
            matches = seed.matches.len(),
            question_sets = seed.question_sets.len(),
            "seeding in-memory backends"
        );
        for record in seed.matches {
            matches.insert(record);
        }
        for (set_id, set) in seed.question_sets {
            questions.insert_set(set_id, set);
        }
        for (match_id, players) in seed.rosters {
            for player in players {
                roster.join(match_id, player.player_id, player.name);
            }
        }
        for (player_id, grants) in seed.inventories {
            for (kind, quantity) in grants {
                inventory.grant(player_id, kind, quantity);
            }
        }
    }

    Ok(Collaborators {
        matches,
        questions,
        roster,
        answers: Arc::new(MemoryAnswerLog::new()),
        history: Arc::new(MemoryHistoryStore::new()),
        rewards: Arc::new(FlatRewardService::new()),
        progress: Arc::new(RecordingProgressHooks::new()),
        inventory,
    })
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
