//! Smart Quiz Back binary entrypoint wiring configuration, storage, generation and HTTP layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smart_quiz_back::{
    config::AppConfig,
    dao::{
        quiz_store::{QuizStore, memory::MemoryQuizStore},
        storage::StorageError,
    },
    generator::{
        DisabledGenerator, QuestionGenerator,
        gemini::{GeminiConfig, GeminiGenerator},
    },
    routes,
    services::{session_service, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config, build_generator());

    start_storage(&app_state).await?;
    tokio::spawn(session_service::run_sweeper(app_state.clone()));

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Gemini when `GEMINI_API_KEY` is set; otherwise only stored quizzes can be played.
fn build_generator() -> Arc<dyn QuestionGenerator> {
    match GeminiConfig::from_env() {
        Some(config) => {
            info!(model = %config.model, "question generation enabled");
            Arc::new(GeminiGenerator::new(config))
        }
        None => {
            warn!("GEMINI_API_KEY not set; question generation disabled");
            Arc::new(DisabledGenerator)
        }
    }
}

/// Install the backend selected by `STORE_BACKEND` (`mongo`, `couch` or `memory`).
async fn start_storage(state: &SharedState) -> anyhow::Result<()> {
    let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| default_backend().into());
    info!(backend = %backend, "selecting quiz store backend");

    match backend.as_str() {
        "memory" => {
            state
                .set_quiz_store(Arc::new(MemoryQuizStore::new()) as Arc<dyn QuizStore>)
                .await;
        }
        #[cfg(feature = "mongo-store")]
        "mongo" => {
            use smart_quiz_back::dao::quiz_store::mongodb::{MongoConfig, MongoQuizStore};

            let mongo_config = MongoConfig::from_env()
                .await
                .context("reading MongoDB configuration")?;
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let config = mongo_config.clone();
                async move {
                    MongoQuizStore::connect(config)
                        .await
                        .map(|store| Arc::new(store) as Arc<dyn QuizStore>)
                        .map_err(StorageError::from)
                }
            }));
        }
        #[cfg(feature = "couch-store")]
        "couch" => {
            use smart_quiz_back::dao::quiz_store::couchdb::{CouchConfig, CouchQuizStore};

            let couch_config = CouchConfig::from_env().context("reading CouchDB configuration")?;
            tokio::spawn(storage_supervisor::run(state.clone(), move || {
                let config = couch_config.clone();
                async move {
                    CouchQuizStore::connect(config)
                        .await
                        .map(|store| Arc::new(store) as Arc<dyn QuizStore>)
                        .map_err(StorageError::from)
                }
            }));
        }
        other => bail!("unsupported STORE_BACKEND `{other}`"),
    }
    Ok(())
}

fn default_backend() -> &'static str {
    if cfg!(feature = "mongo-store") {
        "mongo"
    } else if cfg!(feature = "couch-store") {
        "couch"
    } else {
        "memory"
    }
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

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
