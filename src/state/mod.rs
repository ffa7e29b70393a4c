pub mod quiz;
pub mod session;
mod sse;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::{
    sync::{Mutex, MutexGuard, RwLock, watch},
    task::AbortHandle,
    time::Instant,
};
use uuid::Uuid;

use crate::{
    config::AppConfig, dao::quiz_store::QuizStore, error::ServiceError,
    generator::QuestionGenerator,
};

pub use self::session::{QuizSession, SessionError, SessionPhase, TickOutcome};
pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

/// Central application state: configuration, collaborators and the live session registry.
pub struct AppState {
    config: AppConfig,
    quiz_store: RwLock<Option<Arc<dyn QuizStore>>>,
    generator: Arc<dyn QuestionGenerator>,
    sessions: DashMap<Uuid, Arc<SessionHandle>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, generator: Arc<dyn QuestionGenerator>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            quiz_store: RwLock::new(None),
            generator,
            sessions: DashMap::new(),
            degraded: degraded_tx,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Question generator used when no stored quiz applies.
    pub fn generator(&self) -> Arc<dyn QuestionGenerator> {
        self.generator.clone()
    }

    /// Obtain a handle to the current quiz store, if one is installed.
    pub async fn quiz_store(&self) -> Option<Arc<dyn QuizStore>> {
        let guard = self.quiz_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new quiz store implementation and leave degraded mode.
    pub async fn set_quiz_store(&self, store: Arc<dyn QuizStore>) {
        {
            let mut guard = self.quiz_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Register a freshly created session.
    pub fn insert_session(&self, handle: Arc<SessionHandle>) {
        self.sessions.insert(handle.id(), handle);
    }

    /// Look up a live session.
    pub fn session(&self, id: Uuid) -> Result<Arc<SessionHandle>, ServiceError> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("session {id}")))
    }

    /// Remove a session from the registry, returning it if it existed.
    pub fn remove_session(&self, id: Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.remove(&id).map(|(_, handle)| handle)
    }

    /// Snapshot of every registered session handle.
    pub fn session_handles(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

/// A live session together with its event hub and background tasks.
pub struct SessionHandle {
    id: Uuid,
    slot: Mutex<SessionSlot>,
    events: SseHub,
}

impl SessionHandle {
    /// Wrap `session` into a shareable handle.
    pub fn new(session: QuizSession, event_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            id: session.id(),
            slot: Mutex::new(SessionSlot {
                session,
                loader: None,
                ticker: None,
                last_activity: Instant::now(),
            }),
            events: SseHub::new(event_capacity),
        })
    }

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Lock the session. Every mutation (ticks included) goes through this lock.
    pub async fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().await
    }

    /// Event hub of this session.
    pub fn events(&self) -> &SseHub {
        &self.events
    }
}

/// Session state guarded by [`SessionHandle::lock`].
pub struct SessionSlot {
    session: QuizSession,
    loader: Option<AbortHandle>,
    ticker: Option<AbortHandle>,
    last_activity: Instant,
}

impl SessionSlot {
    /// Read access to the state machine.
    pub fn session(&self) -> &QuizSession {
        &self.session
    }

    /// Write access to the state machine; refreshes the idle timer.
    pub fn session_mut(&mut self) -> &mut QuizSession {
        self.last_activity = Instant::now();
        &mut self.session
    }

    /// Advance the countdown without counting as user activity.
    pub fn tick(&mut self) -> TickOutcome {
        self.session.tick()
    }

    /// Instant of the last mutation.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Track the loader task, aborting any previous one.
    pub fn set_loader(&mut self, handle: AbortHandle) {
        if let Some(previous) = self.loader.replace(handle) {
            previous.abort();
        }
    }

    /// Track the ticker task, aborting any previous one.
    pub fn set_ticker(&mut self, handle: AbortHandle) {
        if let Some(previous) = self.ticker.replace(handle) {
            previous.abort();
        }
    }

    /// Abort the loader and ticker tasks.
    pub fn abort_tasks(&mut self) {
        if let Some(loader) = self.loader.take() {
            loader.abort();
        }
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}
