//! Session orchestration: creation, background loading and ticking, caller events, settlement.

use std::{sync::Arc, time::Duration};

use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::session::{SessionSnapshot, SettlementResponse, StartSessionRequest},
    error::ServiceError,
    services::{
        settlement,
        sse_service::{broadcast_closed, broadcast_snapshot},
        supply::{self, SupplyError},
    },
    state::{
        QuizSession, SessionHandle, SessionPhase, SessionSlot, SharedState, TickOutcome,
        quiz::Question,
        session::AnswerOutcome,
    },
};

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Create a session and start resolving its questions in the background.
pub async fn start_session(
    state: &SharedState,
    request: StartSessionRequest,
) -> Result<SessionSnapshot, ServiceError> {
    let (user_id, config) = request.into_parts();
    let session = QuizSession::new(Uuid::new_v4(), user_id, config);
    let handle = SessionHandle::new(session, state.config().event_capacity);
    state.insert_session(handle.clone());

    let mut slot = handle.lock().await;
    spawn_loader(state, &handle, &mut slot);
    info!(
        session_id = %handle.id(),
        user_id = %slot.session().user_id(),
        topic = %slot.session().config().topic,
        paid = slot.session().config().is_paid_mode,
        "quiz session started"
    );
    Ok(SessionSnapshot::from(slot.session()))
}

/// Current view of a session.
pub async fn get_state(state: &SharedState, id: Uuid) -> Result<SessionSnapshot, ServiceError> {
    let handle = state.session(id)?;
    let slot = handle.lock().await;
    Ok(SessionSnapshot::from(slot.session()))
}

/// Advance the countdown by one second on behalf of the caller.
pub async fn tick(state: &SharedState, id: Uuid) -> Result<SessionSnapshot, ServiceError> {
    mutate(state, id, |session| {
        session.tick();
        Ok(())
    })
    .await
}

/// Answer the live question; a repeated answer is ignored.
pub async fn submit_answer(
    state: &SharedState,
    id: Uuid,
    option: usize,
) -> Result<SessionSnapshot, ServiceError> {
    mutate(state, id, |session| {
        match session.submit(option)? {
            AnswerOutcome::Scored { correct } => {
                debug!(session_id = %id, option, correct, "answer recorded");
            }
            AnswerOutcome::Ignored => {
                debug!(session_id = %id, option, "question already answered; ignoring")
            }
        }
        Ok(())
    })
    .await
}

/// Move on to the next question, finishing after the last one.
///
/// The ticker is restarted so the new question gets its full countdown.
pub async fn advance(state: &SharedState, id: Uuid) -> Result<SessionSnapshot, ServiceError> {
    let handle = state.session(id)?;
    let mut slot = handle.lock().await;
    let finished = slot.session_mut().advance()? == &SessionPhase::Finished;

    if finished {
        info!(session_id = %id, score = slot.session().rounded_score(), "quiz finished");
    } else if state.config().auto_tick {
        spawn_ticker(&handle, &mut slot);
    }

    let snapshot = SessionSnapshot::from(slot.session());
    broadcast_snapshot(&handle, &snapshot);
    Ok(snapshot)
}

/// Flag or unflag the live question.
pub async fn toggle_bookmark(state: &SharedState, id: Uuid) -> Result<SessionSnapshot, ServiceError> {
    mutate(state, id, |session| {
        session.toggle_bookmark()?;
        Ok(())
    })
    .await
}

/// Record that the live question's media could not be fetched.
pub async fn report_media_failure(
    state: &SharedState,
    id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    mutate(state, id, |session| {
        session.report_media_failure()?;
        warn!(session_id = %id, index = session.current_index(), "question media unavailable");
        Ok(())
    })
    .await
}

/// Re-enter loading from the error phase with the same configuration.
pub async fn restart(state: &SharedState, id: Uuid) -> Result<SessionSnapshot, ServiceError> {
    let handle = state.session(id)?;
    let mut slot = handle.lock().await;
    slot.session_mut().restart()?;
    spawn_loader(state, &handle, &mut slot);
    info!(session_id = %id, "quiz session restarted");

    let snapshot = SessionSnapshot::from(slot.session());
    broadcast_snapshot(&handle, &snapshot);
    Ok(snapshot)
}

/// Drop a session, cancelling its loader and ticker.
pub async fn abandon(state: &SharedState, id: Uuid) -> Result<(), ServiceError> {
    let handle = state
        .remove_session(id)
        .ok_or_else(|| ServiceError::NotFound(format!("session {id}")))?;
    close(&handle, "abandoned").await;
    info!(session_id = %id, "quiz session abandoned");
    Ok(())
}

/// Settle a finished session: freeze the result, persist it, credit points.
///
/// Persistence is best-effort; its outcome is reported in the response instead of failing.
pub async fn settle(state: &SharedState, id: Uuid) -> Result<SettlementResponse, ServiceError> {
    let handle = state.session(id)?;
    let result = {
        let mut slot = handle.lock().await;
        let result = slot.session_mut().settle(settlement::now_rfc3339())?;
        broadcast_snapshot(&handle, &SessionSnapshot::from(slot.session()));
        result
    };

    let persisted = settlement::persist(state.quiz_store().await, &result).await;
    Ok(SettlementResponse::new(&result, persisted))
}

/// Remove sessions idle for longer than the configured TTL. Returns how many were dropped.
pub async fn sweep_idle_sessions(state: &SharedState) -> usize {
    let ttl = state.config().session_ttl;
    let mut removed = 0;

    for handle in state.session_handles() {
        let idle = handle.lock().await.last_activity().elapsed();
        if idle >= ttl && state.remove_session(handle.id()).is_some() {
            close(&handle, "expired").await;
            debug!(session_id = %handle.id(), idle_secs = idle.as_secs(), "expired idle session");
            removed += 1;
        }
    }

    if removed > 0 {
        info!(removed, remaining = state.session_count(), "swept idle sessions");
    }
    removed
}

/// Periodically drop idle sessions.
pub async fn run_sweeper(state: SharedState) {
    let period = (state.config().session_ttl / 4).clamp(TICK_INTERVAL, MAX_SWEEP_INTERVAL);
    loop {
        sleep(period).await;
        sweep_idle_sessions(&state).await;
    }
}

async fn close(handle: &SessionHandle, reason: &str) {
    let mut slot = handle.lock().await;
    slot.abort_tasks();
    slot.session_mut().cancel_loading();
    broadcast_closed(handle, reason);
}

/// Apply a caller event under the session lock and publish the resulting snapshot.
async fn mutate<F>(state: &SharedState, id: Uuid, apply: F) -> Result<SessionSnapshot, ServiceError>
where
    F: FnOnce(&mut QuizSession) -> Result<(), ServiceError>,
{
    let handle = state.session(id)?;
    let mut slot = handle.lock().await;
    let before = slot.session().version();
    apply(slot.session_mut())?;

    let snapshot = SessionSnapshot::from(slot.session());
    if snapshot.version != before {
        broadcast_snapshot(&handle, &snapshot);
    }
    Ok(snapshot)
}

fn spawn_loader(state: &SharedState, handle: &Arc<SessionHandle>, slot: &mut SessionSlot) {
    let load_id = slot.session().load_id();
    let config = slot.session().config().clone();
    let state = state.clone();
    let handle = handle.clone();

    let task = tokio::spawn(async move {
        let store = state.quiz_store().await;
        let outcome = supply::resolve(store, state.generator(), &config, state.config()).await;
        install(&state, &handle, load_id, outcome).await;
    });
    slot.set_loader(task.abort_handle());
}

async fn install(
    state: &SharedState,
    handle: &Arc<SessionHandle>,
    load_id: Uuid,
    outcome: Result<Vec<Question>, SupplyError>,
) {
    let mut slot = handle.lock().await;
    let installed = match outcome {
        Ok(questions) => {
            let count = questions.len();
            slot.session_mut()
                .install_questions(load_id, questions)
                .map(|phase| {
                    debug!(session_id = %handle.id(), count, phase = phase.label(), "questions installed");
                })
        }
        Err(err) => {
            warn!(session_id = %handle.id(), error = %err, "question supply failed");
            slot.session_mut().fail_loading(load_id, err.to_string())
        }
    };

    if let Err(err) = installed {
        debug!(session_id = %handle.id(), error = %err, "discarding late supply result");
        return;
    }

    if slot.session().phase() == &SessionPhase::Active && state.config().auto_tick {
        spawn_ticker(handle, &mut slot);
    }
    broadcast_snapshot(handle, &SessionSnapshot::from(slot.session()));
}

fn spawn_ticker(handle: &Arc<SessionHandle>, slot: &mut SessionSlot) {
    let session = Arc::downgrade(handle);

    let task = tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let Some(handle) = session.upgrade() else {
                break;
            };
            let mut slot = handle.lock().await;
            match slot.tick() {
                TickOutcome::Counted { .. } => {
                    broadcast_snapshot(&handle, &SessionSnapshot::from(slot.session()));
                }
                TickOutcome::Expired => {
                    debug!(session_id = %handle.id(), "question timed out");
                    broadcast_snapshot(&handle, &SessionSnapshot::from(slot.session()));
                }
                TickOutcome::Ignored if slot.session().phase() != &SessionPhase::Active => break,
                TickOutcome::Ignored => {}
            }
        }
    });
    slot.set_ticker(task.abort_handle());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::QuizEntity,
            quiz_store::memory::MemoryQuizStore,
        },
        dto::session::PhaseView,
        generator::{
            GeneratorError, QuestionGenerator,
            testing::{ScriptedGenerator, Step, raw_questions},
        },
        state::AppState,
    };

    fn settings(auto_tick: bool) -> AppConfig {
        AppConfig {
            auto_tick,
            ..AppConfig::default()
        }
    }

    async fn app(
        config: AppConfig,
        generator: Arc<dyn QuestionGenerator>,
    ) -> (SharedState, MemoryQuizStore) {
        let state = AppState::new(config, generator);
        let store = MemoryQuizStore::new();
        state.set_quiz_store(Arc::new(store.clone())).await;
        (state, store)
    }

    fn request(count: u32, paid: bool, quiz_id: Option<&str>) -> StartSessionRequest {
        StartSessionRequest {
            user_id: "user-1".into(),
            topic: "General Knowledge".into(),
            question_count: count,
            seconds_per_question: 2,
            is_paid_mode: paid,
            quiz_id: quiz_id.map(str::to_string),
            language: Default::default(),
        }
    }

    async fn wait_until_loaded(state: &SharedState, id: Uuid) -> SessionSnapshot {
        for _ in 0..1_000 {
            let snapshot = get_state(state, id).await.unwrap();
            if snapshot.phase != PhaseView::Loading {
                return snapshot;
            }
            sleep(Duration::from_millis(50)).await;
        }
        panic!("session {id} never left loading");
    }

    #[tokio::test(start_paused = true)]
    async fn free_quiz_plays_through_and_settles_once() {
        let generator = Arc::new(ScriptedGenerator::new([Step::Return(raw_questions(3))]));
        let (state, store) = app(settings(false), generator).await;

        let started = start_session(&state, request(3, false, None)).await.unwrap();
        assert_eq!(started.phase, PhaseView::Loading);
        let id = started.id;
        assert_eq!(wait_until_loaded(&state, id).await.phase, PhaseView::Active);

        for option in [1, 0, 1] {
            submit_answer(&state, id, option).await.unwrap();
            advance(&state, id).await.unwrap();
        }
        let finished = get_state(&state, id).await.unwrap();
        assert_eq!(finished.phase, PhaseView::Finished);
        assert_eq!(finished.score, 2.0);
        assert_eq!(finished.mistakes.len(), 1);

        let outcome = settle(&state, id).await.unwrap();
        assert!(outcome.persisted);
        assert_eq!(outcome.earned_points, 20);
        assert_eq!(store.results().len(), 1);
        let stats = store.user_stats("user-1").unwrap();
        assert_eq!((stats.points, stats.streak), (20, 1));

        assert!(matches!(
            settle(&state, id).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert_eq!(store.results().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stored_quiz_is_played_without_generator() {
        let generator = Arc::new(ScriptedGenerator::default());
        let (state, store) = app(settings(false), generator.clone()).await;
        store.insert_quiz(
            "ssc-math",
            QuizEntity {
                questions: raw_questions(4),
                ..QuizEntity::default()
            },
        );

        let id = start_session(&state, request(2, false, Some("ssc-math")))
            .await
            .unwrap()
            .id;
        let loaded = wait_until_loaded(&state, id).await;

        assert_eq!(loaded.total_questions, 2);
        assert!(generator.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn supply_failure_then_restart() {
        let generator = Arc::new(ScriptedGenerator::new([
            Step::Fail(GeneratorError::NoQuestions),
            Step::Fail(GeneratorError::EmptyResponse),
            Step::Return(raw_questions(5)),
        ]));
        let (state, _store) = app(settings(false), generator).await;

        let id = start_session(&state, request(5, false, None)).await.unwrap().id;
        let failed = wait_until_loaded(&state, id).await;
        assert_eq!(failed.phase, PhaseView::Error);
        assert!(failed.error.unwrap().contains("empty response"));
        assert!(matches!(
            submit_answer(&state, id, 0).await,
            Err(ServiceError::InvalidState(_))
        ));

        let restarted = restart(&state, id).await.unwrap();
        assert_eq!(restarted.phase, PhaseView::Loading);
        let loaded = wait_until_loaded(&state, id).await;
        assert_eq!(loaded.phase, PhaseView::Active);
        assert_eq!(loaded.total_questions, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_expires_unanswered_question() {
        let generator = Arc::new(ScriptedGenerator::new([Step::Return(raw_questions(2))]));
        let (state, _store) = app(settings(true), generator).await;

        let id = start_session(&state, request(2, true, None)).await.unwrap().id;
        wait_until_loaded(&state, id).await;
        sleep(Duration::from_millis(2_500)).await;

        let snapshot = get_state(&state, id).await.unwrap();
        assert!(snapshot.is_answered);
        assert_eq!(snapshot.selected_option, None);
        assert_eq!(snapshot.mistakes.len(), 1);
        assert_eq!(snapshot.score, -0.25);

        advance(&state, id).await.unwrap();
        let next = get_state(&state, id).await.unwrap();
        assert_eq!(next.current_index, 1);
        assert_eq!(next.remaining_seconds, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn next_question_gets_its_full_countdown() {
        let generator = Arc::new(ScriptedGenerator::new([Step::Return(raw_questions(2))]));
        let (state, _store) = app(settings(true), generator).await;

        let id = start_session(&state, request(2, false, None)).await.unwrap().id;
        wait_until_loaded(&state, id).await;
        submit_answer(&state, id, 1).await.unwrap();
        sleep(Duration::from_millis(1_900)).await;

        let next = advance(&state, id).await.unwrap();
        assert_eq!((next.current_index, next.remaining_seconds), (1, 2));

        sleep(Duration::from_millis(500)).await;
        assert_eq!(get_state(&state, id).await.unwrap().remaining_seconds, 2);

        sleep(Duration::from_millis(1_000)).await;
        let counting = get_state(&state, id).await.unwrap();
        assert_eq!(counting.remaining_seconds, 1);
        assert!(!counting.is_answered);

        sleep(Duration::from_millis(600)).await;
        let expired = get_state(&state, id).await.unwrap();
        assert!(expired.is_answered);
        assert_eq!(expired.mistakes.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_tick_and_ignored_second_answer() {
        let generator = Arc::new(ScriptedGenerator::new([Step::Return(raw_questions(1))]));
        let (state, _store) = app(settings(false), generator).await;
        let id = start_session(&state, request(1, false, None)).await.unwrap().id;
        wait_until_loaded(&state, id).await;

        assert_eq!(tick(&state, id).await.unwrap().remaining_seconds, 1);
        let answered = submit_answer(&state, id, 1).await.unwrap();
        let again = submit_answer(&state, id, 0).await.unwrap();
        assert_eq!(answered.version, again.version);
        assert_eq!(again.score, 1.0);

        assert!(matches!(
            submit_answer(&state, Uuid::new_v4(), 0).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_cancels_pending_load() {
        let generator = Arc::new(ScriptedGenerator::new([Step::Hang]));
        let (state, _store) = app(settings(true), generator).await;
        let id = start_session(&state, request(3, false, None)).await.unwrap().id;

        abandon(&state, id).await.unwrap();
        assert!(matches!(get_state(&state, id).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(abandon(&state, id).await, Err(ServiceError::NotFound(_))));
        assert_eq!(state.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_swept() {
        let generator = Arc::new(ScriptedGenerator::new([
            Step::Return(raw_questions(1)),
            Step::Return(raw_questions(1)),
        ]));
        let config = AppConfig {
            auto_tick: false,
            session_ttl: Duration::from_secs(10),
            ..AppConfig::default()
        };
        let (state, _store) = app(config, generator).await;

        let idle = start_session(&state, request(1, false, None)).await.unwrap().id;
        wait_until_loaded(&state, idle).await;
        sleep(Duration::from_secs(6)).await;
        let busy = start_session(&state, request(1, false, None)).await.unwrap().id;
        wait_until_loaded(&state, busy).await;
        sleep(Duration::from_secs(5)).await;

        assert_eq!(sweep_idle_sessions(&state).await, 1);
        assert!(get_state(&state, idle).await.is_err());
        assert!(get_state(&state, busy).await.is_ok());
    }
}
