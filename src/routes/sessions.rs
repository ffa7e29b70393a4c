use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::session::{AnswerRequest, SessionSnapshot, SettlementResponse, StartSessionRequest},
    error::AppError,
    services::session_service,
    state::SharedState,
};

/// Session lifecycle and gameplay endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sessions", post(start_session))
        .route("/sessions/{id}", get(get_session).delete(abandon_session))
        .route("/sessions/{id}/tick", post(tick))
        .route("/sessions/{id}/answer", post(submit_answer))
        .route("/sessions/{id}/advance", post(advance))
        .route("/sessions/{id}/bookmark", post(toggle_bookmark))
        .route("/sessions/{id}/media-failure", post(report_media_failure))
        .route("/sessions/{id}/restart", post(restart))
        .route("/sessions/{id}/settle", post(settle))
}

/// Start a quiz session; questions load in the background.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Session created in the loading phase", body = SessionSnapshot),
        (status = 400, description = "Invalid session parameters")
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<StartSessionRequest>>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    let snapshot = session_service::start_session(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// Current state of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session state", body = SessionSnapshot),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::get_state(&state, id).await?))
}

/// Advance the countdown by one second (for clients driving their own clock).
#[utoipa::path(
    post,
    path = "/sessions/{id}/tick",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session state after the tick", body = SessionSnapshot),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn tick(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::tick(&state, id).await?))
}

/// Answer the live question. Repeated answers are ignored.
#[utoipa::path(
    post,
    path = "/sessions/{id}/answer",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = AnswerRequest,
    responses(
        (status = 200, description = "Session state after answering", body = SessionSnapshot),
        (status = 400, description = "Option does not exist"),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "No live question")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnswerRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(
        session_service::submit_answer(&state, id, payload.option).await?,
    ))
}

/// Move to the next question once the current one is answered.
#[utoipa::path(
    post,
    path = "/sessions/{id}/advance",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Next question or finished session", body = SessionSnapshot),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Question not answered yet")
    )
)]
pub async fn advance(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::advance(&state, id).await?))
}

/// Flag or unflag the live question for review.
#[utoipa::path(
    post,
    path = "/sessions/{id}/bookmark",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session state with the updated bookmark", body = SessionSnapshot),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "No live question")
    )
)]
pub async fn toggle_bookmark(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::toggle_bookmark(&state, id).await?))
}

/// Report that the live question's media failed to load.
#[utoipa::path(
    post,
    path = "/sessions/{id}/media-failure",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Media marked unavailable", body = SessionSnapshot),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "No live question")
    )
)]
pub async fn report_media_failure(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(
        session_service::report_media_failure(&state, id).await?,
    ))
}

/// Retry loading after a supply failure.
#[utoipa::path(
    post,
    path = "/sessions/{id}/restart",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session back in the loading phase", body = SessionSnapshot),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Session is not in the error phase")
    )
)]
pub async fn restart(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::restart(&state, id).await?))
}

/// Persist the result of a finished session and credit points.
#[utoipa::path(
    post,
    path = "/sessions/{id}/settle",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Settlement outcome", body = SettlementResponse),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Session not finished or already settled")
    )
)]
pub async fn settle(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlementResponse>, AppError> {
    Ok(Json(session_service::settle(&state, id).await?))
}

/// Abandon a session, cancelling any pending work.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 204, description = "Session removed"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn abandon_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    session_service::abandon(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
