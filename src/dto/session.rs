use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::validation::{validate_not_blank, validate_quiz_id, validate_user_id},
    services::media::{ResolvedMedia, resolve_media},
    state::{
        QuizSession, SessionPhase,
        quiz::{Language, MediaKind, Question, QuizResult, QuizSessionConfig},
    },
};

/// Payload used to start a new quiz session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    /// Acting user, as authenticated by the caller.
    #[validate(custom(function = "validate_user_id"))]
    pub user_id: String,
    /// Subject of the quiz.
    #[validate(custom(function = "validate_not_blank"), length(max = 200))]
    pub topic: String,
    /// Number of questions to play.
    #[validate(range(min = 1, max = 100))]
    pub question_count: u32,
    /// Countdown per question.
    #[validate(range(min = 1, max = 600))]
    pub seconds_per_question: u32,
    /// Paid quizzes deduct 0.25 per wrong or missed answer.
    #[serde(default)]
    pub is_paid_mode: bool,
    /// Pre-authored quiz to play; `"mock"` or absent generates questions.
    #[serde(default)]
    #[validate(custom(function = "validate_quiz_id"))]
    pub quiz_id: Option<String>,
    /// Language of generated questions.
    #[serde(default)]
    pub language: Language,
}

impl StartSessionRequest {
    /// Split into the acting user and the immutable session configuration.
    pub fn into_parts(self) -> (String, QuizSessionConfig) {
        let config = QuizSessionConfig {
            topic: self.topic.trim().to_string(),
            question_count: self.question_count,
            seconds_per_question: self.seconds_per_question,
            is_paid_mode: self.is_paid_mode,
            source_quiz_id: self.quiz_id,
            language: self.language,
        };
        (self.user_id.trim().to_string(), config)
    }
}

/// Answer submitted for the live question.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AnswerRequest {
    /// Zero-based option index.
    pub option: usize,
}

/// Lifecycle phase exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PhaseView {
    /// Questions are being prepared.
    Loading,
    /// Loading failed; a restart is possible.
    Error,
    /// A question is live.
    Active,
    /// All questions answered.
    Finished,
}

impl From<&SessionPhase> for PhaseView {
    fn from(value: &SessionPhase) -> Self {
        match value {
            SessionPhase::Loading => PhaseView::Loading,
            SessionPhase::Error { .. } => PhaseView::Error,
            SessionPhase::Active => PhaseView::Active,
            SessionPhase::Finished => PhaseView::Finished,
        }
    }
}

/// Media of the live question, already rewritten for direct fetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MediaView {
    /// Fetch `url` and render it as `kind`.
    Available {
        /// Image or video.
        kind: MediaKind,
        /// Direct-fetch URL.
        url: String,
    },
    /// Show a "media unavailable" placeholder; the question stays answerable.
    Unavailable,
}

impl From<ResolvedMedia> for MediaView {
    fn from(value: ResolvedMedia) -> Self {
        match value {
            ResolvedMedia::Available { kind, url } => MediaView::Available { kind, url },
            ResolvedMedia::Unavailable => MediaView::Unavailable,
        }
    }
}

/// Live question as shown to the player. The answer is revealed once answered.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub prompt: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Question listed in the mistakes or bookmarks review.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl From<&Question> for ReviewQuestion {
    fn from(value: &Question) -> Self {
        Self {
            prompt: value.prompt.clone(),
            options: value.options.clone(),
            correct_index: value.correct_index,
            explanation: value.explanation.clone(),
        }
    }
}

/// Full client-facing view of a session.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub user_id: String,
    pub topic: String,
    pub phase: PhaseView,
    /// Failure reason while in the error phase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub is_paid_mode: bool,
    /// Number of questions actually loaded.
    pub total_questions: usize,
    pub current_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    /// Running score rounded to two decimals.
    pub score: f64,
    pub remaining_seconds: u32,
    pub selected_option: Option<usize>,
    pub is_answered: bool,
    pub is_bookmarked: bool,
    pub mistakes: Vec<ReviewQuestion>,
    pub bookmarks: Vec<ReviewQuestion>,
    /// Points that settlement would credit right now.
    pub earned_points: u32,
    pub settled: bool,
    /// Bumped on every state change; clients can drop stale events.
    pub version: usize,
}

impl From<&QuizSession> for SessionSnapshot {
    fn from(session: &QuizSession) -> Self {
        let error = match session.phase() {
            SessionPhase::Error { reason } => Some(reason.clone()),
            _ => None,
        };
        let question = session.current_question().map(|question| QuestionView {
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            media: question
                .media
                .as_ref()
                .map(|media| resolve_media(media, session.media_failed()).into()),
            correct_index: session.is_answered().then_some(question.correct_index),
            explanation: session
                .is_answered()
                .then(|| question.explanation.clone())
                .flatten(),
        });

        Self {
            id: session.id(),
            user_id: session.user_id().to_string(),
            topic: session.config().topic.clone(),
            phase: session.phase().into(),
            error,
            is_paid_mode: session.config().is_paid_mode,
            total_questions: session.questions().len(),
            current_index: session.current_index(),
            question,
            score: session.rounded_score(),
            remaining_seconds: session.remaining_seconds(),
            selected_option: session.selected_option(),
            is_answered: session.is_answered(),
            is_bookmarked: session.is_bookmarked(),
            mistakes: session.mistakes().iter().map(Into::into).collect(),
            bookmarks: session.bookmarks().map(Into::into).collect(),
            earned_points: session.earned_points(),
            settled: session.is_settled(),
            version: session.version(),
        }
    }
}

/// Outcome of settling a finished session.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    pub subject: String,
    pub score: f64,
    pub total: u32,
    pub earned_points: u32,
    pub mistakes: usize,
    pub date: String,
    /// `false` when the result or the point credit could not be written.
    pub persisted: bool,
}

impl SettlementResponse {
    /// Build the response for `result`.
    pub fn new(result: &QuizResult, persisted: bool) -> Self {
        Self {
            subject: result.subject.clone(),
            score: result.score,
            total: result.total,
            earned_points: result.earned_points,
            mistakes: result.mistakes.len(),
            date: result.date.clone(),
            persisted,
        }
    }
}
