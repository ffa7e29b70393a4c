//! Quiz session state machine.
//!
//! One question is live at a time. A question is answered exactly once, either by
//! [`QuizSession::submit`] or by the countdown reaching zero in [`QuizSession::tick`];
//! whichever runs first flips `is_answered` and the other becomes a no-op.
//! Scores are kept in quarter points so paid-mode penalties stay exact.

use thiserror::Error;
use uuid::Uuid;

use crate::state::quiz::{Question, QuizResult, QuizSessionConfig};

/// Quarter points awarded for a correct answer.
const CORRECT_QUARTERS: i64 = 4;
/// Quarter points deducted for a wrong or missed answer in paid mode.
const PAID_PENALTY_QUARTERS: i64 = 1;
/// Reward points per whole score point.
const POINTS_PER_SCORE: i64 = 10;

/// Identifier of one question-loading attempt.
pub type LoadId = Uuid;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Questions are being resolved.
    Loading,
    /// Loading failed; a restart re-enters [`SessionPhase::Loading`].
    Error {
        /// Human-readable failure reason.
        reason: String,
    },
    /// A question is live.
    Active,
    /// Every question has been answered; results are frozen.
    Finished,
}

impl SessionPhase {
    /// Short label used in logs and errors.
    pub fn label(&self) -> &'static str {
        match self {
            SessionPhase::Loading => "loading",
            SessionPhase::Error { .. } => "error",
            SessionPhase::Active => "active",
            SessionPhase::Finished => "finished",
        }
    }
}

/// Misuse of the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The operation is not allowed in the current phase.
    #[error("cannot {operation} while the session is {phase}")]
    InvalidPhase {
        /// Rejected operation.
        operation: &'static str,
        /// Phase label at the time of the call.
        phase: &'static str,
    },
    /// `advance` was called before the current question was answered.
    #[error("the current question has not been answered yet")]
    NotAnswered,
    /// The selected option does not exist on the current question.
    #[error("option {option} does not exist (question has {available} options)")]
    InvalidOption {
        /// Requested option.
        option: usize,
        /// Number of options on the question.
        available: usize,
    },
    /// A loading attempt finished after it was superseded.
    #[error("load attempt {got} is stale (current attempt is {expected})")]
    StaleLoad {
        /// Attempt currently expected.
        expected: LoadId,
        /// Attempt that reported back.
        got: LoadId,
    },
    /// Settlement was already performed.
    #[error("session has already been settled")]
    AlreadySettled,
}

/// What a submission did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// The answer was scored.
    Scored {
        /// Whether the selected option was correct.
        correct: bool,
    },
    /// The question was already answered; nothing changed.
    Ignored,
}

/// What a clock tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The countdown moved on.
    Counted {
        /// Seconds left on the current question.
        remaining: u32,
    },
    /// The countdown hit zero and the question was scored as a miss.
    Expired,
    /// No live unanswered question; nothing changed.
    Ignored,
}

/// Mutable state of a single quiz session.
#[derive(Debug, Clone)]
pub struct QuizSession {
    id: Uuid,
    user_id: String,
    config: QuizSessionConfig,
    phase: SessionPhase,
    load_id: LoadId,
    questions: Vec<Question>,
    current_index: usize,
    score_quarters: i64,
    remaining_seconds: u32,
    selected_option: Option<usize>,
    is_answered: bool,
    media_failed: bool,
    mistakes: Vec<Question>,
    bookmarks: Vec<usize>,
    settled: bool,
    version: usize,
}

impl QuizSession {
    /// Create a session in the loading phase.
    pub fn new(id: Uuid, user_id: String, config: QuizSessionConfig) -> Self {
        let remaining_seconds = config.seconds_per_question;
        Self {
            id,
            user_id,
            config,
            phase: SessionPhase::Loading,
            load_id: Uuid::new_v4(),
            questions: Vec::new(),
            current_index: 0,
            score_quarters: 0,
            remaining_seconds,
            selected_option: None,
            is_answered: false,
            media_failed: false,
            mistakes: Vec::new(),
            bookmarks: Vec::new(),
            settled: false,
            version: 0,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Acting user.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Configuration the session was started with.
    pub fn config(&self) -> &QuizSessionConfig {
        &self.config
    }

    /// Current phase.
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Identifier of the loading attempt whose result will be accepted.
    pub fn load_id(&self) -> LoadId {
        self.load_id
    }

    /// Questions of the session, fixed once loaded.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Index of the live question.
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Live question while active.
    pub fn current_question(&self) -> Option<&Question> {
        match self.phase {
            SessionPhase::Active => self.questions.get(self.current_index),
            _ => None,
        }
    }

    /// Running score; may be fractional and negative in paid mode.
    pub fn score(&self) -> f64 {
        self.score_quarters as f64 / CORRECT_QUARTERS as f64
    }

    /// Score rounded to two decimals, as displayed and persisted.
    pub fn rounded_score(&self) -> f64 {
        (self.score() * 100.0).round() / 100.0
    }

    /// Reward points for the current score: `max(0, floor(score * 10))`.
    pub fn earned_points(&self) -> u32 {
        let points = (self.score_quarters * POINTS_PER_SCORE).div_euclid(CORRECT_QUARTERS);
        u32::try_from(points.max(0)).unwrap_or(u32::MAX)
    }

    /// Seconds left on the live question.
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    /// Option selected for the live question; `None` after a timeout.
    pub fn selected_option(&self) -> Option<usize> {
        self.selected_option
    }

    /// Whether the live question has been answered.
    pub fn is_answered(&self) -> bool {
        self.is_answered
    }

    /// Whether the client reported the live question's media as unavailable.
    pub fn media_failed(&self) -> bool {
        self.media_failed
    }

    /// Questions answered wrong or left to time out, in order.
    pub fn mistakes(&self) -> &[Question] {
        &self.mistakes
    }

    /// Bookmarked questions, in the order they were flagged.
    pub fn bookmarks(&self) -> impl Iterator<Item = &Question> {
        self.bookmarks
            .iter()
            .filter_map(|index| self.questions.get(*index))
    }

    /// Whether the live question is bookmarked.
    pub fn is_bookmarked(&self) -> bool {
        self.bookmarks.contains(&self.current_index)
    }

    /// Whether settlement already ran.
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Monotonic counter bumped by every state change.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Install the questions resolved by `load_id`, entering the active phase.
    ///
    /// Questions beyond the requested count are dropped. An empty set moves the
    /// session to the error phase instead.
    pub fn install_questions(
        &mut self,
        load_id: LoadId,
        mut questions: Vec<Question>,
    ) -> Result<&SessionPhase, SessionError> {
        self.ensure_loading("install questions", load_id)?;

        questions.truncate(self.config.question_count as usize);
        if questions.is_empty() {
            self.phase = SessionPhase::Error {
                reason: "no questions available for this quiz".into(),
            };
        } else {
            self.questions = questions;
            self.current_index = 0;
            self.score_quarters = 0;
            self.mistakes.clear();
            self.bookmarks.clear();
            self.reset_question();
            self.phase = SessionPhase::Active;
        }
        self.version += 1;
        Ok(&self.phase)
    }

    /// Record that the loading attempt `load_id` failed.
    pub fn fail_loading(&mut self, load_id: LoadId, reason: String) -> Result<(), SessionError> {
        self.ensure_loading("fail loading", load_id)?;
        self.phase = SessionPhase::Error { reason };
        self.version += 1;
        Ok(())
    }

    /// Leave the error phase and start a fresh loading attempt with the same configuration.
    pub fn restart(&mut self) -> Result<LoadId, SessionError> {
        if !matches!(self.phase, SessionPhase::Error { .. }) {
            return Err(self.invalid_phase("restart"));
        }
        self.phase = SessionPhase::Loading;
        self.load_id = Uuid::new_v4();
        self.questions.clear();
        self.mistakes.clear();
        self.bookmarks.clear();
        self.current_index = 0;
        self.score_quarters = 0;
        self.reset_question();
        self.version += 1;
        Ok(self.load_id)
    }

    /// Invalidate any in-flight loading attempt.
    pub fn cancel_loading(&mut self) {
        if self.phase == SessionPhase::Loading {
            self.load_id = Uuid::new_v4();
            self.phase = SessionPhase::Error {
                reason: "loading cancelled".into(),
            };
            self.version += 1;
        }
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self) -> TickOutcome {
        if self.phase != SessionPhase::Active || self.is_answered {
            return TickOutcome::Ignored;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        self.version += 1;
        if self.remaining_seconds > 0 {
            return TickOutcome::Counted {
                remaining: self.remaining_seconds,
            };
        }

        self.is_answered = true;
        self.selected_option = None;
        self.record_miss();
        TickOutcome::Expired
    }

    /// Answer the live question. A second answer to the same question is ignored.
    pub fn submit(&mut self, option: usize) -> Result<AnswerOutcome, SessionError> {
        if self.phase != SessionPhase::Active {
            return Err(self.invalid_phase("submit an answer"));
        }
        if self.is_answered {
            return Ok(AnswerOutcome::Ignored);
        }

        let question = &self.questions[self.current_index];
        let available = question.options.len();
        if option >= available {
            return Err(SessionError::InvalidOption { option, available });
        }

        let correct = question.is_correct(option);
        self.is_answered = true;
        self.selected_option = Some(option);
        if correct {
            self.score_quarters += CORRECT_QUARTERS;
        } else {
            self.record_miss();
        }
        self.version += 1;
        Ok(AnswerOutcome::Scored { correct })
    }

    /// Move to the next question, or finish after the last one.
    pub fn advance(&mut self) -> Result<&SessionPhase, SessionError> {
        if self.phase != SessionPhase::Active {
            return Err(self.invalid_phase("advance"));
        }
        if !self.is_answered {
            return Err(SessionError::NotAnswered);
        }

        if self.current_index + 1 >= self.questions.len() {
            self.phase = SessionPhase::Finished;
        } else {
            self.current_index += 1;
            self.reset_question();
        }
        self.version += 1;
        Ok(&self.phase)
    }

    /// Flag or unflag the live question for later review. Returns the new flag.
    pub fn toggle_bookmark(&mut self) -> Result<bool, SessionError> {
        if self.phase != SessionPhase::Active {
            return Err(self.invalid_phase("bookmark"));
        }
        let index = self.current_index;
        let bookmarked = match self.bookmarks.iter().position(|entry| *entry == index) {
            Some(position) => {
                self.bookmarks.remove(position);
                false
            }
            None => {
                self.bookmarks.push(index);
                true
            }
        };
        self.version += 1;
        Ok(bookmarked)
    }

    /// Mark the live question's media as unavailable. Answering is unaffected.
    pub fn report_media_failure(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Active {
            return Err(self.invalid_phase("report media failure"));
        }
        if !self.media_failed {
            self.media_failed = true;
            self.version += 1;
        }
        Ok(())
    }

    /// Freeze the outcome for settlement. Succeeds once, only when finished.
    pub fn settle(&mut self, date: String) -> Result<QuizResult, SessionError> {
        if self.phase != SessionPhase::Finished {
            return Err(self.invalid_phase("settle"));
        }
        if self.settled {
            return Err(SessionError::AlreadySettled);
        }
        self.settled = true;
        self.version += 1;

        Ok(QuizResult {
            user_id: self.user_id.clone(),
            subject: self.config.topic.clone(),
            score: self.rounded_score(),
            total: self.config.question_count,
            date,
            quiz_id: self.config.stored_quiz_id().map(str::to_string),
            mistakes: self.mistakes.clone(),
            earned_points: self.earned_points(),
        })
    }

    fn record_miss(&mut self) {
        self.mistakes
            .push(self.questions[self.current_index].clone());
        if self.config.is_paid_mode {
            self.score_quarters -= PAID_PENALTY_QUARTERS;
        }
    }

    fn reset_question(&mut self) {
        self.remaining_seconds = self.config.seconds_per_question;
        self.selected_option = None;
        self.is_answered = false;
        self.media_failed = false;
    }

    fn ensure_loading(&self, operation: &'static str, load_id: LoadId) -> Result<(), SessionError> {
        if self.load_id != load_id {
            return Err(SessionError::StaleLoad {
                expected: self.load_id,
                got: load_id,
            });
        }
        if self.phase != SessionPhase::Loading {
            return Err(self.invalid_phase(operation));
        }
        Ok(())
    }

    fn invalid_phase(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidPhase {
            operation,
            phase: self.phase.label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::quiz::Language;

    fn question(n: usize, correct: usize) -> Question {
        Question {
            prompt: format!("প্রশ্ন {n}"),
            options: vec!["ক".into(), "খ".into(), "গ".into(), "ঘ".into()],
            correct_index: correct,
            explanation: None,
            media: None,
        }
    }

    fn config(count: u32, paid: bool) -> QuizSessionConfig {
        QuizSessionConfig {
            topic: "সাধারণ জ্ঞান".into(),
            question_count: count,
            seconds_per_question: 3,
            is_paid_mode: paid,
            source_quiz_id: None,
            language: Language::Bn,
        }
    }

    fn active_session(count: usize, paid: bool) -> QuizSession {
        let mut session = QuizSession::new(Uuid::new_v4(), "user-1".into(), config(count as u32, paid));
        let load_id = session.load_id();
        let questions = (0..count).map(|n| question(n, 1)).collect();
        session.install_questions(load_id, questions).unwrap();
        session
    }

    fn answer_and_advance(session: &mut QuizSession, option: usize) {
        session.submit(option).unwrap();
        session.advance().unwrap();
    }

    #[test]
    fn starts_loading_and_activates_on_questions() {
        let mut session = QuizSession::new(Uuid::new_v4(), "u".into(), config(2, false));
        assert_eq!(session.phase(), &SessionPhase::Loading);

        let load_id = session.load_id();
        let phase = session
            .install_questions(load_id, vec![question(0, 0), question(1, 0)])
            .unwrap();
        assert_eq!(phase, &SessionPhase::Active);
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.score(), 0.0);
        assert_eq!(session.remaining_seconds(), 3);
        assert!(session.mistakes().is_empty());
    }

    #[test]
    fn extra_questions_are_truncated_and_empty_set_errors() {
        let mut session = QuizSession::new(Uuid::new_v4(), "u".into(), config(2, false));
        let load_id = session.load_id();
        session
            .install_questions(load_id, (0..5).map(|n| question(n, 0)).collect())
            .unwrap();
        assert_eq!(session.questions().len(), 2);

        let mut empty = QuizSession::new(Uuid::new_v4(), "u".into(), config(2, false));
        let load_id = empty.load_id();
        let phase = empty.install_questions(load_id, Vec::new()).unwrap();
        assert!(matches!(phase, SessionPhase::Error { .. }));
    }

    #[test]
    fn stale_load_is_rejected() {
        let mut session = QuizSession::new(Uuid::new_v4(), "u".into(), config(1, false));
        let err = session
            .install_questions(Uuid::new_v4(), vec![question(0, 0)])
            .unwrap_err();
        assert!(matches!(err, SessionError::StaleLoad { .. }));
        assert_eq!(session.phase(), &SessionPhase::Loading);
    }

    #[test]
    fn late_result_after_failure_does_not_overwrite_error() {
        let mut session = QuizSession::new(Uuid::new_v4(), "u".into(), config(1, false));
        let load_id = session.load_id();
        session.fail_loading(load_id, "timed out".into()).unwrap();

        let err = session
            .install_questions(load_id, vec![question(0, 0)])
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidPhase { .. }));
        assert_eq!(
            session.phase(),
            &SessionPhase::Error {
                reason: "timed out".into()
            }
        );
    }

    #[test]
    fn restart_from_error_issues_new_load_attempt() {
        let mut session = QuizSession::new(Uuid::new_v4(), "u".into(), config(1, false));
        let first = session.load_id();
        session.fail_loading(first, "boom".into()).unwrap();

        let second = session.restart().unwrap();
        assert_ne!(first, second);
        assert_eq!(session.phase(), &SessionPhase::Loading);
        assert!(session.install_questions(first, vec![question(0, 0)]).is_err());
        assert!(session.install_questions(second, vec![question(0, 0)]).is_ok());
        assert!(session.restart().is_err());
    }

    #[test]
    fn cancel_loading_rejects_late_install() {
        let mut session = QuizSession::new(Uuid::new_v4(), "u".into(), config(1, false));
        let load_id = session.load_id();
        session.cancel_loading();
        assert!(session.install_questions(load_id, vec![question(0, 0)]).is_err());
    }

    #[test]
    fn second_submit_is_a_no_op() {
        let mut session = active_session(2, true);
        assert_eq!(session.submit(0).unwrap(), AnswerOutcome::Scored { correct: false });
        let before = session.clone();

        assert_eq!(session.submit(1).unwrap(), AnswerOutcome::Ignored);
        assert_eq!(session.score(), before.score());
        assert_eq!(session.selected_option(), Some(0));
        assert_eq!(session.mistakes().len(), 1);
        assert_eq!(session.version(), before.version());
    }

    #[test]
    fn submit_rejects_unknown_option_without_answering() {
        let mut session = active_session(1, false);
        let err = session.submit(4).unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidOption {
                option: 4,
                available: 4
            }
        );
        assert!(!session.is_answered());
    }

    #[test]
    fn advance_requires_answer_and_moves_by_one() {
        let mut session = active_session(3, false);
        assert_eq!(session.advance().unwrap_err(), SessionError::NotAnswered);

        for expected in 1..3 {
            session.submit(1).unwrap();
            session.advance().unwrap();
            assert_eq!(session.current_index(), expected);
            assert_eq!(session.selected_option(), None);
            assert!(!session.is_answered());
            assert_eq!(session.remaining_seconds(), 3);
        }

        session.submit(1).unwrap();
        assert_eq!(session.advance().unwrap(), &SessionPhase::Finished);
        assert_eq!(session.current_index(), 2);
        assert!(session.advance().is_err());
    }

    #[test]
    fn timeout_counts_as_miss() {
        let mut session = active_session(1, false);
        assert_eq!(session.tick(), TickOutcome::Counted { remaining: 2 });
        assert_eq!(session.tick(), TickOutcome::Counted { remaining: 1 });
        assert_eq!(session.tick(), TickOutcome::Expired);

        assert!(session.is_answered());
        assert_eq!(session.selected_option(), None);
        assert_eq!(session.mistakes().len(), 1);
        assert_eq!(session.tick(), TickOutcome::Ignored);
        assert_eq!(session.submit(1).unwrap(), AnswerOutcome::Ignored);
        assert_eq!(session.score(), 0.0);
    }

    #[test]
    fn submit_before_expiry_wins_over_timer() {
        let mut session = active_session(1, false);
        session.tick();
        session.tick();
        session.submit(1).unwrap();
        assert_eq!(session.tick(), TickOutcome::Ignored);
        assert!(session.mistakes().is_empty());
        assert_eq!(session.score(), 1.0);
    }

    #[test]
    fn ticks_outside_active_phase_are_ignored() {
        let mut session = QuizSession::new(Uuid::new_v4(), "u".into(), config(1, false));
        assert_eq!(session.tick(), TickOutcome::Ignored);
        assert_eq!(session.remaining_seconds(), 3);
    }

    #[test]
    fn free_mode_scenario() {
        let mut session = active_session(3, false);
        answer_and_advance(&mut session, 1);
        answer_and_advance(&mut session, 0);
        answer_and_advance(&mut session, 1);

        assert_eq!(session.phase(), &SessionPhase::Finished);
        assert_eq!(session.score(), 2.0);
        assert_eq!(session.mistakes().len(), 1);
        assert_eq!(session.earned_points(), 20);
    }

    #[test]
    fn paid_mode_scenario_with_timeout() {
        let mut session = active_session(4, true);
        answer_and_advance(&mut session, 1);
        answer_and_advance(&mut session, 0);
        answer_and_advance(&mut session, 2);
        while session.tick() != TickOutcome::Expired {}
        session.advance().unwrap();

        assert_eq!(session.phase(), &SessionPhase::Finished);
        assert_eq!(session.score(), 0.25);
        assert_eq!(session.mistakes().len(), 3);
        assert_eq!(session.earned_points(), 2);
    }

    #[test]
    fn paid_score_can_go_negative_but_points_floor_at_zero() {
        let mut session = active_session(2, true);
        answer_and_advance(&mut session, 0);
        answer_and_advance(&mut session, 0);
        assert_eq!(session.score(), -0.5);
        assert_eq!(session.earned_points(), 0);
    }

    #[test]
    fn fractional_score_points_are_floored() {
        let mut session = active_session(9, true);
        for _ in 0..8 {
            answer_and_advance(&mut session, 1);
        }
        answer_and_advance(&mut session, 3);
        assert_eq!(session.score(), 7.75);
        assert_eq!(session.earned_points(), 77);

        let mut session = active_session(11, true);
        for _ in 0..8 {
            answer_and_advance(&mut session, 1);
        }
        for _ in 0..3 {
            answer_and_advance(&mut session, 0);
        }
        assert_eq!(session.score(), 7.25);
        assert_eq!(session.earned_points(), 72);
    }

    #[test]
    fn mistakes_never_exceed_questions_seen() {
        let mut session = active_session(5, true);
        for _ in 0..5 {
            session.submit(3).unwrap();
            assert!(session.mistakes().len() <= session.current_index() + 1);
            session.advance().unwrap();
        }
        assert_eq!(session.mistakes().len(), 5);
    }

    #[test]
    fn bookmarks_toggle_per_question() {
        let mut session = active_session(2, false);
        assert!(session.toggle_bookmark().unwrap());
        assert!(session.is_bookmarked());
        answer_and_advance(&mut session, 1);
        assert!(!session.is_bookmarked());
        assert!(session.toggle_bookmark().unwrap());
        assert!(!session.toggle_bookmark().unwrap());

        let prompts: Vec<_> = session.bookmarks().map(|q| q.prompt.clone()).collect();
        assert_eq!(prompts, vec!["প্রশ্ন 0".to_string()]);
    }

    #[test]
    fn media_failure_keeps_question_answerable() {
        let mut session = active_session(2, false);
        session.report_media_failure().unwrap();
        assert!(session.media_failed());
        assert_eq!(session.submit(1).unwrap(), AnswerOutcome::Scored { correct: true });
        session.advance().unwrap();
        assert!(!session.media_failed());
    }

    #[test]
    fn settle_only_once_and_only_when_finished() {
        let mut session = active_session(1, false);
        assert!(matches!(
            session.settle("2026-01-01T00:00:00Z".into()),
            Err(SessionError::InvalidPhase { .. })
        ));

        answer_and_advance(&mut session, 1);
        let result = session.settle("2026-01-01T00:00:00Z".into()).unwrap();
        assert_eq!(result.score, 1.0);
        assert_eq!(result.total, 1);
        assert_eq!(result.earned_points, 10);
        assert_eq!(result.subject, "সাধারণ জ্ঞান");
        assert!(session.is_settled());

        assert_eq!(
            session.settle("2026-01-01T00:00:01Z".into()).unwrap_err(),
            SessionError::AlreadySettled
        );
    }
}
