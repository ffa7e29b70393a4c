//! Question supply: stored quiz first, generator otherwise, with one bounded retry.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    dao::quiz_store::QuizStore,
    generator::{GenerationRequest, GeneratorError, QuestionGenerator},
    state::quiz::{Question, QuizSessionConfig, normalize_questions},
};

/// Terminal supply failures; both put the session into its error phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupplyError {
    /// Every generation attempt failed; carries the last failure.
    #[error("failed to load questions: {details}")]
    Failed {
        /// Human-readable reason of the last attempt's failure.
        details: String,
    },
    /// Generation succeeded but no entry was playable.
    #[error("no usable questions were returned")]
    Empty,
}

/// Resolve a playable question set for `config`.
///
/// A stored quiz is used when `source_quiz_id` names one that yields at least one
/// question. Otherwise the generator is asked for `question_count` questions, then
/// once more for `min(question_count, retry_count_cap)` after `retry_backoff`.
pub async fn resolve(
    store: Option<Arc<dyn QuizStore>>,
    generator: Arc<dyn QuestionGenerator>,
    config: &QuizSessionConfig,
    settings: &AppConfig,
) -> Result<Vec<Question>, SupplyError> {
    if let Some(quiz_id) = config.stored_quiz_id() {
        match load_stored(store, quiz_id).await {
            Some(questions) => return Ok(questions),
            None => info!(quiz_id, "stored quiz unavailable; generating questions"),
        }
    }

    let mut request = GenerationRequest {
        topic: config.topic.clone(),
        count: config.question_count,
        language: config.language,
    };

    let first = match attempt(generator.as_ref(), request.clone(), settings).await {
        Ok(questions) => return non_empty(questions),
        Err(err) => err,
    };
    warn!(topic = %request.topic, error = %first, "question generation failed; retrying");

    sleep(settings.retry_backoff).await;
    request.count = request.count.min(settings.retry_count_cap);

    match attempt(generator.as_ref(), request.clone(), settings).await {
        Ok(questions) => non_empty(questions),
        Err(err) => {
            warn!(topic = %request.topic, error = %err, "question generation retry failed");
            Err(SupplyError::Failed {
                details: err.to_string(),
            })
        }
    }
}

async fn load_stored(store: Option<Arc<dyn QuizStore>>, quiz_id: &str) -> Option<Vec<Question>> {
    let Some(store) = store else {
        warn!(quiz_id, "no quiz store installed (degraded mode)");
        return None;
    };

    match store.find_quiz(quiz_id.to_string()).await {
        Ok(Some(quiz)) => {
            let questions = normalize_questions(quiz.into_question_set());
            debug!(quiz_id, count = questions.len(), "loaded stored quiz");
            (!questions.is_empty()).then_some(questions)
        }
        Ok(None) => None,
        Err(err) => {
            warn!(quiz_id, error = %err, "failed to read stored quiz");
            None
        }
    }
}

async fn attempt(
    generator: &dyn QuestionGenerator,
    request: GenerationRequest,
    settings: &AppConfig,
) -> Result<Vec<Question>, GeneratorError> {
    let limit = settings.ai_timeout;
    let raw = timeout(limit, generator.generate(request))
        .await
        .map_err(|_| GeneratorError::Timeout(limit))??;
    Ok(normalize_questions(raw))
}

fn non_empty(questions: Vec<Question>) -> Result<Vec<Question>, SupplyError> {
    if questions.is_empty() {
        Err(SupplyError::Empty)
    } else {
        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::{
        dao::{
            models::{QuestionEntity, QuizEntity},
            quiz_store::memory::MemoryQuizStore,
        },
        generator::testing::{ScriptedGenerator, Step, raw_questions},
        state::quiz::{Language, MOCK_QUIZ_ID},
    };

    fn config(count: u32, quiz_id: Option<&str>) -> QuizSessionConfig {
        QuizSessionConfig {
            topic: "Bangladesh Affairs".into(),
            question_count: count,
            seconds_per_question: 30,
            is_paid_mode: false,
            source_quiz_id: quiz_id.map(str::to_string),
            language: Language::Bn,
        }
    }

    fn stored_store(id: &str, questions: Vec<QuestionEntity>) -> Arc<dyn QuizStore> {
        let store = MemoryQuizStore::new();
        store.insert_quiz(
            id,
            QuizEntity {
                manual_questions: questions,
                ..QuizEntity::default()
            },
        );
        Arc::new(store)
    }

    #[tokio::test]
    async fn stored_quiz_skips_generator() {
        let generator = Arc::new(ScriptedGenerator::default());
        let store = stored_store("bcs-44", raw_questions(3));

        let questions = resolve(
            Some(store),
            generator.clone(),
            &config(10, Some("bcs-44")),
            &AppConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(questions.len(), 3);
        assert!(generator.requests().is_empty());
    }

    #[tokio::test]
    async fn mock_and_missing_quizzes_fall_back_to_generator() {
        let store = stored_store("bcs-44", raw_questions(3));

        for quiz_id in [Some(MOCK_QUIZ_ID), Some("unknown"), None] {
            let generator = Arc::new(ScriptedGenerator::new([Step::Return(raw_questions(5))]));
            let questions = resolve(
                Some(store.clone()),
                generator.clone(),
                &config(5, quiz_id),
                &AppConfig::default(),
            )
            .await
            .unwrap();

            assert_eq!(questions.len(), 5);
            let requests = generator.requests();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].count, 5);
            assert_eq!(requests[0].topic, "Bangladesh Affairs");
        }
    }

    #[tokio::test]
    async fn unplayable_stored_quiz_falls_back_to_generator() {
        let broken = vec![QuestionEntity {
            question: "  ".into(),
            ..QuestionEntity::default()
        }];
        let store = stored_store("broken", broken);
        let generator = Arc::new(ScriptedGenerator::new([Step::Return(raw_questions(2))]));

        let questions = resolve(
            Some(store),
            generator.clone(),
            &config(2, Some("broken")),
            &AppConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(questions.len(), 2);
        assert_eq!(generator.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_then_retry_with_reduced_count() {
        let generator = Arc::new(ScriptedGenerator::new([
            Step::Hang,
            Step::Return(raw_questions(15)),
        ]));
        let started = Instant::now();

        let questions = resolve(None, generator.clone(), &config(20, None), &AppConfig::default())
            .await
            .unwrap();

        assert_eq!(questions.len(), 15);
        assert!(started.elapsed() >= Duration::from_secs(152));
        let counts: Vec<_> = generator.requests().iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![20, 15]);
    }

    #[tokio::test(start_paused = true)]
    async fn two_failures_surface_second_reason() {
        let generator = Arc::new(ScriptedGenerator::new([
            Step::Fail(GeneratorError::NoQuestions),
            Step::Fail(GeneratorError::EmptyResponse),
            Step::Return(raw_questions(5)),
        ]));

        let err = resolve(None, generator.clone(), &config(5, None), &AppConfig::default())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SupplyError::Failed {
                details: GeneratorError::EmptyResponse.to_string()
            }
        );
        assert_eq!(generator.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_for_backoff() {
        let generator = Arc::new(ScriptedGenerator::new([
            Step::Fail(GeneratorError::NoQuestions),
            Step::Return(raw_questions(1)),
        ]));
        let started = Instant::now();

        resolve(None, generator, &config(1, None), &AppConfig::default())
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn unplayable_generated_questions_are_empty_result() {
        let broken = vec![QuestionEntity {
            question: "no answer".into(),
            options: vec!["a".into()],
            ..QuestionEntity::default()
        }];
        let generator = Arc::new(ScriptedGenerator::new([Step::Return(broken)]));

        let err = resolve(None, generator, &config(1, None), &AppConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err, SupplyError::Empty);
    }
}
