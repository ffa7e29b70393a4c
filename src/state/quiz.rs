use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{CorrectAnswerEntity, MediaEntity, QuestionEntity, QuizResultEntity};

/// Quiz identifier reserved for on-demand mock quizzes; never looked up in storage.
pub const MOCK_QUIZ_ID: &str = "mock";

/// Language the generated questions should be written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    /// Bengali.
    #[default]
    Bn,
    /// English.
    En,
}

impl Language {
    /// Human readable language name used when talking to the generator.
    pub fn display_name(self) -> &'static str {
        match self {
            Language::Bn => "Bengali",
            Language::En => "English",
        }
    }
}

/// Kind of media attached to a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Still image.
    Image,
    /// Video clip.
    Video,
}

/// Media asset displayed alongside a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    /// Kind of asset.
    pub kind: MediaKind,
    /// URL as authored; share links are rewritten before display.
    pub url: String,
}

/// One multiple-choice item. Immutable once it is part of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Question text shown to the player.
    pub prompt: String,
    /// Answer options, four in well-formed data.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_index: usize,
    /// Optional explanation revealed after answering.
    pub explanation: Option<String>,
    /// Optional media asset.
    pub media: Option<Media>,
}

impl Question {
    /// Whether `option` is the correct answer.
    pub fn is_correct(&self, option: usize) -> bool {
        self.correct_index == option
    }
}

/// Immutable configuration of a single quiz session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSessionConfig {
    /// Subject or topic of the quiz.
    pub topic: String,
    /// Number of questions requested.
    pub question_count: u32,
    /// Countdown budget per question.
    pub seconds_per_question: u32,
    /// Paid quizzes penalise wrong answers.
    pub is_paid_mode: bool,
    /// Pre-authored quiz to load instead of generating questions.
    pub source_quiz_id: Option<String>,
    /// Language used for generated questions.
    pub language: Language,
}

impl QuizSessionConfig {
    /// Quiz id to look up in storage, if any. The mock sentinel and blank ids resolve to `None`.
    pub fn stored_quiz_id(&self) -> Option<&str> {
        self.source_quiz_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != MOCK_QUIZ_ID)
    }
}

/// Outcome of a settled session, persisted once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizResult {
    /// Acting user the result belongs to.
    pub user_id: String,
    /// Subject (topic) of the quiz.
    pub subject: String,
    /// Final score rounded to two decimals.
    pub score: f64,
    /// Requested question count.
    pub total: u32,
    /// RFC 3339 timestamp of the settlement.
    pub date: String,
    /// Source quiz id, when the quiz was pre-authored.
    pub quiz_id: Option<String>,
    /// Questions answered wrong or timed out.
    pub mistakes: Vec<Question>,
    /// Reward points credited to the user.
    pub earned_points: u32,
}

/// Reasons a stored or generated question cannot be played.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedQuestion {
    /// The question has no text.
    #[error("question text is empty")]
    EmptyPrompt,
    /// The correct answer is missing or does not designate any option.
    #[error("correct answer `{0}` does not match any option")]
    UnresolvedAnswer(String),
}

impl TryFrom<QuestionEntity> for Question {
    type Error = MalformedQuestion;

    fn try_from(value: QuestionEntity) -> Result<Self, Self::Error> {
        let prompt = value.question.trim().to_string();
        if prompt.is_empty() {
            return Err(MalformedQuestion::EmptyPrompt);
        }

        let options = value.options;
        let correct_index = match value.correct_answer {
            Some(CorrectAnswerEntity::Index(index)) => usize::try_from(index)
                .ok()
                .filter(|index| *index < options.len())
                .ok_or_else(|| MalformedQuestion::UnresolvedAnswer(index.to_string()))?,
            Some(CorrectAnswerEntity::Text(text)) => resolve_text_answer(&text, &options)
                .ok_or(MalformedQuestion::UnresolvedAnswer(text))?,
            None => return Err(MalformedQuestion::UnresolvedAnswer("<missing>".into())),
        };

        let media = value
            .media
            .map(Into::into)
            .or_else(|| {
                value.image_url.map(|url| Media {
                    kind: MediaKind::Image,
                    url,
                })
            })
            .filter(|media: &Media| !media.url.trim().is_empty());

        Ok(Self {
            prompt,
            options,
            correct_index,
            explanation: value.explanation.filter(|text| !text.trim().is_empty()),
            media,
        })
    }
}

/// Generators sometimes answer with the option text or a stringified index.
fn resolve_text_answer(text: &str, options: &[String]) -> Option<usize> {
    let trimmed = text.trim();
    if let Ok(index) = trimmed.parse::<usize>() {
        return (index < options.len()).then_some(index);
    }
    options.iter().position(|option| option.trim() == trimmed)
}

impl From<MediaEntity> for Media {
    fn from(value: MediaEntity) -> Self {
        Self {
            kind: value.kind,
            url: value.url,
        }
    }
}

impl From<Media> for MediaEntity {
    fn from(value: Media) -> Self {
        Self {
            kind: value.kind,
            url: value.url,
        }
    }
}

impl From<Question> for QuestionEntity {
    fn from(value: Question) -> Self {
        Self {
            question: value.prompt,
            options: value.options,
            correct_answer: Some(CorrectAnswerEntity::Index(value.correct_index as i64)),
            explanation: value.explanation,
            media: value.media.map(Into::into),
            image_url: None,
        }
    }
}

impl From<(Uuid, QuizResult)> for QuizResultEntity {
    fn from((id, result): (Uuid, QuizResult)) -> Self {
        Self {
            id,
            user_id: result.user_id,
            subject: result.subject,
            score: result.score,
            total: result.total,
            earned_points: result.earned_points,
            date: result.date,
            quiz_id: result.quiz_id,
            mistakes: result.mistakes.into_iter().map(Into::into).collect(),
        }
    }
}

/// Normalise raw question entities, dropping the ones that cannot be played.
pub fn normalize_questions(entities: Vec<QuestionEntity>) -> Vec<Question> {
    entities
        .into_iter()
        .filter_map(|entity| match Question::try_from(entity) {
            Ok(question) => Some(question),
            Err(err) => {
                tracing::debug!(error = %err, "dropping malformed question");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(question: &str, answer: Option<CorrectAnswerEntity>) -> QuestionEntity {
        QuestionEntity {
            question: question.into(),
            options: vec!["ঢাকা".into(), "খুলনা".into(), "রাজশাহী".into(), "সিলেট".into()],
            correct_answer: answer,
            explanation: Some("  ".into()),
            media: None,
            image_url: None,
        }
    }

    #[test]
    fn numeric_answer_is_used_as_index() {
        let question =
            Question::try_from(entity("বাংলাদেশের রাজধানী?", Some(CorrectAnswerEntity::Index(0))))
                .unwrap();
        assert_eq!(question.correct_index, 0);
        assert_eq!(question.explanation, None);
    }

    #[test]
    fn text_answer_matches_option() {
        let question = Question::try_from(entity(
            "Capital?",
            Some(CorrectAnswerEntity::Text("সিলেট".into())),
        ))
        .unwrap();
        assert_eq!(question.correct_index, 3);

        let question =
            Question::try_from(entity("Capital?", Some(CorrectAnswerEntity::Text("2".into()))))
                .unwrap();
        assert_eq!(question.correct_index, 2);
    }

    #[test]
    fn empty_prompt_and_missing_answer_are_rejected() {
        assert_eq!(
            Question::try_from(entity("   ", Some(CorrectAnswerEntity::Index(1)))),
            Err(MalformedQuestion::EmptyPrompt)
        );
        assert!(matches!(
            Question::try_from(entity("Capital?", None)),
            Err(MalformedQuestion::UnresolvedAnswer(_))
        ));
        assert!(matches!(
            Question::try_from(entity("Capital?", Some(CorrectAnswerEntity::Index(7)))),
            Err(MalformedQuestion::UnresolvedAnswer(_))
        ));
    }

    #[test]
    fn short_option_lists_are_kept() {
        let mut raw = entity("Capital?", Some(CorrectAnswerEntity::Index(1)));
        raw.options.truncate(2);
        let question = Question::try_from(raw).unwrap();
        assert_eq!(question.options.len(), 2);
    }

    #[test]
    fn flat_image_url_becomes_media() {
        let mut raw = entity("Flag?", Some(CorrectAnswerEntity::Index(0)));
        raw.image_url = Some("https://example.com/flag.png".into());
        let question = Question::try_from(raw).unwrap();
        assert_eq!(
            question.media,
            Some(Media {
                kind: MediaKind::Image,
                url: "https://example.com/flag.png".into()
            })
        );
    }

    #[test]
    fn mock_and_blank_ids_are_not_stored_ids() {
        let mut config = QuizSessionConfig {
            topic: "BCS".into(),
            question_count: 10,
            seconds_per_question: 30,
            is_paid_mode: false,
            source_quiz_id: Some(MOCK_QUIZ_ID.into()),
            language: Language::Bn,
        };
        assert_eq!(config.stored_quiz_id(), None);
        config.source_quiz_id = Some("  ".into());
        assert_eq!(config.stored_quiz_id(), None);
        config.source_quiz_id = Some("quiz-42".into());
        assert_eq!(config.stored_quiz_id(), Some("quiz-42"));
    }
}
