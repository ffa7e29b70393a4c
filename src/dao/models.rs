use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::quiz::MediaKind;

/// Pre-authored quiz document as written by the admin tooling.
///
/// Older documents carry `questions`, newer ones `manualQuestions`; both are accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuizEntity {
    /// Display title of the quiz.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Questions typed in by an administrator.
    #[serde(rename = "manualQuestions", default)]
    pub manual_questions: Vec<QuestionEntity>,
    /// Legacy question array.
    #[serde(default)]
    pub questions: Vec<QuestionEntity>,
}

impl QuizEntity {
    /// Authored question array, preferring `manualQuestions` when it is populated.
    pub fn into_question_set(self) -> Vec<QuestionEntity> {
        if self.manual_questions.is_empty() {
            self.questions
        } else {
            self.manual_questions
        }
    }
}

/// Question as stored in a quiz document or returned by the generator.
///
/// Field names vary between producers so the shape is lenient on read; it is
/// normalised into [`crate::state::quiz::Question`] before play.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionEntity {
    /// Question text.
    #[serde(alias = "prompt", alias = "text", default)]
    pub question: String,
    /// Answer options.
    #[serde(default)]
    pub options: Vec<String>,
    /// Correct option, as an index or as the option text.
    #[serde(
        alias = "correctIndex",
        alias = "answer",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correct_answer: Option<CorrectAnswerEntity>,
    /// Explanation shown after answering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Attached media asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaEntity>,
    /// Flat image URL used by older documents.
    #[serde(alias = "image", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Correct answer designation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CorrectAnswerEntity {
    /// Zero-based option index.
    Index(i64),
    /// Option text or stringified index.
    Text(String),
}

/// Media reference attached to a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaEntity {
    /// Image or video.
    #[serde(alias = "type")]
    pub kind: MediaKind,
    /// Location of the asset.
    pub url: String,
}

/// Result record appended once per settled session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultEntity {
    /// Identifier of the result record.
    pub id: Uuid,
    /// User the result belongs to.
    pub user_id: String,
    /// Subject (topic) of the quiz.
    pub subject: String,
    /// Final score, two decimals.
    pub score: f64,
    /// Requested question count.
    pub total: u32,
    /// Points credited for this result.
    pub earned_points: u32,
    /// RFC 3339 timestamp.
    pub date: String,
    /// Source quiz id for pre-authored quizzes.
    #[serde(default)]
    pub quiz_id: Option<String>,
    /// Questions answered wrong or timed out.
    #[serde(default)]
    pub mistakes: Vec<QuestionEntity>,
}

/// Cumulative counters kept on the user document.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStatsEntity {
    /// Reward points accumulated across quizzes.
    #[serde(default)]
    pub points: i64,
    /// Number of settled quizzes.
    #[serde(default)]
    pub streak: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_questions_take_precedence() {
        let raw = r#"{
            "title": "BCS Preli 44",
            "questions": [{"question": "legacy", "options": ["a","b","c","d"], "correctAnswer": 0}],
            "manualQuestions": [{"prompt": "manual", "options": ["a","b","c","d"], "correctIndex": 2}]
        }"#;
        let quiz: QuizEntity = serde_json::from_str(raw).unwrap();
        let set = quiz.into_question_set();
        assert_eq!(set.len(), 1);
        assert_eq!(set[0].question, "manual");
        assert_eq!(set[0].correct_answer, Some(CorrectAnswerEntity::Index(2)));
    }

    #[test]
    fn legacy_questions_used_when_manual_empty() {
        let raw = r#"{"manualQuestions": [], "questions": [{"question": "legacy", "options": [], "answer": "b"}]}"#;
        let quiz: QuizEntity = serde_json::from_str(raw).unwrap();
        let set = quiz.into_question_set();
        assert_eq!(set[0].question, "legacy");
        assert_eq!(set[0].correct_answer, Some(CorrectAnswerEntity::Text("b".into())));
    }

    #[test]
    fn media_accepts_type_alias() {
        let raw = r#"{"question": "q", "options": [], "media": {"type": "video", "url": "https://x"}}"#;
        let question: QuestionEntity = serde_json::from_str(raw).unwrap();
        assert_eq!(question.media.unwrap().kind, MediaKind::Video);
    }
}
