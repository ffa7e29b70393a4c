use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{QuizResultEntity, UserStatsEntity};

pub const QUIZ_PREFIX: &str = "quiz::";
pub const RESULT_PREFIX: &str = "result::";
pub const USER_PREFIX: &str = "user::";

pub fn quiz_doc_id(id: &str) -> String {
    format!("{QUIZ_PREFIX}{id}")
}

pub fn result_doc_id(id: Uuid) -> String {
    format!("{RESULT_PREFIX}{id}")
}

pub fn user_doc_id(user_id: &str) -> String {
    format!("{USER_PREFIX}{user_id}")
}

#[derive(Debug, Clone, Serialize)]
pub struct CouchResultDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub result: QuizResultEntity,
}

impl From<QuizResultEntity> for CouchResultDocument {
    fn from(result: QuizResultEntity) -> Self {
        Self {
            id: result_doc_id(result.id),
            result,
        }
    }
}

/// User counters. Unknown fields written by other clients are carried through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchUserDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub stats: UserStatsEntity,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CouchUserDocument {
    pub fn empty(user_id: &str) -> Self {
        Self {
            id: user_doc_id(user_id),
            rev: None,
            stats: UserStatsEntity::default(),
            extra: serde_json::Map::new(),
        }
    }
}
