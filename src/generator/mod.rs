//! Generative question supply: the remote model is an opaque
//! `topic + count + language -> questions` function behind [`QuestionGenerator`].

pub mod gemini;
mod parse;

use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::{dao::models::QuestionEntity, state::quiz::Language};

pub use parse::parse_questions;

/// Parameters of a single generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Subject the questions are about.
    pub topic: String,
    /// Number of questions requested.
    pub count: u32,
    /// Output language.
    pub language: Language,
}

/// Failures of a generation attempt. Every variant counts as a failed attempt.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// No generator is configured for this deployment.
    #[error("question generator is not configured")]
    NotConfigured,
    /// The request could not be sent or the connection dropped.
    #[error("generator request failed: {0}")]
    Request(#[source] reqwest::Error),
    /// The remote service answered with an error status.
    #[error("generator returned status {status}: {body}")]
    Status {
        /// HTTP status.
        status: reqwest::StatusCode,
        /// Response body, truncated.
        body: String,
    },
    /// The response envelope could not be decoded.
    #[error("failed to decode generator response: {0}")]
    Decode(#[source] reqwest::Error),
    /// The response carried no text.
    #[error("generator returned an empty response")]
    EmptyResponse,
    /// The text was not a JSON array of questions.
    #[error("generator response is not a question array: {0}")]
    Parse(#[source] serde_json::Error),
    /// The text parsed but yielded no playable question.
    #[error("generator returned no usable questions")]
    NoQuestions,
    /// The attempt exceeded the caller's time budget.
    #[error("generator timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Remote function producing multiple-choice questions.
pub trait QuestionGenerator: Send + Sync {
    /// Produce up to `request.count` raw questions.
    fn generate(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'static, Result<Vec<QuestionEntity>, GeneratorError>>;
}

/// Generator used when no API key is available; every call fails immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGenerator;

impl QuestionGenerator for DisabledGenerator {
    fn generate(
        &self,
        _request: GenerationRequest,
    ) -> BoxFuture<'static, Result<Vec<QuestionEntity>, GeneratorError>> {
        Box::pin(async { Err(GeneratorError::NotConfigured) })
    }
}
