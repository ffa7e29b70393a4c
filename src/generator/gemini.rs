use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{dao::models::QuestionEntity, state::quiz::Language};

use super::{GenerationRequest, GeneratorError, QuestionGenerator, parse_questions};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const MAX_ERROR_BODY: usize = 512;

/// Connection settings for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key sent in the `x-goog-api-key` header.
    pub api_key: String,
    /// Model name, e.g. `gemini-2.0-flash`.
    pub model: String,
    /// API root without trailing slash.
    pub base_url: String,
}

impl GeminiConfig {
    /// Read `GEMINI_API_KEY`, `GEMINI_MODEL` and `GEMINI_BASE_URL`. Returns `None` without a key.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())?;
        Some(Self {
            api_key,
            model: std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into()),
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// [`QuestionGenerator`] calling Google's Gemini API over HTTP.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    config: Arc<GeminiConfig>,
}

impl GeminiGenerator {
    /// Build a generator sharing one HTTP client across calls.
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<Vec<QuestionEntity>, GeneratorError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part {
                    text: Some(build_prompt(&request)),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.7,
            },
        };

        debug!(topic = %request.topic, count = request.count, "requesting generated questions");
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(GeneratorError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|index| body.is_char_boundary(*index))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(GeneratorError::Status { status, body });
        }

        let payload = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(GeneratorError::Decode)?;

        let text = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        parse_questions(&text)
    }
}

impl QuestionGenerator for GeminiGenerator {
    fn generate(
        &self,
        request: GenerationRequest,
    ) -> BoxFuture<'static, Result<Vec<QuestionEntity>, GeneratorError>> {
        let generator = self.clone();
        Box::pin(async move { generator.generate(request).await })
    }
}

fn build_prompt(request: &GenerationRequest) -> String {
    let audience = match request.language {
        Language::Bn => "Bangladeshi students preparing for BCS, SSC, HSC, admission and job exams",
        Language::En => "students preparing for competitive exams",
    };
    format!(
        "Create {count} distinct multiple-choice questions about \"{topic}\" for {audience}. \
         Write every question, option and explanation in {language}. \
         Each question must have exactly 4 unique options. \
         Respond with a JSON array only, where each item is \
         {{\"question\": string, \"options\": [string, string, string, string], \
         \"correctAnswer\": index of the correct option (0-3), \"explanation\": string}}.",
        count = request.count,
        topic = request.topic,
        language = request.language.display_name(),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}
