use crate::dao::models::QuestionEntity;

use super::GeneratorError;

/// Parse the generator's text into raw questions.
///
/// Models wrap JSON in markdown fences or prepend a sentence, so the outermost
/// `[...]` slice is parsed. A single object or an object with a `questions`
/// array is accepted as well.
pub fn parse_questions(text: &str) -> Result<Vec<QuestionEntity>, GeneratorError> {
    let trimmed = strip_fences(text.trim());
    if trimmed.is_empty() {
        return Err(GeneratorError::EmptyResponse);
    }

    let candidate = match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if start < end && !trimmed.starts_with('{') => {
            &trimmed[start..=end]
        }
        _ => trimmed,
    };

    let value: serde_json::Value =
        serde_json::from_str(candidate).map_err(GeneratorError::Parse)?;
    let value = match value {
        serde_json::Value::Object(mut object) if object.contains_key("questions") => {
            object.remove("questions").unwrap_or_default()
        }
        serde_json::Value::Object(object) => {
            serde_json::Value::Array(vec![serde_json::Value::Object(object)])
        }
        other => other,
    };

    let questions: Vec<QuestionEntity> =
        serde_json::from_value(value).map_err(GeneratorError::Parse)?;
    if questions.is_empty() {
        return Err(GeneratorError::NoQuestions);
    }
    Ok(questions)
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
