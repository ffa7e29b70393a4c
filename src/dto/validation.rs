//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest document key accepted from clients.
const MAX_KEY_LEN: usize = 128;

/// Rejects empty or whitespace-only strings.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a quiz document identifier.
///
/// Identifiers are used as document keys, so path separators and control characters
/// are rejected.
///
/// ```ignore
/// validate_quiz_id("bcs-44-preli") // Ok
/// validate_quiz_id("mock")         // Ok - generated quiz
/// validate_quiz_id("a/b")          // Err - separator
/// ```
pub fn validate_quiz_id(id: &str) -> Result<(), ValidationError> {
    validate_key(id, "Quiz ID", "quiz_id_length", "quiz_id_format")
}

/// Validates the acting user's identifier, which keys the user's counters document.
pub fn validate_user_id(id: &str) -> Result<(), ValidationError> {
    validate_not_blank(id)?;
    validate_key(id.trim(), "User ID", "user_id_length", "user_id_format")
}

fn validate_key(
    key: &str,
    label: &str,
    length_code: &'static str,
    format_code: &'static str,
) -> Result<(), ValidationError> {
    if key.len() > MAX_KEY_LEN {
        let mut err = ValidationError::new(length_code);
        err.message = Some(
            format!(
                "{label} must be at most {MAX_KEY_LEN} bytes (got {})",
                key.len()
            )
            .into(),
        );
        return Err(err);
    }

    if key
        .chars()
        .any(|c| matches!(c, '/' | '\\' | '?' | '#') || c.is_control())
    {
        let mut err = ValidationError::new(format_code);
        err.message =
            Some(format!("{label} must not contain separators or control characters").into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("সাধারণ জ্ঞান").is_ok());
        assert!(validate_not_blank("").is_err());
        assert!(validate_not_blank(" \t\n").is_err());
    }

    #[test]
    fn test_validate_quiz_id_valid() {
        assert!(validate_quiz_id("mock").is_ok());
        assert!(validate_quiz_id("bcs-44-preli").is_ok());
        assert!(validate_quiz_id("65f0c2a9e1b2").is_ok());
    }

    #[test]
    fn test_validate_quiz_id_invalid() {
        assert!(validate_quiz_id("a/b").is_err());
        assert!(validate_quiz_id("a\\b").is_err());
        assert!(validate_quiz_id("line\nbreak").is_err());
        assert!(validate_quiz_id("a?b").is_err());
        assert!(validate_quiz_id(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("firebase-uid-42").is_ok());
        assert!(validate_user_id("  u-1  ").is_ok());
        assert!(validate_user_id("   ").is_err());
        assert!(validate_user_id("../admin").is_err());
        assert!(validate_user_id("u-1?rev=2").is_err());
        assert!(validate_user_id("u-1#frag").is_err());
    }
}
