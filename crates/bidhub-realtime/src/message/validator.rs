//! Validation rules for topics and chat text.

use bidhub_core::error::AppError;

/// Maximum allowed topic length.
const MAX_TOPIC_LENGTH: usize = 256;

/// Validates topic name format.
pub fn validate_topic(topic: &str) -> Result<(), AppError> {
    if topic.is_empty() || topic.len() > MAX_TOPIC_LENGTH {
        return Err(AppError::validation("Invalid topic name length"));
    }

    if !topic
        .chars()
        .all(|c| c.is_alphanumeric() || c == ':' || c == '-' || c == '_')
    {
        return Err(AppError::validation("Topic name contains invalid characters"));
    }

    Ok(())
}

/// Validates a chat message body, returning the trimmed text.
pub fn validate_chat_message(raw: &str, max_chars: usize) -> Result<&str, AppError> {
    let text = raw.trim();

    if text.is_empty() {
        return Err(AppError::validation("Empty message"));
    }

    if text.chars().count() > max_chars {
        return Err(AppError::validation(format!(
            "Message exceeds maximum length of {max_chars} characters"
        )));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_rules() {
        assert!(validate_topic("auction:9b2e4c1a-0000-4000-8000-000000000001").is_ok());
        assert!(validate_topic("global_presence").is_ok());
        assert!(validate_topic("").is_err());
        assert!(validate_topic("auction 1").is_err());
        assert!(validate_topic(&"a".repeat(300)).is_err());
    }

    #[test]
    fn test_chat_is_trimmed_and_bounded() {
        assert_eq!(validate_chat_message("  hi there \n", 20).unwrap(), "hi there");
        assert!(validate_chat_message("   ", 20).is_err());
        assert!(validate_chat_message("abcdef", 5).is_err());
        assert!(validate_chat_message("héllo", 5).is_ok());
    }
}
