pub mod post;
pub mod user;

use thiserror::Error;

/// Bad input shape or length. Raised before any unit of work is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Checks that `value` holds between 1 and `max` characters (not bytes).
pub(crate) fn check_length(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len == 0 {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    if len > max {
        return Err(ValidationError::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_length_counts_characters() {
        // 3 characters, 9 bytes
        assert!(check_length("title", "가나다", 3).is_ok());
        assert!(check_length("title", "가나다라", 3).is_err());
    }

    #[test]
    fn test_check_length_rejects_empty() {
        let err = check_length("content", "", 10).unwrap_err();
        assert_eq!(err.field, "content");
        assert_eq!(err.to_string(), "content: must not be empty");
    }
}
