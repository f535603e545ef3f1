use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("value is too short (min {min}, got {got})")]
    TooShort { min: usize, got: usize },
    #[error("value is too long (max {max}, got {got})")]
    TooLong { max: usize, got: usize },
    #[error("value is blank")]
    Blank,
    #[error("invalid format")]
    InvalidFormat,
}

/// Text messages must carry something other than whitespace.
pub fn validate_message_text(text: &str, max_len: usize) -> Result<(), ValidationError> {
    let len = text.len();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > max_len {
        return Err(ValidationError::TooLong { max: max_len, got: len });
    }
    if text.trim().is_empty() {
        return Err(ValidationError::Blank);
    }
    Ok(())
}

/// Image references are URLs or `data:` URLs; only emptiness and embedded
/// whitespace are rejected here.
pub fn validate_image_ref(image_ref: &str) -> Result<(), ValidationError> {
    if image_ref.is_empty() {
        return Err(ValidationError::TooShort { min: 1, got: 0 });
    }
    if image_ref.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat);
    }
    Ok(())
}
