//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::{dao::models::CODE_LENGTH, services::feedback};

/// Longest display name accepted for a participant.
pub const MAX_NAME_LENGTH: usize = 32;

/// Validates a display name: non-blank once trimmed and at most [`MAX_NAME_LENGTH`] characters.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("name_empty");
        err.message = Some("Name must not be empty".into());
        return Err(err);
    }

    let length = trimmed.chars().count();
    if length > MAX_NAME_LENGTH {
        let mut err = ValidationError::new("name_length");
        err.message = Some(
            format!("Name must be at most {MAX_NAME_LENGTH} characters (got {length})").into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates a secret or a guess: exactly four ASCII digits, leading zeros allowed.
///
/// # Examples
///
/// ```ignore
/// validate_digits("0042") // Ok
/// validate_digits("123")  // Err - too short
/// validate_digits("12a4") // Err - not a digit
/// ```
pub fn validate_digits(digits: &str) -> Result<(), ValidationError> {
    if feedback::is_valid_code(digits.trim()) {
        return Ok(());
    }

    let mut err = ValidationError::new("digits_format");
    err.message = Some(format!("Expected exactly {CODE_LENGTH} digits").into());
    Err(err)
}

/// Validates an invite code: non-blank and alphanumeric.
pub fn validate_code(code: &str) -> Result<(), ValidationError> {
    let trimmed = code.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("code_format");
        err.message = Some("Room code must be a non-empty alphanumeric string".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("alice").is_ok());
        assert!(validate_name("  bob  ").is_ok());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_digits() {
        assert!(validate_digits("1234").is_ok());
        assert!(validate_digits("0000").is_ok());
        assert!(validate_digits("123").is_err()); // too short
        assert!(validate_digits("12345").is_err()); // too long
        assert!(validate_digits("12a4").is_err());
        assert!(validate_digits("").is_err());
    }

    #[test]
    fn test_validate_code() {
        assert!(validate_code("AB12CD").is_ok());
        assert!(validate_code("ab12cd").is_ok());
        assert!(validate_code("").is_err());
        assert!(validate_code("AB-12").is_err());
    }
}
