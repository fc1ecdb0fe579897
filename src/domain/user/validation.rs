//! User identifier validation

use thiserror::Error;

/// Errors that can occur during user id validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum UserValidationError {
    #[error("User ID cannot be empty")]
    EmptyId,

    #[error("User ID exceeds maximum length of {0} characters")]
    IdTooLong(usize),

    #[error("User ID contains invalid character: '{0}'. Only alphanumeric characters, '-', '_', '.' and '@' are allowed")]
    InvalidIdCharacter(char),
}

pub const MAX_USER_ID_LENGTH: usize = 128;

/// Validate a user ID
///
/// Identifiers come from the session provider, so the accepted alphabet is
/// wider than for workflow resources: e-mail style subjects are allowed.
pub fn validate_user_id(id: &str) -> Result<(), UserValidationError> {
    if id.is_empty() {
        return Err(UserValidationError::EmptyId);
    }

    if id.len() > MAX_USER_ID_LENGTH {
        return Err(UserValidationError::IdTooLong(MAX_USER_ID_LENGTH));
    }

    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@')))
    {
        return Err(UserValidationError::InvalidIdCharacter(c));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_user_ids() {
        assert!(validate_user_id("user-1").is_ok());
        assert!(validate_user_id("a").is_ok());
        assert!(validate_user_id("jane.doe@example.com").is_ok());
        assert!(validate_user_id("svc_account").is_ok());
    }

    #[test]
    fn test_empty_user_id() {
        assert_eq!(validate_user_id(""), Err(UserValidationError::EmptyId));
    }

    #[test]
    fn test_user_id_too_long() {
        let id = "a".repeat(MAX_USER_ID_LENGTH + 1);
        assert_eq!(
            validate_user_id(&id),
            Err(UserValidationError::IdTooLong(MAX_USER_ID_LENGTH))
        );
    }

    #[test]
    fn test_invalid_character() {
        assert_eq!(
            validate_user_id("user/1"),
            Err(UserValidationError::InvalidIdCharacter('/'))
        );
    }
}
