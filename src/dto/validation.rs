//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_NAME_LENGTH: usize = 64;

/// Validates that a display name is non-blank, has no surrounding whitespace and fits in 64 characters.
///
/// # Examples
///
/// ```ignore
/// validate_display_name("Aria")      // Ok
/// validate_display_name("  ")        // Err - blank
/// validate_display_name(" Aria")     // Err - padded
/// ```
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("name_blank");
        err.message = Some("Name must not be blank".into());
        return Err(err);
    }

    if name.trim() != name {
        let mut err = ValidationError::new("name_padding");
        err.message = Some("Name must not start or end with whitespace".into());
        return Err(err);
    }

    let length = name.chars().count();
    if length > MAX_NAME_LENGTH {
        let mut err = ValidationError::new("name_length");
        err.message = Some(
            format!("Name must be at most {MAX_NAME_LENGTH} characters (got {length})").into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates that a current resource value does not exceed its maximum.
pub fn validate_within_max(current: u32, max: u32) -> Result<(), ValidationError> {
    if current > max {
        let mut err = ValidationError::new("above_max");
        err.message = Some(format!("Value {current} exceeds its maximum {max}").into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_display_name_valid() {
        assert!(validate_display_name("Aria").is_ok());
        assert!(validate_display_name("Sir Lancelot the Brave").is_ok());
        assert!(validate_display_name(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_validate_display_name_invalid() {
        assert!(validate_display_name("").is_err());
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name(" Aria").is_err());
        assert!(validate_display_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_within_max() {
        assert!(validate_within_max(0, 0).is_ok());
        assert!(validate_within_max(30, 30).is_ok());
        assert!(validate_within_max(31, 30).is_err());
    }
}
