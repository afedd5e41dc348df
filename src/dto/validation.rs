//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::random::{ROOM_CODE_CHARSET, ROOM_CODE_LEN};

/// Longest accepted nickname, in characters.
pub const MAX_NICKNAME_CHARS: usize = 30;

/// Validates that a room code is five characters of `[A-Z0-9]`, case-insensitively.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("AB12C") // Ok
/// validate_room_code("ab12c") // Ok
/// validate_room_code("AB12")  // Err - too short
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    let code = code.trim();
    if code.chars().count() != ROOM_CODE_LEN {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be exactly {ROOM_CODE_LEN} characters (got {})",
                code.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .bytes()
        .all(|b| ROOM_CODE_CHARSET.contains(&b.to_ascii_uppercase()))
    {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a nickname: 1 to 30 characters once surrounding whitespace is removed.
pub fn validate_nickname(nickname: &str) -> Result<(), ValidationError> {
    let count = nickname.trim().chars().count();
    if count == 0 || count > MAX_NICKNAME_CHARS {
        let mut err = ValidationError::new("nickname_length");
        err.message = Some(
            format!("Nickname must be between 1 and {MAX_NICKNAME_CHARS} characters (got {count})")
                .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Canonical form of a room code typed by a player.
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_room_code_valid() {
        assert!(validate_room_code("AB12C").is_ok());
        assert!(validate_room_code("ab12c").is_ok());
        assert!(validate_room_code(" ZZZZZ ").is_ok());
    }

    #[test]
    fn test_validate_room_code_invalid_length() {
        assert!(validate_room_code("AB12").is_err());
        assert!(validate_room_code("AB12CD").is_err());
        assert!(validate_room_code("").is_err());
    }

    #[test]
    fn test_validate_room_code_invalid_format() {
        assert!(validate_room_code("AB-2C").is_err());
        assert!(validate_room_code("AB 2C").is_err());
        assert!(validate_room_code("ÀB12C").is_err());
    }

    #[test]
    fn test_validate_nickname() {
        assert!(validate_nickname("Alice").is_ok());
        assert!(validate_nickname(&"x".repeat(30)).is_ok());
        assert!(validate_nickname(&"x".repeat(31)).is_err());
        assert!(validate_nickname("   ").is_err());
    }
}
