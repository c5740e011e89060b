use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::core::errors::ApiError;

/// Longest password prefix that is hashed; longer inputs are cut on a char boundary.
const MAX_PASSWORD_BYTES: usize = 72;

fn truncate_password(password: &str) -> &str {
    if password.len() <= MAX_PASSWORD_BYTES {
        return password;
    }
    let mut end = MAX_PASSWORD_BYTES;
    while !password.is_char_boundary(end) {
        end -= 1;
    }
    &password[..end]
}

/// Argon2id PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes).map_err(ApiError::internal)?;
    Argon2::default()
        .hash_password(truncate_password(password).as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(ApiError::internal)
}

/// `false` for a wrong password and for unreadable hashes.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hashed) else {
        return false;
    };
    Argon2::default()
        .verify_password(truncate_password(password).as_bytes(), &parsed)
        .is_ok()
}

/// At least 8 characters with an uppercase letter, a lowercase letter and a digit.
pub fn validate_password_strength(password: &str) -> Result<(), ApiError> {
    let problem = if password.chars().count() < 8 {
        Some("Password must be at least 8 characters long")
    } else if !password.chars().any(char::is_uppercase) {
        Some("Password must contain at least one uppercase letter")
    } else if !password.chars().any(char::is_lowercase) {
        Some("Password must contain at least one lowercase letter")
    } else if !password.chars().any(|c| c.is_ascii_digit()) {
        Some("Password must contain at least one number")
    } else {
        None
    };

    match problem {
        Some(message) => Err(ApiError::BadRequest(message.to_string())),
        None => Ok(()),
    }
}
