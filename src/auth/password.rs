use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use tracing::error;

use crate::error::ApiError;

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

const MIN_LENGTH: usize = 8;
const REQUIRED_CHECKS: usize = 5;
const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";
const COMMON_PASSWORDS: &[&str] = &[
    "password", "123456", "123456789", "qwerty", "abc123", "password123", "admin",
    "letmein", "welcome", "monkey", "1234567890", "dragon", "master", "hello", "login",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PasswordPolicyError {
    #[error("Password must be at least 8 characters long")]
    TooShort,
    #[error("Password is too weak: {0}")]
    TooWeak(String),
}

impl From<PasswordPolicyError> for ApiError {
    fn from(e: PasswordPolicyError) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

/// Length is mandatory; of the six checks (length, upper, lower, digit,
/// special, not common) at least five must hold.
pub fn check_password_policy(password: &str) -> Result<(), PasswordPolicyError> {
    if password.chars().count() < MIN_LENGTH {
        return Err(PasswordPolicyError::TooShort);
    }

    let checks: [(bool, &str); 6] = [
        (true, "at least 8 characters"),
        (password.chars().any(|c| c.is_ascii_uppercase()), "an uppercase letter"),
        (password.chars().any(|c| c.is_ascii_lowercase()), "a lowercase letter"),
        (password.chars().any(|c| c.is_ascii_digit()), "a digit"),
        (password.chars().any(|c| SPECIAL_CHARS.contains(c)), "a special character"),
        (
            !COMMON_PASSWORDS.contains(&password.to_lowercase().as_str()),
            "not a common password",
        ),
    ];

    let passed = checks.iter().filter(|(ok, _)| *ok).count();
    if passed >= REQUIRED_CHECKS {
        return Ok(());
    }
    let missing: Vec<&str> = checks
        .iter()
        .filter(|(ok, _)| !*ok)
        .map(|(_, label)| *label)
        .collect();
    Err(PasswordPolicyError::TooWeak(format!("missing {}", missing.join(", "))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("correct-horse-battery-staple").expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        assert!(verify_password("anything", "not-a-valid-hash").is_err());
    }

    #[test]
    fn email_validation_and_normalisation() {
        assert!(is_valid_email("user@example.com"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("us er@example.com"));
        assert_eq!(normalize_email("  User@Example.COM "), "user@example.com");
    }

    #[test]
    fn policy_requires_length() {
        assert_eq!(check_password_policy("Ab1!"), Err(PasswordPolicyError::TooShort));
    }

    #[test]
    fn policy_accepts_five_of_six() {
        // no special character
        assert!(check_password_policy("Abcdefg1").is_ok());
        // no digit
        assert!(check_password_policy("Abcdefg!").is_ok());
        assert!(check_password_policy("Secur3P@ssw0rd!").is_ok());
    }

    #[test]
    fn policy_rejects_two_missing() {
        // only lowercase + length + not common
        let err = check_password_policy("abcdefghij").unwrap_err();
        match err {
            PasswordPolicyError::TooWeak(msg) => {
                assert!(msg.contains("uppercase"));
                assert!(msg.contains("digit"));
            }
            other => panic!("unexpected {other:?}"),
        }
        // upper, lower and digit, but common and without a special character
        assert!(check_password_policy("Password123").is_err());
    }
}
