use std::sync::LazyLock;
use bcrypt::{hash, verify, DEFAULT_COST};
use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, DEFAULT_COST).map_err(|e| AppError::internal(format!("Hash error: {e}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    verify(password, password_hash)
        .map_err(|e| AppError::internal(format!("Password verify error: {e}")))
}

/// Same cost as real hashes, so an unknown username takes as long to reject
/// as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash("cagpu-unknown-account", DEFAULT_COST).ok());

/// Checks a login attempt. `None` means no such user: a bcrypt check still
/// runs and the attempt fails.
pub fn verify_login(password: &str, stored_hash: Option<&str>) -> Result<bool, AppError> {
    match stored_hash {
        Some(h) => verify_password(password, h),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify(password, dummy);
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_passwords_fail_validation() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long enough").is_ok());
    }

    #[test]
    fn hash_then_verify() {
        let h = bcrypt::hash("correct horse", 4).unwrap();
        assert!(verify_password("correct horse", &h).unwrap());
        assert!(!verify_password("wrong horse", &h).unwrap());
    }

    #[test]
    fn unknown_account_never_verifies() {
        assert!(!verify_login("cagpu-unknown-account", None).unwrap());
        assert!(DUMMY_HASH.is_some());

        let h = bcrypt::hash("correct horse", 4).unwrap();
        assert!(verify_login("correct horse", Some(&h)).unwrap());
    }
}
