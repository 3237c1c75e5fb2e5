//! Password strength rule applied at account creation.
use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const PASSWORD_SYMBOLS: [char; 4] = ['!', '@', '#', '?'];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WeakPassword {
    #[error("password must be at least 8 characters")]
    TooShort,
    #[error("password must mix uppercase and lowercase letters")]
    MissingCase,
    #[error("password must contain a digit")]
    MissingDigit,
    #[error("password must contain one of ! @ # ?")]
    MissingSymbol,
}

/// Check `password` against the strength rule: at least eight characters, an
/// uppercase letter, a lowercase letter, a digit, and one of `! @ # ?`.
pub fn check_strength(password: &str) -> Result<(), WeakPassword> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(WeakPassword::TooShort);
    }
    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    if !(has_upper && has_lower) {
        return Err(WeakPassword::MissingCase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(WeakPassword::MissingDigit);
    }
    if !password.chars().any(|c| PASSWORD_SYMBOLS.contains(&c)) {
        return Err(WeakPassword::MissingSymbol);
    }
    Ok(())
}
