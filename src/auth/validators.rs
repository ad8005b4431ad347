use validator::ValidateEmail;

/// deliberately low, matches what existing clients were told
pub const MIN_PASSWORD_CHARS: usize = 6;

pub fn is_valid_email(email: &str) -> bool {
    email.to_owned().validate_email()
}

/// counts Unicode scalar values, not bytes
pub fn is_password_strong(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_CHARS
}

/// trim + lowercase, applied before any lookup or insert
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
