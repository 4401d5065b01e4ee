use gardenlink_api::models::OutputMode;
use time::Time;
use time::macros::format_description;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Client-side form errors. These block submission and never reach the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("`{0}` must not be empty")]
    Empty(&'static str),

    #[error("`{0}` must be a time in HH:mm format")]
    TimeFormat(&'static str),

    #[error("`{field}` is required in {mode} mode")]
    Required { field: &'static str, mode: OutputMode },

    #[error("Password must be at least {MIN_PASSWORD_LEN} characters")]
    PasswordTooShort,

    #[error("Password must contain {0}")]
    PasswordMissing(&'static str),

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("New password must differ from the current one")]
    PasswordUnchanged,
}

pub fn validate_required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field));
    }
    Ok(())
}

/// Accepts zero padded 24 hour `HH:mm`.
pub fn validate_time(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let format = format_description!("[hour]:[minute]");

    Time::parse(value, &format)
        .map(|_| ())
        .map_err(|_| ValidationError::TimeFormat(field))
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(ValidationError::PasswordMissing("an uppercase letter"));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(ValidationError::PasswordMissing("a lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::PasswordMissing("a digit"));
    }
    if !password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()) {
        return Err(ValidationError::PasswordMissing("a symbol"));
    }
    Ok(())
}

pub fn validate_password_change(
    current: &str,
    new: &str,
    confirmation: &str,
) -> Result<(), ValidationError> {
    validate_required("currentPassword", current)?;
    validate_password(new)?;
    if new != confirmation {
        return Err(ValidationError::PasswordMismatch);
    }
    if new == current {
        return Err(ValidationError::PasswordUnchanged);
    }
    Ok(())
}
