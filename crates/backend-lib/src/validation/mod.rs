// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Input validation and payload sanitization.
//!
//! Credential checks fail loudly; payload sanitizers never fail, they
//! normalize or drop entries (defense against malformed clients, per the
//! silent-no-op policy on mutation paths).

use smartdoor_common::{CalendarSource, CalendarSourcePatch, Note, WIDGET_SLOTS};
use thiserror::Error;

const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 20;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 32;

/// Possible validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid password: {0}")]
    InvalidPassword(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a username for registration
pub fn validate_username(username: &str) -> ValidationResult<&str> {
    let len = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&len) {
        return Err(ValidationError::InvalidUsername(format!(
            "username must be between {MIN_USERNAME_LENGTH} and {MAX_USERNAME_LENGTH} characters"
        )));
    }
    Ok(username)
}

/// Validate a password for registration
pub fn validate_password(password: &str) -> ValidationResult<&str> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&len) {
        return Err(ValidationError::InvalidPassword(format!(
            "password must be between {MIN_PASSWORD_LENGTH} and {MAX_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(password)
}

/// Normalize a widget list to exactly [`WIDGET_SLOTS`] slots. Missing
/// trailing entries and empty names become `None`.
pub fn sanitize_widgets(widgets: Vec<Option<String>>) -> [Option<String>; WIDGET_SLOTS] {
    let mut slots: [Option<String>; WIDGET_SLOTS] = Default::default();
    for (slot, widget) in slots.iter_mut().zip(widgets) {
        *slot = widget.filter(|name| !name.is_empty());
    }
    slots
}

/// Drop notes carrying neither text nor image. Not an error: clients
/// routinely send placeholder entries.
pub fn sanitize_notes(notes: Vec<Note>) -> Vec<Note> {
    notes.into_iter().filter(|note| !note.is_empty()).collect()
}

/// Keep only calendar entries with both a url and a colour.
pub fn sanitize_calendars(entries: Vec<CalendarSourcePatch>) -> Vec<CalendarSource> {
    entries
        .into_iter()
        .filter_map(|entry| match (entry.url, entry.colour) {
            (Some(url), Some(colour)) => Some(CalendarSource { url, colour }),
            _ => None,
        })
        .collect()
}
