//! Input checks shared by the command line and the focus engine.

use chrono::{DateTime, Utc};
use thiserror::Error;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_NOTES_LEN: usize = 1000;
pub const MAX_HOURLY_RATE: f64 = 999_999.99;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
    #[error("{field} must be {max} characters or less")]
    TooLong { field: &'static str, max: usize },
    #[error("hourly rate must be between 0 and {MAX_HOURLY_RATE}, got {0}")]
    Rate(f64),
    #[error("{field} must be between 1 and 5, got {value}")]
    Rating { field: &'static str, value: u8 },
    #[error("color must be a 6 or 8 digit hex value, got {0:?}")]
    Color(String),
    #[error("end time {end} must be after start time {start}")]
    Interval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Trims a project or client name and checks its length.
pub fn validate_name(field: &'static str, name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_NAME_LEN,
        });
    }
    Ok(trimmed.to_string())
}

pub fn validate_notes(notes: &str) -> Result<String, ValidationError> {
    let trimmed = notes.trim();
    if trimmed.chars().count() > MAX_NOTES_LEN {
        return Err(ValidationError::TooLong {
            field: "notes",
            max: MAX_NOTES_LEN,
        });
    }
    Ok(trimmed.to_string())
}

/// Like [validate_notes], but the text has to say something.
pub fn validate_text(field: &'static str, text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if trimmed.chars().count() > MAX_NOTES_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_NOTES_LEN,
        });
    }
    Ok(trimmed.to_string())
}

pub fn validate_interval(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if end > start {
        Ok(())
    } else {
        Err(ValidationError::Interval { start, end })
    }
}

pub fn validate_rate(rate: f64) -> Result<f64, ValidationError> {
    if rate.is_finite() && (0.0..=MAX_HOURLY_RATE).contains(&rate) {
        Ok(rate)
    } else {
        Err(ValidationError::Rate(rate))
    }
}

pub fn validate_rating(field: &'static str, value: u8) -> Result<u8, ValidationError> {
    if (1..=5).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::Rating { field, value })
    }
}

/// Accepts `RRGGBB` or `AARRGGBB`, with or without a leading `#`. Returned upper-cased without
/// the prefix.
pub fn validate_color(color: &str) -> Result<String, ValidationError> {
    let hex = color.trim().trim_start_matches('#');
    if matches!(hex.len(), 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(hex.to_ascii_uppercase())
    } else {
        Err(ValidationError::Color(color.to_string()))
    }
}
