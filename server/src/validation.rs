use std::num::NonZeroUsize;

use crate::error::ApiError;

/// The speech endpoint rejects longer input.
const MAX_READ_TEXT_LENGTH: usize = 4096;
const MAX_SLOT_LENGTH: usize = 64;

/// Validate the number of stories requested for a batch.
pub fn validate_story_count(count: i64, max: usize) -> Result<NonZeroUsize, ApiError> {
    let out_of_range = || {
        ApiError::InvalidInput(format!(
            "Please request between 1 and {} stories (got {})",
            max, count
        ))
    };
    let count = usize::try_from(count).map_err(|_| out_of_range())?;
    if count > max {
        return Err(out_of_range());
    }
    NonZeroUsize::new(count).ok_or_else(out_of_range)
}

/// Validate a request to read a story aloud
pub fn validate_read_request(slot: &str, text: &str) -> Result<(), ApiError> {
    validate_slot(slot)?;

    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_READ_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_READ_TEXT_LENGTH
        )));
    }

    Ok(())
}

/// Slots name the story an audio reading belongs to (e.g. `story-3`).
pub fn validate_slot(slot: &str) -> Result<(), ApiError> {
    if slot.is_empty() {
        return Err(ApiError::InvalidInput("Slot cannot be empty".to_string()));
    }
    if slot.len() > MAX_SLOT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Slot too long (max {} characters)",
            MAX_SLOT_LENGTH
        )));
    }
    if !slot
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::InvalidInput(format!(
            "Invalid slot: {}. Use letters, digits, '-' and '_'",
            slot
        )));
    }
    Ok(())
}
