//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID exceeds the maximum length.
    #[error("ID too long: {actual} bytes (max {max})")]
    TooLong { max: usize, actual: usize },

    /// The ID contains a character that is not allowed.
    #[error("invalid character {ch:?} at byte {position}")]
    InvalidCharacter { ch: char, position: usize },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
