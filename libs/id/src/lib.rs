//! # smartbed-id
//!
//! Typed identifiers for the resources the allocation console works with.
//!
//! ## Design Principles
//!
//! - IDs are assigned by the backend; the client never mints them
//! - IDs are opaque strings with strict parsing on the way in
//! - IDs are typed so a bed ID can never be passed where a patient ID is expected
//!
//! ## ID Format
//!
//! Backend IDs carry no fixed prefix (`P-1A2B3C`, `B-ICU-01`, `W-3`), so
//! validation is limited to what keeps an ID safe to interpolate into a URL
//! path: non-empty, bounded length, no whitespace, control characters, or
//! path/query delimiters.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Maximum accepted length of an ID, in bytes.
pub const MAX_ID_LEN: usize = 128;

/// Validates a raw ID string against the shared rules.
pub fn validate(s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }

    if s.len() > MAX_ID_LEN {
        return Err(IdError::TooLong {
            max: MAX_ID_LEN,
            actual: s.len(),
        });
    }

    if let Some((position, ch)) = s
        .char_indices()
        .find(|(_, c)| c.is_whitespace() || c.is_control() || matches!(c, '/' | '?' | '#'))
    {
        return Err(IdError::InvalidCharacter { ch, position });
    }

    Ok(())
}
