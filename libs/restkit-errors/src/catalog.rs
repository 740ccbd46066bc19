//! Shared error catalog.
//!
//! Ids are stable on the wire and are what expected-error lists match against.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One field-level rule violation carried by [`VALIDATION_ERROR`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Input failed a field-level rule.
pub const VALIDATION_ERROR: Error<Vec<FieldError>> = Error::new("VALIDATION_ERROR");

/// Unknown or unexpected failure. Never carries data outward.
pub const INTERNAL_SERVER_ERROR: Error = Error::new("INTERNAL_SERVER_ERROR");

/// The underlying store rejected an insert on a unique constraint.
pub const DUPLICATE_ENTRY: Error<String> = Error::new("DUPLICATE_ENTRY");

/// The underlying store rejected an insert on a foreign-key constraint.
pub const FOREIGN_CONSTRAINT: Error<String> = Error::new("FOREIGN_CONSTRAINT");

/// Shorthand for a `VALIDATION_ERROR` carrying a single violation.
pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Error<Vec<FieldError>> {
    VALIDATION_ERROR.with_data(vec![FieldError::new(field, message)])
}
