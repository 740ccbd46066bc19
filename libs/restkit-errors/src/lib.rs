//! Error model for the restkit request pipeline.
//!
//! - [`Error`]: identified, JSON-serializable error values
//! - [`RaisedError`]: what services return, identified or opaque
//! - [`handle_error`]: expected-error matching, masking and redaction
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod catalog;
pub mod error;
pub mod handler;

pub use catalog::{
    DUPLICATE_ENTRY, FOREIGN_CONSTRAINT, FieldError, INTERNAL_SERVER_ERROR, VALIDATION_ERROR,
    validation_error,
};
pub use error::{AnyError, Error, ErrorData, PublicError, RaisedError};
pub use handler::{ExpectedError, default_expected_errors, handle_error};
