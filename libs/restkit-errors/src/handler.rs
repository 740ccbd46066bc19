//! Mapping of raised errors to `(status, public error)` pairs.

use std::borrow::Cow;

use http::StatusCode;

use crate::catalog::{DUPLICATE_ENTRY, FOREIGN_CONSTRAINT, INTERNAL_SERVER_ERROR, VALIDATION_ERROR};
use crate::error::{Error, PublicError, RaisedError};

/// Declares how a known error id is exposed by an endpoint.
#[derive(Clone, Debug)]
#[must_use]
pub struct ExpectedError {
    pub id: Cow<'static, str>,
    pub masked_id: Option<Cow<'static, str>>,
    pub status: StatusCode,
    pub public_data: bool,
}

impl ExpectedError {
    /// Expose `id` unmasked with `status` and hidden data.
    pub fn new(id: impl Into<Cow<'static, str>>, status: StatusCode) -> Self {
        Self {
            id: id.into(),
            masked_id: None,
            status,
            public_data: false,
        }
    }

    /// Same as [`ExpectedError::new`] using a catalog entry's id.
    pub fn of<D>(err: &Error<D>, status: StatusCode) -> Self {
        Self::new(err.id().to_owned(), status)
    }

    pub fn masked_as(mut self, masked_id: impl Into<Cow<'static, str>>) -> Self {
        self.masked_id = Some(masked_id.into());
        self
    }

    pub fn with_public_data(mut self, public: bool) -> Self {
        self.public_data = public;
        self
    }

    fn outward_id(&self) -> Cow<'static, str> {
        self.masked_id.clone().unwrap_or_else(|| self.id.clone())
    }
}

/// Errors every input middleware knows about regardless of endpoint.
#[must_use]
pub fn default_expected_errors() -> Vec<ExpectedError> {
    vec![
        ExpectedError::of(&VALIDATION_ERROR, StatusCode::BAD_REQUEST).with_public_data(true),
        ExpectedError::of(&DUPLICATE_ENTRY, StatusCode::BAD_REQUEST),
        ExpectedError::of(&FOREIGN_CONSTRAINT, StatusCode::BAD_REQUEST),
    ]
}

/// Resolve a raised error against `expected`.
///
/// The first entry whose id equals the error id wins. Opaque errors and ids with no
/// entry are logged and reported as `INTERNAL_SERVER_ERROR` without data.
pub fn handle_error(err: &RaisedError, expected: &[ExpectedError]) -> (StatusCode, PublicError) {
    let Some(any) = err.as_any_error() else {
        tracing::error!(error = %err, "Unexpected error");
        return internal();
    };

    let Some(entry) = expected.iter().find(|e| e.id == any.error_id()) else {
        tracing::error!(error_id = any.error_id(), error = %err, "Unexpected error id");
        return internal();
    };

    let mut public = PublicError::from_id(entry.outward_id());
    if entry.public_data {
        if let Some(data) = any.error_data() {
            public = public.with_data(data);
        }
        if let Some(msg) = any.error_message() {
            public = public.with_message(msg);
        }
    }

    tracing::trace!(
        error_id = any.error_id(),
        public_id = public.id(),
        status = entry.status.as_u16(),
        "Mapped expected error"
    );
    (entry.status, public)
}

fn internal() -> (StatusCode, PublicError) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_SERVER_ERROR.without_data(),
    )
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::catalog::validation_error;
    use serde_json::json;
    use tracing_test::traced_test;

    const EXPECTED: Error<String> = Error::new("EXPECTED");

    #[test]
    fn masks_id_and_hides_data() {
        let list = [ExpectedError::new("EXPECTED", StatusCode::FORBIDDEN).masked_as("MASKED")];
        let raised = RaisedError::from(EXPECTED.with_data("secret".to_owned()));

        let (status, public) = handle_error(&raised, &list);

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(public.id(), "MASKED");
        assert!(public.data().is_none());
        assert_eq!(serde_json::to_value(&public).unwrap(), json!({ "id": "MASKED" }));
    }

    #[test]
    fn public_data_is_forwarded() {
        let raised = RaisedError::from(validation_error("age", "must be >= 0"));

        let (status, public) = handle_error(&raised, &default_expected_errors());

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(public.id(), "VALIDATION_ERROR");
        assert_eq!(
            public.data(),
            Some(&json!([{ "field": "age", "message": "must be >= 0" }]))
        );
    }

    #[test]
    fn first_matching_entry_wins() {
        let list = [
            ExpectedError::new("EXPECTED", StatusCode::UNAUTHORIZED),
            ExpectedError::new("EXPECTED", StatusCode::FORBIDDEN),
        ];
        let (status, _) = handle_error(&EXPECTED.into(), &list);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn store_errors_hide_data() {
        let raised = RaisedError::from(DUPLICATE_ENTRY.with_data("users_name_key".to_owned()));
        let (status, public) = handle_error(&raised, &default_expected_errors());
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(public.id(), "DUPLICATE_ENTRY");
        assert!(public.data().is_none());
    }

    #[test]
    #[traced_test]
    fn unknown_id_is_laundered() {
        let raised = RaisedError::from(EXPECTED.with_data("secret".to_owned()));

        let (status, public) = handle_error(&raised, &default_expected_errors());

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(public.id(), "INTERNAL_SERVER_ERROR");
        assert!(public.data().is_none());
        assert!(logs_contain("Unexpected error id"));
    }

    #[test]
    #[traced_test]
    fn opaque_error_is_laundered() {
        let raised = RaisedError::from(anyhow::anyhow!("connection reset"));

        let (status, public) = handle_error(&raised, &default_expected_errors());

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(public.id(), "INTERNAL_SERVER_ERROR");
        assert!(logs_contain("connection reset"));
    }
}
