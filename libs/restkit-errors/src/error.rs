//! Identified, JSON-serializable errors.
//!
//! An [`Error`] is a value: an `id` that is stable on the wire, an optional typed
//! payload and an optional human-readable message. Catalog entries are declared as
//! `const` items and specialised per occurrence with [`Error::with_data`] and
//! [`Error::with_message`].

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Bound satisfied by every payload that can travel inside an [`Error`].
pub trait ErrorData: Serialize + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> ErrorData for T where T: Serialize + Clone + fmt::Debug + Send + Sync + 'static {}

/// Error carrying a stable identifier and an optional typed payload.
///
/// Wire form: `{"id": "...", "data": ..., "message": "..."}` where `data` is omitted
/// when absent and `message` is omitted when absent or empty.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[must_use]
pub struct Error<D = ()> {
    id: Cow<'static, str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<D>,
    #[serde(default, skip_serializing_if = "is_blank")]
    message: Option<String>,
}

fn is_blank(message: &Option<String>) -> bool {
    message.as_deref().is_none_or(str::is_empty)
}

/// Outward-facing error form produced by the error handler.
pub type PublicError = Error<serde_json::Value>;

impl<D> Error<D> {
    /// Declare an error with a static id. Usable in `const` position.
    pub const fn new(id: &'static str) -> Self {
        Self {
            id: Cow::Borrowed(id),
            data: None,
            message: None,
        }
    }

    /// Build an error whose id is only known at runtime (e.g. a masked id).
    pub fn from_id(id: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: id.into(),
            data: None,
            message: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn data(&self) -> Option<&D> {
        self.data.as_ref()
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Two errors are the same error when their ids match.
    #[must_use]
    pub fn is(&self, id: &str) -> bool {
        self.id == id
    }

    /// Derive a sibling with the same id and message but different typed data.
    pub fn with_data<T>(&self, data: T) -> Error<T> {
        Error {
            id: self.id.clone(),
            data: Some(data),
            message: self.message.clone(),
        }
    }

    /// Derive a sibling without data.
    pub fn without_data<T>(&self) -> Error<T> {
        Error {
            id: self.id.clone(),
            data: None,
            message: self.message.clone(),
        }
    }

    /// Derive a sibling carrying `message`.
    pub fn with_message(&self, message: impl Into<String>) -> Self
    where
        D: Clone,
    {
        Self {
            id: self.id.clone(),
            data: self.data.clone(),
            message: Some(message.into()),
        }
    }

    /// Consume the error and return its payload.
    #[must_use]
    pub fn into_data(self) -> Option<D> {
        self.data
    }
}

impl<D> fmt::Display for Error<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message.as_deref() {
            Some(msg) if !msg.is_empty() => write!(f, "{}: {msg}", self.id),
            _ => f.write_str(&self.id),
        }
    }
}

impl<D: fmt::Debug> std::error::Error for Error<D> {}

/// Uniform view over identified errors, independent of the payload type.
///
/// Error handlers reason about raised errors exclusively through this trait.
pub trait AnyError: fmt::Debug + fmt::Display + Send + Sync + 'static {
    fn error_id(&self) -> &str;

    /// Payload rendered as JSON, if any.
    fn error_data(&self) -> Option<serde_json::Value>;

    fn error_message(&self) -> Option<&str>;
}

impl<D: ErrorData> AnyError for Error<D> {
    fn error_id(&self) -> &str {
        &self.id
    }

    fn error_data(&self) -> Option<serde_json::Value> {
        let data = self.data.as_ref()?;
        match serde_json::to_value(data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(id = %self.id, error = %e, "Error data is not serializable");
                None
            }
        }
    }

    fn error_message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// Failure returned by endpoint services.
///
/// `Api` errors expose the [`AnyError`] capability and can be matched against an
/// expected-error list; `Opaque` errors always surface as `INTERNAL_SERVER_ERROR`.
#[derive(Debug)]
pub enum RaisedError {
    Api(Box<dyn AnyError>),
    Opaque(anyhow::Error),
}

impl RaisedError {
    pub fn api(err: impl AnyError) -> Self {
        Self::Api(Box::new(err))
    }

    /// The identified view of this error, when it has one.
    #[must_use]
    pub fn as_any_error(&self) -> Option<&dyn AnyError> {
        match self {
            Self::Api(err) => Some(err.as_ref()),
            Self::Opaque(_) => None,
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.as_any_error().map(AnyError::error_id)
    }
}

impl fmt::Display for RaisedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api(err) => fmt::Display::fmt(err, f),
            Self::Opaque(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for RaisedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Api(_) => None,
            Self::Opaque(err) => Some(err.as_ref()),
        }
    }
}

impl<D: ErrorData> From<Error<D>> for RaisedError {
    fn from(err: Error<D>) -> Self {
        Self::Api(Box::new(err))
    }
}

impl From<Box<dyn AnyError>> for RaisedError {
    fn from(err: Box<dyn AnyError>) -> Self {
        Self::Api(err)
    }
}

impl From<anyhow::Error> for RaisedError {
    fn from(err: anyhow::Error) -> Self {
        Self::Opaque(err)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: Error<String> = Error::new("SAMPLE");

    #[test]
    fn display_is_id_without_message() {
        assert_eq!(SAMPLE.to_string(), "SAMPLE");
        assert_eq!(SAMPLE.with_message("boom").to_string(), "SAMPLE: boom");
        assert_eq!(SAMPLE.with_message("").to_string(), "SAMPLE");
    }

    #[test]
    fn siblings_keep_id_and_override_payload() {
        let e = SAMPLE.with_message("ctx").with_data(42_u32);
        assert!(e.is("SAMPLE"));
        assert_eq!(e.data(), Some(&42));
        assert_eq!(e.message(), Some("ctx"));
        // the catalog entry itself is untouched
        assert!(SAMPLE.data().is_none());
    }

    #[test]
    fn serializes_without_optional_members() {
        let v = serde_json::to_value(&SAMPLE).unwrap();
        assert_eq!(v, json!({ "id": "SAMPLE" }));
    }

    #[test]
    fn serializes_data_and_message_when_present() {
        let e = SAMPLE
            .with_data(vec!["a".to_owned(), "b".to_owned()])
            .with_message("bad");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v, json!({ "id": "SAMPLE", "data": ["a", "b"], "message": "bad" }));
    }

    #[test]
    fn empty_message_is_omitted() {
        let v = serde_json::to_value(SAMPLE.with_message("")).unwrap();
        assert!(v.get("message").is_none());
    }

    #[test]
    fn any_error_exposes_json_data() {
        let e = SAMPLE.with_data("secret".to_owned());
        let any: &dyn AnyError = &e;
        assert_eq!(any.error_id(), "SAMPLE");
        assert_eq!(any.error_data(), Some(json!("secret")));
        assert_eq!(any.error_message(), None);
    }

    #[test]
    fn raised_error_keeps_identity() {
        let raised = RaisedError::from(SAMPLE.with_data("x".to_owned()));
        assert_eq!(raised.id(), Some("SAMPLE"));

        let opaque = RaisedError::from(anyhow::anyhow!("db down"));
        assert!(opaque.id().is_none());
        assert_eq!(opaque.to_string(), "db down");
    }

    #[test]
    fn into_data_yields_the_payload() {
        assert_eq!(SAMPLE.with_data(7_u8).into_data(), Some(7));
        assert_eq!(SAMPLE.into_data(), None);
    }

    #[test]
    fn deserializes_wire_form() {
        let e: Error<serde_json::Value> =
            serde_json::from_value(json!({ "id": "X", "data": { "k": 1 } })).unwrap();
        assert!(e.is("X"));
        assert_eq!(e.data(), Some(&json!({ "k": 1 })));
        assert!(e.message().is_none());
    }
}
