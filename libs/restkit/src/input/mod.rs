//! Typed endpoint inputs and how they are read from a request.

mod node;
mod picker;
mod query;

use bytes::Bytes;
use http::Method;
use restkit_errors::{FieldError, validation_error};
use restkit_query::{DeleteInput, GetInput, UpdateInput};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use picker::RequestPicker;
pub use query::{EncodeError, MAX_KEY_DEPTH, encode_query};

/// Where in the request a field is read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Source {
    Url,
    Body,
    Headers,
    Cookies,
}

impl Source {
    /// `Url` for `GET`, `Body` for everything else.
    #[must_use]
    pub fn default_for(method: &Method) -> Self {
        if method == Method::GET {
            Self::Url
        } else {
            Self::Body
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Body => "body",
            Self::Headers => "headers",
            Self::Cookies => "cookies",
        }
    }
}

/// Placement of one top-level input field, by its JSON name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub field: &'static str,
    pub source: Source,
}

impl Placement {
    #[must_use]
    pub const fn new(field: &'static str, source: Source) -> Self {
        Self { field, source }
    }
}

/// Endpoint input.
///
/// Fields not listed in `PLACEMENTS` are read from [`Source::default_for`] the
/// request method. Header and cookie fields are looked up by their JSON name; for
/// headers `_` also matches `-`.
pub trait Input: Serialize + DeserializeOwned + Send + Sync + 'static {
    const PLACEMENTS: &'static [Placement] = &[];

    /// Field-level rule violations; empty when the input is acceptable.
    fn validate(&self) -> Vec<FieldError> {
        Vec::new()
    }

    #[must_use]
    fn source_of(field: &str, method: &Method) -> Source {
        Self::PLACEMENTS
            .iter()
            .find(|p| p.field == field)
            .map_or_else(|| Source::default_for(method), |p| p.source)
    }
}

impl Input for GetInput {}
impl Input for UpdateInput {}
impl Input for DeleteInput {}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PickError {
    #[error("invalid query string: {0}")]
    Query(String),

    #[error("invalid request body: {0}")]
    Body(String),

    #[error("invalid header {name}: {reason}")]
    Header { name: String, reason: String },

    #[error("{0}")]
    Decode(String),
}

impl PickError {
    /// Where the failure originates, as reported to the client.
    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::Query(_) => Source::Url.as_str(),
            Self::Body(_) => Source::Body.as_str(),
            Self::Header { .. } => Source::Headers.as_str(),
            Self::Decode(_) => "input",
        }
    }
}

impl From<PickError> for restkit_errors::RaisedError {
    fn from(err: PickError) -> Self {
        validation_error(err.location(), err.to_string()).into()
    }
}

/// Reads an input object out of a request.
pub trait ObjectPicker: Send + Sync + 'static {
    /// `sample` is the endpoint's fresh input; fields absent from the request keep
    /// its values.
    fn pick_object<I: Input>(
        &self,
        parts: &http::request::Parts,
        body: &Bytes,
        sample: I,
    ) -> Result<I, PickError>;
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Tagged {
        token: String,
        name: String,
    }

    impl Input for Tagged {
        const PLACEMENTS: &'static [Placement] = &[Placement::new("token", Source::Headers)];
    }

    #[test]
    fn default_source_depends_on_method() {
        assert_eq!(Source::default_for(&Method::GET), Source::Url);
        assert_eq!(Source::default_for(&Method::PATCH), Source::Body);
        assert_eq!(Source::default_for(&Method::DELETE), Source::Body);
    }

    #[test]
    fn explicit_placement_wins() {
        assert_eq!(Tagged::source_of("token", &Method::GET), Source::Headers);
        assert_eq!(Tagged::source_of("name", &Method::GET), Source::Url);
        assert_eq!(Tagged::source_of("name", &Method::POST), Source::Body);
    }

    #[test]
    fn pick_errors_become_validation_errors() {
        let raised = restkit_errors::RaisedError::from(PickError::Body("expected object".to_owned()));
        assert_eq!(raised.id(), Some("VALIDATION_ERROR"));
    }
}
