//! Response emission.

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use restkit_errors::PublicError;
use serde::Serialize;

/// Fully materialised response. Recorded in the request context so that it can be
/// observed after emission.
#[derive(Clone, Debug)]
pub struct ResponseRecord {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseRecord {
    #[must_use]
    pub fn text(status: StatusCode, body: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            status,
            headers,
            body: Bytes::from_static(body.as_bytes()),
        }
    }
}

impl IntoResponse for ResponseRecord {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    #[error("failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Turns an endpoint outcome into a response.
pub trait OutputHandler: Send + Sync + 'static {
    fn process_output<O: Serialize>(
        &self,
        parts: &http::request::Parts,
        output: Option<&O>,
        error: Option<&PublicError>,
        status: StatusCode,
    ) -> Result<ResponseRecord, OutputError>;
}

#[derive(Serialize)]
struct Envelope<'a, O> {
    payload: Option<&'a O>,
    error: Option<&'a PublicError>,
}

/// Writes `{"payload": ..., "error": ...}` as `application/json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonOutput;

impl OutputHandler for JsonOutput {
    fn process_output<O: Serialize>(
        &self,
        _parts: &http::request::Parts,
        output: Option<&O>,
        error: Option<&PublicError>,
        status: StatusCode,
    ) -> Result<ResponseRecord, OutputError> {
        let body = serde_json::to_vec(&Envelope {
            payload: output,
            error,
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Ok(ResponseRecord {
            status,
            headers,
            body: Bytes::from(body),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use restkit_errors::Error;
    use serde_json::{Value, json};

    fn parts() -> http::request::Parts {
        http::Request::get("/").body(()).unwrap().into_parts().0
    }

    fn body_json(rec: &ResponseRecord) -> Value {
        serde_json::from_slice(&rec.body).unwrap()
    }

    #[test]
    fn success_envelope() {
        let rec = JsonOutput
            .process_output(&parts(), Some(&json!({"n": 1})), None, StatusCode::OK)
            .unwrap();
        assert_eq!(rec.status, StatusCode::OK);
        assert_eq!(rec.headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_json(&rec), json!({ "payload": {"n": 1}, "error": null }));
    }

    #[test]
    fn error_envelope() {
        let err: PublicError = Error::new("NOPE");
        let rec = JsonOutput
            .process_output::<()>(&parts(), None, Some(&err), StatusCode::BAD_REQUEST)
            .unwrap();
        assert_eq!(rec.status, StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&rec), json!({ "payload": null, "error": { "id": "NOPE" } }));
    }

    #[test]
    fn record_renders_as_response() {
        let resp = ResponseRecord::text(StatusCode::IM_A_TEAPOT, "tea").into_response();
        assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    }
}
