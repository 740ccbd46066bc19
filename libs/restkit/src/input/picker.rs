use std::collections::HashMap;

use bytes::Bytes;
use http::header::COOKIE;
use serde_json::Value;

use super::node::{Node, Segment};
use super::query::parse_key;
use super::{Input, ObjectPicker, PickError, Source};

/// Default [`ObjectPicker`].
///
/// Starts from the sample and overlays, in order: query parameters, JSON body members,
/// headers and cookies, each only for fields placed in that source. The merged tree
/// is then decoded into the input type.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestPicker;

impl RequestPicker {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ObjectPicker for RequestPicker {
    fn pick_object<I: Input>(
        &self,
        parts: &http::request::Parts,
        body: &Bytes,
        sample: I,
    ) -> Result<I, PickError> {
        let method = &parts.method;
        let seed = serde_json::to_value(&sample).map_err(|e| PickError::Decode(e.to_string()))?;
        let mut root = Node::Json(seed);

        if let Some(query) = parts.uri.query() {
            let pairs: Vec<(String, String)> =
                serde_urlencoded::from_str(query).map_err(|e| PickError::Query(e.to_string()))?;
            for (key, value) in pairs {
                let path = parse_key(&key).map_err(PickError::Query)?;
                let Some(Segment::Key(field)) = path.first() else {
                    continue;
                };
                if I::source_of(field, method) == Source::Url {
                    root.set(&path, Node::Text(value));
                }
            }
        }

        if !body.is_empty() {
            let parsed: Value =
                serde_json::from_slice(body).map_err(|e| PickError::Body(e.to_string()))?;
            let Value::Object(members) = parsed else {
                return Err(PickError::Body("expected a JSON object".to_owned()));
            };
            for (field, value) in members {
                if I::source_of(&field, method) == Source::Body {
                    root.set(&[Segment::Key(field)], Node::Json(value));
                }
            }
        }

        let cookies = cookies(parts);
        for placement in I::PLACEMENTS {
            let value = match placement.source {
                Source::Headers => header(parts, placement.field)?,
                Source::Cookies => cookies.get(placement.field).map(|v| (*v).to_owned()),
                Source::Url | Source::Body => continue,
            };
            if let Some(value) = value {
                root.set(&[Segment::Key(placement.field.to_owned())], Node::Text(value));
            }
        }

        I::deserialize(root).map_err(|e| PickError::Decode(e.to_string()))
    }
}

fn header(parts: &http::request::Parts, field: &str) -> Result<Option<String>, PickError> {
    let value = parts
        .headers
        .get(field)
        .or_else(|| parts.headers.get(field.replace('_', "-").as_str()));
    value
        .map(|v| {
            v.to_str().map(ToOwned::to_owned).map_err(|e| PickError::Header {
                name: field.to_owned(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn cookies(parts: &http::request::Parts) -> HashMap<&str, &str> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::input::Placement;
    use http::Method;
    use restkit_query::{GetInput, Page, UpdateInput};
    use serde::{Deserialize, Serialize};

    fn parts(method: Method, uri: &str) -> http::request::Parts {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .header("x-tenant", "acme")
            .header(COOKIE, "session=s3cr3t; theme=dark")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Lookup {
        name: String,
        limit: u32,
        x_tenant: String,
        session: String,
        verbose: bool,
    }

    impl Input for Lookup {
        const PLACEMENTS: &'static [Placement] = &[
            Placement::new("x_tenant", Source::Headers),
            Placement::new("session", Source::Cookies),
            Placement::new("verbose", Source::Url),
        ];
    }

    #[test]
    fn get_reads_query_headers_and_cookies() {
        let p = parts(Method::GET, "/users?name=al&limit=5");
        let got = RequestPicker
            .pick_object(&p, &Bytes::new(), Lookup::default())
            .unwrap();
        assert_eq!(
            got,
            Lookup {
                name: "al".to_owned(),
                limit: 5,
                x_tenant: "acme".to_owned(),
                session: "s3cr3t".to_owned(),
                verbose: false,
            }
        );
    }

    #[test]
    fn post_reads_body_and_explicit_url_fields() {
        let p = parts(Method::POST, "/users?verbose=true&name=ignored");
        let body = Bytes::from_static(br#"{"name":"bob","limit":2}"#);
        let got = RequestPicker.pick_object(&p, &body, Lookup::default()).unwrap();
        assert_eq!(got.name, "bob");
        assert_eq!(got.limit, 2);
        assert!(got.verbose);
    }

    #[test]
    fn nested_query_keys_fill_standard_get_input() {
        let p = parts(
            Method::GET,
            "/users?selectors[0].field=age&selectors[0].predicate=GT&selectors[0].value=30\
             &orders[0].field=name&orders[0].direction=ASC&page.offset=0&page.limit=10&get_count=true",
        );
        let got = RequestPicker
            .pick_object(&p, &Bytes::new(), GetInput::default())
            .unwrap();
        assert_eq!(got.selectors[0].field, "age");
        assert_eq!(got.selectors[0].predicate, "GT");
        // free-form values keep their text form
        assert_eq!(got.selectors[0].value, serde_json::json!("30"));
        assert_eq!(got.orders[0].direction, "ASC");
        assert_eq!(got.page, Some(Page::new(0, 10)));
        assert!(got.get_count);
    }

    #[test]
    fn body_must_be_an_object() {
        let p = parts(Method::PATCH, "/users");
        let err = RequestPicker
            .pick_object(&p, &Bytes::from_static(b"[1]"), UpdateInput::default())
            .unwrap_err();
        assert!(matches!(err, PickError::Body(_)));
    }

    #[test]
    fn wrong_scalar_is_a_decode_error() {
        let p = parts(Method::GET, "/users?limit=many");
        let err = RequestPicker
            .pick_object(&p, &Bytes::new(), Lookup::default())
            .unwrap_err();
        assert!(matches!(err, PickError::Decode(_)));
    }
}
