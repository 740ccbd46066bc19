//! URL -> method -> handler multiplexing on top of axum.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use axum::Router;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use chrono::Utc;
use http::{HeaderName, HeaderValue, Method, StatusCode, header};

use crate::context::{REQUEST_ID_HEADER, RequestContext};
use crate::endpoint::Endpoint;
use crate::recover;

#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Header read for an incoming request id and echoed on every response.
    pub request_id_header: HeaderName,
    /// Emit one debug event per completed request.
    pub log_requests: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            request_id_header: HeaderName::from_static(REQUEST_ID_HEADER),
            log_requests: true,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RouterError {
    #[error("duplicate route: {method} {url}")]
    DuplicateRoute { url: String, method: Method },

    #[error("method {0} cannot be routed")]
    UnsupportedMethod(Method),

    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: &'static str },
}

/// Build the router for `endpoints`.
///
/// Each `(url, method)` is served by its stack composed around the terminal handler,
/// inside a panic guard. Known URLs answer other methods with `405` and an `Allow`
/// header; unknown URLs answer `404`. Every request gets a [`RequestContext`].
pub fn build_router(
    endpoints: impl IntoIterator<Item = Endpoint>,
    config: &RouterConfig,
) -> Result<Router, RouterError> {
    let mut by_url: BTreeMap<String, Vec<Endpoint>> = BTreeMap::new();
    let mut seen = HashSet::new();
    for endpoint in endpoints {
        check_url(&endpoint.url)?;
        if !seen.insert((endpoint.url.clone(), endpoint.method.clone())) {
            return Err(RouterError::DuplicateRoute {
                url: endpoint.url,
                method: endpoint.method,
            });
        }
        by_url.entry(endpoint.url.clone()).or_default().push(endpoint);
    }

    let mut router = Router::new();
    for (url, endpoints) in by_url {
        let allow: Arc<str> = endpoints
            .iter()
            .map(|e| e.method.as_str())
            .collect::<Vec<_>>()
            .join(", ")
            .into();

        let mut methods = MethodRouter::new();
        for endpoint in endpoints {
            let filter = MethodFilter::try_from(endpoint.method.clone())
                .map_err(|_| RouterError::UnsupportedMethod(endpoint.method.clone()))?;
            let handler = endpoint.stack.handler();
            methods = methods.on(filter, move |req: Request| recover::guard(handler.clone(), req));
            tracing::debug!(
                method = %endpoint.method,
                url = %url,
                middlewares = ?endpoint.stack.ids(),
                "Registered endpoint"
            );
        }
        methods = methods.fallback(move |req: Request| method_not_allowed(req, allow.clone()));
        router = router.route(&url, methods);
    }

    let config = config.clone();
    Ok(router
        .fallback(not_found)
        .layer(axum::middleware::from_fn(move |req: Request, next: Next| {
            install_context(config.clone(), req, next)
        })))
}

fn check_url(url: &str) -> Result<(), RouterError> {
    let invalid = |reason| {
        Err(RouterError::InvalidUrl {
            url: url.to_owned(),
            reason,
        })
    };
    if !url.starts_with('/') {
        return invalid("must start with '/'");
    }
    if url
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return invalid("path parameters use the '{name}' syntax");
    }
    Ok(())
}

async fn install_context(config: RouterConfig, req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    let ctx = Arc::new(RequestContext::from_parts(&parts, &config.request_id_header));
    parts.extensions.insert(ctx.clone());

    let mut resp = next.run(Request::from_parts(parts, body)).await;

    if let Ok(value) = HeaderValue::from_str(ctx.request_id()) {
        resp.headers_mut().insert(config.request_id_header.clone(), value);
    }
    if config.log_requests {
        let elapsed = Utc::now() - ctx.started_at();
        tracing::debug!(
            method = %ctx.method(),
            path = ctx.url().path(),
            status = resp.status().as_u16(),
            request_id = ctx.request_id(),
            remote_ip = ?ctx.remote_ip(),
            elapsed_ms = elapsed.num_milliseconds(),
            "Request completed"
        );
    }
    resp
}

async fn method_not_allowed(req: Request, allow: Arc<str>) -> Response {
    tracing::info!(
        method = %req.method(),
        path = req.uri().path(),
        "Method not allowed"
    );
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, allow.to_string())],
        "Method Not Allowed",
    )
        .into_response()
}

async fn not_found(req: Request) -> Response {
    tracing::info!(
        method = %req.method(),
        path = req.uri().path(),
        "Not found"
    );
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}
