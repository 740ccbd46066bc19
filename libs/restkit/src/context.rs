//! Request-scoped context.
//!
//! One [`RequestContext`] is created per request by the router and stored in the
//! request extensions as `Arc<RequestContext>`. Besides request metadata it carries a
//! concurrent data store keyed by [`ContextKey`] tokens and the response emitted by the
//! input middleware, so that later middlewares and the panic dump can observe it.

use std::any::Any;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http::{HeaderMap, HeaderName, Method, Uri, Version};
use parking_lot::Mutex;

use crate::output::ResponseRecord;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

static NEXT_KEY: Mutex<u64> = parking_lot::const_mutex(0);

/// Opaque, process-unique token addressing one slot of the context data store.
///
/// Keys that should live for the whole process are declared as
/// `static KEY: LazyLock<ContextKey> = LazyLock::new(ContextKey::allocate);`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextKey(u64);

impl ContextKey {
    #[must_use]
    pub fn allocate() -> Self {
        let mut next = NEXT_KEY.lock();
        *next += 1;
        Self(*next)
    }
}

pub struct RequestContext {
    request_id: String,
    started_at: DateTime<Utc>,
    protocol: Version,
    method: Method,
    url: Uri,
    remote_ip: Option<IpAddr>,
    headers: HeaderMap,
    data: DashMap<ContextKey, Arc<dyn Any + Send + Sync>>,
    request_body: Mutex<Option<Bytes>>,
    response: Mutex<Option<ResponseRecord>>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("remote_ip", &self.remote_ip)
            .finish_non_exhaustive()
    }
}

impl RequestContext {
    /// Capture request metadata. The request id comes from `id_header` when the
    /// client sent one, otherwise a fresh UUID v7 is generated.
    #[must_use]
    pub fn from_parts(parts: &http::request::Parts, id_header: &HeaderName) -> Self {
        let request_id = parts
            .headers
            .get(id_header)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map_or_else(|| uuid::Uuid::now_v7().to_string(), ToOwned::to_owned);

        Self {
            request_id,
            started_at: Utc::now(),
            protocol: parts.version,
            method: parts.method.clone(),
            url: parts.uri.clone(),
            remote_ip: remote_ip(parts),
            headers: parts.headers.clone(),
            data: DashMap::new(),
            request_body: Mutex::new(None),
            response: Mutex::new(None),
        }
    }

    /// Context installed on `req`, if any.
    #[must_use]
    pub fn of<B>(req: &http::Request<B>) -> Option<Arc<Self>> {
        req.extensions().get::<Arc<Self>>().cloned()
    }

    /// Context installed on `parts`, or a fresh one installed on the spot.
    pub fn ensure(parts: &mut http::request::Parts) -> Arc<Self> {
        if let Some(ctx) = parts.extensions.get::<Arc<Self>>() {
            return ctx.clone();
        }
        let ctx = Arc::new(Self::from_parts(
            parts,
            &HeaderName::from_static(REQUEST_ID_HEADER),
        ));
        parts.extensions.insert(ctx.clone());
        ctx
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn protocol(&self) -> String {
        format!("{:?}", self.protocol)
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn url(&self) -> &Uri {
        &self.url
    }

    #[must_use]
    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.remote_ip
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn insert<T: Send + Sync + 'static>(&self, key: ContextKey, value: T) {
        self.data.insert(key, Arc::new(value));
    }

    /// Typed read; `None` on missing key or type mismatch.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, key: ContextKey) -> Option<Arc<T>> {
        let value = self.data.get(&key)?.value().clone();
        value.downcast::<T>().ok()
    }

    /// Typed read falling back to `default` on missing key or type mismatch.
    #[must_use]
    pub fn get_or<T: Clone + Send + Sync + 'static>(&self, key: ContextKey, default: T) -> T {
        self.get::<T>(key).map_or(default, |v| (*v).clone())
    }

    pub fn set_request_body(&self, body: Bytes) {
        *self.request_body.lock() = Some(body);
    }

    #[must_use]
    pub fn request_body(&self) -> Option<Bytes> {
        self.request_body.lock().clone()
    }

    pub fn record_response(&self, record: ResponseRecord) {
        *self.response.lock() = Some(record);
    }

    /// Response emitted for this request so far.
    #[must_use]
    pub fn response(&self) -> Option<ResponseRecord> {
        self.response.lock().clone()
    }
}

fn remote_ip(parts: &http::request::Parts) -> Option<IpAddr> {
    let forwarded = parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());

    forwarded.or_else(|| {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    static COUNTER: LazyLock<ContextKey> = LazyLock::new(ContextKey::allocate);

    fn parts(req: http::Request<()>) -> http::request::Parts {
        req.into_parts().0
    }

    fn id_header() -> HeaderName {
        HeaderName::from_static(REQUEST_ID_HEADER)
    }

    #[test]
    fn keys_are_unique() {
        let a = ContextKey::allocate();
        let b = ContextKey::allocate();
        assert_ne!(a, b);
        assert_eq!(*COUNTER, *COUNTER);
    }

    #[test]
    fn typed_reads_default_on_mismatch() {
        let ctx = RequestContext::from_parts(
            &parts(http::Request::get("/x").body(()).unwrap()),
            &id_header(),
        );
        ctx.insert(*COUNTER, 7_u32);

        assert_eq!(ctx.get_or(*COUNTER, 0_u32), 7);
        assert_eq!(ctx.get_or(*COUNTER, "none".to_owned()), "none");
        assert_eq!(ctx.get_or(ContextKey::allocate(), 1_u32), 1);
    }

    #[test]
    fn request_id_is_taken_from_header() {
        let req = http::Request::get("/x")
            .header(REQUEST_ID_HEADER, "abc-123")
            .body(())
            .unwrap();
        let ctx = RequestContext::from_parts(&parts(req), &id_header());
        assert_eq!(ctx.request_id(), "abc-123");
    }

    #[test]
    fn request_id_is_generated_when_absent() {
        let ctx = RequestContext::from_parts(
            &parts(http::Request::get("/x").body(()).unwrap()),
            &id_header(),
        );
        assert!(uuid::Uuid::parse_str(ctx.request_id()).is_ok());
    }

    #[test]
    fn forwarded_for_wins_over_peer() {
        let mut req = http::Request::get("/x")
            .header("x-forwarded-for", "10.0.0.7, 10.0.0.1")
            .body(())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        let ctx = RequestContext::from_parts(&parts(req), &id_header());
        assert_eq!(ctx.remote_ip(), Some(IpAddr::from([10, 0, 0, 7])));
    }

    #[test]
    fn ensure_reuses_installed_context() {
        let mut p = parts(http::Request::get("/x").body(()).unwrap());
        let first = RequestContext::ensure(&mut p);
        let second = RequestContext::ensure(&mut p);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
