//! Handlers, middlewares and ordered middleware stacks.
//!
//! A [`Middleware`] is a plain function from the next [`Handler`] to a new one.
//! Composition is outer-first: `apply(h, [m1, m2, m3])` is `m1(m2(m3(h)))`, so a
//! request observes `m1`, then `m2`, then `m3` before reaching `h`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use http::StatusCode;

use crate::context::RequestContext;
use crate::input::{Input, Placement};

/// Type-erased async request handler.
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>);

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self(Arc::new(move |req| Box::pin(f(req))))
    }

    pub fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        (self.0)(req)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Middleware from an async `(request, next)` function.
pub fn from_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Request, Handler) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |next: Handler| {
        let f = f.clone();
        Handler::new(move |req| f(req, next.clone()))
    })
}

/// `middlewares[0](middlewares[1](...middlewares[n-1](handler)))`.
#[must_use]
pub fn apply(handler: Handler, middlewares: &[Middleware]) -> Handler {
    middlewares.iter().rev().fold(handler, |next, m| m(next))
}

/// Innermost handler: renders the response recorded in the request context, or an
/// empty `200` when nothing was emitted.
#[must_use]
pub fn terminal() -> Handler {
    Handler::new(|req: Request| async move {
        RequestContext::of(&req)
            .and_then(|ctx| ctx.response())
            .map_or_else(|| StatusCode::OK.into_response(), IntoResponse::into_response)
    })
}

/// Input type read by a middleware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputInfo {
    pub type_name: &'static str,
    pub placements: &'static [Placement],
}

impl InputInfo {
    #[must_use]
    pub fn of<I: Input>() -> Self {
        Self {
            type_name: std::any::type_name::<I>(),
            placements: I::PLACEMENTS,
        }
    }
}

/// Named middleware together with the inputs it reads.
#[derive(Clone)]
#[must_use]
pub struct MiddlewareWrapper {
    id: String,
    middleware: Middleware,
    inputs: Vec<InputInfo>,
}

impl MiddlewareWrapper {
    pub fn new(id: impl Into<String>, middleware: Middleware) -> Self {
        Self {
            id: id.into(),
            middleware,
            inputs: Vec::new(),
        }
    }

    pub fn with_id(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..self.clone()
        }
    }

    pub fn with_middleware(&self, middleware: Middleware) -> Self {
        Self {
            middleware,
            ..self.clone()
        }
    }

    pub fn with_input<I: Input>(&self) -> Self {
        let mut next = self.clone();
        next.inputs.push(InputInfo::of::<I>());
        next
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn middleware(&self) -> &Middleware {
        &self.middleware
    }

    #[must_use]
    pub fn inputs(&self) -> &[InputInfo] {
        &self.inputs
    }
}

impl fmt::Debug for MiddlewareWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareWrapper")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// Ordered sequence of middleware wrappers, outer first.
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct Stack {
    wrappers: Vec<MiddlewareWrapper>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `wrapper` as the new innermost entry.
    pub fn with(mut self, wrapper: MiddlewareWrapper) -> Self {
        self.wrappers.push(wrapper);
        self
    }

    /// Insert `wrapper` right after the first entry whose id is `id`.
    ///
    /// Returns `false` and leaves the stack untouched when no entry has that id.
    pub fn insert_after_id(&mut self, id: &str, wrapper: MiddlewareWrapper) -> bool {
        let Some(pos) = self.wrappers.iter().position(|w| w.id == id) else {
            return false;
        };
        self.wrappers.insert(pos + 1, wrapper);
        true
    }

    #[must_use]
    pub fn middlewares(&self) -> Vec<Middleware> {
        self.wrappers.iter().map(|w| w.middleware.clone()).collect()
    }

    #[must_use]
    pub fn wrappers(&self) -> &[MiddlewareWrapper] {
        &self.wrappers
    }

    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.wrappers.iter().map(|w| w.id.as_str()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }

    /// Compose the stack around [`terminal`].
    #[must_use]
    pub fn handler(&self) -> Handler {
        apply(terminal(), &self.middlewares())
    }
}

impl FromIterator<MiddlewareWrapper> for Stack {
    fn from_iter<T: IntoIterator<Item = MiddlewareWrapper>>(iter: T) -> Self {
        Self {
            wrappers: iter.into_iter().collect(),
        }
    }
}
