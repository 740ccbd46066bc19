//! Declarative endpoint descriptions.

use std::fmt;
use std::sync::Arc;

use http::Method;
use restkit_errors::ExpectedError;

use crate::stack::Stack;

/// Rule bundle of endpoints that only take a plain input.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRules;

type StackFn<I, R> = Arc<dyn Fn(&EndpointSpec<I, R>) -> Stack + Send + Sync>;

/// Everything needed to serve one `(url, method)`: a fresh-input factory, the
/// operation's rules (allow-lists and limits), endpoint-specific expected errors and
/// the middleware stack.
///
/// Specs are immutable; the `with_*` methods return modified copies.
pub struct EndpointSpec<I, R = NoRules> {
    url: String,
    method: Method,
    input_factory: Arc<dyn Fn() -> I + Send + Sync>,
    rules: Arc<R>,
    expected_errors: Arc<[ExpectedError]>,
    stack: Stack,
    stack_fn: Option<StackFn<I, R>>,
}

impl<I, R> Clone for EndpointSpec<I, R> {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            method: self.method.clone(),
            input_factory: self.input_factory.clone(),
            rules: self.rules.clone(),
            expected_errors: self.expected_errors.clone(),
            stack: self.stack.clone(),
            stack_fn: self.stack_fn.clone(),
        }
    }
}

impl<I, R> fmt::Debug for EndpointSpec<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointSpec")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("stack", &self.stack.ids())
            .field("has_stack_fn", &self.stack_fn.is_some())
            .finish_non_exhaustive()
    }
}

/// Modification applied by [`EndpointSpec::clone_with`].
pub enum EndpointOption<I, R = NoRules> {
    Url(String),
    Method(Method),
    MiddlewareStack(Stack),
    MiddlewareStackFn(StackFn<I, R>),
}

impl<I> EndpointSpec<I, NoRules> {
    pub fn new<F>(url: impl Into<String>, method: Method, input_factory: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
    {
        Self {
            url: url.into(),
            method,
            input_factory: Arc::new(input_factory),
            rules: Arc::new(NoRules),
            expected_errors: Arc::from([]),
            stack: Stack::new(),
            stack_fn: None,
        }
    }
}

impl<I, R> EndpointSpec<I, R> {
    /// Attach the operation rules. A stack function set earlier is dropped since it
    /// was declared for the previous rule type.
    #[must_use]
    pub fn with_rules<R2>(self, rules: R2) -> EndpointSpec<I, R2> {
        EndpointSpec {
            url: self.url,
            method: self.method,
            input_factory: self.input_factory,
            rules: Arc::new(rules),
            expected_errors: self.expected_errors,
            stack: self.stack,
            stack_fn: None,
        }
    }

    #[must_use]
    pub fn with_expected_errors(&self, errors: impl IntoIterator<Item = ExpectedError>) -> Self {
        let mut next = self.clone();
        next.expected_errors = errors.into_iter().collect();
        next
    }

    #[must_use]
    pub fn clone_with(&self, options: impl IntoIterator<Item = EndpointOption<I, R>>) -> Self {
        let mut next = self.clone();
        for option in options {
            match option {
                EndpointOption::Url(url) => next.url = url,
                EndpointOption::Method(method) => next.method = method,
                EndpointOption::MiddlewareStack(stack) => next.stack = stack,
                EndpointOption::MiddlewareStackFn(f) => next.stack_fn = Some(f),
            }
        }
        next
    }

    #[must_use]
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        self.clone_with([EndpointOption::Url(url.into())])
    }

    #[must_use]
    pub fn with_method(&self, method: Method) -> Self {
        self.clone_with([EndpointOption::Method(method)])
    }

    #[must_use]
    pub fn with_middleware_stack(&self, stack: Stack) -> Self {
        self.clone_with([EndpointOption::MiddlewareStack(stack)])
    }

    /// Derive the stack from the spec itself at [`definition`](Self::definition) time.
    /// Takes precedence over a fixed stack.
    #[must_use]
    pub fn with_middleware_stack_fn<F>(&self, f: F) -> Self
    where
        F: Fn(&EndpointSpec<I, R>) -> Stack + Send + Sync + 'static,
    {
        self.clone_with([EndpointOption::MiddlewareStackFn(Arc::new(f))])
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn rules(&self) -> &Arc<R> {
        &self.rules
    }

    #[must_use]
    pub fn expected_errors(&self) -> &[ExpectedError] {
        &self.expected_errors
    }

    /// Fresh input for one request.
    #[must_use]
    pub fn new_input(&self) -> I {
        (self.input_factory)()
    }

    #[must_use]
    pub fn stack(&self) -> Stack {
        match &self.stack_fn {
            Some(f) => f(self),
            None => self.stack.clone(),
        }
    }

    #[must_use]
    pub fn definition(&self) -> Endpoint {
        Endpoint {
            url: self.url.clone(),
            method: self.method.clone(),
            stack: self.stack(),
        }
    }
}

/// What the router needs to know about an endpoint.
#[derive(Clone, Debug)]
pub struct Endpoint {
    pub url: String,
    pub method: Method,
    pub stack: Stack,
}
