//! The input middleware: pick, validate, parse, invoke, emit.
//!
//! Per request it
//! 1. creates a fresh input from the endpoint factory,
//! 2. picks it from the request,
//! 3. runs `Input::validate`,
//! 4. invokes the endpoint service (GET/UPDATE/DELETE variants parse the input into a
//!    database-ready descriptor first),
//! 5. maps any error through the expected-error list,
//! 6. emits the JSON envelope and records it in the request context,
//! 7. hands the request on to the next handler.
//!
//! Construction goes through [`InputMiddlewareBuilder`]; `build` only exists once an
//! object picker and an output handler were supplied.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use futures::FutureExt;
use futures::future::BoxFuture;
use http::StatusCode;
use restkit_errors::{
    ExpectedError, PublicError, RaisedError, VALIDATION_ERROR, default_expected_errors,
    handle_error, validation_error,
};
use restkit_query::{
    DeleteQuery, DeleteRules, GetQuery, GetRules, ParsedDeleteInput, ParsedGetInput,
    ParsedUpdateInput, RuleValidator, UpdateQuery, UpdateRules, Validator,
};
use serde::Serialize;

use crate::context::RequestContext;
use crate::endpoint::EndpointSpec;
use crate::input::{Input, ObjectPicker};
use crate::output::{OutputHandler, ResponseRecord};
use crate::recover::panic_message;
use crate::stack::{Handler, Middleware, MiddlewareWrapper};

pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Marker for a dependency that has not been supplied yet.
#[derive(Debug, Clone, Copy)]
pub struct Missing;

type ServiceFuture<T> = BoxFuture<'static, Result<T, RaisedError>>;

/// Builder for [`InputMiddleware`].
///
/// `P` and `O` start as [`Missing`] and become the picker and output handler types.
#[must_use]
pub struct InputMiddlewareBuilder<I, R, P = Missing, O = Missing, V = RuleValidator> {
    spec: EndpointSpec<I, R>,
    picker: P,
    output: O,
    validator: V,
    max_body_bytes: usize,
}

impl<I, R> InputMiddlewareBuilder<I, R> {
    pub fn new(spec: &EndpointSpec<I, R>) -> Self {
        Self {
            spec: spec.clone(),
            picker: Missing,
            output: Missing,
            validator: RuleValidator,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl<I, R, O, V> InputMiddlewareBuilder<I, R, Missing, O, V> {
    pub fn picker<P: ObjectPicker>(self, picker: P) -> InputMiddlewareBuilder<I, R, P, O, V> {
        InputMiddlewareBuilder {
            spec: self.spec,
            picker,
            output: self.output,
            validator: self.validator,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

impl<I, R, P, V> InputMiddlewareBuilder<I, R, P, Missing, V> {
    pub fn output<O: OutputHandler>(self, output: O) -> InputMiddlewareBuilder<I, R, P, O, V> {
        InputMiddlewareBuilder {
            spec: self.spec,
            picker: self.picker,
            output,
            validator: self.validator,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

impl<I, R, P, O, V> InputMiddlewareBuilder<I, R, P, O, V> {
    /// Validator used by the GET/UPDATE/DELETE parse steps.
    pub fn validator<V2: Validator>(self, validator: V2) -> InputMiddlewareBuilder<I, R, P, O, V2> {
        InputMiddlewareBuilder {
            spec: self.spec,
            picker: self.picker,
            output: self.output,
            validator,
            max_body_bytes: self.max_body_bytes,
        }
    }

    /// Bodies larger than this are rejected with `VALIDATION_ERROR`.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

impl<I, R, P, O, V> InputMiddlewareBuilder<I, R, P, O, V>
where
    I: Input,
    R: Send + Sync + 'static,
    P: ObjectPicker,
    O: OutputHandler,
    V: Validator + 'static,
{
    pub fn build(self) -> InputMiddleware<I, R, P, O, V> {
        InputMiddleware {
            shared: Arc::new(Shared {
                spec: self.spec,
                picker: self.picker,
                output: self.output,
                validator: self.validator,
                max_body_bytes: self.max_body_bytes,
            }),
        }
    }
}

struct Shared<I, R, P, O, V> {
    spec: EndpointSpec<I, R>,
    picker: P,
    output: O,
    validator: V,
    max_body_bytes: usize,
}

/// Ready-to-bind input middleware. Pick a variant to obtain the [`Middleware`].
pub struct InputMiddleware<I, R, P, O, V = RuleValidator> {
    shared: Arc<Shared<I, R, P, O, V>>,
}

/// Result of a GET endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GetOutput<E> {
    pub output: Option<Vec<E>>,
    pub count: u64,
}

type GetFn<I, T> =
    Arc<dyn Fn(Arc<RequestContext>, I, ParsedGetInput) -> ServiceFuture<T> + Send + Sync>;

/// Count and entity functions of a GET endpoint. `get_count` selects which one runs.
pub struct GetService<I, E> {
    count: Option<GetFn<I, u64>>,
    entities: Option<GetFn<I, Vec<E>>>,
}

impl<I, E> Default for GetService<I, E> {
    fn default() -> Self {
        Self {
            count: None,
            entities: None,
        }
    }
}

impl<I, E> GetService<I, E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_count<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<RequestContext>, I, ParsedGetInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<u64, RaisedError>> + Send + 'static,
    {
        self.count = Some(Arc::new(move |ctx, input, parsed| f(ctx, input, parsed).boxed()));
        self
    }

    #[must_use]
    pub fn with_entities<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<RequestContext>, I, ParsedGetInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<E>, RaisedError>> + Send + 'static,
    {
        self.entities = Some(Arc::new(move |ctx, input, parsed| f(ctx, input, parsed).boxed()));
        self
    }

    async fn run(
        &self,
        ctx: Arc<RequestContext>,
        input: I,
        parsed: ParsedGetInput,
    ) -> Result<GetOutput<E>, RaisedError> {
        if parsed.get_count {
            let Some(count) = &self.count else {
                return Err(anyhow::anyhow!("get endpoint has no count function").into());
            };
            let count = count(ctx, input, parsed).await?;
            Ok(GetOutput { output: None, count })
        } else {
            let Some(entities) = &self.entities else {
                return Err(anyhow::anyhow!("get endpoint has no entities function").into());
            };
            let rows = entities(ctx, input, parsed).await?;
            Ok(GetOutput {
                count: u64::try_from(rows.len()).unwrap_or(u64::MAX),
                output: Some(rows),
            })
        }
    }
}

impl<I, R, P, O, V> InputMiddleware<I, R, P, O, V>
where
    I: Input,
    R: Send + Sync + 'static,
    P: ObjectPicker,
    O: OutputHandler,
    V: Validator + 'static,
{
    /// Plain variant: the service receives the picked and validated input.
    pub fn handle<F, Fut, Out>(self, f: F) -> Middleware
    where
        F: Fn(Arc<RequestContext>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, RaisedError>> + Send + 'static,
        Out: Serialize + Send + 'static,
    {
        let expected = merge(self.shared.spec.expected_errors(), default_expected_errors());
        self.into_middleware(expected, move |_shared, ctx, input| f(ctx, input).boxed())
    }

    /// Same as [`handle`](Self::handle), wrapped and tagged with the input type.
    pub fn wrapper<F, Fut, Out>(self, id: impl Into<String>, f: F) -> MiddlewareWrapper
    where
        F: Fn(Arc<RequestContext>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, RaisedError>> + Send + 'static,
        Out: Serialize + Send + 'static,
    {
        MiddlewareWrapper::new(id, self.handle(f)).with_input::<I>()
    }

    fn into_middleware<Out, F>(self, expected: Vec<ExpectedError>, invoke: F) -> Middleware
    where
        Out: Serialize + Send + 'static,
        F: Fn(&Arc<Shared<I, R, P, O, V>>, Arc<RequestContext>, I) -> ServiceFuture<Out>
            + Send
            + Sync
            + 'static,
    {
        let shared = self.shared;
        let expected: Arc<[ExpectedError]> = expected.into();
        let invoke = Arc::new(invoke);

        Arc::new(move |next: Handler| {
            let shared = shared.clone();
            let expected = expected.clone();
            let invoke = invoke.clone();
            Handler::new(move |req: Request| {
                let shared = shared.clone();
                let expected = expected.clone();
                let invoke = invoke.clone();
                let next = next.clone();
                async move {
                    let req = serve(&shared, &expected, req, |ctx, input| {
                        invoke(&shared, ctx, input)
                    })
                    .await;
                    next.call(req).await
                }
            })
        })
    }
}

impl<I, P, O, V> InputMiddleware<I, GetRules, P, O, V>
where
    I: Input + GetQuery,
    P: ObjectPicker,
    O: OutputHandler,
    V: Validator + 'static,
{
    /// GET variant: parses selectors, orders and page, then runs the count or entity
    /// function depending on `get_count`.
    pub fn get<E>(self, service: GetService<I, E>) -> Middleware
    where
        E: Serialize + Send + Sync + 'static,
    {
        let service = Arc::new(service);
        let expected = parse_expected(self.shared.spec.expected_errors());
        self.into_middleware(expected, move |shared, ctx, input| {
            let service = service.clone();
            let parsed = shared.spec.rules().parse(&input, &shared.validator);
            async move { service.run(ctx, input, parsed?).await }.boxed()
        })
    }
}

impl<I, P, O, V> InputMiddleware<I, UpdateRules, P, O, V>
where
    I: Input + UpdateQuery,
    P: ObjectPicker,
    O: OutputHandler,
    V: Validator + 'static,
{
    pub fn update<F, Fut, Out>(self, f: F) -> Middleware
    where
        F: Fn(Arc<RequestContext>, I, ParsedUpdateInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, RaisedError>> + Send + 'static,
        Out: Serialize + Send + 'static,
    {
        let expected = parse_expected(self.shared.spec.expected_errors());
        self.into_middleware(expected, move |shared, ctx, input| {
            match shared.spec.rules().parse(&input, &shared.validator) {
                Ok(parsed) => f(ctx, input, parsed).boxed(),
                Err(e) => futures::future::ready(Err::<Out, RaisedError>(e.into())).boxed(),
            }
        })
    }
}

impl<I, P, O, V> InputMiddleware<I, DeleteRules, P, O, V>
where
    I: Input + DeleteQuery,
    P: ObjectPicker,
    O: OutputHandler,
    V: Validator + 'static,
{
    pub fn delete<F, Fut, Out>(self, f: F) -> Middleware
    where
        F: Fn(Arc<RequestContext>, I, ParsedDeleteInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out, RaisedError>> + Send + 'static,
        Out: Serialize + Send + 'static,
    {
        let expected = parse_expected(self.shared.spec.expected_errors());
        self.into_middleware(expected, move |shared, ctx, input| {
            match shared.spec.rules().parse(&input, &shared.validator) {
                Ok(parsed) => f(ctx, input, parsed).boxed(),
                Err(e) => futures::future::ready(Err::<Out, RaisedError>(e.into())).boxed(),
            }
        })
    }
}

/// Endpoint entries first so they can override the internal defaults.
fn merge(endpoint: &[ExpectedError], internal: Vec<ExpectedError>) -> Vec<ExpectedError> {
    endpoint.iter().cloned().chain(internal).collect()
}

fn parse_expected(endpoint: &[ExpectedError]) -> Vec<ExpectedError> {
    let mut internal = default_expected_errors();
    internal.extend(restkit_query::expected_errors());
    merge(endpoint, internal)
}

/// Runs steps 1-6 and returns the request rebuilt for the next handler.
async fn serve<I, R, P, O, V, Out, F>(
    shared: &Shared<I, R, P, O, V>,
    expected: &[ExpectedError],
    req: Request,
    invoke: F,
) -> Request
where
    I: Input,
    P: ObjectPicker,
    O: OutputHandler,
    Out: Serialize,
    F: FnOnce(Arc<RequestContext>, I) -> ServiceFuture<Out>,
{
    let (mut parts, body) = req.into_parts();
    let ctx = RequestContext::ensure(&mut parts);

    let (bytes, outcome) = match axum::body::to_bytes(body, shared.max_body_bytes).await {
        Ok(bytes) => {
            ctx.set_request_body(bytes.clone());
            let outcome = run_service(shared, &parts, &bytes, ctx.clone(), invoke).await;
            (bytes, outcome)
        }
        Err(e) => {
            tracing::trace!(error = %e, "Request body rejected");
            let err = validation_error(
                "body",
                format!("unreadable or larger than {} bytes", shared.max_body_bytes),
            );
            (bytes::Bytes::new(), Err(err.into()))
        }
    };

    let (status, output, error): (StatusCode, Option<Out>, Option<PublicError>) = match outcome {
        Ok(out) => (StatusCode::OK, Some(out), None),
        Err(err) => {
            let (status, public) = handle_error(&err, expected);
            (status, None, Some(public))
        }
    };

    let record = match shared
        .output
        .process_output(&parts, output.as_ref(), error.as_ref(), status)
    {
        Ok(record) => record,
        Err(e) => {
            tracing::error!(
                error = %e,
                request_id = ctx.request_id(),
                "Failed to emit endpoint output"
            );
            ResponseRecord::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    };
    tracing::trace!(
        status = record.status.as_u16(),
        request_id = ctx.request_id(),
        "Output emitted"
    );
    ctx.record_response(record);

    Request::from_parts(parts, Body::from(bytes))
}

async fn run_service<I, R, P, O, V, Out, F>(
    shared: &Shared<I, R, P, O, V>,
    parts: &http::request::Parts,
    bytes: &bytes::Bytes,
    ctx: Arc<RequestContext>,
    invoke: F,
) -> Result<Out, RaisedError>
where
    I: Input,
    P: ObjectPicker,
    F: FnOnce(Arc<RequestContext>, I) -> ServiceFuture<Out>,
{
    let sample = shared.spec.new_input();
    let input = shared.picker.pick_object(parts, bytes, sample)?;
    tracing::trace!(request_id = ctx.request_id(), "Input picked");

    let violations = input.validate();
    if !violations.is_empty() {
        return Err(VALIDATION_ERROR.with_data(violations).into());
    }

    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| invoke(ctx, input))) {
        Ok(future) => future,
        Err(payload) => return Err(panicked(payload.as_ref())),
    };
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(panicked(payload.as_ref())),
    }
}

fn panicked(payload: &(dyn std::any::Any + Send)) -> RaisedError {
    anyhow::anyhow!("endpoint service panicked: {}", panic_message(payload)).into()
}
