//! Typed HTTP request pipeline.
//!
//! An [`EndpointSpec`] declares a `(url, method)`, an input factory, the operation's
//! whitelist rules and a middleware [`Stack`]. The [`InputMiddleware`] picks the input
//! from the request, validates and parses it, runs the service under a panic guard and
//! renders the `{payload, error}` envelope. [`build_router`] mounts endpoint
//! definitions on an axum router with request contexts, panic recovery and 404/405
//! handling.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
pub mod context;
pub mod endpoint;
pub mod input;
pub mod middleware;
pub mod output;
pub mod recover;
pub mod router;
pub mod server;
pub mod signals;
pub mod stack;
pub mod telemetry;

pub use config::{AppConfig, ConfigError, ServerConfig};
pub use context::{ContextKey, REQUEST_ID_HEADER, RequestContext};
pub use endpoint::{Endpoint, EndpointOption, EndpointSpec, NoRules};
pub use input::{Input, ObjectPicker, PickError, Placement, RequestPicker, Source};
pub use middleware::{GetOutput, GetService, InputMiddleware, InputMiddlewareBuilder};
pub use output::{JsonOutput, OutputError, OutputHandler, ResponseRecord};
pub use router::{RouterConfig, RouterError, build_router};
pub use server::{AxumServer, HttpServer, serve_until, serve_until_signal};
pub use stack::{Handler, Middleware, MiddlewareWrapper, Stack};
pub use telemetry::{LogFormat, LoggingConfig, init_logging};

pub use restkit_errors as errors;
pub use restkit_query as query;
