//! `/users` endpoints.

use std::sync::Arc;

use http::{Method, StatusCode};
use restkit::{
    Endpoint, EndpointSpec, GetService, Input, InputMiddlewareBuilder, JsonOutput, Middleware,
    MiddlewareWrapper, RequestPicker, ServerConfig, Stack,
};
use restkit_errors::{DUPLICATE_ENTRY, ExpectedError, FieldError};
use restkit_query::{
    AllowedSelectors, AllowedUpdates, DeleteInput, DeleteRules, FieldMap, GetInput, GetRules,
    ParsedDeleteInput, ParsedGetInput, ParsedUpdateInput, Predicate, RuleValidator, UpdateInput,
    UpdateRules, Validator,
};
use serde::Serialize;
use serde_json::json;

use crate::model::NewUser;
use crate::store::{USER_TABLE, UsersRepository};

pub const USERS_URL: &str = "/users";
pub const MAX_PAGE: u64 = 50;

/// Rows touched by an update or delete.
#[derive(Debug, Serialize)]
pub struct Affected {
    pub affected: u64,
}

impl Input for NewUser {
    fn validate(&self) -> Vec<FieldError> {
        let validator = RuleValidator;
        [
            ("name", json!(self.name), "required,max=64"),
            ("age", json!(self.age), "max=150"),
            ("email", json!(self.email), "required,email"),
        ]
        .into_iter()
        .filter_map(|(field, value, rule)| validator.validate_variable(field, &value, rule).err())
        .flat_map(|err| {
            let field = err.field;
            err.violations
                .into_iter()
                .map(move |message| FieldError::new(field.clone(), message))
        })
        .collect()
    }
}

#[must_use]
pub fn field_map() -> Arc<FieldMap> {
    Arc::new(
        FieldMap::new()
            .insert("name", USER_TABLE, "name")
            .insert("age", USER_TABLE, "age")
            .insert("email", USER_TABLE, "email"),
    )
}

/// Every `/users` endpoint backed by `repo`.
pub fn endpoints(repo: &Arc<dyn UsersRepository>, server: &ServerConfig) -> Vec<Endpoint> {
    let fields = field_map();
    vec![
        list_endpoint(repo, &fields, server),
        create_endpoint(repo, server),
        update_endpoint(repo, &fields, server),
        delete_endpoint(repo, &fields, server),
    ]
}

fn mount<I, R>(spec: &EndpointSpec<I, R>, middleware: Middleware) -> Endpoint {
    spec.with_middleware_stack(Stack::new().with(MiddlewareWrapper::new("input", middleware)))
        .definition()
}

fn list_endpoint(
    repo: &Arc<dyn UsersRepository>,
    fields: &Arc<FieldMap>,
    server: &ServerConfig,
) -> Endpoint {
    let spec = EndpointSpec::new(USERS_URL, Method::GET, GetInput::default).with_rules(
        GetRules::new(fields.clone(), MAX_PAGE)
            .with_selectors(
                AllowedSelectors::new()
                    .allow(
                        "name",
                        &[Predicate::Eq, Predicate::Ne, Predicate::In, Predicate::NotIn],
                        "",
                    )
                    .allow(
                        "age",
                        &[
                            Predicate::Eq,
                            Predicate::Ne,
                            Predicate::Gt,
                            Predicate::Ge,
                            Predicate::Lt,
                            Predicate::Le,
                        ],
                        "numeric",
                    )
                    .allow("email", &[Predicate::Eq], "email"),
            )
            .with_order_fields(["name", "age"]),
    );

    let counter = repo.clone();
    let lister = repo.clone();
    let service = GetService::new()
        .with_count(move |_ctx, _input: GetInput, parsed: ParsedGetInput| {
            let repo = counter.clone();
            async move { Ok(repo.count(&parsed.selectors).await?) }
        })
        .with_entities(move |_ctx, _input: GetInput, parsed: ParsedGetInput| {
            let repo = lister.clone();
            async move { Ok(repo.list(&parsed).await?) }
        });

    let middleware = InputMiddlewareBuilder::new(&spec)
        .picker(RequestPicker)
        .output(JsonOutput)
        .max_body_bytes(server.max_body_bytes)
        .build()
        .get(service);
    mount(&spec, middleware)
}

fn create_endpoint(repo: &Arc<dyn UsersRepository>, server: &ServerConfig) -> Endpoint {
    let spec = EndpointSpec::new(USERS_URL, Method::POST, NewUser::default).with_expected_errors([
        ExpectedError::of(&DUPLICATE_ENTRY, StatusCode::CONFLICT).with_public_data(true),
    ]);

    let repo = repo.clone();
    let middleware = InputMiddlewareBuilder::new(&spec)
        .picker(RequestPicker)
        .output(JsonOutput)
        .max_body_bytes(server.max_body_bytes)
        .build()
        .handle(move |_ctx, input: NewUser| {
            let repo = repo.clone();
            async move { Ok(repo.insert(input).await?) }
        });
    mount(&spec, middleware)
}

fn update_endpoint(
    repo: &Arc<dyn UsersRepository>,
    fields: &Arc<FieldMap>,
    server: &ServerConfig,
) -> Endpoint {
    let spec = EndpointSpec::new(USERS_URL, Method::PATCH, UpdateInput::default).with_rules(
        UpdateRules::new(fields.clone())
            .with_selectors(
                AllowedSelectors::new()
                    .allow("name", &[Predicate::Eq, Predicate::In], "")
                    .allow("email", &[Predicate::Eq], "email"),
            )
            .with_updates(
                AllowedUpdates::new()
                    .allow("age", "min=0,max=150")
                    .allow("email", "email")
                    .allow("name", "required,max=64"),
            ),
    );

    let repo = repo.clone();
    let middleware = InputMiddlewareBuilder::new(&spec)
        .picker(RequestPicker)
        .output(JsonOutput)
        .max_body_bytes(server.max_body_bytes)
        .build()
        .update(move |_ctx, _input, parsed: ParsedUpdateInput| {
            let repo = repo.clone();
            async move {
                let affected = repo.update(&parsed).await?;
                Ok(Affected { affected })
            }
        });
    mount(&spec, middleware)
}

fn delete_endpoint(
    repo: &Arc<dyn UsersRepository>,
    fields: &Arc<FieldMap>,
    server: &ServerConfig,
) -> Endpoint {
    let spec = EndpointSpec::new(USERS_URL, Method::DELETE, DeleteInput::default).with_rules(
        DeleteRules::new(fields.clone())
            .with_selectors(
                AllowedSelectors::new()
                    .allow("name", &[Predicate::Eq, Predicate::In], "")
                    .allow("age", &[Predicate::Lt, Predicate::Gt], "numeric"),
            )
            .with_order_fields(["name", "age"]),
    );

    let repo = repo.clone();
    let middleware = InputMiddlewareBuilder::new(&spec)
        .picker(RequestPicker)
        .output(JsonOutput)
        .max_body_bytes(server.max_body_bytes)
        .build()
        .delete(move |_ctx, _input, parsed: ParsedDeleteInput| {
            let repo = repo.clone();
            async move {
                let affected = repo.delete(&parsed).await?;
                Ok(Affected { affected })
            }
        });
    mount(&spec, middleware)
}
