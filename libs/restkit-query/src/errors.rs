//! Errors raised while translating client query descriptions.

use http::StatusCode;
use restkit_errors::{AnyError, ExpectedError, FieldError, RaisedError};
use serde_json::Value;

/// Wire ids of [`QueryError`] variants.
pub mod ids {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const INVALID_ORDER_FIELD: &str = "INVALID_ORDER_FIELD";
    pub const INVALID_SELECTOR_FIELD: &str = "INVALID_SELECTOR_FIELD";
    pub const PREDICATE_NOT_ALLOWED: &str = "PREDICATE_NOT_ALLOWED";
    pub const INVALID_PREDICATE: &str = "INVALID_PREDICATE";
    pub const INVALID_DATABASE_SELECTOR_TRANSLATION: &str = "INVALID_DATABASE_SELECTOR_TRANSLATION";
    pub const INVALID_UPDATE_FIELD: &str = "INVALID_UPDATE_FIELD";
    pub const INVALID_DATABASE_UPDATE_TRANSLATION: &str = "INVALID_DATABASE_UPDATE_TRANSLATION";
    pub const NEED_AT_LEAST_ONE_SELECTOR: &str = "NEED_AT_LEAST_ONE_SELECTOR";
    pub const NEED_AT_LEAST_ONE_UPDATE: &str = "NEED_AT_LEAST_ONE_UPDATE";
    pub const MAX_PAGE_LIMIT_EXCEEDED: &str = "MAX_PAGE_LIMIT_EXCEEDED";
}

/// Translation failure. Every variant is a client error (400).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid order field: {0}")]
    InvalidOrderField(String),

    #[error("invalid selector field: {0}")]
    InvalidSelectorField(String),

    #[error("predicate not allowed: {0}")]
    PredicateNotAllowed(String),

    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("no database mapping for selector field: {0}")]
    InvalidDatabaseSelectorTranslation(String),

    #[error("invalid update field: {0}")]
    InvalidUpdateField(String),

    #[error("no database mapping for update field: {0}")]
    InvalidDatabaseUpdateTranslation(String),

    #[error("at least one selector is required")]
    NeedAtLeastOneSelector,

    #[error("at least one update is required")]
    NeedAtLeastOneUpdate,

    #[error("page limit exceeds maximum of {0}")]
    MaxPageLimitExceeded(u64),

    #[error("validation failed")]
    Validation(Vec<FieldError>),
}

impl QueryError {
    #[must_use]
    pub const fn id(&self) -> &'static str {
        match self {
            Self::InvalidOrderField(_) => ids::INVALID_ORDER_FIELD,
            Self::InvalidSelectorField(_) => ids::INVALID_SELECTOR_FIELD,
            Self::PredicateNotAllowed(_) => ids::PREDICATE_NOT_ALLOWED,
            Self::InvalidPredicate(_) => ids::INVALID_PREDICATE,
            Self::InvalidDatabaseSelectorTranslation(_) => ids::INVALID_DATABASE_SELECTOR_TRANSLATION,
            Self::InvalidUpdateField(_) => ids::INVALID_UPDATE_FIELD,
            Self::InvalidDatabaseUpdateTranslation(_) => ids::INVALID_DATABASE_UPDATE_TRANSLATION,
            Self::NeedAtLeastOneSelector => ids::NEED_AT_LEAST_ONE_SELECTOR,
            Self::NeedAtLeastOneUpdate => ids::NEED_AT_LEAST_ONE_UPDATE,
            Self::MaxPageLimitExceeded(_) => ids::MAX_PAGE_LIMIT_EXCEEDED,
            Self::Validation(_) => ids::VALIDATION_ERROR,
        }
    }

    /// Payload exposed on the wire.
    #[must_use]
    pub fn data(&self) -> Option<Value> {
        match self {
            Self::InvalidOrderField(s)
            | Self::InvalidSelectorField(s)
            | Self::PredicateNotAllowed(s)
            | Self::InvalidPredicate(s)
            | Self::InvalidDatabaseSelectorTranslation(s)
            | Self::InvalidUpdateField(s)
            | Self::InvalidDatabaseUpdateTranslation(s) => Some(Value::String(s.clone())),
            Self::MaxPageLimitExceeded(max) => Some(Value::from(*max)),
            Self::Validation(errors) => serde_json::to_value(errors).ok(),
            Self::NeedAtLeastOneSelector | Self::NeedAtLeastOneUpdate => None,
        }
    }
}

impl AnyError for QueryError {
    fn error_id(&self) -> &str {
        self.id()
    }

    fn error_data(&self) -> Option<Value> {
        self.data()
    }

    fn error_message(&self) -> Option<&str> {
        None
    }
}

impl From<QueryError> for RaisedError {
    fn from(err: QueryError) -> Self {
        RaisedError::api(err)
    }
}

/// Every translator error id, reported as 400 with public data.
#[must_use]
pub fn expected_errors() -> Vec<ExpectedError> {
    [
        ids::VALIDATION_ERROR,
        ids::INVALID_ORDER_FIELD,
        ids::INVALID_SELECTOR_FIELD,
        ids::PREDICATE_NOT_ALLOWED,
        ids::INVALID_PREDICATE,
        ids::INVALID_DATABASE_SELECTOR_TRANSLATION,
        ids::INVALID_UPDATE_FIELD,
        ids::INVALID_DATABASE_UPDATE_TRANSLATION,
        ids::NEED_AT_LEAST_ONE_SELECTOR,
        ids::NEED_AT_LEAST_ONE_UPDATE,
        ids::MAX_PAGE_LIMIT_EXCEEDED,
    ]
    .into_iter()
    .map(|id| ExpectedError::new(id, StatusCode::BAD_REQUEST).with_public_data(true))
    .collect()
}
