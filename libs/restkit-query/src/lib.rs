//! Translation of untrusted client query descriptions into database descriptors.
//!
//! Clients describe what they want with API field names: selectors
//! (`{field, predicate, value}`), orders (`{field, direction}`), updates
//! (`{field, value}`) and a page. Endpoints declare which of those they accept
//! through allow-lists and a [`FieldMap`]; the translators here reject everything
//! else with a stable error id and qualify the rest with `(table, column)`.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod errors;
pub mod field_map;
pub mod order;
pub mod page;
pub mod parsed;
pub mod predicate;
pub mod selector;
pub mod update;
pub mod validator;

pub use errors::{QueryError, expected_errors};
pub use field_map::{Column, FieldMap};
pub use order::{DbOrder, Direction, Order, translate_orders};
pub use page::Page;
pub use parsed::{
    DeleteInput, DeleteOptions, DeleteQuery, DeleteRules, GetInput, GetQuery, GetRules,
    ParsedDeleteInput, ParsedGetInput, ParsedUpdateInput, UpdateInput, UpdateQuery, UpdateRules,
};
pub use predicate::Predicate;
pub use selector::{
    AllowedSelectors, DbSelector, InputSelector, MatchedSelector, SelectorRule, match_selectors,
    process_selectors, translate_selectors,
};
pub use update::{
    AllowedUpdates, DbUpdate, InputUpdate, MatchedUpdate, UpdateRule, match_updates,
    process_updates, translate_updates,
};
pub use validator::{RuleValidator, RuleViolations, Validator};
