//! Client updates: allow-list matching, value validation and translation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::QueryError;
use crate::field_map::FieldMap;
use crate::selector::validate_value;
use crate::validator::Validator;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputUpdate {
    pub field: String,
    #[serde(default)]
    pub value: Value,
}

impl InputUpdate {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct UpdateRule {
    pub validation: String,
}

/// API field -> [`UpdateRule`].
#[derive(Clone, Debug, Default)]
pub struct AllowedUpdates {
    rules: HashMap<String, UpdateRule>,
}

impl AllowedUpdates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allow(mut self, field: impl Into<String>, validation: impl Into<String>) -> Self {
        self.rules.insert(
            field.into(),
            UpdateRule {
                validation: validation.into(),
            },
        );
        self
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&UpdateRule> {
        self.rules.get(field)
    }
}

#[derive(Clone, Debug)]
pub struct MatchedUpdate<'a> {
    pub rule: &'a UpdateRule,
    pub input: &'a InputUpdate,
}

/// Column assignment. `field` is the database column.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DbUpdate {
    pub field: String,
    pub value: Value,
}

pub fn match_updates<'a, V: Validator>(
    inputs: &'a [InputUpdate],
    allowed: &'a AllowedUpdates,
    validator: &V,
) -> Result<Vec<MatchedUpdate<'a>>, QueryError> {
    inputs
        .iter()
        .map(|input| {
            let rule = allowed
                .get(&input.field)
                .ok_or_else(|| QueryError::InvalidUpdateField(input.field.clone()))?;
            validate_value(validator, &input.field, &input.value, &rule.validation)?;
            Ok(MatchedUpdate { rule, input })
        })
        .collect()
}

pub fn translate_updates(
    matched: &[MatchedUpdate<'_>],
    fields: &FieldMap,
) -> Result<Vec<DbUpdate>, QueryError> {
    matched
        .iter()
        .map(|m| {
            let col = fields.get(&m.input.field).ok_or_else(|| {
                QueryError::InvalidDatabaseUpdateTranslation(m.input.field.clone())
            })?;
            Ok(DbUpdate {
                field: col.column.clone(),
                value: m.input.value.clone(),
            })
        })
        .collect()
}

/// [`match_updates`] followed by [`translate_updates`].
pub fn process_updates<V: Validator>(
    inputs: &[InputUpdate],
    allowed: &AllowedUpdates,
    fields: &FieldMap,
    validator: &V,
) -> Result<Vec<DbUpdate>, QueryError> {
    let matched = match_updates(inputs, allowed, validator)?;
    translate_updates(&matched, fields)
}
