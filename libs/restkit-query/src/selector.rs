//! Client selectors: allow-list matching, predicate checks and translation.

use std::collections::HashMap;

use restkit_errors::FieldError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::QueryError;
use crate::field_map::FieldMap;
use crate::predicate::Predicate;
use crate::validator::Validator;

/// Selector as sent by the client. The predicate is kept raw so that unknown and
/// disallowed spellings can be told apart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputSelector {
    pub field: String,
    pub predicate: String,
    #[serde(default)]
    pub value: Value,
}

impl InputSelector {
    pub fn new(field: impl Into<String>, predicate: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            predicate: predicate.into(),
            value: value.into(),
        }
    }
}

/// Allow-list entry for one API field.
#[derive(Clone, Debug, Default)]
pub struct SelectorRule {
    pub allowed_predicates: Vec<Predicate>,
    /// Rule handed to the [`Validator`] for every client value.
    pub validation: String,
}

/// API field -> [`SelectorRule`].
#[derive(Clone, Debug, Default)]
pub struct AllowedSelectors {
    rules: HashMap<String, SelectorRule>,
}

impl AllowedSelectors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn allow(
        mut self,
        field: impl Into<String>,
        predicates: &[Predicate],
        validation: impl Into<String>,
    ) -> Self {
        self.rules.insert(
            field.into(),
            SelectorRule {
                allowed_predicates: predicates.to_vec(),
                validation: validation.into(),
            },
        );
        self
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&SelectorRule> {
        self.rules.get(field)
    }
}

/// Input selector paired with the allow-list entry it matched.
#[derive(Clone, Debug)]
pub struct MatchedSelector<'a> {
    pub rule: &'a SelectorRule,
    pub input: &'a InputSelector,
    pub predicate: Predicate,
}

/// Column-qualified selector. `predicate` is the database spelling.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DbSelector {
    pub table: String,
    pub field: String,
    pub predicate: &'static str,
    pub value: Value,
}

/// Match every input against the allow-list, validate its value and check its
/// predicate. Fails on the first offending selector.
pub fn match_selectors<'a, V: Validator>(
    inputs: &'a [InputSelector],
    allowed: &'a AllowedSelectors,
    validator: &V,
) -> Result<Vec<MatchedSelector<'a>>, QueryError> {
    inputs
        .iter()
        .map(|input| {
            let rule = allowed
                .get(&input.field)
                .ok_or_else(|| QueryError::InvalidSelectorField(input.field.clone()))?;

            validate_value(validator, &input.field, &input.value, &rule.validation)?;

            let predicate = input
                .predicate
                .parse::<Predicate>()
                .map_err(|_| QueryError::InvalidPredicate(input.predicate.clone()))?;
            if !rule.allowed_predicates.contains(&predicate) {
                return Err(QueryError::PredicateNotAllowed(input.predicate.clone()));
            }

            Ok(MatchedSelector {
                rule,
                input,
                predicate,
            })
        })
        .collect()
}

/// Translate matched selectors to database selectors, preserving order.
pub fn translate_selectors(
    matched: &[MatchedSelector<'_>],
    fields: &FieldMap,
) -> Result<Vec<DbSelector>, QueryError> {
    matched
        .iter()
        .map(|m| {
            let col = fields.get(&m.input.field).ok_or_else(|| {
                QueryError::InvalidDatabaseSelectorTranslation(m.input.field.clone())
            })?;
            Ok(DbSelector {
                table: col.table.clone(),
                field: col.column.clone(),
                predicate: m.predicate.sql(),
                value: m.input.value.clone(),
            })
        })
        .collect()
}

/// [`match_selectors`] followed by [`translate_selectors`].
pub fn process_selectors<V: Validator>(
    inputs: &[InputSelector],
    allowed: &AllowedSelectors,
    fields: &FieldMap,
    validator: &V,
) -> Result<Vec<DbSelector>, QueryError> {
    let matched = match_selectors(inputs, allowed, validator)?;
    translate_selectors(&matched, fields)
}

pub(crate) fn validate_value<V: Validator>(
    validator: &V,
    field: &str,
    value: &Value,
    rule: &str,
) -> Result<(), QueryError> {
    validator
        .validate_variable(field, value, rule)
        .map_err(|e| {
            let mut errors: Vec<FieldError> = validator
                .error_strings(&e)
                .into_iter()
                .map(|msg| FieldError::new(field, msg))
                .collect();
            if errors.is_empty() {
                errors.push(FieldError::new(field, "invalid value"));
            }
            QueryError::Validation(errors)
        })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::validator::RuleValidator;
    use serde_json::json;

    fn fields() -> FieldMap {
        FieldMap::new()
            .insert("name", "user", "user_name")
            .insert("age", "user", "user_age")
    }

    fn allowed() -> AllowedSelectors {
        AllowedSelectors::new()
            .allow("name", &[Predicate::Eq], "")
            .allow("age", &[Predicate::Gt, Predicate::Lt], "min=0")
            .allow("nickname", &[Predicate::Eq], "")
    }

    #[test]
    fn translation_preserves_input_order() {
        let inputs = [
            InputSelector::new("age", "GT", 25),
            InputSelector::new("name", "=", "Alice"),
        ];
        let out = process_selectors(&inputs, &allowed(), &fields(), &RuleValidator).unwrap();
        assert_eq!(
            out,
            vec![
                DbSelector {
                    table: "user".to_owned(),
                    field: "user_age".to_owned(),
                    predicate: ">",
                    value: json!(25)
                },
                DbSelector {
                    table: "user".to_owned(),
                    field: "user_name".to_owned(),
                    predicate: "=",
                    value: json!("Alice")
                },
            ]
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let inputs = [InputSelector::new("email", "EQ", "a@b.c")];
        assert_eq!(
            process_selectors(&inputs, &allowed(), &fields(), &RuleValidator),
            Err(QueryError::InvalidSelectorField("email".to_owned()))
        );
    }

    #[test]
    fn disallowed_predicate_reports_raw_literal() {
        let inputs = [InputSelector::new("name", "NE", "x")];
        assert_eq!(
            process_selectors(&inputs, &allowed(), &fields(), &RuleValidator),
            Err(QueryError::PredicateNotAllowed("NE".to_owned()))
        );
    }

    #[test]
    fn unknown_predicate_is_invalid() {
        let inputs = [InputSelector::new("name", "LIKE", "x%")];
        assert_eq!(
            process_selectors(&inputs, &allowed(), &fields(), &RuleValidator),
            Err(QueryError::InvalidPredicate("LIKE".to_owned()))
        );
    }

    #[test]
    fn value_validation_runs_before_predicate_check() {
        let inputs = [InputSelector::new("age", "NE", -1)];
        let err = process_selectors(&inputs, &allowed(), &fields(), &RuleValidator).unwrap_err();
        assert_eq!(
            err,
            QueryError::Validation(vec![FieldError::new("age", "must be at least 0")])
        );
    }

    #[test]
    fn allowed_field_without_mapping_fails_translation() {
        let inputs = [InputSelector::new("nickname", "EQ", "al")];
        assert_eq!(
            process_selectors(&inputs, &allowed(), &fields(), &RuleValidator),
            Err(QueryError::InvalidDatabaseSelectorTranslation("nickname".to_owned()))
        );
    }
}
