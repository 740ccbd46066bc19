//! Operation assemblers: GET, UPDATE and DELETE inputs turned into database-ready
//! descriptors.
//!
//! Each operation has three parts:
//! - a query trait (`GetQuery`, ...) giving read access to the client's raw description,
//!   so application input types can carry extra fields and still be parsed;
//! - a standard input (`GetInput`, ...) implementing it;
//! - a rule bundle (`GetRules`, ...) holding the endpoint's field map, allow-lists and
//!   limits, whose `parse` produces the `Parsed*` descriptor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::QueryError;
use crate::field_map::FieldMap;
use crate::order::{DbOrder, Order, translate_orders};
use crate::page::Page;
use crate::selector::{AllowedSelectors, DbSelector, InputSelector, process_selectors};
use crate::update::{AllowedUpdates, DbUpdate, InputUpdate, process_updates};
use crate::validator::Validator;

pub trait GetQuery {
    fn selectors(&self) -> &[InputSelector];
    fn orders(&self) -> &[Order];
    fn page(&self) -> Option<Page>;
    fn get_count(&self) -> bool;
}

pub trait UpdateQuery {
    fn selectors(&self) -> &[InputSelector];
    fn updates(&self) -> &[InputUpdate];
    fn upsert(&self) -> bool;
}

pub trait DeleteQuery {
    fn selectors(&self) -> &[InputSelector];
    fn orders(&self) -> &[Order];
    fn limit(&self) -> Option<u64>;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetInput {
    pub selectors: Vec<InputSelector>,
    pub orders: Vec<Order>,
    pub page: Option<Page>,
    pub get_count: bool,
}

impl GetQuery for GetInput {
    fn selectors(&self) -> &[InputSelector] {
        &self.selectors
    }
    fn orders(&self) -> &[Order] {
        &self.orders
    }
    fn page(&self) -> Option<Page> {
        self.page
    }
    fn get_count(&self) -> bool {
        self.get_count
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateInput {
    pub selectors: Vec<InputSelector>,
    pub updates: Vec<InputUpdate>,
    pub upsert: bool,
}

impl UpdateQuery for UpdateInput {
    fn selectors(&self) -> &[InputSelector] {
        &self.selectors
    }
    fn updates(&self) -> &[InputUpdate] {
        &self.updates
    }
    fn upsert(&self) -> bool {
        self.upsert
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteInput {
    pub selectors: Vec<InputSelector>,
    pub orders: Vec<Order>,
    pub limit: Option<u64>,
}

impl DeleteQuery for DeleteInput {
    fn selectors(&self) -> &[InputSelector] {
        &self.selectors
    }
    fn orders(&self) -> &[Order] {
        &self.orders
    }
    fn limit(&self) -> Option<u64> {
        self.limit
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParsedGetInput {
    pub orders: Vec<DbOrder>,
    pub selectors: Vec<DbSelector>,
    pub page: Page,
    pub get_count: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParsedUpdateInput {
    pub selectors: Vec<DbSelector>,
    pub updates: Vec<DbUpdate>,
    pub upsert: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeleteOptions {
    pub limit: Option<u64>,
    pub orders: Vec<DbOrder>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParsedDeleteInput {
    pub selectors: Vec<DbSelector>,
    pub delete_opts: DeleteOptions,
}

/// Allow-lists and limits of a GET endpoint.
#[derive(Clone, Debug)]
pub struct GetRules {
    pub fields: Arc<FieldMap>,
    pub selectors: AllowedSelectors,
    pub order_fields: Vec<String>,
    pub max_page_count: u64,
}

impl GetRules {
    #[must_use]
    pub fn new(fields: Arc<FieldMap>, max_page_count: u64) -> Self {
        Self {
            fields,
            selectors: AllowedSelectors::new(),
            order_fields: Vec::new(),
            max_page_count,
        }
    }

    #[must_use]
    pub fn with_selectors(mut self, selectors: AllowedSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    #[must_use]
    pub fn with_order_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.order_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Orders, then page, then selectors; the first failure wins.
    pub fn parse<Q, V>(&self, query: &Q, validator: &V) -> Result<ParsedGetInput, QueryError>
    where
        Q: GetQuery + ?Sized,
        V: Validator,
    {
        let orders = translate_orders(query.orders(), &self.order_fields, &self.fields)?;

        let page = match query.page() {
            Some(page) => {
                page.validate(self.max_page_count)?;
                page
            }
            None => Page::new(0, self.max_page_count),
        };

        let selectors = process_selectors(query.selectors(), &self.selectors, &self.fields, validator)?;

        tracing::trace!(
            selectors = selectors.len(),
            orders = orders.len(),
            offset = page.offset,
            limit = page.limit,
            "Parsed get input"
        );
        Ok(ParsedGetInput {
            orders,
            selectors,
            page,
            get_count: query.get_count(),
        })
    }
}

/// Allow-lists of an UPDATE endpoint.
#[derive(Clone, Debug)]
pub struct UpdateRules {
    pub fields: Arc<FieldMap>,
    pub selectors: AllowedSelectors,
    pub updates: AllowedUpdates,
}

impl UpdateRules {
    #[must_use]
    pub fn new(fields: Arc<FieldMap>) -> Self {
        Self {
            fields,
            selectors: AllowedSelectors::new(),
            updates: AllowedUpdates::new(),
        }
    }

    #[must_use]
    pub fn with_selectors(mut self, selectors: AllowedSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    #[must_use]
    pub fn with_updates(mut self, updates: AllowedUpdates) -> Self {
        self.updates = updates;
        self
    }

    pub fn parse<Q, V>(&self, query: &Q, validator: &V) -> Result<ParsedUpdateInput, QueryError>
    where
        Q: UpdateQuery + ?Sized,
        V: Validator,
    {
        let selectors = process_selectors(query.selectors(), &self.selectors, &self.fields, validator)?;
        if selectors.is_empty() {
            return Err(QueryError::NeedAtLeastOneSelector);
        }

        let updates = process_updates(query.updates(), &self.updates, &self.fields, validator)?;
        if updates.is_empty() {
            return Err(QueryError::NeedAtLeastOneUpdate);
        }

        tracing::trace!(
            selectors = selectors.len(),
            updates = updates.len(),
            "Parsed update input"
        );
        Ok(ParsedUpdateInput {
            selectors,
            updates,
            upsert: query.upsert(),
        })
    }
}

/// Allow-lists of a DELETE endpoint.
#[derive(Clone, Debug)]
pub struct DeleteRules {
    pub fields: Arc<FieldMap>,
    pub selectors: AllowedSelectors,
    pub order_fields: Vec<String>,
}

impl DeleteRules {
    #[must_use]
    pub fn new(fields: Arc<FieldMap>) -> Self {
        Self {
            fields,
            selectors: AllowedSelectors::new(),
            order_fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_selectors(mut self, selectors: AllowedSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    #[must_use]
    pub fn with_order_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.order_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn parse<Q, V>(&self, query: &Q, validator: &V) -> Result<ParsedDeleteInput, QueryError>
    where
        Q: DeleteQuery + ?Sized,
        V: Validator,
    {
        let selectors = process_selectors(query.selectors(), &self.selectors, &self.fields, validator)?;
        if selectors.is_empty() {
            return Err(QueryError::NeedAtLeastOneSelector);
        }

        let orders = translate_orders(query.orders(), &self.order_fields, &self.fields)?;

        tracing::trace!(
            selectors = selectors.len(),
            orders = orders.len(),
            "Parsed delete input"
        );
        Ok(ParsedDeleteInput {
            selectors,
            delete_opts: DeleteOptions {
                limit: query.limit(),
                orders,
            },
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::order::Direction;
    use crate::predicate::Predicate;
    use crate::validator::RuleValidator;
    use serde_json::json;

    fn fields() -> Arc<FieldMap> {
        Arc::new(
            FieldMap::new()
                .insert("name", "user", "user_name")
                .insert("age", "user", "user_age"),
        )
    }

    fn selectors() -> AllowedSelectors {
        AllowedSelectors::new()
            .allow("name", &[Predicate::Eq], "")
            .allow("age", &[Predicate::Gt, Predicate::Lt], "")
    }

    fn get_rules(max: u64) -> GetRules {
        GetRules::new(fields(), max)
            .with_selectors(selectors())
            .with_order_fields(["name"])
    }

    #[test]
    fn get_with_selectors_and_page() {
        let input = GetInput {
            selectors: vec![
                InputSelector::new("name", "EQ", "Alice"),
                InputSelector::new("age", "GT", 25),
            ],
            orders: vec![Order::new("name", "ASC")],
            page: Some(Page::new(0, 10)),
            get_count: false,
        };

        let parsed = get_rules(20).parse(&input, &RuleValidator).unwrap();

        assert_eq!(
            parsed,
            ParsedGetInput {
                selectors: vec![
                    DbSelector {
                        table: "user".to_owned(),
                        field: "user_name".to_owned(),
                        predicate: "=",
                        value: json!("Alice"),
                    },
                    DbSelector {
                        table: "user".to_owned(),
                        field: "user_age".to_owned(),
                        predicate: ">",
                        value: json!(25),
                    },
                ],
                orders: vec![DbOrder {
                    table: "user".to_owned(),
                    field: "user_name".to_owned(),
                    direction: Direction::Asc,
                }],
                page: Page::new(0, 10),
                get_count: false,
            }
        );
    }

    #[test]
    fn get_without_page_uses_the_cap() {
        let parsed = get_rules(20).parse(&GetInput::default(), &RuleValidator).unwrap();
        assert_eq!(parsed.page, Page::new(0, 20));
    }

    #[test]
    fn get_rejects_page_over_cap() {
        let input = GetInput {
            page: Some(Page::new(0, 6)),
            ..GetInput::default()
        };
        assert_eq!(
            get_rules(5).parse(&input, &RuleValidator),
            Err(QueryError::MaxPageLimitExceeded(5))
        );
    }

    #[test]
    fn get_fails_on_orders_before_selectors() {
        let input = GetInput {
            selectors: vec![InputSelector::new("nope", "EQ", 1)],
            orders: vec![Order::new("age", "ASC")],
            ..GetInput::default()
        };
        assert_eq!(
            get_rules(5).parse(&input, &RuleValidator),
            Err(QueryError::InvalidOrderField("age".to_owned()))
        );
    }

    #[test]
    fn get_rejects_disallowed_predicate() {
        let input = GetInput {
            selectors: vec![InputSelector::new("name", "NE", "x")],
            ..GetInput::default()
        };
        assert_eq!(
            get_rules(5).parse(&input, &RuleValidator),
            Err(QueryError::PredicateNotAllowed("NE".to_owned()))
        );
    }

    #[test]
    fn update_needs_updates() {
        let rules = UpdateRules::new(fields())
            .with_selectors(selectors())
            .with_updates(AllowedUpdates::new().allow("age", "min=0"));
        let input = UpdateInput {
            selectors: vec![InputSelector::new("name", "EQ", "Alice")],
            updates: vec![],
            upsert: false,
        };
        assert_eq!(
            rules.parse(&input, &RuleValidator),
            Err(QueryError::NeedAtLeastOneUpdate)
        );
    }

    #[test]
    fn update_needs_selectors() {
        let rules = UpdateRules::new(fields())
            .with_selectors(selectors())
            .with_updates(AllowedUpdates::new().allow("age", ""));
        let input = UpdateInput {
            updates: vec![InputUpdate::new("age", 30)],
            ..UpdateInput::default()
        };
        assert_eq!(
            rules.parse(&input, &RuleValidator),
            Err(QueryError::NeedAtLeastOneSelector)
        );
    }

    #[test]
    fn update_is_translated() {
        let rules = UpdateRules::new(fields())
            .with_selectors(selectors())
            .with_updates(AllowedUpdates::new().allow("age", "min=0"));
        let input = UpdateInput {
            selectors: vec![InputSelector::new("name", "EQ", "Alice")],
            updates: vec![InputUpdate::new("age", 31)],
            upsert: true,
        };
        let parsed = rules.parse(&input, &RuleValidator).unwrap();
        assert_eq!(
            parsed.updates,
            vec![DbUpdate {
                field: "user_age".to_owned(),
                value: json!(31)
            }]
        );
        assert!(parsed.upsert);
    }

    #[test]
    fn delete_needs_selectors() {
        let rules = DeleteRules::new(fields()).with_selectors(selectors());
        assert_eq!(
            rules.parse(&DeleteInput::default(), &RuleValidator),
            Err(QueryError::NeedAtLeastOneSelector)
        );
    }

    #[test]
    fn delete_carries_limit_and_orders() {
        let rules = DeleteRules::new(fields())
            .with_selectors(selectors())
            .with_order_fields(["age"]);
        let input = DeleteInput {
            selectors: vec![InputSelector::new("age", "LT", 18)],
            orders: vec![Order::new("age", "DESC")],
            limit: Some(3),
        };
        let parsed = rules.parse(&input, &RuleValidator).unwrap();
        assert_eq!(parsed.delete_opts.limit, Some(3));
        assert_eq!(parsed.delete_opts.orders[0].field, "user_age");
        assert_eq!(parsed.delete_opts.orders[0].direction, Direction::Desc);
    }

    #[test]
    fn standard_inputs_decode_with_defaults() {
        let input: GetInput = serde_json::from_value(json!({
            "selectors": [{ "field": "name", "predicate": "EQ", "value": "Bob" }]
        }))
        .unwrap();
        assert_eq!(input.selectors.len(), 1);
        assert!(input.orders.is_empty());
        assert!(input.page.is_none());
        assert!(!input.get_count);
    }
}
