//! Client orders: validation against an allow-list, de-duplication and translation.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::QueryError;
use crate::field_map::FieldMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "ASC", alias = "ASCENDING")]
    Asc,
    #[serde(rename = "DESC", alias = "DESCENDING")]
    Desc,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASC" | "ASCENDING" => Ok(Self::Asc),
            "DESC" | "DESCENDING" => Ok(Self::Desc),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order as sent by the client. The direction is kept raw so that a bad spelling is
/// reported against the field rather than failing decoding of the whole input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub field: String,
    pub direction: String,
}

impl Order {
    pub fn new(field: impl Into<String>, direction: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: direction.into(),
        }
    }
}

/// Column-qualified order ready for the query builder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DbOrder {
    pub table: String,
    pub field: String,
    pub direction: Direction,
}

/// Validate, de-duplicate (first occurrence wins) and translate `orders`.
///
/// Any bad direction, field outside `allowed` or field without a mapping fails the
/// whole batch with `INVALID_ORDER_FIELD`.
pub fn translate_orders(
    orders: &[Order],
    allowed: &[String],
    fields: &FieldMap,
) -> Result<Vec<DbOrder>, QueryError> {
    let mut checked = Vec::with_capacity(orders.len());
    for order in orders {
        let Ok(direction) = order.direction.parse::<Direction>() else {
            return Err(QueryError::InvalidOrderField(order.field.clone()));
        };
        if !allowed.iter().any(|f| f == &order.field) {
            return Err(QueryError::InvalidOrderField(order.field.clone()));
        }
        checked.push((order.field.as_str(), direction));
    }

    let mut seen = HashSet::new();
    checked.retain(|(field, _)| seen.insert(*field));

    checked
        .into_iter()
        .map(|(field, direction)| {
            let col = fields
                .get(field)
                .ok_or_else(|| QueryError::InvalidOrderField(field.to_owned()))?;
            Ok(DbOrder {
                table: col.table.clone(),
                field: col.column.clone(),
                direction,
            })
        })
        .collect()
}
