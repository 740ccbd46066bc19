//! In-memory users store evaluating translated query descriptors.

use std::cmp::Ordering;
use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use restkit_errors::{DUPLICATE_ENTRY, RaisedError};
use restkit_query::{
    DbOrder, DbSelector, DbUpdate, Direction, ParsedDeleteInput, ParsedGetInput,
    ParsedUpdateInput,
};
use serde_json::Value;
use uuid::Uuid;

use crate::model::{NewUser, User};

pub const USER_TABLE: &str = "user";

const COLUMNS: [&str; 6] = ["id", "name", "age", "email", "created_at", "updated_at"];

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("user '{0}' already exists")]
    Duplicate(String),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("invalid value for column '{column}': {value}")]
    InvalidValue { column: String, value: Value },

    #[error("unsupported predicate '{0}'")]
    UnsupportedPredicate(String),
}

impl From<StoreError> for RaisedError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(name) => DUPLICATE_ENTRY
                .with_message(format!("user '{name}' already exists"))
                .with_data(name)
                .into(),
            other => RaisedError::Opaque(anyhow::Error::new(other)),
        }
    }
}

#[async_trait]
pub trait UsersRepository: Send + Sync {
    async fn count(&self, selectors: &[DbSelector]) -> Result<u64, StoreError>;

    async fn list(&self, query: &ParsedGetInput) -> Result<Vec<User>, StoreError>;

    /// Fails with [`StoreError::Duplicate`] when the name is taken.
    async fn insert(&self, new: NewUser) -> Result<User, StoreError>;

    /// Returns the number of rows changed (or created, for an upsert).
    async fn update(&self, input: &ParsedUpdateInput) -> Result<u64, StoreError>;

    async fn delete(&self, input: &ParsedDeleteInput) -> Result<u64, StoreError>;
}

/// Users kept in a vector behind a lock. Names are unique.
#[derive(Debug, Default)]
pub struct InMemoryUsers {
    rows: RwLock<Vec<User>>,
}

impl InMemoryUsers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn count_rows(&self, selectors: &[DbSelector]) -> Result<u64, StoreError> {
        let rows = self.rows.read();
        let mut n = 0_u64;
        for user in rows.iter() {
            if matches(user, selectors)? {
                n += 1;
            }
        }
        Ok(n)
    }

    fn list_rows(&self, query: &ParsedGetInput) -> Result<Vec<User>, StoreError> {
        let mut found = self.select(&query.selectors)?;
        sort(&mut found, &query.orders)?;

        let offset = usize::try_from(query.page.offset).unwrap_or(usize::MAX);
        // 0 means no limit
        let limit = match query.page.limit {
            0 => usize::MAX,
            n => usize::try_from(n).unwrap_or(usize::MAX),
        };
        Ok(found.into_iter().skip(offset).take(limit).collect())
    }

    fn select(&self, selectors: &[DbSelector]) -> Result<Vec<User>, StoreError> {
        let rows = self.rows.read();
        let mut found = Vec::new();
        for user in rows.iter() {
            if matches(user, selectors)? {
                found.push(user.clone());
            }
        }
        Ok(found)
    }

    fn insert_row(&self, new: NewUser) -> Result<User, StoreError> {
        let mut rows = self.rows.write();
        if rows.iter().any(|u| u.name == new.name) {
            return Err(StoreError::Duplicate(new.name));
        }
        let user = User::new(new);
        rows.push(user.clone());
        tracing::debug!(id = %user.id, name = %user.name, "User created");
        Ok(user)
    }

    fn update_rows(&self, input: &ParsedUpdateInput) -> Result<u64, StoreError> {
        let mut rows = self.rows.write();
        let mut next = rows.clone();
        let now = Utc::now();
        let mut changed = 0_u64;

        for user in &mut next {
            if matches(user, &input.selectors)? {
                for update in &input.updates {
                    apply(user, update)?;
                }
                user.updated_at = now;
                changed += 1;
            }
        }

        if changed == 0 && input.upsert {
            next.push(upsert_row(input)?);
            changed = 1;
        }

        ensure_unique_names(&next)?;
        *rows = next;
        Ok(changed)
    }

    fn delete_rows(&self, input: &ParsedDeleteInput) -> Result<u64, StoreError> {
        let mut rows = self.rows.write();
        let mut victims = Vec::new();
        for user in rows.iter() {
            if matches(user, &input.selectors)? {
                victims.push(user.clone());
            }
        }
        sort(&mut victims, &input.delete_opts.orders)?;
        if let Some(limit) = input.delete_opts.limit {
            victims.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        let ids: HashSet<Uuid> = victims.iter().map(|u| u.id).collect();
        rows.retain(|u| !ids.contains(&u.id));
        Ok(u64::try_from(ids.len()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl UsersRepository for InMemoryUsers {
    async fn count(&self, selectors: &[DbSelector]) -> Result<u64, StoreError> {
        self.count_rows(selectors)
    }

    async fn list(&self, query: &ParsedGetInput) -> Result<Vec<User>, StoreError> {
        self.list_rows(query)
    }

    async fn insert(&self, new: NewUser) -> Result<User, StoreError> {
        self.insert_row(new)
    }

    async fn update(&self, input: &ParsedUpdateInput) -> Result<u64, StoreError> {
        self.update_rows(input)
    }

    async fn delete(&self, input: &ParsedDeleteInput) -> Result<u64, StoreError> {
        self.delete_rows(input)
    }
}

/// A row created by an upsert: `=` selectors seed the columns, then updates apply.
fn upsert_row(input: &ParsedUpdateInput) -> Result<User, StoreError> {
    let mut user = User::new(NewUser::default());
    let seeds = input
        .selectors
        .iter()
        .filter(|s| s.predicate == "=")
        .map(|s| DbUpdate {
            field: s.field.clone(),
            value: s.value.clone(),
        });
    for update in seeds.chain(input.updates.iter().cloned()) {
        apply(&mut user, &update)?;
    }
    if user.name.is_empty() {
        return Err(StoreError::InvalidValue {
            column: "name".to_owned(),
            value: Value::String(String::new()),
        });
    }
    Ok(user)
}

fn ensure_unique_names(rows: &[User]) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for user in rows {
        if !seen.insert(user.name.as_str()) {
            return Err(StoreError::Duplicate(user.name.clone()));
        }
    }
    Ok(())
}

fn check_column(table: &str, column: &str) -> Result<(), StoreError> {
    if table != USER_TABLE {
        return Err(StoreError::UnknownTable(table.to_owned()));
    }
    if !COLUMNS.contains(&column) {
        return Err(StoreError::UnknownColumn(column.to_owned()));
    }
    Ok(())
}

fn column(user: &User, name: &str) -> Value {
    match name {
        "id" => Value::String(user.id.to_string()),
        "name" => Value::String(user.name.clone()),
        "age" => Value::from(user.age),
        "email" => Value::String(user.email.clone()),
        "created_at" => Value::String(user.created_at.to_rfc3339()),
        "updated_at" => Value::String(user.updated_at.to_rfc3339()),
        _ => Value::Null,
    }
}

fn matches(user: &User, selectors: &[DbSelector]) -> Result<bool, StoreError> {
    for selector in selectors {
        check_column(&selector.table, &selector.field)?;
        let actual = column(user, &selector.field);
        if !eval(&actual, selector.predicate, &selector.value)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn eval(actual: &Value, predicate: &str, expected: &Value) -> Result<bool, StoreError> {
    let ord = compare(actual, expected);
    Ok(match predicate {
        "=" => ord == Some(Ordering::Equal),
        "!=" => ord != Some(Ordering::Equal),
        ">" => ord == Some(Ordering::Greater),
        ">=" => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        "<" => ord == Some(Ordering::Less),
        "<=" => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        "IN" => in_list(actual, expected),
        "NOT IN" => !in_list(actual, expected),
        other => return Err(StoreError::UnsupportedPredicate(other.to_owned())),
    })
}

fn in_list(actual: &Value, expected: &Value) -> bool {
    match expected {
        Value::Array(items) => items
            .iter()
            .any(|v| compare(actual, v) == Some(Ordering::Equal)),
        single => compare(actual, single) == Some(Ordering::Equal),
    }
}

/// Strings compare as text unless one side is a number; numeric text then counts
/// as a number.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => number(a)?.partial_cmp(&number(b)?),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn sort(rows: &mut [User], orders: &[DbOrder]) -> Result<(), StoreError> {
    for order in orders {
        check_column(&order.table, &order.field)?;
    }
    rows.sort_by(|a, b| {
        for order in orders {
            let ord = compare(&column(a, &order.field), &column(b, &order.field))
                .unwrap_or(Ordering::Equal);
            let ord = match order.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn apply(user: &mut User, update: &DbUpdate) -> Result<(), StoreError> {
    let invalid = || StoreError::InvalidValue {
        column: update.field.clone(),
        value: update.value.clone(),
    };
    match update.field.as_str() {
        "name" => user.name = update.value.as_str().ok_or_else(invalid)?.to_owned(),
        "email" => user.email = update.value.as_str().ok_or_else(invalid)?.to_owned(),
        "age" => {
            user.age = update
                .value
                .as_u64()
                .or_else(|| update.value.as_str()?.trim().parse().ok())
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(invalid)?;
        }
        other => return Err(StoreError::UnknownColumn(other.to_owned())),
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use restkit_query::{DeleteOptions, Page};
    use serde_json::json;

    fn sel(field: &str, predicate: &'static str, value: Value) -> DbSelector {
        DbSelector {
            table: USER_TABLE.to_owned(),
            field: field.to_owned(),
            predicate,
            value,
        }
    }

    fn order(field: &str, direction: Direction) -> DbOrder {
        DbOrder {
            table: USER_TABLE.to_owned(),
            field: field.to_owned(),
            direction,
        }
    }

    fn seeded() -> InMemoryUsers {
        let store = InMemoryUsers::new();
        for (name, age) in [("ann", 31), ("bob", 17), ("cid", 45), ("dee", 17)] {
            store
                .insert_row(NewUser {
                    name: name.to_owned(),
                    age,
                    email: format!("{name}@example.com"),
                })
                .unwrap();
        }
        store
    }

    fn names(users: &[User]) -> Vec<&str> {
        users.iter().map(|u| u.name.as_str()).collect()
    }

    fn get(selectors: Vec<DbSelector>, orders: Vec<DbOrder>, page: Page) -> ParsedGetInput {
        ParsedGetInput {
            orders,
            selectors,
            page,
            get_count: false,
        }
    }

    #[tokio::test]
    async fn list_filters_sorts_and_pages() {
        let store = seeded();
        let query = get(
            vec![sel("age", ">", json!("20"))],
            vec![order("age", Direction::Desc)],
            Page::new(0, 0),
        );
        assert_eq!(names(&store.list(&query).await.unwrap()), vec!["cid", "ann"]);

        let query = get(
            vec![],
            vec![order("age", Direction::Asc), order("name", Direction::Desc)],
            Page::new(1, 2),
        );
        assert_eq!(names(&store.list(&query).await.unwrap()), vec!["bob", "ann"]);
    }

    #[tokio::test]
    async fn set_predicates() {
        let store = seeded();
        assert_eq!(
            store
                .count(&[sel("name", "IN", json!(["ann", "dee", "zed"]))])
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            store.count(&[sel("name", "NOT IN", json!(["ann"]))]).await.unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn unknown_columns_are_errors() {
        let store = seeded();
        let err = store.count(&[sel("salary", "=", json!(1))]).await.unwrap_err();
        assert_eq!(err, StoreError::UnknownColumn("salary".to_owned()));
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let store = seeded();
        let err = store
            .insert(NewUser {
                name: "ann".to_owned(),
                ..NewUser::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Duplicate("ann".to_owned()));

        let rename = ParsedUpdateInput {
            selectors: vec![sel("name", "=", json!("bob"))],
            updates: vec![DbUpdate {
                field: "name".to_owned(),
                value: json!("ann"),
            }],
            upsert: false,
        };
        assert!(matches!(
            store.update(&rename).await,
            Err(StoreError::Duplicate(_))
        ));
        // nothing was committed
        assert_eq!(store.count(&[sel("name", "=", json!("bob"))]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_and_upsert() {
        let store = seeded();
        let input = ParsedUpdateInput {
            selectors: vec![sel("age", "=", json!(17))],
            updates: vec![DbUpdate {
                field: "age".to_owned(),
                value: json!(18),
            }],
            upsert: false,
        };
        assert_eq!(store.update(&input).await.unwrap(), 2);
        assert_eq!(store.count(&[sel("age", "=", json!(18))]).await.unwrap(), 2);

        let upsert = ParsedUpdateInput {
            selectors: vec![sel("name", "=", json!("eve"))],
            updates: vec![DbUpdate {
                field: "age".to_owned(),
                value: json!("22"),
            }],
            upsert: true,
        };
        assert_eq!(store.update(&upsert).await.unwrap(), 1);
        let eve = store
            .list(&get(vec![sel("name", "=", json!("eve"))], vec![], Page::default()))
            .await
            .unwrap();
        assert_eq!(eve[0].age, 22);
    }

    #[tokio::test]
    async fn delete_honours_order_and_limit() {
        let store = seeded();
        let input = ParsedDeleteInput {
            selectors: vec![sel("age", "<", json!(40))],
            delete_opts: DeleteOptions {
                limit: Some(2),
                orders: vec![order("name", Direction::Desc)],
            },
        };
        assert_eq!(store.delete(&input).await.unwrap(), 2);
        let left = store
            .list(&get(vec![], vec![order("name", Direction::Asc)], Page::default()))
            .await
            .unwrap();
        assert_eq!(names(&left), vec!["ann", "cid"]);
    }

    #[test]
    fn duplicate_maps_to_catalog_error() {
        let raised = RaisedError::from(StoreError::Duplicate("ann".to_owned()));
        assert_eq!(raised.id(), Some("DUPLICATE_ENTRY"));
        let opaque = RaisedError::from(StoreError::UnknownTable("x".to_owned()));
        assert!(opaque.id().is_none());
    }
}
