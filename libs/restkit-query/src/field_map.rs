use std::collections::HashMap;

/// Database location of an API field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub table: String,
    pub column: String,
}

/// API field name -> `(table, column)` dictionary.
///
/// Built once per resource and shared read-only by every endpoint that exposes it.
/// Keys are matched exactly.
#[derive(Clone, Debug, Default)]
pub struct FieldMap {
    map: HashMap<String, Column>,
}

impl FieldMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn insert(
        mut self,
        api_name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        self.map.insert(
            api_name.into(),
            Column {
                table: table.into(),
                column: column.into(),
            },
        );
        self
    }

    #[must_use]
    pub fn get(&self, api_name: &str) -> Option<&Column> {
        self.map.get(api_name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
