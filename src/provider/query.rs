//! Row query builder mirroring the provider's `from().select().eq()` chain.

use serde_json::{Map, Value};

/// One row as returned by the provider, keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowQuery {
    pub table: String,
    pub columns: String,
    pub filters: Vec<(String, String)>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    /// Comma separated column list, e.g. `"id, name"`.
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    /// Equality filter. Filters are combined with AND.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Selected column names, or `None` for `*`.
    pub fn column_names(&self) -> Option<Vec<&str>> {
        let cols: Vec<&str> = self
            .columns
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if cols.is_empty() || cols.contains(&"*") {
            None
        } else {
            Some(cols)
        }
    }
}
