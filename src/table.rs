//! Flattened tabular view of heterogeneous JSON records.

use serde_json::{Map, Value};
use std::collections::HashSet;

/// Separator placed between the segments of a nested key path.
pub const PATH_SEPARATOR: &str = " > ";

/// Rows of flattened records with the union of their column paths.
///
/// Columns keep the order in which they were first encountered. A row
/// lacking a column (or holding `null` for it) counts as missing.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    known: HashSet<String>,
    rows: Vec<Map<String, Value>>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattens `record` and appends it as a new row.
    pub fn push_record(&mut self, record: &Map<String, Value>) {
        let mut row = Map::new();
        flatten_into(None, record, &mut row);

        for key in row.keys() {
            if !self.known.contains(key) {
                self.known.insert(key.clone());
                self.columns.push(key.clone());
            }
        }

        self.rows.push(row);
    }

    /// Column names in first-seen order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Yields the value of `column` for every row, `None` where missing.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = Option<&'a Value>> + 'a {
        self.rows
            .iter()
            .map(move |row| row.get(column).filter(|value| !value.is_null()))
    }
}

/// Nested objects become `parent > child` keys; everything else is a leaf.
/// An empty nested object contributes no column.
fn flatten_into(prefix: Option<&str>, object: &Map<String, Value>, out: &mut Map<String, Value>) {
    for (key, value) in object {
        let path = match prefix {
            Some(prefix) => format!("{prefix}{PATH_SEPARATOR}{key}"),
            None => key.clone(),
        };

        match value {
            Value::Object(nested) => flatten_into(Some(&path), nested, out),
            leaf => {
                out.insert(path, leaf.clone());
            }
        }
    }
}
