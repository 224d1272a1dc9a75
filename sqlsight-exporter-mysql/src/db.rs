//! Query execution seam between scrapers and the database.

use futures::future::BoxFuture;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Executor, MySqlPool, Row, ValueRef};

use crate::error::ScrapeError;

/// A result row with every column decoded as text.
///
/// Status and variable queries return loosely typed values, so scrapers
/// work on text and parse what they need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextRow {
    columns: Vec<(String, Option<String>)>,
}

impl TextRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column.
    pub fn with(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.push(name, value.map(str::to_string));
        self
    }

    /// Append a column.
    pub fn push(&mut self, name: impl Into<String>, value: Option<String>) {
        self.columns.push((name.into(), value));
    }

    /// Value of the named column (case-insensitive). `None` when the column
    /// is missing or NULL.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(column, _)| column.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.as_deref())
    }

    /// Value at a column position.
    pub fn value_at(&self, index: usize) -> Option<&str> {
        self.columns.get(index).and_then(|(_, value)| value.as_deref())
    }

    /// Iterate over `(column, value)` pairs in result order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.columns
            .iter()
            .map(|(column, value)| (column.as_str(), value.as_deref()))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, Option<String>)> for TextRow {
    fn from_iter<T: IntoIterator<Item = (String, Option<String>)>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// Something scrapers can run SQL against.
///
/// Implemented for [`MySqlPool`]; each call checks a connection out of the
/// pool, so concurrent scrapers share the pool safely.
pub trait QueryExecutor: Send + Sync {
    /// Run a query and return every row as text.
    fn fetch_rows<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<TextRow>, ScrapeError>>;

    /// Run a statement, discarding any result.
    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<(), ScrapeError>>;
}

impl QueryExecutor for MySqlPool {
    fn fetch_rows<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<Vec<TextRow>, ScrapeError>> {
        Box::pin(async move {
            // A bare &str runs over the text protocol, which also accepts
            // SHOW statements that cannot be prepared.
            let rows = self.fetch_all(sql).await?;
            Ok(rows.iter().map(decode_row).collect())
        })
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, Result<(), ScrapeError>> {
        Box::pin(async move {
            Executor::execute(self, sql).await?;
            Ok(())
        })
    }
}

fn decode_row(row: &MySqlRow) -> TextRow {
    row.columns()
        .iter()
        .map(|column| {
            let value = decode_text(row, column.ordinal());
            (column.name().to_string(), value)
        })
        .collect()
}

fn decode_text(row: &MySqlRow, index: usize) -> Option<String> {
    match row.try_get_raw(index) {
        Ok(raw) if !raw.is_null() => {}
        _ => return None,
    }

    if let Ok(text) = row.try_get::<String, _>(index) {
        return Some(text);
    }
    // Text protocol values are textual even when the column type is numeric
    if let Ok(text) = row.try_get_unchecked::<String, _>(index) {
        return Some(text);
    }
    row.try_get_unchecked::<Vec<u8>, _>(index)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_row_lookup_is_case_insensitive() {
        let row = TextRow::new()
            .with("Variable_name", Some("Uptime"))
            .with("Value", Some("42"));

        assert_eq!(row.get("variable_name"), Some("Uptime"));
        assert_eq!(row.get("VALUE"), Some("42"));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_text_row_null_values() {
        let row = TextRow::new()
            .with("Master_Host", Some("db1"))
            .with("Seconds_Behind_Master", None);

        assert_eq!(row.get("Seconds_Behind_Master"), None);
        assert_eq!(row.value_at(0), Some("db1"));
        assert_eq!(row.value_at(1), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_text_row_from_iter_preserves_order() {
        let row: TextRow = vec![
            ("b".to_string(), Some("2".to_string())),
            ("a".to_string(), Some("1".to_string())),
        ]
        .into_iter()
        .collect();

        let names: Vec<&str> = row.columns().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
