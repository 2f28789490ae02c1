//! Database connection abstraction.
//!
//! Introspectors only need two things from a connection: run a statement and
//! fetch rows of a catalog query. Rows come back as column name to optional
//! text, which keeps catalog parsing identical across drivers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::{MySqlConnection, PgConnection, Row as _};

use crate::error::{ReconcileError, Result};

/// One result row, keyed by column label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: BTreeMap<String, Option<String>>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column value.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: Option<&str>) -> Self {
        self.values
            .insert(column.into().to_ascii_lowercase(), value.map(str::to_string));
        self
    }

    /// Value of a column; `None` when the column is missing or NULL.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .get(&column.to_ascii_lowercase())
            .and_then(Option::as_deref)
    }

    /// Value of a column that must be present and not NULL.
    ///
    /// # Errors
    ///
    /// Fails when the column is missing or NULL.
    pub fn require(&self, column: &str) -> Result<&str> {
        self.get(column).ok_or_else(|| {
            ReconcileError::Introspection(format!("catalog row is missing '{column}'"))
        })
    }

    /// Integer value of a column.
    ///
    /// # Errors
    ///
    /// Fails when the value is not an unsigned integer.
    pub fn get_u32(&self, column: &str) -> Result<Option<u32>> {
        self.get(column)
            .map(|v| {
                v.trim().parse::<u32>().map_err(|_| {
                    ReconcileError::Introspection(format!(
                        "column '{column}' holds '{v}', expected an integer"
                    ))
                })
            })
            .transpose()
    }

    /// Boolean value of a column (`YES`/`NO`, `true`/`false`, `1`/`0`).
    #[must_use]
    pub fn get_bool(&self, column: &str) -> bool {
        matches!(
            self.get(column).map(str::to_ascii_lowercase).as_deref(),
            Some("yes" | "true" | "t" | "1")
        )
    }
}

/// A live database connection.
#[async_trait]
pub trait Connection: Send {
    /// Executes a statement, returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Runs a query with positional text parameters.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    async fn fetch_all(&mut self, sql: &str, params: &[String]) -> Result<Vec<Row>>;
}

macro_rules! decode_cell {
    ($row:expr, $index:expr, [$($ty:ty),+ $(,)?]) => {{
        let mut cell: Option<Option<String>> = None;
        $(
            if cell.is_none() {
                if let Ok(value) = $row.try_get::<Option<$ty>, _>($index) {
                    cell = Some(value.map(|v| v.to_string()));
                }
            }
        )+
        if cell.is_none() {
            if let Ok(value) = $row.try_get::<Option<Vec<u8>>, _>($index) {
                cell = Some(value.map(|v| String::from_utf8_lossy(&v).into_owned()));
            }
        }
        cell
    }};
}

fn mysql_row(row: &sqlx::mysql::MySqlRow) -> Result<Row> {
    use sqlx::Column as _;

    let mut out = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let cell = decode_cell!(row, index, [String, i64, u64, i32, u32, f64, bool]).ok_or_else(
            || ReconcileError::Introspection(format!("cannot decode column '{}'", column.name())),
        )?;
        out = out.with(column.name(), cell.as_deref());
    }
    Ok(out)
}

fn postgres_row(row: &sqlx::postgres::PgRow) -> Result<Row> {
    use sqlx::Column as _;

    let mut out = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let cell = decode_cell!(row, index, [String, i64, i32, i16, f64, f32, bool]).ok_or_else(
            || ReconcileError::Introspection(format!("cannot decode column '{}'", column.name())),
        )?;
        out = out.with(column.name(), cell.as_deref());
    }
    Ok(out)
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let result = sqlx::Executor::execute(&mut *self, sqlx::raw_sql(sql)).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[String]) -> Result<Vec<Row>> {
        let mut query = sqlx::query::<sqlx::MySql>(sql);
        for param in params {
            query = query.bind(param.as_str());
        }
        let rows = query.fetch_all(&mut *self).await?;
        rows.iter().map(mysql_row).collect()
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let result = sqlx::Executor::execute(&mut *self, sqlx::raw_sql(sql)).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[String]) -> Result<Vec<Row>> {
        let mut query = sqlx::query::<sqlx::Postgres>(sql);
        for param in params {
            query = query.bind(param.as_str());
        }
        let rows = query.fetch_all(&mut *self).await?;
        rows.iter().map(postgres_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let row = Row::new()
            .with("COLUMN_NAME", Some("id"))
            .with("COLUMN_DEFAULT", None);

        assert_eq!(row.get("column_name"), Some("id"));
        assert_eq!(row.get("column_default"), None);
        assert!(row.require("missing").is_err());
    }

    #[test]
    fn test_typed_accessors() {
        let row = Row::new()
            .with("position", Some("3"))
            .with("nullable", Some("YES"))
            .with("unique", Some("f"))
            .with("bad", Some("three"));

        assert_eq!(row.get_u32("position").unwrap(), Some(3));
        assert_eq!(row.get_u32("absent").unwrap(), None);
        assert!(row.get_u32("bad").is_err());
        assert!(row.get_bool("nullable"));
        assert!(!row.get_bool("unique"));
    }
}
