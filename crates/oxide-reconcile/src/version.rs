//! Schema version marker stored inside the managed database.
//!
//! The marker lives in a small `(type, key) -> value` table. Reading never
//! creates anything; the table is created through the dialect renderer on the
//! first write.

use tracing::info;

use crate::catalog::ColumnType;
use crate::error::{ReconcileError, Result};
use crate::introspect::Introspector;
use crate::operations::SchemaOperation;
use crate::schema::{Column, Table, Value};

/// Name of the tracking table.
pub const VERSION_TABLE: &str = "schema_versions";

/// Version type used when the caller names none.
pub const DEFAULT_VERSION_TYPE: &str = "bs_schema";

/// Version key used when the caller names none.
pub const DEFAULT_VERSION_KEY: &str = "version_identifier";

/// Value reported before any version has been recorded.
pub const INITIAL_VERSION: &str = "v0.0.0";

/// Declaration of the tracking table.
#[must_use]
pub fn version_table() -> Table {
    Table::new(VERSION_TABLE)
        .column(Column::new("type", ColumnType::VarChar).length(64).primary_key())
        .column(Column::new("key", ColumnType::VarChar).length(128).primary_key())
        .column(Column::new("value", ColumnType::VarChar).length(255).not_null())
}

/// Reads the version recorded under `(version_type, key)`, falling back to
/// `initial` when the table or the row is absent.
///
/// # Errors
///
/// Fails when the version table exists but cannot be read.
pub async fn get_version<I>(
    introspector: &mut I,
    version_type: &str,
    key: &str,
    initial: &str,
) -> Result<String>
where
    I: Introspector + ?Sized,
{
    if !introspector.table_exists(VERSION_TABLE).await? {
        return Ok(initial.to_string());
    }

    let sql = {
        let d = introspector.dialect();
        format!(
            "SELECT {} FROM {} WHERE {} = {} AND {} = {}",
            d.quote_identifier("value"),
            d.quote_identifier(VERSION_TABLE),
            d.quote_identifier("type"),
            d.placeholder(1),
            d.quote_identifier("key"),
            d.placeholder(2)
        )
    };
    let rows = introspector
        .query(&sql, &[version_type.to_string(), key.to_string()])
        .await?;

    Ok(rows
        .first()
        .and_then(|row| row.get("value"))
        .map_or_else(|| initial.to_string(), str::to_string))
}

/// Records `value` under `(version_type, key)`, creating the tracking table
/// first when it does not exist.
///
/// # Errors
///
/// Fails when the version table cannot be created or written.
pub async fn set_version<I>(
    introspector: &mut I,
    version_type: &str,
    key: &str,
    value: &str,
) -> Result<()>
where
    I: Introspector + ?Sized,
{
    if !introspector.table_exists(VERSION_TABLE).await? {
        let operation = SchemaOperation::CreateTable {
            table: version_table(),
        };
        let statements = introspector.dialect().render(&operation)?;
        info!(table = VERSION_TABLE, "Creating version table");
        introspector.apply(&operation, &statements).await?;
    }

    let statement = introspector.dialect().upsert_statement(
        VERSION_TABLE,
        &[("type", Value::from(version_type)), ("key", Value::from(key))],
        &[("value", Value::from(value))],
    );
    introspector
        .execute(&statement)
        .await
        .map_err(|e| ReconcileError::execution(VERSION_TABLE, &statement, e))?;

    info!(version_type, key, value, "Recorded schema version");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MySqlDialect, PostgresDialect, SqlDialect};

    #[test]
    fn test_version_table_shape() {
        let table = version_table();
        assert_eq!(table.primary_key, vec!["type", "key"]);
        assert!(table.validate().is_ok());
        assert!(table.columns.iter().all(|c| !c.nullable));
    }

    #[test]
    fn test_version_table_ddl() {
        let mysql = MySqlDialect::new().create_table_statements(&version_table()).unwrap();
        assert_eq!(
            mysql,
            vec![concat!(
                "CREATE TABLE `schema_versions` (\n",
                "  `type` varchar(64) COLLATE utf8mb4_unicode_ci NOT NULL,\n",
                "  `key` varchar(128) COLLATE utf8mb4_unicode_ci NOT NULL,\n",
                "  `value` varchar(255) COLLATE utf8mb4_unicode_ci NOT NULL,\n",
                "  PRIMARY KEY (`type`, `key`)\n",
                ") ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci"
            )]
        );

        let pg = PostgresDialect::new().create_table_statements(&version_table()).unwrap();
        assert!(pg[0].starts_with("CREATE TABLE \"schema_versions\""));
        assert!(pg[0].contains("PRIMARY KEY (\"type\", \"key\")"));
    }
}
