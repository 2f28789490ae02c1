//! MySQL/MariaDB introspection over `information_schema`.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::warn;

use crate::catalog::{ColumnType, Length};
use crate::config::ConnectionSettings;
use crate::connection::{Connection, Row};
use crate::dialect::{MySqlDialect, SqlDialect};
use crate::error::{ReconcileError, Result};
use crate::schema::{Column, ForeignKey, Grant, Index, Table};

use super::{live_default, CommandRunner, ExecutionMode, Introspector};

const TABLES_SQL: &str = "SELECT TABLE_NAME, TABLE_COMMENT FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE' ORDER BY TABLE_NAME";

const TABLE_SQL: &str = "SELECT TABLE_NAME, TABLE_COMMENT FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?";

const COLUMNS_SQL: &str = "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, EXTRA, \
     COLUMN_COMMENT, COLLATION_NAME FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY ORDINAL_POSITION";

const INDICES_SQL: &str = "SELECT INDEX_NAME, COLUMN_NAME, NON_UNIQUE FROM information_schema.STATISTICS \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND INDEX_NAME <> 'PRIMARY' \
     ORDER BY INDEX_NAME, SEQ_IN_INDEX";

const FOREIGN_KEYS_SQL: &str = "SELECT k.CONSTRAINT_NAME, k.COLUMN_NAME, k.REFERENCED_TABLE_NAME, \
     k.REFERENCED_COLUMN_NAME, r.UPDATE_RULE, r.DELETE_RULE \
     FROM information_schema.KEY_COLUMN_USAGE k \
     JOIN information_schema.REFERENTIAL_CONSTRAINTS r \
     ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME \
     AND r.TABLE_NAME = k.TABLE_NAME \
     WHERE k.TABLE_SCHEMA = ? AND k.TABLE_NAME = ? AND k.REFERENCED_TABLE_NAME IS NOT NULL \
     ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION";

const PRIMARY_KEY_SQL: &str = "SELECT COLUMN_NAME, ORDINAL_POSITION FROM information_schema.KEY_COLUMN_USAGE \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY' \
     ORDER BY ORDINAL_POSITION";

const CHECKS_SQL: &str = "SELECT c.CHECK_CLAUSE FROM information_schema.TABLE_CONSTRAINTS t \
     JOIN information_schema.CHECK_CONSTRAINTS c \
     ON c.CONSTRAINT_SCHEMA = t.CONSTRAINT_SCHEMA AND c.CONSTRAINT_NAME = t.CONSTRAINT_NAME \
     WHERE t.TABLE_SCHEMA = ? AND t.TABLE_NAME = ? AND t.CONSTRAINT_TYPE = 'CHECK'";

const GRANTS_SQL: &str = "SELECT GRANTEE, PRIVILEGE_TYPE, IS_GRANTABLE FROM information_schema.TABLE_PRIVILEGES \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? ORDER BY GRANTEE, PRIVILEGE_TYPE";

const DATABASE_SQL: &str =
    "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?";

/// Name MySQL gives every primary key constraint.
pub const PRIMARY_KEY_NAME: &str = "PRIMARY";

/// Introspector for MySQL and MariaDB.
pub struct MySqlIntrospector<'a, C: Connection> {
    runner: CommandRunner<'a, C>,
    dialect: MySqlDialect,
    database: String,
}

impl<'a, C: Connection> MySqlIntrospector<'a, C> {
    /// Creates an introspector managing `settings.database`.
    #[must_use]
    pub fn new(connection: C, settings: &ConnectionSettings, mode: ExecutionMode<'a>) -> Self {
        Self {
            runner: CommandRunner::new(connection, mode),
            dialect: MySqlDialect::with_parameters(&settings.parameters),
            database: settings.database.clone(),
        }
    }

    /// Releases the connection.
    #[must_use]
    pub fn into_inner(self) -> C {
        self.runner.into_inner()
    }

    async fn table_query(&mut self, sql: &str, table: &str) -> Result<Vec<Row>> {
        let params = [self.database.clone(), table.to_string()];
        self.runner.query(sql, &params).await
    }
}

fn column_type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*([a-z]+)\s*(?:\((.*)\))?").expect("column type pattern is valid")
    })
}

fn current_timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^current_timestamp(?:\(\s*(\d*)\s*\))?$")
            .expect("current timestamp pattern is valid")
    })
}

fn json_check_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^\s*json_valid\(\s*`((?:[^`]|``)+)`\s*\)\s*$")
            .expect("json check pattern is valid")
    })
}

/// Maps an `information_schema.COLUMNS.COLUMN_TYPE` value such as
/// `int(11) unsigned` or `enum('a','b')` to a logical type and length.
pub(crate) fn parse_column_type(raw: &str) -> Result<(ColumnType, Option<Length>)> {
    let captures = column_type_pattern()
        .captures(raw)
        .ok_or_else(|| ReconcileError::Introspection(format!("unrecognised column type '{raw}'")))?;
    let name = captures[1].to_ascii_lowercase();
    let length = captures
        .get(2)
        .map(|m| m.as_str().parse::<Length>())
        .transpose()
        .map_err(ReconcileError::Introspection)?;

    let column_type = match name.as_str() {
        "tinyint" if length == Some(Length::Size(1)) => ColumnType::Bool,
        "tinyint" => ColumnType::TinyInt,
        "bool" | "boolean" => ColumnType::Bool,
        "smallint" => ColumnType::SmallInt,
        "mediumint" => ColumnType::MediumInt,
        "int" | "integer" => ColumnType::Int,
        "bigint" => ColumnType::BigInt,
        "decimal" | "numeric" => ColumnType::Decimal,
        "float" => ColumnType::Float,
        "double" | "real" => ColumnType::Double,
        "bit" => ColumnType::Bit,
        "binary" => ColumnType::Binary,
        "varbinary" => ColumnType::VarBinary,
        "tinyblob" => ColumnType::TinyBlob,
        "blob" => ColumnType::Blob,
        "mediumblob" => ColumnType::MediumBlob,
        "longblob" => ColumnType::LongBlob,
        "char" => ColumnType::Char,
        "varchar" => ColumnType::VarChar,
        "tinytext" => ColumnType::TinyText,
        "text" => ColumnType::Text,
        "mediumtext" => ColumnType::MediumText,
        "longtext" => ColumnType::LongText,
        "enum" => ColumnType::Enum,
        "set" => ColumnType::Set,
        "json" => ColumnType::Json,
        "date" => ColumnType::Date,
        "datetime" => ColumnType::DateTime,
        "time" => ColumnType::Time,
        "timestamp" => ColumnType::Timestamp,
        "year" => ColumnType::Year,
        "geometry" => ColumnType::Geometry,
        "geometrycollection" => ColumnType::GeometryCollection,
        "linestring" => ColumnType::LineString,
        "multilinestring" => ColumnType::MultiLineString,
        "multipoint" => ColumnType::MultiPoint,
        "multipolygon" => ColumnType::MultiPolygon,
        "point" => ColumnType::Point,
        "polygon" => ColumnType::Polygon,
        other => {
            return Err(ReconcileError::Introspection(format!(
                "unsupported MySQL column type '{other}'"
            )))
        }
    };

    // Temporal types report fractional-second precision, blobs never carry a length.
    let length = match column_type {
        ColumnType::Date
        | ColumnType::DateTime
        | ColumnType::Time
        | ColumnType::Timestamp
        | ColumnType::Json
        | ColumnType::TinyBlob
        | ColumnType::Blob
        | ColumnType::MediumBlob
        | ColumnType::LongBlob
        | ColumnType::TinyText
        | ColumnType::Text
        | ColumnType::MediumText
        | ColumnType::LongText
        | ColumnType::Float
        | ColumnType::Double => None,
        _ => length,
    };
    Ok((column_type, length))
}

/// Whether a `COLUMN_TYPE` value carries the `unsigned` attribute.
fn is_unsigned(raw: &str) -> bool {
    raw.split_whitespace()
        .any(|word| word.eq_ignore_ascii_case("unsigned"))
}

/// MariaDB quotes string defaults, reports a missing default as `NULL` and
/// writes `current_timestamp()` where MySQL writes `CURRENT_TIMESTAMP`.
fn mariadb_default(raw: &str, nullable: bool) -> Option<String> {
    if nullable && raw.eq_ignore_ascii_case("null") {
        return None;
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return Some(raw[1..raw.len() - 1].replace("''", "'"));
    }
    if let Some(captures) = current_timestamp_pattern().captures(raw.trim()) {
        let precision = captures.get(1).map_or("", |m| m.as_str());
        return Some(if precision.is_empty() {
            "CURRENT_TIMESTAMP".to_string()
        } else {
            format!("CURRENT_TIMESTAMP({precision})")
        });
    }
    Some(raw.to_string())
}

/// Columns that MariaDB stores as `longtext` behind a `json_valid` check.
fn json_columns(rows: &[Row]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get("check_clause"))
        .filter_map(|clause| json_check_pattern().captures(clause))
        .map(|captures| captures[1].replace("``", "`"))
        .collect()
}

/// Builds a column from one `information_schema.COLUMNS` row.
pub(crate) fn column_from_row(row: &Row) -> Result<Column> {
    let name = row.require("column_name")?;
    let raw_type = row.require("column_type")?;
    let (column_type, length) = parse_column_type(raw_type)?;
    let nullable = row.get_bool("is_nullable");
    let identity = row
        .get("extra")
        .is_some_and(|extra| extra.to_ascii_lowercase().contains("auto_increment"));

    let mut column = Column::new(name, column_type).nullable(nullable);
    column.length = length;
    column.unsigned = column_type.is_numeric() && is_unsigned(raw_type);
    column.identity = identity;
    if !identity {
        column.default = row
            .get("column_default")
            .and_then(|raw| mariadb_default(raw, nullable))
            .map(|raw| live_default(column_type, &raw));
    }
    column.comment = row.get("column_comment").unwrap_or_default().to_string();
    column.collation = row.get("collation_name").map(str::to_string);
    Ok(column)
}

#[async_trait]
impl<'a, C: Connection> Introspector for MySqlIntrospector<'a, C> {
    fn dialect(&self) -> &dyn SqlDialect {
        &self.dialect
    }

    fn is_dry_run(&self) -> bool {
        self.runner.is_dry_run()
    }

    fn database_name(&self) -> &str {
        &self.database
    }

    async fn execute(&mut self, command: &str) -> Result<bool> {
        self.runner.execute(command).await
    }

    async fn query(&mut self, sql: &str, params: &[String]) -> Result<Vec<Row>> {
        self.runner.query(sql, params).await
    }

    async fn list_tables(&mut self) -> Result<Vec<Table>> {
        let params = [self.database.clone()];
        let rows = self.runner.query(TABLES_SQL, &params).await?;
        rows.iter()
            .map(|row| {
                let mut table = Table::new(row.require("table_name")?);
                table.comment = Some(row.get("table_comment").unwrap_or_default().to_string());
                Ok(table)
            })
            .collect()
    }

    async fn get_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        let rows = self.table_query(COLUMNS_SQL, table).await?;
        let mut columns = rows
            .iter()
            .map(column_from_row)
            .collect::<Result<Vec<_>>>()?;

        if columns.iter().any(|c| c.column_type == ColumnType::LongText) {
            let checks = self.table_query(CHECKS_SQL, table).await?;
            let json = json_columns(&checks);
            for column in columns
                .iter_mut()
                .filter(|c| c.column_type == ColumnType::LongText && json.contains(&c.name))
            {
                column.column_type = ColumnType::Json;
                column.collation = None;
            }
        }
        Ok(columns)
    }

    async fn get_indices(&mut self, table: &str) -> Result<Vec<Index>> {
        let foreign_keys = self.get_foreign_keys(table).await?;
        let rows = self.table_query(INDICES_SQL, table).await?;

        let mut indices: Vec<Index> = Vec::new();
        for row in &rows {
            let name = row.require("index_name")?;
            let column = row.require("column_name")?.to_string();
            match indices.iter_mut().find(|i| i.name == name) {
                Some(index) => index.columns.push(column),
                None => {
                    let mut index = Index::new(name, [column]);
                    index.unique = row.get("non_unique") == Some("0");
                    indices.push(index);
                }
            }
        }
        // InnoDB backs a foreign key with an index of the same name and columns.
        indices.retain(|index| {
            !foreign_keys
                .get(&index.name)
                .is_some_and(|fk| fk.columns == index.columns)
        });
        Ok(indices)
    }

    async fn get_foreign_keys(&mut self, table: &str) -> Result<BTreeMap<String, ForeignKey>> {
        let rows = self.table_query(FOREIGN_KEYS_SQL, table).await?;

        let mut foreign_keys: BTreeMap<String, ForeignKey> = BTreeMap::new();
        for row in &rows {
            let name = row.require("constraint_name")?;
            let column = row.require("column_name")?.to_string();
            let referenced = row.require("referenced_column_name")?.to_string();
            if let Some(fk) = foreign_keys.get_mut(name) {
                fk.columns.push(column);
                fk.referenced_columns.push(referenced);
                continue;
            }
            let fk = ForeignKey::new(
                name,
                [column],
                row.require("referenced_table_name")?,
                [referenced],
            )
            .on_delete(row.require("delete_rule")?.parse()?)
            .on_update(row.require("update_rule")?.parse()?);
            foreign_keys.insert(name.to_string(), fk);
        }
        Ok(foreign_keys)
    }

    async fn get_primary_key_columns(&mut self, table: &str) -> Result<BTreeMap<u32, String>> {
        let rows = self.table_query(PRIMARY_KEY_SQL, table).await?;
        let mut columns = BTreeMap::new();
        for (position, row) in rows.iter().enumerate() {
            let ordinal = match row.get_u32("ordinal_position")? {
                Some(ordinal) => ordinal,
                None => u32::try_from(position + 1).unwrap_or(u32::MAX),
            };
            columns.insert(ordinal, row.require("column_name")?.to_string());
        }
        Ok(columns)
    }

    async fn get_primary_key_name(&mut self, table: &str) -> Result<String> {
        if self.get_primary_key_columns(table).await?.is_empty() {
            Ok(String::new())
        } else {
            Ok(PRIMARY_KEY_NAME.to_string())
        }
    }

    async fn get_grants(&mut self, table: &str) -> Result<BTreeMap<String, Grant>> {
        let rows = self.table_query(GRANTS_SQL, table).await?;
        let mut grants: BTreeMap<String, Grant> = BTreeMap::new();
        for row in &rows {
            let principal = row.require("grantee")?.to_string();
            let grant = grants.entry(principal.clone()).or_insert_with(|| Grant {
                principal,
                privileges: Default::default(),
                grantable: false,
            });
            grant
                .privileges
                .insert(row.require("privilege_type")?.to_ascii_uppercase());
            grant.grantable |= row.get_bool("is_grantable");
        }
        Ok(grants)
    }

    async fn get_table_comment(&mut self, table: &str) -> Result<String> {
        let rows = self.table_query(TABLE_SQL, table).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("table_comment"))
            .unwrap_or_default()
            .to_string())
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        Ok(!self.table_query(TABLE_SQL, table).await?.is_empty())
    }

    async fn database_exists(&mut self) -> Result<bool> {
        let params = [self.database.clone()];
        Ok(!self.runner.query(DATABASE_SQL, &params).await?.is_empty())
    }

    async fn select_database(&mut self) -> Result<bool> {
        if !self.database_exists().await? {
            warn!(database = %self.database, "Database does not exist");
            return Ok(false);
        }
        let statement = format!("USE {}", self.dialect.quote_identifier(&self.database));
        self.runner.execute_session(&statement).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Value;

    #[test]
    fn test_parse_column_type() {
        assert_eq!(
            parse_column_type("int(11)").unwrap(),
            (ColumnType::Int, Some(Length::Size(11)))
        );
        assert_eq!(
            parse_column_type("int unsigned").unwrap(),
            (ColumnType::Int, None)
        );
        assert!(is_unsigned("int(10) UNSIGNED zerofill"));
        assert!(!is_unsigned("int(11)"));
        assert_eq!(
            parse_column_type("tinyint(1)").unwrap(),
            (ColumnType::Bool, Some(Length::Size(1)))
        );
        assert_eq!(
            parse_column_type("decimal(8,2)").unwrap(),
            (ColumnType::Decimal, Some(Length::Precision(8, 2)))
        );
        assert_eq!(
            parse_column_type("enum('draft','it''s')").unwrap(),
            (ColumnType::Enum, Some(Length::values(["draft", "it's"])))
        );
        assert_eq!(
            parse_column_type("datetime(6)").unwrap(),
            (ColumnType::DateTime, None)
        );
        assert!(parse_column_type("hyperloglog").is_err());
    }

    #[test]
    fn test_column_from_row() {
        let row = Row::new()
            .with("COLUMN_NAME", Some("title"))
            .with("COLUMN_TYPE", Some("varchar(120)"))
            .with("IS_NULLABLE", Some("NO"))
            .with("COLUMN_DEFAULT", Some("untitled"))
            .with("EXTRA", Some(""))
            .with("COLUMN_COMMENT", Some("shown in lists"))
            .with("COLLATION_NAME", Some("utf8mb4_unicode_ci"));

        let column = column_from_row(&row).unwrap();
        assert_eq!(
            column,
            Column::new("title", ColumnType::VarChar)
                .length(120)
                .not_null()
                .default_value("untitled")
                .comment("shown in lists")
                .with_collation("utf8mb4_unicode_ci")
        );
    }

    #[test]
    fn test_auto_increment_is_identity() {
        let row = Row::new()
            .with("COLUMN_NAME", Some("id"))
            .with("COLUMN_TYPE", Some("int(11)"))
            .with("IS_NULLABLE", Some("NO"))
            .with("COLUMN_DEFAULT", None)
            .with("EXTRA", Some("auto_increment"));

        let column = column_from_row(&row).unwrap();
        assert!(column.identity);
        assert_eq!(column.default, None);
    }

    #[test]
    fn test_mariadb_defaults_are_unquoted() {
        let quoted = Row::new()
            .with("COLUMN_NAME", Some("status"))
            .with("COLUMN_TYPE", Some("varchar(16)"))
            .with("IS_NULLABLE", Some("YES"))
            .with("COLUMN_DEFAULT", Some("'new'"));
        assert_eq!(
            column_from_row(&quoted).unwrap().default,
            Some(Value::Text("new".into()))
        );

        let null = Row::new()
            .with("COLUMN_NAME", Some("note"))
            .with("COLUMN_TYPE", Some("text"))
            .with("IS_NULLABLE", Some("YES"))
            .with("COLUMN_DEFAULT", Some("NULL"));
        assert_eq!(column_from_row(&null).unwrap().default, None);

        let number = Row::new()
            .with("COLUMN_NAME", Some("n"))
            .with("COLUMN_TYPE", Some("int(11)"))
            .with("IS_NULLABLE", Some("NO"))
            .with("COLUMN_DEFAULT", Some("0"));
        assert_eq!(
            column_from_row(&number).unwrap().default,
            Some(Value::Integer(0))
        );
    }

    #[test]
    fn test_unsigned_is_read() {
        let row = Row::new()
            .with("COLUMN_NAME", Some("hits"))
            .with("COLUMN_TYPE", Some("int(10) unsigned"))
            .with("IS_NULLABLE", Some("NO"))
            .with("COLUMN_DEFAULT", Some("0"));

        let column = column_from_row(&row).unwrap();
        assert!(column.unsigned);
        assert_eq!(column.length, Some(Length::Size(10)));
    }

    #[test]
    fn test_mariadb_current_timestamp() {
        assert_eq!(
            mariadb_default("current_timestamp()", false).as_deref(),
            Some("CURRENT_TIMESTAMP")
        );
        assert_eq!(
            mariadb_default("current_timestamp(3)", false).as_deref(),
            Some("CURRENT_TIMESTAMP(3)")
        );
        assert_eq!(
            mariadb_default("CURRENT_TIMESTAMP", false).as_deref(),
            Some("CURRENT_TIMESTAMP")
        );
        assert_eq!(
            mariadb_default("'current_timestamp()'", false).as_deref(),
            Some("current_timestamp()")
        );
    }

    #[test]
    fn test_json_checks() {
        let rows = vec![
            Row::new().with("CHECK_CLAUSE", Some("json_valid(`payload`)")),
            Row::new().with("CHECK_CLAUSE", Some("`qty` > 0")),
            Row::new().with("CHECK_CLAUSE", Some("JSON_VALID(`odd``name`)")),
        ];
        assert_eq!(json_columns(&rows), vec!["payload", "odd`name"]);
    }
}
