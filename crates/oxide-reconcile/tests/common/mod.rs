#![allow(dead_code)]

use async_trait::async_trait;
use oxide_reconcile::connection::{Connection, Row};
use oxide_reconcile::error::{ReconcileError, Result};

struct Script {
    fragment: String,
    params: Vec<String>,
    rows: Vec<Row>,
}

/// Connection answering catalog queries from canned rows.
///
/// A query is answered by the first script whose fragment occurs in the SQL
/// and whose parameters are a prefix of the query parameters; unmatched
/// queries return no rows. Executed statements are recorded in order.
#[derive(Default)]
pub struct ScriptedConnection {
    scripts: Vec<Script>,
    fail_on: Option<String>,
    pub executed: Vec<String>,
    pub queries: Vec<String>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, fragment: &str, params: &[&str], rows: Vec<Row>) -> Self {
        self.scripts.push(Script {
            fragment: fragment.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            rows,
        });
        self
    }

    /// Makes every statement containing `fragment` fail.
    pub fn fail_on(mut self, fragment: &str) -> Self {
        self.fail_on = Some(fragment.to_string());
        self
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        if self.fail_on.as_deref().is_some_and(|f| sql.contains(f)) {
            return Err(ReconcileError::Introspection(format!("scripted failure: {sql}")));
        }
        self.executed.push(sql.to_string());
        Ok(0)
    }

    async fn fetch_all(&mut self, sql: &str, params: &[String]) -> Result<Vec<Row>> {
        self.queries.push(sql.to_string());
        Ok(self
            .scripts
            .iter()
            .find(|s| sql.contains(&s.fragment) && params.starts_with(&s.params))
            .map(|s| s.rows.clone())
            .unwrap_or_default())
    }
}

pub fn row(pairs: &[(&str, Option<&str>)]) -> Row {
    pairs
        .iter()
        .fold(Row::new(), |row, (column, value)| row.with(*column, *value))
}

// MySQL catalog fragments, matching the information_schema queries.
pub const MYSQL_DATABASE: &str = "information_schema.SCHEMATA";
pub const MYSQL_TABLES: &str = "TABLE_TYPE = 'BASE TABLE'";
pub const MYSQL_TABLE: &str = "information_schema.TABLES WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?";
pub const MYSQL_COLUMNS: &str = "information_schema.COLUMNS";
pub const MYSQL_INDICES: &str = "information_schema.STATISTICS";
pub const MYSQL_FOREIGN_KEYS: &str = "REFERENTIAL_CONSTRAINTS";
pub const MYSQL_PRIMARY_KEY: &str = "CONSTRAINT_NAME = 'PRIMARY'";
pub const MYSQL_GRANTS: &str = "TABLE_PRIVILEGES";
pub const MYSQL_CHECKS: &str = "information_schema.CHECK_CONSTRAINTS";

/// One `information_schema.COLUMNS` row.
pub fn mysql_column(
    name: &str,
    column_type: &str,
    nullable: bool,
    default: Option<&str>,
    extra: &str,
) -> Row {
    row(&[
        ("COLUMN_NAME", Some(name)),
        ("COLUMN_TYPE", Some(column_type)),
        ("IS_NULLABLE", Some(if nullable { "YES" } else { "NO" })),
        ("COLUMN_DEFAULT", default),
        ("EXTRA", Some(extra)),
        ("COLUMN_COMMENT", Some("")),
        ("COLLATION_NAME", None),
    ])
}

/// One `information_schema.STATISTICS` row.
pub fn mysql_index(name: &str, column: &str, unique: bool) -> Row {
    row(&[
        ("INDEX_NAME", Some(name)),
        ("COLUMN_NAME", Some(column)),
        ("NON_UNIQUE", Some(if unique { "0" } else { "1" })),
    ])
}

/// One foreign key column row.
pub fn mysql_foreign_key(
    name: &str,
    column: &str,
    referenced_table: &str,
    referenced_column: &str,
    on_delete: &str,
) -> Row {
    row(&[
        ("CONSTRAINT_NAME", Some(name)),
        ("COLUMN_NAME", Some(column)),
        ("REFERENCED_TABLE_NAME", Some(referenced_table)),
        ("REFERENCED_COLUMN_NAME", Some(referenced_column)),
        ("UPDATE_RULE", Some("NO ACTION")),
        ("DELETE_RULE", Some(on_delete)),
    ])
}

/// Live MySQL table served to the scripted connection.
pub struct MySqlTable<'a> {
    pub name: &'a str,
    pub columns: Vec<Row>,
    pub primary_key: &'a [&'a str],
    pub indices: Vec<Row>,
    pub foreign_keys: Vec<Row>,
}

impl<'a> MySqlTable<'a> {
    pub fn new(name: &'a str, columns: Vec<Row>) -> Self {
        Self {
            name,
            columns,
            primary_key: &[],
            indices: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }
}

/// A connection on MySQL database `database` holding `tables`.
pub fn mysql_catalog(database: &str, tables: Vec<MySqlTable<'_>>) -> ScriptedConnection {
    let listing = tables
        .iter()
        .map(|t| row(&[("TABLE_NAME", Some(t.name)), ("TABLE_COMMENT", Some(""))]))
        .collect();
    let mut connection = ScriptedConnection::new()
        .respond(
            MYSQL_DATABASE,
            &[database],
            vec![row(&[("SCHEMA_NAME", Some(database))])],
        )
        .respond(MYSQL_TABLES, &[database], listing);

    for table in tables {
        let pk_rows = table
            .primary_key
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let ordinal = (i + 1).to_string();
                row(&[
                    ("COLUMN_NAME", Some(*column)),
                    ("ORDINAL_POSITION", Some(ordinal.as_str())),
                ])
            })
            .collect();
        let params = [database, table.name];
        connection = connection
            .respond(
                MYSQL_TABLE,
                &params,
                vec![row(&[("TABLE_NAME", Some(table.name)), ("TABLE_COMMENT", Some(""))])],
            )
            .respond(MYSQL_COLUMNS, &params, table.columns)
            .respond(MYSQL_PRIMARY_KEY, &params, pk_rows)
            .respond(MYSQL_INDICES, &params, table.indices)
            .respond(MYSQL_FOREIGN_KEYS, &params, table.foreign_keys);
    }
    connection
}
