//! Live schema introspection.
//!
//! An [`Introspector`] reads the actual structure of a database and executes
//! the statements the reconciler produces. Dry-run is chosen when the
//! introspector is built: an [`ExecutionMode::DryRun`] borrows a caller-owned
//! buffer and every command is appended to it instead of reaching the
//! connection. Catalog reads always go to the live connection.

mod memory;
mod mysql;
mod postgres;

pub use memory::MemoryIntrospector;
pub use mysql::MySqlIntrospector;
pub use postgres::PostgresIntrospector;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tracing::debug;

use crate::admin;
use crate::catalog::ColumnType;
use crate::connection::{Connection, Row};
use crate::dialect::SqlDialect;
use crate::error::{ReconcileError, Result};
use crate::operations::SchemaOperation;
use crate::schema::{self, Column, ForeignKey, Grant, Index, Table, Value};
use crate::version;

/// Whether commands are executed or only recorded.
#[derive(Debug, Default)]
pub enum ExecutionMode<'a> {
    /// Commands are sent to the connection.
    #[default]
    Live,
    /// Commands are appended to the buffer; the connection is never mutated.
    DryRun(&'a mut Vec<String>),
}

impl<'a> ExecutionMode<'a> {
    /// Returns true in dry-run mode.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun(_))
    }
}

/// Connection plus execution mode, shared by the SQL introspectors.
pub struct CommandRunner<'a, C: Connection> {
    connection: C,
    mode: ExecutionMode<'a>,
}

impl<'a, C: Connection> CommandRunner<'a, C> {
    /// Wraps a connection.
    #[must_use]
    pub fn new(connection: C, mode: ExecutionMode<'a>) -> Self {
        Self { connection, mode }
    }

    /// Executes or records a command.
    ///
    /// # Errors
    ///
    /// Propagates connection errors.
    pub async fn execute(&mut self, command: &str) -> Result<bool> {
        match &mut self.mode {
            ExecutionMode::DryRun(buffer) => {
                debug!(sql = %command, "Recording SQL (dry run)");
                buffer.push(command.to_string());
            }
            ExecutionMode::Live => {
                debug!(sql = %command, "Executing SQL");
                self.connection.execute(command).await?;
            }
        }
        Ok(true)
    }

    /// Runs a session statement (`USE`, `SET search_path`) on the live
    /// connection. Session state is not stored structure, so dry-run does
    /// not record it.
    ///
    /// # Errors
    ///
    /// Propagates connection errors.
    pub async fn execute_session(&mut self, command: &str) -> Result<()> {
        debug!(sql = %command, "Executing session statement");
        self.connection.execute(command).await?;
        Ok(())
    }

    /// Runs a read-only query against the live connection.
    ///
    /// # Errors
    ///
    /// Propagates connection errors.
    pub async fn query(&mut self, sql: &str, params: &[String]) -> Result<Vec<Row>> {
        self.connection.fetch_all(sql, params).await
    }

    /// Returns true in dry-run mode.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.mode.is_dry_run()
    }

    /// Releases the connection.
    #[must_use]
    pub fn into_inner(self) -> C {
        self.connection
    }
}

/// Everything known about one live table, captured before any change.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    /// Columns, primary key and comment.
    pub table: Table,
    /// Name of the primary key constraint (empty when there is none).
    pub primary_key_name: String,
}

/// Reads live structure and executes commands.
#[async_trait]
pub trait Introspector: Send {
    /// Renderer matching the live engine.
    fn dialect(&self) -> &dyn SqlDialect;

    /// Returns true when commands are only recorded.
    fn is_dry_run(&self) -> bool;

    /// Executes a command, or appends it to the dry-run buffer.
    ///
    /// # Errors
    ///
    /// Propagates connection errors.
    async fn execute(&mut self, command: &str) -> Result<bool>;

    /// Runs a read-only query with positional parameters.
    ///
    /// # Errors
    ///
    /// Propagates connection errors.
    async fn query(&mut self, sql: &str, params: &[String]) -> Result<Vec<Row>>;

    /// Tables of the managed database (name and comment only).
    ///
    /// With `sorted`, tables referenced by foreign keys come before the
    /// tables referencing them; otherwise they are in name order.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be read.
    async fn get_tables(&mut self, sorted: bool) -> Result<Vec<Table>> {
        let tables = self.list_tables().await?;
        if !sorted {
            return Ok(tables);
        }
        let mut references = BTreeMap::new();
        for table in &tables {
            let targets: BTreeSet<String> = self
                .get_foreign_keys(&table.name)
                .await?
                .into_values()
                .map(|fk| fk.referenced_table)
                .collect();
            references.insert(table.name.clone(), targets);
        }
        let mut by_name: BTreeMap<String, Table> =
            tables.into_iter().map(|t| (t.name.clone(), t)).collect();
        Ok(schema::sort_by_dependencies(&references)
            .into_iter()
            .filter_map(|name| by_name.remove(&name))
            .collect())
    }

    /// Tables of the managed database in name order.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be read.
    async fn list_tables(&mut self) -> Result<Vec<Table>>;

    /// Columns of a table in ordinal order.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be read or reports an unknown type.
    async fn get_columns(&mut self, table: &str) -> Result<Vec<Column>>;

    /// Secondary indices of a table (primary key excluded).
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be read.
    async fn get_indices(&mut self, table: &str) -> Result<Vec<Index>>;

    /// Foreign keys of a table, keyed by constraint name.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be read or reports an unknown action.
    async fn get_foreign_keys(&mut self, table: &str) -> Result<BTreeMap<String, ForeignKey>>;

    /// Primary key columns keyed by their 1-based position in the key.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be read.
    async fn get_primary_key_columns(&mut self, table: &str) -> Result<BTreeMap<u32, String>>;

    /// Primary key constraint name, empty when the table has none.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be read.
    async fn get_primary_key_name(&mut self, table: &str) -> Result<String>;

    /// Table privileges keyed by principal.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be read.
    async fn get_grants(&mut self, table: &str) -> Result<BTreeMap<String, Grant>>;

    /// Table comment, empty when unset.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be read.
    async fn get_table_comment(&mut self, table: &str) -> Result<String>;

    /// Whether a table exists in the managed database.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be read.
    async fn table_exists(&mut self, table: &str) -> Result<bool>;

    /// Whether the managed database exists.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be read.
    async fn database_exists(&mut self) -> Result<bool>;

    /// Makes the managed database the session's current one.
    ///
    /// # Errors
    ///
    /// Fails when the catalog cannot be read or the session cannot switch.
    async fn select_database(&mut self) -> Result<bool>;

    /// Creates the managed database when missing, then selects it.
    ///
    /// # Errors
    ///
    /// Fails when the database cannot be created or selected.
    async fn create_and_select_database(&mut self) -> Result<bool> {
        if !self.database_exists().await? {
            let statement = self
                .dialect()
                .create_database_statement(self.database_name());
            self.execute(&statement).await?;
            if self.is_dry_run() {
                return Ok(false);
            }
        }
        self.select_database().await
    }

    /// Name of the managed database.
    fn database_name(&self) -> &str;

    /// Full live structure of a table, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Fails when any part of the table cannot be read.
    async fn snapshot_table(&mut self, name: &str) -> Result<Option<TableSnapshot>> {
        if !self.table_exists(name).await? {
            return Ok(None);
        }
        let mut table = Table::new(name);
        table.columns = self.get_columns(name).await?;
        table.primary_key = self
            .get_primary_key_columns(name)
            .await?
            .into_values()
            .collect();
        for column in &mut table.columns {
            column.primary = table.primary_key.contains(&column.name);
        }
        table.indices = self.get_indices(name).await?;
        table.foreign_keys = self.get_foreign_keys(name).await?.into_values().collect();
        let comment = self.get_table_comment(name).await?;
        table.comment = Some(comment);
        let primary_key_name = self.get_primary_key_name(name).await?;
        Ok(Some(TableSnapshot {
            table,
            primary_key_name,
        }))
    }

    /// Executes the statements rendered for one operation.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Execution`] for the first statement that fails.
    async fn apply(&mut self, operation: &SchemaOperation, statements: &[String]) -> Result<()> {
        for statement in statements {
            self.execute(statement)
                .await
                .map_err(|e| ReconcileError::execution(operation.table(), statement, e))?;
        }
        Ok(())
    }

    /// Stored version value, or `initial` when none is recorded.
    ///
    /// # Errors
    ///
    /// Fails when the version table cannot be read.
    async fn get_version(&mut self, version_type: &str, key: &str, initial: &str) -> Result<String> {
        version::get_version(self, version_type, key, initial).await
    }

    /// Records a version value, creating the tracking table on first use.
    ///
    /// # Errors
    ///
    /// Fails when the version table cannot be created or written.
    async fn set_version(&mut self, version_type: &str, key: &str, value: &str) -> Result<()> {
        version::set_version(self, version_type, key, value).await
    }

    /// Inserts or updates an administrative user row. Returns true when a
    /// row was written.
    async fn create_or_update_admin_user(
        &mut self,
        user_id_column: &str,
        table: &str,
        username_column: &str,
        username: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<bool> {
        admin::create_or_update_admin_user(
            self,
            user_id_column,
            table,
            username_column,
            username,
            params,
        )
        .await
    }
}

/// Interprets a default read from the catalog. Numbers are only recognised
/// for non string-like types and only when they print back unchanged.
pub(crate) fn live_default(column_type: ColumnType, raw: &str) -> Value {
    if !column_type.is_string_like() {
        if let Ok(integer) = raw.parse::<i64>() {
            if integer.to_string() == raw {
                return Value::Integer(integer);
            }
        }
        if let Ok(float) = raw.parse::<f64>() {
            if float.to_string() == raw {
                return Value::Float(float);
            }
        }
    }
    Value::Text(raw.to_string())
}

/// Splits `'a'::character varying` style defaults into their literal text.
pub(crate) fn unquote_default(raw: &str) -> String {
    let mut value = raw.trim();
    if let Some(stripped) = value.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        value = stripped.trim();
    }
    if value.starts_with('\'') {
        if let Some(end) = value.rfind('\'') {
            if end > 0 {
                return value[1..end].replace("''", "'");
            }
        }
    }
    match value.find("::") {
        Some(cast) => value[..cast].to_string(),
        None => value.to_string(),
    }
}
