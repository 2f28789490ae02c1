//! In-memory introspector.
//!
//! Holds a schema snapshot (typically loaded from a JSON dump of a live
//! database) and replays every operation applied to it, so a reconciliation
//! can be planned or rehearsed without a connection. Executed statements are
//! kept in order for inspection.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use crate::catalog::Dialect;
use crate::config::SchemaParameters;
use crate::connection::Row;
use crate::dialect::{self, SqlDialect};
use crate::error::{ReconcileError, Result};
use crate::operations::SchemaOperation;
use crate::schema::{Column, ForeignKey, Grant, Index, Schema, Table};
use crate::version;

use super::{ExecutionMode, Introspector, TableSnapshot};

/// Introspector backed by an in-memory [`Schema`].
pub struct MemoryIntrospector<'a> {
    schema: Schema,
    dialect: Box<dyn SqlDialect>,
    mode: ExecutionMode<'a>,
    database: String,
    executed: Vec<String>,
    versions: BTreeMap<(String, String), String>,
}

impl<'a> MemoryIntrospector<'a> {
    /// Creates an introspector over `schema`, rendering for `dialect`.
    #[must_use]
    pub fn new(schema: Schema, dialect: Dialect, mode: ExecutionMode<'a>) -> Self {
        Self::with_parameters(schema, dialect, &SchemaParameters::new(), mode)
    }

    /// Creates an introspector with explicit schema parameters.
    #[must_use]
    pub fn with_parameters(
        schema: Schema,
        dialect: Dialect,
        parameters: &SchemaParameters,
        mode: ExecutionMode<'a>,
    ) -> Self {
        Self {
            schema,
            dialect: dialect::for_dialect(dialect, parameters),
            mode,
            database: "memory".to_string(),
            executed: Vec::new(),
            versions: BTreeMap::new(),
        }
    }

    /// Current state of the snapshot.
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Consumes the introspector, returning the snapshot.
    #[must_use]
    pub fn into_schema(self) -> Schema {
        self.schema
    }

    /// Statements executed so far (empty in dry-run mode).
    #[must_use]
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.schema
            .get_table(name)
            .ok_or_else(|| ReconcileError::InvalidState(format!("Table '{name}' does not exist")))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.schema
            .get_table_mut(name)
            .ok_or_else(|| ReconcileError::InvalidState(format!("Table '{name}' does not exist")))
    }

    /// Applies a single operation to the snapshot.
    ///
    /// # Errors
    ///
    /// Fails when the operation names a table or column the snapshot lacks.
    pub fn apply_operation(&mut self, operation: &SchemaOperation) -> Result<()> {
        match operation {
            SchemaOperation::CreateTable { table } => {
                if self.schema.get_table(&table.name).is_some() {
                    return Err(ReconcileError::InvalidState(format!(
                        "Table '{}' already exists",
                        table.name
                    )));
                }
                let mut created = table.clone();
                created.columns = table.columns.iter().map(settled).collect();
                for column in &mut created.columns {
                    column.primary = created.primary_key.contains(&column.name);
                    column.nullable &= !column.primary;
                }
                created.comment = Some(table.comment.clone().unwrap_or_default());
                self.schema.tables.push(created);
            }

            SchemaOperation::AddColumn { table, column } => {
                let t = self.table_mut(table)?;
                if t.get_column(column.target_name()).is_some() {
                    return Err(ReconcileError::InvalidState(format!(
                        "Column '{}' already exists in table '{table}'",
                        column.target_name()
                    )));
                }
                let mut added = settled(column);
                added.identity = false;
                added.primary = false;
                t.columns.push(added);
            }

            SchemaOperation::DropColumn { table, column } => {
                let t = self.table_mut(table)?;
                let idx = column_position(t, &column.name)?;
                t.columns.remove(idx);
                t.primary_key.retain(|c| *c != column.name);
                for index in &mut t.indices {
                    index.columns.retain(|c| *c != column.name);
                }
                t.indices.retain(|i| !i.columns.is_empty());
            }

            SchemaOperation::ChangeColumn { table, column, .. } => {
                let t = self.table_mut(table)?;
                let idx = column_position(t, &column.name)?;
                let mut changed = settled(column);
                let previous_name = t.columns[idx].name.clone();
                changed.primary = t.primary_key.contains(&previous_name);
                if changed.name != previous_name {
                    rename_references(t, &previous_name, &changed.name);
                }
                t.columns[idx] = changed;
            }

            SchemaOperation::AddIdentity { table, column } => {
                let t = self.table_mut(table)?;
                let idx = column_position(t, column.target_name())?;
                t.columns[idx].identity = true;
            }

            SchemaOperation::DropPrimaryKey { table, .. } => {
                let t = self.table_mut(table)?;
                t.primary_key.clear();
                for column in &mut t.columns {
                    column.primary = false;
                }
            }

            SchemaOperation::AddPrimaryKey { table, columns } => {
                let t = self.table_mut(table)?;
                for name in columns {
                    column_position(t, name)?;
                }
                t.primary_key.clone_from(columns);
                for column in &mut t.columns {
                    column.primary = columns.contains(&column.name);
                    column.nullable &= !column.primary;
                }
            }

            SchemaOperation::CreateIndex { table, index } => {
                let t = self.table_mut(table)?;
                if t.get_index(&index.name).is_some() {
                    return Err(ReconcileError::InvalidState(format!(
                        "Index '{}' already exists in table '{table}'",
                        index.name
                    )));
                }
                t.indices.push(index.clone());
            }

            SchemaOperation::DropIndex { table, index } => {
                let t = self.table_mut(table)?;
                let idx = t
                    .indices
                    .iter()
                    .position(|i| i.name == index.name)
                    .ok_or_else(|| {
                        ReconcileError::InvalidState(format!(
                            "Index '{}' does not exist in table '{table}'",
                            index.name
                        ))
                    })?;
                t.indices.remove(idx);
            }

            SchemaOperation::AddForeignKey { table, foreign_key } => {
                self.table(&foreign_key.referenced_table)?;
                let t = self.table_mut(table)?;
                t.foreign_keys.push(foreign_key.clone());
            }

            SchemaOperation::DropForeignKey { table, foreign_key } => {
                let t = self.table_mut(table)?;
                let idx = t
                    .foreign_keys
                    .iter()
                    .position(|fk| fk.name == foreign_key.name)
                    .ok_or_else(|| {
                        ReconcileError::InvalidState(format!(
                            "Foreign key '{}' does not exist in table '{table}'",
                            foreign_key.name
                        ))
                    })?;
                t.foreign_keys.remove(idx);
            }

            SchemaOperation::SetTableComment { table, comment } => {
                self.table_mut(table)?.comment = Some(comment.clone());
            }
        }
        Ok(())
    }

    fn record(&mut self, command: &str) {
        match &mut self.mode {
            ExecutionMode::DryRun(buffer) => buffer.push(command.to_string()),
            ExecutionMode::Live => self.executed.push(command.to_string()),
        }
    }
}

/// A column as it exists once a pending rename has been carried out.
fn settled(column: &Column) -> Column {
    let mut settled = column.clone();
    if let Some(new_name) = settled.new_name.take() {
        settled.name = new_name;
    }
    settled
}

fn column_position(table: &Table, name: &str) -> Result<usize> {
    table
        .columns
        .iter()
        .position(|c| c.name == name)
        .ok_or_else(|| {
            ReconcileError::InvalidState(format!(
                "Column '{name}' does not exist in table '{}'",
                table.name
            ))
        })
}

fn rename_references(table: &mut Table, from: &str, to: &str) {
    let rename = |columns: &mut Vec<String>| {
        for column in columns.iter_mut().filter(|c| c.as_str() == from) {
            *column = to.to_string();
        }
    };
    rename(&mut table.primary_key);
    for index in &mut table.indices {
        rename(&mut index.columns);
    }
    for fk in &mut table.foreign_keys {
        rename(&mut fk.columns);
    }
}

#[async_trait]
impl<'a> Introspector for MemoryIntrospector<'a> {
    fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    fn is_dry_run(&self) -> bool {
        self.mode.is_dry_run()
    }

    fn database_name(&self) -> &str {
        &self.database
    }

    async fn execute(&mut self, command: &str) -> Result<bool> {
        debug!(sql = %command, "Recording SQL");
        self.record(command);
        Ok(true)
    }

    async fn query(&mut self, _sql: &str, _params: &[String]) -> Result<Vec<Row>> {
        Ok(Vec::new())
    }

    async fn list_tables(&mut self) -> Result<Vec<Table>> {
        let mut tables: Vec<Table> = self
            .schema
            .tables
            .iter()
            .map(|t| {
                let mut table = Table::new(&t.name);
                table.comment = Some(t.comment.clone().unwrap_or_default());
                table
            })
            .collect();
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    async fn get_columns(&mut self, table: &str) -> Result<Vec<Column>> {
        Ok(self.table(table)?.columns.clone())
    }

    async fn get_indices(&mut self, table: &str) -> Result<Vec<Index>> {
        Ok(self.table(table)?.indices.clone())
    }

    async fn get_foreign_keys(&mut self, table: &str) -> Result<BTreeMap<String, ForeignKey>> {
        Ok(self
            .table(table)?
            .foreign_keys
            .iter()
            .map(|fk| (fk.name.clone(), fk.clone()))
            .collect())
    }

    async fn get_primary_key_columns(&mut self, table: &str) -> Result<BTreeMap<u32, String>> {
        Ok((1..)
            .zip(self.table(table)?.primary_key.iter().cloned())
            .collect())
    }

    async fn get_primary_key_name(&mut self, table: &str) -> Result<String> {
        if self.table(table)?.primary_key.is_empty() {
            return Ok(String::new());
        }
        Ok(match self.dialect.kind() {
            Dialect::MySql => super::mysql::PRIMARY_KEY_NAME.to_string(),
            Dialect::Postgres => format!("{table}_pkey"),
        })
    }

    async fn get_grants(&mut self, table: &str) -> Result<BTreeMap<String, Grant>> {
        self.table(table)?;
        Ok(BTreeMap::new())
    }

    async fn get_table_comment(&mut self, table: &str) -> Result<String> {
        Ok(self.table(table)?.comment.clone().unwrap_or_default())
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        Ok(self.schema.get_table(table).is_some())
    }

    async fn database_exists(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn select_database(&mut self) -> Result<bool> {
        Ok(true)
    }

    async fn snapshot_table(&mut self, name: &str) -> Result<Option<TableSnapshot>> {
        let Some(table) = self.schema.get_table(name).cloned() else {
            return Ok(None);
        };
        let primary_key_name = self.get_primary_key_name(name).await?;
        Ok(Some(TableSnapshot {
            table,
            primary_key_name,
        }))
    }

    async fn apply(&mut self, operation: &SchemaOperation, statements: &[String]) -> Result<()> {
        for statement in statements {
            debug!(sql = %statement, "Recording SQL");
            self.record(statement);
        }
        if !self.is_dry_run() {
            self.apply_operation(operation)
                .map_err(|e| ReconcileError::execution(operation.table(), &statements.join("; "), e))?;
        }
        Ok(())
    }

    async fn get_version(&mut self, version_type: &str, key: &str, initial: &str) -> Result<String> {
        Ok(self
            .versions
            .get(&(version_type.to_string(), key.to_string()))
            .cloned()
            .unwrap_or_else(|| initial.to_string()))
    }

    async fn set_version(&mut self, version_type: &str, key: &str, value: &str) -> Result<()> {
        version::set_version(self, version_type, key, value).await?;
        if !self.is_dry_run() {
            self.versions
                .insert((version_type.to_string(), key.to_string()), value.to_string());
        }
        Ok(())
    }
}
