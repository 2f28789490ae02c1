//! Database dialect implementations.
//!
//! Each dialect turns the logical schema model into engine specific DDL. The
//! renderers are pure: they never talk to a database, so every rendering and
//! consistency error surfaces before anything is executed.

mod mysql;
mod postgres;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;

use crate::catalog::{Dialect, Length, LengthRule, TypeCatalog};
use crate::codegen;
use crate::config::SchemaParameters;
use crate::error::{ReconcileError, Result};
use crate::operations::SchemaOperation;
use crate::schema::{Column, ForeignKey, Index, Table, Value};

/// Database specific DDL rendering.
pub trait SqlDialect: Send + Sync {
    /// Engine family.
    fn kind(&self) -> Dialect;

    /// Returns the dialect name.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Capability table for this dialect.
    fn catalog(&self) -> &TypeCatalog;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String;

    /// Quote a string literal.
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Bind parameter marker for the `index`th (1-based) parameter.
    fn placeholder(&self, index: usize) -> String;

    /// Whether `Length::Max` is accepted for sized string types.
    fn supports_max_length(&self) -> bool;

    /// Collation applied to collatable columns that declare none.
    fn default_collation(&self) -> Option<&str>;

    /// Renders a literal value.
    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Text(text) => self.quote_literal(text),
            other => other.to_string(),
        }
    }

    /// Renders the engine type including its length, e.g. `varchar(255)`.
    ///
    /// # Errors
    ///
    /// Fails for unsupported types and lengths the type does not accept.
    fn type_sql(&self, column: &Column) -> Result<String> {
        let name = self
            .catalog()
            .renders_as(column.column_type)
            .map_err(|e| e.for_column(column.target_name()))?;
        match resolved_length(self.catalog(), column)? {
            Some(Length::Max) if self.supports_max_length() => Ok(name.to_string()),
            Some(Length::Max) => Err(ReconcileError::InvalidLength {
                column: column.target_name().to_string(),
                column_type: column.column_type,
                message: format!("{} does not accept MAX", self.name()),
            }),
            Some(length) => Ok(format!("{name}({length})")),
            None => Ok(name.to_string()),
        }
    }

    /// Collation clause value for a column, if the type takes one.
    fn collation_for(&self, column: &Column) -> Option<String> {
        if !self.catalog().is_collatable(column.column_type) {
            return None;
        }
        column
            .collation
            .clone()
            .or_else(|| self.default_collation().map(str::to_string))
    }

    /// Renders the default value, quoted for string-like types and bare otherwise.
    fn default_sql(&self, column: &Column) -> Option<String> {
        column.default.as_ref().map(|value| {
            if column.column_type.is_string_like() {
                self.quote_literal(&value.to_string())
            } else {
                value.to_string()
            }
        })
    }

    /// Full column definition. The identity clause is only rendered when
    /// `identity` is true and the column is an identity column.
    ///
    /// # Errors
    ///
    /// Fails for unsupported types and lengths the type does not accept.
    fn column_definition(&self, column: &Column, identity: bool) -> Result<String>;

    /// Statement adding a column, never carrying the identity clause.
    ///
    /// # Errors
    ///
    /// Fails for unsupported types and lengths the type does not accept.
    fn add_column_statement(&self, table: &str, column: &Column) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(table),
            self.column_definition(column, false)?
        ))
    }

    /// Follow-up statement turning an existing column into an identity column.
    ///
    /// # Errors
    ///
    /// Fails for unsupported types and lengths the type does not accept.
    fn identity_statement(&self, table: &str, column: &Column) -> Result<String>;

    /// Statement dropping a column.
    fn drop_column_statement(&self, table: &str, column: &Column) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(table),
            self.quote_identifier(&column.name)
        )
    }

    /// Statements redefining a column in full, renaming it when requested.
    /// `previous` is the live definition being replaced.
    ///
    /// # Errors
    ///
    /// Fails for unsupported types and lengths the type does not accept.
    fn change_column_statements(
        &self,
        table: &str,
        column: &Column,
        previous: &Column,
    ) -> Result<Vec<String>>;

    /// Separate comment statement for engines that do not inline comments.
    fn column_comment_statement(&self, _table: &str, _column: &Column) -> Option<String> {
        None
    }

    /// Statements creating a table with its columns, primary key and indices.
    ///
    /// # Errors
    ///
    /// Fails when any column cannot be rendered.
    fn create_table_statements(&self, table: &Table) -> Result<Vec<String>>;

    /// Statement creating an index.
    fn create_index_statement(&self, table: &str, index: &Index) -> String {
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(table));
        sql.push_str(" (");
        sql.push_str(&self.column_list(&index.columns));
        sql.push(')');
        sql
    }

    /// Statement dropping an index.
    fn drop_index_statement(&self, table: &str, index: &Index) -> String;

    /// Statement adding a foreign key constraint.
    fn add_foreign_key_statement(&self, table: &str, foreign_key: &ForeignKey) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.quote_identifier(table),
            self.quote_identifier(&foreign_key.name),
            self.column_list(&foreign_key.columns),
            self.quote_identifier(&foreign_key.referenced_table),
            self.column_list(&foreign_key.referenced_columns),
            foreign_key.on_delete.to_sql(),
            foreign_key.on_update.to_sql(),
        )
    }

    /// Statement dropping a foreign key constraint.
    fn drop_foreign_key_statement(&self, table: &str, foreign_key: &ForeignKey) -> String;

    /// Statement adding a primary key.
    fn add_primary_key_statement(&self, table: &str, columns: &[String]) -> String {
        format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({})",
            self.quote_identifier(table),
            self.column_list(columns)
        )
    }

    /// Statement dropping the primary key constraint `constraint`.
    fn drop_primary_key_statement(&self, table: &str, constraint: &str) -> String;

    /// Statement replacing the table comment.
    fn table_comment_statement(&self, table: &str, comment: &str) -> String;

    /// Insert-or-update of one row keyed by `keys`.
    fn upsert_statement(&self, table: &str, keys: &[(&str, Value)], values: &[(&str, Value)])
        -> String;

    /// Statement creating a database.
    fn create_database_statement(&self, database: &str) -> String;

    /// Comma separated list of quoted identifiers.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Whether two foreign keys describe the same constraint.
    fn foreign_keys_equivalent(&self, a: &ForeignKey, b: &ForeignKey) -> bool {
        a == b
    }

    /// Whether dropping `dropped` columns also removes the primary key made
    /// of `primary_key`.
    fn primary_key_dropped_with(&self, primary_key: &[String], dropped: &[&str]) -> bool;

    /// Builder-call source for a column, with the quoted name padded to `width`.
    ///
    /// # Errors
    ///
    /// Fails when the column's type is unsupported.
    fn declarative_source_form(&self, column: &Column, width: usize) -> Result<String> {
        codegen::column_source(self.catalog(), column, width)
    }

    /// Renders one operation to the statements implementing it.
    ///
    /// # Errors
    ///
    /// Fails when a column in the operation cannot be rendered.
    fn render(&self, operation: &SchemaOperation) -> Result<Vec<String>> {
        let table = operation.table();
        let statements = match operation {
            SchemaOperation::CreateTable { table } => self.create_table_statements(table)?,
            SchemaOperation::AddColumn { column, .. } => {
                let mut statements = vec![self.add_column_statement(table, column)?];
                statements.extend(self.column_comment_statement(table, column));
                statements
            }
            SchemaOperation::DropColumn { column, .. } => {
                vec![self.drop_column_statement(table, column)]
            }
            SchemaOperation::ChangeColumn {
                column, previous, ..
            } => self.change_column_statements(table, column, previous)?,
            SchemaOperation::AddIdentity { column, .. } => {
                vec![self.identity_statement(table, column)?]
            }
            SchemaOperation::DropPrimaryKey { constraint, .. } => {
                vec![self.drop_primary_key_statement(table, constraint)]
            }
            SchemaOperation::AddPrimaryKey { columns, .. } => {
                vec![self.add_primary_key_statement(table, columns)]
            }
            SchemaOperation::CreateIndex { index, .. } => {
                vec![self.create_index_statement(table, index)]
            }
            SchemaOperation::DropIndex { index, .. } => {
                vec![self.drop_index_statement(table, index)]
            }
            SchemaOperation::AddForeignKey { foreign_key, .. } => {
                vec![self.add_foreign_key_statement(table, foreign_key)]
            }
            SchemaOperation::DropForeignKey { foreign_key, .. } => {
                vec![self.drop_foreign_key_statement(table, foreign_key)]
            }
            SchemaOperation::SetTableComment { comment, .. } => {
                vec![self.table_comment_statement(table, comment)]
            }
        };
        Ok(statements)
    }
}

/// Builds the renderer for a dialect.
#[must_use]
pub fn for_dialect(dialect: Dialect, parameters: &SchemaParameters) -> Box<dyn SqlDialect> {
    match dialect {
        Dialect::MySql => Box::new(MySqlDialect::with_parameters(parameters)),
        Dialect::Postgres => Box::new(PostgresDialect::with_parameters(parameters)),
    }
}

/// Length to render for a column after applying the type's length rule.
///
/// # Errors
///
/// Returns [`ReconcileError::InvalidLength`] when the length does not fit the
/// type's rule, or [`ReconcileError::UnsupportedType`].
pub fn resolved_length(catalog: &TypeCatalog, column: &Column) -> Result<Option<Length>> {
    let rule = catalog
        .length_rule(column.column_type)
        .map_err(|e| e.for_column(column.target_name()))?;
    let invalid = |message: &str| ReconcileError::InvalidLength {
        column: column.target_name().to_string(),
        column_type: column.column_type,
        message: message.to_string(),
    };

    match (rule, &column.length) {
        (LengthRule::None, _) => Ok(None),
        (LengthRule::Default(default), None) => Ok(Some(default.clone())),
        (LengthRule::Default(Length::Precision(..)), Some(Length::Size(precision))) => {
            Ok(Some(Length::Precision(*precision, 0)))
        }
        (LengthRule::Default(Length::Precision(..)), Some(length @ Length::Precision(..)))
        | (LengthRule::Default(Length::Size(_)), Some(length @ Length::Size(_))) => {
            Ok(Some(length.clone()))
        }
        (LengthRule::Default(_), Some(_)) => Err(invalid("expected a numeric length")),
        (LengthRule::Required, None) => Err(invalid("a length is required")),
        (LengthRule::Required, Some(length @ (Length::Size(_) | Length::Max))) => {
            Ok(Some(length.clone()))
        }
        (LengthRule::Required, Some(_)) => Err(invalid("expected a size or MAX")),
        (LengthRule::Values, Some(Length::Values(values))) if !values.is_empty() => {
            Ok(column.length.clone())
        }
        (LengthRule::Values, _) => Err(invalid("expected a non-empty value list")),
    }
}
