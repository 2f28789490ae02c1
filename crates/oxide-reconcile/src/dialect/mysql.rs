//! MySQL dialect.
//!
//! The column definition token order is
//! `` `name` type(len) unsigned COLLATE c NULL|NOT NULL AUTO_INCREMENT DEFAULT v COMMENT 'c' ``.
//! Changes always redefine the whole column through `CHANGE`, so a single
//! statement covers renames and any attribute change.

use crate::catalog::{Dialect, TypeCatalog};
use crate::config::SchemaParameters;
use crate::error::Result;
use crate::schema::{Column, ForeignKey, ForeignKeyAction, Index, Table, Value};

use super::SqlDialect;

/// Collation used for string-like columns unless configured otherwise.
pub const DEFAULT_COLLATION: &str = "utf8mb4_unicode_ci";
/// Character set used for new tables unless configured otherwise.
pub const DEFAULT_CHARSET: &str = "utf8mb4";
/// Storage engine used for new tables unless configured otherwise.
pub const DEFAULT_ENGINE: &str = "InnoDB";

/// MySQL/MariaDB dialect.
#[derive(Debug, Clone)]
pub struct MySqlDialect {
    catalog: TypeCatalog,
    collation: String,
    charset: String,
    engine: String,
}

impl Default for MySqlDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl MySqlDialect {
    /// Creates a MySQL dialect with the default collation, charset and engine.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parameters(&SchemaParameters::new())
    }

    /// Creates a MySQL dialect honouring `collation`, `charset` and `engine`.
    #[must_use]
    pub fn with_parameters(parameters: &SchemaParameters) -> Self {
        Self {
            catalog: TypeCatalog::for_dialect(Dialect::MySql),
            collation: parameters
                .collation
                .clone()
                .unwrap_or_else(|| DEFAULT_COLLATION.to_string()),
            charset: parameters
                .charset
                .clone()
                .unwrap_or_else(|| DEFAULT_CHARSET.to_string()),
            engine: parameters
                .engine
                .clone()
                .unwrap_or_else(|| DEFAULT_ENGINE.to_string()),
        }
    }

    fn alter_table(&self, table: &str, clause: &str) -> String {
        format!("ALTER TABLE {} {clause}", self.quote_identifier(table))
    }

    fn index_clause(&self, index: &Index) -> String {
        format!(
            "{}KEY {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index.name),
            self.column_list(&index.columns)
        )
    }

    const fn normalized_action(action: ForeignKeyAction) -> ForeignKeyAction {
        match action {
            ForeignKeyAction::Restrict => ForeignKeyAction::NoAction,
            other => other,
        }
    }
}

impl SqlDialect for MySqlDialect {
    fn kind(&self) -> Dialect {
        Dialect::MySql
    }

    fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn supports_max_length(&self) -> bool {
        false
    }

    fn default_collation(&self) -> Option<&str> {
        Some(&self.collation)
    }

    fn column_definition(&self, column: &Column, identity: bool) -> Result<String> {
        let mut parts = vec![
            self.quote_identifier(column.target_name()),
            self.type_sql(column)?,
        ];

        if column.unsigned && column.column_type.is_numeric() {
            parts.push("unsigned".to_string());
        }
        if let Some(collation) = self.collation_for(column) {
            parts.push(format!("COLLATE {collation}"));
        }

        let not_null = !column.nullable || column.primary || column.identity;
        parts.push(if not_null { "NOT NULL" } else { "NULL" }.to_string());

        let auto_increment = identity && column.identity;
        if auto_increment {
            parts.push("AUTO_INCREMENT".to_string());
        } else if let Some(default) = self.default_sql(column) {
            parts.push(format!("DEFAULT {default}"));
        }

        if !column.comment.is_empty() {
            parts.push(format!("COMMENT {}", self.quote_literal(&column.comment)));
        }

        Ok(parts.join(" "))
    }

    fn identity_statement(&self, table: &str, column: &Column) -> Result<String> {
        Ok(self.alter_table(
            table,
            &format!(
                "CHANGE {} {}",
                self.quote_identifier(column.target_name()),
                self.column_definition(column, true)?
            ),
        ))
    }

    fn change_column_statements(
        &self,
        table: &str,
        column: &Column,
        _previous: &Column,
    ) -> Result<Vec<String>> {
        Ok(vec![self.alter_table(
            table,
            &format!(
                "CHANGE {} {}",
                self.quote_identifier(&column.name),
                self.column_definition(column, true)?
            ),
        )])
    }

    fn create_table_statements(&self, table: &Table) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(table.columns.len() + table.indices.len() + 1);
        for column in &table.columns {
            lines.push(
                self.column_definition(column, true)
                    .map_err(|e| e.in_table(&table.name))?,
            );
        }
        if !table.primary_key.is_empty() {
            lines.push(format!("PRIMARY KEY ({})", self.column_list(&table.primary_key)));
        }
        for index in &table.indices {
            lines.push(self.index_clause(index));
        }

        let mut sql = format!("CREATE TABLE {} (\n  ", self.quote_identifier(&table.name));
        sql.push_str(&lines.join(",\n  "));
        sql.push_str(&format!(
            "\n) ENGINE={} DEFAULT CHARSET={} COLLATE={}",
            self.engine, self.charset, self.collation
        ));
        if let Some(comment) = &table.comment {
            sql.push_str(&format!(" COMMENT={}", self.quote_literal(comment)));
        }
        Ok(vec![sql])
    }

    fn drop_index_statement(&self, table: &str, index: &Index) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(&index.name),
            self.quote_identifier(table)
        )
    }

    fn drop_foreign_key_statement(&self, table: &str, foreign_key: &ForeignKey) -> String {
        self.alter_table(
            table,
            &format!("DROP FOREIGN KEY {}", self.quote_identifier(&foreign_key.name)),
        )
    }

    fn drop_primary_key_statement(&self, table: &str, _constraint: &str) -> String {
        self.alter_table(table, "DROP PRIMARY KEY")
    }

    fn table_comment_statement(&self, table: &str, comment: &str) -> String {
        self.alter_table(table, &format!("COMMENT = {}", self.quote_literal(comment)))
    }

    fn upsert_statement(
        &self,
        table: &str,
        keys: &[(&str, Value)],
        values: &[(&str, Value)],
    ) -> String {
        let all: Vec<&(&str, Value)> = keys.iter().chain(values).collect();
        let columns: Vec<String> = all.iter().map(|(c, _)| self.quote_identifier(c)).collect();
        let literals: Vec<String> = all.iter().map(|(_, v)| self.literal(v)).collect();
        let updates: Vec<String> = values
            .iter()
            .map(|(c, _)| {
                let quoted = self.quote_identifier(c);
                format!("{quoted} = VALUES({quoted})")
            })
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
            self.quote_identifier(table),
            columns.join(", "),
            literals.join(", "),
            updates.join(", ")
        )
    }

    fn create_database_statement(&self, database: &str) -> String {
        format!(
            "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET {} COLLATE {}",
            self.quote_identifier(database),
            self.charset,
            self.collation
        )
    }

    fn foreign_keys_equivalent(&self, a: &ForeignKey, b: &ForeignKey) -> bool {
        a.name == b.name
            && a.columns == b.columns
            && a.referenced_table == b.referenced_table
            && a.referenced_columns == b.referenced_columns
            && Self::normalized_action(a.on_delete) == Self::normalized_action(b.on_delete)
            && Self::normalized_action(a.on_update) == Self::normalized_action(b.on_update)
    }

    fn primary_key_dropped_with(&self, primary_key: &[String], dropped: &[&str]) -> bool {
        !primary_key.is_empty() && primary_key.iter().all(|c| dropped.contains(&c.as_str()))
    }
}
