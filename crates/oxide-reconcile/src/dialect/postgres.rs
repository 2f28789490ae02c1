//! PostgreSQL dialect.
//!
//! PostgreSQL has no single-statement column redefinition, so a change is
//! rendered as an optional `RENAME COLUMN`, one `ALTER COLUMN` batch covering
//! type, nullability, default and identity, and a `COMMENT ON COLUMN`.
//! Comments are never inlined.

use crate::catalog::{ColumnType, Dialect, TypeCatalog};
use crate::config::SchemaParameters;
use crate::error::Result;
use crate::schema::{Column, ForeignKey, Index, Table, Value};

use super::SqlDialect;

/// PostgreSQL dialect.
#[derive(Debug, Clone)]
pub struct PostgresDialect {
    catalog: TypeCatalog,
    encoding: Option<String>,
    collation: Option<String>,
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresDialect {
    /// Creates a PostgreSQL dialect using the database's own defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parameters(&SchemaParameters::new())
    }

    /// Creates a PostgreSQL dialect. `charset` and `collation` only affect
    /// `CREATE DATABASE`; columns keep the database collation unless they
    /// declare one.
    #[must_use]
    pub fn with_parameters(parameters: &SchemaParameters) -> Self {
        Self {
            catalog: TypeCatalog::for_dialect(Dialect::Postgres),
            encoding: parameters.charset.clone(),
            collation: parameters.collation.clone(),
        }
    }

    fn alter_table(&self, table: &str, clause: &str) -> String {
        format!("ALTER TABLE {} {clause}", self.quote_identifier(table))
    }

    fn comment_literal(&self, comment: &str) -> String {
        if comment.is_empty() {
            "NULL".to_string()
        } else {
            self.quote_literal(comment)
        }
    }

    fn type_with_collation(&self, column: &Column) -> Result<String> {
        let mut sql = self.type_sql(column)?;
        if let Some(collation) = self.collation_for(column) {
            sql.push_str(" COLLATE ");
            sql.push_str(&self.quote_identifier(&collation));
        }
        Ok(sql)
    }
}

impl SqlDialect for PostgresDialect {
    fn kind(&self) -> Dialect {
        Dialect::Postgres
    }

    fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn supports_max_length(&self) -> bool {
        true
    }

    fn default_collation(&self) -> Option<&str> {
        None
    }

    fn default_sql(&self, column: &Column) -> Option<String> {
        let value = column.default.as_ref()?;
        let sql = match (column.column_type, value) {
            (ColumnType::Bool | ColumnType::Boolean, Value::Integer(0)) => "FALSE".to_string(),
            (ColumnType::Bool | ColumnType::Boolean, Value::Integer(_)) => "TRUE".to_string(),
            (ColumnType::Bool | ColumnType::Boolean, Value::Text(v)) => v.to_ascii_uppercase(),
            (t, v) if t.is_string_like() => self.quote_literal(&v.to_string()),
            (_, v) => v.to_string(),
        };
        Some(sql)
    }

    fn column_definition(&self, column: &Column, identity: bool) -> Result<String> {
        let mut parts = vec![
            self.quote_identifier(column.target_name()),
            self.type_with_collation(column)?,
        ];

        let generated = identity && column.identity;
        if generated {
            parts.push("GENERATED BY DEFAULT AS IDENTITY".to_string());
        }

        let not_null = !column.nullable || column.primary || column.identity;
        parts.push(if not_null { "NOT NULL" } else { "NULL" }.to_string());

        if !generated {
            if let Some(default) = self.default_sql(column) {
                parts.push(format!("DEFAULT {default}"));
            }
        }

        Ok(parts.join(" "))
    }

    fn identity_statement(&self, table: &str, column: &Column) -> Result<String> {
        Ok(self.alter_table(
            table,
            &format!(
                "ALTER COLUMN {} ADD GENERATED BY DEFAULT AS IDENTITY",
                self.quote_identifier(column.target_name())
            ),
        ))
    }

    fn change_column_statements(
        &self,
        table: &str,
        column: &Column,
        previous: &Column,
    ) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        let target = self.quote_identifier(column.target_name());

        if let Some(new_name) = &column.new_name {
            statements.push(self.alter_table(
                table,
                &format!(
                    "RENAME COLUMN {} TO {}",
                    self.quote_identifier(&column.name),
                    self.quote_identifier(new_name)
                ),
            ));
        }

        // Identity columns reject SET DEFAULT and DROP DEFAULT, so the identity
        // goes first and its own statement.
        if previous.identity && !column.identity {
            statements.push(self.alter_table(
                table,
                &format!("ALTER COLUMN {target} DROP IDENTITY IF EXISTS"),
            ));
        }

        let mut clauses = vec![format!(
            "ALTER COLUMN {target} TYPE {}",
            self.type_with_collation(column)?
        )];
        let not_null = !column.nullable || column.primary || column.identity;
        clauses.push(format!(
            "ALTER COLUMN {target} {}",
            if not_null { "SET NOT NULL" } else { "DROP NOT NULL" }
        ));
        if !column.identity {
            let default = self
                .default_sql(column)
                .map_or_else(|| "DROP DEFAULT".to_string(), |d| format!("SET DEFAULT {d}"));
            clauses.push(format!("ALTER COLUMN {target} {default}"));
        }
        statements.push(self.alter_table(table, &clauses.join(", ")));

        statements.push(format!(
            "COMMENT ON COLUMN {}.{target} IS {}",
            self.quote_identifier(table),
            self.comment_literal(&column.comment)
        ));
        Ok(statements)
    }

    fn column_comment_statement(&self, table: &str, column: &Column) -> Option<String> {
        if column.comment.is_empty() {
            return None;
        }
        Some(format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            self.quote_identifier(table),
            self.quote_identifier(column.target_name()),
            self.quote_literal(&column.comment)
        ))
    }

    fn create_table_statements(&self, table: &Table) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(table.columns.len() + 1);
        for column in &table.columns {
            lines.push(
                self.column_definition(column, true)
                    .map_err(|e| e.in_table(&table.name))?,
            );
        }
        if !table.primary_key.is_empty() {
            lines.push(format!("PRIMARY KEY ({})", self.column_list(&table.primary_key)));
        }

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(&table.name),
            lines.join(",\n  ")
        )];
        for index in &table.indices {
            statements.push(self.create_index_statement(&table.name, index));
        }
        if let Some(comment) = &table.comment {
            statements.push(self.table_comment_statement(&table.name, comment));
        }
        statements.extend(
            table
                .columns
                .iter()
                .filter_map(|c| self.column_comment_statement(&table.name, c)),
        );
        Ok(statements)
    }

    fn drop_index_statement(&self, _table: &str, index: &Index) -> String {
        format!("DROP INDEX {}", self.quote_identifier(&index.name))
    }

    fn drop_foreign_key_statement(&self, table: &str, foreign_key: &ForeignKey) -> String {
        self.alter_table(
            table,
            &format!("DROP CONSTRAINT {}", self.quote_identifier(&foreign_key.name)),
        )
    }

    fn drop_primary_key_statement(&self, table: &str, constraint: &str) -> String {
        self.alter_table(
            table,
            &format!("DROP CONSTRAINT {}", self.quote_identifier(constraint)),
        )
    }

    fn table_comment_statement(&self, table: &str, comment: &str) -> String {
        format!(
            "COMMENT ON TABLE {} IS {}",
            self.quote_identifier(table),
            self.comment_literal(comment)
        )
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
        let conflict: Vec<String> = keys.iter().map(|(c, _)| self.quote_identifier(c)).collect();
        let updates: Vec<String> = values
            .iter()
            .map(|(c, _)| {
                let quoted = self.quote_identifier(c);
                format!("{quoted} = EXCLUDED.{quoted}")
            })
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
            self.quote_identifier(table),
            columns.join(", "),
            literals.join(", "),
            conflict.join(", "),
            updates.join(", ")
        )
    }

    fn create_database_statement(&self, database: &str) -> String {
        let mut sql = format!("CREATE DATABASE {}", self.quote_identifier(database));
        if let Some(encoding) = &self.encoding {
            sql.push_str(&format!(" ENCODING {}", self.quote_literal(encoding)));
        }
        if let Some(collation) = &self.collation {
            sql.push_str(&format!(" LC_COLLATE {}", self.quote_literal(collation)));
        }
        sql
    }

    fn primary_key_dropped_with(&self, primary_key: &[String], dropped: &[&str]) -> bool {
        primary_key.iter().any(|c| dropped.contains(&c.as_str()))
    }
}
