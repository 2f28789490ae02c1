//! PostgreSQL introspection over `information_schema` and `pg_catalog`.
//!
//! Every catalog value is cast to `text` in the query so rows decode the same
//! way regardless of the catalog's domain types.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::warn;

use crate::catalog::{ColumnType, Length};
use crate::config::ConnectionSettings;
use crate::connection::{Connection, Row};
use crate::dialect::{PostgresDialect, SqlDialect};
use crate::error::{ReconcileError, Result};
use crate::schema::{Column, ForeignKey, ForeignKeyAction, Grant, Index, Table};

use super::{live_default, unquote_default, CommandRunner, ExecutionMode, Introspector};

/// Namespace used when the settings name none.
pub const DEFAULT_NAMESPACE: &str = "public";

const TABLES_SQL: &str = "SELECT c.relname::text AS table_name, \
     COALESCE(obj_description(c.oid, 'pg_class'), '') AS table_comment \
     FROM pg_catalog.pg_class c JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
     WHERE n.nspname::text = $1 AND c.relkind IN ('r', 'p') ORDER BY c.relname";

const TABLE_SQL: &str = "SELECT c.relname::text AS table_name, \
     COALESCE(obj_description(c.oid, 'pg_class'), '') AS table_comment \
     FROM pg_catalog.pg_class c JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
     WHERE n.nspname::text = $1 AND c.relname::text = $2 AND c.relkind IN ('r', 'p')";

const COLUMNS_SQL: &str = "SELECT c.column_name::text AS column_name, c.data_type::text AS data_type, \
     c.character_maximum_length::text AS character_maximum_length, \
     c.numeric_precision::text AS numeric_precision, c.numeric_scale::text AS numeric_scale, \
     c.is_nullable::text AS is_nullable, c.column_default::text AS column_default, \
     c.is_identity::text AS is_identity, c.collation_name::text AS collation_name, \
     COALESCE(col_description(format('%I.%I', c.table_schema, c.table_name)::regclass, \
     c.ordinal_position::int), '') AS column_comment \
     FROM information_schema.columns c \
     WHERE c.table_schema::text = $1 AND c.table_name::text = $2 ORDER BY c.ordinal_position";

const INDICES_SQL: &str = "SELECT i.relname::text AS index_name, a.attname::text AS column_name, \
     ix.indisunique::text AS is_unique \
     FROM pg_catalog.pg_index ix \
     JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid \
     JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid \
     JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
     JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) ON true \
     JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
     WHERE n.nspname::text = $1 AND t.relname::text = $2 AND NOT ix.indisprimary \
     ORDER BY i.relname, k.ord";

const FOREIGN_KEYS_SQL: &str = "SELECT con.conname::text AS constraint_name, \
     a.attname::text AS column_name, rt.relname::text AS referenced_table_name, \
     ra.attname::text AS referenced_column_name, \
     con.confupdtype::text AS update_rule, con.confdeltype::text AS delete_rule \
     FROM pg_catalog.pg_constraint con \
     JOIN pg_catalog.pg_class t ON t.oid = con.conrelid \
     JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
     JOIN pg_catalog.pg_class rt ON rt.oid = con.confrelid \
     JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, refnum, ord) ON true \
     JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum \
     JOIN pg_catalog.pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.refnum \
     WHERE con.contype = 'f' AND n.nspname::text = $1 AND t.relname::text = $2 \
     ORDER BY con.conname, k.ord";

const PRIMARY_KEY_SQL: &str = "SELECT con.conname::text AS constraint_name, \
     a.attname::text AS column_name, k.ord::text AS ordinal_position \
     FROM pg_catalog.pg_constraint con \
     JOIN pg_catalog.pg_class t ON t.oid = con.conrelid \
     JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
     JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord) ON true \
     JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum \
     WHERE con.contype = 'p' AND n.nspname::text = $1 AND t.relname::text = $2 \
     ORDER BY k.ord";

const GRANTS_SQL: &str = "SELECT grantee::text AS grantee, privilege_type::text AS privilege_type, \
     is_grantable::text AS is_grantable FROM information_schema.role_table_grants \
     WHERE table_schema::text = $1 AND table_name::text = $2 ORDER BY grantee, privilege_type";

const DATABASE_SQL: &str =
    "SELECT datname::text AS datname FROM pg_catalog.pg_database WHERE datname::text = $1";

const CURRENT_DATABASE_SQL: &str = "SELECT current_database()::text AS current_database";

const NAMESPACE_SQL: &str =
    "SELECT nspname::text AS nspname FROM pg_catalog.pg_namespace WHERE nspname::text = $1";

/// Introspector for PostgreSQL.
pub struct PostgresIntrospector<'a, C: Connection> {
    runner: CommandRunner<'a, C>,
    dialect: PostgresDialect,
    database: String,
    namespace: String,
}

impl<'a, C: Connection> PostgresIntrospector<'a, C> {
    /// Creates an introspector managing `settings.database`, restricted to
    /// `settings.schema` (`public` when unset).
    #[must_use]
    pub fn new(connection: C, settings: &ConnectionSettings, mode: ExecutionMode<'a>) -> Self {
        Self {
            runner: CommandRunner::new(connection, mode),
            dialect: PostgresDialect::with_parameters(&settings.parameters),
            database: settings.database.clone(),
            namespace: settings
                .schema
                .clone()
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        }
    }

    /// Releases the connection.
    #[must_use]
    pub fn into_inner(self) -> C {
        self.runner.into_inner()
    }

    async fn table_query(&mut self, sql: &str, table: &str) -> Result<Vec<Row>> {
        let params = [self.namespace.clone(), table.to_string()];
        self.runner.query(sql, &params).await
    }
}

fn referential_action(code: &str) -> Result<ForeignKeyAction> {
    match code {
        "a" => Ok(ForeignKeyAction::NoAction),
        "r" => Ok(ForeignKeyAction::Restrict),
        "c" => Ok(ForeignKeyAction::Cascade),
        "n" => Ok(ForeignKeyAction::SetNull),
        "d" => Ok(ForeignKeyAction::SetDefault),
        other => Err(ReconcileError::Introspection(format!(
            "unknown referential action code '{other}'"
        ))),
    }
}

/// Maps `information_schema.columns.data_type` back to a logical type.
pub(crate) fn parse_data_type(row: &Row) -> Result<(ColumnType, Option<Length>)> {
    let data_type = row.require("data_type")?;
    let max_length = row.get_u32("character_maximum_length")?;
    let sized = |t: ColumnType| (t, Some(max_length.map_or(Length::Max, Length::Size)));

    let parsed = match data_type {
        "smallint" => (ColumnType::SmallInt, None),
        "integer" => (ColumnType::Int, None),
        "bigint" => (ColumnType::BigInt, None),
        "numeric" => {
            let length = match (
                row.get_u32("numeric_precision")?,
                row.get_u32("numeric_scale")?,
            ) {
                (Some(precision), scale) => Some(Length::Precision(precision, scale.unwrap_or(0))),
                (None, _) => None,
            };
            (ColumnType::Decimal, length)
        }
        "real" => (ColumnType::Float, None),
        "double precision" => (ColumnType::Double, None),
        "boolean" => (ColumnType::Bool, None),
        "bit" => (ColumnType::Bit, max_length.map(Length::Size)),
        "character varying" => sized(ColumnType::VarChar),
        "character" => sized(ColumnType::Char),
        "text" => (ColumnType::Text, None),
        "bytea" => (ColumnType::Blob, None),
        "json" | "jsonb" => (ColumnType::Json, None),
        "uuid" => (ColumnType::Uuid, None),
        "date" => (ColumnType::Date, None),
        "timestamp without time zone" => (ColumnType::Timestamp, None),
        "timestamp with time zone" => (ColumnType::DateTimeOffset, None),
        "time without time zone" => (ColumnType::Time, None),
        other => {
            return Err(ReconcileError::Introspection(format!(
                "unsupported PostgreSQL data type '{other}'"
            )))
        }
    };
    Ok(parsed)
}

/// Builds a column from one `information_schema.columns` row.
pub(crate) fn column_from_row(row: &Row) -> Result<Column> {
    let name = row.require("column_name")?;
    let (column_type, length) = parse_data_type(row)?;
    let nullable = row.get_bool("is_nullable");
    let raw_default = row.get("column_default");
    let identity = row.get_bool("is_identity")
        || raw_default.is_some_and(|d| d.trim_start().starts_with("nextval("));

    let mut column = Column::new(name, column_type).nullable(nullable);
    column.length = length;
    column.identity = identity;
    if !identity {
        column.default = raw_default
            .map(unquote_default)
            .filter(|d| !d.eq_ignore_ascii_case("null"))
            .map(|d| live_default(column_type, &d));
    }
    column.comment = row.get("column_comment").unwrap_or_default().to_string();
    column.collation = row.get("collation_name").map(str::to_string);
    Ok(column)
}

#[async_trait]
impl<'a, C: Connection> Introspector for PostgresIntrospector<'a, C> {
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
        let params = [self.namespace.clone()];
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
        rows.iter().map(column_from_row).collect()
    }

    async fn get_indices(&mut self, table: &str) -> Result<Vec<Index>> {
        let rows = self.table_query(INDICES_SQL, table).await?;
        let mut indices: Vec<Index> = Vec::new();
        for row in &rows {
            let name = row.require("index_name")?;
            let column = row.require("column_name")?.to_string();
            match indices.iter_mut().find(|i| i.name == name) {
                Some(index) => index.columns.push(column),
                None => {
                    let mut index = Index::new(name, [column]);
                    index.unique = row.get_bool("is_unique");
                    indices.push(index);
                }
            }
        }
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
            .on_delete(referential_action(row.require("delete_rule")?)?)
            .on_update(referential_action(row.require("update_rule")?)?);
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
        let rows = self.table_query(PRIMARY_KEY_SQL, table).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("constraint_name"))
            .unwrap_or_default()
            .to_string())
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

    /// A PostgreSQL session cannot switch databases, so this checks that the
    /// connection is on the managed database and points `search_path` at the
    /// managed namespace.
    async fn select_database(&mut self) -> Result<bool> {
        let rows = self.runner.query(CURRENT_DATABASE_SQL, &[]).await?;
        let current = rows
            .first()
            .and_then(|row| row.get("current_database"))
            .unwrap_or_default();
        if current != self.database {
            warn!(
                database = %self.database,
                current = %current,
                "Connection is not on the managed database"
            );
            return Ok(false);
        }

        let params = [self.namespace.clone()];
        if self.runner.query(NAMESPACE_SQL, &params).await?.is_empty() {
            warn!(schema = %self.namespace, "Schema does not exist");
            return Ok(false);
        }
        let statement = format!(
            "SET search_path TO {}",
            self.dialect.quote_identifier(&self.namespace)
        );
        self.runner.execute_session(&statement).await?;
        Ok(true)
    }
}
