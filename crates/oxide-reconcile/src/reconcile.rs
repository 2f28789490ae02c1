//! Reconciliation of a live database against a declared schema.
//!
//! Planning is pure: [`Reconciler::plan`] compares the declared [`Schema`]
//! with snapshots of the live tables and renders every resulting
//! [`SchemaOperation`] up front, so rendering and consistency errors surface
//! before anything is executed. [`Reconciler::reconcile`] snapshots the
//! declared tables through an [`Introspector`], plans, and applies the plan in
//! order.
//!
//! A plan runs in three phases:
//!
//! 1. foreign keys that were removed or changed are dropped, across all tables;
//! 2. each declared table is created or altered, in declaration order;
//! 3. foreign keys that are new or changed are added, across all tables.
//!
//! Within an existing table the order is: index drops, column drops, column
//! adds, column changes, primary key replacement, identity follow-ups, index
//! creates and finally the table comment.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::dialect::SqlDialect;
use crate::error::Result;
use crate::introspect::{Introspector, TableSnapshot};
use crate::operations::SchemaOperation;
use crate::schema::{Column, Schema, Table, Value};

/// Reconciliation options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerOptions {
    /// Whether live columns missing from the declaration are dropped.
    pub allow_drops: bool,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self { allow_drops: true }
    }
}

/// One operation of a plan with the statements implementing it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOperation {
    /// The structural change.
    pub operation: SchemaOperation,
    /// Rendered statements, executed in order.
    pub statements: Vec<String>,
}

impl PlannedOperation {
    /// Table the operation changes.
    #[must_use]
    pub fn table(&self) -> &str {
        self.operation.table()
    }
}

/// Ordered list of operations that converge a database on its declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Operations in execution order.
    pub operations: Vec<PlannedOperation>,
    /// Column drops withheld because drops are not allowed.
    pub suppressed: Vec<SchemaOperation>,
}

impl ReconcilePlan {
    /// Returns true when the database already matches its declaration.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of planned operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Every statement of the plan, in execution order.
    #[must_use]
    pub fn statements(&self) -> Vec<&str> {
        self.operations
            .iter()
            .flat_map(|op| op.statements.iter().map(String::as_str))
            .collect()
    }

    /// Names of the tables the plan changes.
    #[must_use]
    pub fn tables(&self) -> BTreeSet<&str> {
        self.operations.iter().map(PlannedOperation::table).collect()
    }

    /// Returns true when the plan can lose data.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        self.operations.iter().any(|op| op.operation.is_destructive())
    }
}

/// Outcome of an applied plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Operations applied.
    pub operations: usize,
    /// Statements executed (or recorded in dry-run mode).
    pub statements: usize,
    /// Column drops withheld.
    pub suppressed: usize,
    /// Tables that were changed.
    pub tables: BTreeSet<String>,
}

#[derive(Default)]
struct Phases {
    drop_foreign_keys: Vec<SchemaOperation>,
    structure: Vec<SchemaOperation>,
    add_foreign_keys: Vec<SchemaOperation>,
    suppressed: Vec<SchemaOperation>,
}

/// A declared column together with the live column it corresponds to.
struct ColumnMatch<'t> {
    /// Declared column with its primary key membership settled.
    declared: Column,
    live: Option<&'t Column>,
}

/// Computes and applies reconciliation plans.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    options: ReconcilerOptions,
}

impl Reconciler {
    /// Creates a reconciler.
    #[must_use]
    pub fn new(options: ReconcilerOptions) -> Self {
        Self { options }
    }

    /// The options this reconciler runs with.
    #[must_use]
    pub const fn options(&self) -> ReconcilerOptions {
        self.options
    }

    /// Plans the operations turning the `live` tables into `schema`.
    ///
    /// `live` holds a snapshot for every declared table that exists; declared
    /// tables without a snapshot are created. Live tables that are not
    /// declared are never touched.
    ///
    /// # Errors
    ///
    /// Fails when the schema is inconsistent or an operation cannot be rendered.
    pub fn plan(
        &self,
        dialect: &dyn SqlDialect,
        schema: &Schema,
        live: &BTreeMap<String, TableSnapshot>,
    ) -> Result<ReconcilePlan> {
        schema.validate()?;

        let mut phases = Phases::default();
        for table in &schema.tables {
            match live.get(&table.name) {
                None => {
                    let mut created = table.clone();
                    let foreign_keys = std::mem::take(&mut created.foreign_keys);
                    phases
                        .structure
                        .push(SchemaOperation::CreateTable { table: created });
                    phases
                        .add_foreign_keys
                        .extend(foreign_keys.into_iter().map(|foreign_key| {
                            SchemaOperation::AddForeignKey {
                                table: table.name.clone(),
                                foreign_key,
                            }
                        }));
                }
                Some(snapshot) => self
                    .diff_table(dialect, table, snapshot, &mut phases)
                    .map_err(|e| e.in_table(&table.name))?,
            }
        }

        let mut plan = ReconcilePlan {
            operations: Vec::new(),
            suppressed: phases.suppressed,
        };
        for operation in phases
            .drop_foreign_keys
            .into_iter()
            .chain(phases.structure)
            .chain(phases.add_foreign_keys)
        {
            let statements = dialect
                .render(&operation)
                .map_err(|e| e.in_table(operation.table()))?;
            debug!(
                table = %operation.table(),
                operation = %operation.description(),
                "Planned operation"
            );
            plan.operations.push(PlannedOperation {
                operation,
                statements,
            });
        }

        info!(
            dialect = %dialect.name(),
            operations = plan.operations.len(),
            suppressed = plan.suppressed.len(),
            "Planned reconciliation"
        );
        Ok(plan)
    }

    fn diff_table(
        &self,
        dialect: &dyn SqlDialect,
        table: &Table,
        snapshot: &TableSnapshot,
        phases: &mut Phases,
    ) -> Result<()> {
        let live = &snapshot.table;
        let name = &table.name;

        // Foreign keys, compared by constraint name.
        for live_fk in &live.foreign_keys {
            match table.get_foreign_key(&live_fk.name) {
                Some(declared) if dialect.foreign_keys_equivalent(declared, live_fk) => {}
                declared => {
                    phases.drop_foreign_keys.push(SchemaOperation::DropForeignKey {
                        table: name.clone(),
                        foreign_key: live_fk.clone(),
                    });
                    if let Some(declared) = declared {
                        phases.add_foreign_keys.push(SchemaOperation::AddForeignKey {
                            table: name.clone(),
                            foreign_key: declared.clone(),
                        });
                    }
                }
            }
        }
        for declared in &table.foreign_keys {
            if live.get_foreign_key(&declared.name).is_none() {
                phases.add_foreign_keys.push(SchemaOperation::AddForeignKey {
                    table: name.clone(),
                    foreign_key: declared.clone(),
                });
            }
        }

        let matches = match_columns(table, live);
        let renames: BTreeMap<&str, &str> = matches
            .iter()
            .filter_map(|m| {
                let live = m.live?;
                (live.name != m.declared.target_name())
                    .then(|| (live.name.as_str(), m.declared.target_name()))
            })
            .collect();
        let renamed = |column: &str| -> String {
            renames.get(column).copied().unwrap_or(column).to_string()
        };

        // Indices, compared by name once pending renames are accounted for.
        let mut index_creates = Vec::new();
        for live_index in &live.indices {
            let columns: Vec<String> = live_index.columns.iter().map(|c| renamed(c)).collect();
            match table.get_index(&live_index.name) {
                Some(declared) if declared.columns == columns && declared.unique == live_index.unique => {}
                declared => {
                    phases.structure.push(SchemaOperation::DropIndex {
                        table: name.clone(),
                        index: live_index.clone(),
                    });
                    if let Some(declared) = declared {
                        index_creates.push(declared.clone());
                    }
                }
            }
        }
        for declared in &table.indices {
            if live.get_index(&declared.name).is_none() {
                index_creates.push(declared.clone());
            }
        }

        // Column drops, in live order.
        let matched: BTreeSet<&str> = matches
            .iter()
            .filter_map(|m| m.live.map(|c| c.name.as_str()))
            .collect();
        let mut dropped: Vec<&str> = Vec::new();
        for live_column in &live.columns {
            if matched.contains(live_column.name.as_str()) {
                continue;
            }
            let operation = SchemaOperation::DropColumn {
                table: name.clone(),
                column: live_column.clone(),
            };
            if self.options.allow_drops {
                dropped.push(&live_column.name);
                phases.structure.push(operation);
            } else {
                warn!(
                    table = %name,
                    column = %live_column.name,
                    "Column is not declared; drop suppressed"
                );
                phases.suppressed.push(operation);
            }
        }

        // Column adds, in declaration order, never carrying identity.
        let mut identities = Vec::new();
        for m in matches.iter().filter(|m| m.live.is_none()) {
            phases.structure.push(SchemaOperation::AddColumn {
                table: name.clone(),
                column: m.declared.clone(),
            });
            if m.declared.identity {
                identities.push(m.declared.clone());
            }
        }

        // Column changes.
        for m in &matches {
            let Some(live_column) = m.live else {
                continue;
            };
            let gains_identity = m.declared.identity && !live_column.identity;
            let target = if gains_identity {
                let mut without = m.declared.clone();
                without.identity = false;
                without.nullable = false;
                identities.push(m.declared.clone());
                without
            } else {
                m.declared.clone()
            };
            let differs = dialect.column_definition(&comparable(&target), true)?
                != dialect.column_definition(&comparable(live_column), true)?
                || target.comment != live_column.comment;
            if differs {
                phases.structure.push(SchemaOperation::ChangeColumn {
                    table: name.clone(),
                    column: target,
                    previous: live_column.clone(),
                });
            }
        }

        // Primary key replacement.
        let live_key: Vec<String> = live.primary_key.iter().map(|c| renamed(c)).collect();
        if table.primary_key != live_key {
            if !live.primary_key.is_empty()
                && !dialect.primary_key_dropped_with(&live.primary_key, &dropped)
            {
                phases.structure.push(SchemaOperation::DropPrimaryKey {
                    table: name.clone(),
                    constraint: snapshot.primary_key_name.clone(),
                    columns: live.primary_key.clone(),
                });
            }
            if !table.primary_key.is_empty() {
                phases.structure.push(SchemaOperation::AddPrimaryKey {
                    table: name.clone(),
                    columns: table.primary_key.clone(),
                });
            }
        }

        for column in identities {
            phases.structure.push(SchemaOperation::AddIdentity {
                table: name.clone(),
                column: settled(column),
            });
        }

        for index in index_creates {
            phases.structure.push(SchemaOperation::CreateIndex {
                table: name.clone(),
                index,
            });
        }

        if let Some(comment) = &table.comment {
            if live.comment.as_deref().unwrap_or_default() != comment.as_str() {
                phases.structure.push(SchemaOperation::SetTableComment {
                    table: name.clone(),
                    comment: comment.clone(),
                });
            }
        }
        Ok(())
    }

    /// Captures the live structure of every declared table that exists.
    ///
    /// # Errors
    ///
    /// Fails when a live table cannot be read.
    pub async fn snapshot<I>(
        &self,
        introspector: &mut I,
        schema: &Schema,
    ) -> Result<BTreeMap<String, TableSnapshot>>
    where
        I: Introspector + ?Sized,
    {
        let mut snapshots = BTreeMap::new();
        for name in schema.table_names() {
            if let Some(snapshot) = introspector.snapshot_table(name).await? {
                snapshots.insert(name.to_string(), snapshot);
            }
        }
        Ok(snapshots)
    }

    /// Validates `schema`, snapshots the live tables and plans.
    ///
    /// # Errors
    ///
    /// Fails when a live table cannot be read or planning fails.
    pub async fn prepare<I>(&self, introspector: &mut I, schema: &Schema) -> Result<ReconcilePlan>
    where
        I: Introspector + ?Sized,
    {
        schema.validate()?;
        let snapshots = self.snapshot(introspector, schema).await?;
        self.plan(introspector.dialect(), schema, &snapshots)
    }

    /// Applies a plan, stopping at the first failing statement. Operations
    /// applied before the failure stay applied.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Execution`] for the first statement that fails;
    /// earlier operations stay applied.
    pub async fn apply<I>(&self, introspector: &mut I, plan: &ReconcilePlan) -> Result<ReconcileReport>
    where
        I: Introspector + ?Sized,
    {
        let mut report = ReconcileReport {
            suppressed: plan.suppressed.len(),
            ..ReconcileReport::default()
        };
        for planned in &plan.operations {
            info!(
                table = %planned.table(),
                operation = %planned.operation.description(),
                dry_run = introspector.is_dry_run(),
                "Applying operation"
            );
            introspector
                .apply(&planned.operation, &planned.statements)
                .await?;
            report.operations += 1;
            report.statements += planned.statements.len();
            report.tables.insert(planned.table().to_string());
        }
        info!(
            operations = report.operations,
            statements = report.statements,
            "Reconciliation complete"
        );
        Ok(report)
    }

    /// Converges the database behind `introspector` on `schema`.
    ///
    /// # Errors
    ///
    /// Fails like [`Reconciler::prepare`] and [`Reconciler::apply`].
    pub async fn reconcile<I>(&self, introspector: &mut I, schema: &Schema) -> Result<ReconcileReport>
    where
        I: Introspector + ?Sized,
    {
        let plan = self.prepare(introspector, schema).await?;
        self.apply(introspector, &plan).await
    }
}

/// Pairs declared columns with live columns. A pending rename matches the
/// live column by its old name first, then by its new name.
fn match_columns<'t>(table: &Table, live: &'t Table) -> Vec<ColumnMatch<'t>> {
    let find = |name: &str| live.columns.iter().find(|c| c.name == name);
    table
        .columns
        .iter()
        .map(|declared| {
            let mut column = declared.clone();
            column.primary = table.primary_key.iter().any(|c| c == declared.target_name());
            let by_old_name = declared.new_name.as_ref().and_then(|_| find(&declared.name));
            match by_old_name {
                Some(live_column) => ColumnMatch {
                    declared: column,
                    live: Some(live_column),
                },
                None => {
                    let column = settled(column);
                    let live_column = find(&column.name);
                    ColumnMatch {
                        declared: column,
                        live: live_column,
                    }
                }
            }
        })
        .collect()
}

/// Column as compared with its live counterpart. Numeric defaults compare by
/// value, so a live `0.00` matches a declared `0`.
fn comparable(column: &Column) -> Column {
    let mut column = column.clone();
    if column.column_type.is_numeric() {
        column.default = column.default.map(numeric_value);
    }
    column
}

fn numeric_value(value: Value) -> Value {
    let number = match &value {
        Value::Integer(_) => return value,
        Value::Float(v) => *v,
        Value::Text(text) => match text.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => return value,
        },
    };
    number
        .to_string()
        .parse::<i64>()
        .map_or(Value::Float(number), Value::Integer)
}

fn settled(mut column: Column) -> Column {
    if let Some(new_name) = column.new_name.take() {
        column.name = new_name;
    }
    column
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnType, Dialect};
    use crate::dialect::{MySqlDialect, PostgresDialect};
    use crate::error::ReconcileError;
    use crate::introspect::{ExecutionMode, MemoryIntrospector};
    use crate::schema::{ForeignKey, ForeignKeyAction, Index};

    fn users() -> Table {
        Table::new("users")
            .column(Column::new("id", ColumnType::Int).primary_key().identity())
            .column(Column::new("email", ColumnType::VarChar).length(255).not_null())
            .index(Index::new("idx_email", ["email"]).unique())
    }

    fn posts() -> Table {
        Table::new("posts")
            .column(Column::new("id", ColumnType::Int).primary_key().identity())
            .column(Column::new("user_id", ColumnType::Int).not_null())
            .column(Column::new("title", ColumnType::VarChar).length(200))
            .foreign_key(
                ForeignKey::new("fk_posts_user", ["user_id"], "users", ["id"])
                    .on_delete(ForeignKeyAction::Cascade),
            )
    }

    fn snapshot(table: Table) -> (String, TableSnapshot) {
        (
            table.name.clone(),
            TableSnapshot {
                table,
                primary_key_name: "PRIMARY".to_string(),
            },
        )
    }

    fn kinds(plan: &ReconcilePlan) -> Vec<String> {
        plan.operations
            .iter()
            .map(|op| op.operation.description())
            .collect()
    }

    #[test]
    fn test_creates_missing_tables_and_defers_foreign_keys() {
        let schema = Schema::new().table(posts()).table(users());
        let plan = Reconciler::default()
            .plan(&MySqlDialect::new(), &schema, &BTreeMap::new())
            .unwrap();

        assert_eq!(
            kinds(&plan),
            vec![
                "create table posts",
                "create table users",
                "add foreign key fk_posts_user to posts",
            ]
        );
        let SchemaOperation::CreateTable { table } = &plan.operations[0].operation else {
            panic!("expected a create");
        };
        assert!(table.foreign_keys.is_empty());
    }

    #[test]
    fn test_unchanged_schema_plans_nothing() {
        let live = BTreeMap::from([snapshot(users()), snapshot(posts())]);
        let schema = Schema::new().table(users()).table(posts());
        let plan = Reconciler::default()
            .plan(&MySqlDialect::new(), &schema, &live)
            .unwrap();
        assert!(plan.is_empty(), "unexpected operations: {:?}", kinds(&plan));
    }

    #[test]
    fn test_drops_before_adds() {
        let live = Table::new("t")
            .column(Column::new("id", ColumnType::Int).primary_key())
            .column(Column::new("legacy", ColumnType::Text))
            .index(Index::new("idx_legacy", ["legacy"]));
        let declared = Table::new("t")
            .column(Column::new("id", ColumnType::Int).primary_key())
            .column(Column::new("fresh", ColumnType::Text));

        let plan = Reconciler::default()
            .plan(
                &MySqlDialect::new(),
                &Schema::new().table(declared),
                &BTreeMap::from([snapshot(live)]),
            )
            .unwrap();

        assert_eq!(
            plan.statements(),
            vec![
                "DROP INDEX `idx_legacy` ON `t`",
                "ALTER TABLE `t` DROP COLUMN `legacy`",
                "ALTER TABLE `t` ADD COLUMN `fresh` text COLLATE utf8mb4_unicode_ci NULL",
            ]
        );
        assert!(plan.is_destructive());
    }

    #[test]
    fn test_drops_can_be_suppressed() {
        let live = Table::new("t")
            .column(Column::new("id", ColumnType::Int))
            .column(Column::new("legacy", ColumnType::Text));
        let declared = Table::new("t").column(Column::new("id", ColumnType::Int));

        let plan = Reconciler::new(ReconcilerOptions { allow_drops: false })
            .plan(
                &MySqlDialect::new(),
                &Schema::new().table(declared),
                &BTreeMap::from([snapshot(live)]),
            )
            .unwrap();

        assert!(plan.is_empty());
        assert_eq!(plan.suppressed.len(), 1);
    }

    #[test]
    fn test_new_identity_column_gets_follow_up_after_primary_key() {
        let live = Table::new("t").column(Column::new("name", ColumnType::Text));
        let declared = Table::new("t")
            .column(Column::new("id", ColumnType::Int).primary_key().identity())
            .column(Column::new("name", ColumnType::Text));

        let plan = Reconciler::default()
            .plan(
                &MySqlDialect::new(),
                &Schema::new().table(declared),
                &BTreeMap::from([snapshot(live)]),
            )
            .unwrap();

        assert_eq!(
            plan.statements(),
            vec![
                "ALTER TABLE `t` ADD COLUMN `id` int(11) NOT NULL",
                "ALTER TABLE `t` ADD PRIMARY KEY (`id`)",
                "ALTER TABLE `t` CHANGE `id` `id` int(11) NOT NULL AUTO_INCREMENT",
            ]
        );
    }

    #[test]
    fn test_existing_column_becomes_identity() {
        let live = Table::new("t").column(Column::new("id", ColumnType::Int).primary_key());
        let declared = Table::new("t").column(Column::new("id", ColumnType::Int).primary_key().identity());

        let plan = Reconciler::default()
            .plan(
                &PostgresDialect::new(),
                &Schema::new().table(declared),
                &BTreeMap::from([snapshot(live)]),
            )
            .unwrap();

        assert_eq!(
            plan.statements(),
            vec!["ALTER TABLE \"t\" ALTER COLUMN \"id\" ADD GENERATED BY DEFAULT AS IDENTITY"]
        );
    }

    #[test]
    fn test_numeric_defaults_compare_by_value() {
        let live = Table::new("t")
            .column(
                Column::new("score", ColumnType::Decimal)
                    .length((8, 2))
                    .not_null()
                    .default_value("0.00"),
            )
            .column(
                Column::new("rate", ColumnType::Decimal)
                    .length((5, 2))
                    .default_value("1.50"),
            )
            .column(Column::new("code", ColumnType::VarChar).length(8).default_value("0.00"));
        let declared = Table::new("t")
            .column(
                Column::new("score", ColumnType::Decimal)
                    .length((8, 2))
                    .not_null()
                    .default_value(0),
            )
            .column(
                Column::new("rate", ColumnType::Decimal)
                    .length((5, 2))
                    .default_value(1.5),
            )
            .column(Column::new("code", ColumnType::VarChar).length(8).default_value("0"));

        let plan = Reconciler::default()
            .plan(
                &MySqlDialect::new(),
                &Schema::new().table(declared),
                &BTreeMap::from([snapshot(live)]),
            )
            .unwrap();

        // Text columns still compare literally.
        assert_eq!(
            plan.statements(),
            vec!["ALTER TABLE `t` CHANGE `code` `code` varchar(8) COLLATE utf8mb4_unicode_ci NULL DEFAULT '0'"]
        );
    }

    #[test]
    fn test_unsigned_drift_is_changed() {
        let live = Table::new("t").column(Column::new("hits", ColumnType::Int).unsigned().not_null());
        let declared = Table::new("t").column(Column::new("hits", ColumnType::Int).not_null());

        let plan = Reconciler::default()
            .plan(
                &MySqlDialect::new(),
                &Schema::new().table(declared),
                &BTreeMap::from([snapshot(live.clone())]),
            )
            .unwrap();
        assert_eq!(
            plan.statements(),
            vec!["ALTER TABLE `t` CHANGE `hits` `hits` int(11) NOT NULL"]
        );

        let plan = Reconciler::default()
            .plan(
                &MySqlDialect::new(),
                &Schema::new().table(live.clone()),
                &BTreeMap::from([snapshot(live)]),
            )
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_primary_key_replacement() {
        let live = Table::new("m")
            .column(Column::new("a", ColumnType::Int).primary_key())
            .column(Column::new("b", ColumnType::Int).not_null());
        let declared = Table::new("m")
            .column(Column::new("a", ColumnType::Int).primary_key())
            .column(Column::new("b", ColumnType::Int).primary_key());

        let plan = Reconciler::default()
            .plan(
                &MySqlDialect::new(),
                &Schema::new().table(declared),
                &BTreeMap::from([snapshot(live)]),
            )
            .unwrap();

        assert_eq!(
            plan.statements(),
            vec![
                "ALTER TABLE `m` DROP PRIMARY KEY",
                "ALTER TABLE `m` ADD PRIMARY KEY (`a`, `b`)",
            ]
        );
    }

    #[test]
    fn test_primary_key_dropped_with_its_columns_is_not_dropped_again() {
        let live = Table::new("m")
            .column(Column::new("old_id", ColumnType::Int).primary_key())
            .column(Column::new("id", ColumnType::Int).not_null());
        let declared = Table::new("m").column(Column::new("id", ColumnType::Int).primary_key());

        let plan = Reconciler::default()
            .plan(
                &MySqlDialect::new(),
                &Schema::new().table(declared),
                &BTreeMap::from([snapshot(live)]),
            )
            .unwrap();

        assert_eq!(
            plan.statements(),
            vec![
                "ALTER TABLE `m` DROP COLUMN `old_id`",
                "ALTER TABLE `m` ADD PRIMARY KEY (`id`)",
            ]
        );
    }

    #[test]
    fn test_rename_matches_old_name() {
        let live = Table::new("users")
            .column(Column::new("mail", ColumnType::VarChar).length(255))
            .index(Index::new("idx_mail", ["mail"]));
        let declared = Table::new("users")
            .column(Column::new("mail", ColumnType::VarChar).length(255).rename_to("email"))
            .index(Index::new("idx_mail", ["email"]));

        let plan = Reconciler::default()
            .plan(
                &MySqlDialect::new(),
                &Schema::new().table(declared.clone()),
                &BTreeMap::from([snapshot(live)]),
            )
            .unwrap();
        assert_eq!(
            plan.statements(),
            vec!["ALTER TABLE `users` CHANGE `mail` `email` varchar(255) COLLATE utf8mb4_unicode_ci NULL"]
        );

        // Once renamed, the declaration matches by its new name.
        let renamed = Table::new("users")
            .column(Column::new("email", ColumnType::VarChar).length(255))
            .index(Index::new("idx_mail", ["email"]));
        let plan = Reconciler::default()
            .plan(
                &MySqlDialect::new(),
                &Schema::new().table(declared),
                &BTreeMap::from([snapshot(renamed)]),
            )
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_changed_foreign_key_is_dropped_first_and_added_last() {
        let live_posts = posts();
        let declared_posts = Table::new("posts")
            .column(Column::new("id", ColumnType::Int).primary_key().identity())
            .column(Column::new("user_id", ColumnType::Int).not_null())
            .column(Column::new("title", ColumnType::VarChar).length(250))
            .foreign_key(ForeignKey::new("fk_posts_user", ["user_id"], "users", ["id"]));

        let plan = Reconciler::default()
            .plan(
                &MySqlDialect::new(),
                &Schema::new().table(users()).table(declared_posts),
                &BTreeMap::from([snapshot(users()), snapshot(live_posts)]),
            )
            .unwrap();

        assert_eq!(
            kinds(&plan),
            vec![
                "drop foreign key fk_posts_user from posts",
                "change column posts.title",
                "add foreign key fk_posts_user to posts",
            ]
        );
    }

    #[test]
    fn test_restrict_and_no_action_are_not_drift_on_mysql() {
        let live = posts();
        let mut declared = posts();
        declared.foreign_keys[0].on_update = ForeignKeyAction::Restrict;

        let plan = Reconciler::default()
            .plan(
                &MySqlDialect::new(),
                &Schema::new().table(users()).table(declared),
                &BTreeMap::from([snapshot(users()), snapshot(live)]),
            )
            .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_index_and_comment_changes() {
        let live = users();
        let declared = Table::new("users")
            .column(Column::new("id", ColumnType::Int).primary_key().identity())
            .column(Column::new("email", ColumnType::VarChar).length(255).not_null())
            .index(Index::new("idx_email", ["email"]))
            .comment("accounts");

        let plan = Reconciler::default()
            .plan(
                &MySqlDialect::new(),
                &Schema::new().table(declared),
                &BTreeMap::from([snapshot(live)]),
            )
            .unwrap();

        assert_eq!(
            plan.statements(),
            vec![
                "DROP INDEX `idx_email` ON `users`",
                "CREATE INDEX `idx_email` ON `users` (`email`)",
                "ALTER TABLE `users` COMMENT = 'accounts'",
            ]
        );
    }

    #[test]
    fn test_column_comment_change_on_postgres() {
        let live = Table::new("t").column(Column::new("n", ColumnType::Int));
        let declared = Table::new("t").column(Column::new("n", ColumnType::Int).comment("count"));

        let plan = Reconciler::default()
            .plan(
                &PostgresDialect::new(),
                &Schema::new().table(declared),
                &BTreeMap::from([snapshot(live)]),
            )
            .unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan.statements().last().copied(),
            Some("COMMENT ON COLUMN \"t\".\"n\" IS 'count'")
        );
    }

    #[test]
    fn test_unsupported_type_fails_planning() {
        let schema = Schema::new().table(
            Table::new("events").column(Column::new("at", ColumnType::DateTimeOffset)),
        );
        let err = Reconciler::default()
            .plan(&MySqlDialect::new(), &schema, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::UnsupportedType { table: Some(ref t), .. } if t == "events"
        ));
    }

    #[test]
    fn test_inconsistent_schema_fails_planning() {
        let schema = Schema::new().table(
            Table::new("t")
                .column(Column::new("a", ColumnType::Int))
                .index(Index::new("idx_b", ["b"])),
        );
        assert!(matches!(
            Reconciler::default().plan(&MySqlDialect::new(), &schema, &BTreeMap::new()),
            Err(ReconcileError::Inconsistent { .. })
        ));
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let schema = Schema::new().table(users()).table(posts());
        let mut memory = MemoryIntrospector::new(Schema::new(), Dialect::Postgres, ExecutionMode::Live);
        let reconciler = Reconciler::default();

        let report = reconciler.reconcile(&mut memory, &schema).await.unwrap();
        assert_eq!(report.operations, 3);
        assert_eq!(report.tables.len(), 2);

        let plan = reconciler.prepare(&mut memory, &schema).await.unwrap();
        assert!(plan.is_empty(), "unexpected operations: {:?}", kinds(&plan));
    }
}
