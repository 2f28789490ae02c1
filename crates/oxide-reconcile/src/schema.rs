//! Declarative schema model.
//!
//! These types describe the structure a database should have. They are built
//! once per schema load (through the consuming builders below or from JSON)
//! and are also what the introspectors produce when reading a live database,
//! so declared and live structure can be compared directly.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::{ColumnType, Length};
use crate::error::{ReconcileError, Result};

/// A literal value used for column defaults and admin-user parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer literal.
    Integer(i64),
    /// Floating point literal.
    Float(f64),
    /// Text; quoted only for string-like column types.
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    /// No action (default).
    #[default]
    NoAction,
    /// Restrict deletion/update.
    Restrict,
    /// Cascade the operation.
    Cascade,
    /// Set to NULL.
    SetNull,
    /// Set to default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation.
    #[must_use]
    pub const fn to_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

impl FromStr for ForeignKeyAction {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NO ACTION" => Ok(Self::NoAction),
            "RESTRICT" => Ok(Self::Restrict),
            "CASCADE" => Ok(Self::Cascade),
            "SET NULL" => Ok(Self::SetNull),
            "SET DEFAULT" => Ok(Self::SetDefault),
            other => Err(ReconcileError::Introspection(format!(
                "unknown referential action '{other}'"
            ))),
        }
    }
}

const fn default_true() -> bool {
    true
}

// serde hands `skip_serializing_if` predicates a reference.
#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_true(value: &bool) -> bool {
    *value
}

/// A single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Current column name.
    pub name: String,
    /// Pending rename target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    /// Logical type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Length, precision or value list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<Length>,
    /// Unsigned numeric column (MySQL only).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unsigned: bool,
    /// Whether the column accepts NULL.
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary: bool,
    /// Whether the column is an identity/auto-increment column.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub identity: bool,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Free-text comment.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    /// Explicit collation; the dialect default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
}

impl Column {
    /// Creates a nullable column with no length, default or comment.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            new_name: None,
            column_type,
            length: None,
            unsigned: false,
            nullable: true,
            primary: false,
            identity: false,
            default: None,
            comment: String::new(),
            collation: None,
        }
    }

    /// Sets the length, precision or value list.
    #[must_use]
    pub fn length(mut self, length: impl Into<Length>) -> Self {
        self.length = Some(length.into());
        self
    }

    /// Marks a numeric column as unsigned.
    #[must_use]
    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    /// Sets nullability.
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as part of the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary = true;
        self.nullable = false;
        self
    }

    /// Marks the column as an identity/auto-increment column.
    #[must_use]
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Renames the column to `new_name` on the next reconciliation.
    #[must_use]
    pub fn rename_to(mut self, new_name: impl Into<String>) -> Self {
        self.new_name = Some(new_name.into());
        self
    }

    /// Sets an explicit collation.
    #[must_use]
    pub fn with_collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    /// Name the column has once reconciled.
    #[must_use]
    pub fn target_name(&self) -> &str {
        self.new_name.as_deref().unwrap_or(&self.name)
    }
}

/// A secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    #[serde(default)]
    pub unique: bool,
}

impl Index {
    /// Creates a non-unique index.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Makes the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,
    /// Local columns, in order.
    pub columns: Vec<String>,
    /// Referenced table.
    pub referenced_table: String,
    /// Referenced columns, in order.
    pub referenced_columns: Vec<String>,
    /// Action on delete.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// Action on update.
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    /// Creates a foreign key with `NO ACTION` on both events.
    #[must_use]
    pub fn new<I, S, J, T>(
        name: impl Into<String>,
        columns: I,
        referenced_table: impl Into<String>,
        referenced_columns: J,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            referenced_table: referenced_table.into(),
            referenced_columns: referenced_columns.into_iter().map(Into::into).collect(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    /// Sets the on-delete action.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Sets the on-update action.
    #[must_use]
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }
}

/// Privileges a principal holds on a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// User or role.
    pub principal: String,
    /// Privilege names (`SELECT`, `INSERT`, ...).
    pub privileges: BTreeSet<String>,
    /// Whether the principal may grant the privileges further.
    pub grantable: bool,
}

/// A table with its columns, keys and indices.
///
/// When read from JSON, columns flagged `"primary": true` join `primary_key`
/// after the columns it already lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TableRecord")]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Columns, in declaration order.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Primary key columns, in key order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    /// Secondary indices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indices: Vec<Index>,
    /// Foreign keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
    /// Table comment; left untouched when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Serialized form of [`Table`] before the primary key flags are merged.
#[derive(Deserialize)]
struct TableRecord {
    name: String,
    #[serde(default)]
    columns: Vec<Column>,
    #[serde(default)]
    primary_key: Vec<String>,
    #[serde(default)]
    indices: Vec<Index>,
    #[serde(default)]
    foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    comment: Option<String>,
}

impl From<TableRecord> for Table {
    fn from(record: TableRecord) -> Self {
        let mut primary_key = record.primary_key;
        for column in record.columns.iter().filter(|c| c.primary) {
            let name = column.target_name();
            if !primary_key.iter().any(|c| c == name) {
                primary_key.push(name.to_string());
            }
        }
        let mut columns = record.columns;
        for column in &mut columns {
            column.primary = primary_key.iter().any(|c| c == column.target_name());
        }
        Self {
            name: record.name,
            columns,
            primary_key,
            indices: record.indices,
            foreign_keys: record.foreign_keys,
            comment: record.comment,
        }
    }
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indices: Vec::new(),
            foreign_keys: Vec::new(),
            comment: None,
        }
    }

    /// Adds a column. Primary key columns join the key in declaration order.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        let name = column.target_name().to_string();
        if column.primary && !self.primary_key.contains(&name) {
            self.primary_key.push(name);
        }
        self.columns.push(column);
        self
    }

    /// Sets the primary key explicitly, flagging the named columns.
    #[must_use]
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        for column in &mut self.columns {
            column.primary = self.primary_key.iter().any(|c| c == column.target_name());
        }
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indices.push(index);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// Sets the table comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Gets a column by its reconciled name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.target_name() == name)
    }

    /// Gets an index by name.
    #[must_use]
    pub fn get_index(&self, name: &str) -> Option<&Index> {
        self.indices.iter().find(|i| i.name == name)
    }

    /// Gets a foreign key by name.
    #[must_use]
    pub fn get_foreign_key(&self, name: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.name == name)
    }

    /// Checks the structural invariants of the table.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Inconsistent`] listing every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let mut seen = BTreeSet::new();
        for column in &self.columns {
            if !seen.insert(column.target_name()) {
                problems.push(format!("duplicate column '{}'", column.target_name()));
            }
        }

        let identities: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.identity)
            .map(Column::target_name)
            .collect();
        if identities.len() > 1 {
            problems.push(format!(
                "more than one identity column: {}",
                identities.join(", ")
            ));
        }

        for name in &self.primary_key {
            if !seen.contains(name.as_str()) {
                problems.push(format!("primary key references missing column '{name}'"));
            }
        }
        for column in &self.columns {
            let name = column.target_name();
            let keyed = self.primary_key.iter().any(|c| c == name);
            if column.primary && !keyed {
                problems.push(format!("column '{name}' is flagged primary but not in the primary key"));
            } else if keyed && !column.primary {
                problems.push(format!("primary key column '{name}' is not flagged primary"));
            }
        }

        let mut index_names = BTreeSet::new();
        for index in &self.indices {
            if !index_names.insert(index.name.as_str()) {
                problems.push(format!("duplicate index '{}'", index.name));
            }
            if index.columns.is_empty() {
                problems.push(format!("index '{}' has no columns", index.name));
            }
            for column in &index.columns {
                if !seen.contains(column.as_str()) {
                    problems.push(format!(
                        "index '{}' references missing column '{column}'",
                        index.name
                    ));
                }
            }
        }

        let mut fk_names = BTreeSet::new();
        for fk in &self.foreign_keys {
            if !fk_names.insert(fk.name.as_str()) {
                problems.push(format!("duplicate foreign key '{}'", fk.name));
            }
            if fk.columns.is_empty() {
                problems.push(format!("foreign key '{}' has no columns", fk.name));
            }
            if fk.columns.len() != fk.referenced_columns.len() {
                problems.push(format!(
                    "foreign key '{}' has {} local columns but {} referenced columns",
                    fk.name,
                    fk.columns.len(),
                    fk.referenced_columns.len()
                ));
            }
            for column in &fk.columns {
                if !seen.contains(column.as_str()) {
                    problems.push(format!(
                        "foreign key '{}' references missing column '{column}'",
                        fk.name
                    ));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::Inconsistent {
                table: self.name.clone(),
                problems,
            })
        }
    }
}

/// The full declared schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Tables in declaration order.
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table to the schema.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Gets a mutable table by name.
    #[must_use]
    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    /// Returns table names.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Validates every table, reporting all inconsistencies at once.
    ///
    /// # Errors
    ///
    /// Returns the inconsistency of a single table, or
    /// [`ReconcileError::Multiple`] when several tables are inconsistent.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<ReconcileError> = Vec::new();
        let mut names = BTreeSet::new();
        for table in &self.tables {
            if !names.insert(table.name.as_str()) {
                errors.push(ReconcileError::Inconsistent {
                    table: table.name.clone(),
                    problems: vec!["table declared more than once".to_string()],
                });
            }
            if let Err(e) = table.validate() {
                errors.push(e);
            }
        }
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ReconcileError::Multiple(errors)),
        }
    }

    /// Table names ordered so that referenced tables come first.
    #[must_use]
    pub fn dependency_order(&self) -> Vec<String> {
        let references = self
            .tables
            .iter()
            .map(|t| {
                let targets = t
                    .foreign_keys
                    .iter()
                    .map(|fk| fk.referenced_table.clone())
                    .collect();
                (t.name.clone(), targets)
            })
            .collect();
        sort_by_dependencies(&references)
    }

    /// Parses a schema from JSON.
    ///
    /// # Errors
    ///
    /// Fails when `json` is not a schema document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the schema as pretty JSON.
    ///
    /// # Errors
    ///
    /// Fails when serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Orders table names so every table follows the tables it references.
///
/// `references` maps each table to the tables its foreign keys point at.
/// Ties are broken by name; tables caught in a reference cycle are appended
/// in name order once nothing else can be placed.
#[must_use]
pub fn sort_by_dependencies(references: &BTreeMap<String, BTreeSet<String>>) -> Vec<String> {
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = references
        .iter()
        .map(|(table, targets)| {
            let targets = targets
                .iter()
                .map(String::as_str)
                .filter(|t| *t != table.as_str() && references.contains_key(*t))
                .collect();
            (table.as_str(), targets)
        })
        .collect();

    let mut ordered = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let ready: Vec<&str> = pending
            .iter()
            .filter(|(_, targets)| targets.is_empty())
            .map(|(table, _)| *table)
            .collect();
        let batch = if ready.is_empty() {
            pending.keys().copied().collect()
        } else {
            ready
        };
        for table in batch {
            pending.remove(table);
            for targets in pending.values_mut() {
                targets.remove(table);
            }
            ordered.push(table.to_string());
        }
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Table {
        Table::new("users")
            .column(Column::new("id", ColumnType::Int).primary_key().identity())
            .column(Column::new("email", ColumnType::VarChar).length(255).not_null())
            .index(Index::new("idx_email", ["email"]).unique())
    }

    #[test]
    fn test_column_builder() {
        let col = Column::new("id", ColumnType::BigInt).primary_key().identity();

        assert_eq!(col.name, "id");
        assert!(col.primary);
        assert!(col.identity);
        assert!(!col.nullable);
    }

    #[test]
    fn test_table_builder_collects_primary_key() {
        let table = Table::new("memberships")
            .column(Column::new("user_id", ColumnType::Int).primary_key())
            .column(Column::new("group_id", ColumnType::Int).primary_key())
            .column(Column::new("role", ColumnType::VarChar).length(32));

        assert_eq!(table.primary_key, vec!["user_id", "group_id"]);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_explicit_primary_key_flags_columns() {
        let table = Table::new("t")
            .column(Column::new("a", ColumnType::Int))
            .column(Column::new("b", ColumnType::Int))
            .primary_key(["b"]);

        assert!(!table.columns[0].primary);
        assert!(table.columns[1].primary);
    }

    #[test]
    fn test_rename_uses_target_name() {
        let table = Table::new("users")
            .column(Column::new("mail", ColumnType::VarChar).length(255).rename_to("email"));

        assert!(table.get_column("email").is_some());
        assert!(table.get_column("mail").is_none());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let table = users()
            .column(Column::new("email", ColumnType::Text))
            .index(Index::new("idx_missing", ["nope"]))
            .foreign_key(ForeignKey::new(
                "fk_org",
                ["org_id", "email"],
                "orgs",
                ["id"],
            ));

        let err = table.validate().unwrap_err();
        let ReconcileError::Inconsistent { table, problems } = err else {
            panic!("expected inconsistency");
        };
        assert_eq!(table, "users");
        assert!(problems.contains(&"duplicate column 'email'".to_string()));
        assert!(problems
            .iter()
            .any(|p| p.contains("index 'idx_missing' references missing column 'nope'")));
        assert!(problems
            .iter()
            .any(|p| p.contains("2 local columns but 1 referenced columns")));
        assert!(problems
            .iter()
            .any(|p| p.contains("references missing column 'org_id'")));
    }

    #[test]
    fn test_schema_validate_collects_tables() {
        let broken = Table::new("a").column(Column::new("x", ColumnType::Int)).primary_key(["y"]);
        let schema = Schema::new().table(users()).table(broken.clone()).table(broken);

        assert!(matches!(schema.validate(), Err(ReconcileError::Multiple(errors)) if errors.len() == 3));
    }

    #[test]
    fn test_dependency_order() {
        let schema = Schema::new()
            .table(
                Table::new("posts")
                    .column(Column::new("user_id", ColumnType::Int))
                    .foreign_key(ForeignKey::new("fk_user", ["user_id"], "users", ["id"])),
            )
            .table(Table::new("users").column(Column::new("id", ColumnType::Int)))
            .table(
                Table::new("comments")
                    .column(Column::new("post_id", ColumnType::Int))
                    .foreign_key(ForeignKey::new("fk_post", ["post_id"], "posts", ["id"])),
            );

        assert_eq!(schema.dependency_order(), vec!["users", "posts", "comments"]);
    }

    #[test]
    fn test_dependency_order_breaks_cycles() {
        let mut references = BTreeMap::new();
        references.insert("a".to_string(), BTreeSet::from(["b".to_string()]));
        references.insert("b".to_string(), BTreeSet::from(["a".to_string()]));
        references.insert("c".to_string(), BTreeSet::new());

        assert_eq!(sort_by_dependencies(&references), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_schema_json() {
        let json = r#"{
            "tables": [{
                "name": "users",
                "columns": [
                    {"name": "id", "type": "Int", "nullable": false, "primary": true, "identity": true},
                    {"name": "status", "type": "Enum", "length": ["active", "banned"], "default": "active"},
                    {"name": "score", "type": "Decimal", "length": [8, 2], "default": 0}
                ],
                "primary_key": ["id"]
            }]
        }"#;

        let schema = Schema::from_json(json).unwrap();
        let users = schema.get_table("users").unwrap();
        assert_eq!(users.columns.len(), 3);
        assert_eq!(users.columns[1].length, Some(Length::values(["active", "banned"])));
        assert_eq!(users.columns[1].default, Some(Value::Text("active".into())));
        assert_eq!(users.columns[2].default, Some(Value::Integer(0)));
        assert!(users.columns[1].nullable);

        let reparsed = Schema::from_json(&schema.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, schema);
    }

    #[test]
    fn test_json_primary_flags_join_primary_key() {
        let json = r#"{
            "tables": [{
                "name": "memberships",
                "columns": [
                    {"name": "user_id", "type": "Int", "nullable": false, "primary": true},
                    {"name": "group_id", "type": "Int", "nullable": false},
                    {"name": "role", "type": "VarChar", "length": 32}
                ],
                "primary_key": ["group_id"]
            }]
        }"#;

        let schema = Schema::from_json(json).unwrap();
        let table = schema.get_table("memberships").unwrap();
        assert_eq!(table.primary_key, vec!["group_id", "user_id"]);
        assert!(table.columns[0].primary);
        assert!(table.columns[1].primary);
        assert!(!table.columns[2].primary);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unkeyed_primary_flag() {
        let mut table = users();
        table.primary_key.clear();

        let err = table.validate().unwrap_err();
        let ReconcileError::Inconsistent { problems, .. } = err else {
            panic!("expected inconsistency");
        };
        assert_eq!(
            problems,
            vec!["column 'id' is flagged primary but not in the primary key".to_string()]
        );
    }

    #[test]
    fn test_foreign_key_action_parse() {
        assert_eq!(
            "set null".parse::<ForeignKeyAction>().unwrap(),
            ForeignKeyAction::SetNull
        );
        assert!("EXPLODE".parse::<ForeignKeyAction>().is_err());
    }
}
