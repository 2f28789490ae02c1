//! Schema operations.
//!
//! A reconciliation plan is a list of these operations. Each one is rendered to
//! one or more statements by a [`SqlDialect`](crate::dialect::SqlDialect).

use serde::{Deserialize, Serialize};

use crate::schema::{Column, ForeignKey, Index, Table};

/// A single structural change to a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemaOperation {
    /// Create a table with its columns, primary key and indices.
    CreateTable {
        /// Table definition.
        table: Table,
    },

    /// Add a column. Identity is applied by a later [`Self::AddIdentity`].
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: Column,
    },

    /// Drop a column.
    DropColumn {
        /// Table name.
        table: String,
        /// The live column being dropped.
        column: Column,
    },

    /// Redefine an existing column, renaming it when `column.new_name` is set.
    ChangeColumn {
        /// Table name.
        table: String,
        /// Target definition.
        column: Column,
        /// Live definition before the change.
        previous: Column,
    },

    /// Turn an existing column into an identity column.
    AddIdentity {
        /// Table name.
        table: String,
        /// Target definition.
        column: Column,
    },

    /// Drop the primary key constraint.
    DropPrimaryKey {
        /// Table name.
        table: String,
        /// Live constraint name.
        constraint: String,
        /// Columns of the live key.
        columns: Vec<String>,
    },

    /// Add a primary key constraint.
    AddPrimaryKey {
        /// Table name.
        table: String,
        /// Key columns, in order.
        columns: Vec<String>,
    },

    /// Create an index.
    CreateIndex {
        /// Table name.
        table: String,
        /// Index definition.
        index: Index,
    },

    /// Drop an index.
    DropIndex {
        /// Table name.
        table: String,
        /// The live index.
        index: Index,
    },

    /// Add a foreign key constraint.
    AddForeignKey {
        /// Table name.
        table: String,
        /// Foreign key definition.
        foreign_key: ForeignKey,
    },

    /// Drop a foreign key constraint.
    DropForeignKey {
        /// Table name.
        table: String,
        /// The live foreign key.
        foreign_key: ForeignKey,
    },

    /// Replace the table comment.
    SetTableComment {
        /// Table name.
        table: String,
        /// New comment.
        comment: String,
    },
}

impl SchemaOperation {
    /// Name of the table the operation changes.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table } => &table.name,
            Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::ChangeColumn { table, .. }
            | Self::AddIdentity { table, .. }
            | Self::DropPrimaryKey { table, .. }
            | Self::AddPrimaryKey { table, .. }
            | Self::CreateIndex { table, .. }
            | Self::DropIndex { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::DropForeignKey { table, .. }
            | Self::SetTableComment { table, .. } => table,
        }
    }

    /// Whether the operation can lose data.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        matches!(self, Self::DropColumn { .. })
    }

    /// Short human readable description, used in logs and plan output.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable { table } => format!("create table {}", table.name),
            Self::AddColumn { table, column } => {
                format!("add column {table}.{}", column.target_name())
            }
            Self::DropColumn { table, column } => format!("drop column {table}.{}", column.name),
            Self::ChangeColumn { table, column, .. } => match &column.new_name {
                Some(new_name) => format!("rename column {table}.{} to {new_name}", column.name),
                None => format!("change column {table}.{}", column.name),
            },
            Self::AddIdentity { table, column } => {
                format!("make {table}.{} an identity column", column.target_name())
            }
            Self::DropPrimaryKey { table, .. } => format!("drop primary key of {table}"),
            Self::AddPrimaryKey { table, columns } => {
                format!("add primary key ({}) to {table}", columns.join(", "))
            }
            Self::CreateIndex { table, index } => format!("create index {} on {table}", index.name),
            Self::DropIndex { table, index } => format!("drop index {} on {table}", index.name),
            Self::AddForeignKey { table, foreign_key } => {
                format!("add foreign key {} to {table}", foreign_key.name)
            }
            Self::DropForeignKey { table, foreign_key } => {
                format!("drop foreign key {} from {table}", foreign_key.name)
            }
            Self::SetTableComment { table, .. } => format!("set comment of {table}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnType;

    #[test]
    fn test_table_name() {
        let op = SchemaOperation::CreateTable {
            table: Table::new("users"),
        };
        assert_eq!(op.table(), "users");

        let op = SchemaOperation::DropIndex {
            table: "posts".into(),
            index: Index::new("idx_title", ["title"]),
        };
        assert_eq!(op.table(), "posts");
    }

    #[test]
    fn test_description_mentions_rename() {
        let column = Column::new("mail", ColumnType::VarChar)
            .length(255)
            .rename_to("email");
        let op = SchemaOperation::ChangeColumn {
            table: "users".into(),
            previous: Column::new("mail", ColumnType::VarChar).length(255),
            column,
        };
        assert_eq!(op.description(), "rename column users.mail to email");
        assert!(!op.is_destructive());
    }

    #[test]
    fn test_drop_column_is_destructive() {
        let op = SchemaOperation::DropColumn {
            table: "users".into(),
            column: Column::new("legacy", ColumnType::Text),
        };
        assert!(op.is_destructive());
    }
}
