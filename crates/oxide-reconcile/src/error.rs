//! Error types for schema reconciliation.

use std::path::PathBuf;

use crate::catalog::{ColumnType, Dialect};

/// Errors that can occur while rendering, introspecting or reconciling a schema.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// A logical column type has no mapping in the target dialect.
    #[error(
        "Column type {column_type} is not supported by {dialect} (column '{column}'{})",
        .table.as_deref().map(|t| format!(" in table '{t}'")).unwrap_or_default()
    )]
    UnsupportedType {
        /// The unsupported logical type.
        column_type: ColumnType,
        /// The dialect that rejected it.
        dialect: Dialect,
        /// Owning table, when known.
        table: Option<String>,
        /// Column declaring the type.
        column: String,
    },

    /// A column carries a length the dialect cannot render.
    #[error("Invalid length for column '{column}' ({column_type}): {message}")]
    InvalidLength {
        /// Column name.
        column: String,
        /// Logical type of the column.
        column_type: ColumnType,
        /// What is wrong with the length.
        message: String,
    },

    /// The declared table violates a structural invariant.
    #[error("Table '{table}' is inconsistent:\n{}", .problems.iter().map(|p| format!("  - {p}")).collect::<Vec<_>>().join("\n"))]
    Inconsistent {
        /// Table name.
        table: String,
        /// Every problem found in the table.
        problems: Vec<String>,
    },

    /// A command failed while being executed against the database.
    #[error("Failed to execute statement for table '{table}': {statement}: {source}")]
    Execution {
        /// Table the statement belongs to.
        table: String,
        /// Statement text that failed.
        statement: String,
        /// Underlying failure.
        #[source]
        source: Box<ReconcileError>,
    },

    /// An operation does not fit the structure it is applied to.
    #[error("Invalid schema state: {0}")]
    InvalidState(String),

    /// A catalog query returned data that could not be interpreted.
    #[error("Introspection error: {0}")]
    Introspection(String),

    /// Database error reported by the driver.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading schema files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to load a schema file.
    #[error("Failed to load schema file '{path}': {message}")]
    SchemaFile {
        /// Path to the schema file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Declarative column source could not be parsed.
    #[error("Failed to parse column source '{source_text}': {message}")]
    SourceParse {
        /// Source text that was rejected.
        source_text: String,
        /// Error message.
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Multiple errors occurred.
    #[error("Multiple errors occurred:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Multiple(Vec<ReconcileError>),
}

impl ReconcileError {
    /// Attaches the owning table name to errors raised while rendering a column.
    #[must_use]
    pub fn in_table(self, name: &str) -> Self {
        match self {
            Self::UnsupportedType {
                column_type,
                dialect,
                table: None,
                column,
            } => Self::UnsupportedType {
                column_type,
                dialect,
                table: Some(name.to_string()),
                column,
            },
            other => other,
        }
    }

    /// Wraps a failure raised while executing `statement` for `table`.
    #[must_use]
    pub fn execution(table: &str, statement: &str, source: Self) -> Self {
        Self::Execution {
            table: table.to_string(),
            statement: statement.to_string(),
            source: Box::new(source),
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
