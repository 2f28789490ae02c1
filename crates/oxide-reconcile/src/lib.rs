//! Declarative schema reconciliation for MySQL and PostgreSQL.
//!
//! `oxide-reconcile` converges a live database on a declared [`Schema`]
//! without hand-written migration files:
//! - The declared schema is a list of tables built in Rust or loaded from JSON
//! - Live structure is read back through engine catalogs by an [`Introspector`]
//! - The [`Reconciler`] diffs the two and emits ordered [`SchemaOperation`]s
//! - A [`SqlDialect`] renders every operation to engine specific DDL
//!
//! # Architecture
//!
//! - **Catalog** - Logical column types and their per-dialect mappings
//! - **Dialect** - DDL rendering, pure and side-effect free
//! - **Introspect** - Catalog readers for MySQL, PostgreSQL and an in-memory snapshot
//! - **Reconcile** - Three-phase planner (foreign key drops, tables, foreign key adds)
//! - **Version** - A `(type, key) -> value` marker table inside the managed database
//! - **Codegen** - Builder-call source for live tables
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_reconcile::prelude::*;
//!
//! let schema = Schema::new().table(
//!     Table::new("users")
//!         .column(Column::new("id", ColumnType::Int).primary_key().identity())
//!         .column(Column::new("email", ColumnType::VarChar).length(255).not_null())
//!         .index(Index::new("idx_email", ["email"]).unique()),
//! );
//!
//! let connection = sqlx::MySqlConnection::connect("mysql://root@localhost/app").await?;
//! let settings = ConnectionSettings::new("app");
//! let mut introspector = MySqlIntrospector::new(connection, &settings, ExecutionMode::Live);
//!
//! let report = Reconciler::default().reconcile(&mut introspector, &schema).await?;
//! println!("{} statements executed", report.statements);
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Show the statements that would converge the database
//! oxide-reconcile --url mysql://root@localhost/app plan schema.json
//!
//! # Apply them
//! oxide-reconcile --url mysql://root@localhost/app apply schema.json
//!
//! # Print the live tables as builder-call source
//! oxide-reconcile --url postgres://localhost/app dump
//! ```
//!
//! [`Schema`]: schema::Schema
//! [`Introspector`]: introspect::Introspector
//! [`Reconciler`]: reconcile::Reconciler
//! [`SchemaOperation`]: operations::SchemaOperation
//! [`SqlDialect`]: dialect::SqlDialect

pub mod admin;
pub mod catalog;
pub mod codegen;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod introspect;
pub mod operations;
pub mod reconcile;
pub mod schema;
pub mod version;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::catalog::{ColumnType, Dialect, Length, TypeCatalog};
    pub use crate::config::{load_schema, ConnectionSettings, SchemaParameters};
    pub use crate::connection::{Connection, Row};
    pub use crate::dialect::{for_dialect, MySqlDialect, PostgresDialect, SqlDialect};
    pub use crate::error::{ReconcileError, Result};
    pub use crate::introspect::{
        ExecutionMode, Introspector, MemoryIntrospector, MySqlIntrospector,
        PostgresIntrospector, TableSnapshot,
    };
    pub use crate::operations::SchemaOperation;
    pub use crate::reconcile::{
        PlannedOperation, ReconcilePlan, ReconcileReport, Reconciler, ReconcilerOptions,
    };
    pub use crate::schema::{
        Column, ForeignKey, ForeignKeyAction, Grant, Index, Schema, Table, Value,
    };
}
