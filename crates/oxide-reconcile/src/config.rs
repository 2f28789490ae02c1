//! Connection settings, schema parameters and schema file loading.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};
use crate::schema::Schema;

/// Engine options applied when rendering DDL.
///
/// Known keys get their own fields; anything else is kept in `extra` so
/// dialects can read engine-specific options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaParameters {
    /// Default collation for string-like columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
    /// Default character set for new tables and databases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    /// Storage engine for new tables (MySQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Any other parameter.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl SchemaParameters {
    /// Creates empty parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds parameters from a flat key/value map.
    #[must_use]
    pub fn from_map(map: BTreeMap<String, String>) -> Self {
        let mut params = Self::new();
        for (key, value) in map {
            params = params.set(key, value);
        }
        params
    }

    /// Sets one parameter.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match key.as_str() {
            "collation" => self.collation = Some(value),
            "charset" => self.charset = Some(value),
            "engine" => self.engine = Some(value),
            _ => {
                self.extra.insert(key, value);
            }
        }
        self
    }

    /// Looks up a parameter by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "collation" => self.collation.as_deref(),
            "charset" => self.charset.as_deref(),
            "engine" => self.engine.as_deref(),
            _ => self.extra.get(key).map(String::as_str),
        }
    }
}

/// Which database an introspector manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Database (catalog) name.
    pub database: String,
    /// Namespace inside the database (PostgreSQL schema); `public` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Engine options.
    #[serde(default)]
    pub parameters: SchemaParameters,
}

impl ConnectionSettings {
    /// Creates settings for a database with default parameters.
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            schema: None,
            parameters: SchemaParameters::new(),
        }
    }

    /// Sets the namespace.
    #[must_use]
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Sets the engine options.
    #[must_use]
    pub fn parameters(mut self, parameters: SchemaParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Loads and validates a declarative schema from a JSON file.
///
/// # Errors
///
/// Fails when the file cannot be read, is not a schema, or does not validate.
pub fn load_schema(path: &Path) -> Result<Schema> {
    let contents = std::fs::read_to_string(path)?;
    let schema: Schema =
        serde_json::from_str(&contents).map_err(|e| ReconcileError::SchemaFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    schema.validate()?;
    Ok(schema)
}
