//! Destination table schema types

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Regex for valid column names
static COLUMN_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid column regex"));

/// Scalar column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScalarType {
    String,
    Integer,
    Timestamp,
}

impl ScalarType {
    /// Column type used when creating and loading the table
    pub fn sql_type(self) -> &'static str {
        match self {
            ScalarType::String => "VARCHAR",
            ScalarType::Integer => "BIGINT",
            ScalarType::Timestamp => "TIMESTAMP",
        }
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarType::String => write!(f, "STRING"),
            ScalarType::Integer => write!(f, "INTEGER"),
            ScalarType::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

/// Column nullability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnMode {
    #[default]
    Nullable,
    Required,
}

impl std::fmt::Display for ColumnMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnMode::Nullable => write!(f, "NULLABLE"),
            ColumnMode::Required => write!(f, "REQUIRED"),
        }
    }
}

/// One column of the destination table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,

    #[serde(rename = "type")]
    pub column_type: ScalarType,

    #[serde(default)]
    pub mode: ColumnMode,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ScalarType, mode: ColumnMode) -> Self {
        Self {
            name: name.into(),
            column_type,
            mode,
        }
    }

    /// Nullable column
    pub fn nullable(name: impl Into<String>, column_type: ScalarType) -> Self {
        Self::new(name, column_type, ColumnMode::Nullable)
    }
}

/// Ordered list of columns making up a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableSchema {
    columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Self {
        Self { columns }
    }

    /// The twelve columns of the enriched events table
    pub fn events_destination() -> Self {
        use ScalarType::{Integer, String, Timestamp};

        Self::new(vec![
            ColumnDescriptor::nullable("email", String),
            ColumnDescriptor::nullable("post_id", Integer),
            ColumnDescriptor::nullable("post_slug", String),
            ColumnDescriptor::nullable("post_date", Timestamp),
            ColumnDescriptor::nullable("timestamp", Timestamp),
            ColumnDescriptor::nullable("event", String),
            ColumnDescriptor::nullable("useragent", String),
            ColumnDescriptor::nullable("subject", String),
            ColumnDescriptor::nullable("ip", String),
            ColumnDescriptor::nullable("channel", String),
            ColumnDescriptor::nullable("org", String),
            ColumnDescriptor::nullable("org_sync_date", Timestamp),
        ])
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Check the schema has columns, valid names and no duplicates
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::schema("schema has no columns"));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !COLUMN_NAME_REGEX.is_match(&column.name) {
                return Err(Error::schema(format!(
                    "invalid column name '{}'",
                    column.name
                )));
            }
            if !seen.insert(column.name.to_lowercase()) {
                return Err(Error::schema(format!(
                    "duplicate column '{}'",
                    column.name
                )));
            }
        }

        Ok(())
    }
}

impl Default for TableSchema {
    fn default() -> Self {
        Self::events_destination()
    }
}
