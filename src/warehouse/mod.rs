//! Warehouse access via DuckDB
//!
//! This module provides the query and bulk-load boundary of the job. A
//! [`Session`] attaches one store (DuckDB file, SQLite, PostgreSQL, MySQL)
//! described by a [`Credential`] profile.

mod credential;
mod session;
pub mod sql;

pub use credential::{Credential, Engine};
pub use session::{Session, WAREHOUSE_ALIAS};
pub use sql::{validate_column, validate_identifier};

use crate::error::{Error, Result};
use crate::schema::TableSchema;
use crate::types::JsonObject;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

/// One result row keyed by column name
pub type Row = JsonObject;

/// Runs SQL and returns every row, or fails
pub trait QueryExecutor {
    fn run(&self, sql: &str) -> Result<Vec<Row>>;
}

/// Appends newline-delimited JSON files to tables
pub trait BulkLoader {
    /// Create the table (and its schema) if missing
    fn prepare_table(&self, table: &str, schema: &TableSchema) -> Result<()>;

    /// Delete every row of the table, returning how many were removed
    fn truncate(&self, table: &str) -> Result<usize>;

    /// Append the file's rows, returning how many were loaded
    fn load(&self, file: &Path, table: &str, schema: &TableSchema) -> Result<usize>;
}

/// Run a query and deserialize each row
pub fn fetch<T: DeserializeOwned>(executor: &dyn QueryExecutor, sql: &str) -> Result<Vec<T>> {
    executor
        .run(sql)?
        .into_iter()
        .map(|row| {
            serde_json::from_value(Value::Object(row))
                .map_err(|e| Error::query(sql, format!("Unexpected row shape: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::org::OrgChangeEvent;
    use serde_json::json;

    struct CannedExecutor(Vec<Value>);

    impl QueryExecutor for CannedExecutor {
        fn run(&self, _sql: &str) -> Result<Vec<Row>> {
            Ok(self
                .0
                .iter()
                .filter_map(|v| v.as_object().cloned())
                .collect())
        }
    }

    #[test]
    fn test_fetch_deserializes_rows() {
        let executor = CannedExecutor(vec![
            json!({"user": "a@x.com", "org": "org1", "changed_at": "2020-01-01 00:00:00"}),
            json!({"user": "b@x.com", "org": null, "changed_at": "2020-02-01 00:00:00"}),
        ]);

        let events: Vec<OrgChangeEvent> = fetch(&executor, "SELECT ...").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].org.as_deref(), Some("org1"));
        assert_eq!(events[1].org, None);
    }

    #[test]
    fn test_fetch_reports_bad_rows() {
        let executor = CannedExecutor(vec![json!({"user": "a@x.com"})]);
        let err = fetch::<OrgChangeEvent>(&executor, "SELECT 1").unwrap_err();
        assert!(matches!(err, Error::Query { .. }));
    }
}
