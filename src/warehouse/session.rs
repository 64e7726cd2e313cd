//! DuckDB-backed warehouse session
//!
//! A session is an in-memory DuckDB connection with one store attached as
//! `warehouse` and selected as the default catalog, so table identifiers in
//! the job file resolve against that store. A session is bound to the
//! credential it was opened with; swapping credentials consumes it.

use super::credential::Credential;
use super::sql::{create_table_sql, load_sql, quote_literal, schema_of, validate_identifier};
use super::{BulkLoader, QueryExecutor, Row};
use crate::error::{Error, Result};
use crate::schema::TableSchema;
use duckdb::Connection;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Catalog name the credential's store is attached under
pub const WAREHOUSE_ALIAS: &str = "warehouse";

/// Warehouse session scoped to one credential
pub struct Session {
    /// DuckDB connection
    conn: Connection,
    /// Credential the store was attached with
    credential: Credential,
}

impl Session {
    /// Open a session with the profile at `path`
    pub fn with_credential(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Credential::from_file(path)?)
    }

    /// Open a session with an already loaded credential
    pub fn open(credential: Credential) -> Result<Self> {
        let label = credential.label();

        let conn = Connection::open_in_memory().map_err(|e| {
            Error::credential(&label, format!("Failed to create DuckDB connection: {e}"))
        })?;

        if let Some(extension) = credential.engine.extension() {
            conn.execute_batch(&format!("INSTALL {extension}; LOAD {extension};"))
                .map_err(|e| {
                    Error::credential(&label, format!("Failed to load {extension} extension: {e}"))
                })?;
        }

        conn.execute_batch(&credential.attach_sql(WAREHOUSE_ALIAS)?)
            .map_err(|e| Error::credential(&label, format!("Failed to attach store: {e}")))?;
        conn.execute_batch(&format!("USE {WAREHOUSE_ALIAS};"))
            .map_err(|e| Error::credential(&label, format!("Failed to select store: {e}")))?;

        tracing::info!("Opened warehouse session on {}", credential.connection_info());

        Ok(Self { conn, credential })
    }

    /// Close this session and open one with another credential
    ///
    /// The old session is dropped before the new one is opened, so nothing
    /// can run against the previous credential afterwards.
    pub fn swap_credential(self, path: impl AsRef<Path>) -> Result<Self> {
        let previous = self.credential.label();
        drop(self);

        let path = path.as_ref();
        tracing::info!("Swapping credential {} -> {}", previous, path.display());
        Self::with_credential(path)
    }

    /// Credential this session is bound to
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Run a trivial query against the attached store
    pub fn check_connection(&self) -> Result<()> {
        self.conn
            .execute_batch("SELECT 1;")
            .map_err(|e| Error::query("SELECT 1", format!("Connection check failed: {e}")))
    }

    /// Check a table exists in the attached store
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        validate_identifier(table)?;
        let sql = format!("SELECT 1 FROM {table} LIMIT 0");
        Ok(self.conn.execute_batch(&sql).is_ok())
    }
}

impl QueryExecutor for Session {
    fn run(&self, sql: &str) -> Result<Vec<Row>> {
        let sql = sql.trim().trim_end_matches(';');
        tracing::debug!("Running query: {}", sql);

        // DuckDB writes the result set as JSON, which keeps column names and
        // renders timestamps in their canonical text form.
        let staging = tempfile::Builder::new()
            .prefix("orgsync_query_")
            .tempdir()
            .map_err(|e| Error::query(sql, format!("Failed to create temp dir: {e}")))?;
        let out = staging.path().join("rows.json");

        let copy_sql = format!(
            "COPY ({sql}) TO {} (FORMAT JSON, ARRAY true);",
            quote_literal(&out.to_string_lossy())
        );
        self.conn
            .execute_batch(&copy_sql)
            .map_err(|e| Error::query(sql, e.to_string()))?;

        let content = fs::read_to_string(&out)
            .map_err(|e| Error::query(sql, format!("Failed to read result: {e}")))?;

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Value> = serde_json::from_str(&content)
            .map_err(|e| Error::query(sql, format!("Failed to parse result: {e}")))?;

        let rows = values
            .into_iter()
            .map(|value| match value {
                Value::Object(row) => Ok(row),
                other => Err(Error::query(sql, format!("Row is not an object: {other}"))),
            })
            .collect::<Result<Vec<Row>>>()?;

        tracing::debug!("Query returned {} rows", rows.len());
        Ok(rows)
    }
}

impl BulkLoader for Session {
    fn prepare_table(&self, table: &str, schema: &TableSchema) -> Result<()> {
        if let Some(schema_name) = schema_of(table) {
            self.conn
                .execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {schema_name};"))
                .map_err(|e| Error::load(table, format!("Failed to create schema: {e}")))?;
        }

        let ddl = create_table_sql(table, schema)?;
        tracing::debug!("Ensuring table: {}", ddl);
        self.conn
            .execute_batch(&ddl)
            .map_err(|e| Error::load(table, format!("Failed to create table: {e}")))
    }

    fn truncate(&self, table: &str) -> Result<usize> {
        validate_identifier(table)?;
        self.conn
            .execute(&format!("DELETE FROM {table}"), [])
            .map_err(|e| Error::load(table, format!("Failed to clear table: {e}")))
    }

    fn load(&self, file: &Path, table: &str, schema: &TableSchema) -> Result<usize> {
        if !file.exists() {
            return Err(Error::load(
                table,
                format!("staging file {} does not exist", file.display()),
            ));
        }

        self.prepare_table(table, schema)?;

        let sql = load_sql(table, file, schema)?;
        tracing::debug!("Loading: {}", sql);

        let rows = self
            .conn
            .execute(&sql, [])
            .map_err(|e| Error::load(table, e.to_string()))?;

        tracing::info!("Loaded {} rows into {}", rows, table);
        Ok(rows)
    }
}
