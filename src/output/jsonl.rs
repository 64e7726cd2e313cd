//! Newline-delimited JSON writer
//!
//! Writes one JSON object per line, the format the bulk loader consumes.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Newline-delimited JSON file writer
pub struct JsonlWriter {
    /// Buffered file handle
    writer: BufWriter<File>,
    /// Destination path
    path: PathBuf,
    /// Number of rows written
    rows_written: usize,
}

impl JsonlWriter {
    /// Create (or truncate) the file at `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::output(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let file = File::create(&path).map_err(|e| {
            Error::output(format!("Failed to create file {}: {e}", path.display()))
        })?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            rows_written: 0,
        })
    }

    /// Write one record as a line
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)
            .map_err(|e| Error::output(format!("Failed to serialize record: {e}")))?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| Error::output(format!("Failed to write record: {e}")))?;

        self.rows_written += 1;
        Ok(())
    }

    /// Get the number of rows written so far
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the file
    pub fn close(mut self) -> Result<usize> {
        self.writer
            .flush()
            .map_err(|e| Error::output(format!("Failed to flush {}: {e}", self.path.display())))?;
        Ok(self.rows_written)
    }
}

/// Write all records to a newline-delimited JSON file
pub fn write_jsonl<'a, T, I>(path: impl AsRef<Path>, records: I) -> Result<usize>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let path = path.as_ref();
    tracing::info!("Generating JSON file at {}", path.display());

    let mut writer = JsonlWriter::new(path)?;
    for record in records {
        writer.write(record)?;
    }
    let rows = writer.close()?;

    tracing::info!("JSON file created at {} ({} rows)", path.display(), rows);
    Ok(rows)
}
