//! Destination schema module
//!
//! Typed column descriptors for the table enriched events are loaded into.
//! Column types come from a closed set (`STRING`, `INTEGER`, `TIMESTAMP`) and
//! each column is `NULLABLE` or `REQUIRED`.

mod types;

pub use types::{ColumnDescriptor, ColumnMode, ScalarType, TableSchema};
