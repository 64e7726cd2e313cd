// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]

//! # orgsync
//!
//! Batch job that attributes email engagement events to the organization a
//! user belonged to, then loads the enriched events into a warehouse table.
//!
//! ## Features
//!
//! - **Org Timeline**: Per-user history of org changes with change markers
//! - **Two Resolution Policies**: Nearest change before the event date, or org family by channel
//! - **Credential Swapping**: Org source, events and destination may use separate profiles
//! - **Staging File**: Newline-delimited JSON bulk-loaded into the destination
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use orgsync::config::JobConfig;
//! use orgsync::pipeline::{BatchPipeline, RunOptions};
//!
//! fn main() -> orgsync::Result<()> {
//!     let job = JobConfig::from_file("jobs/celltelligence.yaml")?;
//!     let summary = BatchPipeline::new(job).run(RunOptions::default())?;
//!     println!("{} events, {} resolved", summary.events, summary.resolved);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        BatchPipeline                          │
//! │  org changes → timeline → enrich events → stage → bulk load   │
//! └───────────────────────────────────────────────────────────────┘
//!                                │
//! ┌────────────┬─────────────────┼───────────────┬───────────────┐
//! │    Org     │     Enrich      │   Warehouse   │    Output     │
//! ├────────────┼─────────────────┼───────────────┼───────────────┤
//! │ Timeline   │ EventRecord     │ Session       │ JSONL writer  │
//! │ Temporal   │ Enricher        │ Credential    │               │
//! │ Channel    │                 │ SQL builders  │               │
//! └────────────┴─────────────────┴───────────────┴───────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Template interpolation
pub mod template;

/// Job configuration
pub mod config;

/// Destination table schema
pub mod schema;

/// Org timeline and resolution policies
pub mod org;

/// Event records
pub mod record;

/// Event enrichment
pub mod enrich;

/// Warehouse sessions, queries and bulk loads via DuckDB
pub mod warehouse;

/// Newline-delimited JSON staging output
pub mod output;

/// Batch pipeline
pub mod pipeline;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use config::JobConfig;
pub use pipeline::{BatchPipeline, JobSummary, RunOptions};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
