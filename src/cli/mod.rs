//! CLI module
//!
//! Command-line interface for running the attribution job.
//!
//! # Commands
//!
//! - `run` - Enrich events and load them (`--dry-run` stops after staging)
//! - `timeline` - Print the org timeline, or one user's history
//! - `validate` - Check the job file without touching the warehouse
//! - `schema` - Show the destination table schema

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
