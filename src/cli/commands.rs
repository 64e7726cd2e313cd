//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Org attribution for email engagement events
#[derive(Parser, Debug)]
#[command(name = "orgsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Job file (YAML); falls back to environment variables when omitted
    #[arg(short, long, global = true)]
    pub job: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enrich events and load them into the destination table
    Run {
        /// Write the staging file but skip the load
        #[arg(long)]
        dry_run: bool,
    },

    /// Build the org timeline and print it
    Timeline {
        /// Only print this user's history, newest first
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Validate the job without touching the warehouse
    Validate,

    /// Show the destination table schema
    Schema,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["orgsync", "--job", "job.yaml", "run", "--dry-run"]);
        assert_eq!(cli.job, Some(PathBuf::from("job.yaml")));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Run { dry_run: true }));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["orgsync", "timeline", "-u", "A@X.com", "-f", "pretty", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Pretty);
        match cli.command {
            Commands::Timeline { user } => assert_eq!(user.as_deref(), Some("A@X.com")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_job_is_optional() {
        let cli = Cli::parse_from(["orgsync", "validate"]);
        assert!(cli.job.is_none());
        assert!(matches!(cli.command, Commands::Validate));
    }
}
