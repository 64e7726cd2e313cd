//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::JobConfig;
use crate::error::{Result, ResultExt};
use crate::pipeline::{BatchPipeline, RunOptions};
use crate::warehouse::Session;
use serde_json::{json, Value};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run { dry_run } => self.run_job(*dry_run),
            Commands::Timeline { user } => self.timeline(user.as_deref()),
            Commands::Validate => self.validate(),
            Commands::Schema => self.schema(),
        }
    }

    /// Load the job from `--job` or the environment
    fn load_job(&self) -> Result<JobConfig> {
        match &self.cli.job {
            Some(path) => JobConfig::from_file(path),
            None => JobConfig::from_env()
                .context("No job file given (use -j) and environment is incomplete"),
        }
    }

    fn run_job(&self, dry_run: bool) -> Result<()> {
        let pipeline = BatchPipeline::new(self.load_job()?);
        let summary = pipeline.run(RunOptions { dry_run })?;

        self.output_message(&json!({
            "type": "SUMMARY",
            "summary": summary,
        }));
        Ok(())
    }

    fn timeline(&self, user: Option<&str>) -> Result<()> {
        let job = self.load_job()?;
        let session = Session::with_credential(&job.org_source.credential)?;
        let (timeline, _) = BatchPipeline::new(job).build_timeline(&session)?;

        let Some(user) = user else {
            self.output_message(&json!({
                "type": "TIMELINE",
                "timeline": timeline,
            }));
            return Ok(());
        };

        let history: Vec<Value> = timeline
            .get(user)
            .map(|history| {
                history
                    .newest_first()
                    .into_iter()
                    .map(|(org, marker)| json!({ "org": org, "since": marker }))
                    .collect()
            })
            .unwrap_or_default();

        self.output_message(&json!({
            "type": "TIMELINE",
            "user": user.to_lowercase(),
            "known": timeline.contains_user(user),
            "history": history,
        }));
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        // Loading validates
        let job = self.load_job()?;

        self.output_message(&json!({
            "type": "LOG",
            "log": {
                "level": "INFO",
                "message": format!(
                    "Job is valid: {} -> {} ({:?} policy, {} columns)",
                    job.events.table,
                    job.destination.table,
                    job.resolution.policy,
                    job.destination.schema.len()
                )
            }
        }));
        Ok(())
    }

    fn schema(&self) -> Result<()> {
        let schema = match &self.cli.job {
            Some(_) => self.load_job()?.destination.schema,
            None => crate::schema::TableSchema::events_destination(),
        };

        self.output_message(&json!({
            "type": "SCHEMA",
            "schema": schema,
        }));
        Ok(())
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}
