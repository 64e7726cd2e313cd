//! Batch pipeline
//!
//! One run: query org changes with the org-source credential, build the
//! timeline, swap to the events credential, fetch events, enrich them, stage
//! them as newline-delimited JSON and bulk-load the file. Any failure aborts
//! the run; nothing is retried or resumed.

use crate::config::{JobConfig, ResolutionPolicy};
use crate::enrich::{EnrichStats, Enricher};
use crate::error::Result;
use crate::org::{build_resolver, OrgChangeEvent, OrgResolver, UserOrgTimeline};
use crate::output::write_jsonl;
use crate::record::EventRecord;
use crate::warehouse::sql::{events_query, org_changes_query, EventFilter};
use crate::warehouse::{fetch, BulkLoader, QueryExecutor, Session};
use serde::Serialize;
use std::time::Instant;

/// Options for a single run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop after writing the staging file
    pub dry_run: bool,
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub policy: ResolutionPolicy,
    pub org_changes: usize,
    pub users: usize,
    pub events: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub staged_rows: usize,
    /// `None` for dry runs
    pub loaded_rows: Option<usize>,
    pub elapsed_ms: u64,
}

/// Orchestrates one enrichment job
pub struct BatchPipeline {
    config: JobConfig,
}

impl BatchPipeline {
    pub fn new(config: JobConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Run the whole job against the configured warehouse
    pub fn run(&self, options: RunOptions) -> Result<JobSummary> {
        let started = Instant::now();
        self.config.validate()?;

        let session = Session::with_credential(&self.config.org_source.credential)?;
        let (timeline, org_changes) = self.build_timeline(&session)?;
        let resolver = build_resolver(timeline, &self.config.resolution)?;

        let session = session.swap_credential(&self.config.events.credential)?;
        let mut events = self.fetch_events(&session)?;
        let stats = Enricher::new(resolver.as_ref(), self.config.resolution.date_field)
            .enrich(&mut events);

        let staged_rows = write_jsonl(&self.config.staging_file, &events)?;

        let loaded_rows = if options.dry_run {
            tracing::info!(
                "Dry run: staged {} rows at {}, skipping load",
                staged_rows,
                self.config.staging_file.display()
            );
            None
        } else {
            let destination = self.config.destination_credential();
            let session = if destination == self.config.events.credential.as_path() {
                session
            } else {
                session.swap_credential(destination)?
            };
            Some(self.load(&session, staged_rows)?)
        };

        let summary = Self::summarize(
            resolver.as_ref(),
            org_changes,
            stats,
            staged_rows,
            loaded_rows,
            started,
        );
        tracing::info!(
            "Job finished: {} events ({} resolved, {} unresolved) in {}ms",
            summary.events,
            summary.resolved,
            summary.unresolved,
            summary.elapsed_ms
        );
        Ok(summary)
    }

    /// Query org changes and build the timeline, returning it with the event count
    pub fn build_timeline(
        &self,
        executor: &dyn QueryExecutor,
    ) -> Result<(UserOrgTimeline, usize)> {
        let query = org_changes_query(&self.config.org_source)?;
        tracing::info!("Fetching org changes from {}", self.config.org_source.table);

        let changes: Vec<OrgChangeEvent> = fetch(executor, &query)?;
        let count = changes.len();
        let timeline = UserOrgTimeline::build(changes);

        tracing::info!(
            "Built org timeline: {} users, {} orgs from {} changes",
            timeline.user_count(),
            timeline.entry_count(),
            count
        );
        Ok((timeline, count))
    }

    /// Query the events to enrich
    pub fn fetch_events(&self, executor: &dyn QueryExecutor) -> Result<Vec<EventRecord>> {
        let channels = self.config.event_channels();
        let events = &self.config.events;
        let filter = EventFilter {
            event_types: &events.event_types,
            channels: &channels,
            exclude_email_patterns: &events.exclude_email_patterns,
            date_range: events.date_range.as_ref(),
        };
        let query = events_query(&events.table, &filter)?;
        tracing::info!("Fetching events from {}", events.table);

        let records: Vec<EventRecord> = fetch(executor, &query)?;
        tracing::info!("Fetched {} events", records.len());
        Ok(records)
    }

    /// Load the staging file into the destination table
    pub fn load(&self, loader: &dyn BulkLoader, staged_rows: usize) -> Result<usize> {
        let destination = &self.config.destination;

        if destination.truncate_before_load {
            loader.prepare_table(&destination.table, &destination.schema)?;
            let removed = loader.truncate(&destination.table)?;
            tracing::info!("Cleared {} existing rows from {}", removed, destination.table);
        }

        let loaded = loader.load(
            &self.config.staging_file,
            &destination.table,
            &destination.schema,
        )?;

        if loaded != staged_rows {
            tracing::warn!(
                "Loaded {} rows into {} but staged {}",
                loaded,
                destination.table,
                staged_rows
            );
        }
        Ok(loaded)
    }

    fn summarize(
        resolver: &dyn OrgResolver,
        org_changes: usize,
        stats: EnrichStats,
        staged_rows: usize,
        loaded_rows: Option<usize>,
        started: Instant,
    ) -> JobSummary {
        JobSummary {
            policy: resolver.policy(),
            org_changes,
            users: resolver.timeline().user_count(),
            events: stats.total,
            resolved: stats.resolved,
            unresolved: stats.unresolved,
            staged_rows,
            loaded_rows,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::schema::TableSchema;
    use crate::template::TemplateContext;
    use crate::warehouse::Row;
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    const JOB_YAML: &str = r"
org_source:
  table: user_changelog
  credential: /secrets/org.json
  exclude_user_patterns: ['%fenix%']
events:
  table: events
  credential: /secrets/events.json
  channels: [celltelligence]
  exclude_email_patterns: ['%fenix%', '%dbala%']
destination:
  table: analytics.enriched
";

    fn config() -> JobConfig {
        JobConfig::from_yaml_str(JOB_YAML, &TemplateContext::new()).unwrap()
    }

    /// Executor returning canned rows and recording every query
    struct Recorder {
        rows: Vec<Value>,
        queries: RefCell<Vec<String>>,
    }

    impl Recorder {
        fn new(rows: Vec<Value>) -> Self {
            Self {
                rows,
                queries: RefCell::new(Vec::new()),
            }
        }
    }

    impl QueryExecutor for Recorder {
        fn run(&self, sql: &str) -> Result<Vec<Row>> {
            self.queries.borrow_mut().push(sql.to_string());
            Ok(self
                .rows
                .iter()
                .filter_map(|v| v.as_object().cloned())
                .collect())
        }
    }

    struct FailingExecutor;

    impl QueryExecutor for FailingExecutor {
        fn run(&self, sql: &str) -> Result<Vec<Row>> {
            Err(Error::query(sql, "permission denied"))
        }
    }

    #[derive(Default)]
    struct RecordingLoader {
        calls: RefCell<Vec<String>>,
        loaded: usize,
    }

    impl BulkLoader for RecordingLoader {
        fn prepare_table(&self, table: &str, _schema: &TableSchema) -> Result<()> {
            self.calls.borrow_mut().push(format!("prepare {table}"));
            Ok(())
        }

        fn truncate(&self, table: &str) -> Result<usize> {
            self.calls.borrow_mut().push(format!("truncate {table}"));
            Ok(0)
        }

        fn load(&self, file: &Path, table: &str, _schema: &TableSchema) -> Result<usize> {
            self.calls
                .borrow_mut()
                .push(format!("load {} -> {table}", file.display()));
            Ok(self.loaded)
        }
    }

    #[test]
    fn test_build_timeline_from_rows() {
        let pipeline = BatchPipeline::new(config());
        let executor = Recorder::new(vec![
            json!({"changed_at": "2020-01-01 00:00:00", "user": "a@x.com", "org": "org1"}),
            json!({"changed_at": "2020-05-01 00:00:00", "user": "a@x.com", "org": "org2"}),
            json!({"changed_at": "2020-05-02 00:00:00", "user": "b@x.com", "org": "org1"}),
        ]);

        let (timeline, count) = pipeline.build_timeline(&executor).unwrap();
        assert_eq!(count, 3);
        assert_eq!(timeline.user_count(), 2);
        assert_eq!(timeline.get("a@x.com").unwrap().len(), 2);

        let queries = executor.queries.borrow();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("FROM user_changelog"));
    }

    #[test]
    fn test_query_failure_aborts() {
        let pipeline = BatchPipeline::new(config());
        let err = pipeline.build_timeline(&FailingExecutor).unwrap_err();
        assert!(matches!(err, Error::Query { .. }));

        let err = pipeline.fetch_events(&FailingExecutor).unwrap_err();
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_fetch_events_query_and_rows() {
        let pipeline = BatchPipeline::new(config());
        let executor = Recorder::new(vec![
            json!({"email": "a@x.com", "post_id": 1, "post_date": "2020-06-01 00:00:00", "event": "open", "channel": "celltelligence"}),
            json!({"email": "b@x.com", "post_id": 2, "post_date": "2020-06-02 00:00:00", "event": "click", "channel": "celltelligence"}),
        ]);

        let events = pipeline.fetch_events(&executor).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].post_id, Some(2));

        let query = executor.queries.borrow()[0].clone();
        assert!(query.starts_with("SELECT * FROM events"));
        assert!(query.contains("channel IN ('celltelligence')"));
        assert!(query.contains("email NOT LIKE '%dbala%'"));
    }

    #[test]
    fn test_load_appends_staging_file() {
        let mut config = config();
        config.staging_file = PathBuf::from("/tmp/staged.json");
        let pipeline = BatchPipeline::new(config);
        let loader = RecordingLoader {
            loaded: 3,
            ..RecordingLoader::default()
        };

        let loaded = pipeline.load(&loader, 3).unwrap();
        assert_eq!(loaded, 3);
        assert_eq!(
            *loader.calls.borrow(),
            vec!["load /tmp/staged.json -> analytics.enriched".to_string()]
        );
    }

    #[test]
    fn test_load_truncates_first_when_configured() {
        let mut config = config();
        config.destination.truncate_before_load = true;
        let pipeline = BatchPipeline::new(config);
        let loader = RecordingLoader::default();

        pipeline.load(&loader, 0).unwrap();
        let calls = loader.calls.borrow();
        assert_eq!(calls[0], "prepare analytics.enriched");
        assert_eq!(calls[1], "truncate analytics.enriched");
        assert!(calls[2].starts_with("load "));
    }

    #[test]
    fn test_run_rejects_unknown_channel_before_touching_warehouse() {
        let mut config = config();
        config.resolution.policy = ResolutionPolicy::Channel;
        config.resolution.channel = Some("newsletter".to_string());

        // The credential paths do not exist; the channel check must fail first
        let err = BatchPipeline::new(config)
            .run(RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownChannel { .. }));
    }

    #[test]
    fn test_run_reports_missing_credential() {
        let err = BatchPipeline::new(config())
            .run(RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Credential { .. }));
    }
}
