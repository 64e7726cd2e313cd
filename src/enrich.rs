//! Event enrichment
//!
//! Writes the resolved org and its marker into every record of a batch.
//! Unresolved users are tagged with nulls, never dropped, so the output has
//! exactly as many rows as the input.

use crate::config::EventDateField;
use crate::org::OrgResolver;
use crate::record::EventRecord;
use serde::Serialize;

/// Counters reported after enriching a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichStats {
    pub total: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

/// Applies an [`OrgResolver`] to event records
pub struct Enricher<'a> {
    resolver: &'a dyn OrgResolver,
    date_field: EventDateField,
}

impl<'a> Enricher<'a> {
    pub fn new(resolver: &'a dyn OrgResolver, date_field: EventDateField) -> Self {
        Self {
            resolver,
            date_field,
        }
    }

    /// Enrich records in place
    pub fn enrich(&self, events: &mut [EventRecord]) -> EnrichStats {
        tracing::info!(
            "Updating org columns for {} events ({:?} policy)",
            events.len(),
            self.resolver.policy()
        );

        let mut stats = EnrichStats::default();

        for record in events.iter_mut() {
            let attribution = match record.user_key() {
                Some(user) => self.resolver.resolve(&user, record.date(self.date_field)),
                None => Default::default(),
            };

            if attribution.is_resolved() {
                stats.resolved += 1;
            } else {
                stats.unresolved += 1;
            }

            record.org = attribution.org;
            record.org_sync_date = attribution.marker;
            stats.total += 1;
        }

        tracing::debug!(
            "Enriched {} events: {} resolved, {} unresolved",
            stats.total,
            stats.resolved,
            stats.unresolved
        );

        stats
    }
}

/// Enrich an owned batch and hand it back
pub fn enrich(
    mut events: Vec<EventRecord>,
    resolver: &dyn OrgResolver,
    date_field: EventDateField,
) -> (Vec<EventRecord>, EnrichStats) {
    let stats = Enricher::new(resolver, date_field).enrich(&mut events);
    (events, stats)
}
