//! Per-user org timeline built from org-change events

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

/// One org membership change as returned by the org-change query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgChangeEvent {
    /// User identifier (email)
    pub user: String,

    /// Organization the user moved to
    #[serde(default)]
    pub org: Option<String>,

    /// When the change happened, as a string-comparable marker
    pub changed_at: String,
}

impl OrgChangeEvent {
    /// Create a new change event
    pub fn new(
        user: impl Into<String>,
        org: impl Into<String>,
        changed_at: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            org: Some(org.into()),
            changed_at: changed_at.into(),
        }
    }
}

/// Orgs of a single user in first-seen order, each with its change marker
///
/// Re-inserting an org overwrites its marker but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgHistory {
    entries: Vec<(String, String)>,
}

impl OrgHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the marker for an org, overwriting any previous marker
    pub fn upsert(&mut self, org: impl Into<String>, marker: impl Into<String>) {
        let org = org.into();
        let marker = marker.into();
        match self.entries.iter_mut().find(|(name, _)| *name == org) {
            Some(entry) => entry.1 = marker,
            None => self.entries.push((org, marker)),
        }
    }

    /// Marker recorded for an org
    pub fn marker(&self, org: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == org)
            .map(|(_, marker)| marker.as_str())
    }

    /// Iterate `(org, marker)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(org, marker)| (org.as_str(), marker.as_str()))
    }

    /// Entries sorted by marker, most recent first
    ///
    /// The sort is stable, so orgs sharing a marker keep insertion order.
    pub fn newest_first(&self) -> Vec<(&str, &str)> {
        let mut ordered: Vec<(&str, &str)> = self.iter().collect();
        ordered.sort_by(|a, b| b.1.cmp(a.1));
        ordered
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for OrgHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (org, marker) in &self.entries {
            map.serialize_entry(org, marker)?;
        }
        map.end()
    }
}

/// Mapping from lowercased user identifier to that user's org history
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct UserOrgTimeline {
    users: HashMap<String, OrgHistory>,
}

impl UserOrgTimeline {
    /// Build a timeline from change events, processed in the given order
    ///
    /// Every distinct user gets an entry, even one whose events all lack an org.
    /// Events without an org are skipped. For a repeated (user, org) pair the
    /// last processed marker wins.
    pub fn build(events: impl IntoIterator<Item = OrgChangeEvent>) -> Self {
        let mut users: HashMap<String, OrgHistory> = HashMap::new();
        let mut skipped = 0usize;

        for event in events {
            let history = users.entry(event.user.to_lowercase()).or_default();
            match event.org {
                Some(org) if !org.is_empty() => history.upsert(org, event.changed_at),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!("Skipped {skipped} org change events without an organization");
        }

        Self { users }
    }

    /// History for a user, looked up case-insensitively
    pub fn get(&self, user: &str) -> Option<&OrgHistory> {
        self.users.get(&user.to_lowercase())
    }

    pub fn contains_user(&self, user: &str) -> bool {
        self.get(user).is_some()
    }

    /// Number of distinct users
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Total number of (user, org) entries
    pub fn entry_count(&self) -> usize {
        self.users.values().map(OrgHistory::len).sum()
    }

    /// Iterate users and their histories (unordered)
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OrgHistory)> {
        self.users.iter().map(|(user, history)| (user.as_str(), history))
    }
}

impl FromIterator<OrgChangeEvent> for UserOrgTimeline {
    fn from_iter<I: IntoIterator<Item = OrgChangeEvent>>(iter: I) -> Self {
        Self::build(iter)
    }
}
