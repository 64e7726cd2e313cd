//! Job configuration
//!
//! All settings for one run live in [`JobConfig`], built once at startup from
//! a YAML job file (with `{{ env.NAME }}` interpolation) or from environment
//! variables, then passed to the pipeline.

use crate::error::{Error, Result};
use crate::org::{ChannelOrgMap, DEFAULT_ORG_SEPARATOR};
use crate::schema::TableSchema;
use crate::template::{self, TemplateContext};
use crate::warehouse::{validate_column, validate_identifier};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-Level Job Config
// ============================================================================

/// Complete job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Where org membership changes are read from
    pub org_source: OrgSourceConfig,

    /// Where events are read from
    pub events: EventsConfig,

    /// Where enriched events are loaded to
    pub destination: DestinationConfig,

    /// How orgs are attributed to events
    #[serde(default)]
    pub resolution: ResolutionConfig,

    /// Newline-delimited JSON staging file
    #[serde(default = "default_staging_file")]
    pub staging_file: PathBuf,
}

fn default_staging_file() -> PathBuf {
    std::env::temp_dir().join("orgsync_events.json")
}

// ============================================================================
// Org Source
// ============================================================================

/// Layout of the org-change source table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgSourceLayout {
    /// Append-only change log; the first change per (user, org) is kept
    #[default]
    Changelog,
    /// Precomputed table with one row per current (user, org)
    Latest,
}

/// Org-change source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgSourceConfig {
    /// Table identifier
    pub table: String,

    /// Credential profile for the org source's security domain
    pub credential: PathBuf,

    #[serde(default)]
    pub layout: OrgSourceLayout,

    /// SQL expression yielding the user email
    #[serde(default)]
    pub user_field: Option<String>,

    /// SQL expression yielding the org name
    #[serde(default)]
    pub org_field: Option<String>,

    /// SQL expression yielding the change time
    #[serde(default)]
    pub changed_at_field: Option<String>,

    /// LIKE patterns for users to leave out (e.g. internal test accounts)
    #[serde(default)]
    pub exclude_user_patterns: Vec<String>,
}

impl OrgSourceConfig {
    /// User expression, defaulted per layout
    pub fn user_field(&self) -> &str {
        self.user_field
            .as_deref()
            .unwrap_or(match self.layout {
                OrgSourceLayout::Changelog => "json_extract_string(data, '$.user_email')",
                OrgSourceLayout::Latest => "user_email",
            })
    }

    /// Org expression, defaulted per layout
    pub fn org_field(&self) -> &str {
        self.org_field.as_deref().unwrap_or(match self.layout {
            OrgSourceLayout::Changelog => {
                "json_extract_string(data, '$.user_subscription_notification[0]')"
            }
            OrgSourceLayout::Latest => "org",
        })
    }

    /// Change-time expression, defaulted per layout
    pub fn changed_at_field(&self) -> &str {
        self.changed_at_field
            .as_deref()
            .unwrap_or(match self.layout {
                OrgSourceLayout::Changelog => "\"timestamp\"",
                OrgSourceLayout::Latest => "updated_at",
            })
    }
}

// ============================================================================
// Events
// ============================================================================

/// Events source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Table identifier
    pub table: String,

    /// Credential profile for the events' security domain
    pub credential: PathBuf,

    /// Event types to extract
    #[serde(default = "default_event_types")]
    pub event_types: Vec<String>,

    /// Channels to extract (empty = all, or the resolution channel)
    #[serde(default)]
    pub channels: Vec<String>,

    /// LIKE patterns for emails to leave out
    #[serde(default)]
    pub exclude_email_patterns: Vec<String>,

    /// Optional half-open date window
    #[serde(default)]
    pub date_range: Option<DateRange>,
}

fn default_event_types() -> Vec<String> {
    ["open", "delivered", "click", "bounce"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Half-open window `[start, end)` on one date column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default = "default_date_column")]
    pub column: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

fn default_date_column() -> String {
    "timestamp".to_string()
}

// ============================================================================
// Destination
// ============================================================================

/// Destination table settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Table identifier
    pub table: String,

    /// Credential profile; defaults to the events credential
    #[serde(default)]
    pub credential: Option<PathBuf>,

    /// Column layout of the destination table
    #[serde(default)]
    pub schema: TableSchema,

    /// Delete existing rows before appending
    #[serde(default)]
    pub truncate_before_load: bool,
}

// ============================================================================
// Resolution
// ============================================================================

/// Org resolution policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Nearest org change strictly before the event date
    #[default]
    Temporal,
    /// First org whose family prefix matches the channel's tag
    Channel,
}

/// Which record field the temporal policy reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventDateField {
    #[default]
    PostDate,
    Timestamp,
}

/// Org resolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default)]
    pub policy: ResolutionPolicy,

    #[serde(default)]
    pub date_field: EventDateField,

    /// Channel the job runs for (channel policy)
    #[serde(default)]
    pub channel: Option<String>,

    /// Channel → org-family tag
    #[serde(default)]
    pub channel_map: ChannelOrgMap,

    /// Separator between an org's family prefix and the rest of its name
    #[serde(default = "default_separator")]
    pub separator: char,
}

fn default_separator() -> char {
    DEFAULT_ORG_SEPARATOR
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            policy: ResolutionPolicy::default(),
            date_field: EventDateField::default(),
            channel: None,
            channel_map: ChannelOrgMap::default(),
            separator: DEFAULT_ORG_SEPARATOR,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl JobConfig {
    /// Load a job file, interpolating `{{ env.NAME }}` from the process environment
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::config(format!(
                    "Failed to read job file '{}': {e}",
                    path.display()
                ))
            }
        })?;

        Self::from_yaml_str(&content, &TemplateContext::from_env())
    }

    /// Parse a job from YAML, rendering templates with `ctx`
    pub fn from_yaml_str(yaml: &str, ctx: &TemplateContext) -> Result<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let rendered = template::render_yaml(&raw, ctx)?;
        let config: Self = serde_yaml::from_value(rendered)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a job from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a job from named variables
    ///
    /// Required: `ORG_CHANGES_TABLE`, `ORG_SOURCE_CREDENTIAL`, `EVENTS_TABLE`,
    /// `EVENTS_CREDENTIAL`, `DEST_TABLE`. Optional: `JSON_FILE_PATH`,
    /// `EVENTS_CHANNEL` (selects the channel policy when
    /// `CHANNEL_MAP` is also set, as `channel=tag,channel=tag`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| lookup(name).ok_or_else(|| Error::missing_field(name));

        let channel = lookup("EVENTS_CHANNEL");
        let channel_map = lookup("CHANNEL_MAP")
            .map(|raw| parse_channel_map(&raw))
            .transpose()?;

        let resolution = match channel_map {
            Some(channel_map) => ResolutionConfig {
                policy: ResolutionPolicy::Channel,
                channel: channel.clone(),
                channel_map,
                ..ResolutionConfig::default()
            },
            None => ResolutionConfig::default(),
        };

        let config = Self {
            org_source: OrgSourceConfig {
                table: required("ORG_CHANGES_TABLE")?,
                credential: required("ORG_SOURCE_CREDENTIAL")?.into(),
                layout: OrgSourceLayout::Changelog,
                user_field: None,
                org_field: None,
                changed_at_field: None,
                exclude_user_patterns: Vec::new(),
            },
            events: EventsConfig {
                table: required("EVENTS_TABLE")?,
                credential: required("EVENTS_CREDENTIAL")?.into(),
                event_types: default_event_types(),
                channels: channel.into_iter().collect(),
                exclude_email_patterns: Vec::new(),
                date_range: None,
            },
            destination: DestinationConfig {
                table: required("DEST_TABLE")?,
                credential: None,
                schema: TableSchema::default(),
                truncate_before_load: false,
            },
            resolution,
            staging_file: lookup("JSON_FILE_PATH").map_or_else(default_staging_file, PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check identifiers, schema and resolution settings before any data moves
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.org_source.table)?;
        validate_identifier(&self.events.table)?;
        validate_identifier(&self.destination.table)?;

        self.destination.schema.validate()?;

        if let Some(range) = &self.events.date_range {
            validate_column(&range.column)?;
            if range.start >= range.end {
                return Err(Error::invalid_value(
                    "events.date_range",
                    format!("start {} must be before end {}", range.start, range.end),
                ));
            }
        }

        if self.events.event_types.is_empty() {
            return Err(Error::invalid_value(
                "events.event_types",
                "at least one event type is required",
            ));
        }

        if self.resolution.policy == ResolutionPolicy::Channel {
            let channel = self
                .resolution
                .channel
                .as_deref()
                .ok_or_else(|| Error::missing_field("resolution.channel"))?;
            self.resolution.channel_map.tag_for(channel)?;
        }

        Ok(())
    }

    /// Channels the events query filters on
    ///
    /// Under the channel policy with no explicit list, only the resolution
    /// channel is extracted.
    pub fn event_channels(&self) -> Vec<String> {
        if self.events.channels.is_empty() && self.resolution.policy == ResolutionPolicy::Channel {
            return self.resolution.channel.iter().cloned().collect();
        }
        self.events.channels.clone()
    }

    /// Credential used for the destination load
    pub fn destination_credential(&self) -> &Path {
        self.destination
            .credential
            .as_deref()
            .unwrap_or(&self.events.credential)
    }
}

/// Parse `channel=tag,channel=tag`
fn parse_channel_map(raw: &str) -> Result<ChannelOrgMap> {
    let mut map = ChannelOrgMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (channel, tag) = pair.split_once('=').ok_or_else(|| {
            Error::invalid_value("CHANNEL_MAP", format!("expected channel=tag, got '{pair}'"))
        })?;
        map.insert(channel.trim(), tag.trim());
    }
    Ok(map)
}
