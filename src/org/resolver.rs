//! Org resolution strategies
//!
//! Two policies pick the org a user is attributed to:
//!
//! - **Temporal**: the org whose change marker is nearest before the event
//!   date, falling back to the oldest recorded org when the event predates
//!   every change.
//! - **Channel**: the first org (in insertion order) whose family prefix
//!   matches the tag of the configured channel.
//!
//! Markers are compared as strings, so they must share one sortable format
//! (ISO 8601 or the warehouse's canonical timestamp text).

use super::channel::{org_prefix, ChannelOrgMap};
use super::timeline::UserOrgTimeline;
use crate::config::{ResolutionConfig, ResolutionPolicy};
use crate::error::{Error, Result};
use serde::Serialize;

/// Resolved org for one user and the marker that justified it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attribution {
    pub org: Option<String>,
    pub marker: Option<String>,
}

impl Attribution {
    /// Attribution to an org at a given marker
    pub fn new(org: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            org: Some(org.into()),
            marker: Some(marker.into()),
        }
    }

    /// No org could be attributed
    pub fn unresolved() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self) -> bool {
        self.org.is_some()
    }
}

/// Strategy that attributes an org to a user
pub trait OrgResolver: Send + Sync {
    /// Resolve the org for `user` at `event_date`
    ///
    /// `user` is matched case-insensitively. Policies that do not reason
    /// about time ignore `event_date`.
    fn resolve(&self, user: &str, event_date: Option<&str>) -> Attribution;

    /// Which policy this resolver implements
    fn policy(&self) -> ResolutionPolicy;

    /// Timeline the resolver reads from
    fn timeline(&self) -> &UserOrgTimeline;
}

/// Temporal nearest-before resolution with fallback to the oldest org
///
/// A missing `event_date` is treated as later than every change, so the most
/// recent org wins.
pub fn resolve_by_time(
    timeline: &UserOrgTimeline,
    user: &str,
    event_date: Option<&str>,
) -> Attribution {
    let Some(history) = timeline.get(user) else {
        return Attribution::unresolved();
    };

    let ordered = history.newest_first();
    let chosen = match event_date {
        Some(date) => ordered
            .iter()
            .find(|(_, marker)| *marker < date)
            .or_else(|| ordered.last()),
        None => ordered.first(),
    };

    chosen.map_or_else(Attribution::unresolved, |(org, marker)| {
        Attribution::new(*org, *marker)
    })
}

/// Channel-prefix resolution
///
/// Fails only when `channel` is missing from `channel_map`.
pub fn resolve_by_channel(
    timeline: &UserOrgTimeline,
    channel_map: &ChannelOrgMap,
    channel: &str,
    user: &str,
    separator: char,
) -> Result<Attribution> {
    let tag = channel_map.tag_for(channel)?;
    Ok(match_channel_tag(timeline, tag, user, separator))
}

fn match_channel_tag(
    timeline: &UserOrgTimeline,
    tag: &str,
    user: &str,
    separator: char,
) -> Attribution {
    let Some(history) = timeline.get(user) else {
        return Attribution::unresolved();
    };

    history
        .iter()
        .find(|(org, _)| org_prefix(org, separator) == tag)
        .map_or_else(Attribution::unresolved, |(org, marker)| {
            Attribution::new(org, marker)
        })
}

/// Resolver for the temporal policy
#[derive(Debug, Clone)]
pub struct TemporalResolver {
    timeline: UserOrgTimeline,
}

impl TemporalResolver {
    pub fn new(timeline: UserOrgTimeline) -> Self {
        Self { timeline }
    }
}

impl OrgResolver for TemporalResolver {
    fn resolve(&self, user: &str, event_date: Option<&str>) -> Attribution {
        resolve_by_time(&self.timeline, user, event_date)
    }

    fn policy(&self) -> ResolutionPolicy {
        ResolutionPolicy::Temporal
    }

    fn timeline(&self) -> &UserOrgTimeline {
        &self.timeline
    }
}

/// Resolver for the channel policy
///
/// The channel tag is looked up once at construction, so an undeclared
/// channel fails before any record is processed.
#[derive(Debug, Clone)]
pub struct ChannelResolver {
    timeline: UserOrgTimeline,
    channel: String,
    tag: String,
    separator: char,
}

impl ChannelResolver {
    pub fn new(
        timeline: UserOrgTimeline,
        channel_map: &ChannelOrgMap,
        channel: impl Into<String>,
        separator: char,
    ) -> Result<Self> {
        let channel = channel.into();
        let tag = channel_map.tag_for(&channel)?.to_string();
        Ok(Self {
            timeline,
            channel,
            tag,
            separator,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Canonical org-family tag of the channel
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl OrgResolver for ChannelResolver {
    fn resolve(&self, user: &str, _event_date: Option<&str>) -> Attribution {
        match_channel_tag(&self.timeline, &self.tag, user, self.separator)
    }

    fn policy(&self) -> ResolutionPolicy {
        ResolutionPolicy::Channel
    }

    fn timeline(&self) -> &UserOrgTimeline {
        &self.timeline
    }
}

/// Build the resolver selected by configuration
pub fn build_resolver(
    timeline: UserOrgTimeline,
    config: &ResolutionConfig,
) -> Result<Box<dyn OrgResolver>> {
    match config.policy {
        ResolutionPolicy::Temporal => Ok(Box::new(TemporalResolver::new(timeline))),
        ResolutionPolicy::Channel => {
            let channel = config
                .channel
                .as_deref()
                .ok_or_else(|| Error::missing_field("resolution.channel"))?;
            let resolver =
                ChannelResolver::new(timeline, &config.channel_map, channel, config.separator)?;
            Ok(Box::new(resolver))
        }
    }
}
