//! Channel to organization-family mapping

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Default separator between an org's family prefix and the rest of its name
pub const DEFAULT_ORG_SEPARATOR: char = '-';

/// Static mapping from channel names to a canonical org-family tag
///
/// Several channels may share one tag. Tags are stored lowercased so they
/// compare directly against lowercased org prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChannelOrgMap {
    tags: HashMap<String, String>,
}

impl ChannelOrgMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from `(channel, tag)` pairs
    pub fn from_pairs<C, T>(pairs: impl IntoIterator<Item = (C, T)>) -> Self
    where
        C: Into<String>,
        T: Into<String>,
    {
        let mut map = Self::new();
        for (channel, tag) in pairs {
            map.insert(channel, tag);
        }
        map
    }

    /// Map a channel to a tag
    pub fn insert(&mut self, channel: impl Into<String>, tag: impl Into<String>) {
        self.tags.insert(channel.into(), tag.into().to_lowercase());
    }

    /// Canonical tag for a channel
    pub fn tag_for(&self, channel: &str) -> Result<&str> {
        self.tags
            .get(channel)
            .map(String::as_str)
            .ok_or_else(|| Error::unknown_channel(channel))
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.tags.contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl<'de> Deserialize<'de> for ChannelOrgMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = HashMap::<String, String>::deserialize(deserializer)?;
        Ok(Self::from_pairs(raw))
    }
}

/// Family prefix of an org name: everything before the first separator, lowercased
///
/// A name without the separator is its own prefix.
pub fn org_prefix(org: &str, separator: char) -> String {
    org.split_once(separator)
        .map_or(org, |(prefix, _)| prefix)
        .to_lowercase()
}
