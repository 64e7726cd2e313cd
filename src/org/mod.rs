//! Org attribution
//!
//! Builds a per-user timeline of org membership changes and resolves which
//! org an event should be attributed to.
//!
//! # Overview
//!
//! - [`UserOrgTimeline`]: lowercased user → orgs with their change markers
//! - [`resolve_by_time`] / [`TemporalResolver`]: nearest change strictly before the event
//! - [`resolve_by_channel`] / [`ChannelResolver`]: first org whose family matches the channel

mod channel;
mod resolver;
mod timeline;

pub use channel::{org_prefix, ChannelOrgMap, DEFAULT_ORG_SEPARATOR};
pub use resolver::{
    build_resolver, resolve_by_channel, resolve_by_time, Attribution, ChannelResolver,
    OrgResolver, TemporalResolver,
};
pub use timeline::{OrgChangeEvent, OrgHistory, UserOrgTimeline};
