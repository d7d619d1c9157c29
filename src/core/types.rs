//! Core type definitions used throughout the codebase

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Game time (continuous, in game time units)
pub type Time = f64;

/// Set of tags attached to variables, processes and modifiers
pub type TagSet = BTreeSet<String>;

/// Build a tag set from anything string-like
pub fn tag_set<I, S>(tags: I) -> TagSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tags.into_iter().map(Into::into).collect()
}

/// Identity of an event on a timeline, assigned in insertion order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Replay ordering key: trigger time first, then id (allocation order) as tie-break
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EventKey {
    pub time: Time,
    pub id: EventId,
}

impl EventKey {
    pub fn new(time: Time, id: EventId) -> Self {
        Self { time, id }
    }
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventKey {}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.id.cmp(&other.id))
    }
}
