//! Commit identity and history types.
//!
//! A [`CommitIdWithOrder`] pairs a totally-ordered integer with an optional
//! VCS-specific name. Only the order takes part in comparisons, so the same
//! scheduling and bisection logic works over changelist numbers and content
//! hashes alike.

use crate::ids::StreamId;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Commit identifier with a sequencing order.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommitIdWithOrder {
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CommitIdWithOrder {
    pub fn new(order: i64) -> Self {
        Self { order, name: None }
    }

    pub fn with_name(order: i64, name: impl Into<String>) -> Self {
        Self {
            order,
            name: Some(name.into()),
        }
    }

    /// The id immediately preceding this one in sequence.
    pub fn predecessor(&self) -> Self {
        Self::new(self.order - 1)
    }
}

impl PartialEq for CommitIdWithOrder {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl Eq for CommitIdWithOrder {}

impl Hash for CommitIdWithOrder {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.order.hash(state);
    }
}

impl PartialOrd for CommitIdWithOrder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CommitIdWithOrder {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.cmp(&other.order)
    }
}

impl fmt::Display for CommitIdWithOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "{}", self.order),
        }
    }
}

/// Tag attached to a commit describing what kind of files it touched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct CommitTag(String);

impl CommitTag {
    pub const CODE: &'static str = "code";
    pub const CONTENT: &'static str = "content";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn code() -> Self {
        Self::new(Self::CODE)
    }

    pub fn content() -> Self {
        Self::new(Self::CONTENT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A commit as exposed by the commit history view.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Commit {
    pub id: CommitIdWithOrder,
    pub stream_id: StreamId,
    pub author: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<CommitTag>,
    pub date_utc: DateTime<Utc>,
}

impl Commit {
    /// True if no tags are requested or the commit carries any of them.
    pub fn matches_tags(&self, tags: &[CommitTag]) -> bool {
        tags.is_empty() || self.tags.iter().any(|t| tags.contains(t))
    }

    /// True if the commit affects code rather than only content.
    pub fn is_code_change(&self) -> bool {
        self.tags.iter().any(|t| t.as_str() == CommitTag::CODE)
    }
}

/// Query over the commit history of a stream.
///
/// Results are returned newest first. `max_commit` is inclusive; `min_commit`
/// is inclusive only when `include_min` is set.
#[derive(Debug, Clone, Default)]
pub struct CommitQuery {
    pub min_commit: Option<CommitIdWithOrder>,
    pub include_min: bool,
    pub max_commit: Option<CommitIdWithOrder>,
    pub tags: Vec<CommitTag>,
    pub limit: usize,
}

impl CommitQuery {
    /// Check whether a commit id falls inside the query bounds.
    pub fn contains(&self, id: &CommitIdWithOrder) -> bool {
        let above_min = match &self.min_commit {
            Some(min) if self.include_min => id >= min,
            Some(min) => id > min,
            None => true,
        };
        let below_max = match &self.max_commit {
            Some(max) => id <= max,
            None => true,
        };
        above_min && below_max
    }
}
