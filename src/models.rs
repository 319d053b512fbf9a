//! Wire types for pull requests and their sub-resources, and the accepted record
//! built on top of them.

use crate::types::RepoId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    pub login: String,
}

/// A pull request as returned by the listing endpoint.
///
/// Never modified after it is fetched; the enricher wraps it in an
/// [`AcceptedItem`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub id: u64,
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<Author>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    /// Not part of the pulls listing payload; honoured when an upstream does send it.
    #[serde(default)]
    pub review_count: Option<u64>,
}

impl CandidateItem {
    /// Closing timestamp used for time-based filtering: `closed_at`, else `merged_at`.
    pub fn closed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.closed_at.or(self.merged_at)
    }

    pub fn author_login(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.login.as_str())
    }

    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }
}

/// Entry of the `pulls/{number}/reviews` sub-resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    #[serde(default)]
    pub user: Option<Author>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Entry of the `issues/{number}/comments` sub-resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub user: Option<Author>,
}

/// Entry of the `pulls/{number}/files` sub-resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileMetrics {
    pub num_files: u64,
    pub total_additions: u64,
    pub total_deletions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeMetrics {
    pub time_analysis_hours: f64,
    pub created_at: String,
    pub closed_at: String,
    pub merged_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptionMetrics {
    pub description_chars: u64,
    /// Display-only preview, never used in analysis.
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InteractionMetrics {
    pub num_comments: u64,
    pub num_participants: u64,
}

/// A candidate that passed both filter predicates, plus whatever metric groups
/// could be computed for it. Each group is independently absent on failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptedItem {
    pub repository: RepoId,
    pub pull_request: CandidateItem,
    pub files: Option<FileMetrics>,
    pub time: Option<TimeMetrics>,
    pub description: Option<DescriptionMetrics>,
    pub interaction: Option<InteractionMetrics>,
}

impl AcceptedItem {
    pub fn has_any_metrics(&self) -> bool {
        self.files.is_some()
            || self.time.is_some()
            || self.description.is_some()
            || self.interaction.is_some()
    }
}
