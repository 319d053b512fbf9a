use crate::models::{
    CandidateItem, DescriptionMetrics, FileEntry, FileMetrics, InteractionMetrics, IssueComment,
    Review, TimeMetrics,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;

const DESCRIPTION_PREVIEW_CHARS: usize = 500;
const TRUNCATION_MARKER: &str = "...";
const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Sums additions and deletions across the changed files of a pull request.
pub fn file_metrics(files: &[FileEntry]) -> FileMetrics {
    FileMetrics {
        num_files: files.len() as u64,
        total_additions: files.iter().map(|file| file.additions).sum(),
        total_deletions: files.iter().map(|file| file.deletions).sum(),
    }
}

/// Elapsed hours between creation and closing (or merging).
///
/// Returns `None` when either timestamp is missing.
pub fn time_metrics(candidate: &CandidateItem) -> Option<TimeMetrics> {
    let created = candidate.created_at?;
    let closed = candidate.closed_timestamp()?;
    let elapsed = closed - created;

    Some(TimeMetrics {
        time_analysis_hours: elapsed.num_milliseconds() as f64 / MILLIS_PER_HOUR,
        created_at: format_timestamp(created),
        closed_at: format_timestamp(closed),
        merged_at: candidate.merged_at.map(format_timestamp),
    })
}

pub fn description_metrics(body: Option<&str>) -> DescriptionMetrics {
    let body = body.unwrap_or_default();
    let chars = body.chars().count();

    let description = if chars > DESCRIPTION_PREVIEW_CHARS {
        let mut preview: String = body.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
        preview.push_str(TRUNCATION_MARKER);
        preview
    } else {
        body.to_string()
    };

    DescriptionMetrics {
        description_chars: chars as u64,
        description,
    }
}

/// Counts comments and the distinct people who commented or reviewed.
///
/// A user who both comments and reviews counts once. Entries without an author
/// (deleted accounts) are not counted as participants.
pub fn interaction_metrics(comments: &[IssueComment], reviews: &[Review]) -> InteractionMetrics {
    let participants: HashSet<&str> = comments
        .iter()
        .filter_map(|comment| comment.user.as_ref())
        .chain(reviews.iter().filter_map(|review| review.user.as_ref()))
        .map(|author| author.login.as_str())
        .collect();

    InteractionMetrics {
        num_comments: comments.len() as u64,
        num_participants: participants.len() as u64,
    }
}

/// RFC 3339 in UTC with a `Z` suffix, the format the API itself uses.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}
