//! Inclusion rules for candidate pull requests.
//!
//! A candidate is accepted only if it was reviewed and stayed open for more than an
//! hour. The review check runs first because the time check is free while the review
//! check may need a request.

use crate::cache::ReviewCache;
use crate::fetcher::RateLimitedFetcher;
use crate::models::CandidateItem;
use crate::types::RepoId;
use chrono::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    NoReviews,
    TooFast,
}

/// Minimum time between creation and closing, exclusive.
pub fn minimum_open_time() -> Duration {
    Duration::hours(1)
}

pub fn meets_time_criterion(candidate: &CandidateItem) -> bool {
    match (candidate.created_at, candidate.closed_timestamp()) {
        (Some(created), Some(closed)) => closed - created > minimum_open_time(),
        _ => false,
    }
}

/// Whether the listing payload itself already proves the pull request was reviewed.
pub fn has_local_reviews(candidate: &CandidateItem) -> bool {
    candidate.review_count.is_some_and(|count| count > 0)
}

/// Falls back to the reviews sub-resource. A failed lookup counts as "not reviewed".
pub async fn has_reviews(
    fetcher: &RateLimitedFetcher,
    reviews: &ReviewCache,
    repo_id: &RepoId,
    candidate: &CandidateItem,
) -> bool {
    if has_local_reviews(candidate) {
        return true;
    }

    match reviews.reviews(fetcher, repo_id, candidate.number).await {
        Ok(list) => !list.is_empty(),
        Err(e) => {
            tracing::debug!(repo = %repo_id, number = candidate.number, "Review lookup failed, excluding: {}", e);
            false
        }
    }
}

/// Combines both predicates once review presence is known.
pub fn decide(reviewed: bool, candidate: &CandidateItem) -> Verdict {
    if !reviewed {
        Verdict::NoReviews
    } else if !meets_time_criterion(candidate) {
        Verdict::TooFast
    } else {
        Verdict::Accepted
    }
}

pub async fn evaluate(
    fetcher: &RateLimitedFetcher,
    reviews: &ReviewCache,
    repo_id: &RepoId,
    candidate: &CandidateItem,
) -> Verdict {
    let reviewed = has_reviews(fetcher, reviews, repo_id, candidate).await;
    decide(reviewed, candidate)
}
