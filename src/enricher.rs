//! Metric enrichment for accepted pull requests.
//!
//! Four metric groups are computed per pull request. Files and interactions need
//! requests and run concurrently; time and description are derived locally. Each
//! group fails on its own: a failed group is left empty and logged. The item is
//! only dropped if every group failed.

use crate::cache::ReviewCache;
use crate::fetcher::{FetchError, RateLimitedFetcher};
use crate::metrics;
use crate::models::{AcceptedItem, CandidateItem, FileMetrics, InteractionMetrics};
use crate::pagination::{collect_all, SubResource, SUB_RESOURCE_CAP};
use crate::types::RepoId;

#[derive(Clone)]
pub struct Enricher {
    fetcher: RateLimitedFetcher,
    reviews: ReviewCache,
}

impl Enricher {
    pub fn new(fetcher: RateLimitedFetcher, reviews: ReviewCache) -> Self {
        Self { fetcher, reviews }
    }

    pub async fn enrich(&self, repo_id: &RepoId, candidate: CandidateItem) -> Option<AcceptedItem> {
        let number = candidate.number;
        let (files, interaction) = tokio::join!(
            self.file_metrics(repo_id, number),
            self.interaction_metrics(repo_id, number)
        );
        let time = metrics::time_metrics(&candidate);
        if time.is_none() {
            tracing::warn!(repo = %repo_id, number, "Missing timestamps, time metrics skipped");
        }
        let description = Some(metrics::description_metrics(candidate.body.as_deref()));

        let accepted = AcceptedItem {
            repository: repo_id.clone(),
            pull_request: candidate,
            files,
            time,
            description,
            interaction,
        };

        if accepted.has_any_metrics() {
            Some(accepted)
        } else {
            tracing::warn!(repo = %repo_id, number, "Every metric group failed, dropping pull request");
            None
        }
    }

    async fn file_metrics(&self, repo_id: &RepoId, number: u64) -> Option<FileMetrics> {
        match collect_all(&self.fetcher, SubResource::files(repo_id, number), SUB_RESOURCE_CAP).await {
            Ok(files) => Some(metrics::file_metrics(&files)),
            Err(e) => {
                tracing::warn!(repo = %repo_id, number, "File metrics unavailable: {}", e);
                None
            }
        }
    }

    /// Comments and reviews are fetched independently; the group survives if either does.
    async fn interaction_metrics(&self, repo_id: &RepoId, number: u64) -> Option<InteractionMetrics> {
        let (comments, reviews) = tokio::join!(
            collect_all(
                &self.fetcher,
                SubResource::comments(repo_id, number),
                SUB_RESOURCE_CAP
            ),
            self.reviews.reviews(&self.fetcher, repo_id, number)
        );

        match (comments, reviews) {
            (Err(comments_error), Err(reviews_error)) => {
                tracing::warn!(
                    repo = %repo_id,
                    number,
                    "Interaction metrics unavailable: comments: {}; reviews: {}",
                    comments_error,
                    reviews_error
                );
                None
            }
            (comments, reviews) => {
                let comments = comments.unwrap_or_else(|e| log_partial(repo_id, number, "comments", &e));
                let reviews = match reviews {
                    Ok(reviews) => reviews.as_ref().clone(),
                    Err(e) => log_partial(repo_id, number, "reviews", &e),
                };
                Some(metrics::interaction_metrics(&comments, &reviews))
            }
        }
    }
}

fn log_partial<T>(repo_id: &RepoId, number: u64, what: &str, error: &FetchError) -> Vec<T> {
    tracing::warn!(repo = %repo_id, number, "Could not fetch {}: {}", what, error);
    Vec::new()
}
