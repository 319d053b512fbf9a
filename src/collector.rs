//! Repository batch driver.
//!
//! This module implements `Collector`, the entry point of a collection run. For every
//! repository, in order, it:
//! 1. Pages through the repository's closed pull requests.
//! 2. Filters each candidate (reviewed, open for more than an hour).
//! 3. Enriches accepted candidates with file, time, description and interaction metrics.
//!
//! A repository that fails is logged and skipped. Results are returned to the caller
//! as one [`Dataset`]; nothing is accumulated in shared state.

use crate::cache::ReviewCache;
use crate::config::AppConfig;
use crate::dataset::Dataset;
use crate::enricher::Enricher;
use crate::fetcher::{RateLimitedFetcher, RetryPolicy};
use crate::filter::{self, Verdict};
use crate::github::{GitHubClient, Transport};
use crate::models::{AcceptedItem, CandidateItem};
use crate::pagination::{Paginator, PullRequestListing};
use crate::types::{RepoId, RepositoryDescriptor};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Knobs of the batch driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionSettings {
    pub max_items_per_repository: usize,
    pub repository_delay: Duration,
    pub concurrency: usize,
}

impl CollectionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_items_per_repository: config.max_prs_per_repository,
            repository_delay: config.repository_delay(),
            concurrency: config.enrichment_concurrency.max(1),
        }
    }
}

/// Counters describing what happened during a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub repositories_processed: usize,
    pub repositories_failed: usize,
    pub candidates_seen: usize,
    pub rejected_no_reviews: usize,
    pub rejected_too_fast: usize,
    pub dropped_unenriched: usize,
    pub accepted: usize,
}

impl CollectionReport {
    fn absorb(&mut self, other: &Self) {
        self.candidates_seen += other.candidates_seen;
        self.rejected_no_reviews += other.rejected_no_reviews;
        self.rejected_too_fast += other.rejected_too_fast;
        self.dropped_unenriched += other.dropped_unenriched;
        self.accepted += other.accepted;
    }
}

/// Result of a whole run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Collection {
    pub dataset: Dataset,
    pub report: CollectionReport,
}

/// Accepted items and counters of a single repository.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RepositoryHarvest {
    pub items: Vec<AcceptedItem>,
    pub report: CollectionReport,
}

enum CandidateOutcome {
    Accepted(Box<AcceptedItem>),
    Rejected(Verdict),
    Dropped,
}

#[derive(Clone)]
pub struct Collector {
    fetcher: RateLimitedFetcher,
    reviews: ReviewCache,
    enricher: Enricher,
    settings: CollectionSettings,
}

impl Collector {
    /// Initializes a Collector talking to GitHub with the configured credential.
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let client = GitHubClient::new(&config.github_token, &config.github_api_base)?;
        Ok(Self::with_transport(Arc::new(client), config))
    }

    /// Builds a Collector on top of any transport; used by tests.
    pub fn with_transport(transport: Arc<dyn Transport>, config: &AppConfig) -> Self {
        let fetcher = RateLimitedFetcher::new(transport, retry_policy(config), config.page_delay());
        let reviews = ReviewCache::new(config.review_cache_max_capacity, config.review_cache_ttl());
        let enricher = Enricher::new(fetcher.clone(), reviews.clone());

        Self {
            fetcher,
            reviews,
            enricher,
            settings: CollectionSettings::from_config(config),
        }
    }

    pub fn fetcher(&self) -> &RateLimitedFetcher {
        &self.fetcher
    }

    /// Collects every repository in order and returns the combined dataset.
    pub async fn collect(&self, repositories: &[RepositoryDescriptor]) -> Collection {
        let mut collection = Collection::default();
        let total = repositories.len();
        tracing::info!("Collecting pull requests from {} repositories", total);

        for (index, descriptor) in repositories.iter().enumerate() {
            if index > 0 && !self.settings.repository_delay.is_zero() {
                tokio::time::sleep(self.settings.repository_delay).await;
            }
            tracing::info!("[{}/{}] Processing repository {}", index + 1, total, descriptor.full_name);

            let outcome = AssertUnwindSafe(self.collect_descriptor(descriptor))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(harvest)) => {
                    collection.report.repositories_processed += 1;
                    collection.report.absorb(&harvest.report);
                    collection.dataset.extend(harvest.items);
                    tracing::info!(
                        repo = %descriptor.full_name,
                        "Total pull requests collected so far: {}",
                        collection.dataset.len()
                    );
                }
                Ok(Err(e)) => {
                    collection.report.repositories_failed += 1;
                    tracing::error!("Failed to collect {}: {:#}", descriptor.full_name, e);
                }
                Err(_) => {
                    collection.report.repositories_failed += 1;
                    tracing::error!("Collection of {} panicked, skipping", descriptor.full_name);
                }
            }
        }

        tracing::info!(
            processed = collection.report.repositories_processed,
            failed = collection.report.repositories_failed,
            "Collection finished with {} pull requests",
            collection.dataset.len()
        );
        collection
    }

    async fn collect_descriptor(
        &self,
        descriptor: &RepositoryDescriptor,
    ) -> anyhow::Result<RepositoryHarvest> {
        let repo_id = descriptor.repo_id()?;
        Ok(self.collect_repository(&repo_id).await)
    }

    /// Pages, filters and enriches one repository up to the per-repository cap.
    ///
    /// A failing page ends this repository early; what was accepted so far is kept.
    pub async fn collect_repository(&self, repo_id: &RepoId) -> RepositoryHarvest {
        let mut harvest = RepositoryHarvest::default();
        let mut paginator = Paginator::new(
            &self.fetcher,
            PullRequestListing::new(repo_id.clone()),
            self.settings.max_items_per_repository,
        );

        let mut page = 0;
        while let Some(batch) = paginator.next_batch().await {
            page += 1;
            let candidates = match batch {
                Ok(candidates) => candidates,
                Err(e) => {
                    tracing::warn!(repo = %repo_id, page, "Listing request failed, stopping: {}", e);
                    break;
                }
            };
            let found = candidates.len();
            harvest.report.candidates_seen += found;

            let outcomes: Vec<CandidateOutcome> = stream::iter(candidates)
                .map(|candidate| self.process_candidate(repo_id, candidate))
                .buffered(self.settings.concurrency)
                .collect()
                .await;

            let mut accepted = 0;
            for outcome in outcomes {
                match outcome {
                    CandidateOutcome::Accepted(item) => {
                        accepted += 1;
                        harvest.items.push(*item);
                    }
                    CandidateOutcome::Rejected(Verdict::NoReviews) => {
                        harvest.report.rejected_no_reviews += 1
                    }
                    CandidateOutcome::Rejected(_) => harvest.report.rejected_too_fast += 1,
                    CandidateOutcome::Dropped => harvest.report.dropped_unenriched += 1,
                }
            }
            paginator.record_accepted(accepted);
            harvest.report.accepted += accepted;

            tracing::info!(
                repo = %repo_id,
                page,
                "{} pull requests found, {} accepted, {} total",
                found,
                accepted,
                paginator.collected()
            );
        }

        tracing::info!(repo = %repo_id, "Collected {} valid pull requests", harvest.items.len());
        harvest
    }

    async fn process_candidate(&self, repo_id: &RepoId, candidate: CandidateItem) -> CandidateOutcome {
        match filter::evaluate(&self.fetcher, &self.reviews, repo_id, &candidate).await {
            Verdict::Accepted => match self.enricher.enrich(repo_id, candidate).await {
                Some(item) => CandidateOutcome::Accepted(Box::new(item)),
                None => CandidateOutcome::Dropped,
            },
            verdict => {
                tracing::debug!(repo = %repo_id, number = candidate.number, ?verdict, "Candidate excluded");
                CandidateOutcome::Rejected(verdict)
            }
        }
    }
}

fn retry_policy(config: &AppConfig) -> RetryPolicy {
    RetryPolicy {
        base_cooldown: config.rate_limit_cooldown(),
        max_retries: config.max_rate_limit_retries,
        max_cooldown: config.max_backoff(),
    }
}
