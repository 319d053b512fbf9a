//! Page-number pagination over listing endpoints.
//!
//! A [`Paginator`] requests pages starting at 1, each sized
//! `min(PAGE_SIZE, max_items - collected)`, where `collected` is whatever the caller
//! reports through [`Paginator::record_accepted`]. It stops on an empty page, on a
//! page shorter than requested, once `collected` reaches `max_items`, or after the
//! first fetch error.

use crate::fetcher::{decode, FetchError, RateLimitedFetcher};
use crate::models::{CandidateItem, FileEntry, IssueComment, Review};
use crate::types::RepoId;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Largest page size the API accepts.
pub const PAGE_SIZE: usize = 100;

/// Upper bound on entries read from a pull request sub-resource.
pub const SUB_RESOURCE_CAP: usize = 3000;

/// A paged endpoint.
pub trait Listing: Send + Sync {
    type Item: DeserializeOwned + Send;

    fn route(&self) -> String;

    /// Query parameters other than `page` and `per_page`.
    fn query(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Whether each page is followed by the fetcher's pacing delay.
    fn paced(&self) -> bool {
        false
    }

    /// Extracts the page's items from the response body.
    fn items(&self, body: Value) -> Result<Vec<Self::Item>, FetchError> {
        decode(body)
    }
}

/// Closed pull requests of one repository, most recently updated first.
pub struct PullRequestListing {
    repo_id: RepoId,
}

impl PullRequestListing {
    pub fn new(repo_id: RepoId) -> Self {
        Self { repo_id }
    }
}

impl Listing for PullRequestListing {
    type Item = CandidateItem;

    fn route(&self) -> String {
        format!("{}/pulls", self.repo_id.route())
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("state", "closed".to_string()),
            ("sort", "updated".to_string()),
            ("direction", "desc".to_string()),
        ]
    }

    fn paced(&self) -> bool {
        true
    }
}

/// A per-pull-request sub-resource such as `pulls/{n}/reviews`.
pub struct SubResource<T> {
    route: String,
    _item: std::marker::PhantomData<fn() -> T>,
}

impl<T> SubResource<T> {
    fn new(route: String) -> Self {
        Self {
            route,
            _item: std::marker::PhantomData,
        }
    }
}

impl SubResource<Review> {
    pub fn reviews(repo_id: &RepoId, number: u64) -> Self {
        Self::new(format!("{}/pulls/{}/reviews", repo_id.route(), number))
    }
}

impl SubResource<FileEntry> {
    pub fn files(repo_id: &RepoId, number: u64) -> Self {
        Self::new(format!("{}/pulls/{}/files", repo_id.route(), number))
    }
}

impl SubResource<IssueComment> {
    pub fn comments(repo_id: &RepoId, number: u64) -> Self {
        Self::new(format!("{}/issues/{}/comments", repo_id.route(), number))
    }
}

impl<T: DeserializeOwned + Send> Listing for SubResource<T> {
    type Item = T;

    fn route(&self) -> String {
        self.route.clone()
    }
}

pub struct Paginator<'a, L> {
    fetcher: &'a RateLimitedFetcher,
    listing: L,
    max_items: usize,
    collected: usize,
    page: u32,
    pages_fetched: u32,
    finished: bool,
}

impl<'a, L: Listing> Paginator<'a, L> {
    pub fn new(fetcher: &'a RateLimitedFetcher, listing: L, max_items: usize) -> Self {
        Self {
            fetcher,
            listing,
            max_items,
            collected: 0,
            page: 1,
            pages_fetched: 0,
            finished: false,
        }
    }

    /// Fetches the next raw page.
    ///
    /// Returns `None` once pagination is over. An `Err` ends pagination as well; the
    /// caller keeps whatever it accumulated before.
    pub async fn next_batch(&mut self) -> Option<Result<Vec<L::Item>, FetchError>> {
        if self.finished || self.collected >= self.max_items {
            return None;
        }

        let requested = PAGE_SIZE.min(self.max_items - self.collected);
        let route = self.listing.route();
        let mut query = self.listing.query();
        query.push(("page", self.page.to_string()));
        query.push(("per_page", requested.to_string()));

        let body = if self.listing.paced() {
            self.fetcher.fetch_listing(&route, &query).await
        } else {
            self.fetcher.fetch(&route, &query).await
        };
        let items = match body.and_then(|body| self.listing.items(body)) {
            Ok(items) => items,
            Err(e) => {
                self.finished = true;
                return Some(Err(e));
            }
        };
        self.pages_fetched += 1;

        if items.is_empty() {
            tracing::debug!(route = %route, page = self.page, "Empty page, pagination finished");
            self.finished = true;
            return None;
        }
        if items.len() < requested {
            self.finished = true;
        }
        self.page += 1;

        Some(Ok(items))
    }

    /// Counts `count` items of the last batch towards `max_items`.
    pub fn record_accepted(&mut self, count: usize) {
        self.collected += count;
    }

    pub fn collected(&self) -> usize {
        self.collected
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }
}

/// Reads every entry of a listing, up to `cap`. Unlike top-level pagination, any
/// fetch error fails the whole read.
pub async fn collect_all<L: Listing>(
    fetcher: &RateLimitedFetcher,
    listing: L,
    cap: usize,
) -> Result<Vec<L::Item>, FetchError> {
    let mut paginator = Paginator::new(fetcher, listing, cap);
    let mut all = Vec::new();
    while let Some(batch) = paginator.next_batch().await {
        let batch = batch?;
        paginator.record_accepted(batch.len());
        all.extend(batch);
    }
    Ok(all)
}
