//! Builds the repository list consumed by a collection run.
//!
//! Popular repositories are found through the repository search endpoint, then
//! kept only if they have enough closed pull requests to be worth collecting.

use crate::fetcher::{decode, FetchError, RateLimitedFetcher};
use crate::pagination::{Listing, Paginator};
use crate::types::{RepoId, RepositoryDescriptor};
use serde::Deserialize;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoverySettings {
    /// Repository search query, e.g. `stars:>1000`.
    pub query: String,
    /// Number of search results to consider.
    pub limit: usize,
    /// Minimum number of closed pull requests a repository needs.
    pub min_closed_prs: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            query: "stars:>1000".to_string(),
            limit: 200,
            min_closed_prs: 100,
        }
    }
}

/// Repository entry of the search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRepository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl From<SearchRepository> for RepositoryDescriptor {
    fn from(repository: SearchRepository) -> Self {
        Self {
            full_name: repository.full_name,
            id: Some(repository.id),
            name: Some(repository.name),
            description: repository.description,
            html_url: repository.html_url,
            stars: Some(repository.stargazers_count),
            forks: Some(repository.forks_count),
            language: repository.language,
            created_at: repository.created_at,
            updated_at: repository.updated_at,
            total_closed_prs: None,
        }
    }
}

#[derive(Deserialize)]
struct SearchPage<T> {
    #[serde(default)]
    total_count: u64,
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Repositories matching a search query, most starred first.
pub struct RepositorySearch {
    query: String,
}

impl RepositorySearch {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

impl Listing for RepositorySearch {
    type Item = SearchRepository;

    fn route(&self) -> String {
        "search/repositories".to_string()
    }

    fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("q", self.query.clone()),
            ("sort", "stars".to_string()),
            ("order", "desc".to_string()),
        ]
    }

    fn paced(&self) -> bool {
        true
    }

    fn items(&self, body: Value) -> Result<Vec<SearchRepository>, FetchError> {
        let page: SearchPage<SearchRepository> = decode(body)?;
        Ok(page.items)
    }
}

/// Searches repositories, up to `limit`. A failing page ends the search early.
pub async fn search_repositories(
    fetcher: &RateLimitedFetcher,
    query: &str,
    limit: usize,
) -> Vec<RepositoryDescriptor> {
    let mut paginator = Paginator::new(fetcher, RepositorySearch::new(query), limit);
    let mut repositories = Vec::new();

    while let Some(batch) = paginator.next_batch().await {
        match batch {
            Ok(batch) => {
                paginator.record_accepted(batch.len());
                tracing::info!(
                    "Collected {} repositories from search page, {} total",
                    batch.len(),
                    paginator.collected()
                );
                repositories.extend(batch.into_iter().map(RepositoryDescriptor::from));
            }
            Err(e) => {
                tracing::warn!("Repository search failed, stopping: {}", e);
                break;
            }
        }
    }

    repositories.truncate(limit);
    repositories
}

/// Number of closed pull requests of a repository, from the issue search endpoint.
pub async fn closed_pull_request_count(
    fetcher: &RateLimitedFetcher,
    repo_id: &RepoId,
) -> Result<u64, FetchError> {
    let query = [
        ("q", format!("repo:{} is:pr is:closed", repo_id)),
        ("per_page", "1".to_string()),
    ];
    let body = fetcher.fetch_listing("search/issues", &query).await?;
    let page: SearchPage<Value> = decode(body)?;
    Ok(page.total_count)
}

/// Keeps repositories with at least `min_closed_prs` closed pull requests and
/// records the count on each kept descriptor.
pub async fn filter_by_closed_prs(
    fetcher: &RateLimitedFetcher,
    repositories: Vec<RepositoryDescriptor>,
    min_closed_prs: u64,
) -> Vec<RepositoryDescriptor> {
    let total = repositories.len();
    let mut selected = Vec::new();

    for (index, mut descriptor) in repositories.into_iter().enumerate() {
        tracing::info!("[{}/{}] Checking {}", index + 1, total, descriptor.full_name);
        let repo_id = match descriptor.repo_id() {
            Ok(repo_id) => repo_id,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", descriptor.full_name, e);
                continue;
            }
        };

        match closed_pull_request_count(fetcher, &repo_id).await {
            Ok(count) if count >= min_closed_prs => {
                tracing::info!(repo = %repo_id, "{} closed pull requests, selected", count);
                descriptor.total_closed_prs = Some(count);
                selected.push(descriptor);
            }
            Ok(count) => {
                tracing::info!(repo = %repo_id, "{} closed pull requests, below minimum", count);
            }
            Err(e) => {
                tracing::warn!(repo = %repo_id, "Could not count closed pull requests: {}", e);
            }
        }
    }

    tracing::info!(
        "{} of {} repositories meet the closed pull request minimum",
        selected.len(),
        total
    );
    selected
}

pub async fn discover(
    fetcher: &RateLimitedFetcher,
    settings: &DiscoverySettings,
) -> Vec<RepositoryDescriptor> {
    tracing::info!(query = %settings.query, "Searching the {} most starred repositories", settings.limit);
    let candidates = search_repositories(fetcher, &settings.query, settings.limit).await;
    filter_by_closed_prs(fetcher, candidates, settings.min_closed_prs).await
}
