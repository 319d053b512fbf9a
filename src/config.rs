//! Application configuration and environment variable parsing.
//!
//! This module handles loading configuration settings from the environment (e.g., .env file).
//! It defines the `AppConfig` struct which governs the collector's credential, per-repository
//! caps, rate-limit cooldown and pacing, and the fallback repository list.

use crate::types::RepoId;
use serde::Deserialize;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// GitHub Personal Access Token sent as a bearer credential.
    pub github_token: String,

    /// Root of the REST API. Overridden in tests and for GitHub Enterprise.
    #[serde(default = "default_api_base")]
    pub github_api_base: String,

    /// Repositories to collect when no repository list file is given.
    /// Expected format: comma-separated string of "owner/repo" pairs.
    /// Example: "facebook/react,rust-lang/rust"
    #[serde(default, deserialize_with = "deserialize_repositories")]
    pub repositories: Vec<RepoId>,

    /// Maximum number of accepted pull requests to collect per repository.
    #[serde(default = "default_max_prs_per_repository")]
    pub max_prs_per_repository: usize,

    /// Base cooldown after the API signals throttling.
    #[serde(default = "default_rate_limit_cooldown_secs")]
    pub rate_limit_cooldown_secs: u64,

    /// Number of cooldown-and-retry rounds before a throttled request fails.
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,

    /// Upper bound for the exponentially growing cooldown.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// Pause after every successful listing request.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Pause between two repositories.
    #[serde(default = "default_repository_delay_ms")]
    pub repository_delay_ms: u64,

    /// Number of candidates filtered and enriched concurrently within a page.
    #[serde(default = "default_enrichment_concurrency")]
    pub enrichment_concurrency: usize,

    /// Time to live for memoized review lists in seconds.
    #[serde(default = "default_review_cache_ttl_seconds")]
    pub review_cache_ttl_seconds: u64,

    /// Maximum number of review lists kept in memory.
    #[serde(default = "default_review_cache_max_capacity")]
    pub review_cache_max_capacity: u64,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_max_prs_per_repository() -> usize {
    200
}

fn default_rate_limit_cooldown_secs() -> u64 {
    60
}

fn default_max_rate_limit_retries() -> u32 {
    5
}

fn default_max_backoff_secs() -> u64 {
    900
}

fn default_page_delay_ms() -> u64 {
    1000
}

fn default_repository_delay_ms() -> u64 {
    2000
}

fn default_enrichment_concurrency() -> usize {
    4
}

fn default_review_cache_ttl_seconds() -> u64 {
    3600
}

fn default_review_cache_max_capacity() -> u64 {
    10_000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// A configuration with the built-in defaults and the given credential.
    pub fn with_token(github_token: impl Into<String>) -> Self {
        Self {
            github_token: github_token.into(),
            github_api_base: default_api_base(),
            repositories: Vec::new(),
            max_prs_per_repository: default_max_prs_per_repository(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown_secs(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            max_backoff_secs: default_max_backoff_secs(),
            page_delay_ms: default_page_delay_ms(),
            repository_delay_ms: default_repository_delay_ms(),
            enrichment_concurrency: default_enrichment_concurrency(),
            review_cache_ttl_seconds: default_review_cache_ttl_seconds(),
            review_cache_max_capacity: default_review_cache_max_capacity(),
        }
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn repository_delay(&self) -> Duration {
        Duration::from_millis(self.repository_delay_ms)
    }

    pub fn review_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.review_cache_ttl_seconds)
    }
}

fn deserialize_repositories<'de, D>(deserializer: D) -> Result<Vec<RepoId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(parse_repositories(&s))
}

fn parse_repositories(s: &str) -> Vec<RepoId> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .filter_map(|part| match part.parse::<RepoId>() {
            Ok(repo_id) => Some(repo_id),
            Err(e) => {
                tracing::warn!("Ignoring repository entry '{}': {}", part.trim(), e);
                None
            }
        })
        .collect()
}
