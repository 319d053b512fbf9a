use crate::fetcher::FetchError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::service::middleware::retry::RetryConfig;
use octocrab::Octocrab;
use url::Url;

/// Status and body of one raw API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// A single authenticated GET against the hosting API.
///
/// Implementations report every HTTP status as a response; only failures to
/// talk to the server at all become `FetchError::Transport`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, route: &str, query: &[(&str, String)]) -> Result<ApiResponse, FetchError>;
}

/// Octocrab-backed transport for the GitHub REST API.
#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
    api_base: Url,
}

impl GitHubClient {
    pub fn new(token: &str, api_base: &str) -> Result<Self> {
        let api_base = Url::parse(api_base)
            .with_context(|| format!("invalid GitHub API base '{}'", api_base))?;

        // Retries are owned by RateLimitedFetcher.
        let octocrab = Octocrab::builder()
            .personal_token(token.to_string())
            .add_retry_config(RetryConfig::None)
            .base_uri(api_base.as_str())?
            .build()
            .context("failed to build GitHub client")?;

        Ok(Self { octocrab, api_base })
    }

    fn request_url(&self, route: &str, query: &[(&str, String)]) -> Result<Url, FetchError> {
        let base = self.api_base.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{}/{}", base, route.trim_start_matches('/')))
            .map_err(|e| FetchError::Transport(format!("invalid route '{}': {}", route, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(key, value)| (*key, value.as_str())));
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for GitHubClient {
    async fn get(&self, route: &str, query: &[(&str, String)]) -> Result<ApiResponse, FetchError> {
        let url = self.request_url(route, query)?;
        tracing::debug!(url = %url, "GET");

        let response = self
            .octocrab
            ._get(url.to_string())
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = self
            .octocrab
            .body_to_string(response)
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(ApiResponse { status, body })
    }
}
