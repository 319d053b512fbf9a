use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A unique identifier for a GitHub repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    /// The owner of the repository (e.g., "facebook").
    pub owner: String,
    /// The name of the repository (e.g., "react").
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Route prefix for repository-scoped endpoints, e.g. `repos/rust-lang/rust`.
    pub fn route(&self) -> String {
        format!("repos/{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(repo), None) => {
                let (owner, repo) = (owner.trim(), repo.trim());
                // Path segments only; anything else would escape the repos/ route.
                let valid = |segment: &str| {
                    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('?')
                };
                if valid(owner) && valid(repo) {
                    Ok(Self::new(owner, repo))
                } else {
                    anyhow::bail!("invalid repository name '{}'", s)
                }
            }
            _ => anyhow::bail!("repository name '{}' is not in owner/name form", s),
        }
    }
}

/// A repository to collect from, as stored in the repository list file.
///
/// Only `full_name` drives collection; the remaining fields are carried for
/// reporting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub full_name: String,
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub stars: Option<u64>,
    #[serde(default)]
    pub forks: Option<u64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub total_closed_prs: Option<u64>,
}

impl RepositoryDescriptor {
    pub fn from_full_name(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            ..Self::default()
        }
    }

    pub fn repo_id(&self) -> Result<RepoId> {
        self.full_name.parse()
    }
}

impl From<&RepoId> for RepositoryDescriptor {
    fn from(repo_id: &RepoId) -> Self {
        Self::from_full_name(repo_id.to_string())
    }
}

/// Loads the repository list written by `discover` (or by hand).
pub fn load_repositories(path: &Path) -> Result<Vec<RepositoryDescriptor>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read repository list {}", path.display()))?;
    let repositories: Vec<RepositoryDescriptor> = serde_json::from_str(&raw)
        .with_context(|| format!("repository list {} is not valid JSON", path.display()))?;
    Ok(repositories)
}

pub fn save_repositories(path: &Path, repositories: &[RepositoryDescriptor]) -> Result<()> {
    let json = serde_json::to_string_pretty(repositories)?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write repository list {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo_id() {
        let repo_id: RepoId = " rust-lang / rust ".parse().unwrap();
        assert_eq!(repo_id, RepoId::new("rust-lang", "rust"));
        assert_eq!(repo_id.to_string(), "rust-lang/rust");
        assert_eq!(repo_id.route(), "repos/rust-lang/rust");
    }

    #[test]
    fn test_parse_repo_id_rejects_malformed_names() {
        assert!("rust".parse::<RepoId>().is_err());
        assert!("a/b/c".parse::<RepoId>().is_err());
        assert!("/rust".parse::<RepoId>().is_err());
        assert!("../etc".parse::<RepoId>().is_err());
    }

    #[test]
    fn test_repository_list_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repositories.json");

        let mut descriptor = RepositoryDescriptor::from_full_name("tokio-rs/tokio");
        descriptor.stars = Some(25_000);
        descriptor.language = Some("Rust".to_string());
        save_repositories(&path, &[descriptor.clone()]).unwrap();

        let loaded = load_repositories(&path).unwrap();
        assert_eq!(loaded, vec![descriptor]);
        assert_eq!(loaded[0].repo_id().unwrap(), RepoId::new("tokio-rs", "tokio"));
    }

    #[test]
    fn test_load_repositories_accepts_minimal_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repositories.json");
        std::fs::write(&path, r#"[{"full_name": "serde-rs/serde"}]"#).unwrap();

        let loaded = load_repositories(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].stars, None);
    }

    #[test]
    fn test_load_repositories_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_repositories(&dir.path().join("absent.json")).is_err());
    }
}
