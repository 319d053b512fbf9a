use crate::fetcher::{FetchError, RateLimitedFetcher};
use crate::models::Review;
use crate::pagination::{collect_all, SubResource, SUB_RESOURCE_CAP};
use crate::types::RepoId;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReviewKey {
    pub repo_id: RepoId,
    pub number: u64,
}

/// Memoizes the reviews sub-resource so the filter's review check and the
/// interaction metrics share a single fetch. Failures are never cached.
#[derive(Clone)]
pub struct ReviewCache {
    cache: Cache<ReviewKey, Arc<Vec<Review>>>,
}

impl ReviewCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn reviews(
        &self,
        fetcher: &RateLimitedFetcher,
        repo_id: &RepoId,
        number: u64,
    ) -> Result<Arc<Vec<Review>>, FetchError> {
        let key = ReviewKey {
            repo_id: repo_id.clone(),
            number,
        };

        self.cache
            .try_get_with(key, async {
                let reviews =
                    collect_all(fetcher, SubResource::reviews(repo_id, number), SUB_RESOURCE_CAP)
                        .await?;
                Ok::<_, FetchError>(Arc::new(reviews))
            })
            .await
            .map_err(|e| (*e).clone())
    }

    #[cfg(test)]
    pub async fn contains(&self, repo_id: &RepoId, number: u64) -> bool {
        let key = ReviewKey {
            repo_id: repo_id.clone(),
            number,
        };
        self.cache.get(&key).await.is_some()
    }
}
