//! Rate-limited access to the hosting API.
//!
//! `RateLimitedFetcher` wraps a [`Transport`] and turns raw responses into parsed JSON:
//! 1. HTTP 200 bodies are parsed and returned.
//! 2. Throttling (403, and 429 for secondary limits) trips the shared [`CooldownGate`]
//!    and retries the same request with an exponentially growing cooldown, up to a ceiling.
//! 3. Any other status is a terminal `RequestFailed` for that request only.
//!
//! Listing calls are followed by a fixed pacing delay.

use crate::github::Transport;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

const STATUS_OK: u16 = 200;
const STATUS_FORBIDDEN: u16 = 403;
const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Failures of a single fetch. None of them is fatal to a collection run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The API answered with a status other than 200 or a throttling signal.
    #[error("request failed with status {0}")]
    RequestFailed(u16),

    /// Connectivity failed, or the response body could not be parsed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Throttling did not clear within the retry ceiling.
    #[error("still rate limited after {attempts} attempts")]
    Throttled { attempts: u32 },
}

/// Cooldown schedule for throttled requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_cooldown: Duration,
    pub max_retries: u32,
    pub max_cooldown: Duration,
}

impl RetryPolicy {
    /// Cooldown before retry number `attempt` (0-based): doubles every round, capped.
    pub fn cooldown_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_cooldown
            .saturating_mul(factor)
            .min(self.max_cooldown)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_cooldown: Duration::from_secs(60),
            max_retries: 5,
            max_cooldown: Duration::from_secs(900),
        }
    }
}

/// The single cooldown clock shared by every request made with one credential.
///
/// Whoever first observes throttling starts the cooldown; requests that observe it
/// while a cooldown is already running just wait for that one to end.
#[derive(Debug, Default)]
pub struct CooldownGate {
    blocked_until: Mutex<Option<Instant>>,
    cooldowns: AtomicU32,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no cooldown is in effect.
    pub async fn ready(&self) {
        let blocked_until = *self.blocked_until.lock().await;
        if let Some(deadline) = blocked_until {
            tokio::time::sleep_until(deadline).await;
        }
    }

    /// Starts a cooldown of `delay` unless one is already running.
    /// Returns whether this call started it.
    pub async fn trip(&self, delay: Duration) -> bool {
        let mut blocked_until = self.blocked_until.lock().await;
        let now = Instant::now();
        match *blocked_until {
            Some(deadline) if deadline > now => false,
            _ => {
                *blocked_until = Some(now + delay);
                self.cooldowns.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    /// Number of cooldowns started so far.
    pub fn cooldowns(&self) -> u32 {
        self.cooldowns.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct RateLimitedFetcher {
    transport: Arc<dyn Transport>,
    gate: Arc<CooldownGate>,
    policy: RetryPolicy,
    page_delay: Duration,
}

impl RateLimitedFetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, page_delay: Duration) -> Self {
        Self {
            transport,
            gate: Arc::new(CooldownGate::new()),
            policy,
            page_delay,
        }
    }

    pub fn gate(&self) -> &CooldownGate {
        &self.gate
    }

    /// Fetches a sub-resource or any other non-listing endpoint.
    pub async fn fetch(&self, route: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        self.execute(route, query).await
    }

    /// Fetches one page of a listing endpoint, then observes the pacing delay.
    pub async fn fetch_listing(
        &self,
        route: &str,
        query: &[(&str, String)],
    ) -> Result<Value, FetchError> {
        let body = self.execute(route, query).await?;
        if !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }
        Ok(body)
    }

    async fn execute(&self, route: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let mut attempt = 0;
        loop {
            self.gate.ready().await;

            let response = self.transport.get(route, query).await?;
            match response.status {
                STATUS_OK => {
                    return serde_json::from_str(&response.body).map_err(|e| {
                        FetchError::Transport(format!("invalid JSON from {}: {}", route, e))
                    });
                }
                STATUS_FORBIDDEN | STATUS_TOO_MANY_REQUESTS => {
                    if attempt >= self.policy.max_retries {
                        tracing::warn!(route, attempts = attempt + 1, "Rate limit did not clear, giving up");
                        return Err(FetchError::Throttled {
                            attempts: attempt + 1,
                        });
                    }
                    let delay = self.policy.cooldown_for(attempt);
                    if self.gate.trip(delay).await {
                        tracing::warn!(
                            route,
                            status = response.status,
                            attempt,
                            delay_secs = delay.as_secs(),
                            "Rate limit reached, cooling down"
                        );
                    }
                    attempt += 1;
                }
                status => return Err(FetchError::RequestFailed(status)),
            }
        }
    }
}

/// Decodes a fetched JSON body into a typed value.
pub fn decode<T: DeserializeOwned>(body: Value) -> Result<T, FetchError> {
    serde_json::from_value(body)
        .map_err(|e| FetchError::Transport(format!("unexpected response shape: {}", e)))
}
