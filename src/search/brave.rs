//! Brave web search adapter.
//!
//! Brave's free tier allows one request per second, so every call goes through
//! a [`RateLimiter`]. Brave returns no relevance score; results get an
//! ordinal score of `1 / (rank + 1)`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;
use tracing::debug;

use super::http::{api_key_from_env, base_url_from_env, check_response, client};
use super::{
    clamp_results, BackendResponse, SearchBackend, SearchError, SearchOptions, SearchResult, Topic,
};
use crate::ratelimit::RateLimiter;

const DEFAULT_BASE_URL: &str = "https://api.search.brave.com";
const NAME: &str = "brave";

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1100);

pub struct BraveBackend {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl BraveBackend {
    pub fn new(api_key: Option<String>, min_interval: Duration) -> Result<Self, SearchError> {
        Ok(Self {
            http: client()?,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            limiter: Arc::new(RateLimiter::new(min_interval)),
        })
    }

    /// `BRAVE_API_KEY`, `BRAVE_BASE_URL`, `BRAVE_MIN_INTERVAL_MS`.
    pub fn from_env() -> Result<Self, SearchError> {
        let min_interval = std::env::var("BRAVE_MIN_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MIN_INTERVAL);
        let backend = Self::new(api_key_from_env("BRAVE_API_KEY"), min_interval)?
            .with_base_url(base_url_from_env("BRAVE_BASE_URL", DEFAULT_BASE_URL));
        debug!(
            available = backend.is_available(),
            min_interval_ms = backend.min_interval().as_millis() as u64,
            "configured brave backend"
        );
        Ok(backend)
    }

    /// Spacing enforced between requests by the current limiter.
    pub fn min_interval(&self) -> Duration {
        self.limiter.min_interval()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Share a limiter with other clients using the same subscription.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    async fn send(
        &self,
        api_key: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<BackendResponse, SearchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let token = HeaderValue::from_str(api_key).map_err(|_| SearchError::BackendRequestFailed {
            backend: NAME.to_string(),
            status: 0,
            message: "API key is not a valid header value".to_string(),
        })?;
        headers.insert("X-Subscription-Token", token);

        let count = clamp_results(options.max_results, 20).to_string();
        let mut params = vec![("q", query), ("count", count.as_str())];
        if options.topic == Topic::News {
            params.push(("freshness", freshness(options.recency_days)));
        }

        let resp = self
            .http
            .get(format!("{}/res/v1/web/search", self.base_url))
            .headers(headers)
            .query(&params)
            .send()
            .await?;
        let data: BraveResponse = check_response(NAME, resp).await?.json().await?;

        let results = data
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(rank, r)| {
                SearchResult::from_backend(
                    self,
                    r.title.unwrap_or_default(),
                    r.url,
                    r.description.unwrap_or_default(),
                    Some(1.0 / (rank as f64 + 1.0)),
                )
            })
            .collect();

        Ok(BackendResponse {
            results,
            answer: None,
        })
    }
}

/// Brave only knows day/week/month/year windows.
fn freshness(recency_days: u32) -> &'static str {
    match recency_days {
        0..=1 => "pd",
        2..=7 => "pw",
        8..=31 => "pm",
        _ => "py",
    }
}

#[derive(Deserialize)]
struct BraveResponse {
    web: Option<BraveWeb>,
}

#[derive(Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    title: Option<String>,
    url: String,
    description: Option<String>,
}

#[async_trait::async_trait]
impl SearchBackend for BraveBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<BackendResponse, SearchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SearchError::BackendUnavailable {
                backend: NAME.to_string(),
            })?;

        self.limiter
            .schedule(|| self.send(api_key, query, options))
            .await
    }
}
