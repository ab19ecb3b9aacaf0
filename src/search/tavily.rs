//! Tavily search adapter.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::http::{api_key_from_env, base_url_from_env, check_response, client};
use super::{
    clamp_results, BackendResponse, SearchBackend, SearchError, SearchOptions, SearchResult, Topic,
};
use crate::ratelimit::RateLimiter;

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";
const NAME: &str = "tavily";

pub struct TavilyBackend {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Option<Arc<RateLimiter>>,
}

impl TavilyBackend {
    /// A backend with no key is constructed anyway and reports itself
    /// unavailable.
    pub fn new(api_key: Option<String>) -> Result<Self, SearchError> {
        Ok(Self {
            http: client()?,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            limiter: None,
        })
    }

    /// `TAVILY_API_KEY`, `TAVILY_BASE_URL`.
    pub fn from_env() -> Result<Self, SearchError> {
        Ok(Self::new(api_key_from_env("TAVILY_API_KEY"))?
            .with_base_url(base_url_from_env("TAVILY_BASE_URL", DEFAULT_BASE_URL)))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    async fn send(
        &self,
        api_key: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<BackendResponse, SearchError> {
        let body = TavilyRequest {
            api_key,
            query,
            max_results: clamp_results(options.max_results, 20),
            topic: options.topic.as_str(),
            search_depth: options.search_depth.as_str(),
            include_answer: options.include_answer,
            // Tavily only honors `days` for news.
            days: (options.topic == Topic::News).then_some(options.recency_days),
        };

        let resp = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await?;
        let data: TavilyResponse = check_response(NAME, resp).await?.json().await?;

        let results = data
            .results
            .into_iter()
            .map(|r| {
                SearchResult::from_backend(
                    self,
                    r.title.unwrap_or_default(),
                    r.url,
                    r.content.unwrap_or_default(),
                    r.score,
                )
            })
            .collect();

        Ok(BackendResponse {
            results,
            answer: data.answer.filter(|a| !a.trim().is_empty()),
        })
    }
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
    topic: &'a str,
    search_depth: &'a str,
    include_answer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    days: Option<u32>,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    title: Option<String>,
    url: String,
    content: Option<String>,
    score: Option<f64>,
}

#[async_trait::async_trait]
impl SearchBackend for TavilyBackend {
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

        match &self.limiter {
            Some(limiter) => limiter.schedule(|| self.send(api_key, query, options)).await,
            None => self.send(api_key, query, options).await,
        }
    }
}
