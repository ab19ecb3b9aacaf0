//! Exa search adapter.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::http::{api_key_from_env, base_url_from_env, check_response, client};
use super::{
    clamp_results, BackendResponse, SearchBackend, SearchError, SearchOptions, SearchResult, Topic,
};
use crate::ratelimit::RateLimiter;

const DEFAULT_BASE_URL: &str = "https://api.exa.ai";
const NAME: &str = "exa";

/// Page text requested per result. The evidence renderer truncates further.
const MAX_TEXT_CHARS: u32 = 2_000;

pub struct ExaBackend {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    limiter: Option<Arc<RateLimiter>>,
}

impl ExaBackend {
    pub fn new(api_key: Option<String>) -> Result<Self, SearchError> {
        Ok(Self {
            http: client()?,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            limiter: None,
        })
    }

    /// `EXA_API_KEY`, `EXA_BASE_URL`.
    pub fn from_env() -> Result<Self, SearchError> {
        Ok(Self::new(api_key_from_env("EXA_API_KEY"))?
            .with_base_url(base_url_from_env("EXA_BASE_URL", DEFAULT_BASE_URL)))
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
        let start_published_date = (options.topic == Topic::News).then(|| {
            (Utc::now() - ChronoDuration::days(i64::from(options.recency_days)))
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        });
        let body = ExaRequest {
            query,
            num_results: clamp_results(options.max_results, 100),
            contents: ExaContents {
                text: ExaTextOptions {
                    max_characters: MAX_TEXT_CHARS,
                },
            },
            start_published_date,
        };

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key).map_err(|_| SearchError::BackendRequestFailed {
            backend: NAME.to_string(),
            status: 0,
            message: "API key is not a valid header value".to_string(),
        })?;
        headers.insert("x-api-key", key);

        let resp = self
            .http
            .post(format!("{}/search", self.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await?;
        let data: ExaResponse = check_response(NAME, resp).await?.json().await?;

        let results = data
            .results
            .into_iter()
            .map(|r| {
                SearchResult::from_backend(
                    self,
                    r.title.unwrap_or_default(),
                    r.url,
                    r.text.unwrap_or_default(),
                    r.score,
                )
            })
            .collect();

        Ok(BackendResponse {
            results,
            answer: None,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaRequest<'a> {
    query: &'a str,
    num_results: u32,
    contents: ExaContents,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_published_date: Option<String>,
}

#[derive(Serialize)]
struct ExaContents {
    text: ExaTextOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaTextOptions {
    max_characters: u32,
}

#[derive(Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Deserialize)]
struct ExaResult {
    title: Option<String>,
    url: String,
    text: Option<String>,
    score: Option<f64>,
}

#[async_trait::async_trait]
impl SearchBackend for ExaBackend {
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
