//! Web search: backend adapters and the multi-backend aggregator.
//!
//! Every backend speaks a different HTTP API with a different score scale.
//! Adapters hide that behind [`SearchBackend`] and hand back normalized
//! [`SearchResult`]s; the [`SearchAggregator`] fans a query out to all of
//! them and tolerates individual failures.

pub mod aggregator;
pub mod brave;
pub mod exa;
mod http;
pub mod tavily;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use aggregator::SearchAggregator;
pub use brave::BraveBackend;
pub use exa::ExaBackend;
pub use tavily::TavilyBackend;

// =============================================================================
// RESULTS
// =============================================================================

/// One hit from one backend, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    /// Relevance on the originating backend's own scale.
    pub score: Option<f64>,
    /// Name of the backend that produced this result.
    pub source: String,
}

impl SearchResult {
    /// Adapters (and test doubles standing in for them) build results here so
    /// that `source` is always the backend's registered name.
    pub fn from_backend(
        backend: &dyn SearchBackend,
        title: impl Into<String>,
        url: impl Into<String>,
        content: impl Into<String>,
        score: Option<f64>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: content.into(),
            score,
            source: backend.name().to_string(),
        }
    }
}

/// A backend's normalized answer to one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub results: Vec<SearchResult>,
    /// Answer synthesized by the backend itself, when it offers one.
    pub answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendOutcome {
    Succeeded(BackendResponse),
    Failed { error: String },
}

impl BackendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BackendOutcome::Succeeded(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResponse {
    pub per_backend: BTreeMap<String, BackendOutcome>,
    /// Results of the backends in `used_backends`, in registration order.
    pub combined_results: Vec<SearchResult>,
    /// Backends that answered successfully, in registration order.
    pub used_backends: Vec<String>,
}

impl AggregatedResponse {
    /// Backend-synthesized answers in registration order, with their backend.
    pub fn answers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.used_backends.iter().filter_map(|name| {
            match self.per_backend.get(name) {
                Some(BackendOutcome::Succeeded(BackendResponse {
                    answer: Some(answer),
                    ..
                })) if !answer.trim().is_empty() => Some((name.as_str(), answer.as_str())),
                _ => None,
            }
        })
    }
}

// =============================================================================
// OPTIONS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    #[default]
    General,
    News,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::General => "general",
            Topic::News => "news",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

impl SearchDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub max_results: u32,
    /// How far back results may go. Backends without a native recency
    /// filter ignore it.
    pub recency_days: u32,
    pub topic: Topic,
    pub search_depth: SearchDepth,
    pub include_answer: bool,
    /// Route to exactly this backend instead of fanning out.
    pub backend: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 3,
            recency_days: 3,
            topic: Topic::General,
            search_depth: SearchDepth::Basic,
            include_answer: true,
            backend: None,
        }
    }
}

impl SearchOptions {
    pub fn targeted(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("backend {backend} is not configured")]
    BackendUnavailable { backend: String },

    #[error("backend {backend} request failed ({status}): {message}")]
    BackendRequestFailed {
        backend: String,
        status: u16,
        message: String,
    },

    #[error("backend {backend} rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        backend: String,
        retry_after_secs: u64,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend {backend} timed out after {timeout:?}")]
    Timeout { backend: String, timeout: Duration },

    #[error("no such backend: {0}")]
    NoSuchBackend(String),

    #[error("no search backends available")]
    NoProvidersAvailable,

    #[error("all search backends failed: {}", format_failures(.0))]
    AllBackendsFailed(Vec<(String, String)>),

    #[error("backend {0} is already registered")]
    DuplicateBackend(String),
}

impl SearchError {
    /// Errors that mean searching cannot work at all, as opposed to one
    /// query going wrong.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SearchError::NoProvidersAvailable | SearchError::NoSuchBackend(_)
        )
    }
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(backend, error)| format!("{backend}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// BACKEND TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backend has what it needs (credentials) to be called.
    fn is_available(&self) -> bool;

    async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<BackendResponse, SearchError>;
}

/// Cap per-backend result counts at what the APIs accept.
pub(crate) fn clamp_results(max_results: u32, upper: u32) -> u32 {
    max_results.clamp(1, upper)
}
