//! Multi-backend search: targeted or fan-out, tolerant of partial failure.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use super::{
    AggregatedResponse, BackendOutcome, BackendResponse, BraveBackend, ExaBackend, SearchBackend,
    SearchError, SearchOptions, TavilyBackend,
};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Name-keyed registry of backends, kept in registration order.
pub struct SearchAggregator {
    backends: Vec<Arc<dyn SearchBackend>>,
    call_timeout: Duration,
}

impl Default for SearchAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_CALL_TIMEOUT)
    }
}

impl SearchAggregator {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            backends: Vec::new(),
            call_timeout,
        }
    }

    /// Tavily, Exa and Brave from their environment variables. Backends
    /// without a key are registered but unavailable.
    pub fn from_env(call_timeout: Duration) -> Result<Self, SearchError> {
        let mut aggregator = Self::new(call_timeout);
        aggregator.register(Arc::new(TavilyBackend::from_env()?))?;
        aggregator.register(Arc::new(ExaBackend::from_env()?))?;
        aggregator.register(Arc::new(BraveBackend::from_env()?))?;
        Ok(aggregator)
    }

    pub fn register(&mut self, backend: Arc<dyn SearchBackend>) -> Result<(), SearchError> {
        if self.backends.iter().any(|b| b.name() == backend.name()) {
            return Err(SearchError::DuplicateBackend(backend.name().to_string()));
        }
        debug!(
            backend = backend.name(),
            available = backend.is_available(),
            "registered search backend"
        );
        self.backends.push(backend);
        Ok(())
    }

    /// Every registered backend with its availability, in registration order.
    pub fn backends(&self) -> impl Iterator<Item = (&str, bool)> {
        self.backends.iter().map(|b| (b.name(), b.is_available()))
    }

    /// Names a fan-out search would call.
    pub fn available_backends(&self) -> Vec<String> {
        self.backends
            .iter()
            .filter(|b| b.is_available())
            .map(|b| b.name().to_string())
            .collect()
    }

    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<AggregatedResponse, SearchError> {
        match options.backend.as_deref() {
            Some(name) => self.search_targeted(name, query, options).await,
            None => self.search_all(query, options).await,
        }
    }

    async fn search_targeted(
        &self,
        name: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<AggregatedResponse, SearchError> {
        let backend = self
            .backends
            .iter()
            .find(|b| b.name() == name && b.is_available())
            .ok_or_else(|| SearchError::NoSuchBackend(name.to_string()))?;

        let response = self.call(backend.as_ref(), query, options).await?;

        Ok(AggregatedResponse {
            combined_results: response.results.clone(),
            used_backends: vec![name.to_string()],
            per_backend: [(name.to_string(), BackendOutcome::Succeeded(response))]
                .into_iter()
                .collect(),
        })
    }

    /// Call every available backend concurrently. One backend failing does
    /// not fail the search; all of them failing does.
    async fn search_all(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<AggregatedResponse, SearchError> {
        let available: Vec<&Arc<dyn SearchBackend>> =
            self.backends.iter().filter(|b| b.is_available()).collect();
        if available.is_empty() {
            return Err(SearchError::NoProvidersAvailable);
        }

        let outcomes = join_all(
            available
                .iter()
                .map(|b| self.call(b.as_ref(), query, options)),
        )
        .await;

        let mut aggregated = AggregatedResponse::default();
        let mut failures = Vec::new();
        // join_all preserves input order, so this walks registration order.
        for (backend, outcome) in available.iter().zip(outcomes) {
            let name = backend.name().to_string();
            match outcome {
                Ok(response) => {
                    aggregated
                        .combined_results
                        .extend(response.results.iter().cloned());
                    aggregated.used_backends.push(name.clone());
                    aggregated
                        .per_backend
                        .insert(name, BackendOutcome::Succeeded(response));
                }
                Err(e) => {
                    warn!(backend = %name, query, error = %e, "search backend failed");
                    failures.push((name.clone(), e.to_string()));
                    aggregated.per_backend.insert(
                        name,
                        BackendOutcome::Failed {
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        if aggregated.used_backends.is_empty() {
            return Err(SearchError::AllBackendsFailed(failures));
        }

        debug!(
            query,
            used = ?aggregated.used_backends,
            results = aggregated.combined_results.len(),
            "fan-out search complete"
        );
        Ok(aggregated)
    }

    async fn call(
        &self,
        backend: &dyn SearchBackend,
        query: &str,
        options: &SearchOptions,
    ) -> Result<BackendResponse, SearchError> {
        tokio::time::timeout(self.call_timeout, backend.search(query, options))
            .await
            .map_err(|_| SearchError::Timeout {
                backend: backend.name().to_string(),
                timeout: self.call_timeout,
            })?
    }
}
