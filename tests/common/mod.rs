#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use truthseeker::evidence::Side;
use truthseeker::oracle::{Oracle, OracleError, OracleStage, PromptContext};
use truthseeker::search::{
    BackendResponse, SearchAggregator, SearchBackend, SearchError, SearchOptions, SearchResult,
};

// =============================================================================
// Scripted oracle
// =============================================================================

/// One oracle call as the scripted oracle saw it.
#[derive(Debug, Clone)]
pub struct OracleCall {
    pub stage: &'static str,
    pub side: Option<Side>,
    /// Information of the prior side's report, when one was passed.
    pub prior_information: Option<String>,
    pub queries: Vec<String>,
    pub evidence: String,
}

type Handler = dyn Fn(&PromptContext<'_>) -> Result<Value, OracleError> + Send + Sync;

pub struct ScriptedOracle {
    handler: Box<Handler>,
    delay: Duration,
    calls: Mutex<Vec<OracleCall>>,
}

impl ScriptedOracle {
    pub fn new(
        handler: impl Fn(&PromptContext<'_>) -> Result<Value, OracleError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<OracleCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, stage: &str) -> Vec<OracleCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.stage == stage)
            .collect()
    }
}

#[async_trait::async_trait]
impl Oracle for ScriptedOracle {
    async fn generate(&self, ctx: &PromptContext<'_>) -> Result<Value, OracleError> {
        let call = match ctx.stage {
            OracleStage::Queries { side, prior } => OracleCall {
                stage: "queries",
                side: Some(side),
                prior_information: prior.map(|p| p.information.clone()),
                queries: Vec::new(),
                evidence: String::new(),
            },
            OracleStage::Decision {
                side,
                prior,
                queries,
                evidence,
            } => OracleCall {
                stage: "decision",
                side: Some(side),
                prior_information: prior.map(|p| p.information.clone()),
                queries: queries.to_vec(),
                evidence: evidence.to_string(),
            },
            OracleStage::Aggregate { .. } => OracleCall {
                stage: "aggregate",
                side: None,
                prior_information: None,
                queries: Vec::new(),
                evidence: String::new(),
            },
        };
        self.calls.lock().unwrap().push(call);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.handler)(ctx)
    }
}

pub fn decision_json(verdict: &str, confidence: u32) -> Value {
    json!({
        "decision": verdict,
        "reason": format!("Ok so based on all the information available... {verdict}"),
        "confidence": confidence,
        "key_evidence": ["Rayleigh scattering makes the sky appear blue"]
    })
}

pub fn queries_json(queries: &[&str]) -> Value {
    json!({ "queries": queries })
}

// =============================================================================
// Fake backend
// =============================================================================

pub struct FakeBackend {
    name: String,
    available: bool,
    failing: bool,
    answer: Option<String>,
    results: Vec<(String, String)>,
    delay: Duration,
    query_delays: HashMap<String, Duration>,
    calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            available: true,
            failing: false,
            answer: None,
            results: vec![(
                format!("{name} result"),
                format!("content from {name}"),
            )],
            delay: Duration::ZERO,
            query_delays: HashMap::new(),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn with_answer(mut self, answer: &str) -> Self {
        self.answer = Some(answer.to_string());
        self
    }

    pub fn with_results(mut self, results: &[(&str, &str)]) -> Self {
        self.results = results
            .iter()
            .map(|(t, c)| (t.to_string(), c.to_string()))
            .collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_query_delay(mut self, query: &str, delay: Duration) -> Self {
        self.query_delays.insert(query.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SearchBackend for FakeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn search(
        &self,
        query: &str,
        _options: &SearchOptions,
    ) -> Result<BackendResponse, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());

        let delay = self.query_delays.get(query).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(SearchError::BackendRequestFailed {
                backend: self.name.clone(),
                status: 500,
                message: "upstream exploded".into(),
            });
        }

        let results = self
            .results
            .iter()
            .enumerate()
            .map(|(i, (title, content))| {
                SearchResult::from_backend(
                    self,
                    title.clone(),
                    format!("https://{}.example/{i}", self.name),
                    content.clone(),
                    Some(0.9),
                )
            })
            .collect();
        Ok(BackendResponse {
            results,
            answer: self.answer.clone(),
        })
    }
}

/// Aggregator over the given fakes, in order.
pub fn aggregator(backends: &[Arc<FakeBackend>]) -> SearchAggregator {
    aggregator_with_timeout(backends, Duration::from_secs(30))
}

pub fn aggregator_with_timeout(
    backends: &[Arc<FakeBackend>],
    timeout: Duration,
) -> SearchAggregator {
    let mut aggregator = SearchAggregator::new(timeout);
    for backend in backends {
        aggregator
            .register(backend.clone())
            .expect("unique backend names");
    }
    aggregator
}
