//! One side's evidence loop: generate queries, gather, decide, maybe gather
//! more, bounded.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::decision::{parse_queries, Decision};
use crate::oracle::{Oracle, OracleError, OracleStage, PromptContext};
use crate::progress::{Channel, ProgressSink};
use crate::search::{
    AggregatedResponse, BackendOutcome, SearchAggregator, SearchError, SearchOptions,
};

/// Most characters of one result's body carried into the evidence text.
const MAX_RESULT_CHARS: usize = 500;

pub const NO_RESULTS: &str = "NO RESULTS FOUND";
pub const SEARCH_ERROR: &str = "ERROR DURING SEARCH";

// =============================================================================
// Types
// =============================================================================

/// Which way a side leans while gathering evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Assumes the claim is true.
    Pro,
    /// Assumes the claim is false.
    Con,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Pro => "pro",
            Side::Con => "con",
        }
    }

    /// The truth value this side assumes while gathering.
    pub fn assumption(&self) -> &'static str {
        match self {
            Side::Pro => "true",
            Side::Con => "false",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Pro => Side::Con,
            Side::Con => Side::Pro,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one side gathered, in the order queries were generated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceBundle {
    information: String,
    queries: Vec<String>,
}

impl EvidenceBundle {
    /// Append one round of `(query, result text)` pairs. Text only ever
    /// grows; later rounds follow the earlier ones after a blank separator.
    pub fn append_round(&mut self, blocks: Vec<(String, String)>) {
        if blocks.is_empty() {
            return;
        }
        if !self.queries.is_empty() {
            self.information.push('\n');
        }
        let rendered: Vec<String> = blocks
            .iter()
            .map(|(query, text)| format!("## Query\n{query}\n## Result\n{text}\n\n"))
            .collect();
        self.information.push_str(&rendered.join("\n"));
        self.queries.extend(blocks.into_iter().map(|(query, _)| query));
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }
}

/// What one side hands on: its evidence and its decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideReport {
    pub side: Side,
    pub information: String,
    pub queries: Vec<String>,
    pub decision: Decision,
    /// Decision calls made, 1 up to the configured maximum.
    pub rounds: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("no queries generated for the {side} side")]
    NoQueriesGenerated { side: Side },

    #[error("oracle failed during {stage}: {source}")]
    Oracle {
        stage: &'static str,
        #[source]
        source: OracleError,
    },

    #[error(transparent)]
    Search(#[from] SearchError),
}

#[derive(Debug, Clone)]
pub struct EvidenceConfig {
    /// Cap on decision calls per side.
    pub max_decision_rounds: u32,
    /// Deadline for each oracle call.
    pub oracle_timeout: Duration,
    pub search: SearchOptions,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            max_decision_rounds: 5,
            oracle_timeout: Duration::from_secs(180),
            search: SearchOptions::default(),
        }
    }
}

// =============================================================================
// Oracle calls
// =============================================================================

/// Call the oracle under a deadline, tagging failures with the stage.
pub(crate) async fn ask_oracle(
    oracle: &dyn Oracle,
    timeout: Duration,
    ctx: &PromptContext<'_>,
) -> Result<Value, VerifyError> {
    let stage = ctx.stage.name();
    tokio::time::timeout(timeout, oracle.generate(ctx))
        .await
        .unwrap_or(Err(OracleError::Timeout(timeout)))
        .map_err(|source| VerifyError::Oracle { stage, source })
}

// =============================================================================
// The loop
// =============================================================================

enum Step {
    Gather(Vec<String>),
    Decide,
    Done(Decision),
}

pub struct EvidenceLoop {
    oracle: Arc<dyn Oracle>,
    search: Arc<SearchAggregator>,
    config: EvidenceConfig,
}

impl EvidenceLoop {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        search: Arc<SearchAggregator>,
        config: EvidenceConfig,
    ) -> Self {
        Self {
            oracle,
            search,
            config,
        }
    }

    pub fn config(&self) -> &EvidenceConfig {
        &self.config
    }

    /// Run one side to a decision. `prior` is the other side's report when
    /// this side runs second.
    pub async fn run(
        &self,
        claim: &str,
        side: Side,
        prior: Option<&SideReport>,
        sink: &dyn ProgressSink,
    ) -> Result<SideReport, VerifyError> {
        let channel = Channel::from(side);
        let max_rounds = self.config.max_decision_rounds.max(1);

        let queries = self.generate_queries(claim, side, prior, sink).await?;
        sink.log(
            channel,
            &format!("Generated {side} queries: {}", queries.join(", ")),
        );
        sink.log(
            channel,
            &format!(
                "Available search providers: {}",
                non_empty_or_none(&self.search.available_backends())
            ),
        );

        let mut bundle = EvidenceBundle::default();
        let mut rounds = 0u32;
        let mut step = Step::Gather(queries);

        let decision = loop {
            step = match step {
                Step::Gather(queries) => {
                    sink.log(channel, "Searching for information...");
                    let blocks = self.gather(side, &queries, sink).await?;
                    bundle.append_round(blocks);
                    sink.log(channel, &format!("Completed {side} searches"));
                    Step::Decide
                }
                Step::Decide => {
                    if rounds == 0 {
                        sink.log(channel, &format!("Starting {side} decision making"));
                    }
                    let decision = self.decide(claim, side, prior, &bundle, sink).await?;
                    rounds += 1;
                    debug!(
                        side = side.as_str(),
                        round = rounds,
                        verdict = decision.verdict.as_str(),
                        confidence = decision.confidence,
                        "side decision"
                    );

                    match decision.requested_queries().map(<[String]>::to_vec) {
                        Some(more) if rounds < max_rounds => {
                            sink.log(
                                channel,
                                &format!(
                                    "{side} side asked for additional queries: {}",
                                    more.join(", ")
                                ),
                            );
                            Step::Gather(more)
                        }
                        Some(_) => {
                            warn!(
                                side = side.as_str(),
                                rounds, "decision round cap reached, keeping last decision"
                            );
                            Step::Done(decision)
                        }
                        None => Step::Done(decision),
                    }
                }
                Step::Done(decision) => break decision,
            };
        };

        sink.log(
            channel,
            &format!(
                "{side} decision completed: {} ({:.0}%)",
                decision.verdict, decision.confidence
            ),
        );
        info!(
            side = side.as_str(),
            rounds,
            verdict = decision.verdict.as_str(),
            "side finished"
        );

        let EvidenceBundle {
            information,
            queries,
        } = bundle;
        Ok(SideReport {
            side,
            information,
            queries,
            decision,
            rounds,
        })
    }

    async fn generate_queries(
        &self,
        claim: &str,
        side: Side,
        prior: Option<&SideReport>,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<String>, VerifyError> {
        let ctx = PromptContext {
            claim,
            stage: OracleStage::Queries { side, prior },
            job_id: sink.job_id(),
        };
        let raw = ask_oracle(self.oracle.as_ref(), self.config.oracle_timeout, &ctx).await?;
        let queries = parse_queries(raw).map_err(|source| VerifyError::Oracle {
            stage: ctx.stage.name(),
            source,
        })?;
        if queries.is_empty() {
            return Err(VerifyError::NoQueriesGenerated { side });
        }
        Ok(queries)
    }

    async fn decide(
        &self,
        claim: &str,
        side: Side,
        prior: Option<&SideReport>,
        bundle: &EvidenceBundle,
        sink: &dyn ProgressSink,
    ) -> Result<Decision, VerifyError> {
        let ctx = PromptContext {
            claim,
            stage: OracleStage::Decision {
                side,
                prior,
                queries: bundle.queries(),
                evidence: bundle.information(),
            },
            job_id: sink.job_id(),
        };
        let raw = ask_oracle(self.oracle.as_ref(), self.config.oracle_timeout, &ctx).await?;
        Decision::from_value(raw).map_err(|source| VerifyError::Oracle {
            stage: ctx.stage.name(),
            source,
        })
    }

    /// Search every query of one round concurrently. Blocks come back in
    /// query order regardless of which search finished first.
    async fn gather(
        &self,
        side: Side,
        queries: &[String],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<(String, String)>, VerifyError> {
        let channel = Channel::from(side);
        let options = &self.config.search;

        let searches = queries.iter().map(|query| async move {
            sink.log(channel, &format!("Executing {side} query: \"{query}\""));
            let outcome = self.search.search(query, options).await;
            match &outcome {
                Ok(response) => {
                    for (backend, outcome) in &response.per_backend {
                        if let BackendOutcome::Failed { error } = outcome {
                            sink.log(
                                channel,
                                &format!(
                                    "Search provider {backend} failed for \"{query}\": {error}"
                                ),
                            );
                        }
                    }
                    sink.log(
                        channel,
                        &format!(
                            "Search completed for \"{query}\" using provider(s): {}",
                            non_empty_or_none(&response.used_backends)
                        ),
                    );
                    if response.combined_results.is_empty() {
                        sink.log(channel, &format!("No relevant results found for \"{query}\""));
                    }
                }
                Err(e) => {
                    sink.log(channel, &format!("Error during search for \"{query}\": {e}"));
                }
            }
            outcome
        });
        let outcomes = join_all(searches).await;

        let mut blocks = Vec::with_capacity(queries.len());
        for (query, outcome) in queries.iter().zip(outcomes) {
            let text = match outcome {
                Ok(response) => render_results(&response),
                Err(e) if e.is_fatal() => return Err(VerifyError::Search(e)),
                Err(e) => {
                    warn!(side = side.as_str(), query = %query, error = %e, "search failed");
                    SEARCH_ERROR.to_string()
                }
            };
            blocks.push((query.clone(), text));
        }
        Ok(blocks)
    }
}

/// Text for one query's results: backend answers first, then every combined
/// result with its body cut to [`MAX_RESULT_CHARS`].
pub fn render_results(response: &AggregatedResponse) -> String {
    let mut text = String::new();
    for (backend, answer) in response.answers() {
        text.push_str(&format!("##### Result from {backend} #####\n{answer}\n"));
    }

    let results: Vec<String> = response
        .combined_results
        .iter()
        .map(|r| {
            let body: String = r.content.chars().take(MAX_RESULT_CHARS).collect();
            format!(
                "##### Result from {} | Title: {} #####\n{body}...",
                r.source, r.title
            )
        })
        .collect();
    text.push_str(&results.join("\n"));

    if text.is_empty() {
        NO_RESULTS.to_string()
    } else {
        text
    }
}

fn non_empty_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
