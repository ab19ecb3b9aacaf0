//! Environment-driven configuration.

use std::time::Duration;

use crate::evidence::EvidenceConfig;
use crate::jobs::DEFAULT_GRACE;
use crate::oracle::DEFAULT_MODEL;
use crate::orchestrator::VerifierConfig;
use crate::search::aggregator::DEFAULT_CALL_TIMEOUT;
use crate::search::SearchOptions;

#[derive(Debug, Clone)]
pub struct Config {
    /// OpenRouter model id used for every oracle stage.
    pub model: String,
    pub verifier: VerifierConfig,
    /// Deadline for each backend call in a fan-out.
    pub search_timeout: Duration,
    /// How long finished jobs stay pollable.
    pub job_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            verifier: VerifierConfig::default(),
            search_timeout: DEFAULT_CALL_TIMEOUT,
            job_grace: DEFAULT_GRACE,
        }
    }
}

impl Config {
    /// Read `TRUTHSEEKER_*` variables; anything unset or unparsable keeps its
    /// default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let evidence = &defaults.verifier.evidence;

        let search = SearchOptions {
            max_results: env_parse("TRUTHSEEKER_MAX_RESULTS")
                .unwrap_or(evidence.search.max_results),
            recency_days: env_parse("TRUTHSEEKER_RECENCY_DAYS")
                .unwrap_or(evidence.search.recency_days),
            ..evidence.search.clone()
        };

        Self {
            model: std::env::var("TRUTHSEEKER_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.model),
            verifier: VerifierConfig {
                evidence: EvidenceConfig {
                    max_decision_rounds: env_parse("TRUTHSEEKER_MAX_DECISION_ROUNDS")
                        .filter(|n: &u32| *n > 0)
                        .unwrap_or(evidence.max_decision_rounds),
                    oracle_timeout: env_secs("TRUTHSEEKER_ORACLE_TIMEOUT_SECONDS")
                        .unwrap_or(evidence.oracle_timeout),
                    search,
                },
            },
            search_timeout: env_secs("TRUTHSEEKER_SEARCH_TIMEOUT_SECONDS")
                .unwrap_or(defaults.search_timeout),
            job_grace: env_secs("TRUTHSEEKER_JOB_GRACE_SECONDS").unwrap_or(defaults.job_grace),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(var: &str) -> Option<Duration> {
    env_parse(var).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = Config::default();
        assert_eq!(c.model, "openai/gpt-5-mini");
        assert_eq!(c.verifier.evidence.max_decision_rounds, 5);
        assert_eq!(c.verifier.evidence.oracle_timeout, Duration::from_secs(180));
        assert_eq!(c.search_timeout, Duration::from_secs(30));
        assert_eq!(c.job_grace, Duration::from_secs(5));
        assert_eq!(c.verifier.evidence.search.max_results, 3);
    }
}
