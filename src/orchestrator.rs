//! The two sides, then the judge.
//!
//! The pro side runs first with no context. The con side runs second and sees
//! the pro side's report. One aggregation call then reconciles both. Stages
//! never overlap.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::decision::Decision;
use crate::evidence::{ask_oracle, EvidenceConfig, EvidenceLoop, Side, SideReport, VerifyError};
use crate::oracle::{Oracle, OracleStage, PromptContext};
use crate::progress::{Channel, ProgressSink};
use crate::search::SearchAggregator;

#[derive(Debug, Clone, Default)]
pub struct VerifierConfig {
    pub evidence: EvidenceConfig,
}

impl VerifierConfig {
    pub fn oracle_timeout(&self) -> Duration {
        self.evidence.oracle_timeout
    }
}

/// Full transcript of one verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub claim: String,
    pub pro: SideReport,
    pub con: SideReport,
    pub decision: Decision,
}

pub struct Verifier {
    oracle: Arc<dyn Oracle>,
    search: Arc<SearchAggregator>,
    sides: EvidenceLoop,
    config: VerifierConfig,
}

impl Verifier {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        search: Arc<SearchAggregator>,
        config: VerifierConfig,
    ) -> Self {
        let sides = EvidenceLoop::new(oracle.clone(), search.clone(), config.evidence.clone());
        Self {
            oracle,
            search,
            sides,
            config,
        }
    }

    pub fn search(&self) -> &SearchAggregator {
        &self.search
    }

    pub async fn run(
        &self,
        claim: &str,
        sink: &dyn ProgressSink,
    ) -> Result<VerificationReport, VerifyError> {
        info!(job_id = ?sink.job_id(), claim, "verification started");

        let pro = self.sides.run(claim, Side::Pro, None, sink).await?;
        let con = self.sides.run(claim, Side::Con, Some(&pro), sink).await?;
        let decision = self.aggregate(claim, &pro, &con, sink).await?;

        info!(
            job_id = ?sink.job_id(),
            verdict = decision.verdict.as_str(),
            confidence = decision.confidence,
            "verification finished"
        );
        Ok(VerificationReport {
            claim: claim.to_string(),
            pro,
            con,
            decision,
        })
    }

    /// Like [`Verifier::run`], keeping only the final decision.
    pub async fn verify(
        &self,
        claim: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Decision, VerifyError> {
        Ok(self.run(claim, sink).await?.decision)
    }

    async fn aggregate(
        &self,
        claim: &str,
        pro: &SideReport,
        con: &SideReport,
        sink: &dyn ProgressSink,
    ) -> Result<Decision, VerifyError> {
        sink.log(
            Channel::Final,
            &format!("Starting final aggregation for claim: \"{claim}\""),
        );

        let ctx = PromptContext {
            claim,
            stage: OracleStage::Aggregate { pro, con },
            job_id: sink.job_id(),
        };
        sink.log(Channel::Final, "Processing side decisions and evidence...");
        let raw = ask_oracle(self.oracle.as_ref(), self.config.oracle_timeout(), &ctx).await?;

        let mut decision =
            Decision::from_value(raw).map_err(|source| VerifyError::Oracle {
                stage: ctx.stage.name(),
                source,
            })?;
        // The judge has no follow-up round.
        decision.additional_queries = None;

        sink.log(Channel::Final, "Claim verification completed successfully");
        Ok(decision)
    }
}
