mod common;

use std::sync::Arc;

use common::{aggregator, decision_json, queries_json, FakeBackend, ScriptedOracle};
use serde_json::json;
use truthseeker::attestation::{attest_report, DigestAttestor};
use truthseeker::decision::Verdict;
use truthseeker::evidence::{Side, VerifyError};
use truthseeker::oracle::{OracleError, OracleStage};
use truthseeker::orchestrator::{Verifier, VerifierConfig};
use truthseeker::progress::CollectingProgressSink;

/// Pro proposes three queries, con proposes four. Both sides and the judge
/// find the claim false.
fn sky_is_green_oracle() -> ScriptedOracle {
    ScriptedOracle::new(|ctx| match ctx.stage {
        OracleStage::Queries { side: Side::Pro, .. } => Ok(queries_json(&[
            "green sky phenomenon",
            "sky appears green weather",
            "sky color evidence",
        ])),
        OracleStage::Queries { side: Side::Con, .. } => Ok(queries_json(&[
            "why is the sky blue",
            "Rayleigh scattering",
            "sky color science",
            "green sky myth",
        ])),
        OracleStage::Decision { .. } => Ok(decision_json("false", 90)),
        OracleStage::Aggregate { pro, con } => {
            assert_eq!(pro.decision.verdict, Verdict::False);
            assert_eq!(con.decision.verdict, Verdict::False);
            Ok(json!({
                "decision": "false",
                "reason": "Both sides found the sky is blue due to Rayleigh scattering.",
                "confidence": 95,
                "supporting_evidence": [],
                "contradictory_evidence": ["Rayleigh scattering"],
                "key_evidence": ["Rayleigh scattering"],
                "information_gaps": [],
                "additional_queries": ["should be ignored"]
            }))
        }
    })
}

fn verifier(oracle: Arc<ScriptedOracle>, backends: &[Arc<FakeBackend>]) -> Verifier {
    Verifier::new(
        oracle,
        Arc::new(aggregator(backends)),
        VerifierConfig::default(),
    )
}

#[tokio::test]
async fn sky_is_green_is_false() {
    let oracle = Arc::new(sky_is_green_oracle());
    let backend = Arc::new(
        FakeBackend::new("alpha")
            .with_answer("The sky is blue.")
            .with_results(&[("Why is the sky blue?", "Rayleigh scattering.")]),
    );
    let verifier = verifier(oracle.clone(), &[backend.clone()]);
    let sink = CollectingProgressSink::new();

    let report = verifier.run("The sky is green", &sink).await.unwrap();

    assert_eq!(report.claim, "The sky is green");
    assert_eq!(report.pro.queries.len(), 3);
    assert_eq!(report.con.queries.len(), 4);
    assert_eq!(report.pro.rounds, 1);
    assert_eq!(report.decision.verdict, Verdict::False);
    assert!(report.decision.confidence >= 80.0);
    assert!(report.decision.additional_queries.is_none());
    assert_eq!(backend.calls(), 7);

    // Pro ran blind; con saw pro's findings.
    let queries = oracle.calls_for("queries");
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].side, Some(Side::Pro));
    assert!(queries[0].prior_information.is_none());
    assert_eq!(queries[1].side, Some(Side::Con));
    assert_eq!(
        queries[1].prior_information.as_deref(),
        Some(report.pro.information.as_str())
    );
    assert!(report.pro.information.contains("Rayleigh scattering."));

    let stages: Vec<&str> = oracle.calls().iter().map(|c| c.stage).collect();
    assert_eq!(
        stages,
        vec!["queries", "decision", "queries", "decision", "aggregate"]
    );

    let value = serde_json::to_value(&report.decision).unwrap();
    assert_eq!(value["decision"], "false");
}

#[tokio::test]
async fn progress_runs_pro_then_con_then_final() {
    let verifier = verifier(
        Arc::new(sky_is_green_oracle()),
        &[Arc::new(FakeBackend::new("alpha"))],
    );
    let sink = CollectingProgressSink::new();

    let decision = verifier.verify("The sky is green", &sink).await.unwrap();
    assert_eq!(decision.verdict, Verdict::False);

    let lines = sink.lines();
    let channel = |l: &String| l.split(']').next().unwrap_or_default().to_string();
    let first_con = lines.iter().position(|l| channel(l) == "[con").unwrap();
    let first_final = lines.iter().position(|l| channel(l) == "[final").unwrap();
    assert!(lines[..first_con].iter().all(|l| channel(l) == "[pro"));
    assert!(lines[first_con..first_final]
        .iter()
        .all(|l| channel(l) == "[con"));
    assert!(lines[first_final..].iter().all(|l| channel(l) == "[final"));

    assert_eq!(
        lines[first_final],
        "[final] Starting final aggregation for claim: \"The sky is green\""
    );
    assert_eq!(
        lines.last().map(String::as_str),
        Some("[final] Claim verification completed successfully")
    );
    assert!(lines.contains(&"[pro] pro decision completed: false (90%)".to_string()));
}

#[tokio::test]
async fn side_failure_skips_the_rest() {
    let oracle = Arc::new(ScriptedOracle::new(|ctx| match ctx.stage {
        OracleStage::Queries { side: Side::Pro, .. } => Ok(queries_json(&["q1"])),
        OracleStage::Queries { side: Side::Con, .. } => Ok(queries_json(&[])),
        OracleStage::Decision { .. } => Ok(decision_json("true", 60)),
        OracleStage::Aggregate { .. } => unreachable!("aggregate must not run"),
    }));
    let verifier = verifier(oracle.clone(), &[Arc::new(FakeBackend::new("alpha"))]);

    let err = verifier
        .run("claim", &CollectingProgressSink::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VerifyError::NoQueriesGenerated { side: Side::Con }
    ));
    assert!(oracle.calls_for("aggregate").is_empty());
}

#[tokio::test]
async fn malformed_aggregation_is_reported_by_stage() {
    let oracle = Arc::new(ScriptedOracle::new(|ctx| match ctx.stage {
        OracleStage::Queries { .. } => Ok(queries_json(&["q1"])),
        OracleStage::Decision { .. } => Ok(decision_json("inconclusive", 40)),
        OracleStage::Aggregate { .. } => Ok(json!({ "decision": "maybe" })),
    }));
    let verifier = verifier(oracle, &[Arc::new(FakeBackend::new("alpha"))]);

    let err = verifier
        .verify("claim", &CollectingProgressSink::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VerifyError::Oracle {
            stage: "aggregate",
            source: OracleError::Malformed(_)
        }
    ));
}

#[tokio::test]
async fn attestation_covers_the_serialized_report() {
    let verifier = verifier(
        Arc::new(sky_is_green_oracle()),
        &[Arc::new(FakeBackend::new("alpha"))],
    );
    let report = verifier
        .run("The sky is green", &CollectingProgressSink::new())
        .await
        .unwrap();
    let payload = serde_json::to_string(&report).unwrap();

    let attested = attest_report(&DigestAttestor::new(), report).await.unwrap();
    assert_eq!(attested.attestation.scheme, "blake3");
    assert_eq!(
        attested.attestation.digest,
        blake3::hash(payload.as_bytes()).to_hex().to_string()
    );

    let value = serde_json::to_value(&attested).unwrap();
    assert_eq!(value["result"]["decision"]["decision"], "false");
    assert!(value["attestation"]["issued_at"].is_string());
}
