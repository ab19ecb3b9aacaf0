mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{aggregator, decision_json, queries_json, FakeBackend, ScriptedOracle};
use serde_json::json;
use truthseeker::decision::Verdict;
use truthseeker::jobs::{JobError, JobPoll, JobState, VerificationJobStore};
use truthseeker::oracle::OracleStage;
use truthseeker::orchestrator::{Verifier, VerifierConfig};
use uuid::Uuid;

const GRACE: Duration = Duration::from_secs(5);

fn store_with(oracle: ScriptedOracle) -> VerificationJobStore {
    let verifier = Verifier::new(
        Arc::new(oracle),
        Arc::new(aggregator(&[Arc::new(FakeBackend::new("alpha"))])),
        VerifierConfig::default(),
    );
    VerificationJobStore::new(Arc::new(verifier), GRACE)
}

fn happy_oracle() -> ScriptedOracle {
    ScriptedOracle::new(|ctx| match ctx.stage {
        OracleStage::Queries { .. } => Ok(queries_json(&["q1", "q2", "q3"])),
        _ => Ok(decision_json("false", 85)),
    })
}

fn failing_aggregation_oracle() -> ScriptedOracle {
    ScriptedOracle::new(|ctx| match ctx.stage {
        OracleStage::Queries { .. } => Ok(queries_json(&["q1"])),
        OracleStage::Decision { .. } => Ok(decision_json("false", 85)),
        OracleStage::Aggregate { .. } => Ok(json!({ "nonsense": true })),
    })
}

/// Poll until the job reaches a terminal state, collecting every line.
async fn poll_to_completion(store: &VerificationJobStore, id: Uuid) -> (JobPoll, Vec<String>) {
    let mut lines = Vec::new();
    for _ in 0..1000 {
        let poll = store.poll(id).unwrap();
        lines.extend(poll.logs.iter().cloned());
        if poll.completed {
            return (poll, lines);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never completed");
}

#[tokio::test(start_paused = true)]
async fn submitted_job_runs_to_completion_and_logs_drain_once() {
    let store = store_with(happy_oracle());
    let id = store.submit("The sky is green");

    let (last, lines) = poll_to_completion(&store, id).await;
    assert_eq!(last.state, JobState::Completed);
    let decision = last.result.expect("completed job has a result");
    assert_eq!(decision.verdict, Verdict::False);

    assert!(lines.first().unwrap().starts_with("[pro] Generated pro queries:"));
    assert_eq!(
        lines.last().map(String::as_str),
        Some("[final] Claim verification completed successfully")
    );
    // Every line was handed out exactly once.
    let generated = lines
        .iter()
        .filter(|l| l.starts_with("[pro] Generated"))
        .count();
    assert_eq!(generated, 1);

    let again = store.poll(id).unwrap();
    assert!(again.completed);
    assert!(again.logs.is_empty());
    assert!(again.result.is_some());

    let snapshot = store.get(id).unwrap();
    assert_eq!(snapshot.claim, "The sky is green");
    assert!(snapshot.last_updated_at >= snapshot.created_at);
}

#[tokio::test(start_paused = true)]
async fn failed_aggregation_marks_job_failed_then_expires() {
    let store = store_with(failing_aggregation_oracle());
    let id = store.submit("The sky is green");

    let (last, lines) = poll_to_completion(&store, id).await;
    assert!(last.completed);
    assert_eq!(last.state, JobState::Failed);
    assert!(last.result.is_none());
    assert!(
        lines.last().unwrap().starts_with("[final] Error: "),
        "{lines:?}"
    );

    let value = serde_json::to_value(&last).unwrap();
    assert!(value["result"].is_null());
    assert_eq!(value["completed"], true);

    tokio::time::sleep(GRACE + Duration::from_secs(1)).await;
    assert!(matches!(store.poll(id), Err(JobError::JobNotFound(x)) if x == id));
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn job_is_readable_throughout_grace_period() {
    let store = store_with(happy_oracle());
    let id = store.submit("claim");
    poll_to_completion(&store, id).await;

    tokio::time::sleep(GRACE - Duration::from_secs(1)).await;
    assert!(store.poll(id).unwrap().completed);
}

#[tokio::test(start_paused = true)]
async fn reaper_purges_expired_jobs() {
    let store = store_with(failing_aggregation_oracle());
    let reaper = store.spawn_reaper(Duration::from_secs(1));

    let id = store.submit("claim");
    poll_to_completion(&store, id).await;
    tokio::time::sleep(GRACE + Duration::from_secs(2)).await;

    // Nothing left for a manual sweep: the reaper already took it.
    assert_eq!(store.purge_expired(), 0);
    assert!(matches!(store.get(id), Err(JobError::JobNotFound(_))));

    drop(store);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(reaper.is_finished());
}

#[tokio::test(start_paused = true)]
async fn create_then_start_separately() {
    let store = store_with(happy_oracle());
    let id = store.create("claim");
    assert_eq!(store.poll(id).unwrap().state, JobState::Pending);

    let handle = store.start(id).unwrap();
    assert!(matches!(
        store.start(id),
        Err(JobError::InvalidState { .. })
    ));
    handle.await.unwrap();
    assert_eq!(store.poll(id).unwrap().state, JobState::Completed);
}

#[tokio::test(start_paused = true)]
async fn jobs_are_independent() {
    let store = store_with(happy_oracle());
    let a = store.submit("claim a");
    let b = store.submit("claim b");
    assert_ne!(a, b);

    let (poll_a, lines_a) = poll_to_completion(&store, a).await;
    let (poll_b, lines_b) = poll_to_completion(&store, b).await;
    assert_eq!(poll_a.state, JobState::Completed);
    assert_eq!(poll_b.state, JobState::Completed);
    assert!(lines_a.iter().any(|l| l.contains("\"claim a\"")));
    assert!(lines_b.iter().any(|l| l.contains("\"claim b\"")));
    assert!(!lines_a.iter().any(|l| l.contains("\"claim b\"")));
}
