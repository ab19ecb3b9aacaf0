//! Asynchronous verification jobs.
//!
//! A job is created pending, started onto the tokio runtime, polled for
//! progress while it runs, and removed a grace period after it reaches a
//! terminal state. Polls drain the log: each line is returned exactly once.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::decision::Decision;
use crate::evidence::VerifyError;
use crate::orchestrator::Verifier;
use crate::progress::{format_line, Channel, ProgressSink};

pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationJob {
    pub id: Uuid,
    pub claim: String,
    pub state: JobState,
    /// Lines not yet handed out by a poll.
    pub logs: Vec<String>,
    pub result: Option<Decision>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl VerificationJob {
    fn new(claim: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            claim,
            state: JobState::Pending,
            logs: Vec::new(),
            result: None,
            created_at: now,
            last_updated_at: now,
        }
    }

    fn push_log(&mut self, line: String) {
        self.logs.push(line);
        self.last_updated_at = Utc::now();
    }
}

/// What a poll returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPoll {
    /// True once the job completed or failed.
    pub completed: bool,
    pub state: JobState,
    /// Lines appended since the previous poll.
    pub logs: Vec<String>,
    pub result: Option<Decision>,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("verification job {0} not found")]
    JobNotFound(Uuid),
    #[error("verification job {id} is {state}, expected pending")]
    InvalidState { id: Uuid, state: JobState },
}

// =============================================================================
// Store
// =============================================================================

#[derive(Default)]
struct Registry {
    jobs: HashMap<Uuid, VerificationJob>,
    expirations: BinaryHeap<Reverse<(Instant, Uuid)>>,
}

impl Registry {
    fn purge_expired(&mut self, now: Instant) -> usize {
        let mut purged = 0;
        while let Some(Reverse((at, id))) = self.expirations.peek().copied() {
            if at > now {
                break;
            }
            self.expirations.pop();
            if self.jobs.remove(&id).is_some() {
                debug!(job_id = %id, "purged verification job");
                purged += 1;
            }
        }
        purged
    }
}

struct Shared {
    registry: Mutex<Registry>,
    verifier: Arc<Verifier>,
    grace: Duration,
}

impl Shared {
    /// Lock the registry, dropping jobs whose grace period has passed.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        registry.purge_expired(Instant::now());
        registry
    }

    fn finish(&self, id: Uuid, outcome: Result<Decision, String>) {
        let mut registry = self.lock();
        let Some(job) = registry.jobs.get_mut(&id) else {
            return;
        };
        match outcome {
            Ok(decision) => {
                info!(job_id = %id, verdict = decision.verdict.as_str(), "verification job completed");
                job.result = Some(decision);
                job.state = JobState::Completed;
                job.last_updated_at = Utc::now();
            }
            Err(error) => {
                warn!(job_id = %id, error = %error, "verification job failed");
                job.result = None;
                job.state = JobState::Failed;
                job.push_log(format_line(Channel::Final, &format!("Error: {error}")));
            }
        }
        let expires_at = Instant::now() + self.grace;
        registry.expirations.push(Reverse((expires_at, id)));
    }
}

/// Registry of verification jobs. Cheap to clone; clones share the table.
#[derive(Clone)]
pub struct VerificationJobStore {
    shared: Arc<Shared>,
}

impl VerificationJobStore {
    pub fn new(verifier: Arc<Verifier>, grace: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                verifier,
                grace,
            }),
        }
    }

    pub fn grace(&self) -> Duration {
        self.shared.grace
    }

    pub fn create(&self, claim: impl Into<String>) -> Uuid {
        let job = VerificationJob::new(claim.into());
        let id = job.id;
        self.shared.lock().jobs.insert(id, job);
        debug!(job_id = %id, "created verification job");
        id
    }

    /// Move a pending job to running and execute it in the background.
    pub fn start(&self, id: Uuid) -> Result<JoinHandle<()>, JobError> {
        let claim = {
            let mut registry = self.shared.lock();
            let job = registry.jobs.get_mut(&id).ok_or(JobError::JobNotFound(id))?;
            if job.state != JobState::Pending {
                return Err(JobError::InvalidState {
                    id,
                    state: job.state,
                });
            }
            job.state = JobState::Running;
            job.last_updated_at = Utc::now();
            job.claim.clone()
        };

        let shared = self.shared.clone();
        Ok(tokio::spawn(async move {
            let sink = JobProgressSink {
                shared: Arc::downgrade(&shared),
                id,
            };
            let run = AssertUnwindSafe(shared.verifier.verify(&claim, &sink)).catch_unwind();
            let outcome = match run.await {
                Ok(result) => result.map_err(|e: VerifyError| e.to_string()),
                Err(_) => Err("verification task panicked".to_string()),
            };
            shared.finish(id, outcome);
        }))
    }

    /// Create and start in one step.
    pub fn submit(&self, claim: impl Into<String>) -> Uuid {
        let id = self.create(claim);
        // Freshly created, so it is pending and present.
        if let Err(e) = self.start(id) {
            warn!(job_id = %id, error = %e, "could not start fresh job");
        }
        id
    }

    /// State, result and the log lines added since the previous poll.
    pub fn poll(&self, id: Uuid) -> Result<JobPoll, JobError> {
        let mut registry = self.shared.lock();
        let job = registry.jobs.get_mut(&id).ok_or(JobError::JobNotFound(id))?;
        Ok(JobPoll {
            completed: job.state.is_terminal(),
            state: job.state,
            logs: std::mem::take(&mut job.logs),
            result: job.result.clone(),
        })
    }

    /// Snapshot of a job without draining its log.
    pub fn get(&self, id: Uuid) -> Result<VerificationJob, JobError> {
        self.shared
            .lock()
            .jobs
            .get(&id)
            .cloned()
            .ok_or(JobError::JobNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.shared.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove jobs whose grace period has passed. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        self.shared
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .purge_expired(Instant::now())
    }

    /// Purge periodically in the background. The task ends once every
    /// handle to the store is dropped.
    pub fn spawn_reaper(&self, period: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let purged = shared
                    .registry
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .purge_expired(Instant::now());
                if purged > 0 {
                    debug!(purged, "reaper purged expired jobs");
                }
            }
        })
    }

    /// A sink writing into job `id`. Lines for unknown jobs are dropped.
    pub fn sink(&self, id: Uuid) -> JobProgressSink {
        JobProgressSink {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }
}

/// Appends progress lines to one job's log.
pub struct JobProgressSink {
    shared: Weak<Shared>,
    id: Uuid,
}

impl ProgressSink for JobProgressSink {
    fn log(&self, channel: Channel, message: &str) {
        debug!(job_id = %self.id, channel = channel.as_str(), "{message}");
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut registry = shared.lock();
        if let Some(job) = registry.jobs.get_mut(&self.id) {
            job.push_log(format_line(channel, message));
        }
    }

    fn job_id(&self) -> Option<Uuid> {
        Some(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{Oracle, OracleError, PromptContext};
    use crate::orchestrator::VerifierConfig;
    use crate::search::SearchAggregator;
    use serde_json::Value;

    struct SilentOracle;

    #[async_trait::async_trait]
    impl Oracle for SilentOracle {
        async fn generate(&self, _ctx: &PromptContext<'_>) -> Result<Value, OracleError> {
            Err(OracleError::malformed("unused"))
        }
    }

    fn store(grace: Duration) -> VerificationJobStore {
        let verifier = Verifier::new(
            Arc::new(SilentOracle),
            Arc::new(SearchAggregator::default()),
            VerifierConfig::default(),
        );
        VerificationJobStore::new(Arc::new(verifier), grace)
    }

    #[test]
    fn created_job_is_pending_with_empty_logs() {
        let store = store(DEFAULT_GRACE);
        let id = store.create("The sky is green");
        let poll = store.poll(id).unwrap();
        assert!(!poll.completed);
        assert_eq!(poll.state, JobState::Pending);
        assert!(poll.logs.is_empty());
        assert!(poll.result.is_none());
    }

    #[test]
    fn poll_drains_logs() {
        let store = store(DEFAULT_GRACE);
        let id = store.create("claim");
        let sink = store.sink(id);
        sink.log(Channel::Pro, "a");
        sink.log(Channel::Con, "b");

        assert_eq!(store.poll(id).unwrap().logs, vec!["[pro] a", "[con] b"]);
        assert!(store.poll(id).unwrap().logs.is_empty());

        sink.log(Channel::Final, "c");
        assert_eq!(store.poll(id).unwrap().logs, vec!["[final] c"]);
    }

    #[test]
    fn unknown_job_is_not_found() {
        let store = store(DEFAULT_GRACE);
        let id = Uuid::new_v4();
        assert!(matches!(store.poll(id), Err(JobError::JobNotFound(x)) if x == id));
        assert!(matches!(store.start(id), Err(JobError::JobNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn finished_jobs_expire_after_grace() {
        let store = store(Duration::from_secs(5));
        let id = store.create("claim");
        store.shared.finish(id, Err("boom".into()));

        let poll = store.poll(id).unwrap();
        assert!(poll.completed);
        assert_eq!(poll.state, JobState::Failed);
        assert_eq!(poll.logs, vec!["[final] Error: boom"]);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.purge_expired(), 0);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.purge_expired(), 1);
        assert!(matches!(store.poll(id), Err(JobError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn start_twice_is_invalid() {
        let store = store(DEFAULT_GRACE);
        let id = store.create("claim");
        let handle = store.start(id).unwrap();
        match store.start(id) {
            Err(JobError::InvalidState { state, .. }) => assert!(state != JobState::Pending),
            other => panic!("expected InvalidState, got {other:?}"),
        }
        handle.await.unwrap();
        let poll = store.poll(id).unwrap();
        assert_eq!(poll.state, JobState::Failed);
        assert!(poll.logs.iter().any(|l| l.starts_with("[final] Error:")));
    }
}
