#![forbid(unsafe_code)]

//! # truthseeker
//!
//! Adversarial claim verification.
//!
//! A claim is investigated twice: once by a "pro" side that assumes it is
//! true and once by a "con" side that assumes it is false. Each side asks an
//! oracle (an LLM) for search queries, runs them against every configured web
//! search backend at once, and lets the oracle decide, looping for more
//! evidence a bounded number of times. The con side sees the pro side's
//! findings. A neutral aggregation call then weighs both sides and produces
//! the final verdict.
//!
//! Verifications run synchronously through [`Verifier`] or in the background
//! through [`VerificationJobStore`], which exposes drain-once progress logs.

pub mod attestation;
pub mod config;
pub mod decision;
pub mod evidence;
pub mod gateway;
pub mod jobs;
pub mod oracle;
pub mod orchestrator;
pub mod progress;
pub mod prompts;
pub mod ratelimit;
pub mod search;

pub use attestation::{attest_report, Attestation, AttestedReport, Attestor, DigestAttestor};
pub use config::Config;
pub use decision::{Decision, Verdict};
pub use evidence::{EvidenceConfig, EvidenceLoop, Side, SideReport, VerifyError};
pub use gateway::{Attribution, ChatGateway, ProviderGateway};
pub use jobs::{JobError, JobPoll, JobState, VerificationJobStore};
pub use oracle::{LlmOracle, Oracle, OracleError, OracleStage, PromptContext};
pub use orchestrator::{VerificationReport, Verifier, VerifierConfig};
pub use progress::{Channel, ProgressSink, TracingProgressSink};
pub use ratelimit::RateLimiter;
pub use search::{
    AggregatedResponse, BackendResponse, SearchAggregator, SearchBackend, SearchError,
    SearchOptions, SearchResult,
};
