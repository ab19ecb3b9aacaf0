//! The reasoning capability the pipeline consumes.
//!
//! The core never talks to a model directly. It hands an [`Oracle`] a
//! [`PromptContext`] and gets back a JSON object, which it validates itself
//! (see [`crate::decision`]). [`LlmOracle`] is the production implementation
//! over a [`ChatGateway`].

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::evidence::{Side, SideReport};
use crate::gateway::{Attribution, ChatGateway, ChatModel, ChatRequest, ProviderError};
use crate::prompts;

/// What the oracle is being asked to do, with the context each stage needs.
#[derive(Debug, Clone, Copy)]
pub enum OracleStage<'a> {
    /// Produce `{"queries": [...]}` for one side.
    Queries {
        side: Side,
        prior: Option<&'a SideReport>,
    },
    /// Produce a decision for one side from the evidence gathered so far.
    Decision {
        side: Side,
        prior: Option<&'a SideReport>,
        queries: &'a [String],
        evidence: &'a str,
    },
    /// Reconcile both sides into the final decision.
    Aggregate {
        pro: &'a SideReport,
        con: &'a SideReport,
    },
}

impl OracleStage<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            OracleStage::Queries { .. } => "queries",
            OracleStage::Decision { .. } => "decision",
            OracleStage::Aggregate { .. } => "aggregate",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub claim: &'a str,
    pub stage: OracleStage<'a>,
    /// Verification job this call belongs to, for log correlation.
    pub job_id: Option<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("malformed oracle response: {0}")]
    Malformed(String),
    #[error("oracle call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl OracleError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn missing(field: &str) -> Self {
        Self::Malformed(format!("missing required field `{field}`"))
    }
}

#[async_trait::async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(&self, ctx: &PromptContext<'_>) -> Result<Value, OracleError>;
}

// =============================================================================
// LLM-backed oracle
// =============================================================================

/// Default model for all three stages.
pub const DEFAULT_MODEL: &str = "openai/gpt-5-mini";

const MAX_OUTPUT_TOKENS: u32 = 4096;

pub struct LlmOracle<G: ChatGateway + ?Sized> {
    gateway: Arc<G>,
    model: String,
    temperature: f32,
}

impl<G: ChatGateway + ?Sized> LlmOracle<G> {
    pub fn new(gateway: Arc<G>, model: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
            temperature: 0.2,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }
}

#[async_trait::async_trait]
impl<G: ChatGateway + ?Sized> Oracle for LlmOracle<G> {
    async fn generate(&self, ctx: &PromptContext<'_>) -> Result<Value, OracleError> {
        let messages = prompts::render(ctx, chrono::Utc::now().date_naive());

        let caller = match ctx.stage {
            OracleStage::Queries { .. } => "oracle::queries",
            OracleStage::Decision { .. } => "oracle::decision",
            OracleStage::Aggregate { .. } => "oracle::aggregate",
        };
        let mut attribution = Attribution::new(caller);
        if let Some(job_id) = ctx.job_id {
            attribution = attribution.with_job(job_id);
        }

        let mut request = ChatRequest::new(ChatModel::openrouter(&self.model), messages, attribution)
            .temperature(self.temperature)
            .max_tokens(MAX_OUTPUT_TOKENS);
        // Only OpenAI models reliably honor response_format=json_object via OpenRouter.
        if self.model.starts_with("openai/") {
            request = request.json();
        }

        let response = self.gateway.chat(request).await?;
        let json_str = extract_json(&response.content);
        serde_json::from_str(json_str).map_err(|e| {
            let preview: String = response.content.chars().take(300).collect();
            OracleError::malformed(format!("invalid JSON ({e}): {preview}"))
        })
    }
}

/// Extract the first balanced JSON object from model output.
///
/// Models like to wrap JSON in prose or code fences. Braces inside string
/// literals are skipped so a `}` in a reason does not end the object early.
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find('{') else {
        return trimmed;
    };
    let remainder = &trimmed[start..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in remainder.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &remainder[..=i];
                }
            }
            _ => {}
        }
    }

    trimmed
}
