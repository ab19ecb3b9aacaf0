//! Prompt templates for the three oracle stages.
//!
//! Domain logic for rendering query, decision and aggregation prompts.
//! Provider-agnostic: the output is a plain message list.

use chrono::NaiveDate;

use crate::evidence::{Side, SideReport};
use crate::gateway::Message;
use crate::oracle::{OracleStage, PromptContext};

/// Bounds asked of the oracle when generating queries.
pub const MIN_QUERIES: usize = 3;
pub const MAX_QUERIES: usize = 5;

// =============================================================================
// Prompt templates
// =============================================================================

/// Rendered prompt ready for LLM.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: String,
    pub system: String,
    pub user: String,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }
}

/// Escape XML special characters to prevent prompt injection via tag breaking.
fn escape_xml_chars(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// A prompt template with `{name}` placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

impl PromptTemplate {
    /// Substitute placeholders in one pass, so a value that happens to
    /// contain `{name}` is never expanded again. Values are inserted
    /// verbatim; callers escape anything that came from outside.
    pub fn render(&self, vars: &[(&str, &str)]) -> PromptInstance {
        PromptInstance {
            template_slug: self.slug.to_string(),
            system: fill_placeholders(self.system, vars).trim().to_string(),
            user: fill_placeholders(self.user, vars).trim().to_string(),
        }
    }
}

fn fill_placeholders(text: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let key_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let value = after[key_len..]
            .starts_with('}')
            .then(|| vars.iter().find(|(k, _)| *k == &after[..key_len]))
            .flatten();
        match value {
            Some((_, value)) => {
                out.push_str(value);
                rest = &after[key_len + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

// =============================================================================
// Standard prompts
// =============================================================================

const SYSTEM: &str = r#"You are a truth seeker. You verify the truthfulness of claims by researching them and making an informed decision. You are very strict on wording, details and facts.

This is a fact-checking exercise using an adversarial approach: a pro side investigates assuming the claim is true, a con side investigates assuming it is false, and a neutral judge reconciles their findings. Output only valid JSON."#;

const DECISION_CRITERIA: &str = r#"## Decision Criteria
"true" - The claim is DEMONSTRABLY true based on evidence with minimal contradicting evidence.
"false" - The claim is DEMONSTRABLY false based on evidence with minimal contradicting evidence.
"depends" - The claim's truth depends on context, definitions or conditions the claim does not specify.
"inconclusive" - Available evidence is insufficient, contradictory, or of inadequate quality.
"too_early" - The claim references a future date or event, so it cannot be verified yet.

## Date Verification
The current date is {today}. If the claim relies on ANYTHING after the current date you MUST answer "too_early". Do not predict future events."#;

pub const QUERIES_V1: PromptTemplate = PromptTemplate {
    slug: "queries_v1",
    system: SYSTEM,
    user: r#"<claim>
{claim}
</claim>

# Task
You are on the {side} side. Generate search queries that could {goal} the claim. For this stage, assume the claim is {assumption}.

## Query Guidelines
- Do not search for the claim directly. Search for facts and data points that could help you {goal} it.
- Prefer authoritative sources (academia, government, expert consensus, official bodies).
- Avoid leading or biased formulations.
- If the claim mentions dates or events, include queries that verify dates and timelines.
- Keep queries precise, targeted and diverse.
{prior_section}
# Instructions
Respond with ONLY a JSON object:
{"queries": ["specific query 1", "specific query 2", "specific query 3"]}

Include {min_queries}-{max_queries} diverse, specific queries.
json:"#,
};

pub const DECISION_V1: PromptTemplate = PromptTemplate {
    slug: "decision_v1",
    system: SYSTEM,
    user: r#"<claim>
{claim}
</claim>

# Task
You are on the {side} side. You approached this claim assuming it was {assumption}. You have gathered evidence and must now make an objective, evidence-based decision. Be willing to change your initial assumption.

{criteria}

# Your Findings
## Queries so far
<queries>
{queries}
</queries>

## Results
<evidence>
{evidence}
</evidence>
{prior_section}
# Instructions
Respond with ONLY a JSON object with these fields:
- "decision": REQUIRED. One of "true|false|depends|inconclusive|too_early".
- "reason": REQUIRED. Your step by step reasoning, evaluating each possible decision.
- "confidence": REQUIRED. Number 0-100: how confident you are in your decision.
- "key_evidence": REQUIRED. Evidence that most influenced the decision (array of text).
- "supporting_evidence": OPTIONAL. Evidence supporting the claim (array of text).
- "contradictory_evidence": OPTIONAL. Evidence contradicting the claim (array of text).
- "additional_queries": OPTIONAL. Include ONLY for a CRITICAL information gap: the extra queries to run (array of text).
json:"#,
};

pub const AGGREGATE_V1: PromptTemplate = PromptTemplate {
    slug: "aggregate_v1",
    system: SYSTEM,
    user: r#"<claim>
{claim}
</claim>

# Task
You are on neither side. You are the final judge. Weigh the information both sides gathered, their decisions, their reasoning and their bias, and make a final, objective determination.

{criteria}

# Pro Side (assumed the claim was true)
<pro_information>
{pro_information}
</pro_information>
Decision: {pro_decision}
Reasoning: {pro_reason}

# Con Side (assumed the claim was false)
<con_information>
{con_information}
</con_information>
Decision: {con_decision}
Reasoning: {con_reason}

# Instructions
Respond with ONLY a JSON object with these fields:
- "decision": REQUIRED. One of "true|false|depends|inconclusive|too_early".
- "reason": REQUIRED. Your step by step reasoning, evaluating each possible decision.
- "confidence": REQUIRED. Number 0-100: how confident you are in your decision.
- "key_evidence": REQUIRED. Evidence that most influenced the decision (array of text).
- "supporting_evidence": OPTIONAL. Evidence supporting the claim (array of text).
- "contradictory_evidence": OPTIONAL. Evidence contradicting the claim (array of text).
- "information_gaps": OPTIONAL. Missing information that would help resolve the claim (array of text).
json:"#,
};

/// The other side's findings, shown to the side that runs second.
fn prior_section(prior: Option<&SideReport>) -> String {
    let Some(prior) = prior else {
        return String::new();
    };
    format!(
        "\n# Other Side's Findings\nThe {side} side (who assumed the claim was {assumption}) has already researched it. Use their findings to avoid duplication and to find information gaps.\n<other_side_information>\n{info}\n</other_side_information>\nTheir decision: {decision}\nTheir reasoning: {reason}\n",
        side = prior.side,
        assumption = prior.side.assumption(),
        info = escape_xml_chars(prior.information.trim()),
        decision = prior.decision.verdict,
        reason = escape_xml_chars(&prior.decision.reason),
    )
}

fn goal(side: Side) -> &'static str {
    match side {
        Side::Pro => "support and prove",
        Side::Con => "debunk and disprove",
    }
}

/// Render the messages for one oracle call.
pub fn render(ctx: &PromptContext<'_>, today: NaiveDate) -> Vec<Message> {
    let claim = escape_xml_chars(ctx.claim.trim());
    let today = today.format("%Y-%m-%d").to_string();
    let criteria = DECISION_CRITERIA.replace("{today}", &today);
    let min_queries = MIN_QUERIES.to_string();
    let max_queries = MAX_QUERIES.to_string();

    let instance = match ctx.stage {
        OracleStage::Queries { side, prior } => {
            let prior = prior_section(prior);
            QUERIES_V1.render(&[
                ("claim", &claim),
                ("side", side.as_str()),
                ("goal", goal(side)),
                ("assumption", side.assumption()),
                ("prior_section", &prior),
                ("min_queries", &min_queries),
                ("max_queries", &max_queries),
            ])
        }
        OracleStage::Decision {
            side,
            prior,
            queries,
            evidence,
        } => {
            let prior = prior_section(prior);
            let queries = escape_xml_chars(&queries.join("\n"));
            let evidence = escape_xml_chars(evidence.trim());
            DECISION_V1.render(&[
                ("claim", &claim),
                ("side", side.as_str()),
                ("assumption", side.assumption()),
                ("criteria", &criteria),
                ("queries", &queries),
                ("evidence", &evidence),
                ("prior_section", &prior),
            ])
        }
        OracleStage::Aggregate { pro, con } => {
            let pro_information = escape_xml_chars(pro.information.trim());
            let con_information = escape_xml_chars(con.information.trim());
            let pro_reason = escape_xml_chars(&pro.decision.reason);
            let con_reason = escape_xml_chars(&con.decision.reason);
            AGGREGATE_V1.render(&[
                ("claim", &claim),
                ("criteria", &criteria),
                ("pro_information", &pro_information),
                ("pro_decision", pro.decision.verdict.as_str()),
                ("pro_reason", &pro_reason),
                ("con_information", &con_information),
                ("con_decision", con.decision.verdict.as_str()),
                ("con_reason", &con_reason),
            ])
        }
    };

    instance.to_messages()
}

// =============================================================================
// TESTS
// =============================================================================
