//! Verdicts and decisions, and validation of raw oracle objects into them.
//!
//! The oracle hands back loosely shaped JSON. Everything leaving this module
//! is typed: a query list that is guaranteed non-empty, or a [`Decision`]
//! whose verdict, reason and confidence are present and in range.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::oracle::OracleError;

/// Categorical outcome of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    True,
    False,
    Depends,
    Inconclusive,
    TooEarly,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::True => "true",
            Verdict::False => "false",
            Verdict::Depends => "depends",
            Verdict::Inconclusive => "inconclusive",
            Verdict::TooEarly => "too_early",
        }
    }

    /// Lenient parse: case-insensitive, `too early` / `too-early` accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "true" => Some(Verdict::True),
            "false" => Some(Verdict::False),
            "depends" => Some(Verdict::Depends),
            "inconclusive" => Some(Verdict::Inconclusive),
            "too_early" => Some(Verdict::TooEarly),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A side's (or the judge's) decision about the claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(rename = "decision")]
    pub verdict: Verdict,
    pub reason: String,
    /// 0..=100
    pub confidence: f64,
    #[serde(default)]
    pub key_evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supporting_evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contradictory_evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub information_gaps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_queries: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(default)]
    decision: Option<Value>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default)]
    key_evidence: Option<Vec<Value>>,
    #[serde(default)]
    supporting_evidence: Option<Vec<Value>>,
    #[serde(default)]
    contradictory_evidence: Option<Vec<Value>>,
    #[serde(default)]
    information_gaps: Option<Vec<Value>>,
    #[serde(default)]
    additional_queries: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawQueries {
    #[serde(default)]
    queries: Option<Vec<Value>>,
}

impl Decision {
    /// Validate a raw oracle object.
    ///
    /// `decision`, `reason` and `confidence` are required. Confidence may be
    /// a number or a numeric string and is clamped to 0..=100. Evidence
    /// lists are optional; non-string entries are dropped.
    pub fn from_value(value: Value) -> Result<Self, OracleError> {
        let raw: RawDecision = serde_json::from_value(value)
            .map_err(|e| OracleError::malformed(format!("decision object: {e}")))?;

        let verdict = match raw.decision {
            Some(Value::String(s)) => Verdict::parse(&s)
                .ok_or_else(|| OracleError::malformed(format!("unknown decision: {s:?}")))?,
            Some(Value::Bool(true)) => Verdict::True,
            Some(Value::Bool(false)) => Verdict::False,
            Some(other) => {
                return Err(OracleError::malformed(format!(
                    "decision must be a string, got {other}"
                )))
            }
            None => return Err(OracleError::missing("decision")),
        };

        let reason = raw
            .reason
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| OracleError::missing("reason"))?;

        let confidence = match raw.confidence {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
            Some(_) => None,
            None => return Err(OracleError::missing("confidence")),
        }
        .filter(|c| c.is_finite())
        .ok_or_else(|| OracleError::malformed("confidence is not a number"))?
        .clamp(0.0, 100.0);

        let additional_queries = raw
            .additional_queries
            .map(string_list)
            .filter(|q| !q.is_empty());

        Ok(Self {
            verdict,
            reason,
            confidence,
            key_evidence: raw.key_evidence.map(string_list).unwrap_or_default(),
            supporting_evidence: raw.supporting_evidence.map(string_list).unwrap_or_default(),
            contradictory_evidence: raw
                .contradictory_evidence
                .map(string_list)
                .unwrap_or_default(),
            information_gaps: raw.information_gaps.map(string_list).unwrap_or_default(),
            additional_queries,
        })
    }

    /// Queries the oracle asked for before it is willing to settle, if any.
    pub fn requested_queries(&self) -> Option<&[String]> {
        self.additional_queries
            .as_deref()
            .filter(|queries| !queries.is_empty())
    }
}

/// Validate a query-generation object: `{"queries": [...]}`.
///
/// Blank entries are dropped. An empty result is returned as-is; the caller
/// decides whether that is fatal.
pub fn parse_queries(value: Value) -> Result<Vec<String>, OracleError> {
    let raw: RawQueries = serde_json::from_value(value)
        .map_err(|e| OracleError::malformed(format!("query object: {e}")))?;
    Ok(raw.queries.map(string_list).unwrap_or_default())
}

fn string_list(values: Vec<Value>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}
