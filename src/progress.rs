//! User-visible progress lines.
//!
//! Everything the pipeline wants a caller to see while a verification is in
//! flight goes through a [`ProgressSink`], tagged with the channel it came
//! from. The job store turns these into poll-able log lines; the synchronous
//! path forwards them to `tracing`.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evidence::Side;

/// Origin of a progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Pro,
    Con,
    Final,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Pro => "pro",
            Channel::Con => "con",
            Channel::Final => "final",
        }
    }
}

impl From<Side> for Channel {
    fn from(side: Side) -> Self {
        match side {
            Side::Pro => Channel::Pro,
            Side::Con => Channel::Con,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a progress line the way polls return it: `[pro] message`.
pub fn format_line(channel: Channel, message: &str) -> String {
    format!("[{channel}] {message}")
}

pub trait ProgressSink: Send + Sync {
    fn log(&self, channel: Channel, message: &str);

    /// Verification job these lines belong to, if any. Oracle calls carry
    /// it for log correlation.
    fn job_id(&self) -> Option<Uuid> {
        None
    }
}

/// Forwards progress lines to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn log(&self, channel: Channel, message: &str) {
        tracing::info!(channel = channel.as_str(), "{message}");
    }
}

/// Keeps every line in memory. Handy for tests and for the synchronous CLI
/// path when the transcript should be written out afterwards.
#[derive(Debug, Default)]
pub struct CollectingProgressSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ProgressSink for CollectingProgressSink {
    fn log(&self, channel: Channel, message: &str) {
        tracing::debug!(channel = channel.as_str(), "{message}");
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(format_line(channel, message));
    }
}
