//! Data models shared by the decoder, the session controller and the state store.

use serde::{Deserialize, Serialize};

/// One unit of reported progress.
///
/// `step` may exceed `total`; the decoder passes both through unchanged.
/// Use the display helpers when a bounded value is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: u64,
    pub total: u64,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(step: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            step,
            total,
            message: message.into(),
        }
    }

    /// `step` clamped to `total`.
    pub fn clamped_step(&self) -> u64 {
        self.step.min(self.total)
    }

    /// Completed fraction in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.clamped_step() as f64 / self.total as f64
    }

    /// Completed percentage in `[0, 100]`.
    pub fn percent(&self) -> u8 {
        (self.fraction() * 100.0).round() as u8
    }
}

/// A non-terminal update delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressUpdate {
    /// Structured progress record
    Progress(ProgressEvent),

    /// Unstructured message forwarded verbatim (lenient sessions only)
    Text(String),
}

impl ProgressUpdate {
    /// Human readable text of the update.
    pub fn message(&self) -> &str {
        match self {
            ProgressUpdate::Progress(event) => &event.message,
            ProgressUpdate::Text(text) => text,
        }
    }
}

/// Response of the agent's `/health` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Response of the agent's `/ping` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub method: String,
    pub timestamp: String,
}
