//! ---
//! ems_section: "02-device-polling"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Poll failure taxonomy and diagnostic records."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::Serialize;

/// Failures of a single fetch attempt. A path that does not resolve is not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PollError {
    /// Device answered with anything other than 200.
    #[error("unexpected http status {status} from {url}")]
    Status { status: u16, url: String },
    /// No response within the request timeout.
    #[error("timeout fetching {url}")]
    Timeout { url: String },
    /// Connection refused, DNS, TLS and other transport-level failures.
    #[error("transport error: {detail}")]
    Transport { detail: String },
    /// Body was not valid JSON.
    #[error("malformed response body: {detail}")]
    Decode { detail: String },
}

impl PollError {
    pub fn transport(detail: impl ToString) -> Self {
        PollError::Transport {
            detail: detail.to_string(),
        }
    }

    pub fn decode(detail: impl ToString) -> Self {
        PollError::Decode {
            detail: detail.to_string(),
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PollError::Status { .. } => "status",
            PollError::Timeout { .. } => "timeout",
            PollError::Transport { .. } => "transport",
            PollError::Decode { .. } => "decode",
        }
    }
}

/// Record emitted when a poll fails, identifying the affected reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub reading_id: String,
    pub error: PollError,
}

impl Diagnostic {
    pub fn new(reading_id: impl Into<String>, error: PollError) -> Self {
        Self {
            reading_id: reading_id.into(),
            error,
        }
    }

    /// Write the diagnostic to the log at error level.
    pub fn emit(&self) {
        let reading = self.reading_id.as_str();
        match &self.error {
            PollError::Status { status, url } => {
                tracing::error!(reading, status, url = %url, "failed to fetch reading: non-success status")
            }
            PollError::Timeout { url } => {
                tracing::error!(reading, url = %url, "timeout fetching reading")
            }
            PollError::Transport { detail } => {
                tracing::error!(reading, error = %detail, "client error fetching reading")
            }
            PollError::Decode { detail } => {
                tracing::error!(reading, error = %detail, "unexpected error fetching reading")
            }
        }
    }
}
