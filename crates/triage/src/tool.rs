//! Tool collaborator interface.
//!
//! Diagnostic tools (disk-health probes, filesystem checks, log queries,
//! orchestrator metadata queries, network probes) live outside the engine.
//! The engine only knows their capability identifiers and the shape of what
//! they return; a [`ToolBroker`] implementation supplied by the host maps
//! identifiers to real instrumentation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Payload field that marks a successful invocation as a conclusive finding.
///
/// A successful outcome whose payload carries a non-null `finding` is
/// recorded as conclusive evidence; success without one is inconclusive.
pub const FINDING_KEY: &str = "finding";

/// Errors that can occur when invoking a tool collaborator.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Transient transport or collaborator error; the step will be retried.
    #[error("transient failure invoking `{tool}`: {message}")]
    Transient { tool: String, message: String },

    /// The invocation exceeded its time budget.
    #[error("`{tool}` timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    /// No collaborator is registered for the requested tool.
    #[error("no collaborator registered for tool `{0}`")]
    Unsupported(String),
}

impl ToolError {
    /// Whether the executor should retry after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }
}

/// Terminal status reported by a tool collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// The tool ran and produced a usable payload.
    Success,
    /// The tool ran and reports that it could not complete its check.
    Failure,
    /// The collaborator gave up waiting on its own instrumentation.
    Timeout,
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// A single resolved tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque capability identifier (e.g. `disk_health_check`).
    pub tool: String,
    /// Concrete parameters, ordered for deterministic signatures.
    pub params: BTreeMap<String, String>,
    /// Per-call budget the collaborator should honor.
    pub timeout: Duration,
}

impl ToolCall {
    /// Create a call with no parameters.
    #[must_use]
    pub fn new(tool: impl Into<String>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            params: BTreeMap::new(),
            timeout,
        }
    }
}

/// What a tool collaborator returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Terminal status of the invocation.
    pub status: ToolStatus,
    /// Structured result data; shape is tool-specific.
    pub payload: serde_json::Value,
    /// One-line human summary of what the tool observed.
    pub summary: String,
}

impl ToolOutcome {
    /// Successful outcome with a structured payload.
    #[must_use]
    pub fn success(payload: serde_json::Value, summary: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            payload,
            summary: summary.into(),
        }
    }

    /// Failed outcome with a summary of what went wrong.
    #[must_use]
    pub fn failure(summary: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Failure,
            payload: serde_json::Value::Null,
            summary: summary.into(),
        }
    }

    /// Whether the payload carries a conclusive finding.
    #[must_use]
    pub fn has_finding(&self) -> bool {
        self.payload
            .get(FINDING_KEY)
            .is_some_and(|v| !v.is_null())
    }
}

/// Dispatch interface for diagnostic tool collaborators.
///
/// Implementations map capability identifiers to real instrumentation.
/// The engine treats every tool as a blocking call bounded by the
/// per-call timeout it passes in; collaborators that support cooperative
/// cancellation should stop work when the timeout elapses.
#[async_trait]
pub trait ToolBroker: Send + Sync {
    /// Invoke a tool and return its outcome.
    ///
    /// Transport-level problems are reported as [`ToolError`]; a tool that
    /// ran but could not complete its check reports
    /// [`ToolStatus::Failure`] instead.
    async fn invoke(&self, call: &ToolCall) -> Result<ToolOutcome, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_finding() {
        let hit = ToolOutcome::success(json!({"finding": "reallocated sectors"}), "degraded");
        assert!(hit.has_finding());

        let null_finding = ToolOutcome::success(json!({"finding": null}), "clean");
        assert!(!null_finding.has_finding());

        let miss = ToolOutcome::success(json!({"smart": "PASSED"}), "clean");
        assert!(!miss.has_finding());

        assert!(!ToolOutcome::failure("probe crashed").has_finding());
    }

    #[test]
    fn test_retryable_errors() {
        let transient = ToolError::Transient {
            tool: "query_pod_logs".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(transient.is_retryable());

        let timeout = ToolError::Timeout {
            tool: "disk_health_check".to_string(),
            timeout_secs: 30,
        };
        assert!(timeout.is_retryable());

        assert!(!ToolError::Unsupported("unknown_tool".to_string()).is_retryable());
    }
}
