//! Core data model shared across the triage pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An observed storage symptom, as reported by the host application.
///
/// Free text plus whatever structured context the reporter had at hand.
/// Read-only after creation; one observation produces exactly one plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Free-text symptom description.
    pub text: String,
    /// Node the symptom was observed on, if known.
    pub node: Option<String>,
    /// Affected pod, if known.
    pub pod: Option<String>,
    /// Affected volume or claim, if known.
    pub volume: Option<String>,
}

impl Observation {
    /// Create an observation from symptom text alone.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            node: None,
            pod: None,
            volume: None,
        }
    }

    /// Attach the node the symptom was seen on.
    #[must_use]
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Attach the affected pod.
    #[must_use]
    pub fn with_pod(mut self, pod: impl Into<String>) -> Self {
        self.pod = Some(pod.into());
        self
    }

    /// Attach the affected volume.
    #[must_use]
    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volume = Some(volume.into());
        self
    }

    /// Look up a context field by placeholder name.
    #[must_use]
    pub fn context_value(&self, key: &str) -> Option<&str> {
        match key {
            "node" => self.node.as_deref(),
            "pod" => self.pod.as_deref(),
            "volume" => self.volume.as_deref(),
            _ => None,
        }
    }
}

/// How much a piece of evidence settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    /// The tool produced a finding that bears directly on a root cause.
    Conclusive,
    /// The tool ran but observed nothing decisive.
    Inconclusive,
    /// The tool could not be executed to completion.
    Error,
}

impl std::fmt::Display for EvidenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conclusive => write!(f, "conclusive"),
            Self::Inconclusive => write!(f, "inconclusive"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// The recorded result of executing one investigation step.
///
/// Appended to the investigation's evidence set and never mutated after
/// creation. Evidence is associated with steps by id, not arrival order,
/// so synthesis is independent of tool latencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Id of the step this evidence belongs to.
    pub step_id: String,
    /// Tool that produced it.
    pub tool: String,
    /// How decisive the result was.
    pub status: EvidenceStatus,
    /// Structured payload returned by the tool.
    pub payload: serde_json::Value,
    /// One-line summary.
    pub summary: String,
    /// How many invocation attempts were spent.
    pub attempts: u32,
    /// When the evidence was captured.
    pub captured_at: DateTime<Utc>,
}

impl Evidence {
    /// The conclusive finding text, if the payload carries one.
    #[must_use]
    pub fn finding(&self) -> Option<&str> {
        self.payload.get(crate::tool::FINDING_KEY)?.as_str()
    }
}

/// Coarse action class of a diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisCategory {
    /// A known remedy exists and can be applied without operator judgment.
    AutomatedResolutionAvailable,
    /// A remedy exists but a human has to carry it out.
    ManualActionRequired,
    /// The observation is expected behavior; nothing to fix.
    InformationalNormal,
    /// The evidence does not support a single root cause.
    Inconclusive,
}

impl std::fmt::Display for DiagnosisCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutomatedResolutionAvailable => write!(f, "automated resolution available"),
            Self::ManualActionRequired => write!(f, "manual action required"),
            Self::InformationalNormal => write!(f, "informational (normal)"),
            Self::Inconclusive => write!(f, "inconclusive"),
        }
    }
}

/// An item backing a diagnosis.
///
/// Either a reference to collected evidence, or - on ambiguous
/// inconclusive diagnoses only - a ranked root-cause hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SupportingItem {
    /// Reference to one piece of collected evidence.
    Evidence {
        step_id: String,
        tool: String,
        status: EvidenceStatus,
        summary: String,
    },
    /// A root-cause hypothesis that remained plausible.
    Hypothesis {
        root_cause: String,
        /// Share of conclusive evidence backing this hypothesis.
        score: f32,
        /// Ids of the evidence items backing it.
        evidence: Vec<String>,
    },
}

impl SupportingItem {
    /// Build an evidence reference.
    #[must_use]
    pub fn from_evidence(evidence: &Evidence) -> Self {
        Self::Evidence {
            step_id: evidence.step_id.clone(),
            tool: evidence.tool.clone(),
            status: evidence.status,
            summary: evidence.summary.clone(),
        }
    }
}

/// The final output of one investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    /// The observation this diagnosis answers.
    pub observation: Observation,
    /// Coarse action class.
    pub category: DiagnosisCategory,
    /// Confidence in the named root cause, 0 to 1.
    pub confidence: f32,
    /// The diagnosed root cause, absent when inconclusive.
    pub root_cause: Option<String>,
    /// Evidence references, or ranked hypotheses when ambiguous.
    pub supporting: Vec<SupportingItem>,
    /// Remediation steps, verbatim from the matched record.
    pub resolution_steps: Vec<String>,
    /// Whether a human has to act for the remedy to happen.
    pub needs_user_action: bool,
}
