//! Error types for the triage engine.

use thiserror::Error;

/// Errors raised while validating the knowledge corpus at load time.
///
/// Any of these is fatal: the engine refuses to initialize on a malformed
/// corpus rather than diagnose from bad data.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// An experience record is missing a required field.
    #[error("experience record {index}: missing or empty `{field}`")]
    MissingRecordField { index: usize, field: &'static str },

    /// An experience record has no localization steps.
    #[error("experience record {index} ({phenomenon}): no localization steps")]
    NoLocalizationSteps { index: usize, phenomenon: String },

    /// A static step is missing its tool identifier.
    #[error("static step {index}: missing or empty `tool`")]
    MissingTool { index: usize },

    /// A static step carries a negative priority score.
    #[error("static step {index} ({tool}): negative priority score {score}")]
    NegativePriority {
        index: usize,
        tool: String,
        score: i64,
    },

    /// A static step carries a tier label the strict loader does not know.
    #[error("static step {index} ({tool}): unrecognized priority tier `{tier}`")]
    UnknownTier {
        index: usize,
        tool: String,
        tier: String,
    },

    /// Corpus JSON could not be parsed.
    #[error("corpus JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Corpus YAML could not be parsed.
    #[error("corpus YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors raised while building an investigation plan.
///
/// Fails the affected investigation only; the engine and its knowledge
/// store remain usable.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The declared tool dependencies form a cycle.
    #[error("dependency cycle among tools: {}", tools.join(" -> "))]
    DependencyCycle { tools: Vec<String> },
}
