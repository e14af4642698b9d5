//! Storage fault triage engine for the platform.
//!
//! Matches an observed volume symptom against a corpus of historical
//! incidents, plans an ordered diagnostic investigation, executes it
//! against tool collaborators and synthesizes a root-cause diagnosis
//! with a confidence level and resolution category.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use triage::{EngineConfig, KnowledgeStore, Observation, Strictness, TriageEngine};
//! # fn broker() -> Arc<dyn triage::ToolBroker> { unimplemented!() }
//!
//! # async fn run(records_yaml: &str, steps_yaml: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(KnowledgeStore::from_yaml(
//!     records_yaml,
//!     steps_yaml,
//!     Strictness::Lenient,
//! )?);
//!
//! let engine = TriageEngine::new(store, broker(), EngineConfig::from_env());
//! let diagnosis = engine
//!     .investigate(Observation::new("I/O error reading pod logs").with_node("node-3"))
//!     .await?;
//! println!("{}", triage::report::render(&diagnosis));
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! The pipeline is five components, each replaceable at its seam:
//!
//! - [`KnowledgeStore`]: immutable corpora of experience records and
//!   generic diagnostic steps, validated once at load.
//! - [`SymptomMatcher`]: ranks records against an observation using a
//!   pluggable [`ScoreStrategy`].
//! - [`PlanBuilder`]: merges record and library steps into an ordered,
//!   deduplicated, dependency-respecting plan.
//! - [`InvestigationExecutor`]: drives the plan against a [`ToolBroker`]
//!   with retries, timeouts, budgets and early termination.
//! - [`Synthesizer`]: turns candidates plus evidence into a [`Diagnosis`].
//!
//! The host application owns the corpus files and the tool
//! implementations; the engine owns everything between an observation
//! and its diagnosis.

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod knowledge;
pub mod matcher;
pub mod planner;
pub mod report;
pub mod synthesis;
pub mod tool;
pub mod types;

pub use config::{
    EngineConfig, ExecutorConfig, MatcherConfig, PlannerConfig, Strictness, SynthesisConfig,
};
pub use engine::TriageEngine;
pub use error::{PlanError, SchemaError};
pub use executor::{InvestigationExecutor, InvestigationOutcome};
pub use knowledge::{ExperienceRecord, KnowledgeStore, PriorityTier, StaticStep};
pub use matcher::{KeywordScorer, RankedMatch, ScoreStrategy, SymptomMatcher};
pub use planner::{InvestigationStep, Plan, PlanBuilder, StepOrigin, StepStatus};
pub use synthesis::Synthesizer;
pub use tool::{ToolBroker, ToolCall, ToolError, ToolOutcome, ToolStatus};
pub use types::{
    Diagnosis, DiagnosisCategory, Evidence, EvidenceStatus, Observation, SupportingItem,
};
