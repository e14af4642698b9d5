//! Engine configuration.
//!
//! Every component has an independent config struct with usable defaults;
//! [`EngineConfig::from_env`] applies the `TRIAGE_*` environment overrides
//! the platform deploys with.

use std::collections::BTreeMap;
use std::time::Duration;

/// Environment variable overriding the symptom-match threshold.
const ENV_MATCH_THRESHOLD: &str = "TRIAGE_MATCH_THRESHOLD";
/// Environment variable overriding the candidate fan-out.
const ENV_FAN_OUT: &str = "TRIAGE_FAN_OUT";
/// Environment variable overriding the maximum plan length.
const ENV_MAX_PLAN_STEPS: &str = "TRIAGE_MAX_PLAN_STEPS";
/// Environment variable overriding executor concurrency.
const ENV_CONCURRENCY: &str = "TRIAGE_CONCURRENCY";
/// Environment variable overriding the per-step timeout (seconds).
const ENV_STEP_TIMEOUT_SECS: &str = "TRIAGE_STEP_TIMEOUT_SECS";
/// Environment variable selecting strict corpus validation.
const ENV_STRICT_CORPUS: &str = "TRIAGE_STRICT_CORPUS";

/// How the loader treats malformed corpus metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Reject records with unrecognized tier labels.
    Strict,
    /// Normalize unrecognized tier labels to the nearest known tier and
    /// fall back to the numeric score alone when no tier is close enough.
    #[default]
    Lenient,
}

/// Symptom matcher settings.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Candidates scoring below this are discarded.
    pub threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { threshold: 0.35 }
    }
}

/// Plan builder settings.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// How many top-ranked candidates contribute localization steps.
    pub fan_out: usize,
    /// Maximum plan length after truncation.
    pub max_steps: usize,
    /// Per-tool priority overrides, applied after corpus scores.
    ///
    /// The corpus score is authoritative by default; hosts use this to cap
    /// or boost individual tools (e.g. keep the research step from
    /// outranking hardware checks).
    pub priority_overrides: BTreeMap<String, u32>,
    /// Extra dependency edges as `(dependent_tool, dependency_tool)` pairs,
    /// merged with the built-in dependency table.
    pub extra_dependencies: Vec<(String, String)>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            fan_out: 1,
            max_steps: 12,
            priority_overrides: BTreeMap::new(),
            extra_dependencies: Vec::new(),
        }
    }
}

/// Investigation executor settings.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Bounded worker pool size.
    pub concurrency: usize,
    /// Engine-enforced per-invocation timeout.
    pub step_timeout: Duration,
    /// Total attempts per step (first try plus retries).
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles per attempt.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
    /// Global budget: steps dispatched before the rest are skipped.
    pub max_executed_steps: usize,
    /// Global budget: wall clock before the rest are skipped.
    pub max_wall_clock: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            step_timeout: Duration::from_secs(30),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            max_executed_steps: 24,
            max_wall_clock: Duration::from_secs(180),
        }
    }
}

/// Diagnosis synthesizer settings.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// A runner-up hypothesis within this relative margin of the leader
    /// makes the diagnosis ambiguous.
    pub ambiguity_margin: f32,
    /// Confidence reported for the virtualized-hardware special case.
    pub virtual_confidence: f32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            ambiguity_margin: 0.15,
            virtual_confidence: 0.9,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Corpus validation mode.
    pub strictness: Strictness,
    /// Symptom matcher settings.
    pub matcher: MatcherConfig,
    /// Plan builder settings.
    pub planner: PlannerConfig,
    /// Executor settings.
    pub executor: ExecutorConfig,
    /// Synthesizer settings.
    pub synthesis: SynthesisConfig,
}

impl EngineConfig {
    /// Build a configuration from defaults plus `TRIAGE_*` env overrides.
    ///
    /// Unparseable values are ignored in favor of the default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(threshold) = parse_env::<f32>(ENV_MATCH_THRESHOLD) {
            config.matcher.threshold = threshold;
        }
        if let Some(fan_out) = parse_env::<usize>(ENV_FAN_OUT) {
            config.planner.fan_out = fan_out;
        }
        if let Some(max_steps) = parse_env::<usize>(ENV_MAX_PLAN_STEPS) {
            config.planner.max_steps = max_steps;
        }
        if let Some(concurrency) = parse_env::<usize>(ENV_CONCURRENCY) {
            config.executor.concurrency = concurrency.max(1);
        }
        if let Some(secs) = parse_env::<u64>(ENV_STEP_TIMEOUT_SECS) {
            config.executor.step_timeout = Duration::from_secs(secs);
        }
        if std::env::var(ENV_STRICT_CORPUS).is_ok_and(|v| v == "true" || v == "1") {
            config.strictness = Strictness::Strict;
        }

        config
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}
