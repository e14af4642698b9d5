//! Investigation plan construction.
//!
//! Merges the matched record's localization steps with the applicable
//! generic steps into one ordered, deduplicated, dependency-respecting
//! plan. Dependencies between tools are declared in a fixed table (plus
//! config-supplied edges), never inferred from free text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::config::PlannerConfig;
use crate::error::PlanError;
use crate::knowledge::{KnowledgeStore, StaticStep};
use crate::matcher::RankedMatch;
use crate::types::Observation;

/// Priority assigned to record-derived steps; corpus records carry no
/// numeric score of their own.
pub const EXPERIENCE_PRIORITY: u32 = 80;

/// Built-in dependency table as `(dependent_tool, dependency_tool)` pairs.
///
/// A tool appears here when its params require an artifact another tool
/// produces (a filesystem check needs the mount path resolved first, a
/// SMART query needs the backing device identified).
static TOOL_DEPENDENCIES: LazyLock<Vec<(&'static str, &'static str)>> = LazyLock::new(|| {
    vec![
        ("filesystem_check", "resolve_mount_path"),
        ("capacity_usage_check", "resolve_mount_path"),
        ("disk_health_check", "disk_identity_query"),
    ]
});

/// Execution status of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Whether the step can no longer change state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Where a step came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOrigin {
    /// Converted from a matched record's localization steps; `candidate`
    /// indexes into the plan's ranked candidate list.
    Experience { candidate: usize },
    /// Taken from the generic step library.
    Static,
}

/// A resolved, executable diagnostic step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationStep {
    /// Stable id, unique within the plan.
    pub id: String,
    /// Capability identifier of the tool to invoke.
    pub tool: String,
    /// Concrete parameters resolved from the observation context.
    pub params: BTreeMap<String, String>,
    /// Urgency; higher dispatches earlier among dependency-free steps.
    pub priority: u32,
    /// Ids of steps whose evidence this step requires.
    pub depends_on: Vec<String>,
    /// Current execution status.
    pub status: StepStatus,
    /// Why the matched record took this step, when record-derived.
    pub rationale: Option<String>,
    /// What a healthy system would show, when library-derived.
    pub expected_outcome: Option<String>,
    /// Provenance.
    pub origin: StepOrigin,
}

impl InvestigationStep {
    /// Deduplication signature: tool plus ordered params.
    #[must_use]
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("{}({})", self.tool, params.join(","))
    }
}

/// An ordered, deduplicated investigation plan for one observation.
///
/// Owned by a single investigation and discarded after synthesis.
#[derive(Debug, Clone)]
pub struct Plan {
    /// The observation the plan answers.
    pub observation: Observation,
    /// Ranked candidates that contributed steps (may be empty).
    pub candidates: Vec<RankedMatch>,
    /// Steps in execution order.
    pub steps: Vec<InvestigationStep>,
}

/// Builds plans from ranked candidates and the static library.
pub struct PlanBuilder {
    config: PlannerConfig,
}

impl PlanBuilder {
    /// Create a builder with the given settings.
    #[must_use]
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Build the plan for one observation.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::DependencyCycle`] when the declared
    /// dependencies cannot be ordered. This fails the investigation, not
    /// the process.
    pub fn build(
        &self,
        observation: &Observation,
        candidates: Vec<RankedMatch>,
        store: &KnowledgeStore,
    ) -> Result<Plan, PlanError> {
        let mut seq = 0usize;
        let mut steps: Vec<InvestigationStep> = Vec::new();

        // Record-derived steps first, in record order.
        for (candidate_idx, candidate) in
            candidates.iter().take(self.config.fan_out.max(1)).enumerate()
        {
            for loc in &candidate.record.localization {
                let Some((tool, params)) = parse_tool_call(&loc.tool_call, observation) else {
                    warn!(tool_call = %loc.tool_call, "unparseable tool call, skipping");
                    continue;
                };
                let priority = self.effective_priority(&tool, EXPERIENCE_PRIORITY);
                steps.push(InvestigationStep {
                    id: next_id(&mut seq, &tool),
                    tool,
                    params,
                    priority,
                    depends_on: Vec::new(),
                    status: StepStatus::Pending,
                    rationale: Some(loc.rationale.clone()),
                    expected_outcome: None,
                    origin: StepOrigin::Experience {
                        candidate: candidate_idx,
                    },
                });
            }
        }

        // Generic steps for tools the record did not already cover.
        let mut present: HashSet<String> = steps.iter().map(|s| s.tool.clone()).collect();
        for static_step in store.static_steps() {
            if present.contains(&static_step.tool) {
                continue;
            }
            present.insert(static_step.tool.clone());
            steps.push(self.step_from_library(static_step, observation, &mut seq));
        }

        // Declared dependencies; inject missing dependency tools from the
        // library when it defines them, drop the edge otherwise.
        let dependency_table = self.dependency_table();
        let mut injected = true;
        while injected {
            injected = false;
            let tools: Vec<String> = steps.iter().map(|s| s.tool.clone()).collect();
            for tool in tools {
                for dependency in dependencies_of(&dependency_table, &tool) {
                    if present.contains(&dependency) {
                        continue;
                    }
                    if let Some(library_step) =
                        store.static_steps().iter().find(|s| s.tool == dependency)
                    {
                        present.insert(dependency.clone());
                        steps.push(self.step_from_library(library_step, observation, &mut seq));
                        injected = true;
                    }
                }
            }
        }
        for idx in 0..steps.len() {
            let mut depends_on: Vec<String> = Vec::new();
            for dependency in dependencies_of(&dependency_table, &steps[idx].tool) {
                for dep_step in steps.iter().filter(|s| s.tool == dependency) {
                    depends_on.push(dep_step.id.clone());
                }
            }
            steps[idx].depends_on = depends_on;
        }

        let steps = dedup_by_signature(steps);
        let ordered = topological_order(steps)?;
        let truncated = truncate(ordered, self.config.max_steps);

        debug!(
            steps = truncated.len(),
            candidates = candidates.len(),
            "plan built"
        );

        Ok(Plan {
            observation: observation.clone(),
            candidates,
            steps: truncated,
        })
    }

    fn effective_priority(&self, tool: &str, base: u32) -> u32 {
        self.config
            .priority_overrides
            .get(tool)
            .copied()
            .unwrap_or(base)
    }

    fn step_from_library(
        &self,
        static_step: &StaticStep,
        observation: &Observation,
        seq: &mut usize,
    ) -> InvestigationStep {
        InvestigationStep {
            id: next_id(seq, &static_step.tool),
            tool: static_step.tool.clone(),
            params: context_params(observation),
            priority: self.effective_priority(&static_step.tool, static_step.priority_score),
            depends_on: Vec::new(),
            status: StepStatus::Pending,
            rationale: None,
            expected_outcome: Some(static_step.expected_outcome.clone()),
            origin: StepOrigin::Static,
        }
    }

    fn dependency_table(&self) -> Vec<(String, String)> {
        let mut table: Vec<(String, String)> = TOOL_DEPENDENCIES
            .iter()
            .map(|(a, b)| ((*a).to_string(), (*b).to_string()))
            .collect();
        table.extend(self.config.extra_dependencies.iter().cloned());
        table
    }
}

fn dependencies_of(table: &[(String, String)], tool: &str) -> Vec<String> {
    table
        .iter()
        .filter(|(dependent, _)| dependent == tool)
        .map(|(_, dependency)| dependency.clone())
        .collect()
}

fn next_id(seq: &mut usize, tool: &str) -> String {
    *seq += 1;
    format!("step-{seq:02}-{tool}")
}

/// Parameters every library step receives: whatever structured context the
/// observation carries.
fn context_params(observation: &Observation) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for key in ["node", "pod", "volume"] {
        if let Some(value) = observation.context_value(key) {
            params.insert(key.to_string(), value.to_string());
        }
    }
    params
}

/// Tool identifiers are lowercase snake case; anything else in the corpus
/// is prose, not a call.
static TOOL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"));

/// `key={placeholder}` or `key=literal` parameter pairs.
static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<key>[A-Za-z0-9_]+)=(?:\{(?P<placeholder>[A-Za-z0-9_]+)\}|(?P<literal>[^\s,()]+))")
        .expect("valid regex")
});

/// Parse a corpus tool-call template into a tool identifier and params.
///
/// Accepts `tool_name key={placeholder} other=literal` and the equivalent
/// function syntax `tool_name(key={placeholder})`. Placeholders resolve
/// from the observation context; unresolved ones are omitted.
fn parse_tool_call(
    text: &str,
    observation: &Observation,
) -> Option<(String, BTreeMap<String, String>)> {
    let normalized = text.replace(['(', ')', ','], " ");
    let tool = normalized.split_whitespace().next()?;
    if !TOOL_NAME_RE.is_match(tool) {
        return None;
    }

    let mut params = BTreeMap::new();
    for caps in PARAM_RE.captures_iter(&normalized) {
        let key = caps["key"].to_string();
        if let Some(placeholder) = caps.name("placeholder") {
            if let Some(resolved) = observation.context_value(placeholder.as_str()) {
                params.insert(key, resolved.to_string());
            }
        } else if let Some(literal) = caps.name("literal") {
            params.insert(key, literal.as_str().to_string());
        }
    }

    Some((tool.to_string(), params))
}

/// Drop steps sharing a `(tool, params)` signature, keeping the
/// higher-priority instance (earlier instance on equal priority), and
/// remap dependency edges onto the survivors.
fn dedup_by_signature(steps: Vec<InvestigationStep>) -> Vec<InvestigationStep> {
    let mut survivor_by_signature: HashMap<String, usize> = HashMap::new();
    let mut id_remap: HashMap<String, String> = HashMap::new();
    let mut kept: Vec<InvestigationStep> = Vec::new();

    for step in steps {
        let signature = step.signature();
        match survivor_by_signature.get(&signature) {
            Some(&kept_idx) if kept[kept_idx].priority >= step.priority => {
                id_remap.insert(step.id, kept[kept_idx].id.clone());
            }
            Some(&kept_idx) => {
                // Later instance wins on priority; keep its priority but the
                // original slot so ordering input stays stable.
                id_remap.insert(step.id.clone(), kept[kept_idx].id.clone());
                kept[kept_idx].priority = step.priority;
            }
            None => {
                survivor_by_signature.insert(signature, kept.len());
                kept.push(step);
            }
        }
    }

    for step in &mut kept {
        let own_id = step.id.clone();
        let mut seen = HashSet::new();
        step.depends_on = step
            .depends_on
            .iter()
            .map(|dep| id_remap.get(dep).unwrap_or(dep).clone())
            .filter(|dep| *dep != own_id && seen.insert(dep.clone()))
            .collect();
    }
    kept
}

/// Kahn's algorithm; within each dependency-free frontier the
/// highest-priority step dispatches first, ties broken by insertion order.
fn topological_order(steps: Vec<InvestigationStep>) -> Result<Vec<InvestigationStep>, PlanError> {
    let index_of: HashMap<String, usize> = steps
        .iter()
        .enumerate()
        .map(|(idx, s)| (s.id.clone(), idx))
        .collect();

    let mut indegree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (idx, step) in steps.iter().enumerate() {
        for dep in &step.depends_on {
            if let Some(&dep_idx) = index_of.get(dep) {
                indegree[idx] += 1;
                dependents[dep_idx].push(idx);
            }
        }
    }

    let mut ready: Vec<usize> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(idx, _)| idx)
        .collect();
    let mut ordered: Vec<usize> = Vec::with_capacity(steps.len());

    while !ready.is_empty() {
        let best = ready
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                steps[**a]
                    .priority
                    .cmp(&steps[**b].priority)
                    .then_with(|| b.cmp(a)) // lower insertion index wins ties
            })
            .map(|(pos, _)| pos)
            .unwrap_or(0);
        let idx = ready.remove(best);
        ordered.push(idx);
        for &dependent in &dependents[idx] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.push(dependent);
            }
        }
    }

    if ordered.len() != steps.len() {
        let mut tools: Vec<String> = steps
            .iter()
            .enumerate()
            .filter(|(idx, _)| !ordered.contains(idx))
            .map(|(_, s)| s.tool.clone())
            .collect();
        tools.sort();
        tools.dedup();
        return Err(PlanError::DependencyCycle { tools });
    }

    let mut by_position: Vec<(usize, InvestigationStep)> =
        steps.into_iter().enumerate().collect();
    by_position.sort_by_key(|(idx, _)| {
        ordered
            .iter()
            .position(|o| o == idx)
            .unwrap_or(usize::MAX)
    });
    Ok(by_position.into_iter().map(|(_, s)| s).collect())
}

/// Keep the highest-priority steps up to `max_steps`, always retaining a
/// kept step's transitive dependencies, then restore execution order.
fn truncate(ordered: Vec<InvestigationStep>, max_steps: usize) -> Vec<InvestigationStep> {
    if ordered.len() <= max_steps {
        return ordered;
    }

    let index_of: HashMap<String, usize> = ordered
        .iter()
        .enumerate()
        .map(|(idx, s)| (s.id.clone(), idx))
        .collect();

    let mut selection: Vec<usize> = (0..ordered.len()).collect();
    selection.sort_by(|a, b| {
        ordered[*b]
            .priority
            .cmp(&ordered[*a].priority)
            .then_with(|| a.cmp(b))
    });

    let mut kept: HashSet<usize> = HashSet::new();
    for idx in selection {
        if kept.contains(&idx) {
            continue;
        }
        // Transitive dependency closure of this step.
        let mut closure: Vec<usize> = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            if kept.contains(&current) || closure.contains(&current) {
                continue;
            }
            closure.push(current);
            for dep in &ordered[current].depends_on {
                if let Some(&dep_idx) = index_of.get(dep) {
                    stack.push(dep_idx);
                }
            }
        }
        if kept.len() + closure.len() <= max_steps {
            kept.extend(closure);
        }
    }

    ordered
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| kept.contains(idx))
        .map(|(_, s)| s)
        .collect()
}
