//! Plan execution against tool collaborators.
//!
//! Runs a bounded worker pool over the plan's steps, gating dependents on
//! their dependencies, retrying transient failures with backoff, and
//! wrapping every outcome - good or bad - as evidence. Tool trouble never
//! aborts an investigation; it degrades into inconclusive or error
//! evidence and synthesis works with whatever was collected.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::planner::{InvestigationStep, Plan, StepStatus};
use crate::synthesis;
use crate::tool::{ToolBroker, ToolCall, ToolError, ToolOutcome, ToolStatus};
use crate::types::{Evidence, EvidenceStatus};

/// Everything execution produced: the plan with final step statuses plus
/// the collected evidence set.
#[derive(Debug)]
pub struct InvestigationOutcome {
    /// The plan, with every step in a terminal status.
    pub plan: Plan,
    /// Evidence keyed by step id, in completion order.
    pub evidence: Vec<Evidence>,
    /// Whether a global budget cut the investigation short.
    pub budget_exhausted: bool,
}

struct StepCompletion {
    step_id: String,
    attempts: u32,
    result: Result<ToolOutcome, ToolError>,
}

/// Drives one plan to completion against the tool broker.
pub struct InvestigationExecutor {
    broker: Arc<dyn ToolBroker>,
    config: ExecutorConfig,
}

impl InvestigationExecutor {
    /// Create an executor over the given broker.
    #[must_use]
    pub fn new(broker: Arc<dyn ToolBroker>, config: ExecutorConfig) -> Self {
        Self { broker, config }
    }

    /// Execute the plan and collect evidence.
    ///
    /// Ready steps dispatch in priority order up to the concurrency limit;
    /// completion order is whatever tool latencies make it. After each
    /// success the interim synthesis heuristic may declare the evidence
    /// settled, which skips everything still pending.
    pub async fn run(&self, mut plan: Plan) -> InvestigationOutcome {
        let started = Instant::now();
        let mut evidence: Vec<Evidence> = Vec::new();
        let mut in_flight: JoinSet<StepCompletion> = JoinSet::new();
        let mut dispatched = 0usize;
        let mut settled = false;
        let mut budget_exhausted = false;

        loop {
            propagate_dependency_skips(&mut plan.steps, &mut evidence);

            if !budget_exhausted
                && (started.elapsed() >= self.config.max_wall_clock
                    || dispatched >= self.config.max_executed_steps)
                && plan.steps.iter().any(|s| s.status == StepStatus::Pending)
            {
                warn!(
                    dispatched,
                    elapsed_secs = started.elapsed().as_secs(),
                    "investigation budget exhausted"
                );
                budget_exhausted = true;
            }

            if !settled && !budget_exhausted {
                while in_flight.len() < self.config.concurrency.max(1)
                    && dispatched < self.config.max_executed_steps
                {
                    let Some(idx) = next_ready(&plan.steps) else {
                        break;
                    };
                    plan.steps[idx].status = StepStatus::Running;
                    dispatched += 1;
                    debug!(
                        step = %plan.steps[idx].id,
                        tool = %plan.steps[idx].tool,
                        "dispatching step"
                    );

                    let call = ToolCall {
                        tool: plan.steps[idx].tool.clone(),
                        params: plan.steps[idx].params.clone(),
                        timeout: self.config.step_timeout,
                    };
                    let step_id = plan.steps[idx].id.clone();
                    let broker = Arc::clone(&self.broker);
                    let config = self.config.clone();
                    in_flight.spawn(async move {
                        let (attempts, result) = invoke_with_retry(&*broker, &call, &config).await;
                        StepCompletion {
                            step_id,
                            attempts,
                            result,
                        }
                    });
                }
            }

            if in_flight.is_empty() {
                if settled || budget_exhausted {
                    skip_pending(&mut plan.steps);
                    break;
                }
                if next_ready(&plan.steps).is_none() {
                    // Nothing running and nothing dispatchable; whatever is
                    // left cannot make progress.
                    skip_pending(&mut plan.steps);
                    break;
                }
                continue;
            }

            let Some(joined) = in_flight.join_next().await else {
                continue;
            };
            let completion = match joined {
                Ok(completion) => completion,
                Err(join_error) => {
                    warn!(error = %join_error, "step task aborted");
                    continue;
                }
            };
            let Some(idx) = plan
                .steps
                .iter()
                .position(|s| s.id == completion.step_id)
            else {
                continue;
            };

            match completion.result {
                Ok(outcome) if outcome.status == ToolStatus::Success => {
                    plan.steps[idx].status = StepStatus::Succeeded;
                    let status = if outcome.has_finding() {
                        EvidenceStatus::Conclusive
                    } else {
                        EvidenceStatus::Inconclusive
                    };
                    debug!(step = %plan.steps[idx].id, status = %status, "step succeeded");
                    evidence.push(Evidence {
                        step_id: completion.step_id,
                        tool: plan.steps[idx].tool.clone(),
                        status,
                        payload: outcome.payload,
                        summary: outcome.summary,
                        attempts: completion.attempts,
                        captured_at: Utc::now(),
                    });

                    if !settled && synthesis::settles(&plan.candidates, &plan.steps, &evidence) {
                        info!(
                            step = %plan.steps[idx].id,
                            "evidence settles the leading hypothesis, stopping early"
                        );
                        settled = true;
                    }
                }
                Ok(outcome) => {
                    plan.steps[idx].status = StepStatus::Failed;
                    warn!(
                        step = %plan.steps[idx].id,
                        tool_status = %outcome.status,
                        "step failed"
                    );
                    evidence.push(Evidence {
                        step_id: completion.step_id,
                        tool: plan.steps[idx].tool.clone(),
                        status: EvidenceStatus::Error,
                        payload: outcome.payload,
                        summary: outcome.summary,
                        attempts: completion.attempts,
                        captured_at: Utc::now(),
                    });
                }
                Err(error) => {
                    plan.steps[idx].status = StepStatus::Failed;
                    warn!(step = %plan.steps[idx].id, error = %error, "step errored");
                    evidence.push(Evidence {
                        step_id: completion.step_id,
                        tool: plan.steps[idx].tool.clone(),
                        status: EvidenceStatus::Error,
                        payload: serde_json::Value::Null,
                        summary: error.to_string(),
                        attempts: completion.attempts,
                        captured_at: Utc::now(),
                    });
                }
            }
        }

        info!(
            executed = dispatched,
            evidence = evidence.len(),
            budget_exhausted,
            "execution finished"
        );
        InvestigationOutcome {
            plan,
            evidence,
            budget_exhausted,
        }
    }
}

/// Invoke a tool, retrying transient failures and timeouts with doubling
/// backoff up to the attempt limit. Returns the attempts spent alongside
/// the final result.
async fn invoke_with_retry(
    broker: &dyn ToolBroker,
    call: &ToolCall,
    config: &ExecutorConfig,
) -> (u32, Result<ToolOutcome, ToolError>) {
    let mut attempt = 0u32;
    let mut delay = config.initial_backoff;

    loop {
        attempt += 1;
        let result = match timeout(config.step_timeout, broker.invoke(call)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                tool: call.tool.clone(),
                timeout_secs: config.step_timeout.as_secs(),
            }),
        };

        let retryable = match &result {
            Ok(outcome) => outcome.status == ToolStatus::Timeout,
            Err(error) => error.is_retryable(),
        };
        if !retryable || attempt >= config.max_attempts {
            return (attempt, result);
        }

        debug!(
            tool = %call.tool,
            attempt,
            max_attempts = config.max_attempts,
            "retrying after transient failure"
        );
        sleep(delay).await;
        delay = (delay * 2).min(config.max_backoff);
    }
}

/// Highest-priority pending step whose dependencies all succeeded; ties go
/// to plan order.
fn next_ready(steps: &[InvestigationStep]) -> Option<usize> {
    let status_of: HashMap<&str, StepStatus> = steps
        .iter()
        .map(|s| (s.id.as_str(), s.status))
        .collect();

    steps
        .iter()
        .enumerate()
        .filter(|(_, s)| {
            s.status == StepStatus::Pending
                && s.depends_on
                    .iter()
                    .all(|dep| status_of.get(dep.as_str()) == Some(&StepStatus::Succeeded))
        })
        .max_by(|(a_idx, a), (b_idx, b)| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| b_idx.cmp(a_idx))
        })
        .map(|(idx, _)| idx)
}

/// Skip every pending step whose dependency failed or was skipped,
/// cascading until stable; each skip is recorded as inconclusive evidence.
fn propagate_dependency_skips(steps: &mut [InvestigationStep], evidence: &mut Vec<Evidence>) {
    loop {
        let status_of: HashMap<String, StepStatus> = steps
            .iter()
            .map(|s| (s.id.clone(), s.status))
            .collect();
        let tool_of: HashMap<String, String> = steps
            .iter()
            .map(|s| (s.id.clone(), s.tool.clone()))
            .collect();

        let Some(idx) = steps.iter().position(|s| {
            s.status == StepStatus::Pending
                && s.depends_on.iter().any(|dep| {
                    matches!(
                        status_of.get(dep),
                        Some(StepStatus::Failed | StepStatus::Skipped)
                    )
                })
        }) else {
            break;
        };

        let blocked_on = steps[idx]
            .depends_on
            .iter()
            .find(|dep| {
                matches!(
                    status_of.get(*dep),
                    Some(StepStatus::Failed | StepStatus::Skipped)
                )
            })
            .and_then(|dep| tool_of.get(dep))
            .cloned()
            .unwrap_or_default();

        steps[idx].status = StepStatus::Skipped;
        debug!(step = %steps[idx].id, dependency = %blocked_on, "skipping dependent step");
        evidence.push(Evidence {
            step_id: steps[idx].id.clone(),
            tool: steps[idx].tool.clone(),
            status: EvidenceStatus::Inconclusive,
            payload: serde_json::Value::Null,
            summary: format!("skipped: dependency `{blocked_on}` did not succeed"),
            attempts: 0,
            captured_at: Utc::now(),
        });
    }
}

fn skip_pending(steps: &mut [InvestigationStep]) {
    for step in steps.iter_mut().filter(|s| s.status == StepStatus::Pending) {
        step.status = StepStatus::Skipped;
    }
}
