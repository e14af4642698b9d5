//! Engine facade wiring the pipeline together.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::PlanError;
use crate::executor::InvestigationExecutor;
use crate::knowledge::KnowledgeStore;
use crate::matcher::SymptomMatcher;
use crate::planner::PlanBuilder;
use crate::synthesis::Synthesizer;
use crate::tool::ToolBroker;
use crate::types::{Diagnosis, Observation};

/// One engine instance per process: an immutable knowledge store, a tool
/// broker, and the pipeline components built from one configuration.
///
/// Investigations are independent; `investigate` may be called
/// concurrently and every call keeps its plan and evidence to itself,
/// discarding them once the diagnosis is returned.
pub struct TriageEngine {
    store: Arc<KnowledgeStore>,
    matcher: SymptomMatcher,
    planner: PlanBuilder,
    executor: InvestigationExecutor,
    synthesizer: Synthesizer,
}

impl TriageEngine {
    /// Wire an engine from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<KnowledgeStore>,
        broker: Arc<dyn ToolBroker>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            matcher: SymptomMatcher::new(&config.matcher),
            planner: PlanBuilder::new(config.planner.clone()),
            executor: InvestigationExecutor::new(broker, config.executor.clone()),
            synthesizer: Synthesizer::new(config.synthesis.clone()),
        }
    }

    /// Run one observation through match, plan, execute and synthesize.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] when the plan cannot be constructed (a
    /// dependency cycle). Every other problem - no matching record, tool
    /// failures, ambiguous evidence - degrades into the returned
    /// diagnosis instead of an error.
    pub async fn investigate(&self, observation: Observation) -> Result<Diagnosis, PlanError> {
        let investigation = Uuid::new_v4();
        info!(
            id = %investigation,
            symptom = %observation.text,
            "investigation started"
        );

        let candidates = self.matcher.rank(&observation, self.store.records());
        if candidates.is_empty() {
            info!(
                id = %investigation,
                "no record above threshold, planning from the generic library"
            );
        }

        let plan = self.planner.build(&observation, candidates, &self.store)?;
        info!(id = %investigation, steps = plan.steps.len(), "plan built");

        let outcome = self.executor.run(plan).await;
        let diagnosis = self.synthesizer.synthesize(
            &outcome.plan.observation,
            &outcome.plan.candidates,
            &outcome.plan.steps,
            &outcome.evidence,
        );

        info!(
            id = %investigation,
            category = %diagnosis.category,
            confidence = diagnosis.confidence,
            "investigation complete"
        );
        Ok(diagnosis)
    }
}
