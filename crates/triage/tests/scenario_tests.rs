//! End-to-end triage scenarios.
//!
//! Drives the full pipeline - match, plan, execute, synthesize - against a
//! scripted tool broker and a small but realistic corpus: disk failure
//! confirmed by SMART data, virtualized hardware, capacity exhaustion that
//! needs an operator, and a novel symptom with no matching record.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use triage::{
    DiagnosisCategory, EngineConfig, KnowledgeStore, Observation, PlanBuilder, PlannerConfig,
    StepOrigin, Strictness, SupportingItem, ToolBroker, ToolCall, ToolError, ToolOutcome,
    TriageEngine,
};

const EXPERIENCE_YAML: &str = r#"
- phenomenon: Volume read errors in pod logs
  root_cause: Physical disk failure on the backing device
  localization_method:
    - tool_call: disk_identity_query node={node}
      rationale: Identify the backing device behind the volume
    - tool_call: disk_health_check node={node}
      rationale: SMART attributes reveal physical degradation
  resolution_method:
    - Cordon the node and migrate the volume to a healthy device

- phenomenon: PVC reports insufficient capacity
  root_cause: PersistentVolumeClaim capacity exhausted
  localization_method:
    - tool_call: capacity_usage_check volume={volume}
      rationale: Confirm usage against the claim size
  resolution_method:
    - Extend the claim manually via the storage class
"#;

const STATIC_STEPS_YAML: &str = r#"
- description: Search the internet for missing information
  tool: web_research
  expected: Relevant context located
  priority: critical
  priority_score: 999

- description: Resolve the mount path for the volume
  tool: resolve_mount_path
  expected: Mount path resolved
  priority: high
  priority_score: 65

- description: Query the identity of the backing disk
  tool: disk_identity_query
  expected: Physical device identified
  priority: hgih
  priority_score: 55

- description: Check network connectivity to the node
  tool: network_connectivity_check
  expected: Node reachable
  priority: medium
  priority_score: 45

- description: Query recent pod logs
  tool: query_pod_logs
  expected: No volume errors present
  priority: medium
  priority_score: 40
"#;

/// Broker scripted per tool name; unknown tools succeed with no finding.
#[derive(Default)]
struct ScenarioBroker {
    outcomes: HashMap<&'static str, ToolOutcome>,
}

impl ScenarioBroker {
    fn with(mut self, tool: &'static str, outcome: ToolOutcome) -> Self {
        self.outcomes.insert(tool, outcome);
        self
    }
}

#[async_trait]
impl ToolBroker for ScenarioBroker {
    async fn invoke(&self, call: &ToolCall) -> Result<ToolOutcome, ToolError> {
        Ok(self
            .outcomes
            .get(call.tool.as_str())
            .cloned()
            .unwrap_or_else(|| ToolOutcome::success(json!({"checked": true}), "nominal")))
    }
}

fn store() -> Arc<KnowledgeStore> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    Arc::new(
        KnowledgeStore::from_yaml(EXPERIENCE_YAML, STATIC_STEPS_YAML, Strictness::Lenient)
            .expect("corpus loads"),
    )
}

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    // One worker and tight backoff keep the scripted runs deterministic.
    config.executor.concurrency = 1;
    config.executor.initial_backoff = Duration::from_millis(1);
    config.executor.max_backoff = Duration::from_millis(4);
    config
}

#[tokio::test]
async fn scenario_disk_failure_offers_automated_resolution() {
    let broker = Arc::new(
        ScenarioBroker::default()
            .with(
                "disk_health_check",
                ToolOutcome::success(
                    json!({"finding": "SMART reallocated sector count rising", "smart_health": "FAILED"}),
                    "SMART reports degradation",
                ),
            )
            .with(
                "disk_identity_query",
                ToolOutcome::success(
                    json!({"vendor": "Seagate", "model": "ST4000NM000A"}),
                    "physical device identified",
                ),
            ),
    );
    let engine = TriageEngine::new(store(), broker, config());

    let diagnosis = engine
        .investigate(Observation::new("I/O error reading pod logs").with_node("node-3"))
        .await
        .expect("plan builds");

    assert_eq!(
        diagnosis.category,
        DiagnosisCategory::AutomatedResolutionAvailable
    );
    assert!(diagnosis
        .root_cause
        .as_deref()
        .unwrap()
        .contains("disk failure"));
    assert!(diagnosis.confidence > 0.5);
    assert!(!diagnosis.needs_user_action);
    assert!(diagnosis.supporting.iter().any(|item| matches!(
        item,
        SupportingItem::Evidence { tool, .. } if tool == "disk_health_check"
    )));
}

#[tokio::test]
async fn scenario_virtual_hardware_is_informational() {
    let broker = Arc::new(ScenarioBroker::default().with(
        "disk_identity_query",
        ToolOutcome::success(
            json!({"vendor": "VMware", "model": "Virtual disk"}),
            "disk identity resolved",
        ),
    ));
    let engine = TriageEngine::new(store(), broker, config());

    let diagnosis = engine
        .investigate(Observation::new("Volume read errors in pod logs").with_node("node-7"))
        .await
        .expect("plan builds");

    assert_eq!(diagnosis.category, DiagnosisCategory::InformationalNormal);
    assert!(diagnosis.confidence >= 0.9);
    assert_eq!(
        diagnosis.resolution_steps,
        vec!["report finding to user".to_string()]
    );
    assert!(!diagnosis.needs_user_action);
}

#[tokio::test]
async fn scenario_capacity_exhaustion_requires_operator() {
    let broker = Arc::new(
        ScenarioBroker::default()
            .with(
                "capacity_usage_check",
                ToolOutcome::success(
                    json!({"finding": "volume 98% full", "used_bytes": 10603200512u64}),
                    "claim nearly exhausted",
                ),
            )
            .with(
                "resolve_mount_path",
                ToolOutcome::success(
                    json!({"mount_path": "/var/lib/kubelet/pods/a1/volumes/pvc-data-1"}),
                    "mount path resolved",
                ),
            ),
    );
    let engine = TriageEngine::new(store(), broker, config());

    let diagnosis = engine
        .investigate(
            Observation::new("PVC reports insufficient capacity").with_volume("pvc-data-1"),
        )
        .await
        .expect("plan builds");

    assert_eq!(diagnosis.category, DiagnosisCategory::ManualActionRequired);
    assert!(diagnosis.needs_user_action);
    assert!(diagnosis
        .root_cause
        .as_deref()
        .unwrap()
        .contains("capacity exhausted"));
    // The record's remedy is the manual one; nothing automated is proposed.
    assert!(diagnosis
        .resolution_steps
        .iter()
        .all(|step| step.to_lowercase().contains("manual")));
}

#[tokio::test]
async fn scenario_novel_symptom_falls_back_to_generic_plan() {
    let store = store();

    // The plan itself: static steps only, highest score first.
    let builder = PlanBuilder::new(PlannerConfig::default());
    let observation = Observation::new("CSI controller restarting repeatedly during provisioning");
    let plan = builder
        .build(&observation, vec![], &store)
        .expect("plan builds");

    assert!(plan.steps.iter().all(|s| s.origin == StepOrigin::Static));
    assert_eq!(plan.steps[0].tool, "web_research");
    let priorities: Vec<u32> = plan.steps.iter().map(|s| s.priority).collect();
    let mut sorted = priorities.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(priorities, sorted);

    // End to end: nothing conclusive, so the diagnosis stays inconclusive.
    let broker = Arc::new(ScenarioBroker::default());
    let engine = TriageEngine::new(store, broker, config());
    let diagnosis = engine.investigate(observation).await.expect("plan builds");

    assert_eq!(diagnosis.category, DiagnosisCategory::Inconclusive);
    assert!(diagnosis.confidence.abs() < f32::EPSILON);
    assert!(diagnosis.root_cause.is_none());
}

#[tokio::test]
async fn research_priority_can_be_capped_by_config() {
    let mut engine_config = config();
    engine_config
        .planner
        .priority_overrides
        .insert("web_research".to_string(), 10);

    let builder = PlanBuilder::new(engine_config.planner.clone());
    let plan = builder
        .build(
            &Observation::new("CSI controller restarting repeatedly"),
            vec![],
            &store(),
        )
        .expect("plan builds");

    assert_ne!(plan.steps[0].tool, "web_research");
    assert_eq!(plan.steps.last().unwrap().tool, "web_research");
}

#[tokio::test]
async fn repeated_investigations_are_identical() {
    let broker = Arc::new(ScenarioBroker::default().with(
        "disk_health_check",
        ToolOutcome::success(
            json!({"finding": "SMART reallocated sector count rising"}),
            "SMART reports degradation",
        ),
    ));
    let engine = TriageEngine::new(store(), broker, config());
    let observation = Observation::new("I/O error reading pod logs").with_node("node-3");

    let first = engine
        .investigate(observation.clone())
        .await
        .expect("plan builds");
    let first = serde_json::to_value(&first).expect("serializes");

    for _ in 0..3 {
        let again = engine
            .investigate(observation.clone())
            .await
            .expect("plan builds");
        let again = serde_json::to_value(&again).expect("serializes");
        assert_eq!(first, again);
    }
}

#[tokio::test]
async fn tool_failures_degrade_to_inconclusive_diagnosis() {
    // Every tool fails permanently; the caller still gets a structured
    // diagnosis rather than an error.
    #[derive(Default)]
    struct FailingBroker;

    #[async_trait]
    impl ToolBroker for FailingBroker {
        async fn invoke(&self, _call: &ToolCall) -> Result<ToolOutcome, ToolError> {
            Ok(ToolOutcome::failure("instrumentation unreachable"))
        }
    }

    let engine = TriageEngine::new(store(), Arc::new(FailingBroker), config());
    let diagnosis = engine
        .investigate(Observation::new("I/O error reading pod logs").with_node("node-3"))
        .await
        .expect("plan builds");

    assert_eq!(diagnosis.category, DiagnosisCategory::Inconclusive);
    assert!(diagnosis.confidence.abs() < f32::EPSILON);
    assert!(diagnosis.needs_user_action);
}
