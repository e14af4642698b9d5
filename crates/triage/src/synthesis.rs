//! Diagnosis synthesis from candidates and collected evidence.
//!
//! Pure functions of their inputs: the same observation, candidates,
//! steps and evidence always produce the identical diagnosis, and
//! re-running synthesis never changes the answer.

use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

use crate::config::SynthesisConfig;
use crate::matcher::{tokenize, RankedMatch};
use crate::planner::{InvestigationStep, StepOrigin};
use crate::types::{
    Diagnosis, DiagnosisCategory, Evidence, EvidenceStatus, Observation, SupportingItem,
};

/// Markers in disk-identity payloads that reveal virtualized hardware.
static VIRTUAL_MARKERS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    vec!["virtual", "qemu", "vmware", "virtualbox", "kvm", "hyper-v", "xen"]
});

/// Markers in a record's resolution text that mean a human has to act.
static MANUAL_MARKERS: LazyLock<Vec<&'static str>> =
    LazyLock::new(|| vec!["manual", "by hand", "operator", "escalate", "contact"]);

/// Stock explanation for the virtualized-hardware special case.
const VIRTUAL_ROOT_CAUSE: &str = "Virtualized storage hardware: SMART and volume-health \
     telemetry is not exposed by virtual disks, so its absence here is expected";

/// Interim check the executor consults after every success: does the
/// evidence already settle the leading hypothesis?
///
/// True when virtualized hardware was detected (which refutes every
/// physical-disk hypothesis) or when a record-derived step produced a
/// conclusive finding for the leading candidate.
#[must_use]
pub fn settles(
    candidates: &[RankedMatch],
    steps: &[InvestigationStep],
    evidence: &[Evidence],
) -> bool {
    if evidence.iter().any(is_virtual_hardware) {
        return true;
    }
    if candidates.is_empty() {
        return false;
    }
    let origin_of = origin_index(steps);
    evidence.iter().any(|e| {
        e.status == EvidenceStatus::Conclusive
            && matches!(
                origin_of.get(e.step_id.as_str()),
                Some(StepOrigin::Experience { candidate: 0 })
            )
    })
}

/// Synthesizes the final diagnosis.
pub struct Synthesizer {
    config: SynthesisConfig,
}

impl Synthesizer {
    /// Create a synthesizer with the given settings.
    #[must_use]
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    /// Combine candidates and evidence into a diagnosis.
    ///
    /// Deterministic and idempotent: no clock, no randomness, no state.
    #[must_use]
    pub fn synthesize(
        &self,
        observation: &Observation,
        candidates: &[RankedMatch],
        steps: &[InvestigationStep],
        evidence: &[Evidence],
    ) -> Diagnosis {
        // Virtualized hardware trumps everything else: the symptom is
        // expected behavior, not a fault.
        let virtual_items: Vec<&Evidence> = evidence
            .iter()
            .filter(|e| is_virtual_hardware(e))
            .collect();
        if !virtual_items.is_empty() {
            return Diagnosis {
                observation: observation.clone(),
                category: DiagnosisCategory::InformationalNormal,
                confidence: self.config.virtual_confidence,
                root_cause: Some(VIRTUAL_ROOT_CAUSE.to_string()),
                supporting: virtual_items
                    .iter()
                    .map(|e| SupportingItem::from_evidence(e))
                    .collect(),
                resolution_steps: vec!["report finding to user".to_string()],
                needs_user_action: false,
            };
        }

        let conclusive: Vec<&Evidence> = evidence
            .iter()
            .filter(|e| e.status == EvidenceStatus::Conclusive)
            .collect();
        if conclusive.is_empty() {
            debug!("no conclusive evidence, diagnosis is inconclusive");
            return Diagnosis {
                observation: observation.clone(),
                category: DiagnosisCategory::Inconclusive,
                confidence: 0.0,
                root_cause: None,
                supporting: evidence.iter().map(SupportingItem::from_evidence).collect(),
                resolution_steps: vec![
                    "Escalate to the storage on-call for manual diagnosis".to_string(),
                ],
                needs_user_action: true,
            };
        }

        // Attribute each conclusive item to the candidates it confirms.
        let origin_of = origin_index(steps);
        let mut confirming: Vec<Vec<&Evidence>> = vec![Vec::new(); candidates.len()];
        for &item in &conclusive {
            for (idx, candidate) in candidates.iter().enumerate() {
                if confirms(item, &origin_of, idx, candidate) {
                    confirming[idx].push(item);
                }
            }
        }

        // Rank hypotheses by confirmation count; candidate rank breaks ties.
        let mut ranked: Vec<usize> = (0..candidates.len()).collect();
        ranked.sort_by(|a, b| confirming[*b].len().cmp(&confirming[*a].len()).then(a.cmp(b)));

        let leader = ranked.first().copied().filter(|i| !confirming[*i].is_empty());
        let Some(leader) = leader else {
            // Conclusive findings that confirm no known record still rate a
            // diagnosis attempt; hand the finding itself to the operator.
            return evidence_only_diagnosis(observation, &conclusive, evidence);
        };

        let leader_count = confirming[leader].len();
        let runner_up = ranked
            .iter()
            .skip(1)
            .copied()
            .find(|i| !confirming[*i].is_empty());
        if let Some(runner_up) = runner_up {
            let ratio = confirming[runner_up].len() as f32 / leader_count as f32;
            if ratio >= 1.0 - self.config.ambiguity_margin {
                debug!(
                    leader = %candidates[leader].record.root_cause,
                    runner_up = %candidates[runner_up].record.root_cause,
                    "comparable support for multiple root causes"
                );
                return ambiguous_diagnosis(
                    observation,
                    candidates,
                    &ranked,
                    &confirming,
                    &conclusive,
                );
            }
        }

        let record = &candidates[leader].record;
        let needs_user_action = requires_manual_action(&record.resolution);
        let category = if needs_user_action {
            DiagnosisCategory::ManualActionRequired
        } else {
            DiagnosisCategory::AutomatedResolutionAvailable
        };
        let confidence = (leader_count as f32 / conclusive.len() as f32).clamp(0.0, 1.0);

        debug!(
            root_cause = %record.root_cause,
            category = %category,
            confidence,
            "diagnosis synthesized"
        );
        Diagnosis {
            observation: observation.clone(),
            category,
            confidence,
            root_cause: Some(record.root_cause.clone()),
            supporting: confirming[leader]
                .iter()
                .map(|e| SupportingItem::from_evidence(e))
                .collect(),
            resolution_steps: record.resolution.clone(),
            needs_user_action,
        }
    }
}

/// A conclusive finding with no matching record: name the finding, ask
/// a human to take it from there.
fn evidence_only_diagnosis(
    observation: &Observation,
    conclusive: &[&Evidence],
    all_evidence: &[Evidence],
) -> Diagnosis {
    let best = conclusive[0];
    let root_cause = best.finding().unwrap_or(&best.summary).to_string();
    Diagnosis {
        observation: observation.clone(),
        category: DiagnosisCategory::ManualActionRequired,
        confidence: (conclusive.len() as f32 / all_evidence.len().max(1) as f32).clamp(0.0, 1.0),
        root_cause: Some(root_cause),
        supporting: conclusive
            .iter()
            .map(|e| SupportingItem::from_evidence(e))
            .collect(),
        resolution_steps: vec!["Review the finding and remediate manually".to_string()],
        needs_user_action: true,
    }
}

/// Multiple candidates remain plausible: surface them all, ranked, rather
/// than silently picking one.
fn ambiguous_diagnosis(
    observation: &Observation,
    candidates: &[RankedMatch],
    ranked: &[usize],
    confirming: &[Vec<&Evidence>],
    conclusive: &[&Evidence],
) -> Diagnosis {
    let hypotheses: Vec<SupportingItem> = ranked
        .iter()
        .filter(|i| !confirming[**i].is_empty())
        .map(|i| SupportingItem::Hypothesis {
            root_cause: candidates[*i].record.root_cause.clone(),
            score: (confirming[*i].len() as f32 / conclusive.len() as f32).clamp(0.0, 1.0),
            evidence: confirming[*i].iter().map(|e| e.step_id.clone()).collect(),
        })
        .collect();

    Diagnosis {
        observation: observation.clone(),
        category: DiagnosisCategory::Inconclusive,
        confidence: 0.0,
        root_cause: None,
        supporting: hypotheses,
        resolution_steps: vec!["Escalate: multiple root causes remain plausible".to_string()],
        needs_user_action: true,
    }
}

fn origin_index(steps: &[InvestigationStep]) -> HashMap<&str, StepOrigin> {
    steps.iter().map(|s| (s.id.as_str(), s.origin)).collect()
}

/// Does this conclusive item confirm the given candidate?
///
/// Record-derived steps confirm the record they came from; a library
/// step's finding confirms a candidate when it shares vocabulary with the
/// candidate's root cause.
fn confirms(
    item: &Evidence,
    origin_of: &HashMap<&str, StepOrigin>,
    candidate_idx: usize,
    candidate: &RankedMatch,
) -> bool {
    if item.status != EvidenceStatus::Conclusive {
        return false;
    }
    match origin_of.get(item.step_id.as_str()) {
        Some(StepOrigin::Experience { candidate }) => *candidate == candidate_idx,
        Some(StepOrigin::Static) => {
            finding_matches(item, &candidate.record.root_cause)
        }
        None => false,
    }
}

/// A library finding backs a root cause when the two share at least two
/// tokens of vocabulary.
fn finding_matches(item: &Evidence, root_cause: &str) -> bool {
    let mut finding_text = item.summary.clone();
    if let Some(finding) = item.finding() {
        finding_text.push(' ');
        finding_text.push_str(finding);
    }
    let finding_tokens: std::collections::HashSet<String> =
        tokenize(&finding_text).into_iter().collect();
    let cause_tokens: std::collections::HashSet<String> =
        tokenize(root_cause).into_iter().collect();
    finding_tokens.intersection(&cause_tokens).count() >= 2
}

/// Whether evidence reveals the backing hardware is virtualized.
fn is_virtual_hardware(evidence: &Evidence) -> bool {
    let mut haystacks: Vec<String> = vec![evidence.summary.to_lowercase()];
    for key in ["vendor", "model", "product"] {
        if let Some(value) = evidence.payload.get(key).and_then(|v| v.as_str()) {
            haystacks.push(value.to_lowercase());
        }
    }
    if let Some(finding) = evidence.finding() {
        haystacks.push(finding.to_lowercase());
    }
    haystacks
        .iter()
        .any(|h| VIRTUAL_MARKERS.iter().any(|marker| h.contains(marker)))
}

/// Whether resolution text asks a human to act.
fn requires_manual_action(resolution: &[String]) -> bool {
    resolution.iter().any(|step| {
        let step = step.to_lowercase();
        MANUAL_MARKERS.iter().any(|marker| step.contains(marker))
    })
}
