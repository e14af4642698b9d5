//! Plain-text rendering of a diagnosis for operator consumption.

use std::fmt::Write;

use crate::types::{Diagnosis, SupportingItem};

/// Render a diagnosis as a sectioned text report.
#[must_use]
pub fn render(diagnosis: &Diagnosis) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== TRIAGE REPORT ===");
    let _ = writeln!(out, "Symptom: {}", diagnosis.observation.text);
    if let Some(node) = &diagnosis.observation.node {
        let _ = writeln!(out, "Node: {node}");
    }
    if let Some(pod) = &diagnosis.observation.pod {
        let _ = writeln!(out, "Pod: {pod}");
    }
    if let Some(volume) = &diagnosis.observation.volume {
        let _ = writeln!(out, "Volume: {volume}");
    }

    let _ = writeln!(out, "Category: {}", diagnosis.category);
    let _ = writeln!(out, "Confidence: {:.0}%", diagnosis.confidence * 100.0);
    if let Some(root_cause) = &diagnosis.root_cause {
        let _ = writeln!(out, "Root cause: {root_cause}");
    }

    let evidence: Vec<&SupportingItem> = diagnosis
        .supporting
        .iter()
        .filter(|item| matches!(item, SupportingItem::Evidence { .. }))
        .collect();
    if !evidence.is_empty() {
        let _ = writeln!(out, "Evidence:");
        for item in evidence {
            if let SupportingItem::Evidence {
                tool,
                status,
                summary,
                ..
            } = item
            {
                let _ = writeln!(out, "  - [{status}] {tool}: {summary}");
            }
        }
    }

    let hypotheses: Vec<&SupportingItem> = diagnosis
        .supporting
        .iter()
        .filter(|item| matches!(item, SupportingItem::Hypothesis { .. }))
        .collect();
    if !hypotheses.is_empty() {
        let _ = writeln!(out, "Hypotheses:");
        for (rank, item) in hypotheses.iter().enumerate() {
            if let SupportingItem::Hypothesis {
                root_cause, score, ..
            } = item
            {
                let _ = writeln!(out, "  {}. {root_cause} (score {score:.2})", rank + 1);
            }
        }
    }

    if !diagnosis.resolution_steps.is_empty() {
        let _ = writeln!(out, "Resolution:");
        for (idx, step) in diagnosis.resolution_steps.iter().enumerate() {
            let _ = writeln!(out, "  {}. {step}", idx + 1);
        }
    }
    if diagnosis.needs_user_action {
        let _ = writeln!(out, "Action required: yes");
    }
    let _ = writeln!(out, "=== END REPORT ===");

    out
}
