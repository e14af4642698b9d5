//! Knowledge corpus loading and the immutable store.
//!
//! Two corpora feed the engine: historical experience records (symptom,
//! root cause, how it was localized, how it was resolved) and a library of
//! generic diagnostic steps. Both are validated once at load time and
//! frozen for the process lifetime; investigations read the store
//! concurrently without locks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::Strictness;
use crate::error::SchemaError;

/// Priority tier labels carried by the static step corpus.
///
/// Advisory metadata only - the numeric `priority_score` is authoritative
/// wherever the two disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    Medium,
    High,
    Critical,
}

impl PriorityTier {
    const KNOWN: &'static [(&'static str, Self)] = &[
        ("medium", Self::Medium),
        ("high", Self::High),
        ("critical", Self::Critical),
    ];

    /// Parse an exact (case-insensitive) tier label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        Self::KNOWN
            .iter()
            .find(|(name, _)| *name == label)
            .map(|(_, tier)| *tier)
    }

    /// Parse a tier label tolerating small misspellings.
    ///
    /// Returns the known tier within edit distance 2, if any. `None` means
    /// the label is unrecognizable and priority falls back to the numeric
    /// score alone.
    #[must_use]
    pub fn parse_lenient(label: &str) -> Option<Self> {
        if let Some(tier) = Self::parse(label) {
            return Some(tier);
        }
        let label = label.trim().to_lowercase();
        Self::KNOWN
            .iter()
            .map(|(name, tier)| (edit_distance(&label, name), *tier))
            .filter(|(distance, _)| *distance <= 2)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, tier)| tier)
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Classic Levenshtein distance; corpus tier labels are short so the
/// quadratic table is irrelevant.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Experience record as it appears in the corpus files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawExperienceRecord {
    #[serde(default)]
    pub phenomenon: String,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default)]
    pub localization_method: Vec<RawLocalizationStep>,
    #[serde(default)]
    pub resolution_method: Vec<String>,
}

/// One localization step as it appears in the corpus files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLocalizationStep {
    #[serde(default)]
    pub tool_call: String,
    #[serde(default)]
    pub rationale: String,
}

/// Static step as it appears in the corpus files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStaticStep {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub expected: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub priority_score: i64,
}

/// A validated historical incident record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceRecord {
    /// Symptom text the matcher scores observations against.
    pub phenomenon: String,
    /// Diagnosed root cause.
    pub root_cause: String,
    /// How the root cause was localized, in order.
    pub localization: Vec<LocalizationStep>,
    /// How the incident was resolved, in order.
    pub resolution: Vec<String>,
}

/// A validated localization step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizationStep {
    /// Tool invocation template, e.g. `disk_health_check node={node}`.
    pub tool_call: String,
    /// Why this step was taken.
    pub rationale: String,
}

/// A validated generic diagnostic step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticStep {
    /// What the step does.
    pub description: String,
    /// Capability identifier of the tool it invokes.
    pub tool: String,
    /// What a healthy system would show.
    pub expected_outcome: String,
    /// Advisory tier; `None` when the corpus label was unrecognizable.
    pub tier: Option<PriorityTier>,
    /// Authoritative urgency score, higher runs earlier.
    pub priority_score: u32,
}

/// Corpus shape summary, logged at load time.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub records: usize,
    pub static_steps: usize,
    /// Static step count per tier label (plus `unrecognized`).
    pub tiers: BTreeMap<String, usize>,
}

/// Immutable, loaded-once repository of both corpora.
///
/// No mutation API exists after [`KnowledgeStore::load`]; share it behind
/// an `Arc` and read freely from concurrent investigations.
#[derive(Debug)]
pub struct KnowledgeStore {
    records: Vec<ExperienceRecord>,
    static_steps: Vec<StaticStep>,
}

impl KnowledgeStore {
    /// Validate and freeze both corpora.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] on any malformed record or step; the engine
    /// must not start on a corpus that fails validation.
    pub fn load(
        raw_records: Vec<RawExperienceRecord>,
        raw_steps: Vec<RawStaticStep>,
        strictness: Strictness,
    ) -> Result<Self, SchemaError> {
        let records = validate_records(raw_records)?;
        let static_steps = validate_static_steps(raw_steps, strictness)?;

        let store = Self {
            records,
            static_steps,
        };
        let stats = store.stats();
        info!(
            records = stats.records,
            static_steps = stats.static_steps,
            "knowledge store loaded"
        );
        Ok(store)
    }

    /// Parse and load both corpora from JSON documents.
    pub fn from_json(
        records_json: &str,
        steps_json: &str,
        strictness: Strictness,
    ) -> Result<Self, SchemaError> {
        let records: Vec<RawExperienceRecord> = serde_json::from_str(records_json)?;
        let steps: Vec<RawStaticStep> = serde_json::from_str(steps_json)?;
        Self::load(records, steps, strictness)
    }

    /// Parse and load both corpora from YAML documents.
    pub fn from_yaml(
        records_yaml: &str,
        steps_yaml: &str,
        strictness: Strictness,
    ) -> Result<Self, SchemaError> {
        let records: Vec<RawExperienceRecord> = serde_yaml::from_str(records_yaml)?;
        let steps: Vec<RawStaticStep> = serde_yaml::from_str(steps_yaml)?;
        Self::load(records, steps, strictness)
    }

    /// Read-only view of the experience records, in corpus order.
    #[must_use]
    pub fn records(&self) -> &[ExperienceRecord] {
        &self.records
    }

    /// Read-only view of the static step library, in corpus order.
    #[must_use]
    pub fn static_steps(&self) -> &[StaticStep] {
        &self.static_steps
    }

    /// Summarize the corpus shape.
    #[must_use]
    pub fn stats(&self) -> CorpusStats {
        let mut tiers: BTreeMap<String, usize> = BTreeMap::new();
        for step in &self.static_steps {
            let label = step
                .tier
                .map_or_else(|| "unrecognized".to_string(), |t| t.to_string());
            *tiers.entry(label).or_insert(0) += 1;
        }
        CorpusStats {
            records: self.records.len(),
            static_steps: self.static_steps.len(),
            tiers,
        }
    }
}

fn validate_records(
    raw: Vec<RawExperienceRecord>,
) -> Result<Vec<ExperienceRecord>, SchemaError> {
    let mut records = Vec::with_capacity(raw.len());

    for (index, record) in raw.into_iter().enumerate() {
        if record.phenomenon.trim().is_empty() {
            return Err(SchemaError::MissingRecordField {
                index,
                field: "phenomenon",
            });
        }
        if record.root_cause.trim().is_empty() {
            return Err(SchemaError::MissingRecordField {
                index,
                field: "root_cause",
            });
        }
        let localization: Vec<LocalizationStep> = record
            .localization_method
            .into_iter()
            .filter(|step| !step.tool_call.trim().is_empty())
            .map(|step| LocalizationStep {
                tool_call: step.tool_call,
                rationale: step.rationale,
            })
            .collect();
        if localization.is_empty() {
            return Err(SchemaError::NoLocalizationSteps {
                index,
                phenomenon: record.phenomenon,
            });
        }

        records.push(ExperienceRecord {
            phenomenon: record.phenomenon,
            root_cause: record.root_cause,
            localization,
            resolution: record.resolution_method,
        });
    }

    debug!(count = records.len(), "experience records validated");
    Ok(records)
}

fn validate_static_steps(
    raw: Vec<RawStaticStep>,
    strictness: Strictness,
) -> Result<Vec<StaticStep>, SchemaError> {
    let mut steps = Vec::with_capacity(raw.len());

    for (index, step) in raw.into_iter().enumerate() {
        if step.tool.trim().is_empty() {
            return Err(SchemaError::MissingTool { index });
        }
        if step.priority_score < 0 {
            return Err(SchemaError::NegativePriority {
                index,
                tool: step.tool,
                score: step.priority_score,
            });
        }

        let tier = match strictness {
            Strictness::Strict => match PriorityTier::parse(&step.priority) {
                Some(tier) => Some(tier),
                None => {
                    return Err(SchemaError::UnknownTier {
                        index,
                        tool: step.tool,
                        tier: step.priority,
                    })
                }
            },
            Strictness::Lenient => {
                let tier = PriorityTier::parse_lenient(&step.priority);
                if tier.is_none() {
                    warn!(
                        tool = %step.tool,
                        tier = %step.priority,
                        "unrecognized priority tier, using numeric score only"
                    );
                }
                tier
            }
        };

        steps.push(StaticStep {
            description: step.description,
            tool: step.tool,
            expected_outcome: step.expected,
            tier,
            priority_score: u32::try_from(step.priority_score).unwrap_or(u32::MAX),
        });
    }

    debug!(count = steps.len(), "static steps validated");
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> RawExperienceRecord {
        RawExperienceRecord {
            phenomenon: "Volume read errors in pod logs".to_string(),
            root_cause: "Physical disk failure on the backing device".to_string(),
            localization_method: vec![RawLocalizationStep {
                tool_call: "disk_health_check node={node}".to_string(),
                rationale: "SMART attributes reveal physical degradation".to_string(),
            }],
            resolution_method: vec!["Cordon the node and migrate the volume".to_string()],
        }
    }

    fn sample_step() -> RawStaticStep {
        RawStaticStep {
            description: "Query SMART data for the backing disk".to_string(),
            tool: "disk_health_check".to_string(),
            expected: "SMART overall-health PASSED".to_string(),
            priority: "high".to_string(),
            priority_score: 70,
        }
    }

    #[test]
    fn test_load_valid_corpus() {
        let store =
            KnowledgeStore::load(vec![sample_record()], vec![sample_step()], Strictness::Strict)
                .unwrap();
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.static_steps().len(), 1);
        assert_eq!(store.static_steps()[0].tier, Some(PriorityTier::High));
    }

    #[test]
    fn test_rejects_empty_phenomenon() {
        let mut record = sample_record();
        record.phenomenon = "  ".to_string();
        let err = KnowledgeStore::load(vec![record], vec![], Strictness::Lenient).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingRecordField {
                field: "phenomenon",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_missing_root_cause() {
        let mut record = sample_record();
        record.root_cause = String::new();
        let err = KnowledgeStore::load(vec![record], vec![], Strictness::Lenient).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingRecordField {
                field: "root_cause",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_record_without_steps() {
        let mut record = sample_record();
        record.localization_method.clear();
        let err = KnowledgeStore::load(vec![record], vec![], Strictness::Lenient).unwrap_err();
        assert!(matches!(err, SchemaError::NoLocalizationSteps { .. }));
    }

    #[test]
    fn test_rejects_negative_priority() {
        let mut step = sample_step();
        step.priority_score = -5;
        let err = KnowledgeStore::load(vec![], vec![step], Strictness::Lenient).unwrap_err();
        assert!(matches!(err, SchemaError::NegativePriority { .. }));
    }

    #[test]
    fn test_lenient_tier_normalization() {
        let mut step = sample_step();
        step.priority = "critcal".to_string(); // misspelled
        let store = KnowledgeStore::load(vec![], vec![step], Strictness::Lenient).unwrap();
        assert_eq!(store.static_steps()[0].tier, Some(PriorityTier::Critical));

        let mut step = sample_step();
        step.priority = "whenever".to_string(); // unrecognizable
        let store = KnowledgeStore::load(vec![], vec![step], Strictness::Lenient).unwrap();
        assert_eq!(store.static_steps()[0].tier, None);
        assert_eq!(store.static_steps()[0].priority_score, 70);
    }

    #[test]
    fn test_strict_rejects_unknown_tier() {
        let mut step = sample_step();
        step.priority = "critcal".to_string();
        let err = KnowledgeStore::load(vec![], vec![step], Strictness::Strict).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownTier { .. }));
    }

    #[test]
    fn test_from_yaml() {
        let records = r"
- phenomenon: PVC reports insufficient capacity
  root_cause: Volume is full
  localization_method:
    - tool_call: capacity_usage_check volume={volume}
      rationale: Confirm usage against the claim size
  resolution_method:
    - Extend the claim manually
";
        let steps = r"
- description: Query SMART data
  tool: disk_health_check
  expected: SMART overall-health PASSED
  priority: high
  priority_score: 70
";
        let store = KnowledgeStore::from_yaml(records, steps, Strictness::Lenient).unwrap();
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.records()[0].localization.len(), 1);
        assert_eq!(store.static_steps().len(), 1);
    }

    #[test]
    fn test_stats_tier_histogram() {
        let mut odd = sample_step();
        odd.priority = "someday".to_string();
        let store = KnowledgeStore::load(
            vec![],
            vec![sample_step(), odd],
            Strictness::Lenient,
        )
        .unwrap();
        let stats = store.stats();
        assert_eq!(stats.static_steps, 2);
        assert_eq!(stats.tiers.get("high"), Some(&1));
        assert_eq!(stats.tiers.get("unrecognized"), Some(&1));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("high", "high"), 0);
        assert_eq!(edit_distance("hgih", "high"), 2);
        assert_eq!(edit_distance("critcal", "critical"), 1);
        assert_eq!(edit_distance("", "high"), 4);
    }
}
