//! Symptom matching against the experience corpus.
//!
//! Scoring is a replaceable strategy: the default [`KeywordScorer`] uses
//! token overlap weighted by domain nouns, which is enough for corpus-sized
//! phenomenon text. Anything implementing [`ScoreStrategy`] can be swapped
//! in as long as it stays deterministic; the ranking contract (threshold,
//! tie-breaks) lives here and does not change with the strategy.

use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

use crate::config::MatcherConfig;
use crate::knowledge::ExperienceRecord;
use crate::types::Observation;

/// Domain nouns that carry more matching signal than ordinary tokens.
static DOMAIN_KEYWORDS: LazyLock<Vec<(&'static str, f32)>> = LazyLock::new(|| {
    vec![
        ("volume", 2.0),
        ("pvc", 2.5),
        ("pv", 1.5),
        ("csi", 2.5),
        ("smart", 2.5),
        ("disk", 2.0),
        ("io", 2.0),
        ("mount", 1.5),
        ("filesystem", 1.5),
        ("capacity", 1.5),
        ("readonly", 1.5),
        ("pod", 1.0),
        ("node", 1.0),
    ]
});

/// A scored candidate record.
#[derive(Debug, Clone)]
pub struct RankedMatch {
    /// The matched experience record.
    pub record: ExperienceRecord,
    /// Similarity score in [0, 1].
    pub score: f32,
}

/// Pluggable similarity scoring between an observation and a phenomenon.
pub trait ScoreStrategy: Send + Sync {
    /// Score similarity in [0, 1]; must be deterministic.
    fn score(&self, observation: &str, phenomenon: &str) -> f32;
}

/// Default scorer: token overlap plus weighted domain-keyword hits.
#[derive(Debug, Default)]
pub struct KeywordScorer;

impl ScoreStrategy for KeywordScorer {
    fn score(&self, observation: &str, phenomenon: &str) -> f32 {
        let obs: HashSet<String> = tokenize(observation).into_iter().collect();
        let ph: HashSet<String> = tokenize(phenomenon).into_iter().collect();
        if obs.is_empty() || ph.is_empty() {
            return 0.0;
        }

        let shared = obs.intersection(&ph).count();
        let overlap = shared as f32 / obs.len().min(ph.len()) as f32;

        let keyword_total: f32 = DOMAIN_KEYWORDS
            .iter()
            .filter(|(kw, _)| ph.contains(*kw))
            .map(|(_, w)| w)
            .sum();
        if keyword_total == 0.0 {
            return overlap.clamp(0.0, 1.0);
        }

        let keyword_hit: f32 = DOMAIN_KEYWORDS
            .iter()
            .filter(|(kw, _)| ph.contains(*kw) && obs.contains(*kw))
            .map(|(_, w)| w)
            .sum();

        (0.6 * overlap + 0.4 * keyword_hit / keyword_total).clamp(0.0, 1.0)
    }
}

/// Normalize text into comparable tokens.
///
/// Lowercases, folds `i/o` into `io`, splits on non-alphanumerics and
/// strips naive plurals so `errors` meets `error`.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace("i/o", "io")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| {
            if t.len() > 3 && t.ends_with('s') && !t.ends_with("ss") {
                t[..t.len() - 1].to_string()
            } else {
                t.to_string()
            }
        })
        .collect()
}

/// Ranks observations against the experience corpus.
pub struct SymptomMatcher {
    strategy: Box<dyn ScoreStrategy>,
    threshold: f32,
}

impl SymptomMatcher {
    /// Create a matcher with the default keyword scorer.
    #[must_use]
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            strategy: Box::new(KeywordScorer),
            threshold: config.threshold,
        }
    }

    /// Create a matcher with a custom scoring strategy.
    #[must_use]
    pub fn with_strategy(config: &MatcherConfig, strategy: Box<dyn ScoreStrategy>) -> Self {
        Self {
            strategy,
            threshold: config.threshold,
        }
    }

    /// Rank all records against an observation, best first.
    ///
    /// Candidates below the threshold are discarded. Ties break toward the
    /// longer (more specific) phenomenon, then stable corpus order, so
    /// identical inputs always rank identically. An empty result is not an
    /// error - the planner falls back to the static library alone.
    #[must_use]
    pub fn rank(&self, observation: &Observation, records: &[ExperienceRecord]) -> Vec<RankedMatch> {
        let mut scored: Vec<(usize, f32)> = records
            .iter()
            .enumerate()
            .map(|(idx, record)| (idx, self.strategy.score(&observation.text, &record.phenomenon)))
            .filter(|(_, score)| *score >= self.threshold)
            .collect();

        // Stable sort: corpus order survives as the final tie-break.
        scored.sort_by(|(a_idx, a_score), (b_idx, b_score)| {
            b_score
                .partial_cmp(a_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    records[*b_idx]
                        .phenomenon
                        .len()
                        .cmp(&records[*a_idx].phenomenon.len())
                })
        });

        debug!(
            candidates = scored.len(),
            total = records.len(),
            "symptom matching complete"
        );

        scored
            .into_iter()
            .map(|(idx, score)| RankedMatch {
                record: records[idx].clone(),
                score,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::LocalizationStep;

    fn record(phenomenon: &str) -> ExperienceRecord {
        ExperienceRecord {
            phenomenon: phenomenon.to_string(),
            root_cause: "test root cause".to_string(),
            localization: vec![LocalizationStep {
                tool_call: "disk_health_check".to_string(),
                rationale: String::new(),
            }],
            resolution: vec![],
        }
    }

    fn matcher() -> SymptomMatcher {
        SymptomMatcher::new(&MatcherConfig::default())
    }

    #[test]
    fn test_io_error_matches_volume_read_errors() {
        let records = vec![
            record("Volume read errors in pod logs"),
            record("PVC stuck in Pending state"),
        ];
        let obs = Observation::new("I/O error reading pod logs");
        let ranked = matcher().rank(&obs, &records);

        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].record.phenomenon, "Volume read errors in pod logs");
        assert!(ranked[0].score >= 0.35);
    }

    #[test]
    fn test_unrelated_observation_matches_nothing() {
        let records = vec![record("Volume read errors in pod logs")];
        let obs = Observation::new("certificate rotation failed on the api gateway");
        assert!(matcher().rank(&obs, &records).is_empty());
    }

    #[test]
    fn test_longer_phenomenon_wins_ties() {
        // Identical scoring text; the more specific record must rank first.
        let records = vec![
            record("volume io errors"),
            record("volume io errors on the node"),
        ];
        let obs = Observation::new("volume io errors on the node");
        let ranked = matcher().rank(&obs, &records);
        assert!(ranked.len() >= 2);
        assert!(ranked[0].record.phenomenon.len() > ranked[1].record.phenomenon.len());
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let records = vec![
            record("Volume read errors in pod logs"),
            record("Volume mount timeout during pod start"),
            record("PVC reports insufficient capacity"),
        ];
        let obs = Observation::new("pod volume errors");

        let first: Vec<(String, String)> = matcher()
            .rank(&obs, &records)
            .into_iter()
            .map(|m| (m.record.phenomenon, format!("{:.6}", m.score)))
            .collect();
        for _ in 0..5 {
            let again: Vec<(String, String)> = matcher()
                .rank(&obs, &records)
                .into_iter()
                .map(|m| (m.record.phenomenon, format!("{:.6}", m.score)))
                .collect();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_scores_bounded() {
        let records = vec![record("volume volume volume")];
        let obs = Observation::new("volume volume volume");
        let ranked = matcher().rank(&obs, &records);
        assert!(ranked[0].score <= 1.0);
    }

    #[test]
    fn test_tokenize_folds_io_and_plurals() {
        let tokens = tokenize("I/O errors reading logs");
        assert!(tokens.contains(&"io".to_string()));
        assert!(tokens.contains(&"error".to_string()));
        assert!(tokens.contains(&"log".to_string()));
    }
}
