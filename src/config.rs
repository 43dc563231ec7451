//! Runtime configuration.
//!
//! The extraction formulas are fixed in code; their constants live in
//! `extraction.json` and fall back to the defaults below when the file is
//! absent. Process-level switches come from environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which analyzers feed the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessMode {
    /// Built-in heuristic analysis only; no external services.
    Legacy,
    /// External syntactic analyzer.
    #[default]
    Pipeline,
    /// BookNLP-style analyzer for mentions/coref; the dependency relation
    /// extractor still runs for relations the analyzer does not cover.
    BookNlp,
    /// Union of the syntactic and BookNLP analyzers.
    Hybrid,
}

impl ProcessMode {
    /// Reads `ARES_MODE`, honoring the `ARES_PIPELINE=true` shorthand.
    pub fn from_env() -> ProcessMode {
        if let Some(mode) = ares_core::env::get("ARES_MODE") {
            return Self::parse(&mode).unwrap_or_default();
        }
        if ares_core::env::flag("ARES_PIPELINE") {
            return ProcessMode::Pipeline;
        }
        ProcessMode::default()
    }

    pub fn parse(s: &str) -> Option<ProcessMode> {
        match s.to_lowercase().as_str() {
            "legacy" => Some(ProcessMode::Legacy),
            "pipeline" => Some(ProcessMode::Pipeline),
            "booknlp" => Some(ProcessMode::BookNlp),
            "hybrid" => Some(ProcessMode::Hybrid),
            _ => None,
        }
    }

    pub fn uses_booknlp(&self) -> bool {
        matches!(self, ProcessMode::BookNlp | ProcessMode::Hybrid)
    }
}

/// Tunable constants for extraction, coreference, merging, and scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Confidence added per repeat occurrence of the same mention surface.
    pub frequency_bonus: f64,
    /// Cap on the total frequency bonus.
    pub frequency_bonus_cap: f64,
    /// Penalty for generic closed-class surfaces ("the man").
    pub generic_penalty: f64,
    /// Minimum weighted similarity to link a descriptor to a profile.
    pub descriptor_link_threshold: f64,
    /// Sentence horizon beyond which a pronoun is not linked.
    pub pronoun_horizon: usize,
    /// Minimum profile similarity for cross-document cluster merging.
    pub merge_similarity_threshold: f64,
    /// Merge clusters below this confidence count as low-confidence.
    pub low_confidence_threshold: f64,
    /// Sense decision: at or above this similarity, same entity.
    pub sense_same_threshold: f64,
    /// Sense decision: below this similarity, confidently different.
    pub sense_distinct_threshold: f64,
    /// Bound on stored context windows per profile.
    pub profile_context_cap: usize,
    /// Maximum characters handed to one analyzer call.
    pub max_chunk_chars: usize,
    /// Parallel analyzer calls in flight per document.
    pub max_parallel_chunks: usize,
    /// Per-chunk analyzer deadline.
    pub analyzer_timeout_ms: u64,
    /// Interval between periodic registry saves.
    pub registry_save_interval_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            frequency_bonus: 0.02,
            frequency_bonus_cap: 0.10,
            generic_penalty: 0.25,
            descriptor_link_threshold: 0.70,
            pronoun_horizon: 3,
            merge_similarity_threshold: 0.70,
            low_confidence_threshold: 0.70,
            sense_same_threshold: 0.5,
            sense_distinct_threshold: 0.3,
            profile_context_cap: 20,
            max_chunk_chars: 8000,
            max_parallel_chunks: default_parallelism(),
            analyzer_timeout_ms: 10_000,
            registry_save_interval_ms: 30_000,
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(2)
}

impl ExtractionConfig {
    /// Load from `extraction.json`, falling back to defaults when the file
    /// is missing. A present-but-unreadable file is an error: silently
    /// ignoring a typo'd config is worse than failing.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("read {}: {}", path.display(), e))?;
        serde_json::from_str(&text).map_err(|e| format!("parse {}: {}", path.display(), e))
    }
}

/// Debug switches, read once at pipeline construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugFlags {
    pub l3: bool,
    pub merge: bool,
}

impl DebugFlags {
    pub fn from_env() -> Self {
        Self {
            l3: ares_core::env::flag("L3_DEBUG"),
            merge: ares_core::env::flag("DEBUG_MERGE"),
        }
    }
}

/// Precision gate for evaluation runs, driven by `GOLD_MIN_PRECISION` and
/// `GOLD_MAX_FP`.
#[derive(Debug, Clone, Copy)]
pub struct GoldGate {
    pub min_precision: f64,
    pub max_false_positives: usize,
}

impl GoldGate {
    pub fn from_env() -> Option<GoldGate> {
        let min_precision = ares_core::env::get("GOLD_MIN_PRECISION")?.parse().ok()?;
        let max_false_positives = ares_core::env::parse_or("GOLD_MAX_FP", usize::MAX);
        Some(GoldGate {
            min_precision,
            max_false_positives,
        })
    }

    /// Compare extracted surfaces against a gold set; Ok carries the
    /// measured precision.
    pub fn check(
        &self,
        extracted: &[String],
        gold: &[String],
    ) -> Result<f64, GoldGateFailure> {
        let gold_set: std::collections::HashSet<String> =
            gold.iter().map(|s| s.to_lowercase()).collect();
        let total = extracted.len();
        let false_positives = extracted
            .iter()
            .filter(|s| !gold_set.contains(&s.to_lowercase()))
            .count();
        let precision = if total == 0 {
            1.0
        } else {
            (total - false_positives) as f64 / total as f64
        };
        if precision < self.min_precision {
            return Err(GoldGateFailure::Precision {
                measured: precision,
                required: self.min_precision,
            });
        }
        if false_positives > self.max_false_positives {
            return Err(GoldGateFailure::FalsePositives {
                measured: false_positives,
                allowed: self.max_false_positives,
            });
        }
        Ok(precision)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GoldGateFailure {
    Precision { measured: f64, required: f64 },
    FalsePositives { measured: usize, allowed: usize },
}

impl std::fmt::Display for GoldGateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoldGateFailure::Precision { measured, required } => {
                write!(f, "precision {:.3} below required {:.3}", measured, required)
            }
            GoldGateFailure::FalsePositives { measured, allowed } => {
                write!(f, "{} false positives exceed allowed {}", measured, allowed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parses_all_values() {
        assert_eq!(ProcessMode::parse("legacy"), Some(ProcessMode::Legacy));
        assert_eq!(ProcessMode::parse("PIPELINE"), Some(ProcessMode::Pipeline));
        assert_eq!(ProcessMode::parse("booknlp"), Some(ProcessMode::BookNlp));
        assert_eq!(ProcessMode::parse("hybrid"), Some(ProcessMode::Hybrid));
        assert_eq!(ProcessMode::parse("other"), None);
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let cfg = ExtractionConfig::load(Path::new("/nonexistent/extraction.json")).unwrap();
        assert_eq!(cfg.pronoun_horizon, 3);
        assert!((cfg.merge_similarity_threshold - 0.70).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_config_file_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extraction.json");
        std::fs::write(&path, r#"{"pronoun_horizon": 5}"#).unwrap();
        let cfg = ExtractionConfig::load(&path).unwrap();
        assert_eq!(cfg.pronoun_horizon, 5);
        assert!((cfg.generic_penalty - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn gold_gate_accepts_perfect_extraction() {
        let gate = GoldGate {
            min_precision: 0.9,
            max_false_positives: 0,
        };
        let extracted = vec!["Gandalf".to_string()];
        let gold = vec!["gandalf".to_string()];
        assert_eq!(gate.check(&extracted, &gold), Ok(1.0));
    }

    #[test]
    fn gold_gate_rejects_low_precision() {
        let gate = GoldGate {
            min_precision: 0.9,
            max_false_positives: 10,
        };
        let extracted = vec!["Gandalf".to_string(), "spurious".to_string()];
        let gold = vec!["Gandalf".to_string()];
        assert!(matches!(
            gate.check(&extracted, &gold),
            Err(GoldGateFailure::Precision { .. })
        ));
    }
}
