//! libdayi-core
//!
//! Statistical sentence decoding for code-based character input: each input
//! code maps to several candidate characters, and a bigram Viterbi search
//! picks the most plausible sentence. User corrections adjust per-pair
//! weights so later decodes favour what the user actually commits.
//!
//! Public API:
//! - `CandidateIndex` / `CodeIndex` - code → candidates lookup (JSON, bincode, FST)
//! - `LanguageModel` - unigram/bigram counts with Laplace or backoff smoothing
//! - `AdaptationStore` - learned pair weights (in memory or redb)
//! - `build_lattice` / `Decoder` - lattice construction, best and k-best paths
//! - `LearningAdapter` - correction diffing and weight updates
//! - `apply_preference` - per-code selection order
//! - `Engine` - all of the above behind one cached facade
//! - `Config` - scoring, learning and cache settings
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

pub mod candidate;
pub use candidate::{Candidate, PathStep, Prediction, ScoredCandidate};

pub mod lexicon;
pub use lexicon::{CandidateIndex, CodeIndex};

pub mod ngram;
pub use ngram::{LanguageModel, LanguageModelData};

pub mod userdict;
pub use userdict::{
    AdaptationSnapshot, AdaptationSource, AdaptationStats, AdaptationStore,
    InMemoryAdaptationStore, PreferenceTable, RedbAdaptationStore,
};

pub mod lattice;
pub use lattice::{build_lattice, Column, Lattice};

pub mod scoring;
pub use scoring::{Scorer, Smoothing, SENTENCE_START};

pub mod decoder;
pub use decoder::Decoder;

pub mod preference;
pub use preference::{apply_preference, reorder_by_selection};

pub mod learning;
pub use learning::{diff_corrections, CorrectionEvent, LearningAdapter};

pub mod engine;
pub use engine::Engine;

/// Scoring, learning and cache settings.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Weight of the (adapted) conditional bigram term.
    pub bigram_weight: f64,
    /// Weight of the unigram term. Both weights are normalised to sum to 1.
    pub unigram_weight: f64,
    /// Lower clamp applied to every probability before taking its log.
    pub probability_floor: f64,
    /// Scores closer than this are treated as tied.
    pub tie_epsilon: f64,
    /// Default number of alternatives callers ask for.
    pub top_k: usize,

    // Learning
    pub correction_step: f64,
    /// Hard cap on the magnitude of any learned weight.
    pub max_adaptation_weight: f64,

    /// Capacity of the engine's decode cache.
    pub max_cache_size: usize,

    /// Conditional probability estimate. Kept last: it serializes as a table.
    pub smoothing: Smoothing,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bigram_weight: scoring::DEFAULT_BIGRAM_WEIGHT,
            unigram_weight: scoring::DEFAULT_UNIGRAM_WEIGHT,
            probability_floor: scoring::DEFAULT_PROBABILITY_FLOOR,
            tie_epsilon: decoder::DEFAULT_TIE_EPSILON,
            top_k: 5,
            correction_step: learning::DEFAULT_CORRECTION_STEP,
            max_adaptation_weight: learning::DEFAULT_MAX_ADAPTATION_WEIGHT,
            max_cache_size: 256,
            smoothing: Smoothing::Laplace,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(
        path: P,
    ) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml_string(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Utility helpers.
pub mod utils {
    /// Normalize input strings (NFC) and trim whitespace.
    pub fn normalize(s: &str) -> String {
        use unicode_normalization::UnicodeNormalization;
        s.nfc().collect::<String>().trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = Config::from_toml_str("top_k = 3\ncorrection_step = 0.2\n").unwrap();
        assert_eq!(cfg.top_k, 3);
        assert_eq!(cfg.correction_step, 0.2);
        assert_eq!(cfg.bigram_weight, 0.7);
        assert_eq!(cfg.smoothing, Smoothing::Laplace);
    }

    #[test]
    fn toml_string_roundtrip() {
        let cfg = Config {
            smoothing: Smoothing::Backoff { penalty: 0.4 },
            ..Config::default()
        };
        let text = cfg.to_toml_string().unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), cfg);
    }

    #[test]
    fn save_and_load_file() {
        let path = std::env::temp_dir().join(format!(
            "libdayi_config_{}.toml",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let cfg = Config {
            max_cache_size: 16,
            ..Config::default()
        };
        cfg.save_toml(&path).unwrap();
        assert_eq!(Config::load_toml(&path).unwrap(), cfg);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn normalize_trims_and_composes() {
        assert_eq!(utils::normalize("  dj "), "dj");
        assert_eq!(utils::normalize("e\u{301}"), "\u{e9}");
    }
}
