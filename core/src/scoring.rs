//! Log-domain scores for lattice initialisation and transitions.
//!
//! A transition blends two views of the next character:
//!
//! ```text
//! blend(c1, c2) = Wb * ln(clamp(P(c2 | c1) + delta(c1, c2)))
//!               + Wu * ln(clamp(P(c2)))
//! ```
//!
//! The unigram term keeps two individually rare characters that happen to
//! have been seen together from outranking common characters whose pairing
//! was never observed. `delta` is the learned user weight; `clamp` bounds the
//! probability to `[floor, 1]` so every term is finite and <= 0.
use serde::{Deserialize, Serialize};

use crate::ngram::LanguageModel;
use crate::userdict::AdaptationSource;
use crate::Config;

/// Context key for the first position of a sentence.
pub const SENTENCE_START: &str = "<s>";

pub const DEFAULT_BIGRAM_WEIGHT: f64 = 0.7;
pub const DEFAULT_UNIGRAM_WEIGHT: f64 = 0.3;
pub const DEFAULT_PROBABILITY_FLOOR: f64 = 1e-10;

/// How the conditional probability P(curr | prev) is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Smoothing {
    /// (count(prev,curr) + α) / (count(prev) + α·V)
    Laplace,
    /// count(prev,curr) / count(prev) when seen, else P(curr) · penalty
    Backoff { penalty: f64 },
}

impl Default for Smoothing {
    fn default() -> Self {
        Smoothing::Laplace
    }
}

/// Scores characters against a model and a set of learned weights.
pub struct Scorer<'a, A: AdaptationSource + ?Sized> {
    model: &'a LanguageModel,
    adaptation: &'a A,
    bigram_weight: f64,
    unigram_weight: f64,
    smoothing: Smoothing,
    floor: f64,
}

impl<'a, A: AdaptationSource + ?Sized> Scorer<'a, A> {
    pub fn new(model: &'a LanguageModel, adaptation: &'a A, cfg: &Config) -> Self {
        let (bigram_weight, unigram_weight) =
            normalized_weights(cfg.bigram_weight, cfg.unigram_weight);
        let floor = if cfg.probability_floor.is_finite()
            && cfg.probability_floor > 0.0
            && cfg.probability_floor < 1.0
        {
            cfg.probability_floor
        } else {
            DEFAULT_PROBABILITY_FLOOR
        };
        Self {
            model,
            adaptation,
            bigram_weight,
            unigram_weight,
            smoothing: cfg.smoothing,
            floor,
        }
    }

    pub fn weights(&self) -> (f64, f64) {
        (self.bigram_weight, self.unigram_weight)
    }

    /// Bound a probability to `[floor, 1]`. NaN maps to the floor.
    pub fn clamp(&self, p: f64) -> f64 {
        if p.is_nan() {
            return self.floor;
        }
        p.max(self.floor).min(1.0)
    }

    fn conditional(&self, prev: &str, curr: &str) -> f64 {
        match self.smoothing {
            Smoothing::Laplace => self.model.bigram_probability(prev, curr),
            Smoothing::Backoff { penalty } => {
                self.model.backoff_bigram_probability(prev, curr, penalty)
            }
        }
    }

    /// Score of `c` opening a sentence: ln P(c), biased by any weight learned
    /// for the sentence-start context.
    pub fn initial(&self, c: &str) -> f64 {
        let p = self.model.unigram_probability(c) + self.adaptation.weight(SENTENCE_START, c);
        self.clamp(p).ln()
    }

    /// Blended transition score for `prev` followed by `curr`.
    pub fn transition(&self, prev: &str, curr: &str) -> f64 {
        let biased = self.conditional(prev, curr) + self.adaptation.weight(prev, curr);
        let bigram = self.clamp(biased).ln();
        let unigram = self.clamp(self.model.unigram_probability(curr)).ln();
        self.bigram_weight * bigram + self.unigram_weight * unigram
    }
}

/// Scale the two weights to sum to 1. Negative or non-finite weights count as
/// 0; if nothing is left the defaults apply.
fn normalized_weights(bigram: f64, unigram: f64) -> (f64, f64) {
    let b = if bigram.is_finite() { bigram.max(0.0) } else { 0.0 };
    let u = if unigram.is_finite() { unigram.max(0.0) } else { 0.0 };
    let sum = b + u;
    if sum > 0.0 {
        (b / sum, u / sum)
    } else {
        (DEFAULT_BIGRAM_WEIGHT, DEFAULT_UNIGRAM_WEIGHT)
    }
}
