//! Correction learning.
//!
//! Compares a decoded sentence with what the user finally committed and
//! nudges the adaptation weights: for every position where the characters
//! differ, the pair `(prev, right)` is raised and `(prev, wrong)` lowered,
//! where `prev` is the user's character at the previous position (or the
//! sentence-start marker at position 0).
use tracing::{debug, warn};

use crate::scoring::SENTENCE_START;
use crate::userdict::AdaptationStore;
use crate::Config;

pub const DEFAULT_CORRECTION_STEP: f64 = 0.1;
pub const DEFAULT_MAX_ADAPTATION_WEIGHT: f64 = 1.0;

/// One replaced character and its context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrectionEvent {
    pub prev: String,
    pub wrong: String,
    pub right: String,
}

/// Position-wise difference between a prediction and the committed text.
///
/// Sequences of different length carry no positional alignment and produce
/// no events.
pub fn diff_corrections<S: AsRef<str>, T: AsRef<str>>(
    original: &[S],
    corrected: &[T],
) -> Vec<CorrectionEvent> {
    if original.len() != corrected.len() {
        debug!(
            original = original.len(),
            corrected = corrected.len(),
            "length mismatch, nothing learned"
        );
        return Vec::new();
    }
    let mut events = Vec::new();
    for (i, (wrong, right)) in original.iter().zip(corrected).enumerate() {
        let (wrong, right) = (wrong.as_ref(), right.as_ref());
        if wrong == right {
            continue;
        }
        let prev = if i == 0 {
            SENTENCE_START
        } else {
            corrected[i - 1].as_ref()
        };
        events.push(CorrectionEvent {
            prev: prev.to_string(),
            wrong: wrong.to_string(),
            right: right.to_string(),
        });
    }
    events
}

/// Applies correction events to an adaptation store.
#[derive(Debug, Clone)]
pub struct LearningAdapter {
    step: f64,
    max_weight: f64,
}

impl Default for LearningAdapter {
    fn default() -> Self {
        Self {
            step: DEFAULT_CORRECTION_STEP,
            max_weight: DEFAULT_MAX_ADAPTATION_WEIGHT,
        }
    }
}

impl LearningAdapter {
    pub fn new(step: f64, max_weight: f64) -> Self {
        let step = if step.is_finite() && step > 0.0 {
            step
        } else {
            DEFAULT_CORRECTION_STEP
        };
        let max_weight = if max_weight.is_finite() && max_weight > 0.0 {
            max_weight
        } else {
            DEFAULT_MAX_ADAPTATION_WEIGHT
        };
        Self { step, max_weight }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.correction_step, cfg.max_adaptation_weight)
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn max_weight(&self) -> f64 {
        self.max_weight
    }

    /// Apply events to the store. Returns how many weight updates succeeded.
    ///
    /// A failed write is logged and skipped; learning never fails a commit.
    pub fn apply(&self, store: &AdaptationStore, events: &[CorrectionEvent]) -> usize {
        let mut updated = 0;
        for ev in events {
            for (curr, delta) in [(&ev.right, self.step), (&ev.wrong, -self.step)] {
                match store.adjust(&ev.prev, curr, delta, self.max_weight) {
                    Ok(w) => {
                        debug!(prev = %ev.prev, curr = %curr, weight = w, "adaptation updated");
                        updated += 1;
                    }
                    Err(e) => {
                        warn!(prev = %ev.prev, curr = %curr, error = %e, "adaptation update failed");
                    }
                }
            }
        }
        updated
    }

    /// Diff and apply in one go. Returns the events that were learned.
    pub fn record<S: AsRef<str>, T: AsRef<str>>(
        &self,
        store: &AdaptationStore,
        original: &[S],
        corrected: &[T],
    ) -> Vec<CorrectionEvent> {
        let events = diff_corrections(original, corrected);
        if !events.is_empty() {
            self.apply(store, &events);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_uses_corrected_previous_character() {
        let events = diff_corrections(&["明", "儈", "放"], &["明", "會", "放"]);
        assert_eq!(
            events,
            vec![CorrectionEvent {
                prev: "明".into(),
                wrong: "儈".into(),
                right: "會".into(),
            }]
        );

        let chained = diff_corrections(&["甲", "乙"], &["丙", "丁"]);
        assert_eq!(chained[0].prev, SENTENCE_START);
        assert_eq!(chained[1].prev, "丙");
    }

    #[test]
    fn length_mismatch_learns_nothing() {
        let store = AdaptationStore::new_in_memory();
        let adapter = LearningAdapter::default();
        let events = adapter.record(&store, &["明", "天"], &["明"]);
        assert!(events.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn identical_sequences_learn_nothing() {
        let store = AdaptationStore::new_in_memory();
        LearningAdapter::default().record(&store, &["明"], &["明"]);
        assert!(store.is_empty());
    }

    #[test]
    fn record_moves_weights_in_opposite_directions() {
        let store = AdaptationStore::new_in_memory();
        let adapter = LearningAdapter::new(0.1, 1.0);
        adapter.record(&store, &["明", "儈"], &["明", "會"]);
        assert!((store.get("明", "會") - 0.1).abs() < 1e-12);
        assert!((store.get("明", "儈") + 0.1).abs() < 1e-12);
    }

    #[test]
    fn repeated_corrections_saturate() {
        let store = AdaptationStore::new_in_memory();
        let adapter = LearningAdapter::new(0.4, 1.0);
        for _ in 0..10 {
            adapter.record(&store, &["儈"], &["會"]);
        }
        assert_eq!(store.get(SENTENCE_START, "會"), 1.0);
        assert_eq!(store.get(SENTENCE_START, "儈"), -1.0);
    }

    #[test]
    fn invalid_parameters_fall_back() {
        let adapter = LearningAdapter::new(-1.0, f64::NAN);
        assert_eq!(adapter.step(), DEFAULT_CORRECTION_STEP);
        assert_eq!(adapter.max_weight(), DEFAULT_MAX_ADAPTATION_WEIGHT);
    }
}
