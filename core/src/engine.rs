//! Decoding engine: index + model + adaptation store behind one facade.
//!
//! The engine owns the decode cache. Any change to the learned weights that
//! goes through the engine (corrections, import, clear) empties it, so a
//! cached result never reflects stale weights.
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::candidate::{Prediction, ScoredCandidate};
use crate::decoder::Decoder;
use crate::error::{Error, Result};
use crate::lattice::build_lattice;
use crate::learning::{CorrectionEvent, LearningAdapter};
use crate::lexicon::CodeIndex;
use crate::ngram::LanguageModel;
use crate::preference::{apply_preference, reorder_by_selection};
use crate::userdict::{AdaptationSnapshot, AdaptationStats, AdaptationStore};
use crate::utils::normalize;
use crate::Config;

const FALLBACK_CACHE_SIZE: usize = 256;

type CacheKey = (Vec<String>, usize);

pub struct Engine<I> {
    index: Arc<I>,
    model: Arc<LanguageModel>,
    store: AdaptationStore,
    config: Config,
    learner: LearningAdapter,
    cache: Mutex<lru::LruCache<CacheKey, Vec<Prediction>>>,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
}

impl<I: CodeIndex> Engine<I> {
    pub fn new(index: I, model: LanguageModel, store: AdaptationStore, config: Config) -> Self {
        Self::from_shared(Arc::new(index), Arc::new(model), store, config)
    }

    /// Build an engine over an index and model that other engines may share.
    pub fn from_shared(
        index: Arc<I>,
        model: Arc<LanguageModel>,
        store: AdaptationStore,
        config: Config,
    ) -> Self {
        let capacity = NonZeroUsize::new(config.max_cache_size)
            .or_else(|| NonZeroUsize::new(FALLBACK_CACHE_SIZE))
            .unwrap_or(NonZeroUsize::MIN);
        let learner = LearningAdapter::from_config(&config);
        Self {
            index,
            model,
            store,
            config,
            learner,
            cache: Mutex::new(lru::LruCache::new(capacity)),
            cache_hits: AtomicUsize::new(0),
            cache_misses: AtomicUsize::new(0),
        }
    }

    /// The single best sentence for a code sequence.
    pub fn decode<S: AsRef<str>>(&self, codes: &[S]) -> Result<Prediction> {
        self.decode_top_k(codes, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::input("empty code sequence"))
    }

    /// Up to `k` distinct sentences, best first.
    ///
    /// The lattice is always built, so an empty or unknown code fails even
    /// when `k` is 0.
    pub fn decode_top_k<S: AsRef<str>>(&self, codes: &[S], k: usize) -> Result<Vec<Prediction>> {
        let key: CacheKey = (codes.iter().map(|c| c.as_ref().to_string()).collect(), k);
        if let Some(hit) = self.cache_get(&key) {
            return Ok(hit);
        }

        let lattice = build_lattice(codes, self.index.as_ref())?;
        if k == 0 {
            return Ok(Vec::new());
        }
        let decoder = Decoder::new(&self.model, &self.store, &self.config);
        let predictions = decoder.decode_top_k(&lattice, k);
        self.cache_put(key, predictions.clone());
        Ok(predictions)
    }

    /// Candidates for one code ranked after the committed character `prev`.
    ///
    /// A learned selection order for the code takes precedence over the
    /// scores; characters it does not mention follow in score order.
    pub fn rank_candidates(&self, prev: Option<&str>, code: &str) -> Result<Vec<ScoredCandidate>> {
        let lattice = build_lattice(&[code], self.index.as_ref())?;
        let decoder = Decoder::new(&self.model, &self.store, &self.config);
        let ranked = decoder.rank_column(prev, &lattice.columns()[0]);
        Ok(match self.store.preference(&normalize(code)) {
            Some(order) => apply_preference(ranked, &order, |s| s.candidate.character.as_str()),
            None => ranked,
        })
    }

    /// Remember that `character` was chosen for `code`: it moves to the front
    /// of the code's selection order. Returns the new order.
    pub fn record_selection(&self, code: &str, character: &str) -> Result<Vec<String>> {
        let lattice = build_lattice(&[code], self.index.as_ref())?;
        let shown: Vec<String> = lattice.columns()[0]
            .distinct()
            .into_iter()
            .map(|c| c.character.clone())
            .collect();
        if !shown.iter().any(|c| c == character) {
            return Err(Error::input(format!(
                "`{}` is not a candidate of code `{}`",
                character, code
            )));
        }
        let key = normalize(code);
        let current = match self.store.preference(&key) {
            Some(order) => apply_preference(shown, &order, |s| s.as_str()),
            None => shown,
        };
        let order = reorder_by_selection(&current, character);
        self.store.set_preference(&key, &order)?;
        debug!(code = %key, selected = character, "selection recorded");
        Ok(order)
    }

    /// Learned selection order for `code`, if any.
    pub fn preference(&self, code: &str) -> Option<Vec<String>> {
        self.store.preference(&normalize(code))
    }

    /// Learn from the difference between a prediction and the committed
    /// sentence. Returns the events that were applied.
    pub fn record_correction<S: AsRef<str>, T: AsRef<str>>(
        &self,
        original: &[S],
        corrected: &[T],
    ) -> Vec<CorrectionEvent> {
        let events = self.learner.record(&self.store, original, corrected);
        if !events.is_empty() {
            debug!(events = events.len(), "correction recorded");
            self.clear_cache();
        }
        events
    }

    /// Copy of every learned weight.
    pub fn export_weights(&self) -> AdaptationSnapshot {
        self.store.snapshot()
    }

    pub fn import_weights(&self, weights: &AdaptationSnapshot) -> Result<()> {
        self.store.import(weights, self.learner.max_weight())?;
        self.clear_cache();
        Ok(())
    }

    /// Drop every learned weight and selection order.
    pub fn clear_weights(&self) -> Result<()> {
        self.store.clear()?;
        self.clear_cache();
        Ok(())
    }

    pub fn weight_stats(&self) -> AdaptationStats {
        self.store.stats()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model(&self) -> &Arc<LanguageModel> {
        &self.model
    }

    pub fn index(&self) -> &Arc<I> {
        &self.index
    }

    /// The adaptation store. Writes made directly on it bypass the cache;
    /// call `clear_cache` afterwards.
    pub fn adaptation(&self) -> &AdaptationStore {
        &self.store
    }

    fn cache_get(&self, key: &CacheKey) -> Option<Vec<Prediction>> {
        let mut cache = self.cache.lock().ok()?;
        match cache.get(key) {
            Some(hit) => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                Some(hit.clone())
            }
            None => {
                self.cache_misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn cache_put(&self, key: CacheKey, value: Vec<Prediction>) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, value);
        }
    }

    /// (hits, misses) since the last clear.
    pub fn cache_stats(&self) -> (usize, usize) {
        (
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
        )
    }

    /// Hit rate as a percentage, `None` before the first lookup.
    pub fn cache_hit_rate(&self) -> Option<f32> {
        let (hits, misses) = self.cache_stats();
        let total = hits + misses;
        if total == 0 {
            None
        } else {
            Some(hits as f32 / total as f32 * 100.0)
        }
    }

    pub fn cache_size(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.lock().map(|c| c.cap().get()).unwrap_or(0)
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::CandidateIndex;
    use std::collections::HashMap;

    fn engine() -> Engine<CandidateIndex> {
        let mut idx = CandidateIndex::new();
        idx.insert("a", "甲", 3);
        idx.insert("a", "乙", 2);
        idx.insert("b", "丙", 1);
        let unigram: HashMap<String, u64> = [("甲", 20u64), ("乙", 10), ("丙", 10)]
            .iter()
            .map(|(c, n)| (c.to_string(), *n))
            .collect();
        let mut bigram = HashMap::new();
        bigram.insert(("甲".to_string(), "丙".to_string()), 5u64);
        let model = LanguageModel::new(unigram, bigram, 0.1, 40, 3).unwrap();
        Engine::new(idx, model, AdaptationStore::new_in_memory(), Config::default())
    }

    #[test]
    fn decode_matches_first_of_top_k() {
        let e = engine();
        let best = e.decode(&["a", "b"]).unwrap();
        let top = e.decode_top_k(&["a", "b"], 5).unwrap();
        assert_eq!(best, top[0]);
        assert_eq!(best.sentence, "甲丙");
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn cache_counts_hits_and_misses() {
        let e = engine();
        e.decode(&["a"]).unwrap();
        e.decode(&["a"]).unwrap();
        assert_eq!(e.cache_stats(), (1, 1));
        assert_eq!(e.cache_size(), 1);
        assert_eq!(e.cache_hit_rate(), Some(50.0));
    }

    #[test]
    fn correction_clears_cache() {
        let e = engine();
        e.decode(&["a"]).unwrap();
        let events = e.record_correction(&["甲"], &["乙"]);
        assert_eq!(events.len(), 1);
        assert_eq!(e.cache_size(), 0);
        assert_eq!(e.cache_stats(), (0, 0));
        assert_eq!(e.weight_stats().count, 2);
    }

    #[test]
    fn unknown_code_fails_even_for_zero_k() {
        let e = engine();
        assert!(matches!(
            e.decode_top_k(&["zz"], 0),
            Err(Error::Lookup { .. })
        ));
        assert!(e.decode_top_k(&["a"], 0).unwrap().is_empty());
    }

    #[test]
    fn rank_candidates_without_context() {
        let e = engine();
        let ranked = e.rank_candidates(None, "a").unwrap();
        assert_eq!(ranked[0].candidate.character, "甲");
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn selection_order_overrides_scores() {
        let e = engine();
        assert_eq!(e.preference("a"), None);
        assert_eq!(e.record_selection("a", "乙").unwrap(), vec!["乙", "甲"]);
        let ranked = e.rank_candidates(None, "a").unwrap();
        assert_eq!(ranked[0].candidate.character, "乙");
        assert_eq!(ranked[1].candidate.character, "甲");
        assert_eq!(e.preference(" a "), Some(vec!["乙".to_string(), "甲".to_string()]));

        assert_eq!(e.record_selection("a", "甲").unwrap(), vec!["甲", "乙"]);
        assert_eq!(e.rank_candidates(Some("丙"), "a").unwrap()[0].candidate.character, "甲");
    }

    #[test]
    fn stale_selection_entries_are_ignored() {
        let e = engine();
        let order: Vec<String> = vec!["乙".into(), "舊".into()];
        e.adaptation().set_preference("a", &order).unwrap();
        let ranked = e.rank_candidates(None, "a").unwrap();
        let chars: Vec<&str> = ranked.iter().map(|s| s.candidate.character.as_str()).collect();
        assert_eq!(chars, vec!["乙", "甲"]);
        assert_eq!(e.record_selection("a", "甲").unwrap(), vec!["甲", "乙"]);
    }

    #[test]
    fn selection_must_be_a_candidate() {
        let e = engine();
        assert!(matches!(e.record_selection("a", "丙"), Err(Error::Input(_))));
        assert!(matches!(e.record_selection("zz", "丙"), Err(Error::Lookup { .. })));
        assert_eq!(e.preference("a"), None);
    }

    #[test]
    fn weights_import_and_clear() {
        let e = engine();
        let mut w = AdaptationSnapshot::new();
        w.insert(("甲".into(), "丙".into()), 3.0);
        e.import_weights(&w).unwrap();
        assert_eq!(e.export_weights().get(&("甲".into(), "丙".into())), Some(&1.0));
        e.record_selection("a", "乙").unwrap();
        e.clear_weights().unwrap();
        assert!(e.export_weights().is_empty());
        assert_eq!(e.preference("a"), None);
    }
}
