//! Dàyì input engine
//!
//! A thin wrapper around the generic `libdayi_core::Engine` that knows how
//! to find the runtime artifacts on disk and how to read raw code buffers.
//! All decoding, caching and learning happens in core.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use libdayi_core::{
    AdaptationSnapshot, AdaptationStats, AdaptationStore, Candidate, CandidateIndex, CodeIndex,
    CorrectionEvent, Error, LanguageModel, Prediction, Result, ScoredCandidate,
};
use tracing::{debug, info, warn};

use crate::config::DayiConfig;
use crate::parser::CodeParser;
use crate::session::SentenceSession;

/// Separator between the two characters of an exported weight key.
pub const WEIGHT_KEY_SEPARATOR: char = '→';

/// Public engine for libdayi.
///
/// The inner engine is wrapped in `Arc` so the engine clones cheaply.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<libdayi_core::Engine<CandidateIndex>>,
    parser: CodeParser,
}

impl Engine {
    pub fn new(inner: libdayi_core::Engine<CandidateIndex>) -> Self {
        Self {
            inner: Arc::new(inner),
            parser: CodeParser::default(),
        }
    }

    /// Build from in-memory parts with an in-memory adaptation store.
    pub fn from_parts(index: CandidateIndex, model: LanguageModel, config: DayiConfig) -> Self {
        let parser = CodeParser::new(config.max_buffer_codes);
        let inner = libdayi_core::Engine::new(
            index,
            model,
            AdaptationStore::new_in_memory(),
            config.into_base(),
        );
        Self {
            inner: Arc::new(inner),
            parser,
        }
    }

    /// Load an engine from a data directory with default settings.
    ///
    /// Expected layout (data-dir):
    ///  - dayi_db.fst + dayi_db.bincode, or dayi_db.json   (code index)
    ///  - ngram_db.bincode, or ngram_db.json               (language model)
    ///  - user_adaptation.redb                             (learned weights)
    pub fn from_data_dir<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        Self::from_config(&DayiConfig::with_data_dir(data_dir.as_ref()))
    }

    pub fn from_config(config: &DayiConfig) -> Result<Self> {
        let index = load_index(&config.dictionary_path())?;
        let model = load_model(&config.ngram_path())?;

        let store_path = config.user_store_path();
        let store = match AdaptationStore::new_redb(&store_path) {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %store_path.display(), error = %e, "adaptation store unavailable, learning stays in memory");
                AdaptationStore::new_in_memory()
            }
        };

        info!(
            codes = index.len(),
            bigrams = model.bigram_len(),
            weights = store.len(),
            "engine loaded"
        );
        let inner = libdayi_core::Engine::new(index, model, store, config.base.clone());
        Ok(Self {
            inner: Arc::new(inner),
            parser: CodeParser::new(config.max_buffer_codes),
        })
    }

    /// Get a cloned Arc to the inner core engine.
    pub fn inner_arc(&self) -> Arc<libdayi_core::Engine<CandidateIndex>> {
        Arc::clone(&self.inner)
    }

    pub fn inner(&self) -> &libdayi_core::Engine<CandidateIndex> {
        &self.inner
    }

    pub fn parser(&self) -> &CodeParser {
        &self.parser
    }

    pub fn config(&self) -> &libdayi_core::Config {
        self.inner.config()
    }

    /// Candidates listed for a single code, most frequent first.
    pub fn candidates(&self, code: &str) -> &[Candidate] {
        self.inner.index().lookup(code)
    }

    pub fn decode<S: AsRef<str>>(&self, codes: &[S]) -> Result<Prediction> {
        self.inner.decode(codes)
    }

    pub fn decode_top_k<S: AsRef<str>>(&self, codes: &[S], k: usize) -> Result<Vec<Prediction>> {
        self.inner.decode_top_k(codes, k)
    }

    /// Parse a raw buffer such as `"dj ev ev"` and decode it.
    pub fn decode_input(&self, raw: &str) -> Result<Prediction> {
        let codes = self.parser.parse(raw)?;
        self.inner.decode(&codes)
    }

    pub fn decode_input_top_k(&self, raw: &str, k: usize) -> Result<Vec<Prediction>> {
        let codes = self.parser.parse(raw)?;
        self.inner.decode_top_k(&codes, k)
    }

    pub fn rank_candidates(&self, prev: Option<&str>, code: &str) -> Result<Vec<ScoredCandidate>> {
        self.inner.rank_candidates(prev, code)
    }

    pub fn record_correction<S: AsRef<str>, T: AsRef<str>>(
        &self,
        original: &[S],
        corrected: &[T],
    ) -> Vec<CorrectionEvent> {
        self.inner.record_correction(original, corrected)
    }

    /// Move `character` to the front of `code`'s selection order.
    pub fn record_selection(&self, code: &str, character: &str) -> Result<Vec<String>> {
        self.inner.record_selection(code, character)
    }

    pub fn preference(&self, code: &str) -> Option<Vec<String>> {
        self.inner.preference(code)
    }

    /// Learn from two sentences given as plain text, one character per code.
    /// Sentences of different lengths are ignored.
    pub fn record_sentence_correction(&self, original: &str, corrected: &str) -> Vec<CorrectionEvent> {
        let original = split_chars(original);
        let corrected = split_chars(corrected);
        self.inner.record_correction(&original, &corrected)
    }

    /// Characters most often seen after `prev` in the corpus, with their
    /// pair counts.
    pub fn next_characters(&self, prev: &str, count: usize) -> Vec<(String, u64)> {
        self.inner.model().continuations(prev.trim(), count)
    }

    /// Start a sentence session on this engine.
    pub fn session(&self) -> SentenceSession<'_> {
        SentenceSession::new(self)
    }

    /// Learned weights keyed `"prev→curr"`, sorted by key.
    pub fn export_weights(&self) -> BTreeMap<String, f64> {
        self.inner
            .export_weights()
            .into_iter()
            .map(|((prev, curr), w)| (format!("{}{}{}", prev, WEIGHT_KEY_SEPARATOR, curr), w))
            .collect()
    }

    pub fn export_weights_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export_weights())?)
    }

    /// Import weights in the export format. Returns how many were imported.
    pub fn import_weights_json(&self, content: &str) -> Result<usize> {
        let raw: BTreeMap<String, f64> = serde_json::from_str(content)?;
        let mut weights = AdaptationSnapshot::new();
        for (key, w) in raw {
            let (prev, curr) = key
                .split_once(WEIGHT_KEY_SEPARATOR)
                .filter(|(p, c)| !p.is_empty() && !c.is_empty())
                .ok_or_else(|| Error::input(format!("malformed weight key `{}`", key)))?;
            weights.insert((prev.to_string(), curr.to_string()), w);
        }
        let count = weights.len();
        self.inner.import_weights(&weights)?;
        debug!(count, "weights imported");
        Ok(count)
    }

    pub fn clear_weights(&self) -> Result<()> {
        self.inner.clear_weights()
    }

    pub fn weight_stats(&self) -> AdaptationStats {
        self.inner.weight_stats()
    }

    /// Get cache statistics (hits, misses, hit rate in percent)
    pub fn cache_stats(&self) -> (usize, usize, f64) {
        let (hits, misses) = self.inner.cache_stats();
        let rate = self.inner.cache_hit_rate().unwrap_or(0.0) as f64;
        (hits, misses, rate)
    }

    pub fn clear_cache(&self) {
        self.inner.clear_cache();
    }
}

fn split_chars(s: &str) -> Vec<String> {
    s.trim().chars().map(|c| c.to_string()).collect()
}

/// Prefer the FST layout next to the dictionary, fall back to JSON.
fn load_index(dictionary: &Path) -> Result<CandidateIndex> {
    let fst_path = dictionary.with_extension("fst");
    let bincode_path = dictionary.with_extension("bincode");
    if fst_path.exists() && bincode_path.exists() {
        debug!(path = %fst_path.display(), "loading fst index");
        return CandidateIndex::load_from_fst_bincode(&fst_path, &bincode_path);
    }
    debug!(path = %dictionary.display(), "loading json dictionary");
    CandidateIndex::load_json(dictionary)
}

/// Prefer a bincode model next to the configured file, fall back to JSON.
fn load_model(ngram: &Path) -> Result<LanguageModel> {
    let is_bincode = ngram
        .extension()
        .map(|ext| ext == "bincode" || ext == "bin")
        .unwrap_or(false);
    if is_bincode {
        return LanguageModel::load_bincode(ngram);
    }
    let bincode_path = ngram.with_extension("bincode");
    if bincode_path.exists() {
        debug!(path = %bincode_path.display(), "loading bincode model");
        return LanguageModel::load_bincode(&bincode_path);
    }
    debug!(path = %ngram.display(), "loading json model");
    LanguageModel::load_json(ngram)
}

/// Convert the JSON artifacts in `config`'s data directory into their
/// binary forms (`.fst` + `.bincode` index, `.bincode` model).
pub fn convert_artifacts(config: &DayiConfig) -> Result<(usize, usize)> {
    let dictionary = config.dictionary_path();
    let index = CandidateIndex::load_json(&dictionary)?;
    index.save_fst_bincode(
        &dictionary.with_extension("fst"),
        &dictionary.with_extension("bincode"),
    )?;

    let ngram = config.ngram_path();
    let model = LanguageModel::load_json(&ngram)?;
    model.save_bincode(ngram.with_extension("bincode"))?;
    info!(codes = index.len(), bigrams = model.bigram_len(), "artifacts converted");
    Ok((index.len(), model.bigram_len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        let index = CandidateIndex::from_json_str(
            r#"{"dj": [{"char": "明", "freq": 5}, {"char": "易", "freq": 2}], "ev": [{"char": "天", "freq": 4}]}"#,
        )
        .unwrap();
        let model = LanguageModel::from_json_str(
            r#"{"unigram_counts": {"明": 10, "易": 3, "天": 8}, "bigram_counts": {"明天": 6},
                "smoothing_alpha": 0.1, "total_chars": 21, "vocab_size": 3}"#,
        )
        .unwrap();
        Engine::from_parts(index, model, DayiConfig::default())
    }

    #[test]
    fn decode_raw_buffer() {
        let e = engine();
        assert_eq!(e.decode_input("dj ev").unwrap().sentence, "明天");
        assert!(matches!(e.decode_input("dj 天"), Err(Error::Input(_))));
        assert!(matches!(e.decode_input("dj zz"), Err(Error::Lookup { .. })));
    }

    #[test]
    fn weights_export_import_json() {
        let e = engine();
        e.record_correction(&["明", "天"], &["易", "天"]);
        let json = e.export_weights_json().unwrap();
        assert!(json.contains("<s>→易"));
        assert!(json.contains("<s>→明"));

        let other = engine();
        let imported = other.import_weights_json(&json).unwrap();
        assert_eq!(imported, e.weight_stats().count);
        assert_eq!(other.export_weights(), e.export_weights());
    }

    #[test]
    fn malformed_weight_keys_are_rejected() {
        let e = engine();
        assert!(matches!(
            e.import_weights_json(r#"{"明天": 0.1}"#),
            Err(Error::Input(_))
        ));
        assert!(matches!(e.import_weights_json("[]"), Err(Error::Json(_))));
    }

    #[test]
    fn sentence_corrections_split_into_characters() {
        let e = engine();
        let events = e.record_sentence_correction(" 明天 ", "易天");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].right, "易");
        assert!(e.record_sentence_correction("明天", "易").is_empty());
        assert_eq!(e.weight_stats().count, 2);
    }

    #[test]
    fn next_characters_follow_pair_counts() {
        let e = engine();
        assert_eq!(e.next_characters("明", 3), vec![("天".to_string(), 6)]);
        assert_eq!(e.next_characters(" 明 ", 3).len(), 1);
        assert!(e.next_characters("天", 3).is_empty());
        assert!(e.next_characters("明", 0).is_empty());
    }

    #[test]
    fn candidates_are_listed_by_frequency() {
        let e = engine();
        let chars: Vec<&str> = e.candidates("dj").iter().map(|c| c.character.as_str()).collect();
        assert_eq!(chars, vec!["明", "易"]);
        assert!(e.candidates("zz").is_empty());
    }
}
