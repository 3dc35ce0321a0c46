//! Character unigram/bigram language model with additive smoothing.
//!
//! Counts are stored raw; probabilities are computed on demand so the same
//! model serves every smoothing strategy. All queries are pure and the model
//! is immutable once built, so a single instance can be shared (behind an
//! `Arc`) by any number of concurrent decoders.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{Error, Result};

/// Serialized model shape, field names as produced by the n-gram pipeline.
///
/// `bigram_counts` keys are the concatenation of the two characters.
/// Scalars are read as signed values so that negative counts are reported as
/// model errors rather than parse errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageModelData {
    pub unigram_counts: HashMap<String, u64>,
    pub bigram_counts: HashMap<String, u64>,
    pub smoothing_alpha: f64,
    pub total_chars: i64,
    pub vocab_size: i64,
}

/// Smoothed unigram/bigram model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageModel {
    unigram: HashMap<String, u64>,
    /// count(prev, curr) keyed by prev then curr
    bigram: HashMap<String, HashMap<String, u64>>,
    alpha: f64,
    total_chars: u64,
    vocab_size: u64,
}

impl LanguageModel {
    /// Build a model, rejecting smoothing parameters that would make a
    /// denominator ill-defined.
    pub fn new(
        unigram: HashMap<String, u64>,
        bigram: HashMap<(String, String), u64>,
        alpha: f64,
        total_chars: u64,
        vocab_size: u64,
    ) -> Result<Self> {
        validate(alpha, total_chars, vocab_size)?;
        let mut nested: HashMap<String, HashMap<String, u64>> = HashMap::new();
        for ((prev, curr), count) in bigram {
            nested.entry(prev).or_default().insert(curr, count);
        }
        Ok(Self {
            unigram,
            bigram: nested,
            alpha,
            total_chars,
            vocab_size,
        })
    }

    /// Build a model from its serialized shape.
    pub fn from_data(data: LanguageModelData) -> Result<Self> {
        let total_chars = positive_count("total_chars", data.total_chars)?;
        let vocab_size = positive_count("vocab_size", data.vocab_size)?;
        let mut bigram = HashMap::with_capacity(data.bigram_counts.len());
        for (key, count) in data.bigram_counts {
            let (prev, curr) = split_bigram_key(&key)?;
            bigram.insert((prev.to_string(), curr.to_string()), count);
        }
        Self::new(
            data.unigram_counts,
            bigram,
            data.smoothing_alpha,
            total_chars,
            vocab_size,
        )
    }

    /// Parse the JSON form of the model.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let data: LanguageModelData = serde_json::from_str(content)?;
        Self::from_data(data)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Export to the serialized shape (bigram keys concatenated).
    pub fn to_data(&self) -> LanguageModelData {
        let mut bigram_counts = HashMap::new();
        for (prev, row) in &self.bigram {
            for (curr, count) in row {
                bigram_counts.insert(format!("{}{}", prev, curr), *count);
            }
        }
        LanguageModelData {
            unigram_counts: self.unigram.clone(),
            bigram_counts,
            smoothing_alpha: self.alpha,
            total_chars: i64::try_from(self.total_chars).unwrap_or(i64::MAX),
            vocab_size: i64::try_from(self.vocab_size).unwrap_or(i64::MAX),
        }
    }

    /// Smoothed probability P(c) = (count(c) + α) / (total + α·V). Always > 0.
    pub fn unigram_probability(&self, c: &str) -> f64 {
        let count = self.unigram_count(c) as f64;
        (count + self.alpha) / (self.total_chars as f64 + self.alpha * self.vocab_size as f64)
    }

    /// Conditional Laplace estimate
    /// P(curr | prev) = (count(prev,curr) + α) / (count(prev) + α·V).
    pub fn bigram_probability(&self, prev: &str, curr: &str) -> f64 {
        let pair = self.bigram_count(prev, curr) as f64;
        let context = self.unigram_count(prev) as f64;
        (pair + self.alpha) / (context + self.alpha * self.vocab_size as f64)
    }

    /// Backoff estimate: the maximum-likelihood ratio for a seen pair,
    /// otherwise the unigram probability of `curr` scaled by `penalty`.
    pub fn backoff_bigram_probability(&self, prev: &str, curr: &str, penalty: f64) -> f64 {
        let pair = self.bigram_count(prev, curr);
        if pair > 0 {
            let context = self.unigram_count(prev).max(1) as f64;
            pair as f64 / context
        } else {
            self.unigram_probability(curr) * penalty
        }
    }

    pub fn unigram_count(&self, c: &str) -> u64 {
        self.unigram.get(c).copied().unwrap_or(0)
    }

    pub fn bigram_count(&self, prev: &str, curr: &str) -> u64 {
        self.bigram
            .get(prev)
            .and_then(|row| row.get(curr))
            .copied()
            .unwrap_or(0)
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn total_chars(&self) -> u64 {
        self.total_chars
    }

    pub fn vocab_size(&self) -> u64 {
        self.vocab_size
    }

    /// Number of distinct bigram pairs stored.
    pub fn bigram_len(&self) -> usize {
        self.bigram.values().map(|row| row.len()).sum()
    }

    /// Most frequent continuations of `prev`, by raw pair count.
    ///
    /// Ties are ordered by character so the result is stable.
    pub fn continuations(&self, prev: &str, count: usize) -> Vec<(String, u64)> {
        let mut out: Vec<(String, u64)> = self
            .bigram
            .get(prev)
            .map(|row| row.iter().map(|(c, n)| (c.clone(), *n)).collect())
            .unwrap_or_default();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out.truncate(count);
        out
    }

    // --- Serialization helpers ---

    /// Save the model to the given path using bincode.
    pub fn save_bincode<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)?;
        Ok(())
    }

    /// Load the model from a bincode file, re-checking its parameters.
    pub fn load_bincode<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let model: Self = bincode::deserialize_from(reader)?;
        validate(model.alpha, model.total_chars, model.vocab_size)?;
        Ok(model)
    }
}

fn validate(alpha: f64, total_chars: u64, vocab_size: u64) -> Result<()> {
    if !(alpha.is_finite() && alpha > 0.0) {
        return Err(Error::model(format!(
            "smoothing_alpha must be > 0, got {}",
            alpha
        )));
    }
    if total_chars == 0 {
        return Err(Error::model("total_chars must be > 0, got 0"));
    }
    if vocab_size == 0 {
        return Err(Error::model("vocab_size must be > 0, got 0"));
    }
    Ok(())
}

/// Serialized scalars are signed; anything below 1 is a model error.
fn positive_count(name: &str, value: i64) -> Result<u64> {
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| Error::model(format!("{} must be > 0, got {}", name, value)))
}

/// Split a concatenated pair key after its first character.
fn split_bigram_key(key: &str) -> Result<(&str, &str)> {
    let first_len = key.chars().next().map(char::len_utf8).unwrap_or(0);
    let (prev, curr) = key.split_at(first_len);
    if prev.is_empty() || curr.is_empty() {
        return Err(Error::model(format!(
            "bigram key `{}` does not hold two characters",
            key
        )));
    }
    Ok((prev, curr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LanguageModel {
        let mut uni = HashMap::new();
        uni.insert("a".to_string(), 10);
        uni.insert("b".to_string(), 30);
        let mut bi = HashMap::new();
        bi.insert(("a".to_string(), "b".to_string()), 4);
        LanguageModel::new(uni, bi, 0.5, 40, 2).unwrap()
    }

    #[test]
    fn unigram_laplace() {
        let m = sample();
        // (10 + 0.5) / (40 + 0.5 * 2) = 10.5 / 41
        assert!((m.unigram_probability("a") - 10.5 / 41.0).abs() < 1e-12);
        // unseen still positive
        assert!(m.unigram_probability("zz") > 0.0);
    }

    #[test]
    fn bigram_uses_context_count() {
        let m = sample();
        // (4 + 0.5) / (10 + 0.5 * 2) = 4.5 / 11
        assert!((m.bigram_probability("a", "b") - 4.5 / 11.0).abs() < 1e-12);
        // unseen pair with unseen context: 0.5 / (0 + 1)
        assert!((m.bigram_probability("q", "r") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn backoff_strategy() {
        let m = sample();
        assert!((m.backoff_bigram_probability("a", "b", 0.4) - 0.4).abs() < 1e-12);
        let expected = m.unigram_probability("a") * 0.4;
        assert!((m.backoff_bigram_probability("b", "a", 0.4) - expected).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_parameters() {
        let err = LanguageModel::new(HashMap::new(), HashMap::new(), 0.0, 10, 10).unwrap_err();
        assert!(matches!(err, Error::Model(_)));
        let json = r#"{"unigram_counts":{},"bigram_counts":{},"smoothing_alpha":0.1,"total_chars":-1,"vocab_size":5}"#;
        assert!(matches!(
            LanguageModel::from_json_str(json),
            Err(Error::Model(_))
        ));
        let json = r#"{"unigram_counts":{},"bigram_counts":{},"smoothing_alpha":0.1,"total_chars":5,"vocab_size":0}"#;
        assert!(matches!(
            LanguageModel::from_json_str(json),
            Err(Error::Model(_))
        ));
    }

    #[test]
    fn accepts_counts_beyond_signed_range() {
        let m = LanguageModel::new(HashMap::new(), HashMap::new(), 0.1, u64::MAX, 5).unwrap();
        assert_eq!(m.total_chars(), u64::MAX);
        assert!(m.unigram_probability("明") > 0.0);
        assert_eq!(m.to_data().total_chars, i64::MAX);

        let err = LanguageModel::new(HashMap::new(), HashMap::new(), 0.1, 0, 5).unwrap_err();
        assert!(matches!(err, Error::Model(_)));
        let err = LanguageModel::new(HashMap::new(), HashMap::new(), 0.1, 5, 0).unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }

    #[test]
    fn json_bigram_keys_are_split() {
        let json = r#"{
            "unigram_counts": {"明": 5, "天": 7},
            "bigram_counts": {"明天": 3},
            "smoothing_alpha": 0.1,
            "total_chars": 12,
            "vocab_size": 2
        }"#;
        let m = LanguageModel::from_json_str(json).unwrap();
        assert_eq!(m.bigram_count("明", "天"), 3);
        assert_eq!(m.bigram_count("天", "明"), 0);
        assert_eq!(m.to_data().bigram_counts.get("明天"), Some(&3));
    }

    #[test]
    fn single_character_bigram_key_is_rejected() {
        let json = r#"{"unigram_counts":{},"bigram_counts":{"明":1},"smoothing_alpha":0.1,"total_chars":5,"vocab_size":5}"#;
        assert!(matches!(
            LanguageModel::from_json_str(json),
            Err(Error::Model(_))
        ));
    }

    #[test]
    fn continuations_are_ranked() {
        let mut uni = HashMap::new();
        uni.insert("好".to_string(), 10);
        let mut bi = HashMap::new();
        bi.insert(("好".to_string(), "的".to_string()), 5);
        bi.insert(("好".to_string(), "吗".to_string()), 2);
        bi.insert(("好".to_string(), "啊".to_string()), 5);
        let m = LanguageModel::new(uni, bi, 0.1, 10, 4).unwrap();
        let next = m.continuations("好", 2);
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].1, 5);
        assert_eq!(next[1].1, 5);
        assert!(next[0].0 < next[1].0);
    }

    #[test]
    fn bincode_roundtrip_revalidates() {
        let tmp = std::env::temp_dir().join(format!(
            "libdayi_ngram_{}.bin",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let m = sample();
        m.save_bincode(&tmp).unwrap();
        let loaded = LanguageModel::load_bincode(&tmp).unwrap();
        assert_eq!(loaded.bigram_count("a", "b"), 4);
        assert_eq!(loaded.vocab_size(), 2);
        let _ = std::fs::remove_file(tmp);
    }
}
