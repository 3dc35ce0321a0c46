//! Candidate and prediction types.
//!
//! This module provides:
//! - `Candidate`: one character a code can stand for, with its static frequency
//! - `ScoredCandidate`: a candidate ranked in context
//! - `Prediction`: a decoded sentence with its score and source path

use serde::{Deserialize, Serialize};

/// A character reachable from a code, ranked by static frequency.
///
/// Serialized with the field names of the dictionary JSON (`char`, `freq`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "char")]
    pub character: String,
    #[serde(rename = "freq")]
    pub frequency: u32,
}

impl Candidate {
    pub fn new<T: Into<String>>(character: T, frequency: u32) -> Self {
        Candidate {
            character: character.into(),
            frequency,
        }
    }
}

/// A candidate together with the score it earned in a given context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
}

/// One step of a decoded path: the chosen character and the code it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub character: String,
    pub code: String,
}

/// A decoded sentence.
///
/// `score` is the accumulated log-domain score of the path (always <= 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub sentence: String,
    pub score: f64,
    pub path: Vec<PathStep>,
}

impl Prediction {
    /// Build a prediction from its path, deriving the sentence text.
    pub fn from_path(path: Vec<PathStep>, score: f64) -> Self {
        let sentence = path.iter().map(|s| s.character.as_str()).collect();
        Prediction {
            sentence,
            score,
            path,
        }
    }

    /// The characters of the sentence, one per code.
    pub fn characters(&self) -> Vec<String> {
        self.path.iter().map(|s| s.character.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_uses_dictionary_field_names() {
        let c: Candidate = serde_json::from_str(r#"{"char":"明","freq":9}"#).unwrap();
        assert_eq!(c, Candidate::new("明", 9));
        let back = serde_json::to_string(&c).unwrap();
        assert!(back.contains("\"char\""));
        assert!(back.contains("\"freq\""));
    }

    #[test]
    fn prediction_sentence_follows_path() {
        let path = vec![
            PathStep {
                character: "明".into(),
                code: "dj".into(),
            },
            PathStep {
                character: "天".into(),
                code: "ev".into(),
            },
        ];
        let p = Prediction::from_path(path, -3.5);
        assert_eq!(p.sentence, "明天");
        assert_eq!(p.characters(), vec!["明".to_string(), "天".to_string()]);
        assert_eq!(p.len(), 2);
    }
}
