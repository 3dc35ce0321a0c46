//! Per-position candidate lattice.
//!
//! One column per input code, holding every candidate the index lists for
//! that code. A code without candidates fails the whole build; a partial
//! lattice is never returned.

use crate::candidate::Candidate;
use crate::error::{Error, Result};
use crate::lexicon::CodeIndex;

/// Candidates for one input code.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub code: String,
    pub candidates: Vec<Candidate>,
}

impl Column {
    /// Candidates with duplicate characters collapsed.
    ///
    /// When a character appears more than once, the entry with the higher
    /// static frequency survives; on equal frequency the earlier one does.
    /// Output keeps the position of each character's first appearance.
    pub fn distinct(&self) -> Vec<&Candidate> {
        let mut out: Vec<&Candidate> = Vec::with_capacity(self.candidates.len());
        let mut seen: ahash::AHashMap<&str, usize> = ahash::AHashMap::new();
        for cand in &self.candidates {
            match seen.get(cand.character.as_str()) {
                Some(&slot) => {
                    if cand.frequency > out[slot].frequency {
                        out[slot] = cand;
                    }
                }
                None => {
                    seen.insert(cand.character.as_str(), out.len());
                    out.push(cand);
                }
            }
        }
        out
    }
}

/// Ordered columns, one per code. Every column holds at least one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    columns: Vec<Column>,
}

impl Lattice {
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Largest column width, the `candidates` factor of the decode cost.
    pub fn max_width(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.candidates.len())
            .max()
            .unwrap_or(0)
    }
}

/// Look up every code and assemble the lattice.
pub fn build_lattice<I, S>(codes: &[S], index: &I) -> Result<Lattice>
where
    I: CodeIndex + ?Sized,
    S: AsRef<str>,
{
    if codes.is_empty() {
        return Err(Error::input("empty code sequence"));
    }
    let mut columns = Vec::with_capacity(codes.len());
    for code in codes {
        let code = code.as_ref();
        let candidates = index.lookup(code);
        if candidates.is_empty() {
            return Err(Error::lookup(code));
        }
        columns.push(Column {
            code: code.to_string(),
            candidates: candidates.to_vec(),
        });
    }
    Ok(Lattice { columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::CandidateIndex;

    fn index() -> CandidateIndex {
        let mut idx = CandidateIndex::new();
        idx.insert("dj", "明", 9);
        idx.insert("dj", "日", 3);
        idx.insert("ev", "天", 8);
        idx
    }

    #[test]
    fn one_column_per_code() {
        let lattice = build_lattice(&["dj", "ev", "ev"], &index()).unwrap();
        assert_eq!(lattice.len(), 3);
        assert_eq!(lattice.columns()[0].code, "dj");
        assert_eq!(lattice.columns()[0].candidates.len(), 2);
        assert_eq!(lattice.max_width(), 2);
    }

    #[test]
    fn missing_code_fails_whole_build() {
        let err = build_lattice(&["dj", "not_a_real_code", "ev"], &index()).unwrap_err();
        match err {
            Error::Lookup { code } => assert_eq!(code, "not_a_real_code"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_input_is_an_input_error() {
        let codes: [&str; 0] = [];
        assert!(matches!(build_lattice(&codes, &index()), Err(Error::Input(_))));
    }

    #[test]
    fn distinct_keeps_higher_frequency() {
        let col = Column {
            code: "x".into(),
            candidates: vec![
                Candidate::new("甲", 2),
                Candidate::new("乙", 5),
                Candidate::new("甲", 7),
                Candidate::new("乙", 5),
            ],
        };
        let d = col.distinct();
        assert_eq!(d.len(), 2);
        assert_eq!(d[0].character, "甲");
        assert_eq!(d[0].frequency, 7);
        assert_eq!(d[1].character, "乙");
        assert!(std::ptr::eq(d[1], &col.candidates[1]));
    }
}
