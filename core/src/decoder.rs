//! Sentence decoding over a candidate lattice.
//!
//! Column 0 is scored with `Scorer::initial`; every later column adds
//! `Scorer::transition` to each surviving predecessor path. Each state (a
//! distinct character in a column) keeps its best `k` partial paths as
//! `(score, predecessor, predecessor rank)` entries, so the single best path
//! and the k-best list come out of the same pass: `decode` is `k = 1`.
//!
//! Ties are settled by an explicit order so results never depend on hash
//! iteration or sort stability. Two entries whose scores differ by no more
//! than the tie epsilon compare by:
//! 1. higher static frequency of the distinguishing character,
//! 2. earlier position in its column,
//! 3. lower predecessor rank.
use std::collections::HashSet;
use tracing::{debug, debug_span};

use crate::candidate::{Candidate, PathStep, Prediction, ScoredCandidate};
use crate::error::{Error, Result};
use crate::lattice::{Column, Lattice};
use crate::ngram::LanguageModel;
use crate::scoring::Scorer;
use crate::userdict::AdaptationSource;
use crate::Config;

pub const DEFAULT_TIE_EPSILON: f64 = 1e-9;

/// One partial path ending at a state.
#[derive(Clone, Copy, Debug)]
struct KEntry {
    score: f64,
    prev_idx: Option<usize>,
    prev_rank: usize,
    /// Frequency of the predecessor state, for tie-breaking.
    prev_frequency: u32,
}

/// A distinct character in a column with its best partial paths, best first.
struct State<'l> {
    candidate: &'l Candidate,
    entries: Vec<KEntry>,
}

/// Sort key used by every ranking decision in this module.
#[derive(Clone, Copy, Debug)]
struct Rank {
    score: f64,
    frequency: u32,
    position: usize,
    rank: usize,
}

impl Rank {
    /// Strictly better than `other`.
    fn outranks(&self, other: &Rank, epsilon: f64) -> bool {
        if (self.score - other.score).abs() > epsilon {
            return self.score > other.score;
        }
        if self.frequency != other.frequency {
            return self.frequency > other.frequency;
        }
        if self.position != other.position {
            return self.position < other.position;
        }
        self.rank < other.rank
    }
}

impl KEntry {
    fn rank(&self) -> Rank {
        Rank {
            score: self.score,
            frequency: self.prev_frequency,
            position: self.prev_idx.unwrap_or(0),
            rank: self.prev_rank,
        }
    }
}

/// Insert keeping best-first order and at most `k` items.
///
/// The new item goes in front of the first item it strictly outranks, so an
/// exact tie lands behind the items already present.
fn insert_top_k<T, F>(list: &mut Vec<T>, k: usize, item: T, epsilon: f64, rank_of: F)
where
    F: Fn(&T) -> Rank,
{
    let new_rank = rank_of(&item);
    let pos = list
        .iter()
        .position(|e| new_rank.outranks(&rank_of(e), epsilon))
        .unwrap_or(list.len());
    if pos >= k {
        return;
    }
    list.insert(pos, item);
    if list.len() > k {
        list.pop();
    }
}

/// Decoder bound to one model and one view of the adaptation weights.
pub struct Decoder<'a, A: AdaptationSource + ?Sized> {
    scorer: Scorer<'a, A>,
    epsilon: f64,
}

impl<'a, A: AdaptationSource + ?Sized> Decoder<'a, A> {
    pub fn new(model: &'a LanguageModel, adaptation: &'a A, cfg: &Config) -> Self {
        let epsilon = if cfg.tie_epsilon.is_finite() && cfg.tie_epsilon >= 0.0 {
            cfg.tie_epsilon
        } else {
            DEFAULT_TIE_EPSILON
        };
        Self {
            scorer: Scorer::new(model, adaptation, cfg),
            epsilon,
        }
    }

    pub fn scorer(&self) -> &Scorer<'a, A> {
        &self.scorer
    }

    /// The single highest-scoring sentence.
    pub fn decode(&self, lattice: &Lattice) -> Result<Prediction> {
        self.decode_top_k(lattice, 1)
            .into_iter()
            .next()
            .ok_or_else(|| Error::input("empty lattice"))
    }

    /// Up to `k` distinct sentences, best first. `k = 0` yields nothing.
    pub fn decode_top_k(&self, lattice: &Lattice, k: usize) -> Vec<Prediction> {
        let positions = lattice.len();
        let width = lattice.max_width();
        let _span = debug_span!("decode", positions, width, k).entered();
        if positions == 0 || k == 0 {
            return Vec::new();
        }

        let columns = lattice.columns();
        let mut states: Vec<Vec<State<'_>>> = Vec::with_capacity(positions);

        let first: Vec<State<'_>> = columns[0]
            .distinct()
            .into_iter()
            .map(|candidate| State {
                candidate,
                entries: vec![KEntry {
                    score: self.scorer.initial(&candidate.character),
                    prev_idx: None,
                    prev_rank: 0,
                    prev_frequency: 0,
                }],
            })
            .collect();
        states.push(first);

        for column in &columns[1..] {
            let prev_states = &states[states.len() - 1];
            let mut next: Vec<State<'_>> = Vec::new();
            for candidate in column.distinct() {
                let mut entries: Vec<KEntry> = Vec::with_capacity(k);
                for (prev_idx, prev) in prev_states.iter().enumerate() {
                    let blend = self
                        .scorer
                        .transition(&prev.candidate.character, &candidate.character);
                    for (rank, entry) in prev.entries.iter().enumerate() {
                        insert_top_k(
                            &mut entries,
                            k,
                            KEntry {
                                score: entry.score + blend,
                                prev_idx: Some(prev_idx),
                                prev_rank: rank,
                                prev_frequency: prev.candidate.frequency,
                            },
                            self.epsilon,
                            KEntry::rank,
                        );
                    }
                }
                next.push(State { candidate, entries });
            }
            states.push(next);
        }

        // (score, state index, rank) over the last column
        let mut finals: Vec<(Rank, usize, usize)> = Vec::with_capacity(k);
        if let Some(last) = states.last() {
            for (idx, state) in last.iter().enumerate() {
                for (rank, entry) in state.entries.iter().enumerate() {
                    let key = Rank {
                        score: entry.score,
                        frequency: state.candidate.frequency,
                        position: idx,
                        rank,
                    };
                    insert_top_k(&mut finals, k, (key, idx, rank), self.epsilon, |f| f.0);
                }
            }
        }

        let mut results: Vec<Prediction> = Vec::with_capacity(finals.len());
        let mut seen: HashSet<String> = HashSet::new();
        for (key, idx, rank) in finals {
            let prediction = Prediction::from_path(backtrace(&states, columns, idx, rank), key.score);
            if seen.insert(prediction.sentence.clone()) {
                results.push(prediction);
            }
        }

        debug!(
            result_count = results.len(),
            best_score = results.first().map(|p| p.score)
        );
        results
    }

    /// Score every distinct candidate of `column` after `prev` (or at sentence
    /// start when `prev` is `None`), best first.
    pub fn rank_column(&self, prev: Option<&str>, column: &Column) -> Vec<ScoredCandidate> {
        let mut ranked: Vec<(Rank, &Candidate)> = Vec::new();
        let distinct = column.distinct();
        let width = distinct.len();
        for (position, candidate) in distinct.into_iter().enumerate() {
            let score = match prev {
                Some(p) => self.scorer.transition(p, &candidate.character),
                None => self.scorer.initial(&candidate.character),
            };
            let key = Rank {
                score,
                frequency: candidate.frequency,
                position,
                rank: 0,
            };
            insert_top_k(&mut ranked, width, (key, candidate), self.epsilon, |r| r.0);
        }
        ranked
            .into_iter()
            .map(|(key, candidate)| ScoredCandidate {
                candidate: candidate.clone(),
                score: key.score,
            })
            .collect()
    }
}

fn backtrace(states: &[Vec<State<'_>>], columns: &[Column], end_idx: usize, end_rank: usize) -> Vec<PathStep> {
    let mut path = Vec::with_capacity(states.len());
    let mut pos = states.len() - 1;
    let mut idx = end_idx;
    let mut rank = end_rank;
    loop {
        let state = &states[pos][idx];
        path.push(PathStep {
            character: state.candidate.character.clone(),
            code: columns[pos].code.clone(),
        });
        let entry = &state.entries[rank];
        match entry.prev_idx {
            Some(prev) if pos > 0 => {
                idx = prev;
                rank = entry.prev_rank;
                pos -= 1;
            }
            _ => break,
        }
    }
    path.reverse();
    path
}
