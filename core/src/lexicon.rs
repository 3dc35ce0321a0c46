//! Code → candidate index.
//!
//! The index is produced by an offline pipeline; this module only loads and
//! queries it. Three storage shapes are understood:
//! - the dictionary JSON (`{"code": [{"char": "...", "freq": n}, ...]}`)
//! - a bincode dump of the in-memory map (`save_bincode` / `load_bincode`)
//! - an FST key map (code -> index) plus a bincode `Vec<Vec<Candidate>>`
//!
//! Candidate lists are kept sorted by descending static frequency. Equal
//! frequencies keep their source order.

use fst::{Map, MapBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;

use crate::candidate::Candidate;
use crate::error::Result;
use crate::utils::normalize;

/// Read-only code lookup used by lattice construction.
///
/// An empty slice means the code is unknown.
pub trait CodeIndex {
    fn lookup(&self, code: &str) -> &[Candidate];
}

/// In-memory candidate index with optional FST-backed payloads.
#[derive(Debug, Clone, Default)]
pub struct CandidateIndex {
    map: HashMap<String, Vec<Candidate>>,
    fst_map: Option<Map<Vec<u8>>>,
    payloads: Option<Vec<Vec<Candidate>>>,
}

#[derive(Serialize, Deserialize)]
struct IndexData {
    map: HashMap<String, Vec<Candidate>>,
}

impl CandidateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a candidate for a code.
    ///
    /// Inserting a character already present under the code keeps the higher
    /// frequency instead of adding a second entry.
    pub fn insert<K: AsRef<str>, T: Into<String>>(&mut self, code: K, character: T, frequency: u32) {
        let bucket = self.map.entry(normalize(code.as_ref())).or_default();
        let character = character.into();
        if let Some(existing) = bucket.iter_mut().find(|c| c.character == character) {
            existing.frequency = existing.frequency.max(frequency);
        } else {
            bucket.push(Candidate::new(character, frequency));
        }
        sort_bucket(bucket);
    }

    /// Build from the dictionary JSON text.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<Candidate>> = serde_json::from_str(content)?;
        Ok(Self::from_map(raw))
    }

    /// Load the dictionary JSON from a file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    fn from_map(raw: HashMap<String, Vec<Candidate>>) -> Self {
        let mut map: HashMap<String, Vec<Candidate>> = HashMap::with_capacity(raw.len());
        for (code, mut cands) in raw {
            sort_bucket(&mut cands);
            map.entry(normalize(&code)).or_default().extend(cands);
        }
        for bucket in map.values_mut() {
            sort_bucket(bucket);
        }
        Self {
            map,
            fst_map: None,
            payloads: None,
        }
    }

    /// Save the in-memory entries with bincode.
    pub fn save_bincode<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        let data = IndexData {
            map: self.map.clone(),
        };
        bincode::serialize_into(writer, &data)?;
        Ok(())
    }

    /// Load entries written by `save_bincode`.
    pub fn load_bincode<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let data: IndexData = bincode::deserialize_from(reader)?;
        Ok(Self::from_map(data.map))
    }

    /// Load an index from FST + bincode artifacts.
    ///
    /// - fst_path: maps each code to an index into the payload vector
    /// - bincode_path: `Vec<Vec<Candidate>>` payloads
    pub fn load_from_fst_bincode<P: AsRef<Path>>(fst_path: P, bincode_path: P) -> Result<Self> {
        let mut buf = Vec::new();
        File::open(fst_path.as_ref())?.read_to_end(&mut buf)?;
        let fst_map = Map::new(buf)?;

        let reader = BufReader::new(File::open(bincode_path.as_ref())?);
        let mut payloads: Vec<Vec<Candidate>> = bincode::deserialize_from(reader)?;
        for bucket in payloads.iter_mut() {
            sort_bucket(bucket);
        }

        Ok(Self {
            map: HashMap::new(),
            fst_map: Some(fst_map),
            payloads: Some(payloads),
        })
    }

    /// Write the in-memory entries in the layout `load_from_fst_bincode` reads.
    ///
    /// Entries that are only reachable through a loaded FST are not written.
    pub fn save_fst_bincode<P: AsRef<Path>>(&self, fst_path: P, bincode_path: P) -> Result<()> {
        let mut codes: Vec<&String> = self.map.keys().collect();
        codes.sort();

        let mut builder = MapBuilder::new(BufWriter::new(File::create(fst_path.as_ref())?))?;
        let mut payloads: Vec<&Vec<Candidate>> = Vec::with_capacity(codes.len());
        for (i, code) in codes.iter().enumerate() {
            builder.insert(code.as_bytes(), i as u64)?;
            payloads.push(&self.map[*code]);
        }
        builder.finish()?;

        let writer = BufWriter::new(File::create(bincode_path.as_ref())?);
        bincode::serialize_into(writer, &payloads)?;
        Ok(())
    }

    /// Number of codes held in memory plus those behind the FST.
    pub fn len(&self) -> usize {
        self.map.len() + self.fst_map.as_ref().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup_normalized(&self, code: &str) -> &[Candidate] {
        if let Some(v) = self.map.get(code) {
            return v;
        }
        if let (Some(map), Some(payloads)) = (&self.fst_map, &self.payloads) {
            if let Some(idx) = map.get(code) {
                if let Some(entries) = payloads.get(idx as usize) {
                    return entries;
                }
            }
        }
        &[]
    }
}

impl CodeIndex for CandidateIndex {
    fn lookup(&self, code: &str) -> &[Candidate] {
        let found = self.lookup_normalized(code);
        if !found.is_empty() {
            return found;
        }
        let normalized = normalize(code);
        if normalized == code {
            return &[];
        }
        self.lookup_normalized(&normalized)
    }
}

/// Stable sort by descending frequency.
fn sort_bucket(bucket: &mut [Candidate]) {
    bucket.sort_by(|a, b| b.frequency.cmp(&a.frequency));
}
