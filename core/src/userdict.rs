//! Per-user bigram adaptation weights.
//!
//! Each entry maps a character pair `(prev, curr)` to a signed weight that the
//! decoder adds to the raw bigram probability. Weights only change through
//! correction learning (or an explicit import/clear) and are hard-capped to a
//! configured magnitude; there is no time decay.
//!
//! The store also keeps a per-code selection order (see `preference`).
//!
//! Two backends:
//! - `InMemory`: thread-safe map, used for tests and ephemeral sessions.
//! - `Redb`: persistent tables. Everything is mirrored in memory so decode
//!   time reads never touch the database. The mirror is updated while the
//!   write transaction is still open and rolled back if the commit fails.
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

use crate::error::Result;

/// Weight lookup consulted during decoding. Absent pairs weigh 0.
pub trait AdaptationSource {
    fn weight(&self, prev: &str, curr: &str) -> f64;
}

/// Plain snapshot of every learned weight.
pub type AdaptationSnapshot = HashMap<(String, String), f64>;

impl AdaptationSource for AdaptationSnapshot {
    fn weight(&self, prev: &str, curr: &str) -> f64 {
        self.get(&(prev.to_string(), curr.to_string()))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Summary figures over the stored weights.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AdaptationStats {
    pub count: usize,
    pub total_weight: f64,
    pub avg_weight: f64,
    /// Codes with a learned selection order.
    pub preferences: usize,
}

/// Two-level map prev -> curr -> weight, so lookups borrow `&str` keys.
type WeightTable = HashMap<String, HashMap<String, f64>>;

/// Code -> characters in the order the user last chose them.
pub type PreferenceTable = HashMap<String, Vec<String>>;

/// A thread-safe in-memory adaptation store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryAdaptationStore {
    inner: Arc<RwLock<WeightTable>>,
    preferences: Arc<RwLock<PreferenceTable>>,
}

impl InMemoryAdaptationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, prev: &str, curr: &str) -> f64 {
        match self.inner.read() {
            Ok(map) => map
                .get(prev)
                .and_then(|row| row.get(curr))
                .copied()
                .unwrap_or(0.0),
            Err(_) => 0.0,
        }
    }

    /// Store a weight. A zero weight removes the entry.
    pub fn set(&self, prev: &str, curr: &str, weight: f64) {
        if let Ok(mut map) = self.inner.write() {
            if weight == 0.0 {
                remove_entry(&mut map, prev, curr);
            } else {
                map.entry(prev.to_string())
                    .or_default()
                    .insert(curr.to_string(), weight);
            }
        }
    }

    /// Add `delta` to the current weight, clamped to `[-limit, limit]`, under
    /// one write lock. Returns the new weight.
    pub fn adjust(&self, prev: &str, curr: &str, delta: f64, limit: f64) -> f64 {
        let Ok(mut map) = self.inner.write() else {
            return 0.0;
        };
        let current = map
            .get(prev)
            .and_then(|row| row.get(curr))
            .copied()
            .unwrap_or(0.0);
        let next = bounded(current + delta, limit);
        if next == 0.0 {
            remove_entry(&mut map, prev, curr);
        } else {
            map.entry(prev.to_string())
                .or_default()
                .insert(curr.to_string(), next);
        }
        next
    }

    pub fn remove(&self, prev: &str, curr: &str) -> bool {
        match self.inner.write() {
            Ok(mut map) => remove_entry(&mut map, prev, curr),
            Err(_) => false,
        }
    }

    pub fn snapshot(&self) -> AdaptationSnapshot {
        let mut out = HashMap::new();
        if let Ok(map) = self.inner.read() {
            for (prev, row) in map.iter() {
                for (curr, w) in row {
                    out.insert((prev.clone(), curr.clone()), *w);
                }
            }
        }
        out
    }

    /// Replace the entire contents with the provided weights.
    pub fn replace_with(&self, data: AdaptationSnapshot) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
            for ((prev, curr), w) in data {
                if w != 0.0 {
                    map.entry(prev).or_default().insert(curr, w);
                }
            }
        }
    }

    pub fn preference(&self, code: &str) -> Option<Vec<String>> {
        self.preferences.read().ok()?.get(code).cloned()
    }

    /// Store the selection order for a code. An empty order removes it.
    pub fn set_preference(&self, code: &str, order: Vec<String>) {
        if let Ok(mut map) = self.preferences.write() {
            if order.is_empty() {
                map.remove(code);
            } else {
                map.insert(code.to_string(), order);
            }
        }
    }

    pub fn preferences(&self) -> PreferenceTable {
        self.preferences
            .read()
            .map(|map| map.clone())
            .unwrap_or_default()
    }

    pub fn replace_preferences(&self, data: PreferenceTable) {
        if let Ok(mut map) = self.preferences.write() {
            *map = data;
            map.retain(|_, order| !order.is_empty());
        }
    }

    /// Drop every weight and every selection order.
    pub fn clear(&self) {
        if let Ok(mut map) = self.inner.write() {
            map.clear();
        }
        if let Ok(mut map) = self.preferences.write() {
            map.clear();
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(map) => map.values().map(|row| row.len()).sum(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AdaptationSource for InMemoryAdaptationStore {
    fn weight(&self, prev: &str, curr: &str) -> f64 {
        self.get(prev, curr)
    }
}

fn remove_entry(map: &mut WeightTable, prev: &str, curr: &str) -> bool {
    let Some(row) = map.get_mut(prev) else {
        return false;
    };
    let removed = row.remove(curr).is_some();
    if row.is_empty() {
        map.remove(prev);
    }
    removed
}

fn bounded(weight: f64, limit: f64) -> f64 {
    let limit = limit.abs();
    if weight.is_nan() {
        0.0
    } else {
        weight.clamp(-limit, limit)
    }
}

/// Key separator used by the persistent table ("prev→curr").
const KEY_SEPARATOR: char = '→';

fn make_key(prev: &str, curr: &str) -> String {
    format!("{}{}{}", prev, KEY_SEPARATOR, curr)
}

fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(KEY_SEPARATOR)
}

/// Redb-backed adaptation store with an in-memory mirror.
pub struct RedbAdaptationStore {
    db: redb::Database,
    mirror: InMemoryAdaptationStore,
    #[allow(dead_code)]
    path: std::path::PathBuf,
}

impl std::fmt::Debug for RedbAdaptationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbAdaptationStore")
            .field("path", &self.path)
            .field("entries", &self.mirror.len())
            .finish()
    }
}

impl RedbAdaptationStore {
    const TABLE_DEF: redb::TableDefinition<'static, &'static str, f64> =
        redb::TableDefinition::new("user_adaptation");
    /// bincode-encoded `Vec<String>` per code
    const PREF_DEF: redb::TableDefinition<'static, &'static str, &'static [u8]> =
        redb::TableDefinition::new("code_preference");

    /// Create or open a redb database at `path` and load every weight.
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> std::result::Result<Self, redb::Error> {
        if let Some(parent) = path.as_ref().parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let db = redb::Database::create(path.as_ref())?;

        // make sure the table exists so read transactions can open it
        let write_txn = db.begin_write()?;
        {
            let _table = write_txn.open_table(Self::TABLE_DEF)?;
            let _prefs = write_txn.open_table(Self::PREF_DEF)?;
        }
        write_txn.commit()?;

        let store = RedbAdaptationStore {
            db,
            mirror: InMemoryAdaptationStore::new(),
            path: path.as_ref().to_path_buf(),
        };
        let persisted = store.read_all()?;
        store.mirror.replace_with(persisted);

        let mut preferences = PreferenceTable::new();
        for (code, bytes) in store.read_preferences()? {
            match bincode::deserialize::<Vec<String>>(&bytes) {
                Ok(order) => {
                    preferences.insert(code, order);
                }
                Err(e) => warn!(code = %code, error = %e, "skipping unreadable selection order"),
            }
        }
        store.mirror.replace_preferences(preferences);
        Ok(store)
    }

    fn read_preferences(&self) -> std::result::Result<Vec<(String, Vec<u8>)>, redb::Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::PREF_DEF)?;
        let mut out = Vec::new();
        for item in table.iter()? {
            let (k, v) = item?;
            out.push((k.value().to_string(), v.value().to_vec()));
        }
        Ok(out)
    }

    fn read_all(&self) -> std::result::Result<AdaptationSnapshot, redb::Error> {
        let mut out = HashMap::new();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::TABLE_DEF)?;
        for item in table.iter()? {
            let (k, v) = item?;
            if let Some((prev, curr)) = split_key(k.value()) {
                out.insert((prev.to_string(), curr.to_string()), v.value());
            }
        }
        Ok(out)
    }

    pub fn get(&self, prev: &str, curr: &str) -> f64 {
        self.mirror.get(prev, curr)
    }

    pub fn set(&self, prev: &str, curr: &str, weight: f64) -> std::result::Result<(), redb::Error> {
        let key = make_key(prev, curr);
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(Self::TABLE_DEF)?;
            if weight == 0.0 {
                table.remove(key.as_str())?;
            } else {
                table.insert(key.as_str(), weight)?;
            }
        }
        let prior = self.mirror.get(prev, curr);
        self.mirror.set(prev, curr, weight);
        if let Err(e) = write_txn.commit() {
            self.mirror.set(prev, curr, prior);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn adjust(
        &self,
        prev: &str,
        curr: &str,
        delta: f64,
        limit: f64,
    ) -> std::result::Result<f64, redb::Error> {
        let key = make_key(prev, curr);
        let write_txn = self.db.begin_write()?;
        let (current, next) = {
            let mut table = write_txn.open_table(Self::TABLE_DEF)?;
            let current = match table.get(key.as_str())? {
                Some(v) => v.value(),
                None => 0.0,
            };
            let next = bounded(current + delta, limit);
            if next == 0.0 {
                table.remove(key.as_str())?;
            } else {
                table.insert(key.as_str(), next)?;
            }
            (current, next)
        };
        // Only one write transaction is open at a time, so the mirror is
        // updated in commit order.
        self.mirror.set(prev, curr, next);
        if let Err(e) = write_txn.commit() {
            self.mirror.set(prev, curr, current);
            return Err(e.into());
        }
        Ok(next)
    }

    pub fn remove(&self, prev: &str, curr: &str) -> std::result::Result<bool, redb::Error> {
        let key = make_key(prev, curr);
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(Self::TABLE_DEF)?;
            let removed = table.remove(key.as_str())?.is_some();
            removed
        };
        let prior = self.mirror.get(prev, curr);
        self.mirror.remove(prev, curr);
        if let Err(e) = write_txn.commit() {
            self.mirror.set(prev, curr, prior);
            return Err(e.into());
        }
        Ok(removed)
    }

    /// Write many weights in a single transaction.
    pub fn import(
        &self,
        weights: &AdaptationSnapshot,
        limit: f64,
    ) -> std::result::Result<(), redb::Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(Self::TABLE_DEF)?;
            for ((prev, curr), w) in weights {
                let key = make_key(prev, curr);
                let w = bounded(*w, limit);
                if w == 0.0 {
                    table.remove(key.as_str())?;
                } else {
                    table.insert(key.as_str(), w)?;
                }
            }
        }
        let prior = self.mirror.snapshot();
        for ((prev, curr), w) in weights {
            self.mirror.set(prev, curr, bounded(*w, limit));
        }
        if let Err(e) = write_txn.commit() {
            self.mirror.replace_with(prior);
            return Err(e.into());
        }
        Ok(())
    }

    /// Store the selection order for `code`. An empty order removes it.
    pub fn set_preference(&self, code: &str, order: &[String]) -> Result<()> {
        let bytes = bincode::serialize(order)?;
        self.write_preference(code, order, &bytes)?;
        Ok(())
    }

    fn write_preference(
        &self,
        code: &str,
        order: &[String],
        bytes: &[u8],
    ) -> std::result::Result<(), redb::Error> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(Self::PREF_DEF)?;
            if order.is_empty() {
                table.remove(code)?;
            } else {
                table.insert(code, bytes)?;
            }
        }
        let prior = self.mirror.preference(code);
        self.mirror.set_preference(code, order.to_vec());
        if let Err(e) = write_txn.commit() {
            self.mirror.set_preference(code, prior.unwrap_or_default());
            return Err(e.into());
        }
        Ok(())
    }

    pub fn preference(&self, code: &str) -> Option<Vec<String>> {
        self.mirror.preference(code)
    }

    pub fn preferences(&self) -> PreferenceTable {
        self.mirror.preferences()
    }

    /// Drop every weight and every selection order.
    pub fn clear(&self) -> std::result::Result<(), redb::Error> {
        let write_txn = self.db.begin_write()?;
        write_txn.delete_table(Self::TABLE_DEF)?;
        write_txn.delete_table(Self::PREF_DEF)?;
        {
            let _table = write_txn.open_table(Self::TABLE_DEF)?;
            let _prefs = write_txn.open_table(Self::PREF_DEF)?;
        }
        write_txn.commit()?;
        self.mirror.clear();
        Ok(())
    }

    pub fn snapshot(&self) -> AdaptationSnapshot {
        self.mirror.snapshot()
    }

    pub fn len(&self) -> usize {
        self.mirror.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirror.is_empty()
    }
}

/// Backend switch used by the engine and the learning adapter.
#[derive(Clone, Debug)]
pub enum AdaptationStore {
    InMemory(InMemoryAdaptationStore),
    Redb(Arc<RedbAdaptationStore>),
}

impl Default for AdaptationStore {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl AdaptationStore {
    pub fn new_in_memory() -> Self {
        AdaptationStore::InMemory(InMemoryAdaptationStore::new())
    }

    /// Open (or create) a persistent store at `path`.
    pub fn new_redb<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Ok(AdaptationStore::Redb(Arc::new(RedbAdaptationStore::new(path)?)))
    }

    pub fn get(&self, prev: &str, curr: &str) -> f64 {
        match self {
            AdaptationStore::InMemory(m) => m.get(prev, curr),
            AdaptationStore::Redb(r) => r.get(prev, curr),
        }
    }

    pub fn set(&self, prev: &str, curr: &str, weight: f64) -> Result<()> {
        match self {
            AdaptationStore::InMemory(m) => m.set(prev, curr, weight),
            AdaptationStore::Redb(r) => r.set(prev, curr, weight)?,
        }
        Ok(())
    }

    /// Add a bounded delta and return the resulting weight.
    pub fn adjust(&self, prev: &str, curr: &str, delta: f64, limit: f64) -> Result<f64> {
        match self {
            AdaptationStore::InMemory(m) => Ok(m.adjust(prev, curr, delta, limit)),
            AdaptationStore::Redb(r) => Ok(r.adjust(prev, curr, delta, limit)?),
        }
    }

    pub fn remove(&self, prev: &str, curr: &str) -> Result<bool> {
        match self {
            AdaptationStore::InMemory(m) => Ok(m.remove(prev, curr)),
            AdaptationStore::Redb(r) => Ok(r.remove(prev, curr)?),
        }
    }

    /// Bulk-set weights (each clamped to `limit`), e.g. from an export.
    pub fn import(&self, weights: &AdaptationSnapshot, limit: f64) -> Result<()> {
        match self {
            AdaptationStore::InMemory(m) => {
                for ((prev, curr), w) in weights {
                    m.set(prev, curr, bounded(*w, limit));
                }
            }
            AdaptationStore::Redb(r) => r.import(weights, limit)?,
        }
        Ok(())
    }

    /// Learned selection order for `code`, if any.
    pub fn preference(&self, code: &str) -> Option<Vec<String>> {
        match self {
            AdaptationStore::InMemory(m) => m.preference(code),
            AdaptationStore::Redb(r) => r.preference(code),
        }
    }

    pub fn set_preference(&self, code: &str, order: &[String]) -> Result<()> {
        match self {
            AdaptationStore::InMemory(m) => m.set_preference(code, order.to_vec()),
            AdaptationStore::Redb(r) => r.set_preference(code, order)?,
        }
        Ok(())
    }

    pub fn preferences(&self) -> PreferenceTable {
        match self {
            AdaptationStore::InMemory(m) => m.preferences(),
            AdaptationStore::Redb(r) => r.preferences(),
        }
    }

    /// Drop every weight and every selection order.
    pub fn clear(&self) -> Result<()> {
        match self {
            AdaptationStore::InMemory(m) => m.clear(),
            AdaptationStore::Redb(r) => r.clear()?,
        }
        Ok(())
    }

    pub fn snapshot(&self) -> AdaptationSnapshot {
        match self {
            AdaptationStore::InMemory(m) => m.snapshot(),
            AdaptationStore::Redb(r) => r.snapshot(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AdaptationStore::InMemory(m) => m.len(),
            AdaptationStore::Redb(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count, total magnitude and mean magnitude of the stored weights.
    pub fn stats(&self) -> AdaptationStats {
        let snap = self.snapshot();
        let count = snap.len();
        let total_weight: f64 = snap.values().map(|w| w.abs()).sum();
        let avg_weight = if count > 0 {
            total_weight / count as f64
        } else {
            0.0
        };
        AdaptationStats {
            count,
            total_weight,
            avg_weight,
            preferences: self.preferences().len(),
        }
    }
}

impl AdaptationSource for AdaptationStore {
    fn weight(&self, prev: &str, curr: &str) -> f64 {
        self.get(prev, curr)
    }
}
