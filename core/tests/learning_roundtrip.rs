// core/tests/learning_roundtrip.rs
//
// A correction must change the next decode of the same codes, and the
// learned weights must survive a reopen of the persistent store.

use libdayi_core::{
    AdaptationStore, CandidateIndex, Config, Engine, LanguageModel, SENTENCE_START,
};
use std::collections::HashMap;

fn temp_db(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "libdayi_learning_{}_{}.redb",
        name,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn index() -> CandidateIndex {
    let mut idx = CandidateIndex::new();
    idx.insert("dj", "明", 10);
    // the frequent character comes second on purpose
    idx.insert("ad", "儈", 1);
    idx.insert("ad", "會", 1);
    idx
}

fn model() -> LanguageModel {
    let unigram: HashMap<String, u64> = [("明", 1000u64), ("儈", 60), ("會", 200)]
        .iter()
        .map(|(c, n)| (c.to_string(), *n))
        .collect();
    let mut bigram = HashMap::new();
    bigram.insert(("明".to_string(), "儈".to_string()), 50u64);
    LanguageModel::new(unigram, bigram, 0.1, 10_000, 1000).unwrap()
}

#[test]
fn one_correction_flips_the_prediction() {
    let engine = Engine::new(index(), model(), AdaptationStore::new_in_memory(), Config::default());

    let before = engine.decode(&["dj", "ad"]).unwrap();
    assert_eq!(before.sentence, "明儈");

    let events = engine.record_correction(&before.characters(), &["明", "會"]);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].prev, "明");
    assert_eq!(events[0].wrong, "儈");
    assert_eq!(events[0].right, "會");

    let after = engine.decode(&["dj", "ad"]).unwrap();
    assert_eq!(after.sentence, "明會");
    assert!(after.score <= 0.0);
}

#[test]
fn first_position_corrections_use_sentence_start() {
    let engine = Engine::new(index(), model(), AdaptationStore::new_in_memory(), Config::default());
    assert_eq!(engine.decode(&["ad"]).unwrap().sentence, "會");

    engine.record_correction(&["會"], &["儈"]);
    let store = engine.adaptation();
    assert!((store.get(SENTENCE_START, "儈") - 0.1).abs() < 1e-12);
    assert!((store.get(SENTENCE_START, "會") + 0.1).abs() < 1e-12);

    // P(會) ≈ 0.0198 - 0.1 clamps to the floor
    assert_eq!(engine.decode(&["ad"]).unwrap().sentence, "儈");
}

#[test]
fn mismatched_lengths_change_nothing() {
    let engine = Engine::new(index(), model(), AdaptationStore::new_in_memory(), Config::default());
    let events = engine.record_correction(&["明", "儈"], &["明"]);
    assert!(events.is_empty());
    assert_eq!(engine.weight_stats().count, 0);
    assert_eq!(engine.decode(&["dj", "ad"]).unwrap().sentence, "明儈");
}

#[test]
fn weights_saturate_at_the_cap() {
    let cfg = Config {
        correction_step: 0.3,
        max_adaptation_weight: 0.5,
        ..Config::default()
    };
    let engine = Engine::new(index(), model(), AdaptationStore::new_in_memory(), cfg);
    for _ in 0..5 {
        engine.record_correction(&["明", "儈"], &["明", "會"]);
    }
    let store = engine.adaptation();
    assert_eq!(store.get("明", "會"), 0.5);
    assert_eq!(store.get("明", "儈"), -0.5);
    let stats = engine.weight_stats();
    assert_eq!(stats.count, 2);
    assert!((stats.total_weight - 1.0).abs() < 1e-12);
}

#[test]
fn learned_weights_persist_in_redb() {
    let path = temp_db("persist");
    {
        let store = AdaptationStore::new_redb(&path).unwrap();
        let engine = Engine::new(index(), model(), store, Config::default());
        engine.record_correction(&["明", "儈"], &["明", "會"]);
    }

    let store = AdaptationStore::new_redb(&path).unwrap();
    assert_eq!(store.len(), 2);
    let engine = Engine::new(index(), model(), store, Config::default());
    assert_eq!(engine.decode(&["dj", "ad"]).unwrap().sentence, "明會");

    engine.clear_weights().unwrap();
    assert_eq!(engine.decode(&["dj", "ad"]).unwrap().sentence, "明儈");
    drop(engine);
    let _ = std::fs::remove_file(&path);
}
