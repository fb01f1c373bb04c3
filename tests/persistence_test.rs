mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use helpers::{config_in, engine_in, CountingEmbedder};
use mnemos::engine::MemoryEngine;
use mnemos::error::IndexError;
use mnemos::index::{IdIndex, IndexFiles, Metric};
use mnemos::retrieval::Answer;
use tempfile::TempDir;

fn assert_corrupt(err: &anyhow::Error) {
    assert!(
        matches!(err.downcast_ref::<IndexError>(), Some(IndexError::CorruptIndex { .. })),
        "expected CorruptIndex, got {err:?}"
    );
}

#[test]
fn id_index_round_trips_through_files() {
    let dir = TempDir::new().unwrap();
    let files = IndexFiles::in_dir(dir.path(), "faces");

    let mut index: IdIndex<String> = IdIndex::new(3, Metric::InnerProduct);
    index.add("a".into(), &[1.0, 0.0, 0.0]).unwrap();
    index.add("b".into(), &[0.0, 1.0, 0.0]).unwrap();
    index.persist(&files).unwrap();

    let loaded: IdIndex<String> = IdIndex::load(&files, 3, Metric::InnerProduct).unwrap();
    assert_eq!(loaded.ids(), &["a".to_string(), "b".to_string()]);
    let hits = loaded.search(&[0.0, 1.0, 0.0], 1).unwrap();
    assert_eq!(hits[0].id, "b");
    assert!(!files.blob.with_extension("index.tmp").exists());
}

#[test]
fn missing_pair_is_cold_start() {
    let dir = TempDir::new().unwrap();
    let files = IndexFiles::in_dir(dir.path(), "text");
    let index: IdIndex<i64> = IdIndex::load(&files, 4, Metric::L2).unwrap();
    assert!(index.is_empty());
    assert!(index.search(&[0.0; 4], 5).unwrap().is_empty());
}

#[test]
fn half_a_pair_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let files = IndexFiles::in_dir(dir.path(), "text");
    let mut index: IdIndex<i64> = IdIndex::new(2, Metric::L2);
    index.add(1, &[1.0, 2.0]).unwrap();
    index.persist(&files).unwrap();
    std::fs::remove_file(&files.ids).unwrap();

    let err = IdIndex::<i64>::load(&files, 2, Metric::L2).unwrap_err();
    assert!(matches!(err, IndexError::CorruptIndex { .. }));
}

#[test]
fn mismatched_configuration_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let files = IndexFiles::in_dir(dir.path(), "text");
    let mut index: IdIndex<i64> = IdIndex::new(2, Metric::L2);
    index.add(1, &[1.0, 2.0]).unwrap();
    index.persist(&files).unwrap();

    assert!(matches!(
        IdIndex::<i64>::load(&files, 3, Metric::L2),
        Err(IndexError::CorruptIndex { .. })
    ));
    assert!(matches!(
        IdIndex::<i64>::load(&files, 2, Metric::InnerProduct),
        Err(IndexError::CorruptIndex { .. })
    ));

    std::fs::write(&files.ids, "[1, 2]").unwrap();
    assert!(matches!(
        IdIndex::<i64>::load(&files, 2, Metric::L2),
        Err(IndexError::CorruptIndex { .. })
    ));
}

#[test]
fn wrong_dimension_does_not_advance_ids() {
    let mut index: IdIndex<i64> = IdIndex::new(2, Metric::L2);
    index.add(1, &[1.0, 0.0]).unwrap();
    let err = index.add(2, &[1.0, 0.0, 0.0]).unwrap_err();
    assert!(matches!(
        err,
        IndexError::DimensionMismatch {
            expected: 2,
            actual: 3
        }
    ));
    assert_eq!(index.ids(), &[1]);
    assert_eq!(index.len(), 1);
}

#[test]
fn memories_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let engine = engine_in(dir.path()).unwrap();
        engine.remember("The capital of France is Paris").unwrap();
    }
    assert!(dir.path().join("text.index").exists());
    assert!(dir.path().join("text.ids.json").exists());
    assert!(dir.path().join("memory.db").exists());

    let engine = engine_in(dir.path()).unwrap();
    assert_eq!(engine.stats().unwrap().text_vectors, 1);
    let response = engine.ask("what is the capital of France").unwrap();
    assert!(matches!(response.answer, Some(Answer::Found { .. })));
}

#[test]
fn deleted_index_is_rebuilt_from_store() {
    let dir = TempDir::new().unwrap();
    {
        let engine = engine_in(dir.path()).unwrap();
        engine.remember("The capital of France is Paris").unwrap();
        engine.remember("My bike lock code is 4821").unwrap();
    }
    std::fs::remove_file(dir.path().join("text.index")).unwrap();
    std::fs::remove_file(dir.path().join("text.ids.json")).unwrap();

    let engine = engine_in(dir.path()).unwrap();
    assert_eq!(engine.stats().unwrap().text_vectors, 2);
    assert!(dir.path().join("text.index").exists());
}

#[test]
fn corrupt_index_fails_open() {
    let dir = TempDir::new().unwrap();
    {
        let engine = engine_in(dir.path()).unwrap();
        engine.remember("The capital of France is Paris").unwrap();
    }
    std::fs::write(dir.path().join("text.index"), b"not an index").unwrap();

    let err = engine_in(dir.path()).err().expect("open should fail");
    assert_corrupt(&err);
}

#[test]
fn orphaned_id_file_fails_open() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("faces.ids.json"), "[]").unwrap();

    let err = engine_in(dir.path()).err().expect("open should fail");
    assert_corrupt(&err);
}

#[test]
fn failed_index_write_stores_nothing() {
    let dir = TempDir::new().unwrap();
    let engine = engine_in(dir.path()).unwrap();
    engine.remember("The spare key is under the blue flowerpot").unwrap();

    // A directory in place of the blob makes the final rename fail.
    let blob = dir.path().join("text.index");
    std::fs::remove_file(&blob).unwrap();
    std::fs::create_dir(&blob).unwrap();

    assert!(engine.remember("Dentist appointment is on Friday at noon").is_err());
    let stats = engine.stats().unwrap();
    assert_eq!(stats.memories, 1);
    assert_eq!(stats.text_vectors, 1);

    assert!(engine
        .ingest_document("notes.txt", "/tmp/notes.txt", "The boiler was serviced in March by the landlord")
        .is_err());
    assert_eq!(engine.stats().unwrap().memories, 1);

    std::fs::remove_dir(&blob).unwrap();
    engine.remember("Dentist appointment is on Friday at noon").unwrap();
    let stats = engine.stats().unwrap();
    assert_eq!(stats.memories, 2);
    assert_eq!(stats.text_vectors, 2);
}

#[test]
fn unembeddable_memory_does_not_force_rebuild_on_open() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());

    let first = Arc::new(AtomicUsize::new(0));
    let engine = MemoryEngine::open(&config, Arc::new(CountingEmbedder { calls: first.clone() })).unwrap();
    engine.remember("this one is unembeddable").unwrap();
    engine.remember("The car is parked on level three").unwrap();
    let stats = engine.stats().unwrap();
    assert_eq!((stats.memories, stats.text_vectors), (2, 1));
    drop(engine);

    let calls = Arc::new(AtomicUsize::new(0));
    let reopened = MemoryEngine::open(&config, Arc::new(CountingEmbedder { calls: calls.clone() })).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(reopened.stats().unwrap().text_vectors, 1);
}
