// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Persistence and recovery integration tests.
//!
//! Saves populated vocabularies to disk and to blobs, and checks what comes
//! back: the interner, the vectors and the lookups, with an empty lexicon.

use integration_tests::{install_english_getters, populated_vocab, sample_words, SAMPLE_DIMS};
use lexeme_store::{Field, LexiconError, Pool, Vocab};
use tempfile::tempdir;

fn assert_round_trip(original: &Vocab, loaded: &Vocab) {
    for (key, text) in original.strings().iter() {
        assert_eq!(loaded.strings().resolve(key).unwrap(), text);
        assert_eq!(loaded.strings().key_of(text), Some(key));
    }
    assert_eq!(loaded.strings().len(), original.strings().len());
    for key in original.vectors().keys() {
        assert_eq!(loaded.vectors().lookup(key), original.vectors().lookup(key));
    }
    assert_eq!(loaded.lookups(), original.lookups());
    assert!(loaded.is_empty());
}

#[test]
fn test_disk_round_trip() {
    let dir = tempdir().unwrap();
    let vocab = populated_vocab(&sample_words());
    assert!(!vocab.is_empty());
    vocab.to_disk(dir.path(), &[]).unwrap();

    let mut loaded = Vocab::new();
    loaded.from_disk(dir.path(), &[]).unwrap();
    assert_round_trip(&vocab, &loaded);
}

#[test]
fn test_blob_round_trip() {
    let vocab = populated_vocab(&sample_words());
    let bytes = vocab.to_bytes(&[]).unwrap();

    let mut loaded = Vocab::new();
    loaded.from_bytes(&bytes, &[]).unwrap();
    assert_round_trip(&vocab, &loaded);
}

#[test]
fn test_lexemes_rebuild_after_load() {
    let dir = tempdir().unwrap();
    let vocab = populated_vocab(&sample_words());
    vocab.to_disk(dir.path(), &[]).unwrap();

    let mut loaded = Vocab::new();
    install_english_getters(&mut loaded);
    loaded.from_disk(dir.path(), &[]).unwrap();
    assert!(loaded.is_empty());

    let garden = loaded.lexeme("garden").unwrap();
    assert!(garden.has_vector());
    assert_eq!(garden.vector().unwrap().len(), SAMPLE_DIMS);
    assert_eq!(garden.suffix(), "den");
    assert_eq!(garden.lang(), "en");

    // Norm exceptions are composited over the restored norm getter.
    assert_eq!(loaded.lexeme("gonna").unwrap().norm(), "going to");
    assert_eq!(loaded.lexeme("Rivers").unwrap().norm(), "rivers");
    assert_eq!(loaded.len(), 3);
}

#[test]
fn test_load_replaces_previous_state() {
    let vocab = populated_vocab(&["alpha", "beta"]);
    let bytes = vocab.to_bytes(&[]).unwrap();

    let mut target = populated_vocab(&["gamma", "delta", "epsilon"]);
    let stale = target.get_or_create(Pool::Permanent, "gamma").unwrap();
    target.from_bytes(&bytes, &[]).unwrap();

    assert!(target.record(stale).is_none());
    assert!(!target.strings().contains("gamma"));
    assert_eq!(target.vectors().n_keys(), 2);
    assert!(target.has_vector("alpha"));
}

#[test]
fn test_excluded_fields_survive_load() {
    let dir = tempdir().unwrap();
    populated_vocab(&["alpha", "beta"]).to_disk(dir.path(), &[]).unwrap();

    let mut target = populated_vocab(&["gamma"]);
    let lookups_before = target.lookups().clone();
    target
        .from_disk(dir.path(), &[Field::Vectors, Field::Lookups])
        .unwrap();

    assert!(target.strings().contains("alpha"));
    assert_eq!(target.vectors().n_keys(), 1);
    assert_eq!(target.lookups(), &lookups_before);
    assert!(target.is_empty());
}

#[test]
fn test_resave_same_directory() {
    let dir = tempdir().unwrap();
    let mut vocab = populated_vocab(&["alpha"]);
    vocab.to_disk(dir.path(), &[]).unwrap();
    vocab.to_disk(dir.path(), &[]).unwrap();

    vocab.set_vector("omega", &[0.5; SAMPLE_DIMS]).unwrap();
    vocab.to_disk(dir.path(), &[]).unwrap();

    let mut loaded = Vocab::new();
    loaded.from_disk(dir.path(), &[]).unwrap();
    assert_eq!(loaded.vectors().n_keys(), 2);
    assert_eq!(loaded.get_vector("omega"), vec![0.5; SAMPLE_DIMS]);
}

#[test]
fn test_missing_directory_is_malformed() {
    let dir = tempdir().unwrap();
    let mut vocab = Vocab::new();
    let err = vocab
        .from_disk(&dir.path().join("does-not-exist"), &[])
        .unwrap_err();
    assert!(matches!(err, LexiconError::MalformedPersistedState(_)));
}

#[test]
fn test_corrupt_vector_shape_rejected() {
    let dir = tempdir().unwrap();
    populated_vocab(&sample_words()).to_disk(dir.path(), &[]).unwrap();
    let cfg = dir.path().join("vectors.cfg");

    let mut target = populated_vocab(&["kept"]);
    for shape in [
        r#"{"version":1,"name":null,"rows":1099511627776,"dims":0}"#,
        r#"{"version":1,"name":null,"rows":3,"dims":8}"#,
        r#"{"version":1,"name":null,"rows":18446744073709551615,"dims":8}"#,
    ] {
        std::fs::write(&cfg, shape).unwrap();
        let err = target.from_disk(dir.path(), &[]).unwrap_err();
        assert!(
            matches!(err, LexiconError::MalformedPersistedState(_)),
            "{shape}: {err}"
        );
        assert!(target.has_vector("kept"));
        assert_eq!(target.vectors().n_keys(), 1);
    }
}

#[test]
fn test_truncated_blob_rejected() {
    let vocab = populated_vocab(&sample_words());
    let bytes = vocab.to_bytes(&[]).unwrap();

    let mut target = Vocab::new();
    target.lexeme("kept").unwrap();
    let err = target.from_bytes(&bytes[..bytes.len() / 2], &[]).unwrap_err();
    assert!(matches!(err, LexiconError::MalformedPersistedState(_)));
    assert!(target.contains("kept"));
}

#[test]
fn test_disk_and_blob_agree() {
    let dir = tempdir().unwrap();
    let vocab = populated_vocab(&sample_words());
    vocab.to_disk(dir.path(), &[]).unwrap();

    let mut from_disk = Vocab::new();
    from_disk.from_disk(dir.path(), &[]).unwrap();
    let mut from_blob = Vocab::new();
    from_blob.from_bytes(&vocab.to_bytes(&[]).unwrap(), &[]).unwrap();

    assert_eq!(
        from_disk.to_bytes(&[]).unwrap(),
        from_blob.to_bytes(&[]).unwrap()
    );
}
