// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Persistence of a vocabulary as a directory of files or a single blob.
//!
//! Only the interner, the vector table and the lookups are persisted.
//! Lexeme records are rebuilt lazily after a load: every load drops the
//! lexicon index and the permanent arena.
//!
//! Directory layout:
//!
//! | file          | contents                                    |
//! |---------------|---------------------------------------------|
//! | `strings.json`| `[[key, text], ...]` in insertion order     |
//! | `vectors.cfg` | JSON: format version, name, rows, dims      |
//! | `vectors.bin` | bincode row-major `f32` matrix              |
//! | `key2row.bin` | bincode `(key, row)` pairs sorted by key    |
//! | `lookups.bin` | bincode lookups tables                      |
//!
//! The blob is a bincode envelope: a header carrying magic bytes and a format
//! version, then a map from field name to that field's bytes.

use std::{
    collections::BTreeMap,
    fmt,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    error::{LexiconError, Result},
    lexeme::LexemeRecord,
    lookups::Lookups,
    strings::{StringKey, StringStore, StringStoreSnapshot},
    vectors::{VectorTable, VectorTableSnapshot},
    vocab::Vocab,
};

/// Magic bytes identifying a vocabulary blob.
const BLOB_MAGIC: [u8; 4] = *b"LEXS";

/// Current format version of blobs and `vectors.cfg`.
const CURRENT_VERSION: u32 = 1;

pub const STRINGS_FILE: &str = "strings.json";
pub const VECTORS_CFG_FILE: &str = "vectors.cfg";
pub const VECTORS_FILE: &str = "vectors.bin";
pub const KEY2ROW_FILE: &str = "key2row.bin";

/// A persisted field that can be excluded from a save or a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Strings,
    Vectors,
    Lookups,
    /// Read path only: accepted in blobs, never written by [`Vocab::to_bytes`].
    Lexemes,
}

impl Field {
    pub const ALL: [Self; 4] = [Self::Strings, Self::Vectors, Self::Lookups, Self::Lexemes];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strings => "strings",
            Self::Vectors => "vectors",
            Self::Lookups => "lookups",
            Self::Lexemes => "lexemes",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == name)
    }

    fn is_in(self, exclude: &[Self]) -> bool {
        exclude.contains(&self)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BlobHeader {
    magic: [u8; 4],
    version: u32,
}

impl BlobHeader {
    const fn new() -> Self {
        Self {
            magic: BLOB_MAGIC,
            version: CURRENT_VERSION,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.magic != BLOB_MAGIC {
            return Err(LexiconError::MalformedPersistedState(
                "invalid vocabulary blob magic".into(),
            ));
        }
        if self.version != CURRENT_VERSION {
            return Err(LexiconError::MalformedPersistedState(format!(
                "unsupported vocabulary blob version {}",
                self.version
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Blob {
    header: BlobHeader,
    fields: BTreeMap<String, Vec<u8>>,
}

impl Blob {
    fn field(&self, field: Field) -> Result<&[u8]> {
        self.fields
            .get(field.as_str())
            .map(Vec::as_slice)
            .ok_or_else(|| {
                LexiconError::MalformedPersistedState(format!("blob is missing field `{field}`"))
            })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct VectorsCfg {
    version: u32,
    name: Option<String>,
    rows: usize,
    dims: usize,
}

/// Fields decoded from persisted state, not yet committed.
#[derive(Default)]
struct Restored {
    strings: Option<StringStore>,
    vectors: Option<VectorTable>,
    lookups: Option<Lookups>,
}

impl Vocab {
    /// Serialize the vocabulary to a blob, skipping excluded fields.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::Serialization`] if a field fails to encode.
    #[instrument(skip(self))]
    pub fn to_bytes(&self, exclude: &[Field]) -> Result<Vec<u8>> {
        let mut fields = BTreeMap::new();
        if !Field::Strings.is_in(exclude) {
            fields.insert(
                Field::Strings.as_str().to_string(),
                bincode::serialize(&self.strings.snapshot())?,
            );
        }
        if !Field::Vectors.is_in(exclude) {
            fields.insert(
                Field::Vectors.as_str().to_string(),
                bincode::serialize(&self.vectors.snapshot())?,
            );
        }
        if !Field::Lookups.is_in(exclude) {
            fields.insert(Field::Lookups.as_str().to_string(), self.lookups.to_bytes()?);
        }

        let blob = Blob {
            header: BlobHeader::new(),
            fields,
        };
        let bytes = bincode::serialize(&blob)?;
        info!(bytes = bytes.len(), fields = blob.fields.len(), "serialized vocabulary");
        Ok(bytes)
    }

    /// Replace the non-excluded fields from a blob and drop the lexicon index.
    ///
    /// Every field is decoded before anything is replaced, so a malformed
    /// blob leaves the vocabulary as it was.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::MalformedPersistedState`] for a bad header, a
    /// missing non-excluded field, or a field that fails to decode.
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub fn from_bytes(&mut self, bytes: &[u8], exclude: &[Field]) -> Result<()> {
        let blob: Blob =
            bincode::deserialize(bytes).map_err(|e| LexiconError::malformed("vocabulary blob", e))?;
        blob.header.validate()?;

        let mut restored = Restored::default();
        if !Field::Strings.is_in(exclude) {
            let snapshot: StringStoreSnapshot = bincode::deserialize(blob.field(Field::Strings)?)
                .map_err(|e| LexiconError::malformed("strings field", e))?;
            restored.strings = Some(StringStore::restore(snapshot)?);
        }
        if !Field::Vectors.is_in(exclude) {
            let snapshot: VectorTableSnapshot = bincode::deserialize(blob.field(Field::Vectors)?)
                .map_err(|e| LexiconError::malformed("vectors field", e))?;
            restored.vectors = Some(VectorTable::restore(snapshot)?);
        }
        if !Field::Lookups.is_in(exclude) {
            restored.lookups = Some(Lookups::from_bytes(blob.field(Field::Lookups)?)?);
        }
        if !Field::Lexemes.is_in(exclude) {
            if let Some(bytes) = blob.fields.get(Field::Lexemes.as_str()) {
                let strings = restored.strings.as_ref().unwrap_or(&self.strings);
                validate_lexemes(bytes, strings)?;
            }
        }

        self.commit(restored);
        info!(strings = self.strings.len(), vectors = self.vectors.n_keys(), "loaded vocabulary blob");
        Ok(())
    }

    /// Write the vocabulary under `path`, creating the directory if needed.
    ///
    /// Each file is written to a temporary path and renamed into place, so
    /// saving to the same location again overwrites cleanly.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a file cannot be written, or
    /// [`LexiconError::Serialization`] if encoding fails.
    #[instrument(skip(self))]
    pub fn to_disk(&self, path: &Path, exclude: &[Field]) -> Result<()> {
        fs::create_dir_all(path)?;
        if !Field::Strings.is_in(exclude) {
            write_file(&path.join(STRINGS_FILE), |w| {
                serde_json::to_writer(w, &self.strings.snapshot())?;
                Ok(())
            })?;
        }
        if !Field::Vectors.is_in(exclude) {
            let snapshot = self.vectors.snapshot();
            let cfg = VectorsCfg {
                version: CURRENT_VERSION,
                name: snapshot.name,
                rows: snapshot.rows,
                dims: snapshot.dims,
            };
            write_file(&path.join(VECTORS_CFG_FILE), |w| {
                serde_json::to_writer_pretty(w, &cfg)?;
                Ok(())
            })?;
            write_file(&path.join(VECTORS_FILE), |w| {
                bincode::serialize_into(w, &snapshot.data)?;
                Ok(())
            })?;
            write_file(&path.join(KEY2ROW_FILE), |w| {
                bincode::serialize_into(w, &snapshot.key2row)?;
                Ok(())
            })?;
        }
        if !Field::Lookups.is_in(exclude) {
            self.lookups.to_disk(path)?;
        }
        info!(path = %path.display(), "saved vocabulary");
        Ok(())
    }

    /// Replace the non-excluded fields from a directory and drop the lexicon
    /// index.
    ///
    /// A missing `lookups.bin` reads as empty lookups; the other files are
    /// required unless their field is excluded.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::MalformedPersistedState`] for a missing or
    /// undecodable file, or an I/O error if a file cannot be read.
    #[instrument(skip(self))]
    pub fn from_disk(&mut self, path: &Path, exclude: &[Field]) -> Result<()> {
        let mut restored = Restored::default();
        if !Field::Strings.is_in(exclude) {
            let reader = open_required(&path.join(STRINGS_FILE))?;
            let snapshot: StringStoreSnapshot = serde_json::from_reader(reader)
                .map_err(|e| LexiconError::malformed(STRINGS_FILE, e))?;
            restored.strings = Some(StringStore::restore(snapshot)?);
        }
        if !Field::Vectors.is_in(exclude) {
            restored.vectors = Some(read_vectors(path)?);
        }
        if !Field::Lookups.is_in(exclude) {
            restored.lookups = Some(Lookups::from_disk(path)?);
        }

        self.commit(restored);
        info!(path = %path.display(), strings = self.strings.len(), "loaded vocabulary");
        Ok(())
    }

    /// Serialize the permanent lexeme records, as accepted in the `lexemes`
    /// field of a blob.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::Serialization`] if encoding fails.
    pub fn lexemes_to_bytes(&self) -> Result<Vec<u8>> {
        let records: Vec<&LexemeRecord> = self.arena.iter().collect();
        Ok(bincode::serialize(&records)?)
    }

    fn commit(&mut self, restored: Restored) {
        if let Some(strings) = restored.strings {
            self.strings = strings;
        }
        if let Some(vectors) = restored.vectors {
            self.vectors = vectors;
        }
        self.invalidate_index();
        if let Some(lookups) = restored.lookups {
            self.set_lookups(lookups);
        }
    }
}

/// Decode persisted lexeme records and check every orth key is interned.
fn validate_lexemes(bytes: &[u8], strings: &StringStore) -> Result<()> {
    let records: Vec<LexemeRecord> =
        bincode::deserialize(bytes).map_err(|e| LexiconError::malformed("lexemes field", e))?;
    if let Some(record) = records
        .iter()
        .find(|record| !record.orth().is_empty() && !strings.contains_key(record.orth()))
    {
        return Err(LexiconError::MalformedPersistedState(format!(
            "lexeme {} has no interned string",
            record.orth()
        )));
    }
    Ok(())
}

fn read_vectors(dir: &Path) -> Result<VectorTable> {
    let cfg: VectorsCfg = serde_json::from_reader(open_required(&dir.join(VECTORS_CFG_FILE))?)
        .map_err(|e| LexiconError::malformed(VECTORS_CFG_FILE, e))?;
    if cfg.version != CURRENT_VERSION {
        return Err(LexiconError::MalformedPersistedState(format!(
            "unsupported vectors format version {}",
            cfg.version
        )));
    }
    let data: Vec<f32> = bincode::deserialize_from(open_required(&dir.join(VECTORS_FILE))?)
        .map_err(|e| LexiconError::malformed(VECTORS_FILE, e))?;
    let key2row: Vec<(StringKey, usize)> =
        bincode::deserialize_from(open_required(&dir.join(KEY2ROW_FILE))?)
            .map_err(|e| LexiconError::malformed(KEY2ROW_FILE, e))?;

    VectorTable::restore(VectorTableSnapshot {
        name: cfg.name,
        rows: cfg.rows,
        dims: cfg.dims,
        data,
        key2row,
    })
}

fn open_required(path: &Path) -> Result<BufReader<File>> {
    if !path.exists() {
        return Err(LexiconError::MalformedPersistedState(format!(
            "missing {}",
            path.display()
        )));
    }
    Ok(BufReader::new(File::open(path)?))
}

/// Write through a temporary file and rename it over `path`.
fn write_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let temp_path = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        write(&mut writer)?;
        writer.flush()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::{
        arena::Pool,
        attrs::LexAttr,
        lookups::{Table, NORM_EXCEPTIONS_TABLE},
    };

    fn sample() -> Vocab {
        let mut vocab = Vocab::new();
        vocab.lexeme("the").unwrap();
        vocab.lexeme("naïve").unwrap();
        vocab.set_vector("cat", &[1.0, 0.0, 0.5]).unwrap();
        vocab.set_vector("dog", &[0.0, 1.0, 0.5]).unwrap();
        let mut lookups = Lookups::new();
        lookups.set_table(Table::from_entries(NORM_EXCEPTIONS_TABLE, [("gonna", "going to")]));
        vocab.set_lookups(lookups);
        vocab
    }

    fn assert_same_state(a: &Vocab, b: &Vocab) {
        let a_strings: Vec<_> = a.strings().iter().collect();
        let b_strings: Vec<_> = b.strings().iter().collect();
        assert_eq!(a_strings, b_strings);
        assert_eq!(a.vectors().shape(), b.vectors().shape());
        for key in a.vectors().keys() {
            assert_eq!(a.vectors().lookup(key), b.vectors().lookup(key));
        }
        assert_eq!(a.lookups(), b.lookups());
    }

    #[test]
    fn test_field_names() {
        for field in Field::ALL {
            assert_eq!(Field::from_name(field.as_str()), Some(field));
        }
        assert_eq!(Field::from_name("exclude"), None);
        assert_eq!(Field::Vectors.to_string(), "vectors");
    }

    #[test]
    fn test_blob_roundtrip() {
        let vocab = sample();
        let bytes = vocab.to_bytes(&[]).unwrap();

        let mut loaded = Vocab::new();
        loaded.from_bytes(&bytes, &[]).unwrap();
        assert_same_state(&vocab, &loaded);
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_disk_roundtrip() {
        let dir = tempdir().unwrap();
        let vocab = sample();
        vocab.to_disk(dir.path(), &[]).unwrap();

        let mut loaded = Vocab::new();
        loaded.from_disk(dir.path(), &[]).unwrap();
        assert_same_state(&vocab, &loaded);
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_disk_rewrite_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut vocab = sample();
        vocab.to_disk(dir.path(), &[]).unwrap();
        vocab.set_vector("owl", &[0.2, 0.2, 0.2]).unwrap();
        vocab.to_disk(dir.path(), &[]).unwrap();

        let mut loaded = Vocab::new();
        loaded.from_disk(dir.path(), &[]).unwrap();
        assert!(loaded.has_vector("owl"));
        assert!(!dir.path().join("strings.tmp").exists());
    }

    #[test]
    fn test_disk_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("models").join("en");
        sample().to_disk(&nested, &[]).unwrap();
        assert!(nested.join(STRINGS_FILE).exists());
        assert!(nested.join(VECTORS_CFG_FILE).exists());
        assert!(nested.join(KEY2ROW_FILE).exists());
    }

    #[test]
    fn test_load_invalidates_index() {
        let vocab = sample();
        let bytes = vocab.to_bytes(&[]).unwrap();

        let mut target = Vocab::new();
        let id = target.get_or_create(Pool::Permanent, "stale").unwrap();
        target.from_bytes(&bytes, &[]).unwrap();
        assert!(target.is_empty());
        assert!(target.record(id).is_none());

        // Lexemes rebuild lazily from the restored state.
        let cat = target.lexeme("cat").unwrap();
        assert!(cat.has_vector());
    }

    #[test]
    fn test_exclusion_on_write() {
        let vocab = sample();
        let bytes = vocab.to_bytes(&[Field::Vectors]).unwrap();
        let blob: Blob = bincode::deserialize(&bytes).unwrap();
        assert!(blob.fields.contains_key("strings"));
        assert!(!blob.fields.contains_key("vectors"));
        assert!(!blob.fields.contains_key("lexemes"));

        let mut loaded = Vocab::new();
        assert!(matches!(
            loaded.from_bytes(&bytes, &[]),
            Err(LexiconError::MalformedPersistedState(_))
        ));
        loaded.from_bytes(&bytes, &[Field::Vectors]).unwrap();
        assert_eq!(loaded.vectors().n_keys(), 0);
    }

    #[test]
    fn test_exclusion_on_read_keeps_field() {
        let vocab = sample();
        let bytes = vocab.to_bytes(&[]).unwrap();

        let mut target = Vocab::new();
        target.set_vector("keep", &[9.0]).unwrap();
        target.from_bytes(&bytes, &[Field::Vectors]).unwrap();
        assert_eq!(target.vectors().dims(), 1);
        assert!(target.strings().contains("cat"));
    }

    #[test]
    fn test_disk_exclusion() {
        let dir = tempdir().unwrap();
        sample().to_disk(dir.path(), &[Field::Strings, Field::Lookups]).unwrap();
        assert!(!dir.path().join(STRINGS_FILE).exists());
        assert!(!dir.path().join("lookups.bin").exists());

        let mut loaded = Vocab::new();
        assert!(matches!(
            loaded.from_disk(dir.path(), &[]),
            Err(LexiconError::MalformedPersistedState(_))
        ));
        loaded.from_disk(dir.path(), &[Field::Strings]).unwrap();
        assert_eq!(loaded.vectors().n_keys(), 2);
        assert!(loaded.lookups().is_empty());
    }

    #[test]
    fn test_bad_magic() {
        let blob = Blob {
            header: BlobHeader {
                magic: *b"XXXX",
                version: CURRENT_VERSION,
            },
            fields: BTreeMap::new(),
        };
        let bytes = bincode::serialize(&blob).unwrap();
        let mut vocab = Vocab::new();
        assert!(matches!(
            vocab.from_bytes(&bytes, &Field::ALL),
            Err(LexiconError::MalformedPersistedState(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let header = BlobHeader {
            magic: BLOB_MAGIC,
            version: CURRENT_VERSION + 1,
        };
        assert!(header.validate().is_err());
        assert!(BlobHeader::new().validate().is_ok());
    }

    #[test]
    fn test_garbage_bytes() {
        let mut vocab = Vocab::new();
        assert!(matches!(
            vocab.from_bytes(b"not a vocabulary", &[]),
            Err(LexiconError::MalformedPersistedState(_))
        ));
    }

    #[test]
    fn test_malformed_field_leaves_state() {
        let vocab = sample();
        let bytes = vocab.to_bytes(&[]).unwrap();
        let mut blob: Blob = bincode::deserialize(&bytes).unwrap();
        blob.fields.insert("lookups".into(), vec![0xff; 3]);
        let bytes = bincode::serialize(&blob).unwrap();

        let mut target = Vocab::new();
        target.lexeme("kept").unwrap();
        assert!(target.from_bytes(&bytes, &[]).is_err());
        assert!(target.contains("kept"));
        assert!(!target.strings().contains("cat"));
    }

    #[test]
    fn test_lexemes_field_validated() {
        let vocab = sample();
        let bytes = vocab.to_bytes(&[]).unwrap();
        let mut blob: Blob = bincode::deserialize(&bytes).unwrap();
        blob.fields
            .insert("lexemes".into(), vocab.lexemes_to_bytes().unwrap());
        let good = bincode::serialize(&blob).unwrap();

        let mut loaded = Vocab::new();
        loaded.from_bytes(&good, &[]).unwrap();
        assert!(loaded.is_empty());

        // Records whose strings are not restored are rejected.
        let mut other = Vocab::new();
        other.lexeme("unrelated").unwrap();
        blob.fields
            .insert("lexemes".into(), other.lexemes_to_bytes().unwrap());
        let bad = bincode::serialize(&blob).unwrap();
        assert!(matches!(
            Vocab::new().from_bytes(&bad, &[]),
            Err(LexiconError::MalformedPersistedState(_))
        ));
        // Excluding the field skips it.
        Vocab::new().from_bytes(&bad, &[Field::Lexemes]).unwrap();
    }

    #[test]
    fn test_norm_exceptions_restored() {
        let dir = tempdir().unwrap();
        sample().to_disk(dir.path(), &[]).unwrap();

        let mut loaded = Vocab::new();
        loaded.set_attr_getter(LexAttr::Norm, |s| Some(s.to_uppercase().into()));
        loaded.from_disk(dir.path(), &[]).unwrap();
        assert_eq!(loaded.lexeme("gonna").unwrap().norm(), "going to");
        assert_eq!(loaded.lexeme("dog").unwrap().norm(), "DOG");
    }

    #[test]
    fn test_lookups_without_norm_table_clear_exceptions() {
        let mut source = Vocab::new();
        source.intern("x");
        let bytes = source.to_bytes(&[]).unwrap();

        let mut target = sample();
        assert!(target.norm_exceptions().is_some());
        target.from_bytes(&bytes, &[]).unwrap();
        assert!(target.norm_exceptions().is_none());
        assert_eq!(target.lexeme("gonna").unwrap().norm(), "");
    }

    #[test]
    fn test_vectors_cfg_version_checked() {
        let dir = tempdir().unwrap();
        sample().to_disk(dir.path(), &[]).unwrap();
        fs::write(
            dir.path().join(VECTORS_CFG_FILE),
            r#"{"version": 99, "name": null, "rows": 0, "dims": 0}"#,
        )
        .unwrap();
        let mut loaded = Vocab::new();
        assert!(matches!(
            loaded.from_disk(dir.path(), &[]),
            Err(LexiconError::MalformedPersistedState(_))
        ));
    }
}
