// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
//! Named auxiliary tables consulted by attribute getters.
//!
//! The store treats tables as opaque string -> string data. It only reads one
//! of them itself: [`NORM_EXCEPTIONS_TABLE`], which overrides the norm getter.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::error::{LexiconError, Result};

/// Table of normalization exceptions composited into the norm getter.
pub const NORM_EXCEPTIONS_TABLE: &str = "lexeme_norm";

/// File name of the lookups inside a vocabulary directory.
pub const LOOKUPS_FILE: &str = "lookups.bin";

/// One named string -> string table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    name: String,
    entries: BTreeMap<String, String>,
}

impl Table {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn from_entries<I, K, V>(name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Collection of named tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookups {
    tables: BTreeMap<String, Table>,
}

impl Lookups {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an empty table.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::TableExists`] if the name is taken.
    pub fn add_table(&mut self, name: &str) -> Result<&mut Table> {
        if self.tables.contains_key(name) {
            return Err(LexiconError::TableExists(name.to_string()));
        }
        Ok(self
            .tables
            .entry(name.to_string())
            .or_insert_with(|| Table::new(name)))
    }

    /// Insert a table, replacing any table of the same name.
    pub fn set_table(&mut self, table: Table) -> Option<Table> {
        self.tables.insert(table.name.clone(), table)
    }

    /// # Errors
    ///
    /// Returns [`LexiconError::TableNotFound`] if no table has that name.
    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| LexiconError::TableNotFound(name.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`LexiconError::TableNotFound`] if no table has that name.
    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| LexiconError::TableNotFound(name.to_string()))
    }

    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// # Errors
    ///
    /// Returns [`LexiconError::TableNotFound`] if no table has that name.
    pub fn remove_table(&mut self, name: &str) -> Result<Table> {
        self.tables
            .remove(name)
            .ok_or_else(|| LexiconError::TableNotFound(name.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> + '_ {
        self.tables.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// # Errors
    ///
    /// Returns [`LexiconError::Serialization`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// # Errors
    ///
    /// Returns [`LexiconError::MalformedPersistedState`] if the bytes do not
    /// decode to lookups.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| LexiconError::malformed("lookups", e))
    }

    /// Write `lookups.bin` under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_disk(&self, dir: &Path) -> Result<()> {
        let path = dir.join(LOOKUPS_FILE);
        let temp_path = path.with_extension("tmp");
        {
            let writer = BufWriter::new(File::create(&temp_path)?);
            bincode::serialize_into(writer, self)?;
        }
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    /// Read `lookups.bin` under `dir`. A missing file reads as empty lookups.
    ///
    /// # Errors
    ///
    /// Returns [`LexiconError::MalformedPersistedState`] if the file does not
    /// decode, or an I/O error if it cannot be read.
    pub fn from_disk(dir: &Path) -> Result<Self> {
        let path = dir.join(LOOKUPS_FILE);
        if !path.exists() {
            return Ok(Self::new());
        }
        let reader = BufReader::new(File::open(&path)?);
        bincode::deserialize_from(reader).map_err(|e| LexiconError::malformed(LOOKUPS_FILE, e))
    }
}
