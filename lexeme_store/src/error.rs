// SPDX-License-Identifier: BSL-1.1 OR Apache-2.0
use thiserror::Error;

use crate::strings::StringKey;

#[derive(Debug, Error)]
pub enum LexiconError {
    #[error("unknown string key: {0}")]
    UnknownKey(StringKey),

    #[error("invalid flag id: {0} (must be in 1..=63)")]
    InvalidFlagId(u32),

    #[error("no free flag bits: all of 1..=63 are registered")]
    NoFreeBits,

    #[error("lexeme arena cannot grow: requested {requested} records, limit {limit}")]
    AllocationError { requested: usize, limit: usize },

    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("malformed persisted state: {0}")]
    MalformedPersistedState(String),

    #[error("vector row {row} out of bounds for table with {rows} rows")]
    RowOutOfBounds { row: usize, rows: usize },

    #[error("vector table shape {rows}x{dims} cannot be allocated")]
    InvalidShape { rows: usize, dims: usize },

    #[error("vector table full: all {rows} rows are assigned")]
    TableFull { rows: usize },

    #[error("prune target of 0 rows leaves no survivors to remap onto")]
    NoSurvivingRows,

    #[error("lookup table already exists: {0}")]
    TableExists(String),

    #[error("lookup table not found: {0}")]
    TableNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LexiconError {
    pub(crate) fn malformed(what: &str, err: impl std::fmt::Display) -> Self {
        Self::MalformedPersistedState(format!("{what}: {err}"))
    }
}

impl From<bincode::Error> for LexiconError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for LexiconError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LexiconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = LexiconError::UnknownKey(StringKey::new(42));
        assert_eq!(e.to_string(), "unknown string key: 42");

        let e = LexiconError::InvalidFlagId(64);
        assert!(e.to_string().contains("invalid flag id: 64"));

        let e = LexiconError::DimensionMismatch {
            expected: 300,
            got: 128,
        };
        assert_eq!(
            e.to_string(),
            "vector dimension mismatch: expected 300, got 128"
        );

        let e = LexiconError::AllocationError {
            requested: 11,
            limit: 10,
        };
        assert!(e.to_string().contains("limit 10"));

        let e = LexiconError::MalformedPersistedState("bad magic".into());
        assert_eq!(e.to_string(), "malformed persisted state: bad magic");
    }

    #[test]
    fn test_from_bincode_error() {
        let bad_data: &[u8] = &[0xff, 0xff, 0xff];
        let result: std::result::Result<String, _> = bincode::deserialize(bad_data);

        if let Err(e) = result {
            let err: LexiconError = e.into();
            assert!(matches!(err, LexiconError::Serialization(_)));
        }
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: LexiconError = io.into();
        assert!(matches!(err, LexiconError::Io(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_malformed_helper() {
        let err = LexiconError::malformed("strings.json", "unexpected eof");
        assert_eq!(
            err.to_string(),
            "malformed persisted state: strings.json: unexpected eof"
        );
    }
}
