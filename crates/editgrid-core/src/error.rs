//! Error types for submission handling
//!
//! Three groups:
//! - fail-fast request errors (token, tampering, malformed payload)
//! - store failures, split into reads and writes
//! - configuration loading errors

use editgrid_model::ModelError;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

/// Structural problems in a flat submission payload
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A writable cell of a started row is absent
    #[error("row {row}: missing cell {cell}")]
    MissingCell { row: usize, cell: String },

    /// Key marker present but not decodable
    #[error("row {row}: invalid key marker: {reason}")]
    InvalidKeyMarker { row: usize, reason: String },

    /// Compressed key does not split into one part per key column
    #[error("row {row}: key has {found} parts, expected {expected}")]
    KeyArity {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Cell identifier in none of the known formats
    #[error("unrecognised cell id: {0}")]
    InvalidCellId(String),

    /// Row could not be added to the collection
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Failures reported by a record store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No record under the given key
    #[error("record not found")]
    NotFound,

    /// Record could not be created
    #[error("{0}")]
    Insert(String),

    /// Record could not be changed
    #[error("{0}")]
    Update(String),

    /// Record could not be removed
    #[error("{0}")]
    Delete(String),

    /// Read failed
    #[error("{0}")]
    Read(String),

    /// Transaction lost to a concurrent commit
    #[error("concurrent modification, transaction aborted")]
    Conflict,

    /// Anything else from the backend
    #[error("{0}")]
    Backend(String),
}

/// Kind of store write that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    /// Opening the transaction
    Begin,
    /// Creating a record
    Insert,
    /// Updating a record
    Update,
    /// Deleting a record
    Delete,
    /// Committing the transaction
    Commit,
}

impl Display for WriteOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Begin => "begin",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Commit => "commit",
        };
        f.write_str(s)
    }
}

/// Errors ending a reconcile or render call
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Form name mismatch, or token unknown/expired/used
    #[error("invalid form token")]
    InvalidToken,

    /// Table digest or key markers do not match what was issued
    #[error("tampered submission: {0}")]
    TamperedSubmission(String),

    /// Payload structure broken
    #[error("malformed submission: {0}")]
    MalformedSubmission(#[from] ParseError),

    /// Store read failed during rendering or conflict detection
    #[error("store read failed: {0}")]
    StoreReadFailed(StoreError),

    /// A write failed; the transaction was rolled back
    #[error("[db {op} error] {source}")]
    StoreWriteFailed {
        /// Failed operation
        op: WriteOp,
        /// Submission row being written, if any
        row: Option<usize>,
        /// Underlying store error
        #[source]
        source: StoreError,
    },

    /// Model invariant violated
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl ReconcileError {
    /// Raised before any row was parsed
    #[inline]
    #[must_use]
    pub fn is_fail_fast(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken | Self::TamperedSubmission(_) | Self::MalformedSubmission(_)
        )
    }

    /// Message suitable for showing to the submitting user
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidToken => "form expired or already submitted, please reload".to_string(),
            Self::TamperedSubmission(_) => "table has been modified, please reload".to_string(),
            Self::MalformedSubmission(_) => "incomplete submission, please reload".to_string(),
            Self::StoreReadFailed(e) => format!("[db read error] {e}"),
            Self::StoreWriteFailed { .. } => self.to_string(),
            Self::Model(e) => e.to_string(),
        }
    }
}

/// Grid configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serialization back to TOML failed
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Column/key declarations do not form a schema
    #[error("invalid schema: {0}")]
    Schema(#[from] ModelError),

    /// Value out of its allowed domain
    #[error("invalid setting: {0}")]
    Invalid(String),
}
