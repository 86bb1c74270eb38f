use std::path::PathBuf;

use thiserror::Error;

use crate::types::EntityId;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CanonError>;

/// Errors surfaced by the resolution engine.
///
/// Per-mention problems ([`CanonError::MalformedMention`],
/// [`CanonError::AliasConflict`]) are recovered inside a batch; everything that
/// threatens store-wide consistency aborts the batch before commit.
#[derive(Debug, Error)]
pub enum CanonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("snapshot is read-only; reopen with write access")]
    ReadOnly,

    #[error("malformed mention {raw:?}: {reason}")]
    MalformedMention { raw: String, reason: &'static str },

    #[error("alias {alias:?} is owned by {existing}, refusing to reassign to {attempted}")]
    AliasConflict {
        alias: String,
        existing: EntityId,
        attempted: EntityId,
    },

    #[error("graph references entity {entity} absent from the canonical store ({context})")]
    GraphConsistency { entity: EntityId, context: String },

    #[error("store invariant violated: {reason}")]
    InvariantViolation { reason: String },

    #[error("entity {id} not found")]
    EntityNotFound { id: String },

    #[error("no entity matches {query:?}")]
    NotFound { query: String },

    #[error("invalid merge: {reason}")]
    InvalidMerge { reason: String },

    #[error("invalid resolver options: {reason}")]
    InvalidOptions { reason: String },

    #[error("merge #{seq} not found")]
    MergeNotFound { seq: u64 },

    #[error("review flag #{id} not found or already closed")]
    ReviewNotFound { id: u64 },

    #[error("invalid snapshot {path:?}: {reason}")]
    InvalidSnapshot { path: PathBuf, reason: String },

    #[error("snapshot checksum mismatch for {path:?}")]
    ChecksumMismatch { path: PathBuf },

    #[error("snapshot encode failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("snapshot decode failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no reader supports source {source_id:?}")]
    UnsupportedSource { source_id: String },

    #[error("malformed {reader} input at line {line}: {reason}")]
    MalformedSource {
        reader: &'static str,
        line: usize,
        reason: String,
    },
}

impl CanonError {
    /// True for errors that only affect a single mention or alias and can be
    /// skipped without aborting the surrounding batch.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedMention { .. } | Self::AliasConflict { .. } | Self::MalformedSource { .. }
        )
    }
}

