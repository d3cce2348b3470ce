//! Error types for visword.
//!
//! Errors are split by how the caller is expected to react:
//!
//! - **Data-quality errors** (`ConfigMismatch`, `EmptyDictionary`) are
//!   recoverable. Queries absorb them into sentinel results (`0` ids). A query
//!   with no rows is not an error at all; it resolves to an empty result.
//! - **Contract violations** (`DuplicateId`, `InvalidWord`, `MissingWord`,
//!   `InvariantViolation`) mean an upstream component broke its contract.
//!   They are returned, never converted into sentinels.
//!
//! [`RpcError`] covers the network boundary and [`StageError`] the pipeline
//! stages, which wrap both. A stage turns any error into a [`FailureKind`]
//! carried by the failed request.

use crate::descriptor::DescriptorShape;
use crate::WordId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while maintaining or querying a word index.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexError {
    /// Descriptor type or dimension differs from the dictionary's canonical shape.
    #[error("descriptor shape {actual} does not match dictionary shape {expected}")]
    ConfigMismatch {
        expected: DescriptorShape,
        actual: DescriptorShape,
    },

    /// No words stored.
    #[error("dictionary is empty")]
    EmptyDictionary,

    /// A word with this id is already stored.
    #[error("word {0} already exists")]
    DuplicateId(WordId),

    /// Word cannot be stored at all (id 0, empty or non-finite descriptor).
    #[error("invalid word {id}: {reason}")]
    InvalidWord { id: WordId, reason: String },

    /// A word referenced by id is not in the store.
    #[error("word {0} not found")]
    MissingWord(WordId),

    /// Internal or upstream invariant broken.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl IndexError {
    /// Whether the error is a data-quality problem that callers may absorb.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IndexError::ConfigMismatch { .. } | IndexError::EmptyDictionary
        )
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Why a request was not resolved. Serializable so it can cross the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    ConfigMismatch,
    RemoteCallFailure,
    InvariantViolation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::ConfigMismatch => "config mismatch",
            FailureKind::RemoteCallFailure => "remote call failure",
            FailureKind::InvariantViolation => "invariant violation",
        };
        f.write_str(s)
    }
}

impl IndexError {
    pub fn failure_kind(&self) -> FailureKind {
        if self.is_recoverable() {
            FailureKind::ConfigMismatch
        } else {
            FailureKind::InvariantViolation
        }
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] postcard::Error),

    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with a failure.
    #[error("remote {kind}: {message}")]
    Remote { kind: FailureKind, message: String },

    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

/// Errors seen by a pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("{0} is not supported by this resolver")]
    Unsupported(&'static str),

    #[error("stage channel closed")]
    ChannelClosed,

    #[error("stage task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

impl StageError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            StageError::Index(err) => err.failure_kind(),
            StageError::Rpc(RpcError::Remote { kind, .. }) => *kind,
            StageError::Rpc(_) => FailureKind::RemoteCallFailure,
            StageError::Unsupported(_) | StageError::ChannelClosed | StageError::TaskFailed(_) => {
                FailureKind::InvariantViolation
            }
        }
    }
}
