//! # Error Types
//!
//! The error taxonomy shared by every role, plus the per-batch failure list
//! used for best-effort operation batches.

use log::{error, warn};
use thiserror::Error;

use crate::types::ObjectId;

/// Errors raised on the synchronization path
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// An id in an operation or property change has no local object
    #[error("unresolved object id {0}")]
    UnresolvedId(ObjectId),

    /// The id or the object is already bound to something else
    #[error("duplicate registration of object id {id}")]
    DuplicateRegistration { id: ObjectId },

    /// Canonical ids can only be handed out by the simulator
    #[error("this registry is not the canonical id authority")]
    NotAuthority,

    /// An edit no longer applies to the current scene
    #[error("stale edit: {0}")]
    StaleEdit(String),

    /// A handle referenced an object that was reaped or collected
    #[error("stale object handle")]
    StaleHandle,

    /// The operation is well formed but can't be applied to this scene
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The peer went away
    #[error("peer disconnected")]
    Disconnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("codec error: {0}")]
    Codec(String),

    /// A message arrived that the current state can't accept
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether this error ends the stream pair
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Transport(_) | Self::Codec(_))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => Self::Disconnected,
            _ => Self::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

/// One failed operation of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct OperationFailure {
    /// Position of the operation in its batch
    pub index: usize,

    /// Name of the operation kind
    pub kind: &'static str,

    pub error: SyncError,

    /// Call stack captured where the operation was queued, if any
    pub backtrace: Option<Vec<String>>,
}

/// Failures collected while applying a batch.
///
/// A failing operation never stops the batch; the failures are logged in
/// aggregate once the batch is done.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchErrors {
    failures: Vec<OperationFailure>,
}

impl BatchErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, failure: OperationFailure) {
        self.failures.push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn failures(&self) -> &[OperationFailure] {
        &self.failures
    }

    /// Indices of the failed operations
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|failure| failure.index).collect()
    }

    /// Move every failure of `other` into this list
    pub fn extend(&mut self, other: BatchErrors) {
        self.failures.extend(other.failures);
    }

    /// Log every failure and clear the list
    pub fn log_and_clear(&mut self, batch: &str) {
        if self.failures.is_empty() {
            return;
        }

        error!("{} operation(s) failed in {}", self.failures.len(), batch);
        for failure in self.failures.drain(..) {
            warn!("  #{} {}: {}", failure.index, failure.kind, failure.error);
            if let Some(frames) = failure.backtrace {
                for frame in frames {
                    warn!("      {}", frame);
                }
            }
        }
    }
}
