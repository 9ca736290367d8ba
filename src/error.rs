//! Error taxonomy shared by every control-plane component.
//!
//! Every public operation returns [`Error`], which pairs the failing
//! operation name with an [`ErrorKind`]. Callers match on the kind; logs
//! and API responses render both.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong, independent of where.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unsupported balance type, empty endpoint list, malformed key.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown id or empty stored value.
    #[error("not found: {0}")]
    NotFound(String),

    /// Record or descriptor bytes could not be decoded or resolved.
    #[error("schema error: {0}")]
    Schema(String),

    /// Attempt to modify an immutable field.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Configuration store unreachable.
    #[error("store unavailable: {0}")]
    TransientStore(String),

    /// Watch asked to resume from a revision the store no longer retains.
    #[error("revision compacted: {0}")]
    Compacted(String),

    /// Change-feed event kind that is neither PUT nor DELETE.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
}

/// An [`ErrorKind`] tagged with the operation that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{op}: {kind}")]
pub struct Error {
    op: &'static str,
    #[source]
    kind: ErrorKind,
}

impl Error {
    pub fn new(op: &'static str, kind: ErrorKind) -> Self {
        Self { op, kind }
    }

    pub fn validation(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(op, ErrorKind::Validation(message.into()))
    }

    pub fn not_found(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(op, ErrorKind::NotFound(message.into()))
    }

    pub fn schema(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(op, ErrorKind::Schema(message.into()))
    }

    pub fn conflict(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(op, ErrorKind::Conflict(message.into()))
    }

    pub fn transient(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(op, ErrorKind::TransientStore(message.into()))
    }

    pub fn compacted(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(op, ErrorKind::Compacted(message.into()))
    }

    pub fn unknown_operation(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(op, ErrorKind::UnknownOperation(message.into()))
    }

    /// Name of the operation that failed.
    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Re-tag an error surfaced by a lower layer with the caller's operation.
    /// The kind is preserved so callers can still match on it.
    pub fn within(self, op: &'static str) -> Self {
        Self { op, kind: self.kind }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound(_))
    }

    pub fn is_compacted(&self) -> bool {
        matches!(self.kind, ErrorKind::Compacted(_))
    }
}
