//! Error types
//!
//! Failures that callers must handle. "Not found" outcomes are not errors:
//! they come back as [`crate::archive::Lookup`] values. Merge conflicts are
//! not errors either; they are logged in [`crate::merge::MergeResult`].
//!
//! Author: Moroya Sakamoto

use thiserror::Error;

use crate::version::Version;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Error type for archive, version and storage operations
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Serialized archive blob could not be parsed
    #[error("malformed archive for document {document_id}: {reason}")]
    ArchiveFormat { document_id: String, reason: String },

    /// Version identifier string is not `major.minor`
    #[error("malformed version identifier: {0:?}")]
    VersionFormat(String),

    /// Explicit version does not follow the latest recorded version
    #[error("version {requested} for document {document_id} must be greater than latest {latest}")]
    VersionOrder {
        document_id: String,
        latest: Version,
        requested: Version,
    },

    /// A stored diff could not be applied during reconstruction
    #[error("cannot rebuild {version} of document {document_id}: {reason}")]
    PatchFailed {
        document_id: String,
        version: Version,
        reason: String,
    },

    /// Document snapshot (de)serialization failure
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistence collaborator failure
    #[error("storage error for document {document_id}: {reason}")]
    Storage { document_id: String, reason: String },
}

impl ArchiveError {
    pub(crate) fn format(document_id: &str, reason: impl Into<String>) -> Self {
        ArchiveError::ArchiveFormat {
            document_id: document_id.to_string(),
            reason: reason.into(),
        }
    }

    /// Document identity carried by the error, if any.
    pub fn document_id(&self) -> Option<&str> {
        match self {
            ArchiveError::ArchiveFormat { document_id, .. }
            | ArchiveError::VersionOrder { document_id, .. }
            | ArchiveError::PatchFailed { document_id, .. }
            | ArchiveError::Storage { document_id, .. } => Some(document_id),
            ArchiveError::VersionFormat(_) | ArchiveError::Serialization(_) => None,
        }
    }
}
