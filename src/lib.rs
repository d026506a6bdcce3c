//! revision-archive: document history and three-way merge
//!
//! Keep every version, store most of them as diffs.
//!
//! Versioned revision archive and merge engine for structured wiki
//! documents:
//! - RCS-like archive: periodic full checkpoints, line diffs in between
//! - Exact reconstruction of any retained version, range pruning
//! - Field, content, object, class and attachment diff reports
//! - Three-way merge with per-target decisions and a conflict log
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`archive`] | Revision nodes, insertion with checkpoint policy, reconstruction |
//! | [`codec`] | Line-oriented archive blob and patch encoding |
//! | [`config`] | Archive and merge settings |
//! | [`criteria`] | Filtering revisions by author, date and minor edits |
//! | [`diff`] | Snapshot diff report |
//! | [`document`] | Document snapshot model: metadata, content, objects, attachments |
//! | [`error`] | Error type and `Result` alias |
//! | [`merge`] | Three-way document merge |
//! | [`patch`] | Line diff, edit-script patches and line merge |
//! | [`prune`] | Removing version ranges from an archive |
//! | [`store`] | Blob persistence and per-document locking |
//! | [`version`] | `major.minor` version identifiers |
//!
//! # Quick Start
//!
//! ```
//! use chrono::Utc;
//! use revision_archive::{
//!     merge_documents, Document, MergeConfig, RevisionArchive, RevisionMeta, VersionBump,
//! };
//!
//! let mut archive = RevisionArchive::new("Main.WebHome");
//! let v1 = archive
//!     .add_revision("hello", RevisionMeta::new("alice", Utc::now(), ""), VersionBump::Minor)
//!     .unwrap();
//! archive
//!     .add_revision("hello\nworld", RevisionMeta::new("bob", Utc::now(), ""), VersionBump::Minor)
//!     .unwrap();
//!
//! let first = archive.get_revision(Some(v1)).unwrap().found().unwrap();
//! assert_eq!(first.text, "hello");
//!
//! // Concurrent edits on disjoint lines merge cleanly
//! let mut ancestor = Document::new("Main.WebHome");
//! ancestor.set_content("some content");
//! let mut current = ancestor.clone();
//! current.set_content("before\nsome content");
//! let mut incoming = ancestor.clone();
//! incoming.set_content("some content\nafter");
//!
//! let (merged, result) = merge_documents(&ancestor, &current, &incoming, &MergeConfig::default());
//! assert_eq!(merged.content(), "before\nsome content\nafter");
//! assert!(result.is_modified());
//! ```
//!
//! Author: Moroya Sakamoto

pub mod archive;
pub mod codec;
pub mod config;
pub mod criteria;
pub mod diff;
pub mod document;
pub mod error;
pub mod merge;
pub mod patch;
pub mod prune;
pub mod store;
pub mod version;

pub use archive::{
    Lookup, Payload, Revision, RevisionArchive, RevisionMeta, RevisionNode, RevisionNodeInfo,
    RevisionState, VersionRange,
};
pub use codec::{decode_archive, decode_patch, encode_archive, encode_patch};
pub use config::{ArchiveConfig, ConflictFallback, MergeConfig};
pub use criteria::RevisionCriteria;
pub use diff::{ChangeAction, DiffEntry, DiffReport};
pub use document::{
    Attachment, ClassDefinition, Document, FieldDefinition, FieldKind, PropertyValue,
    StructuredObject,
};
pub use error::{ArchiveError, Result};
pub use merge::{merge_documents, LogEntry, LogLevel, MergeResult};
pub use patch::{diff_lines, merge_lines, EditCommand, LineDelta, LineMerge, Patch, PatchError};
pub use prune::PruneResult;
pub use store::{ArchiveStore, BlobStore, MemoryBlobStore};
pub use version::{Version, VersionBump};
