//! Archive persistence
//!
//! [`BlobStore`] is the seam to whatever keeps serialized archives (one
//! text blob per document id). [`ArchiveStore`] layers the per-document
//! exclusive lock on top: load, mutate a clone, save only on success.
//!
//! Author: Moroya Sakamoto

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::archive::{Lookup, Revision, RevisionArchive, RevisionMeta};
use crate::config::ArchiveConfig;
use crate::error::Result;
use crate::prune::PruneResult;
use crate::version::{Version, VersionBump};

/// Keeps one serialized archive blob per document id
pub trait BlobStore: Send + Sync {
    /// Stored blob, or `None` if the document has no archive yet
    fn load_archive_blob(&self, document_id: &str) -> Result<Option<String>>;

    fn save_archive_blob(&self, document_id: &str, blob: &str) -> Result<()>;
}

/// In-memory blob store
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored archives
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.blobs.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl BlobStore for MemoryBlobStore {
    fn load_archive_blob(&self, document_id: &str) -> Result<Option<String>> {
        Ok(self.blobs.read().get(document_id).cloned())
    }

    fn save_archive_blob(&self, document_id: &str, blob: &str) -> Result<()> {
        self.blobs
            .write()
            .insert(document_id.to_string(), blob.to_string());
        Ok(())
    }
}

/// Archive access serialized per document
pub struct ArchiveStore<S: BlobStore> {
    blobs: S,
    config: ArchiveConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: BlobStore> ArchiveStore<S> {
    pub fn new(blobs: S) -> Self {
        Self::with_config(blobs, ArchiveConfig::default())
    }

    pub fn with_config(blobs: S, config: ArchiveConfig) -> Self {
        Self {
            blobs,
            config: config.normalized(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn blobs(&self) -> &S {
        &self.blobs
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    fn lock_for(&self, document_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .entry(document_id.to_string())
            .or_default()
            .clone()
    }

    /// Run `f` under the document's lock, then drop the lock entry if no
    /// other caller holds or waits on it.
    fn locked<T>(&self, document_id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.lock_for(document_id);
        let result = {
            let _guard = lock.lock();
            f()
        };
        // One reference in the map, one here.
        let mut locks = self.locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(document_id);
        }
        result
    }

    fn read(&self, document_id: &str) -> Result<RevisionArchive> {
        match self.blobs.load_archive_blob(document_id)? {
            Some(blob) => {
                debug!(document_id, bytes = blob.len(), "loaded archive");
                RevisionArchive::deserialize(document_id, &blob, self.config)
            }
            None => {
                debug!(document_id, "no archive yet");
                Ok(RevisionArchive::with_config(document_id, self.config))
            }
        }
    }

    /// Load the archive for a document (empty if none is stored).
    pub fn load(&self, document_id: &str) -> Result<RevisionArchive> {
        self.locked(document_id, || self.read(document_id))
    }

    /// Run `f` on a copy of the document's archive under its exclusive
    /// lock. The copy replaces the stored archive only if `f` succeeds.
    pub fn with_archive<T, F>(&self, document_id: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut RevisionArchive) -> Result<T>,
    {
        self.locked(document_id, || {
            let stored = self.read(document_id)?;
            let mut working = stored.clone();
            let value = f(&mut working)?;
            if working != stored {
                let blob = working.serialize();
                self.blobs.save_archive_blob(document_id, &blob)?;
                info!(document_id, nodes = working.len(), "saved archive");
            }
            Ok(value)
        })
    }

    pub fn add_revision(
        &self,
        document_id: &str,
        text: &str,
        meta: RevisionMeta,
        bump: VersionBump,
    ) -> Result<Version> {
        self.with_archive(document_id, |archive| archive.add_revision(text, meta, bump))
    }

    pub fn get_revision(&self, document_id: &str, version: Option<Version>) -> Result<Lookup<Revision>> {
        self.load(document_id)?.get_revision(version)
    }

    pub fn remove_versions(&self, document_id: &str, from: Version, to: Version) -> Result<PruneResult> {
        self.with_archive(document_id, |archive| archive.remove_versions(from, to))
    }
}
