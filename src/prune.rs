//! History pruning
//!
//! Removes a closed range of versions from an archive. Every retained node
//! from the first affected position on is re-encoded against its new
//! predecessor, so retained versions keep rebuilding byte for byte and the
//! full/diff pattern holds for the shortened chain.
//!
//! Author: Moroya Sakamoto

use tracing::{debug, info};

use crate::archive::{RevisionArchive, VersionRange};
use crate::error::Result;
use crate::version::Version;

// ── Prune Result ───────────────────────────────────────────────────────

/// Statistics from a pruning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneResult {
    /// Nodes left in the archive.
    pub retained: usize,
    /// Nodes removed.
    pub removed: usize,
    /// Nodes before pruning.
    pub total_before: usize,
}

impl PruneResult {
    /// True if any node was removed.
    #[inline]
    pub fn did_remove(&self) -> bool {
        self.removed > 0
    }
}

impl RevisionArchive {
    /// Delete every node whose version lies in the closed range. Bounds may
    /// come in either order.
    ///
    /// # Algorithm
    ///
    /// 1. **Rebuild**: replay the whole chain once to get every node's text.
    /// 2. **Re-encode**: drop the range, then re-encode retained nodes from
    ///    the one just before the gap onwards.
    /// 3. **Swap**: install the new node list. On any failure the archive is
    ///    left untouched.
    pub fn remove_versions(&mut self, from: Version, to: Version) -> Result<PruneResult> {
        let range = VersionRange::new(from, to);
        let total_before = self.len();
        let first_removed = match self.nodes().iter().position(|n| range.contains(n.version())) {
            Some(idx) => idx,
            None => {
                debug!(document_id = %self.document_id(), %from, %to, "nothing to prune");
                return Ok(self.dry_run(from, to));
            }
        };

        let texts = self.all_texts()?;
        let (nodes, texts): (Vec<_>, Vec<_>) = self
            .nodes()
            .iter()
            .cloned()
            .zip(texts)
            .filter(|(node, _)| !range.contains(node.version()))
            .unzip();

        let rebuilt = self.rebuild(nodes, &texts, first_removed.saturating_sub(1));
        let result = PruneResult {
            retained: rebuilt.len(),
            removed: total_before - rebuilt.len(),
            total_before,
        };
        self.replace_nodes(rebuilt, Some(range));

        info!(
            document_id = %self.document_id(),
            %from,
            %to,
            removed = result.removed,
            "pruned revisions"
        );
        Ok(result)
    }

    /// Compute what [`remove_versions`](Self::remove_versions) would remove.
    pub fn dry_run(&self, from: Version, to: Version) -> PruneResult {
        let range = VersionRange::new(from, to);
        let total_before = self.len();
        let removed = self
            .nodes()
            .iter()
            .filter(|n| range.contains(n.version()))
            .count();
        PruneResult {
            retained: total_before - removed,
            removed,
            total_before,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
