//! Revision archive
//!
//! Linear history of one document as a chain of revision nodes. Each node is
//! either a full snapshot or a forward diff against its predecessor. After
//! every mutation the nodes at 1-indexed positions `1, 1+N, 1+2N, …` and the
//! most recent node are full; every other node is a diff. Replaying any
//! revision therefore touches at most `N` patches.
//!
//! Author: Moroya Sakamoto

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::config::ArchiveConfig;
use crate::document::Document;
use crate::error::{ArchiveError, Result};
use crate::patch::{join_lines, split_lines, Patch};
use crate::version::{Version, VersionBump};

// ── Revision Metadata ─────────────────────────────────────────────────

/// Kind of save a node records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevisionState {
    /// Regular edit
    #[default]
    Normal,
    /// Deletion marker
    Deleted,
    /// Imported from another wiki
    Import,
}

impl RevisionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevisionState::Normal => "normal",
            RevisionState::Deleted => "deleted",
            RevisionState::Import => "import",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "normal" => Some(RevisionState::Normal),
            "deleted" => Some(RevisionState::Deleted),
            "import" => Some(RevisionState::Import),
            _ => None,
        }
    }
}

/// Who saved a revision, when and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionMeta {
    pub author: String,
    pub date: DateTime<Utc>,
    pub comment: String,
    pub state: RevisionState,
    /// Set when the revision stays on its predecessor's major line
    pub minor_edit: bool,
}

impl RevisionMeta {
    pub fn new(author: impl Into<String>, date: DateTime<Utc>, comment: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            date,
            comment: comment.into(),
            state: RevisionState::Normal,
            minor_edit: false,
        }
    }

    pub fn with_state(mut self, state: RevisionState) -> Self {
        self.state = state;
        self
    }
}

// ── Nodes ─────────────────────────────────────────────────────────────

/// Stored form of a node's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Complete text lines
    Full(Vec<String>),
    /// Forward delta from the predecessor's text
    Diff(Patch),
}

/// One stored revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionNode {
    version: Version,
    meta: RevisionMeta,
    payload: Payload,
}

impl RevisionNode {
    pub fn new(version: Version, meta: RevisionMeta, payload: Payload) -> Self {
        Self {
            version,
            meta,
            payload,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn meta(&self) -> &RevisionMeta {
        &self.meta
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[inline]
    pub fn is_diff(&self) -> bool {
        matches!(self.payload, Payload::Diff(_))
    }

    pub fn info(&self) -> RevisionNodeInfo {
        RevisionNodeInfo {
            version: self.version,
            is_diff: self.is_diff(),
            meta: self.meta.clone(),
        }
    }
}

/// Node metadata without content, as returned by history listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionNodeInfo {
    pub version: Version,
    pub is_diff: bool,
    pub meta: RevisionMeta,
}

/// A reconstructed revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub version: Version,
    pub meta: RevisionMeta,
    pub text: String,
}

// ── Lookup ────────────────────────────────────────────────────────────

/// Result of a version lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    /// Removed by `remove_versions`
    Deleted,
    /// Never stored in this archive
    NeverRecorded,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Deleted | Lookup::NeverRecorded => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(value) => Lookup::Found(f(value)),
            Lookup::Deleted => Lookup::Deleted,
            Lookup::NeverRecorded => Lookup::NeverRecorded,
        }
    }
}

/// Closed version range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionRange {
    pub from: Version,
    pub to: Version,
}

impl VersionRange {
    /// Ordered so that `from <= to`.
    pub fn new(a: Version, b: Version) -> Self {
        if a <= b {
            Self { from: a, to: b }
        } else {
            Self { from: b, to: a }
        }
    }

    #[inline]
    pub fn contains(&self, v: Version) -> bool {
        self.from <= v && v <= self.to
    }
}

// ── Archive ───────────────────────────────────────────────────────────

/// Revision history of one document
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionArchive {
    document_id: String,
    /// Strictly increasing by version
    nodes: Vec<RevisionNode>,
    deleted: Vec<VersionRange>,
    config: ArchiveConfig,
}

impl RevisionArchive {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self::with_config(document_id, ArchiveConfig::default())
    }

    pub fn with_config(document_id: impl Into<String>, config: ArchiveConfig) -> Self {
        Self {
            document_id: document_id.into(),
            nodes: Vec::new(),
            deleted: Vec::new(),
            config: config.normalized(),
        }
    }

    /// Assemble from decoded parts, checking the structural invariants that
    /// reconstruction relies on.
    pub(crate) fn from_parts(
        document_id: String,
        nodes: Vec<RevisionNode>,
        deleted: Vec<VersionRange>,
        config: ArchiveConfig,
    ) -> Result<Self> {
        if let Some(first) = nodes.first() {
            if first.is_diff() {
                return Err(ArchiveError::format(
                    &document_id,
                    format!("first node {} is a diff", first.version),
                ));
            }
        }
        if let Some(pair) = nodes.windows(2).find(|w| w[0].version >= w[1].version) {
            return Err(ArchiveError::format(
                &document_id,
                format!("versions out of order at {}", pair[1].version),
            ));
        }
        Ok(Self {
            document_id,
            nodes,
            deleted,
            config: config.normalized(),
        })
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[RevisionNode] {
        &self.nodes
    }

    pub fn node(&self, version: Version) -> Option<&RevisionNode> {
        self.index_of(version).map(|i| &self.nodes[i])
    }

    /// Ranges removed by earlier `remove_versions` calls.
    pub fn deleted_ranges(&self) -> &[VersionRange] {
        &self.deleted
    }

    pub fn latest_version(&self) -> Option<Version> {
        self.nodes.last().map(|n| n.version)
    }

    /// Retained versions, oldest first.
    pub fn versions(&self) -> Vec<Version> {
        self.nodes.iter().map(|n| n.version).collect()
    }

    /// Retained version just before `version`.
    pub fn prev_version(&self, version: Version) -> Option<Version> {
        let idx = self.nodes.partition_point(|n| n.version < version);
        idx.checked_sub(1).map(|i| self.nodes[i].version)
    }

    /// Retained version just after `version`.
    pub fn next_version(&self, version: Version) -> Option<Version> {
        let idx = self.nodes.partition_point(|n| n.version <= version);
        self.nodes.get(idx).map(|n| n.version)
    }

    pub(crate) fn index_of(&self, version: Version) -> Option<usize> {
        self.nodes
            .binary_search_by(|n| n.version.cmp(&version))
            .ok()
    }

    fn missing<T>(&self, version: Version) -> Lookup<T> {
        if self.deleted.iter().any(|r| r.contains(version)) {
            Lookup::Deleted
        } else {
            Lookup::NeverRecorded
        }
    }

    // ── Insertion ──

    /// Append a revision and return its version.
    ///
    /// The new node is stored full. The previous latest node is demoted to a
    /// diff unless its position is a checkpoint. Nothing changes on error.
    pub fn add_revision(
        &mut self,
        text: &str,
        mut meta: RevisionMeta,
        bump: VersionBump,
    ) -> Result<Version> {
        let latest = self.latest_version();
        let version = bump.resolve(latest);
        if let Some(latest) = latest {
            if version <= latest {
                return Err(ArchiveError::VersionOrder {
                    document_id: self.document_id.clone(),
                    latest,
                    requested: version,
                });
            }
        }
        meta.minor_edit = latest.is_some_and(|l| l.same_major(&version));

        // Compute the demotion before touching anything
        let mut demotion = None;
        if let Some(last) = self.nodes.len().checked_sub(1) {
            if !self.config.is_checkpoint(last + 1) {
                if let Payload::Full(own) = &self.nodes[last].payload {
                    let previous = self.text_at(last - 1)?;
                    demotion = Some((last, Patch::between(&previous, own)));
                }
            }
        }

        if let Some((idx, patch)) = demotion {
            trace!(
                document_id = %self.document_id,
                version = %self.nodes[idx].version,
                "demoting node to diff"
            );
            self.nodes[idx].payload = Payload::Diff(patch);
        }
        self.nodes.push(RevisionNode::new(
            version,
            meta,
            Payload::Full(split_lines(text)),
        ));

        debug!(document_id = %self.document_id, version = %version, "revision added");
        Ok(version)
    }

    /// Store a document snapshot in its canonical text form. Author, date and
    /// comment come from the document.
    pub fn add_snapshot(&mut self, document: &Document, bump: VersionBump) -> Result<Version> {
        let meta = RevisionMeta::new(document.author(), document.date(), document.comment());
        self.add_revision(&document.to_text()?, meta, bump)
    }

    // ── Reconstruction ──

    /// Rebuild the lines of the node at `idx` by replaying forward from the
    /// nearest full node at or before it.
    pub(crate) fn text_at(&self, idx: usize) -> Result<Vec<String>> {
        let start = self.nodes[..=idx]
            .iter()
            .rposition(|n| !n.is_diff())
            .ok_or_else(|| ArchiveError::PatchFailed {
                document_id: self.document_id.clone(),
                version: self.nodes[idx].version,
                reason: "no full snapshot precedes this node".to_string(),
            })?;

        let mut lines = Vec::new();
        for node in &self.nodes[start..=idx] {
            lines = self.resolve(node, &lines)?;
        }
        Ok(lines)
    }

    /// Texts of every retained node, in one forward pass.
    pub(crate) fn all_texts(&self) -> Result<Vec<Vec<String>>> {
        let mut texts: Vec<Vec<String>> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let previous = texts.last().map(Vec::as_slice).unwrap_or(&[]);
            let lines = self.resolve(node, previous)?;
            texts.push(lines);
        }
        Ok(texts)
    }

    fn resolve(&self, node: &RevisionNode, previous: &[String]) -> Result<Vec<String>> {
        match &node.payload {
            Payload::Full(lines) => Ok(lines.clone()),
            Payload::Diff(patch) => patch.apply(previous).map_err(|e| ArchiveError::PatchFailed {
                document_id: self.document_id.clone(),
                version: node.version,
                reason: e.to_string(),
            }),
        }
    }

    /// Reconstruct `version`, or the latest revision for `None`.
    pub fn get_revision(&self, version: Option<Version>) -> Result<Lookup<Revision>> {
        let idx = match version {
            None => match self.nodes.len().checked_sub(1) {
                Some(idx) => idx,
                None => return Ok(Lookup::NeverRecorded),
            },
            Some(v) => match self.index_of(v) {
                Some(idx) => idx,
                None => return Ok(self.missing(v)),
            },
        };

        let node = &self.nodes[idx];
        let lines = self.text_at(idx)?;
        trace!(document_id = %self.document_id, version = %node.version, "revision rebuilt");
        Ok(Lookup::Found(Revision {
            version: node.version,
            meta: node.meta.clone(),
            text: join_lines(&lines),
        }))
    }

    /// Reconstruct a revision stored with [`add_snapshot`](Self::add_snapshot).
    pub fn get_snapshot(&self, version: Option<Version>) -> Result<Lookup<Document>> {
        match self.get_revision(version)? {
            Lookup::Found(revision) => Ok(Lookup::Found(Document::from_text(&revision.text)?)),
            Lookup::Deleted => Ok(Lookup::Deleted),
            Lookup::NeverRecorded => Ok(Lookup::NeverRecorded),
        }
    }

    /// Nearest full node at or after `after`.
    pub fn get_next_full_version(&self, after: Version) -> Option<Version> {
        self.nodes
            .iter()
            .find(|n| n.version >= after && !n.is_diff())
            .map(|n| n.version)
    }

    /// Metadata for the nodes in the closed range, newest first. The bounds
    /// may be given in either order.
    pub fn get_nodes(&self, from: Version, to: Version) -> Vec<RevisionNodeInfo> {
        let range = VersionRange::new(from, to);
        self.nodes
            .iter()
            .rev()
            .filter(|n| range.contains(n.version))
            .map(RevisionNode::info)
            .collect()
    }

    // ── Internal rewrites ──

    /// Replace the node list, re-encoding nodes from `first_changed` on with
    /// the checkpoint policy. `texts` holds the full text of every node in
    /// `nodes`.
    pub(crate) fn rebuild(
        &self,
        mut nodes: Vec<RevisionNode>,
        texts: &[Vec<String>],
        first_changed: usize,
    ) -> Vec<RevisionNode> {
        let last = nodes.len().saturating_sub(1);
        for i in first_changed.min(nodes.len())..nodes.len() {
            nodes[i].payload = if i == last || self.config.is_checkpoint(i + 1) {
                Payload::Full(texts[i].clone())
            } else {
                Payload::Diff(Patch::between(&texts[i - 1], &texts[i]))
            };
        }
        nodes
    }

    pub(crate) fn replace_nodes(&mut self, nodes: Vec<RevisionNode>, removed: Option<VersionRange>) {
        self.nodes = nodes;
        if let Some(range) = removed {
            self.deleted.push(range);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meta(author: &str) -> RevisionMeta {
        RevisionMeta::new(author, Utc.timestamp_opt(1_600_000_000, 0).unwrap(), "")
    }

    fn archive_with(n: usize) -> RevisionArchive {
        let mut archive = RevisionArchive::new("Main.WebHome");
        for i in 1..=n {
            archive
                .add_revision(&format!("line a\nrevision {i}\nline c"), meta("admin"), VersionBump::Minor)
                .unwrap();
        }
        archive
    }

    fn full_positions(archive: &RevisionArchive) -> Vec<usize> {
        archive
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.is_diff())
            .map(|(i, _)| i + 1)
            .collect()
    }

    fn text(archive: &RevisionArchive, version: Version) -> String {
        archive
            .get_revision(Some(version))
            .unwrap()
            .found()
            .unwrap()
            .text
    }

    #[test]
    fn test_first_revision_is_initial_and_full() {
        let archive = archive_with(1);
        assert_eq!(archive.latest_version(), Some(Version::INITIAL));
        assert_eq!(full_positions(&archive), vec![1]);
    }

    #[test]
    fn test_full_diff_pattern_after_six() {
        let archive = archive_with(5);
        assert_eq!(full_positions(&archive), vec![1, 5]);

        let archive = archive_with(6);
        // node 5 demoted once node 6 arrives
        assert_eq!(full_positions(&archive), vec![1, 6]);
    }

    #[test]
    fn test_full_diff_pattern_long_chain() {
        let archive = archive_with(13);
        assert_eq!(full_positions(&archive), vec![1, 6, 11, 13]);
    }

    #[test]
    fn test_reconstruct_every_version() {
        let archive = archive_with(12);
        for (i, v) in archive.versions().into_iter().enumerate() {
            assert_eq!(text(&archive, v), format!("line a\nrevision {}\nline c", i + 1));
        }
    }

    #[test]
    fn test_latest_lookup_matches_explicit() {
        let archive = archive_with(7);
        let latest = archive.latest_version().unwrap();
        assert_eq!(
            archive.get_revision(None).unwrap(),
            archive.get_revision(Some(latest)).unwrap()
        );
    }

    #[test]
    fn test_empty_archive_lookups() {
        let archive = RevisionArchive::new("A.B");
        assert_eq!(archive.get_revision(None).unwrap(), Lookup::NeverRecorded);
        assert_eq!(
            archive.get_revision(Some(Version::INITIAL)).unwrap(),
            Lookup::NeverRecorded
        );
        assert!(archive.get_next_full_version(Version::INITIAL).is_none());
    }

    #[test]
    fn test_major_and_explicit_bumps() {
        let mut archive = RevisionArchive::new("A.B");
        archive.add_revision("a", meta("x"), VersionBump::Minor).unwrap();
        let v = archive.add_revision("b", meta("x"), VersionBump::Minor).unwrap();
        assert_eq!(v, Version::new(1, 2));
        assert!(archive.node(v).unwrap().meta().minor_edit);

        let v = archive.add_revision("c", meta("x"), VersionBump::Major).unwrap();
        assert_eq!(v, Version::new(2, 1));
        assert!(!archive.node(v).unwrap().meta().minor_edit);

        let v = archive
            .add_revision("d", meta("x"), VersionBump::Explicit(Version::new(4, 7)))
            .unwrap();
        assert_eq!(v, Version::new(4, 7));
    }

    #[test]
    fn test_explicit_version_must_increase() {
        let mut archive = archive_with(3);
        let before = archive.clone();
        let err = archive
            .add_revision("x", meta("x"), VersionBump::Explicit(Version::new(1, 2)))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::VersionOrder { .. }));
        assert_eq!(archive, before);
    }

    #[test]
    fn test_next_full_version() {
        let archive = archive_with(8);
        // full at positions 1, 6, 8
        assert_eq!(archive.get_next_full_version(Version::new(1, 1)), Some(Version::new(1, 1)));
        assert_eq!(archive.get_next_full_version(Version::new(1, 2)), Some(Version::new(1, 6)));
        assert_eq!(archive.get_next_full_version(Version::new(1, 7)), Some(Version::new(1, 8)));
        assert_eq!(archive.get_next_full_version(Version::new(1, 9)), None);
    }

    #[test]
    fn test_get_nodes_descending() {
        let archive = archive_with(6);
        let infos = archive.get_nodes(Version::new(1, 5), Version::new(1, 2));
        let versions: Vec<Version> = infos.iter().map(|n| n.version).collect();
        assert_eq!(
            versions,
            vec![
                Version::new(1, 5),
                Version::new(1, 4),
                Version::new(1, 3),
                Version::new(1, 2),
            ]
        );
        assert!(infos.iter().all(|n| n.is_diff));
    }

    #[test]
    fn test_prev_and_next_version() {
        let archive = archive_with(3);
        assert_eq!(archive.prev_version(Version::new(1, 2)), Some(Version::new(1, 1)));
        assert_eq!(archive.prev_version(Version::new(1, 1)), None);
        assert_eq!(archive.next_version(Version::new(1, 2)), Some(Version::new(1, 3)));
        assert_eq!(archive.next_version(Version::new(1, 3)), None);
        assert_eq!(archive.prev_version(Version::new(9, 1)), Some(Version::new(1, 3)));
    }

    #[test]
    fn test_trailing_newlines_preserved() {
        let mut archive = RevisionArchive::new("A.B");
        for t in ["", "\n", "a\n", "a\n\n", "a"] {
            archive.add_revision(t, meta("x"), VersionBump::Minor).unwrap();
        }
        let texts: Vec<String> = archive.versions().into_iter().map(|v| text(&archive, v)).collect();
        assert_eq!(texts, vec!["", "\n", "a\n", "a\n\n", "a"]);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut archive = RevisionArchive::new("Main.WebHome");
        let mut doc = Document::new("Main.WebHome");
        doc.set_content("first");
        doc.set_author("XWiki.Alice");
        archive.add_snapshot(&doc, VersionBump::Minor).unwrap();
        doc.set_content("second");
        doc.set_comment("edit");
        let v = archive.add_snapshot(&doc, VersionBump::Minor).unwrap();

        let node = archive.node(v).unwrap();
        assert_eq!(node.meta().author, "XWiki.Alice");
        assert_eq!(node.meta().comment, "edit");
        let first = archive.get_snapshot(Some(Version::INITIAL)).unwrap().found().unwrap();
        assert_eq!(first.content(), "first");
        let latest = archive.get_snapshot(None).unwrap().found().unwrap();
        assert_eq!(latest, doc);
    }

    #[test]
    fn test_snapshot_with_non_finite_float() {
        use crate::document::PropertyValue;

        let mut archive = RevisionArchive::new("Main.WebHome");
        let mut doc = Document::new("Main.WebHome");
        doc.new_object("Stats.Sample")
            .set_property("ratio", PropertyValue::Float(f64::INFINITY));
        doc.new_object("Stats.Sample")
            .set_property("ratio", PropertyValue::Float(f64::NAN));
        let v = archive.add_snapshot(&doc, VersionBump::Minor).unwrap();

        let back = archive.get_snapshot(Some(v)).unwrap().found().unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_minor_bump_at_max_is_rejected() {
        let mut archive = RevisionArchive::new("A.B");
        archive
            .add_revision("a", meta("x"), VersionBump::Explicit(Version::new(1, u32::MAX)))
            .unwrap();
        let before = archive.clone();
        let err = archive
            .add_revision("b", meta("x"), VersionBump::Minor)
            .unwrap_err();
        assert!(matches!(err, ArchiveError::VersionOrder { .. }));
        assert_eq!(archive, before);

        let v = archive.add_revision("b", meta("x"), VersionBump::Major).unwrap();
        assert_eq!(v, Version::new(2, 1));
    }

    #[test]
    fn test_corrupted_patch_reports_version() {
        let mut archive = archive_with(3);
        archive.nodes[1].payload = Payload::Diff(Patch::new(vec![
            crate::patch::EditCommand::Delete { line: 40, count: 1 },
        ]));
        let err = archive.get_revision(Some(Version::new(1, 2))).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::PatchFailed { version, .. } if version == Version::new(1, 2)
        ));
    }

    #[test]
    fn test_custom_interval() {
        let mut archive = RevisionArchive::with_config("A.B", ArchiveConfig::with_interval(3));
        for i in 0..8 {
            archive
                .add_revision(&i.to_string(), meta("x"), VersionBump::Minor)
                .unwrap();
        }
        assert_eq!(full_positions(&archive), vec![1, 4, 7, 8]);
    }

    #[test]
    fn test_lookup_map() {
        assert_eq!(Lookup::Found(2).map(|x| x * 2), Lookup::Found(4));
        assert_eq!(Lookup::<i32>::Deleted.map(|x| x * 2), Lookup::Deleted);
        assert!(Lookup::<()>::NeverRecorded.found().is_none());
    }
}
