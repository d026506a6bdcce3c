//! Revision filtering
//!
//! Author: Moroya Sakamoto

use chrono::{DateTime, Utc};

use crate::archive::{RevisionArchive, RevisionMeta, RevisionNodeInfo};

/// Which revisions of an archive to list.
///
/// With `include_minor` unset only the last revision of each major line is
/// kept, i.e. revisions whose successor is a minor edit are skipped. The
/// latest revision always passes that check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionCriteria {
    /// Exact author match; empty matches everyone
    pub author: String,
    /// Exclusive lower date bound
    pub min_date: Option<DateTime<Utc>>,
    /// Exclusive upper date bound
    pub max_date: Option<DateTime<Utc>>,
    pub include_minor: bool,
    /// Keep only the newest `n` matches
    pub limit: Option<usize>,
}

impl Default for RevisionCriteria {
    fn default() -> Self {
        Self {
            author: String::new(),
            min_date: None,
            max_date: None,
            include_minor: true,
            limit: None,
        }
    }
}

impl RevisionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn between(mut self, min_date: DateTime<Utc>, max_date: DateTime<Utc>) -> Self {
        self.min_date = Some(min_date);
        self.max_date = Some(max_date);
        self
    }

    pub fn include_minor(mut self, include_minor: bool) -> Self {
        self.include_minor = include_minor;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Author and date checks for one revision.
    pub fn matches(&self, meta: &RevisionMeta) -> bool {
        (self.author.is_empty() || self.author == meta.author)
            && self.min_date.map_or(true, |min| meta.date > min)
            && self.max_date.map_or(true, |max| meta.date < max)
    }
}

impl RevisionArchive {
    /// Revisions passing `criteria`, oldest first.
    pub fn revisions_matching(&self, criteria: &RevisionCriteria) -> Vec<RevisionNodeInfo> {
        let nodes = self.nodes();
        let mut found: Vec<RevisionNodeInfo> = nodes
            .iter()
            .enumerate()
            .filter(|(idx, _)| {
                criteria.include_minor
                    || nodes.get(idx + 1).map_or(true, |next| !next.meta().minor_edit)
            })
            .filter(|(_, node)| criteria.matches(node.meta()))
            .map(|(_, node)| node.info())
            .collect();

        if let Some(limit) = criteria.limit {
            let skip = found.len().saturating_sub(limit);
            found.drain(..skip);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{Version, VersionBump};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    /// 1.1 alice, 1.2 bob, 2.1 alice, 2.2 bob, 2.3 alice at t = 10, 20, ...
    fn archive() -> RevisionArchive {
        let mut archive = RevisionArchive::new("Main.WebHome");
        let plan = [
            ("alice", VersionBump::Minor),
            ("bob", VersionBump::Minor),
            ("alice", VersionBump::Major),
            ("bob", VersionBump::Minor),
            ("alice", VersionBump::Minor),
        ];
        for (i, (author, bump)) in plan.into_iter().enumerate() {
            let t = (i as i64 + 1) * 10;
            archive
                .add_revision(&format!("text {i}"), RevisionMeta::new(author, at(t), ""), bump)
                .unwrap();
        }
        archive
    }

    fn versions(infos: &[RevisionNodeInfo]) -> Vec<String> {
        infos.iter().map(|i| i.version.to_string()).collect()
    }

    #[test]
    fn test_default_matches_everything() {
        let archive = archive();
        let all = archive.revisions_matching(&RevisionCriteria::new());
        assert_eq!(versions(&all), vec!["1.1", "1.2", "2.1", "2.2", "2.3"]);
    }

    #[test]
    fn test_author_filter() {
        let archive = archive();
        let found = archive.revisions_matching(&RevisionCriteria::new().author("bob"));
        assert_eq!(versions(&found), vec!["1.2", "2.2"]);
    }

    #[test]
    fn test_date_window_is_exclusive() {
        let archive = archive();
        let found = archive.revisions_matching(&RevisionCriteria::new().between(at(10), at(40)));
        assert_eq!(versions(&found), vec!["1.2", "2.1"]);
    }

    #[test]
    fn test_major_only_keeps_last_of_each_line() {
        let archive = archive();
        let found = archive.revisions_matching(&RevisionCriteria::new().include_minor(false));
        assert_eq!(versions(&found), vec!["1.2", "2.3"]);
    }

    #[test]
    fn test_limit_keeps_newest() {
        let archive = archive();
        let found = archive.revisions_matching(&RevisionCriteria::new().limit(2));
        assert_eq!(versions(&found), vec!["2.2", "2.3"]);
        assert_eq!(found[1].version, Version::new(2, 3));
    }

    #[test]
    fn test_matches_meta() {
        let criteria = RevisionCriteria::new().author("alice");
        assert!(criteria.matches(&RevisionMeta::new("alice", at(0), "")));
        assert!(!criteria.matches(&RevisionMeta::new("bob", at(0), "")));
    }
}
