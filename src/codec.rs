//! Archive blob codec: RCS-style text serialization
//!
//! Encodes a whole revision archive into one text blob, newest node first:
//!
//! ```text
//! head	1.3;
//! document	@Main.WebHome@;
//! deleted	1.2:1.2;
//!
//! 1.3
//! date	2024-03-01T10:00:00+00:00;
//! author	@XWiki.Admin@;
//! state	normal;
//! minor	true;
//! kind	full;
//! log
//! @fixed a typo@
//! text
//! @...@
//! ```
//!
//! Strings live between `@` delimiters with `@` doubled inside. Full nodes
//! carry their text; diff nodes carry an ed-style script (`d<line> <count>`,
//! `a<after> <count>` followed by the added lines).
//!
//! Author: Moroya Sakamoto

use chrono::{DateTime, Utc};

use crate::archive::{Payload, RevisionArchive, RevisionMeta, RevisionNode, RevisionState, VersionRange};
use crate::config::ArchiveConfig;
use crate::error::{ArchiveError, Result};
use crate::patch::{join_lines, split_lines, EditCommand, Patch};
use crate::version::Version;

// ── Keywords ──────────────────────────────────────────────────────────

const KW_HEAD: &str = "head";
const KW_DOCUMENT: &str = "document";
const KW_DELETED: &str = "deleted";
const KW_DATE: &str = "date";
const KW_AUTHOR: &str = "author";
const KW_STATE: &str = "state";
const KW_MINOR: &str = "minor";
const KW_KIND: &str = "kind";
const KW_LOG: &str = "log";
const KW_TEXT: &str = "text";

const KIND_FULL: &str = "full";
const KIND_DIFF: &str = "diff";

// ── @-strings ─────────────────────────────────────────────────────────

fn encode_at_string(s: &str, buf: &mut String) {
    buf.push('@');
    buf.push_str(&s.replace('@', "@@"));
    buf.push('@');
}

/// Decode an `@`-delimited string starting at `pos` (after whitespace).
fn decode_at_string(data: &str, pos: &mut usize) -> Option<String> {
    skip_ws(data, pos);
    if data.as_bytes().get(*pos) != Some(&b'@') {
        return None;
    }
    *pos += 1;
    let mut out = String::new();
    loop {
        let rel = data[*pos..].find('@')?;
        out.push_str(&data[*pos..*pos + rel]);
        *pos += rel + 1;
        if data.as_bytes().get(*pos) == Some(&b'@') {
            out.push('@');
            *pos += 1;
        } else {
            return Some(out);
        }
    }
}

// ── Tokens ────────────────────────────────────────────────────────────

fn skip_ws(data: &str, pos: &mut usize) {
    let bytes = data.as_bytes();
    while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
}

/// Next run of non-whitespace, non-`;` characters.
fn decode_word<'a>(data: &'a str, pos: &mut usize) -> Option<&'a str> {
    skip_ws(data, pos);
    let bytes = data.as_bytes();
    let start = *pos;
    while *pos < bytes.len() && !bytes[*pos].is_ascii_whitespace() && bytes[*pos] != b';' {
        *pos += 1;
    }
    (*pos > start).then(|| &data[start..*pos])
}

fn expect_keyword(data: &str, pos: &mut usize, keyword: &str) -> Option<()> {
    (decode_word(data, pos)? == keyword).then_some(())
}

fn expect_semicolon(data: &str, pos: &mut usize) -> Option<()> {
    skip_ws(data, pos);
    if data.as_bytes().get(*pos) == Some(&b';') {
        *pos += 1;
        Some(())
    } else {
        None
    }
}

fn peek_semicolon(data: &str, pos: &mut usize) -> bool {
    skip_ws(data, pos);
    data.as_bytes().get(*pos) == Some(&b';')
}

/// `keyword value;`
fn decode_word_field<'a>(data: &'a str, pos: &mut usize, keyword: &str) -> Option<&'a str> {
    expect_keyword(data, pos, keyword)?;
    let value = decode_word(data, pos)?;
    expect_semicolon(data, pos)?;
    Some(value)
}

/// `keyword @value@;`
fn decode_string_field(data: &str, pos: &mut usize, keyword: &str) -> Option<String> {
    expect_keyword(data, pos, keyword)?;
    let value = decode_at_string(data, pos)?;
    expect_semicolon(data, pos)?;
    Some(value)
}

// ── Patch Scripts ─────────────────────────────────────────────────────

/// Encode a patch as an ed-style script.
pub fn encode_patch(patch: &Patch) -> String {
    let mut out: Vec<String> = Vec::new();
    for cmd in patch.commands() {
        match cmd {
            EditCommand::Delete { line, count } => out.push(format!("d{line} {count}")),
            EditCommand::Add { after, lines } => {
                out.push(format!("a{after} {}", lines.len()));
                out.extend(lines.iter().cloned());
            }
        }
    }
    out.join("\n")
}

/// Decode an ed-style script. `None` on any malformed command.
pub fn decode_patch(script: &str) -> Option<Patch> {
    if script.is_empty() {
        return Some(Patch::default());
    }
    let mut lines = script.split('\n');
    let mut commands = Vec::new();
    while let Some(header) = lines.next() {
        let op = header.get(..1)?;
        let rest = header.get(1..)?;
        let (position, count) = rest.split_once(' ')?;
        let position: usize = position.parse().ok()?;
        let count: usize = count.parse().ok()?;
        match op {
            "d" => commands.push(EditCommand::Delete {
                line: position,
                count,
            }),
            "a" => {
                let added = (0..count)
                    .map(|_| lines.next().map(String::from))
                    .collect::<Option<Vec<_>>>()?;
                commands.push(EditCommand::Add {
                    after: position,
                    lines: added,
                });
            }
            _ => return None,
        }
    }
    Some(Patch::new(commands))
}

// ── Archive ───────────────────────────────────────────────────────────

fn encode_node(node: &RevisionNode, buf: &mut String) {
    let meta = node.meta();
    buf.push_str(&format!("\n{}\n", node.version()));
    buf.push_str(&format!("{KW_DATE}\t{};\n", meta.date.to_rfc3339()));
    buf.push_str(&format!("{KW_AUTHOR}\t"));
    encode_at_string(&meta.author, buf);
    buf.push_str(";\n");
    buf.push_str(&format!("{KW_STATE}\t{};\n", meta.state.as_str()));
    buf.push_str(&format!("{KW_MINOR}\t{};\n", meta.minor_edit));

    let (kind, body) = match node.payload() {
        Payload::Full(lines) => (KIND_FULL, join_lines(lines)),
        Payload::Diff(patch) => (KIND_DIFF, encode_patch(patch)),
    };
    buf.push_str(&format!("{KW_KIND}\t{kind};\n"));
    buf.push_str(&format!("{KW_LOG}\n"));
    encode_at_string(&meta.comment, buf);
    buf.push_str(&format!("\n{KW_TEXT}\n"));
    encode_at_string(&body, buf);
    buf.push('\n');
}

/// Serialize the whole archive.
pub fn encode_archive(archive: &RevisionArchive) -> String {
    let mut buf = String::new();
    match archive.latest_version() {
        Some(head) => buf.push_str(&format!("{KW_HEAD}\t{head};\n")),
        None => buf.push_str(&format!("{KW_HEAD}\t;\n")),
    }
    buf.push_str(&format!("{KW_DOCUMENT}\t"));
    encode_at_string(archive.document_id(), &mut buf);
    buf.push_str(";\n");

    let ranges: Vec<String> = archive
        .deleted_ranges()
        .iter()
        .map(|r| format!("{}:{}", r.from, r.to))
        .collect();
    buf.push_str(&format!("{KW_DELETED}\t{};\n", ranges.join(" ")));

    for node in archive.nodes().iter().rev() {
        encode_node(node, &mut buf);
    }
    buf
}

fn decode_node(data: &str, pos: &mut usize, document_id: &str) -> Result<RevisionNode> {
    let fail = |what: &str| ArchiveError::format(document_id, what.to_string());

    let version: Version = decode_word(data, pos)
        .ok_or_else(|| fail("expected node version"))?
        .parse()
        .map_err(|_| fail("invalid node version"))?;
    let at = |what: &str| fail(&format!("{what} of node {version}"));

    let date = decode_word_field(data, pos, KW_DATE).ok_or_else(|| at("missing date"))?;
    let date = DateTime::parse_from_rfc3339(date)
        .map_err(|_| at("invalid date"))?
        .with_timezone(&Utc);
    let author = decode_string_field(data, pos, KW_AUTHOR).ok_or_else(|| at("missing author"))?;
    let state = decode_word_field(data, pos, KW_STATE)
        .and_then(RevisionState::from_name)
        .ok_or_else(|| at("invalid state"))?;
    let minor_edit = match decode_word_field(data, pos, KW_MINOR) {
        Some("true") => true,
        Some("false") => false,
        _ => return Err(at("invalid minor flag")),
    };
    let kind = decode_word_field(data, pos, KW_KIND).ok_or_else(|| at("missing kind"))?;
    expect_keyword(data, pos, KW_LOG).ok_or_else(|| at("missing log"))?;
    let comment = decode_at_string(data, pos).ok_or_else(|| at("unterminated log"))?;
    expect_keyword(data, pos, KW_TEXT).ok_or_else(|| at("missing text"))?;
    let body = decode_at_string(data, pos).ok_or_else(|| at("unterminated text"))?;

    let payload = match kind {
        KIND_FULL => Payload::Full(split_lines(&body)),
        KIND_DIFF => Payload::Diff(decode_patch(&body).ok_or_else(|| at("malformed diff script"))?),
        _ => return Err(at("unknown kind")),
    };

    let meta = RevisionMeta {
        author,
        date,
        comment,
        state,
        minor_edit,
    };
    Ok(RevisionNode::new(version, meta, payload))
}

/// Parse a blob produced by [`encode_archive`]. The blob must belong to
/// `document_id`.
pub fn decode_archive(document_id: &str, blob: &str, config: ArchiveConfig) -> Result<RevisionArchive> {
    let fail = |what: &str| ArchiveError::format(document_id, what.to_string());
    let mut pos = 0usize;

    expect_keyword(blob, &mut pos, KW_HEAD).ok_or_else(|| fail("missing head"))?;
    let head = if peek_semicolon(blob, &mut pos) {
        None
    } else {
        let word = decode_word(blob, &mut pos).ok_or_else(|| fail("missing head version"))?;
        Some(Version::parse(word).map_err(|_| fail("invalid head version"))?)
    };
    expect_semicolon(blob, &mut pos).ok_or_else(|| fail("unterminated head"))?;

    let stored_id =
        decode_string_field(blob, &mut pos, KW_DOCUMENT).ok_or_else(|| fail("missing document"))?;
    if stored_id != document_id {
        return Err(fail(&format!("blob belongs to {stored_id}")));
    }

    expect_keyword(blob, &mut pos, KW_DELETED).ok_or_else(|| fail("missing deleted"))?;
    let mut deleted = Vec::new();
    while !peek_semicolon(blob, &mut pos) {
        let word = decode_word(blob, &mut pos).ok_or_else(|| fail("unterminated deleted"))?;
        let (from, to) = word
            .split_once(':')
            .ok_or_else(|| fail("invalid deleted range"))?;
        let from = Version::parse(from).map_err(|_| fail("invalid deleted range"))?;
        let to = Version::parse(to).map_err(|_| fail("invalid deleted range"))?;
        deleted.push(VersionRange::new(from, to));
    }
    expect_semicolon(blob, &mut pos).ok_or_else(|| fail("unterminated deleted"))?;

    let mut nodes = Vec::new();
    loop {
        skip_ws(blob, &mut pos);
        if pos >= blob.len() {
            break;
        }
        nodes.push(decode_node(blob, &mut pos, document_id)?);
    }
    nodes.reverse();

    if nodes.last().map(RevisionNode::version) != head {
        return Err(fail("head does not match newest node"));
    }
    RevisionArchive::from_parts(document_id.to_string(), nodes, deleted, config)
}

impl RevisionArchive {
    /// Single text blob for the persistence collaborator.
    pub fn serialize(&self) -> String {
        encode_archive(self)
    }

    /// Inverse of [`serialize`](Self::serialize).
    pub fn deserialize(document_id: &str, blob: &str, config: ArchiveConfig) -> Result<Self> {
        decode_archive(document_id, blob, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Lookup;
    use crate::version::VersionBump;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn meta(author: &str, comment: &str) -> RevisionMeta {
        RevisionMeta::new(author, Utc.timestamp_opt(1_709_287_200, 0).unwrap(), comment)
    }

    fn sample_archive() -> RevisionArchive {
        let mut archive = RevisionArchive::new("Main.WebHome");
        let texts = [
            "= Title =\n\nFirst",
            "= Title =\n\nFirst\nSecond",
            "= Title =\n\nSecond\n",
            "mail me @ admin@example.org",
            "@@ odd @ text @",
            "",
            "final\n\n",
        ];
        for (i, t) in texts.iter().enumerate() {
            archive
                .add_revision(t, meta("XWiki.Admin", &format!("edit {i} @ home")), VersionBump::Minor)
                .unwrap();
        }
        archive
    }

    #[test]
    fn at_string_roundtrip() {
        for s in ["", "plain", "a@b", "@@", "@", "multi\nline @\n"] {
            let mut buf = String::new();
            encode_at_string(s, &mut buf);
            let mut pos = 0;
            assert_eq!(decode_at_string(&buf, &mut pos).as_deref(), Some(s));
            assert_eq!(pos, buf.len());
        }
    }

    #[test]
    fn unterminated_at_string_is_none() {
        let mut pos = 0;
        assert!(decode_at_string("@abc", &mut pos).is_none());
        let mut pos = 0;
        assert!(decode_at_string("abc@", &mut pos).is_none());
    }

    #[test]
    fn patch_script_roundtrip() {
        let old = split_lines("a\nb\nc\nd");
        let new = split_lines("a\nx\n\nd\ne\n");
        let patch = Patch::between(&old, &new);
        let script = encode_patch(&patch);
        assert_eq!(decode_patch(&script), Some(patch));
    }

    #[test]
    fn patch_script_format() {
        let patch = Patch::new(vec![
            EditCommand::Delete { line: 2, count: 1 },
            EditCommand::Add {
                after: 3,
                lines: vec!["new".into(), String::new()],
            },
        ]);
        assert_eq!(encode_patch(&patch), "d2 1\na3 2\nnew\n");
    }

    #[test]
    fn decode_patch_rejects_garbage() {
        assert!(decode_patch("x1 2").is_none());
        assert!(decode_patch("d1").is_none());
        assert!(decode_patch("a0 3\nonly one").is_none());
        assert!(decode_patch("dX 1").is_none());
        assert_eq!(decode_patch(""), Some(Patch::default()));
    }

    #[test]
    fn archive_roundtrip_exact() {
        let archive = sample_archive();
        let blob = archive.serialize();
        let back = RevisionArchive::deserialize("Main.WebHome", &blob, ArchiveConfig::default()).unwrap();
        assert_eq!(back, archive);
        assert_eq!(back.serialize(), blob);
        for v in archive.versions() {
            assert_eq!(
                back.get_revision(Some(v)).unwrap(),
                archive.get_revision(Some(v)).unwrap()
            );
        }
    }

    #[test]
    fn empty_archive_roundtrip() {
        let archive = RevisionArchive::new("Empty.Page");
        let blob = archive.serialize();
        assert!(blob.starts_with("head\t;\n"));
        let back = RevisionArchive::deserialize("Empty.Page", &blob, ArchiveConfig::default()).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn deleted_ranges_survive_roundtrip() {
        let mut archive = sample_archive();
        archive.remove_versions(Version::new(1, 2), Version::new(1, 3)).unwrap();
        let blob = archive.serialize();
        assert!(blob.contains("deleted\t1.2:1.3;"));
        let back = RevisionArchive::deserialize("Main.WebHome", &blob, ArchiveConfig::default()).unwrap();
        assert_eq!(back.get_revision(Some(Version::new(1, 2))).unwrap(), Lookup::Deleted);
        assert_eq!(back, archive);
    }

    #[test]
    fn newest_node_written_first() {
        let blob = sample_archive().serialize();
        let newest = blob.find("\n1.7\n").unwrap();
        let oldest = blob.find("\n1.1\n").unwrap();
        assert!(newest < oldest);
    }

    #[test]
    fn wrong_document_rejected() {
        let blob = sample_archive().serialize();
        let err = RevisionArchive::deserialize("Other.Page", &blob, ArchiveConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::ArchiveFormat { ref document_id, .. } if document_id == "Other.Page"
        ));
    }

    #[test]
    fn malformed_blobs_rejected() {
        let good = sample_archive().serialize();
        let cases = [
            String::new(),
            "garbage".to_string(),
            good.replace("head\t1.7;", "head\t1.9;"),
            good.replace("kind\tfull;", "kind\tpartial;"),
            good.replace("state\tnormal;", "state\tweird;"),
            good[..good.len() - 3].to_string(),
        ];
        for blob in cases {
            let result = RevisionArchive::deserialize("Main.WebHome", &blob, ArchiveConfig::default());
            assert!(
                matches!(result, Err(ArchiveError::ArchiveFormat { .. })),
                "accepted: {blob:?}"
            );
        }
    }

    #[test]
    fn diff_first_node_rejected() {
        let blob = "head\t1.1;\ndocument\t@A.B@;\ndeleted\t;\n\n1.1\ndate\t2024-03-01T10:00:00+00:00;\nauthor\t@x@;\nstate\tnormal;\nminor\tfalse;\nkind\tdiff;\nlog\n@@\ntext\n@@\n";
        let err = RevisionArchive::deserialize("A.B", blob, ArchiveConfig::default()).unwrap_err();
        assert!(err.to_string().contains("is a diff"));
    }

    proptest! {
        #[test]
        fn prop_roundtrip_rebuilds_every_version(
            texts in proptest::collection::vec("[a-c@\n]{0,24}", 1..14)
        ) {
            let mut archive = RevisionArchive::new("Prop.Test");
            for t in &texts {
                archive.add_revision(t, meta("p", "@"), VersionBump::Minor).unwrap();
            }
            let back = RevisionArchive::deserialize(
                "Prop.Test",
                &archive.serialize(),
                ArchiveConfig::default(),
            ).unwrap();
            for (v, t) in back.versions().into_iter().zip(&texts) {
                let rebuilt = back.get_revision(Some(v)).unwrap().found().unwrap();
                prop_assert_eq!(&rebuilt.text, t);
            }
        }

        #[test]
        fn prop_prune_keeps_retained_versions(
            texts in proptest::collection::vec("[xy\n]{0,12}", 2..16),
            a in 1u32..16,
            b in 1u32..16,
        ) {
            let mut archive = RevisionArchive::new("Prop.Prune");
            for t in &texts {
                archive.add_revision(t, meta("p", ""), VersionBump::Minor).unwrap();
            }
            let range = VersionRange::new(Version::new(1, a), Version::new(1, b));
            archive.remove_versions(range.from, range.to).unwrap();
            let archive = RevisionArchive::deserialize(
                "Prop.Prune",
                &archive.serialize(),
                ArchiveConfig::default(),
            ).unwrap();

            for (i, t) in texts.iter().enumerate() {
                let v = Version::new(1, i as u32 + 1);
                let found = archive.get_revision(Some(v)).unwrap();
                if range.contains(v) {
                    prop_assert_eq!(found, Lookup::Deleted);
                } else {
                    prop_assert_eq!(&found.found().unwrap().text, t);
                }
            }
            let config = archive.config();
            let last = archive.len();
            for (i, node) in archive.nodes().iter().enumerate() {
                let full_expected = i + 1 == last || config.is_checkpoint(i + 1);
                prop_assert_eq!(!node.is_diff(), full_expected);
            }
        }
    }
}
