//! Line diff, patch and three-way line merge
//!
//! One line-diff engine (Myers, via `similar`) feeds three consumers:
//! archive compaction ([`Patch`]), displayed content deltas ([`LineDelta`])
//! and the content merge ([`merge_lines`]). Stored patches and displayed
//! diffs are therefore always computed the same way.
//!
//! Text is split on `'\n'` only, so `join_lines(split_lines(t)) == t` for
//! every string, trailing newline included.
//!
//! Author: Moroya Sakamoto

use similar::{capture_diff_slices, Algorithm, DiffOp};
use thiserror::Error;

/// Split text into lines, keeping a trailing empty line after a final `\n`.
pub fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(String::from).collect()
}

/// Inverse of [`split_lines`].
pub fn join_lines(lines: &[String]) -> String {
    lines.join("\n")
}

fn line_ops(old: &[String], new: &[String]) -> Vec<DiffOp> {
    capture_diff_slices(Algorithm::Myers, old, new)
}

// ── Displayed deltas ───────────────────────────────────────────────────

/// One contiguous line-range difference. Positions are 0-based indices
/// into the old text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineDelta {
    /// Lines inserted before old line `position`
    Insert { position: usize, lines: Vec<String> },
    /// Old lines removed starting at `position`
    Delete { position: usize, lines: Vec<String> },
    /// Old lines replaced by new ones starting at `position`
    Change {
        position: usize,
        old: Vec<String>,
        new: Vec<String>,
    },
}

impl LineDelta {
    pub fn position(&self) -> usize {
        match self {
            LineDelta::Insert { position, .. }
            | LineDelta::Delete { position, .. }
            | LineDelta::Change { position, .. } => *position,
        }
    }
}

/// Ordered line-range deltas turning `old` into `new`.
pub fn diff_lines(old: &[String], new: &[String]) -> Vec<LineDelta> {
    line_ops(old, new)
        .into_iter()
        .filter_map(|op| match op {
            DiffOp::Equal { .. } => None,
            DiffOp::Delete {
                old_index, old_len, ..
            } => Some(LineDelta::Delete {
                position: old_index,
                lines: old[old_index..old_index + old_len].to_vec(),
            }),
            DiffOp::Insert {
                old_index,
                new_index,
                new_len,
            } => Some(LineDelta::Insert {
                position: old_index,
                lines: new[new_index..new_index + new_len].to_vec(),
            }),
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => Some(LineDelta::Change {
                position: old_index,
                old: old[old_index..old_index + old_len].to_vec(),
                new: new[new_index..new_index + new_len].to_vec(),
            }),
        })
        .collect()
}

// ── Stored patches ─────────────────────────────────────────────────────

/// RCS-style edit command. Line numbers are 1-based and refer to the old
/// text; commands are sorted by position and never overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    /// Delete `count` old lines starting at line `line`
    Delete { line: usize, count: usize },
    /// Insert `lines` after old line `after` (0 = at the top)
    Add { after: usize, lines: Vec<String> },
}

/// Reason a patch cannot be applied to a given base text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("command at line {line} runs past the end of a {len}-line base")]
    OutOfRange { line: usize, len: usize },
    #[error("command at line {line} overlaps an earlier command")]
    Overlap { line: usize },
    #[error("delete at line 0")]
    ZeroLine,
}

/// Forward delta from a predecessor's text to a node's text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Patch {
    commands: Vec<EditCommand>,
}

impl Patch {
    pub fn new(commands: Vec<EditCommand>) -> Self {
        Self { commands }
    }

    /// Compute the patch turning `old` into `new`.
    pub fn between(old: &[String], new: &[String]) -> Self {
        let mut commands = Vec::new();
        for op in line_ops(old, new) {
            match op {
                DiffOp::Equal { .. } => {}
                DiffOp::Delete {
                    old_index, old_len, ..
                } => commands.push(EditCommand::Delete {
                    line: old_index + 1,
                    count: old_len,
                }),
                DiffOp::Insert {
                    old_index,
                    new_index,
                    new_len,
                } => commands.push(EditCommand::Add {
                    after: old_index,
                    lines: new[new_index..new_index + new_len].to_vec(),
                }),
                DiffOp::Replace {
                    old_index,
                    old_len,
                    new_index,
                    new_len,
                } => {
                    commands.push(EditCommand::Delete {
                        line: old_index + 1,
                        count: old_len,
                    });
                    commands.push(EditCommand::Add {
                        after: old_index + old_len,
                        lines: new[new_index..new_index + new_len].to_vec(),
                    });
                }
            }
        }
        Self { commands }
    }

    pub fn commands(&self) -> &[EditCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Apply to `old`, validating every command against its bounds.
    pub fn apply(&self, old: &[String]) -> Result<Vec<String>, PatchError> {
        let mut out = Vec::with_capacity(old.len());
        // Old lines consumed so far
        let mut cursor = 0usize;

        for cmd in &self.commands {
            match cmd {
                EditCommand::Delete { line, count } => {
                    if *line == 0 {
                        return Err(PatchError::ZeroLine);
                    }
                    let start = line - 1;
                    if start < cursor {
                        return Err(PatchError::Overlap { line: *line });
                    }
                    if start + count > old.len() {
                        return Err(PatchError::OutOfRange {
                            line: *line,
                            len: old.len(),
                        });
                    }
                    out.extend_from_slice(&old[cursor..start]);
                    cursor = start + count;
                }
                EditCommand::Add { after, lines } => {
                    if *after < cursor {
                        return Err(PatchError::Overlap { line: *after });
                    }
                    if *after > old.len() {
                        return Err(PatchError::OutOfRange {
                            line: *after,
                            len: old.len(),
                        });
                    }
                    out.extend_from_slice(&old[cursor..*after]);
                    cursor = *after;
                    out.extend(lines.iter().cloned());
                }
            }
        }

        out.extend_from_slice(&old[cursor..]);
        Ok(out)
    }
}

// ── Three-way line merge ──────────────────────────────────────────────

/// What one side did to a single ancestor line.
#[derive(Debug, Clone, PartialEq)]
enum Action {
    Keep,
    Delete,
    Replace(Vec<String>),
}

/// Per-ancestor-line view of one side's edits.
struct EditMap {
    actions: Vec<Action>,
    /// Lines inserted before each ancestor index; the extra slot holds
    /// insertions at the end.
    insertions: Vec<Vec<String>>,
}

impl EditMap {
    fn build(base: &[String], derived: &[String]) -> Self {
        let mut actions = vec![Action::Keep; base.len()];
        let mut insertions = vec![Vec::new(); base.len() + 1];

        for op in line_ops(base, derived) {
            match op {
                DiffOp::Equal { .. } => {}
                DiffOp::Delete {
                    old_index, old_len, ..
                } => {
                    for action in &mut actions[old_index..old_index + old_len] {
                        *action = Action::Delete;
                    }
                }
                DiffOp::Insert {
                    old_index,
                    new_index,
                    new_len,
                } => {
                    insertions[old_index]
                        .extend_from_slice(&derived[new_index..new_index + new_len]);
                }
                DiffOp::Replace {
                    old_index,
                    old_len,
                    new_index,
                    new_len,
                } => {
                    for action in &mut actions[old_index..old_index + old_len] {
                        *action = Action::Delete;
                    }
                    // The replacement rides on the first replaced line
                    actions[old_index] =
                        Action::Replace(derived[new_index..new_index + new_len].to_vec());
                }
            }
        }

        Self {
            actions,
            insertions,
        }
    }
}

/// Outcome of a line-level three-way merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineMerge {
    /// Both sides' edits applied to the ancestor
    Clean(Vec<String>),
    /// Overlapping, different edits; `regions` counts the clashes
    Conflict { regions: usize },
}

impl LineMerge {
    pub fn is_clean(&self) -> bool {
        matches!(self, LineMerge::Clean(_))
    }
}

/// Merge two derived texts against their common ancestor.
///
/// Edits to disjoint ancestor lines combine. Identical edits on both sides
/// are taken once. Anything else touching the same ancestor line, or
/// different insertions at the same point, is a conflict.
pub fn merge_lines(base: &[String], current: &[String], incoming: &[String]) -> LineMerge {
    let ours = EditMap::build(base, current);
    let theirs = EditMap::build(base, incoming);

    let mut output = Vec::with_capacity(current.len().max(incoming.len()));
    let mut regions = 0usize;

    for i in 0..=base.len() {
        let ours_insert = &ours.insertions[i];
        let theirs_insert = &theirs.insertions[i];
        match (ours_insert.is_empty(), theirs_insert.is_empty()) {
            (true, true) => {}
            (false, true) => output.extend(ours_insert.iter().cloned()),
            (true, false) => output.extend(theirs_insert.iter().cloned()),
            (false, false) if ours_insert == theirs_insert => {
                output.extend(ours_insert.iter().cloned())
            }
            (false, false) => regions += 1,
        }

        if i == base.len() {
            break;
        }

        match (&ours.actions[i], &theirs.actions[i]) {
            (Action::Keep, Action::Keep) => output.push(base[i].clone()),
            (Action::Keep, Action::Delete)
            | (Action::Delete, Action::Keep)
            | (Action::Delete, Action::Delete) => {}
            (Action::Keep, Action::Replace(new)) | (Action::Replace(new), Action::Keep) => {
                output.extend(new.iter().cloned())
            }
            (Action::Replace(a), Action::Replace(b)) if a == b => {
                output.extend(a.iter().cloned())
            }
            (Action::Replace(_), _) | (_, Action::Replace(_)) => regions += 1,
        }
    }

    if regions == 0 {
        LineMerge::Clean(output)
    } else {
        LineMerge::Conflict { regions }
    }
}

/// [`merge_lines`] over whole texts.
pub fn merge_text(base: &str, current: &str, incoming: &str) -> Option<String> {
    match merge_lines(
        &split_lines(base),
        &split_lines(current),
        &split_lines(incoming),
    ) {
        LineMerge::Clean(lines) => Some(join_lines(&lines)),
        LineMerge::Conflict { .. } => None,
    }
}
