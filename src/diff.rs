//! Snapshot diff report
//!
//! Field-level, content-level, object-level, class-level and attachment
//! differences between two document snapshots. Content deltas come from the
//! same line-diff engine the archive uses for its stored patches.
//!
//! Author: Moroya Sakamoto

use crate::document::{ClassDefinition, Document, FieldDefinition, StructuredObject};
use crate::patch::{diff_lines, LineDelta};
use crate::version::Version;

// ── Entries ───────────────────────────────────────────────────────────

/// Scalar metadata field that changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataChange {
    pub field: &'static str,
    pub previous: String,
    pub new: String,
}

/// What happened to a property or field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Added,
    Changed,
    Removed,
}

/// One property difference inside an object, in text form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    pub name: String,
    pub action: ChangeAction,
    pub previous: String,
    pub new: String,
}

/// Differences of one object instance, matched by `(class, number)`.
/// `action` is `Added` or `Removed` when the whole object is new or gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectChange {
    pub class_name: String,
    pub number: u32,
    pub action: ChangeAction,
    pub properties: Vec<PropertyChange>,
}

/// One class field definition difference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFieldChange {
    pub field: String,
    pub action: ChangeAction,
    pub previous: Option<FieldDefinition>,
    pub new: Option<FieldDefinition>,
}

/// Attachment difference. A missing version means the side lacks the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentChange {
    pub filename: String,
    pub previous_version: Option<Version>,
    pub new_version: Option<Version>,
}

impl AttachmentChange {
    pub fn action(&self) -> ChangeAction {
        match (self.previous_version, self.new_version) {
            (None, _) => ChangeAction::Added,
            (_, None) => ChangeAction::Removed,
            _ => ChangeAction::Changed,
        }
    }
}

/// Typed report entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffEntry {
    Metadata(MetadataChange),
    Content(LineDelta),
    Object(ObjectChange),
    Class(ClassFieldChange),
    Attachment(AttachmentChange),
}

// ── Metadata ──────────────────────────────────────────────────────────

/// Changed scalar fields, in a fixed field order.
pub fn diff_metadata(a: &Document, b: &Document) -> Vec<MetadataChange> {
    let fields: [(&'static str, String, String); 8] = [
        ("title", a.title().into(), b.title().into()),
        ("parent", a.parent().into(), b.parent().into()),
        ("author", a.author().into(), b.author().into()),
        ("locale", a.locale().into(), b.locale().into()),
        ("default_locale", a.default_locale().into(), b.default_locale().into()),
        ("syntax", a.syntax().into(), b.syntax().into()),
        ("hidden", a.is_hidden().to_string(), b.is_hidden().to_string()),
        ("restricted", a.is_restricted().to_string(), b.is_restricted().to_string()),
    ];
    fields
        .into_iter()
        .filter(|(_, previous, new)| previous != new)
        .map(|(field, previous, new)| MetadataChange {
            field,
            previous,
            new,
        })
        .collect()
}

// ── Content ───────────────────────────────────────────────────────────

pub fn diff_content(a: &Document, b: &Document) -> Vec<LineDelta> {
    diff_lines(&a.content_lines(), &b.content_lines())
}

// ── Objects ───────────────────────────────────────────────────────────

/// Property differences from `old` to `new`. Additions and removals of
/// properties whose text is empty are not reported.
pub fn diff_properties(old: &StructuredObject, new: &StructuredObject) -> Vec<PropertyChange> {
    let mut changes = Vec::new();

    for (name, value) in new.properties() {
        let new_text = value.to_text();
        match old.property(name) {
            None if new_text.is_empty() => {}
            None => changes.push(PropertyChange {
                name: name.clone(),
                action: ChangeAction::Added,
                previous: String::new(),
                new: new_text,
            }),
            Some(previous) => {
                let previous = previous.to_text();
                if previous != new_text {
                    changes.push(PropertyChange {
                        name: name.clone(),
                        action: ChangeAction::Changed,
                        previous,
                        new: new_text,
                    });
                }
            }
        }
    }

    for (name, value) in old.properties() {
        if new.property(name).is_some() {
            continue;
        }
        let previous = value.to_text();
        if !previous.is_empty() {
            changes.push(PropertyChange {
                name: name.clone(),
                action: ChangeAction::Removed,
                previous,
                new: String::new(),
            });
        }
    }

    changes
}

/// Object differences. Objects of `a` come first (changed or removed), then
/// objects only present in `b`.
pub fn diff_objects(a: &Document, b: &Document) -> Vec<ObjectChange> {
    let mut changes = Vec::new();

    for old in a.all_objects() {
        match b.object(old.class_name(), old.number()) {
            Some(new) => {
                let properties = diff_properties(old, new);
                if !properties.is_empty() {
                    changes.push(ObjectChange {
                        class_name: old.class_name().to_string(),
                        number: old.number(),
                        action: ChangeAction::Changed,
                        properties,
                    });
                }
            }
            None => changes.push(ObjectChange {
                class_name: old.class_name().to_string(),
                number: old.number(),
                action: ChangeAction::Removed,
                properties: diff_properties(old, &old.empty_like()),
            }),
        }
    }

    for new in b.all_objects() {
        if a.object(new.class_name(), new.number()).is_none() {
            changes.push(ObjectChange {
                class_name: new.class_name().to_string(),
                number: new.number(),
                action: ChangeAction::Added,
                properties: diff_properties(&new.empty_like(), new),
            });
        }
    }

    changes
}

// ── Class ─────────────────────────────────────────────────────────────

pub fn diff_class(a: &Document, b: &Document) -> Vec<ClassFieldChange> {
    let empty = ClassDefinition::default();
    let old = a.class().unwrap_or(&empty);
    let new = b.class().unwrap_or(&empty);
    let mut changes = Vec::new();

    for field in &new.fields {
        match old.field(&field.name) {
            None => changes.push(ClassFieldChange {
                field: field.name.clone(),
                action: ChangeAction::Added,
                previous: None,
                new: Some(field.clone()),
            }),
            Some(previous) if previous != field => changes.push(ClassFieldChange {
                field: field.name.clone(),
                action: ChangeAction::Changed,
                previous: Some(previous.clone()),
                new: Some(field.clone()),
            }),
            Some(_) => {}
        }
    }

    for field in &old.fields {
        if new.field(&field.name).is_none() {
            changes.push(ClassFieldChange {
                field: field.name.clone(),
                action: ChangeAction::Removed,
                previous: Some(field.clone()),
                new: None,
            });
        }
    }

    changes
}

// ── Attachments ───────────────────────────────────────────────────────

pub fn diff_attachments(a: &Document, b: &Document) -> Vec<AttachmentChange> {
    let mut changes = Vec::new();

    for old in a.attachments() {
        match b.attachment(old.filename()) {
            None => changes.push(AttachmentChange {
                filename: old.filename().to_string(),
                previous_version: Some(old.version()),
                new_version: None,
            }),
            Some(new) if new.version() != old.version() || !new.equals_data(old) => {
                changes.push(AttachmentChange {
                    filename: old.filename().to_string(),
                    previous_version: Some(old.version()),
                    new_version: Some(new.version()),
                })
            }
            Some(_) => {}
        }
    }

    for new in b.attachments() {
        if a.attachment(new.filename()).is_none() {
            changes.push(AttachmentChange {
                filename: new.filename().to_string(),
                previous_version: None,
                new_version: Some(new.version()),
            });
        }
    }

    changes
}

// ── Report ────────────────────────────────────────────────────────────

/// All differences between two snapshots: metadata, content, objects,
/// class, then attachments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffReport {
    entries: Vec<DiffEntry>,
}

impl DiffReport {
    pub fn between(a: &Document, b: &Document) -> Self {
        let mut entries = Vec::new();
        entries.extend(diff_metadata(a, b).into_iter().map(DiffEntry::Metadata));
        entries.extend(diff_content(a, b).into_iter().map(DiffEntry::Content));
        entries.extend(diff_objects(a, b).into_iter().map(DiffEntry::Object));
        entries.extend(diff_class(a, b).into_iter().map(DiffEntry::Class));
        entries.extend(diff_attachments(a, b).into_iter().map(DiffEntry::Attachment));
        Self { entries }
    }

    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn content_deltas(&self) -> impl Iterator<Item = &LineDelta> {
        self.entries.iter().filter_map(|e| match e {
            DiffEntry::Content(delta) => Some(delta),
            _ => None,
        })
    }
}
