//! 3-way document merge
//!
//! Merges an incoming snapshot into the current one against their common
//! ancestor. Every target (scalar field, content, object property,
//! attachment, class field) goes through the same decision table:
//!
//! | ancestor = incoming | current = incoming | ancestor = current | Decision       |
//! |---------------------|--------------------|--------------------|----------------|
//! | yes                 | -                  | -                  | keep current   |
//! | no                  | yes                | -                  | no-op          |
//! | no                  | no                 | yes                | apply incoming |
//! | no                  | no                 | no                 | conflict       |
//!
//! Multi-line text (content, custom class, validation script, large string
//! properties) gets a line merge before being declared a conflict.
//! Conflicts are logged once at [`LogLevel::Error`] and resolved with
//! [`MergeConfig::conflict_fallback`].
//!
//! Author: Moroya Sakamoto

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, info, warn};

use crate::config::{ConflictFallback, MergeConfig};
use crate::document::{Attachment, ClassDefinition, Document, PropertyValue, StructuredObject};
use crate::patch::merge_text;

// ── Merge Log ─────────────────────────────────────────────────────────

/// Severity of a merge log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// One merge decision worth reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// What was merged, e.g. `content`, `object:Blog.Post[0].title`
    pub target: String,
}

/// Merge result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    log: Vec<LogEntry>,
    modified: bool,
}

impl MergeResult {
    /// True if the merged document differs from current
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn has_conflicts(&self) -> bool {
        self.log.iter().any(|e| e.level == LogLevel::Error)
    }

    /// Conflict entries, one per conflicting target
    pub fn conflicts(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter().filter(|e| e.level == LogLevel::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter().filter(|e| e.level == LogLevel::Warning)
    }
}

// ── Decision Table ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    KeepCurrent,
    NoOp,
    ApplyIncoming,
    Conflict,
}

fn decide<T: PartialEq + ?Sized>(ancestor: &T, current: &T, incoming: &T) -> Decision {
    if ancestor == incoming {
        Decision::KeepCurrent
    } else if current == incoming {
        Decision::NoOp
    } else if ancestor == current {
        Decision::ApplyIncoming
    } else {
        Decision::Conflict
    }
}

// ── Merger ────────────────────────────────────────────────────────────

struct Merger<'a> {
    config: &'a MergeConfig,
    log: Vec<LogEntry>,
}

impl<'a> Merger<'a> {
    fn new(config: &'a MergeConfig) -> Self {
        Self {
            config,
            log: Vec::new(),
        }
    }

    fn record(&mut self, level: LogLevel, target: &str, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => debug!(target_name = target, "{message}"),
            LogLevel::Warning | LogLevel::Error => warn!(target_name = target, %level, "{message}"),
        }
        self.log.push(LogEntry {
            level,
            message,
            target: target.to_string(),
        });
    }

    fn conflict(&mut self, target: &str, message: impl Into<String>) {
        self.record(LogLevel::Error, target, message);
    }

    fn take_incoming_on_conflict(&self) -> bool {
        self.config.conflict_fallback == ConflictFallback::Next
    }

    /// Value to store for a scalar target, or `None` to leave current.
    fn scalar<T: PartialEq + Clone + fmt::Debug>(
        &mut self,
        target: &str,
        ancestor: &T,
        current: &T,
        incoming: &T,
    ) -> Option<T> {
        match decide(ancestor, current, incoming) {
            Decision::KeepCurrent | Decision::NoOp => None,
            Decision::ApplyIncoming => {
                self.record(LogLevel::Info, target, "applied incoming value");
                Some(incoming.clone())
            }
            Decision::Conflict => {
                self.conflict(
                    target,
                    format!("conflicting values {current:?} and {incoming:?}"),
                );
                self.take_incoming_on_conflict().then(|| incoming.clone())
            }
        }
    }

    /// Like [`scalar`](Self::scalar) but tries a line merge first.
    fn text(&mut self, target: &str, ancestor: &str, current: &str, incoming: &str) -> Option<String> {
        match decide(ancestor, current, incoming) {
            Decision::KeepCurrent | Decision::NoOp => None,
            Decision::ApplyIncoming => {
                self.record(LogLevel::Info, target, "applied incoming text");
                Some(incoming.to_string())
            }
            Decision::Conflict => match merge_text(ancestor, current, incoming) {
                Some(merged) => {
                    self.record(LogLevel::Info, target, "merged concurrent line edits");
                    Some(merged)
                }
                None => {
                    self.conflict(target, "overlapping line edits");
                    self.take_incoming_on_conflict().then(|| incoming.to_string())
                }
            },
        }
    }

    // ── Metadata & content ──

    fn merge_metadata(&mut self, a: &Document, c: &Document, i: &Document, merged: &mut Document) {
        if let Some(v) = self.scalar("title", &a.title(), &c.title(), &i.title()) {
            merged.set_title(v);
        }
        if let Some(v) = self.scalar("parent", &a.parent(), &c.parent(), &i.parent()) {
            merged.set_parent(v);
        }
        if let Some(v) = self.scalar("author", &a.author(), &c.author(), &i.author()) {
            merged.set_author(v);
        }
        if let Some(v) = self.scalar(
            "content_author",
            &a.content_author(),
            &c.content_author(),
            &i.content_author(),
        ) {
            merged.set_content_author(v);
        }
        if let Some(v) = self.scalar("creator", &a.creator(), &c.creator(), &i.creator()) {
            merged.set_creator(v);
        }
        if let Some(v) = self.scalar(
            "creation_date",
            &a.creation_date(),
            &c.creation_date(),
            &i.creation_date(),
        ) {
            merged.set_creation_date(v);
        }
        if let Some(v) = self.scalar("date", &a.date(), &c.date(), &i.date()) {
            merged.set_date(v);
        }
        if let Some(v) = self.scalar(
            "content_update_date",
            &a.content_update_date(),
            &c.content_update_date(),
            &i.content_update_date(),
        ) {
            merged.set_content_update_date(v);
        }
        if let Some(v) = self.scalar("locale", &a.locale(), &c.locale(), &i.locale()) {
            merged.set_locale(v);
        }
        if let Some(v) = self.scalar(
            "default_locale",
            &a.default_locale(),
            &c.default_locale(),
            &i.default_locale(),
        ) {
            merged.set_default_locale(v);
        }
        if let Some(v) = self.scalar("syntax", &a.syntax(), &c.syntax(), &i.syntax()) {
            merged.set_syntax(v);
        }
        if let Some(v) = self.scalar("hidden", &a.is_hidden(), &c.is_hidden(), &i.is_hidden()) {
            merged.set_hidden(v);
        }
        if let Some(v) = self.scalar(
            "restricted",
            &a.is_restricted(),
            &c.is_restricted(),
            &i.is_restricted(),
        ) {
            merged.set_restricted(v);
        }
        if let Some(v) = self.scalar(
            "default_template",
            &a.default_template(),
            &c.default_template(),
            &i.default_template(),
        ) {
            merged.set_default_template(v);
        }
        if let Some(v) = self.scalar("comment", &a.comment(), &c.comment(), &i.comment()) {
            merged.set_comment(v);
        }
        if let Some(v) = self.scalar(
            "minor_edit",
            &a.is_minor_edit(),
            &c.is_minor_edit(),
            &i.is_minor_edit(),
        ) {
            merged.set_minor_edit(v);
        }
        if let Some(v) = self.text(
            "custom_class",
            a.custom_class(),
            c.custom_class(),
            i.custom_class(),
        ) {
            merged.set_custom_class(v);
        }
        if let Some(v) = self.text(
            "validation_script",
            a.validation_script(),
            c.validation_script(),
            i.validation_script(),
        ) {
            merged.set_validation_script(v);
        }
    }

    fn merge_content(&mut self, a: &Document, c: &Document, i: &Document, merged: &mut Document) {
        if let Some(content) = self.text("content", a.content(), c.content(), i.content()) {
            merged.set_content(content);
        }
    }

    // ── Objects ──

    fn merge_objects(&mut self, a: &Document, c: &Document, i: &Document, merged: &mut Document) {
        let keys: BTreeSet<(String, u32)> = a
            .all_objects()
            .chain(c.all_objects())
            .chain(i.all_objects())
            .map(|o| (o.class_name().to_string(), o.number()))
            .collect();

        for (class_name, number) in keys {
            let target = format!("object:{class_name}[{number}]");
            let ancestor = a.object(&class_name, number);
            let current = c.object(&class_name, number);
            let incoming = i.object(&class_name, number);

            match (ancestor, current, incoming) {
                (None, None, Some(new)) => {
                    self.record(LogLevel::Info, &target, "added object");
                    merged.set_object(new.clone());
                }
                (None, Some(cur), Some(new)) => {
                    if cur == new {
                        self.record(LogLevel::Warning, &target, "object already added");
                    } else {
                        self.conflict(&target, "object added with different values");
                        if self.take_incoming_on_conflict() {
                            merged.set_object(new.clone());
                        }
                    }
                }
                (Some(_), None, None) => {
                    self.record(LogLevel::Warning, &target, "object already removed");
                }
                (Some(old), Some(cur), None) => {
                    if cur == old {
                        self.record(LogLevel::Info, &target, "removed object");
                        merged.remove_object(&class_name, number);
                    } else {
                        self.conflict(&target, "object removed in incoming but modified in current");
                        if self.take_incoming_on_conflict() {
                            merged.remove_object(&class_name, number);
                        }
                    }
                }
                (Some(old), None, Some(new)) => {
                    if old != new {
                        self.record(
                            LogLevel::Warning,
                            &target,
                            "object modified in incoming but removed in current",
                        );
                    }
                }
                (Some(old), Some(cur), Some(new)) => {
                    if old == new {
                        continue;
                    }
                    let mut result = cur.clone();
                    self.merge_properties(&target, old, cur, new, &mut result);
                    if result != *cur {
                        merged.set_object(result);
                    }
                }
                (None, Some(_), None) | (None, None, None) => {}
            }
        }
    }

    fn merge_properties(
        &mut self,
        target: &str,
        a: &StructuredObject,
        c: &StructuredObject,
        i: &StructuredObject,
        result: &mut StructuredObject,
    ) {
        let names: BTreeSet<&String> = a
            .properties()
            .keys()
            .chain(c.properties().keys())
            .chain(i.properties().keys())
            .collect();

        for name in names {
            let target = format!("{target}.{name}");
            let ancestor = a.property(name);
            let current = c.property(name);
            let incoming = i.property(name);

            let chosen = match decide(&ancestor, &current, &incoming) {
                Decision::KeepCurrent | Decision::NoOp => continue,
                Decision::ApplyIncoming => {
                    self.record(LogLevel::Info, &target, "applied incoming property");
                    incoming
                }
                Decision::Conflict => match large_string_merge(ancestor, current, incoming) {
                    Some(text) => {
                        self.record(LogLevel::Info, &target, "merged concurrent line edits");
                        result.set_property(name.clone(), PropertyValue::LargeString(text));
                        continue;
                    }
                    None => {
                        self.conflict(&target, "conflicting property values");
                        if !self.take_incoming_on_conflict() {
                            continue;
                        }
                        incoming
                    }
                },
            };
            match chosen {
                Some(value) => result.set_property(name.clone(), value.clone()),
                None => {
                    result.remove_property(name);
                }
            }
        }
    }

    // ── Attachments ──

    fn merge_attachments(&mut self, a: &Document, c: &Document, i: &Document, merged: &mut Document) {
        let names: BTreeSet<&str> = a
            .attachments()
            .iter()
            .chain(c.attachments())
            .chain(i.attachments())
            .map(Attachment::filename)
            .collect();

        for name in names {
            let target = format!("attachment:{name}");
            let ancestor = a.attachment(name);
            let current = c.attachment(name);
            let incoming = i.attachment(name);

            match (ancestor, current, incoming) {
                (None, None, Some(new)) => {
                    self.record(LogLevel::Info, &target, "added attachment");
                    merged.set_attachment(new.clone());
                }
                (None, Some(cur), Some(new)) => {
                    if cur.equals_data(new) {
                        self.record(LogLevel::Warning, &target, "attachment already added");
                    } else {
                        self.conflict(&target, "attachment added with different content");
                        if self.take_incoming_on_conflict() {
                            merged.set_attachment(new.clone());
                        }
                    }
                }
                (Some(_), None, None) => {
                    self.record(LogLevel::Warning, &target, "attachment already removed");
                }
                (Some(old), Some(cur), None) => {
                    if cur.equals_data(old) {
                        self.record(LogLevel::Info, &target, "removed attachment");
                        merged.remove_attachment(name);
                    } else {
                        self.conflict(
                            &target,
                            "attachment removed in incoming but modified in current",
                        );
                        if self.take_incoming_on_conflict() {
                            merged.remove_attachment(name);
                        }
                    }
                }
                (Some(old), None, Some(new)) => {
                    if !new.equals_data(old) {
                        self.conflict(
                            &target,
                            "attachment modified in incoming but removed in current",
                        );
                        if self.take_incoming_on_conflict() {
                            merged.set_attachment(new.clone());
                        }
                    }
                }
                (Some(old), Some(cur), Some(new)) => {
                    if new == old {
                        continue;
                    }
                    if cur == old {
                        self.record(LogLevel::Info, &target, "applied incoming attachment");
                        merged.set_attachment(new.clone());
                        continue;
                    }
                    if new.equals_data(old) {
                        continue;
                    }
                    if cur.equals_data(new) {
                        self.record(LogLevel::Warning, &target, "attachment change already applied");
                        continue;
                    }
                    let adopt = if cur.equals_data(old) {
                        self.record(LogLevel::Info, &target, "applied incoming attachment content");
                        true
                    } else {
                        self.conflict(&target, "attachment changed on both sides");
                        self.take_incoming_on_conflict()
                    };
                    if adopt {
                        if let Some(slot) = merged.attachment_mut(name) {
                            slot.adopt_content(new);
                        }
                        merged.mark_metadata_dirty();
                    }
                }
                (None, Some(_), None) | (None, None, None) => {}
            }
        }
    }

    // ── Class ──

    fn merge_class(&mut self, a: &Document, c: &Document, i: &Document, merged: &mut Document) {
        let empty = ClassDefinition::default();
        let ancestor = a.class().unwrap_or(&empty);
        let incoming = i.class().unwrap_or(&empty);
        if ancestor == incoming {
            return;
        }
        let current = c.class().unwrap_or(&empty);
        let mut result = match c.class() {
            Some(class) => class.clone(),
            None => ClassDefinition::new(incoming.name.clone()),
        };

        for field in &incoming.fields {
            let target = format!("class:{}", field.name);
            let old = ancestor.field(&field.name);
            let cur = current.field(&field.name);
            match (old, cur) {
                (None, None) => {
                    self.record(LogLevel::Info, &target, "added class field");
                    result.set_field(field.clone());
                }
                (None, Some(cur)) if cur == field => {
                    self.record(LogLevel::Warning, &target, "class field already added");
                }
                (None, Some(_)) => {
                    self.conflict(&target, "class field added with different definitions");
                    if self.take_incoming_on_conflict() {
                        result.set_field(field.clone());
                    }
                }
                (Some(old), None) => {
                    if old != field {
                        self.record(
                            LogLevel::Warning,
                            &target,
                            "class field modified in incoming but removed in current",
                        );
                    }
                }
                (Some(old), Some(cur)) => {
                    match decide(old, cur, field) {
                        Decision::KeepCurrent | Decision::NoOp => {}
                        Decision::ApplyIncoming => {
                            self.record(LogLevel::Info, &target, "applied incoming class field");
                            result.set_field(field.clone());
                        }
                        Decision::Conflict => {
                            self.conflict(&target, "class field changed on both sides");
                            if self.take_incoming_on_conflict() {
                                result.set_field(field.clone());
                            }
                        }
                    }
                }
            }
        }

        for field in &ancestor.fields {
            if incoming.field(&field.name).is_none() && current.field(&field.name).is_some() {
                self.record(
                    LogLevel::Warning,
                    &format!("class:{}", field.name),
                    "class field removal not applied",
                );
            }
        }

        if Some(&result) != c.class() && !(c.class().is_none() && result.fields.is_empty()) {
            merged.set_class(Some(result));
        }
    }
}

/// Line merge of a property whose current and incoming values are large
/// strings. A missing ancestor counts as empty text.
fn large_string_merge(
    ancestor: Option<&PropertyValue>,
    current: Option<&PropertyValue>,
    incoming: Option<&PropertyValue>,
) -> Option<String> {
    let (Some(PropertyValue::LargeString(cur)), Some(PropertyValue::LargeString(new))) =
        (current, incoming)
    else {
        return None;
    };
    let base = match ancestor {
        Some(PropertyValue::LargeString(text)) => text.as_str(),
        None => "",
        Some(_) => return None,
    };
    merge_text(base, cur, new)
}

// ── Entry Point ───────────────────────────────────────────────────────

/// Merge `incoming` into `current` against their common `ancestor`.
///
/// Returns the merged snapshot and the decision log. `is_modified()` is
/// true exactly when the merged snapshot differs from `current`.
pub fn merge_documents(
    ancestor: &Document,
    current: &Document,
    incoming: &Document,
    config: &MergeConfig,
) -> (Document, MergeResult) {
    let mut merged = current.clone();
    let mut merger = Merger::new(config);

    merger.merge_metadata(ancestor, current, incoming, &mut merged);
    merger.merge_content(ancestor, current, incoming, &mut merged);
    merger.merge_objects(ancestor, current, incoming, &mut merged);
    merger.merge_attachments(ancestor, current, incoming, &mut merged);
    merger.merge_class(ancestor, current, incoming, &mut merged);

    let modified = merged != *current;
    let result = MergeResult {
        log: merger.log,
        modified,
    };
    info!(
        document_id = %current.reference(),
        modified,
        conflicts = result.conflicts().count(),
        "merged document"
    );
    (merged, result)
}
