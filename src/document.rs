//! Document snapshot model
//!
//! The materialized state of one document at one version: scalar metadata,
//! free-text content, an optional class definition, structured objects
//! grouped by class name, and attachments. A snapshot owns everything it
//! contains by value. Owners are referenced by document id, never by pointer.
//!
//! Getters are pure. Setters record what changed in a [`DirtyState`] that
//! is neither serialized nor part of equality.
//!
//! Author: Moroya Sakamoto

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::patch::split_lines;
use crate::version::Version;

/// Syntax id assigned to new documents.
pub const DEFAULT_SYNTAX: &str = "xwiki/2.1";

// ── Property Values ───────────────────────────────────────────────────

/// Typed value of a structured-object property
///
/// Equality treats every NaN as equal to every other NaN and otherwise
/// compares floats bit for bit, so a value always equals its own copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    /// Single-line string
    String(String),
    /// Multi-line text, merged line by line
    LargeString(String),
    /// Integer
    Int(i64),
    /// Floating point number. Non-finite values are stored by name.
    Float(#[serde(with = "float_value")] f64),
    /// Boolean flag
    Boolean(bool),
    /// Timestamp
    Date(DateTime<Utc>),
    /// Ordered list of strings
    StringList(Vec<String>),
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        use PropertyValue::*;
        match (self, other) {
            (String(a), String(b)) | (LargeString(a), LargeString(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits(),
            (Boolean(a), Boolean(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (StringList(a), StringList(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PropertyValue {}

mod float_value {
    use serde::{de, Deserialize, Deserializer, Serializer};

    const NAN: &str = "NaN";
    const INFINITY: &str = "inf";
    const NEG_INFINITY: &str = "-inf";

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str(NAN)
        } else if value.is_sign_positive() {
            serializer.serialize_str(INFINITY)
        } else {
            serializer.serialize_str(NEG_INFINITY)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Named(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Named(name) => match name.as_str() {
                NAN => Ok(f64::NAN),
                INFINITY => Ok(f64::INFINITY),
                NEG_INFINITY => Ok(f64::NEG_INFINITY),
                _ => Err(de::Error::custom(format!("invalid float {name:?}"))),
            },
        }
    }
}

impl PropertyValue {
    /// Text form used for diff comparison and display.
    pub fn to_text(&self) -> String {
        match self {
            PropertyValue::String(s) | PropertyValue::LargeString(s) => s.clone(),
            PropertyValue::Int(v) => v.to_string(),
            PropertyValue::Float(v) => v.to_string(),
            PropertyValue::Boolean(v) => String::from(if *v { "1" } else { "0" }),
            PropertyValue::Date(d) => d.to_rfc3339(),
            PropertyValue::StringList(items) => items.join("|"),
        }
    }

    pub fn is_large_string(&self) -> bool {
        matches!(self, PropertyValue::LargeString(_))
    }
}

// ── Structured Objects ────────────────────────────────────────────────

/// One instance of a class attached to a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredObject {
    class_name: String,
    number: u32,
    #[serde(default)]
    properties: BTreeMap<String, PropertyValue>,
}

impl StructuredObject {
    pub fn new(class_name: impl Into<String>, number: u32) -> Self {
        Self {
            class_name: class_name.into(),
            number,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.properties.insert(name.into(), value);
    }

    pub fn remove_property(&mut self, name: &str) -> Option<PropertyValue> {
        self.properties.remove(name)
    }

    /// Same identity, no properties.
    pub fn empty_like(&self) -> Self {
        Self::new(self.class_name.clone(), self.number)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

// ── Class Definition ──────────────────────────────────────────────────

/// Declared type of a class field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    TextArea,
    Number,
    Boolean,
    Date,
    List,
}

/// Typed field descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub pretty_name: String,
    pub kind: FieldKind,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        Self {
            pretty_name: name.clone(),
            name,
            kind,
        }
    }

    pub fn with_pretty_name(mut self, pretty_name: impl Into<String>) -> Self {
        self.pretty_name = pretty_name.into();
        self
    }
}

/// Class declared by a document: an ordered list of field descriptors
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

impl ClassDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.set_field(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Replace the field with the same name, or append.
    pub fn set_field(&mut self, field: FieldDefinition) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(slot) => *slot = field,
            None => self.fields.push(field),
        }
    }

    pub fn remove_field(&mut self, name: &str) -> Option<FieldDefinition> {
        let idx = self.fields.iter().position(|f| f.name == name)?;
        Some(self.fields.remove(idx))
    }
}

// ── Attachments ───────────────────────────────────────────────────────

/// Past state of an attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRevision {
    pub version: Version,
    pub author: String,
    pub date: DateTime<Utc>,
    pub size: usize,
}

/// File attached to a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    filename: String,
    #[serde(with = "base64_bytes")]
    content: Vec<u8>,
    size: usize,
    author: String,
    date: DateTime<Utc>,
    version: Version,
    #[serde(default)]
    history: Vec<AttachmentRevision>,
}

impl Attachment {
    pub fn new(
        filename: impl Into<String>,
        content: Vec<u8>,
        author: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            filename: filename.into(),
            size: content.len(),
            content,
            author: author.into(),
            date,
            version: Version::INITIAL,
            history: Vec::new(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Earlier states, oldest first.
    pub fn history(&self) -> &[AttachmentRevision] {
        &self.history
    }

    /// Upload new bytes: the current state moves to history and the
    /// version gets a minor increment.
    pub fn set_content(&mut self, content: Vec<u8>, author: impl Into<String>, date: DateTime<Utc>) {
        self.history.push(AttachmentRevision {
            version: self.version,
            author: std::mem::take(&mut self.author),
            date: self.date,
            size: self.size,
        });
        self.size = content.len();
        self.content = content;
        self.author = author.into();
        self.date = date;
        self.version = self.version.next();
    }

    /// Byte-content equality, ignoring metadata.
    pub fn equals_data(&self, other: &Attachment) -> bool {
        self.content == other.content
    }

    /// Take another attachment's bytes, size, author, date and version.
    /// Filename and history stay.
    pub(crate) fn adopt_content(&mut self, other: &Attachment) {
        self.content = other.content.clone();
        self.size = other.size;
        self.author = other.author.clone();
        self.date = other.date;
        self.version = other.version;
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// ── Dirty State ───────────────────────────────────────────────────────

/// Which parts changed since the last [`Document::clear_dirty`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyState {
    pub metadata: bool,
    pub content: bool,
}

// ── Document ──────────────────────────────────────────────────────────

/// Document snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    reference: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    parent: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    content_author: String,
    #[serde(default)]
    creator: String,
    #[serde(default)]
    creation_date: DateTime<Utc>,
    #[serde(default)]
    date: DateTime<Utc>,
    #[serde(default)]
    content_update_date: DateTime<Utc>,
    #[serde(default)]
    locale: String,
    #[serde(default)]
    default_locale: String,
    #[serde(default)]
    syntax: String,
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    restricted: bool,
    #[serde(default)]
    default_template: String,
    #[serde(default)]
    custom_class: String,
    #[serde(default)]
    validation_script: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    minor_edit: bool,
    #[serde(default)]
    content: String,
    #[serde(default)]
    class: Option<ClassDefinition>,
    #[serde(default)]
    objects: BTreeMap<String, Vec<StructuredObject>>,
    #[serde(default)]
    attachments: Vec<Attachment>,
    #[serde(skip)]
    dirty: DirtyState,
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
            && self.title == other.title
            && self.parent == other.parent
            && self.author == other.author
            && self.content_author == other.content_author
            && self.creator == other.creator
            && self.creation_date == other.creation_date
            && self.date == other.date
            && self.content_update_date == other.content_update_date
            && self.locale == other.locale
            && self.default_locale == other.default_locale
            && self.syntax == other.syntax
            && self.hidden == other.hidden
            && self.restricted == other.restricted
            && self.default_template == other.default_template
            && self.custom_class == other.custom_class
            && self.validation_script == other.validation_script
            && self.comment == other.comment
            && self.minor_edit == other.minor_edit
            && self.content == other.content
            && self.class == other.class
            && self.objects == other.objects
            && self.attachments == other.attachments
    }
}

impl Document {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            title: String::new(),
            parent: String::new(),
            author: String::new(),
            content_author: String::new(),
            creator: String::new(),
            creation_date: DateTime::default(),
            date: DateTime::default(),
            content_update_date: DateTime::default(),
            locale: String::new(),
            default_locale: String::new(),
            syntax: DEFAULT_SYNTAX.to_string(),
            hidden: false,
            restricted: false,
            default_template: String::new(),
            custom_class: String::new(),
            validation_script: String::new(),
            comment: String::new(),
            minor_edit: false,
            content: String::new(),
            class: None,
            objects: BTreeMap::new(),
            attachments: Vec::new(),
            dirty: DirtyState::default(),
        }
    }

    /// Document id
    pub fn reference(&self) -> &str {
        &self.reference
    }

    // ── Metadata ──

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.mark_metadata_dirty();
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn set_parent(&mut self, parent: impl Into<String>) {
        self.parent = parent.into();
        self.mark_metadata_dirty();
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
        self.mark_metadata_dirty();
    }

    pub fn content_author(&self) -> &str {
        &self.content_author
    }

    pub fn set_content_author(&mut self, content_author: impl Into<String>) {
        self.content_author = content_author.into();
        self.mark_metadata_dirty();
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn set_creator(&mut self, creator: impl Into<String>) {
        self.creator = creator.into();
        self.mark_metadata_dirty();
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    pub fn set_creation_date(&mut self, date: DateTime<Utc>) {
        self.creation_date = date;
        self.mark_metadata_dirty();
    }

    /// Date of the last save
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn set_date(&mut self, date: DateTime<Utc>) {
        self.date = date;
        self.mark_metadata_dirty();
    }

    pub fn content_update_date(&self) -> DateTime<Utc> {
        self.content_update_date
    }

    pub fn set_content_update_date(&mut self, date: DateTime<Utc>) {
        self.content_update_date = date;
        self.mark_metadata_dirty();
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.locale = locale.into();
        self.mark_metadata_dirty();
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn set_default_locale(&mut self, locale: impl Into<String>) {
        self.default_locale = locale.into();
        self.mark_metadata_dirty();
    }

    pub fn syntax(&self) -> &str {
        &self.syntax
    }

    pub fn set_syntax(&mut self, syntax: impl Into<String>) {
        self.syntax = syntax.into();
        self.mark_metadata_dirty();
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
        self.mark_metadata_dirty();
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted
    }

    pub fn set_restricted(&mut self, restricted: bool) {
        self.restricted = restricted;
        self.mark_metadata_dirty();
    }

    pub fn default_template(&self) -> &str {
        &self.default_template
    }

    pub fn set_default_template(&mut self, template: impl Into<String>) {
        self.default_template = template.into();
        self.mark_metadata_dirty();
    }

    pub fn custom_class(&self) -> &str {
        &self.custom_class
    }

    pub fn set_custom_class(&mut self, custom_class: impl Into<String>) {
        self.custom_class = custom_class.into();
        self.mark_metadata_dirty();
    }

    pub fn validation_script(&self) -> &str {
        &self.validation_script
    }

    pub fn set_validation_script(&mut self, script: impl Into<String>) {
        self.validation_script = script.into();
        self.mark_metadata_dirty();
    }

    /// Save comment
    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
        self.mark_metadata_dirty();
    }

    pub fn is_minor_edit(&self) -> bool {
        self.minor_edit
    }

    pub fn set_minor_edit(&mut self, minor_edit: bool) {
        self.minor_edit = minor_edit;
        self.mark_metadata_dirty();
    }

    // ── Content ──

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn content_lines(&self) -> Vec<String> {
        split_lines(&self.content)
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.mark_content_dirty();
    }

    // ── Class ──

    pub fn class(&self) -> Option<&ClassDefinition> {
        self.class.as_ref()
    }

    pub fn set_class(&mut self, class: Option<ClassDefinition>) {
        self.class = class;
        self.mark_metadata_dirty();
    }

    // ── Objects ──

    /// Class names with at least one object, sorted.
    pub fn object_classes(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    /// Objects of one class ordered by number.
    pub fn objects(&self, class_name: &str) -> &[StructuredObject] {
        self.objects
            .get(class_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_objects(&self) -> impl Iterator<Item = &StructuredObject> {
        self.objects.values().flatten()
    }

    pub fn object(&self, class_name: &str, number: u32) -> Option<&StructuredObject> {
        self.objects(class_name).iter().find(|o| o.number == number)
    }

    pub fn object_mut(&mut self, class_name: &str, number: u32) -> Option<&mut StructuredObject> {
        self.dirty.metadata = true;
        self.objects
            .get_mut(class_name)?
            .iter_mut()
            .find(|o| o.number == number)
    }

    /// Create an object numbered one past the highest existing number. Once
    /// `u32::MAX` is taken, the lowest free number is used instead.
    pub fn new_object(&mut self, class_name: &str) -> &mut StructuredObject {
        self.dirty.metadata = true;
        let list = self.objects.entry(class_name.to_string()).or_default();
        let (idx, number) = match list.last().map(|o| o.number.checked_add(1)) {
            None => (0, 0),
            Some(Some(number)) => (list.len(), number),
            Some(None) => {
                let idx = list
                    .iter()
                    .enumerate()
                    .position(|(i, o)| o.number as usize != i)
                    .unwrap_or(list.len());
                (idx, idx as u32)
            }
        };
        list.insert(idx, StructuredObject::new(class_name, number));
        &mut list[idx]
    }

    /// Insert or replace by `(class, number)`, keeping number order.
    pub fn set_object(&mut self, object: StructuredObject) {
        self.dirty.metadata = true;
        let list = self.objects.entry(object.class_name.clone()).or_default();
        match list.binary_search_by_key(&object.number, |o| o.number) {
            Ok(idx) => list[idx] = object,
            Err(idx) => list.insert(idx, object),
        }
    }

    pub fn remove_object(&mut self, class_name: &str, number: u32) -> Option<StructuredObject> {
        let list = self.objects.get_mut(class_name)?;
        let idx = list.iter().position(|o| o.number == number)?;
        let removed = list.remove(idx);
        if list.is_empty() {
            self.objects.remove(class_name);
        }
        self.dirty.metadata = true;
        Some(removed)
    }

    // ── Attachments ──

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn attachment(&self, filename: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.filename == filename)
    }

    pub fn attachment_mut(&mut self, filename: &str) -> Option<&mut Attachment> {
        self.dirty.metadata = true;
        self.attachments.iter_mut().find(|a| a.filename == filename)
    }

    /// Replace the attachment with the same filename, or append.
    pub fn set_attachment(&mut self, attachment: Attachment) {
        match self.attachment_mut(&attachment.filename) {
            Some(slot) => *slot = attachment,
            None => self.attachments.push(attachment),
        }
    }

    pub fn remove_attachment(&mut self, filename: &str) -> Option<Attachment> {
        let idx = self.attachments.iter().position(|a| a.filename == filename)?;
        self.dirty.metadata = true;
        Some(self.attachments.remove(idx))
    }

    // ── Dirty tracking ──

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_metadata_dirty(&self) -> bool {
        self.dirty.metadata
    }

    pub fn is_content_dirty(&self) -> bool {
        self.dirty.content
    }

    pub fn mark_metadata_dirty(&mut self) {
        self.dirty.metadata = true;
    }

    pub fn mark_content_dirty(&mut self) {
        self.dirty.content = true;
    }

    /// Reset after a save.
    pub fn clear_dirty(&mut self) {
        self.dirty = DirtyState::default();
    }

    // ── Canonical text form ──

    /// Pretty JSON. Stable field and key order, one value per line, so
    /// consecutive revisions diff well.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_text(text: &str) -> Result<Document> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn sample() -> Document {
        let mut doc = Document::new("Main.WebHome");
        doc.set_title("Home");
        doc.set_content("= Welcome =\n\nHello");
        doc.set_author("XWiki.Admin");
        doc.set_date(at(1_700_000_000));
        doc.set_class(Some(
            ClassDefinition::new("Main.WebHome")
                .with_field(FieldDefinition::new("summary", FieldKind::TextArea)),
        ));
        doc.new_object("Blog.Tag")
            .set_property("name", PropertyValue::String("rust".into()));
        doc.set_attachment(Attachment::new("logo.png", vec![1, 2, 3], "XWiki.Admin", at(5)));
        doc
    }

    #[test]
    fn test_getters_are_pure() {
        let doc = Document::new("Sandbox.Page");
        let _ = doc.comment();
        let _ = doc.title();
        let _ = doc.content();
        assert_eq!(doc.dirty_state(), DirtyState::default());
    }

    #[test]
    fn test_setters_mark_dirty() {
        let mut doc = Document::new("Sandbox.Page");
        doc.set_comment("typo");
        assert!(doc.is_metadata_dirty());
        assert!(!doc.is_content_dirty());
        doc.set_content("text");
        assert!(doc.is_content_dirty());
        doc.clear_dirty();
        assert!(!doc.is_metadata_dirty() && !doc.is_content_dirty());
    }

    #[test]
    fn test_dirty_flags_excluded_from_equality() {
        let mut a = Document::new("A.B");
        let b = Document::new("A.B");
        a.mark_content_dirty();
        assert_eq!(a, b);
    }

    #[test]
    fn test_text_round_trip() {
        let doc = sample();
        let text = doc.to_text().unwrap();
        let back = Document::from_text(&text).unwrap();
        assert_eq!(back, doc);
        assert!(!back.is_metadata_dirty());
        // base64 attachment bytes
        assert!(text.contains("AQID"));
    }

    #[test]
    fn test_object_numbering() {
        let mut doc = Document::new("A.B");
        assert_eq!(doc.new_object("C.D").number(), 0);
        assert_eq!(doc.new_object("C.D").number(), 1);
        doc.set_object(StructuredObject::new("C.D", 5));
        assert_eq!(doc.new_object("C.D").number(), 6);
        let numbers: Vec<u32> = doc.objects("C.D").iter().map(|o| o.number()).collect();
        assert_eq!(numbers, vec![0, 1, 5, 6]);
    }

    #[test]
    fn test_object_numbering_after_max() {
        let mut doc = Document::new("A.B");
        doc.set_object(StructuredObject::new("C.D", 0));
        doc.set_object(StructuredObject::new("C.D", u32::MAX));
        assert_eq!(doc.new_object("C.D").number(), 1);
        let numbers: Vec<u32> = doc.objects("C.D").iter().map(|o| o.number()).collect();
        assert_eq!(numbers, vec![0, 1, u32::MAX]);
    }

    #[test]
    fn test_attachment_setters_mark_dirty() {
        let mut doc = Document::new("A.B");
        doc.set_attachment(Attachment::new("f", vec![1], "u", at(0)));
        assert!(doc.is_metadata_dirty());
        doc.clear_dirty();
        doc.remove_attachment("f");
        assert!(doc.is_metadata_dirty());
        doc.clear_dirty();
        assert!(doc.remove_attachment("f").is_none());
        assert!(!doc.is_metadata_dirty());
    }

    #[test]
    fn test_float_equality_is_reflexive() {
        assert_eq!(PropertyValue::Float(f64::NAN), PropertyValue::Float(f64::NAN));
        assert_eq!(PropertyValue::Float(1.5), PropertyValue::Float(1.5));
        assert_ne!(PropertyValue::Float(1.5), PropertyValue::Int(1));
        assert_ne!(
            PropertyValue::String("x".into()),
            PropertyValue::LargeString("x".into())
        );
    }

    #[test]
    fn test_non_finite_floats_round_trip() {
        let mut doc = Document::new("A.B");
        doc.new_object("C.D")
            .set_property("nan", PropertyValue::Float(f64::NAN));
        doc.new_object("C.D")
            .set_property("inf", PropertyValue::Float(f64::INFINITY));
        doc.new_object("C.D")
            .set_property("neg", PropertyValue::Float(f64::NEG_INFINITY));
        doc.new_object("C.D")
            .set_property("plain", PropertyValue::Float(2.25));
        let text = doc.to_text().unwrap();
        assert!(text.contains("\"inf\""));
        let back = Document::from_text(&text).unwrap();
        assert_eq!(back, doc);
        assert_eq!(
            back.object("C.D", 1).unwrap().property("inf"),
            Some(&PropertyValue::Float(f64::INFINITY))
        );
    }

    #[test]
    fn test_remove_last_object_drops_class() {
        let mut doc = Document::new("A.B");
        doc.new_object("C.D");
        assert!(doc.remove_object("C.D", 0).is_some());
        assert_eq!(doc.object_classes().count(), 0);
        assert!(doc.remove_object("C.D", 0).is_none());
    }

    #[test]
    fn test_attachment_update_moves_to_history() {
        let mut att = Attachment::new("file", vec![0; 4], "alice", at(1));
        att.set_content(vec![1; 10], "bob", at(2));
        assert_eq!(att.size(), 10);
        assert_eq!(att.author(), "bob");
        assert_eq!(att.version(), Version::new(1, 2));
        assert_eq!(att.history().len(), 1);
        assert_eq!(att.history()[0].author, "alice");
        assert_eq!(att.history()[0].size, 4);
    }

    #[test]
    fn test_attachment_equals_data_ignores_metadata() {
        let a = Attachment::new("file", b"data".to_vec(), "alice", at(1));
        let b = Attachment::new("file", b"data".to_vec(), "bob", at(9));
        assert!(a.equals_data(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_property_text_forms() {
        assert_eq!(PropertyValue::Int(-4).to_text(), "-4");
        assert_eq!(PropertyValue::Boolean(true).to_text(), "1");
        assert_eq!(
            PropertyValue::StringList(vec!["a".into(), "b".into()]).to_text(),
            "a|b"
        );
        assert!(PropertyValue::LargeString(String::new()).is_large_string());
    }

    #[test]
    fn test_class_field_replace() {
        let mut class = ClassDefinition::new("C")
            .with_field(FieldDefinition::new("f", FieldKind::String));
        class.set_field(FieldDefinition::new("f", FieldKind::Number).with_pretty_name("F"));
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.field("f").map(|f| f.kind), Some(FieldKind::Number));
        assert!(class.remove_field("f").is_some());
        assert!(class.field("f").is_none());
    }
}
