use serde::{Serialize, Deserialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;
use uuid::Uuid;

pub mod query;
pub mod record;

pub use query::{Direction, Filter, OrderBy, Query};
pub use record::{
    FeedbackRecord, Record, RecordError, TextRecord, TextStatus, FEEDBACKS, TEXTS,
};

/// Opaque document identifier, assigned by the store on creation.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A single field value stored in a document.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
    /// Milliseconds since the UNIX epoch.
    Timestamp(u64),
}

impl FieldValue {
    fn rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::Integer(_) => 2,
            FieldValue::Timestamp(_) => 3,
            FieldValue::Text(_) => 4,
        }
    }

    /// Total order used for sorting query results.
    ///
    /// Values of different kinds order by kind, values of the same kind
    /// order naturally.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Integer(a), FieldValue::Integer(b)) => a.cmp(b),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<u64> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            FieldValue::Integer(i) if *i >= 0 => Some(*i as u64),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

pub type Fields = BTreeMap<String, FieldValue>;

/// A stored document: an id plus named fields.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: DocumentId, fields: Fields) -> Self {
        Self { id, fields }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Overwrites the given fields, leaving all others untouched.
    pub fn merge(&mut self, fields: Fields) {
        self.fields.extend(fields);
    }
}

/// Current wall-clock time in milliseconds since the UNIX epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_merge_keeps_untouched_fields() {
        let mut fields = Fields::new();
        fields.insert("content".into(), "hello".into());
        fields.insert("status".into(), "draft".into());
        let mut doc = Document::new(DocumentId::new(), fields);

        let mut patch = Fields::new();
        patch.insert("status".into(), "published".into());
        doc.merge(patch);

        assert_eq!(doc.get("content").and_then(FieldValue::as_text), Some("hello"));
        assert_eq!(doc.get("status").and_then(FieldValue::as_text), Some("published"));
    }

    #[test]
    fn test_field_value_ordering() {
        assert_eq!(
            FieldValue::Timestamp(5).total_cmp(&FieldValue::Timestamp(9)),
            Ordering::Less
        );
        assert_eq!(
            FieldValue::Text("b".into()).total_cmp(&FieldValue::Text("a".into())),
            Ordering::Greater
        );
        // Mixed kinds order by kind, Null first
        assert_eq!(
            FieldValue::Null.total_cmp(&FieldValue::Timestamp(0)),
            Ordering::Less
        );
    }

    #[test]
    fn test_timestamp_accepts_non_negative_integers() {
        assert_eq!(FieldValue::Integer(42).as_timestamp(), Some(42));
        assert_eq!(FieldValue::Integer(-1).as_timestamp(), None);
        assert_eq!(FieldValue::Text("x".into()).as_timestamp(), None);
    }

    #[test]
    fn test_document_id_parse_display() {
        let id = DocumentId::new();
        let parsed: DocumentId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<DocumentId>().is_err());
    }

    #[test]
    fn test_document_json_shape() {
        let mut fields = Fields::new();
        fields.insert("createdAt".into(), FieldValue::Timestamp(1_700_000_000_000));
        let doc = Document::new(DocumentId::nil(), fields);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["fields"]["createdAt"]["Timestamp"], 1_700_000_000_000u64);
    }

    #[test]
    fn test_now_millis_is_monotonic_enough() {
        let a = now_millis();
        let b = now_millis();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000);
    }
}
