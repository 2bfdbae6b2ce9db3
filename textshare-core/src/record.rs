//! Typed views over the two stored collections.
//!
//! Store field names are camelCase (`createdAt`, `updatedAt`) because the
//! collections are shared with non-Rust clients.

use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{Direction, Document, DocumentId, FieldValue, Fields, Query};

pub const TEXTS: &str = "texts";
pub const FEEDBACKS: &str = "feedbacks";

pub const FIELD_CONTENT: &str = "content";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";
pub const FIELD_STATUS: &str = "status";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Document {id} is missing field '{field}'")]
    MissingField { id: DocumentId, field: &'static str },

    #[error("Document {id} has a wrongly typed field '{field}'")]
    WrongType { id: DocumentId, field: &'static str },

    #[error("Unknown text status '{0}'")]
    UnknownStatus(String),
}

/// Lifecycle state of a text. The only transition is draft → published.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum TextStatus {
    Draft,
    Published,
}

impl TextStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextStatus::Draft => "draft",
            TextStatus::Published => "published",
        }
    }
}

impl fmt::Display for TextStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextStatus {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(TextStatus::Draft),
            "published" => Ok(TextStatus::Published),
            other => Err(RecordError::UnknownStatus(other.to_string())),
        }
    }
}

impl From<TextStatus> for FieldValue {
    fn from(status: TextStatus) -> Self {
        FieldValue::Text(status.as_str().to_string())
    }
}

/// A typed record living in one collection.
pub trait Record: Sized {
    const COLLECTION: &'static str;

    fn from_document(doc: &Document) -> Result<Self, RecordError>;
    fn id(&self) -> DocumentId;
    fn created_at(&self) -> u64;
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TextRecord {
    pub id: DocumentId,
    pub content: String,
    pub created_at: u64,
    pub status: TextStatus,
    pub updated_at: Option<u64>,
}

impl TextRecord {
    /// Fields for a brand-new text, written in one document insert.
    pub fn new_fields(content: &str, status: TextStatus, now: u64) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FIELD_CONTENT.into(), content.into());
        fields.insert(FIELD_CREATED_AT.into(), FieldValue::Timestamp(now));
        fields.insert(FIELD_UPDATED_AT.into(), FieldValue::Timestamp(now));
        fields.insert(FIELD_STATUS.into(), status.into());
        fields
    }

    /// Patch applied by a publish. `createdAt` is never part of a patch.
    pub fn publish_fields(now: u64) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FIELD_STATUS.into(), TextStatus::Published.into());
        fields.insert(FIELD_UPDATED_AT.into(), FieldValue::Timestamp(now));
        fields
    }

    /// Texts newest first, optionally restricted to one status.
    pub fn query(status: Option<TextStatus>) -> Query {
        let query = Query::collection(TEXTS);
        let query = match status {
            Some(s) => query.where_eq(FIELD_STATUS, s),
            None => query,
        };
        query.order_by(FIELD_CREATED_AT, Direction::Descending)
    }

    pub fn is_published(&self) -> bool {
        self.status == TextStatus::Published
    }
}

impl Record for TextRecord {
    const COLLECTION: &'static str = TEXTS;

    fn from_document(doc: &Document) -> Result<Self, RecordError> {
        let status = text_field(doc, FIELD_STATUS)?.parse()?;
        let updated_at = match doc.get(FIELD_UPDATED_AT) {
            None | Some(FieldValue::Null) => None,
            Some(v) => Some(v.as_timestamp().ok_or(RecordError::WrongType {
                id: doc.id,
                field: FIELD_UPDATED_AT,
            })?),
        };

        Ok(Self {
            id: doc.id,
            content: text_field(doc, FIELD_CONTENT)?.to_string(),
            created_at: timestamp_field(doc, FIELD_CREATED_AT)?,
            status,
            updated_at,
        })
    }

    fn id(&self) -> DocumentId {
        self.id
    }

    fn created_at(&self) -> u64 {
        self.created_at
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct FeedbackRecord {
    pub id: DocumentId,
    pub content: String,
    pub created_at: u64,
}

impl FeedbackRecord {
    pub fn new_fields(content: &str, now: u64) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FIELD_CONTENT.into(), content.into());
        fields.insert(FIELD_CREATED_AT.into(), FieldValue::Timestamp(now));
        fields
    }

    /// All feedback newest first.
    pub fn query() -> Query {
        Query::collection(FEEDBACKS).order_by(FIELD_CREATED_AT, Direction::Descending)
    }
}

impl Record for FeedbackRecord {
    const COLLECTION: &'static str = FEEDBACKS;

    fn from_document(doc: &Document) -> Result<Self, RecordError> {
        Ok(Self {
            id: doc.id,
            content: text_field(doc, FIELD_CONTENT)?.to_string(),
            created_at: timestamp_field(doc, FIELD_CREATED_AT)?,
        })
    }

    fn id(&self) -> DocumentId {
        self.id
    }

    fn created_at(&self) -> u64 {
        self.created_at
    }
}

fn text_field<'a>(doc: &'a Document, field: &'static str) -> Result<&'a str, RecordError> {
    let value = doc
        .get(field)
        .ok_or(RecordError::MissingField { id: doc.id, field })?;
    value
        .as_text()
        .ok_or(RecordError::WrongType { id: doc.id, field })
}

fn timestamp_field(doc: &Document, field: &'static str) -> Result<u64, RecordError> {
    let value = doc
        .get(field)
        .ok_or(RecordError::MissingField { id: doc.id, field })?;
    value
        .as_timestamp()
        .ok_or(RecordError::WrongType { id: doc.id, field })
}
