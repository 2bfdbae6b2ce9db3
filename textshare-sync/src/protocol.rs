//! Binary protocol between `RemoteStore` clients and the `StoreServer`.
//!
//! Wire format (bincode-encoded, one message per WebSocket binary frame):
//! ```text
//! ┌──────────┬────────────┬──────────┐
//! │ msg_type │ request_id │ payload  │
//! │ 1 byte   │ varint u64 │ variable │
//! └──────────┴────────────┴──────────┘
//! ```
//!
//! Requests carry a client-chosen `request_id`; `Ack` and `Failure` echo
//! it. A `Subscribe`'s `request_id` doubles as the subscription id, so
//! `Snapshot` and `Unsubscribe` carry that id too.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use textshare_core::{Document, DocumentId, Fields, Query};

use crate::storage::StoreError;
use crate::subscription::Snapshot;

/// Message types for the store protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Insert a new document
    Add = 1,
    /// Merge fields into an existing document
    Update = 2,
    /// Remove a document
    Delete = 3,
    /// Open a live query
    Subscribe = 4,
    /// Close a live query (no reply)
    Unsubscribe = 5,
    /// Request succeeded
    Ack = 6,
    /// Full result set of a live query
    Snapshot = 7,
    /// Request failed
    Failure = 8,
    /// Heartbeat ping
    Ping = 9,
    /// Heartbeat pong
    Pong = 10,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddPayload {
    pub collection: String,
    pub fields: Fields,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdatePayload {
    pub collection: String,
    pub id: DocumentId,
    pub fields: Fields,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeletePayload {
    pub collection: String,
    pub id: DocumentId,
}

/// Why a request failed, in a form that survives the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FailureKind {
    NotFound { collection: String, id: DocumentId },
    Rejected,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailurePayload {
    pub kind: FailureKind,
    pub message: String,
}

impl FailurePayload {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Rejected,
            message: message.into(),
        }
    }
}

impl From<&StoreError> for FailurePayload {
    fn from(e: &StoreError) -> Self {
        let kind = match e {
            StoreError::NotFound { collection, id } => FailureKind::NotFound {
                collection: collection.clone(),
                id: *id,
            },
            StoreError::Rejected(_) => FailureKind::Rejected,
            _ => FailureKind::Internal,
        };
        Self {
            kind,
            message: e.to_string(),
        }
    }
}

impl From<FailurePayload> for StoreError {
    fn from(f: FailurePayload) -> Self {
        match f.kind {
            FailureKind::NotFound { collection, id } => StoreError::NotFound { collection, id },
            FailureKind::Rejected => StoreError::Rejected(f.message),
            FailureKind::Internal => StoreError::Backend(f.message),
        }
    }
}

/// Top-level protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    pub msg_type: MessageType,
    pub request_id: u64,
    /// Message payload (varies by msg_type)
    pub payload: Vec<u8>,
}

impl SyncMessage {
    fn with_payload<T: Serialize>(
        msg_type: MessageType,
        request_id: u64,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        let payload = bincode::serde::encode_to_vec(payload, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))?;
        Ok(Self {
            msg_type,
            request_id,
            payload,
        })
    }

    fn empty(msg_type: MessageType, request_id: u64) -> Self {
        Self {
            msg_type,
            request_id,
            payload: Vec::new(),
        }
    }

    /// Create an insert request.
    pub fn add(request_id: u64, collection: &str, fields: Fields) -> Result<Self, ProtocolError> {
        let payload = AddPayload {
            collection: collection.to_string(),
            fields,
        };
        Self::with_payload(MessageType::Add, request_id, &payload)
    }

    /// Create a field-merge request.
    pub fn update(
        request_id: u64,
        collection: &str,
        id: DocumentId,
        fields: Fields,
    ) -> Result<Self, ProtocolError> {
        let payload = UpdatePayload {
            collection: collection.to_string(),
            id,
            fields,
        };
        Self::with_payload(MessageType::Update, request_id, &payload)
    }

    /// Create a delete request.
    pub fn delete(request_id: u64, collection: &str, id: DocumentId) -> Result<Self, ProtocolError> {
        let payload = DeletePayload {
            collection: collection.to_string(),
            id,
        };
        Self::with_payload(MessageType::Delete, request_id, &payload)
    }

    /// Create a live query request. `request_id` becomes the subscription id.
    pub fn subscribe(request_id: u64, query: &Query) -> Result<Self, ProtocolError> {
        Self::with_payload(MessageType::Subscribe, request_id, query)
    }

    /// Close the subscription opened by `Subscribe` with this id.
    pub fn unsubscribe(subscription_id: u64) -> Self {
        Self::empty(MessageType::Unsubscribe, subscription_id)
    }

    /// Acknowledge a request, optionally returning the affected document.
    pub fn ack(request_id: u64, document: Option<&Document>) -> Result<Self, ProtocolError> {
        Self::with_payload(MessageType::Ack, request_id, &document)
    }

    pub fn failure(request_id: u64, failure: &FailurePayload) -> Result<Self, ProtocolError> {
        Self::with_payload(MessageType::Failure, request_id, failure)
    }

    pub fn snapshot(subscription_id: u64, snapshot: &Snapshot) -> Result<Self, ProtocolError> {
        Self::with_payload(MessageType::Snapshot, subscription_id, snapshot)
    }

    pub fn ping(request_id: u64) -> Self {
        Self::empty(MessageType::Ping, request_id)
    }

    pub fn pong(request_id: u64) -> Self {
        Self::empty(MessageType::Pong, request_id)
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::SerializationError(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(msg)
    }

    fn parse<T: DeserializeOwned>(&self, expected: MessageType) -> Result<T, ProtocolError> {
        if self.msg_type != expected {
            return Err(ProtocolError::InvalidMessageType);
        }
        let (value, _) = bincode::serde::decode_from_slice(&self.payload, bincode::config::standard())
            .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
        Ok(value)
    }

    pub fn add_payload(&self) -> Result<AddPayload, ProtocolError> {
        self.parse(MessageType::Add)
    }

    pub fn update_payload(&self) -> Result<UpdatePayload, ProtocolError> {
        self.parse(MessageType::Update)
    }

    pub fn delete_payload(&self) -> Result<DeletePayload, ProtocolError> {
        self.parse(MessageType::Delete)
    }

    pub fn query(&self) -> Result<Query, ProtocolError> {
        self.parse(MessageType::Subscribe)
    }

    pub fn ack_document(&self) -> Result<Option<Document>, ProtocolError> {
        self.parse(MessageType::Ack)
    }

    pub fn failure_payload(&self) -> Result<FailurePayload, ProtocolError> {
        self.parse(MessageType::Failure)
    }

    pub fn snapshot_payload(&self) -> Result<Snapshot, ProtocolError> {
        self.parse(MessageType::Snapshot)
    }
}

/// Protocol errors.
#[derive(Debug, Clone)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    InvalidMessageType,
    ConnectionClosed,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::InvalidMessageType => write!(f, "Invalid message type"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<ProtocolError> for StoreError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::SerializationError(e) => StoreError::SerializationError(e),
            ProtocolError::DeserializationError(e) => StoreError::DeserializationError(e),
            ProtocolError::InvalidMessageType => {
                StoreError::Backend("unexpected message type".into())
            }
            ProtocolError::ConnectionClosed => StoreError::Unavailable("connection closed".into()),
        }
    }
}
