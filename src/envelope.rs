//! The unit of data moving through a pipeline.

use std::fmt;

use bytes::Bytes;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Ordered metadata carried alongside a payload.
pub type Metadata = IndexMap<String, Value>;

/// Shape contract of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Regime {
    /// Raw bytes.
    Bytes,
    /// Structured value.
    Object,
    /// Wildcard, only meaningful on a middleware declaration.
    Any,
}

impl Regime {
    /// Whether an envelope in `actual` may enter a stage declared as `self`.
    #[must_use]
    pub fn admits(self, actual: Regime) -> bool {
        self == Regime::Any || self == actual
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Regime::Bytes => "BYTES",
            Regime::Object => "OBJECT",
            Regime::Any => "ANY",
        })
    }
}

/// Whether an envelope is a whole record, a fragment, or a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Completeness {
    /// A fragment of a larger record (e.g. a fixed-size block).
    Partial,
    /// One full logical record.
    Complete,
    /// Several records delivered together.
    Bulk,
}

/// Payload of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw bytes.
    Bytes(Bytes),
    /// Structured value.
    Object(Value),
}

impl Payload {
    /// Regime matching this payload's shape.
    #[must_use]
    pub fn regime(&self) -> Regime {
        match self {
            Payload::Bytes(_) => Regime::Bytes,
            Payload::Object(_) => Regime::Object,
        }
    }

    /// Borrow the bytes, if this is a byte payload.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Payload::Bytes(b) => Some(b),
            Payload::Object(_) => None,
        }
    }

    /// Borrow the value, if this is a structured payload.
    #[must_use]
    pub fn as_object(&self) -> Option<&Value> {
        match self {
            Payload::Object(v) => Some(v),
            Payload::Bytes(_) => None,
        }
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Bytes(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(value))
    }
}

impl From<&'static [u8]> for Payload {
    fn from(value: &'static [u8]) -> Self {
        Payload::Bytes(Bytes::from_static(value))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Object(value)
    }
}

/// Process-unique envelope identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvelopeId(Uuid);

impl EnvelopeId {
    fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One unit of data plus its regime, metadata, and completeness.
///
/// The regime is derived from the payload at construction and whenever the
/// payload is replaced, so the two can never disagree.
#[derive(Debug, Clone)]
pub struct Envelope {
    id: EnvelopeId,
    payload: Payload,
    regime: Regime,
    /// Metadata stamped by adapters and middlewares.
    pub metadata: Metadata,
    /// Whether this is a whole record.
    pub completeness: Completeness,
}

impl Envelope {
    /// Creates a `Complete` envelope with empty metadata.
    pub fn new(payload: impl Into<Payload>) -> Self {
        let payload = payload.into();
        Self {
            id: EnvelopeId::fresh(),
            regime: payload.regime(),
            payload,
            metadata: Metadata::new(),
            completeness: Completeness::Complete,
        }
    }

    /// Sets the completeness.
    #[must_use]
    pub fn with_completeness(mut self, completeness: Completeness) -> Self {
        self.completeness = completeness;
        self
    }

    /// Adds one metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Builds a middleware output: fresh id, inherited metadata and completeness.
    pub(crate) fn derived(
        payload: Payload,
        metadata: Metadata,
        completeness: Completeness,
    ) -> Self {
        Self {
            id: EnvelopeId::fresh(),
            regime: payload.regime(),
            payload,
            metadata,
            completeness,
        }
    }

    /// Envelope identifier.
    #[must_use]
    pub fn id(&self) -> EnvelopeId {
        self.id
    }

    /// Current regime.
    #[must_use]
    pub fn regime(&self) -> Regime {
        self.regime
    }

    /// Borrow the payload.
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consume the envelope, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Split into payload and metadata.
    #[must_use]
    pub fn into_parts(self) -> (Payload, Metadata) {
        (self.payload, self.metadata)
    }
}
