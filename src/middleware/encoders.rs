//! Regime-changing codecs.
//!
//! Every encoder stamps `content_type`, `encoding`, and `transcoded_at`
//! (RFC 3339, UTC) on its outputs. A payload that fails to transcode aborts
//! the record with [`StreamError::Decoding`].

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Serializer, Value};

use crate::envelope::{Metadata, Payload, Regime};
use crate::error::{Result, StreamError};

use super::{Middleware, MiddlewareKind, expect_bytes, expect_object};

fn stamp(metadata: &mut Metadata, content_type: &str, encoding: &str) {
    metadata.insert("content_type".into(), Value::from(content_type));
    metadata.insert("encoding".into(), Value::from(encoding));
    metadata.insert(
        "transcoded_at".into(),
        Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
}

fn decoding(stage: &'static str, reason: impl ToString) -> StreamError {
    StreamError::Decoding {
        stage,
        reason: reason.to_string(),
    }
}

/// Parses each byte payload as one JSON document (BYTES → OBJECT).
///
/// Documents that are not JSON objects are filtered out.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesToJson;

impl BytesToJson {
    /// Creates the decoder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for BytesToJson {
    fn name(&self) -> &'static str {
        "BytesToJson"
    }

    fn input_regime(&self) -> Regime {
        Regime::Bytes
    }

    fn output_regime(&self) -> Regime {
        Regime::Object
    }

    fn process(&mut self, payload: Payload) -> Result<Vec<Payload>> {
        let bytes = expect_bytes(self.name(), payload)?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| decoding(self.name(), e))?;
        Ok(match value {
            Value::Object(_) => vec![Payload::Object(value)],
            _ => Vec::new(),
        })
    }

    fn annotate(&self, metadata: &mut Metadata) {
        stamp(metadata, "application/json", "utf-8");
    }
}

/// Serializes each object payload to JSON bytes (OBJECT → BYTES).
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonToBytes {
    indent: Option<usize>,
}

impl JsonToBytes {
    /// Compact output.
    #[must_use]
    pub fn new() -> Self {
        Self { indent: None }
    }

    /// Pretty output indented by `spaces`.
    #[must_use]
    pub fn pretty(spaces: usize) -> Self {
        Self {
            indent: Some(spaces),
        }
    }
}

impl Middleware for JsonToBytes {
    fn name(&self) -> &'static str {
        "JsonToBytes"
    }

    fn input_regime(&self) -> Regime {
        Regime::Object
    }

    fn output_regime(&self) -> Regime {
        Regime::Bytes
    }

    fn process(&mut self, payload: Payload) -> Result<Vec<Payload>> {
        let value = expect_object(self.name(), payload)?;
        let encoded = match self.indent {
            None => serde_json::to_vec(&value).map_err(|e| decoding(self.name(), e))?,
            Some(spaces) => {
                let indent = vec![b' '; spaces];
                let mut out = Vec::new();
                let formatter = PrettyFormatter::with_indent(&indent);
                let mut ser = Serializer::with_formatter(&mut out, formatter);
                value
                    .serialize(&mut ser)
                    .map_err(|e| decoding(self.name(), e))?;
                out
            }
        };
        Ok(vec![Payload::from(encoded)])
    }

    fn annotate(&self, metadata: &mut Metadata) {
        stamp(metadata, "application/json", "utf-8");
    }
}

/// Transcodes JSON bytes to MessagePack bytes (BYTES → BYTES).
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonToMsgpack;

impl JsonToMsgpack {
    /// Creates the transcoder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for JsonToMsgpack {
    fn name(&self) -> &'static str {
        "JsonToMsgpack"
    }

    fn input_regime(&self) -> Regime {
        Regime::Bytes
    }

    fn output_regime(&self) -> Regime {
        Regime::Bytes
    }

    fn kind(&self) -> MiddlewareKind {
        MiddlewareKind::Encoder
    }

    fn process(&mut self, payload: Payload) -> Result<Vec<Payload>> {
        let bytes = expect_bytes(self.name(), payload)?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| decoding(self.name(), e))?;
        let packed = rmp_serde::to_vec_named(&value).map_err(|e| decoding(self.name(), e))?;
        Ok(vec![Payload::from(packed)])
    }

    fn annotate(&self, metadata: &mut Metadata) {
        stamp(metadata, "application/msgpack", "binary");
    }
}

/// Renders any payload as lowercase hex (ANY → BYTES).
///
/// Objects are serialized to compact JSON first.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToHex;

impl ToHex {
    /// Creates the encoder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for ToHex {
    fn name(&self) -> &'static str {
        "ToHex"
    }

    fn input_regime(&self) -> Regime {
        Regime::Any
    }

    fn output_regime(&self) -> Regime {
        Regime::Bytes
    }

    fn process(&mut self, payload: Payload) -> Result<Vec<Payload>> {
        let encoded = match payload {
            Payload::Bytes(bytes) => hex::encode(bytes),
            Payload::Object(value) => {
                hex::encode(serde_json::to_vec(&value).map_err(|e| decoding(self.name(), e))?)
            }
        };
        Ok(vec![Payload::from(encoded.into_bytes())])
    }

    fn annotate(&self, metadata: &mut Metadata) {
        stamp(metadata, "text/plain", "hex");
    }
}
