use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::envelope::{Metadata, Payload, Regime};
use crate::error::{Result, StreamError};

use super::{Middleware, expect_bytes};

/// Running SHA-256 over every byte payload that passes through.
///
/// Payloads are forwarded unchanged.
#[derive(Debug, Clone, Default)]
pub struct Sha256Hasher {
    hasher: Sha256,
    bytes: u64,
}

impl Sha256Hasher {
    /// Creates a hasher with empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest of everything seen so far, as lowercase hex.
    #[must_use]
    pub fn hex_digest(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    /// Number of bytes hashed.
    #[must_use]
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }
}

impl Middleware for Sha256Hasher {
    fn name(&self) -> &'static str {
        "Sha256Hasher"
    }

    fn input_regime(&self) -> Regime {
        Regime::Bytes
    }

    fn output_regime(&self) -> Regime {
        Regime::Bytes
    }

    fn process(&mut self, payload: Payload) -> Result<Vec<Payload>> {
        let bytes = expect_bytes(self.name(), payload)?;
        self.hasher.update(&bytes);
        self.bytes += bytes.len() as u64;
        Ok(vec![Payload::Bytes(bytes)])
    }
}

/// Rejects the stream if the first record's `content-type` does not match.
///
/// The check runs once, on the first envelope. A record without a
/// `content-type` entry passes.
#[derive(Debug, Clone)]
pub struct ContentTypeGuard {
    expected: String,
    verified: bool,
}

impl ContentTypeGuard {
    /// Guard requiring `expected` to appear in the content type.
    #[must_use]
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            verified: false,
        }
    }
}

impl Default for ContentTypeGuard {
    fn default() -> Self {
        Self::new("application/json")
    }
}

impl Middleware for ContentTypeGuard {
    fn name(&self) -> &'static str {
        "ContentTypeGuard"
    }

    fn input_regime(&self) -> Regime {
        Regime::Any
    }

    fn output_regime(&self) -> Regime {
        Regime::Any
    }

    fn metadata_hook(&mut self, metadata: &mut Metadata) -> Result<()> {
        if self.verified {
            return Ok(());
        }
        let actual = metadata
            .get("content-type")
            .or_else(|| metadata.get("Content-Type"))
            .and_then(Value::as_str);
        if let Some(actual) = actual {
            if !actual.contains(&self.expected) {
                warn!(expected = %self.expected, actual, "content type mismatch");
                return Err(StreamError::Rejected {
                    middleware: "ContentTypeGuard",
                    reason: format!("expected {}, source sent {actual}", self.expected),
                });
            }
        }
        self.verified = true;
        Ok(())
    }

    fn process(&mut self, payload: Payload) -> Result<Vec<Payload>> {
        Ok(vec![payload])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;

    #[test]
    fn digest_matches_whole_input() {
        let mut hasher = Sha256Hasher::new();
        for chunk in [b"hello ".as_slice(), b"world".as_slice()] {
            let out = hasher.apply(Envelope::new(chunk)).unwrap();
            assert_eq!(out[0].payload().as_bytes().unwrap().as_ref(), chunk);
        }
        assert_eq!(
            hasher.hex_digest(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(hasher.bytes_hashed(), 11);
    }

    #[test]
    fn guard_rejects_mismatch() {
        let mut guard = ContentTypeGuard::default();
        let env = Envelope::new(b"<html>".as_slice()).with_meta("content-type", "text/html");
        let err = guard.apply(env).unwrap_err();
        assert!(err.is_security());
    }

    #[test]
    fn guard_checks_only_the_first_record() {
        let mut guard = ContentTypeGuard::default();
        let first = Envelope::new(b"{}".as_slice())
            .with_meta("content-type", "application/json; charset=utf-8");
        assert_eq!(guard.apply(first).unwrap().len(), 1);
        let second = Envelope::new(b"{}".as_slice()).with_meta("content-type", "text/html");
        assert_eq!(guard.apply(second).unwrap().len(), 1);
    }
}
