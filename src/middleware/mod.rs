//! Regime-typed transforms applied to envelopes between source and sink.
//!
//! A middleware declares the regime it accepts and the regime it produces,
//! and turns one payload into zero or more payloads. Zero outputs filter the
//! record, one output maps it, several outputs split it. Stateful middlewares
//! may hold input back across calls and release it later.
//!
//! [`Middleware::apply`] enforces the contract around the payload transform:
//!
//! 1. The envelope regime must be admitted by [`Middleware::input_regime`].
//! 2. [`Middleware::metadata_hook`] runs before the transform, so it sees
//!    records the transform later drops.
//! 3. [`Middleware::process`] produces the output payloads.
//! 4. Each output becomes a new envelope with a copy of the hooked metadata
//!    and the input's completeness.

mod aggregator;
mod closure;
mod encoders;
mod security;
mod telemetry;

use crate::envelope::{Envelope, Metadata, Payload, Regime};
use crate::error::{Result, StreamError};

pub use aggregator::JsonRecordAggregator;
pub use closure::FnMiddleware;
pub use encoders::{BytesToJson, JsonToBytes, JsonToMsgpack, ToHex};
pub use security::{ContentTypeGuard, Sha256Hasher};
pub use telemetry::{ExecutionTimer, HeaderInspector, RowCounter};

/// Broad class of a middleware, derived from its regimes unless overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareKind {
    /// BYTES in, BYTES out.
    ByteOnly,
    /// OBJECT in, OBJECT out.
    ObjectOnly,
    /// Changes the payload regime.
    Encoder,
    /// Buffers input across calls.
    Stateful,
    /// Accepts or mirrors any regime.
    PassThrough,
}

/// One stage of a pipeline.
pub trait Middleware {
    /// Name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Regime this stage accepts; [`Regime::Any`] accepts everything.
    fn input_regime(&self) -> Regime;

    /// Regime this stage produces; [`Regime::Any`] mirrors the input.
    fn output_regime(&self) -> Regime;

    /// Broad class of this stage.
    fn kind(&self) -> MiddlewareKind {
        match (self.input_regime(), self.output_regime()) {
            (Regime::Bytes, Regime::Bytes) => MiddlewareKind::ByteOnly,
            (Regime::Object, Regime::Object) => MiddlewareKind::ObjectOnly,
            (input, output) if output != Regime::Any && input != output => MiddlewareKind::Encoder,
            _ => MiddlewareKind::PassThrough,
        }
    }

    /// Inspects or stamps metadata before the payload transform runs.
    ///
    /// # Errors
    ///
    /// An error aborts the record.
    fn metadata_hook(&mut self, metadata: &mut Metadata) -> Result<()> {
        let _ = metadata;
        Ok(())
    }

    /// Transforms one payload into zero or more payloads.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Decoding`] when the payload cannot be transcoded,
    /// or any other error that should abort the record.
    fn process(&mut self, payload: Payload) -> Result<Vec<Payload>>;

    /// Stamps metadata shared by every output of a successful transform.
    fn annotate(&self, metadata: &mut Metadata) {
        let _ = metadata;
    }

    /// Runs the full stage contract on one envelope.
    ///
    /// # Errors
    ///
    /// - [`StreamError::RegimeMismatch`] if the envelope regime is not admitted,
    ///   or if the transform produced a payload of an undeclared regime.
    /// - Any error from the hook or the transform.
    fn apply(&mut self, envelope: Envelope) -> Result<Vec<Envelope>> {
        let expected = self.input_regime();
        if !expected.admits(envelope.regime()) {
            return Err(StreamError::RegimeMismatch {
                middleware: self.name(),
                expected,
                actual: envelope.regime(),
            });
        }

        let completeness = envelope.completeness;
        let (payload, mut metadata) = envelope.into_parts();
        self.metadata_hook(&mut metadata)?;

        let outputs = self.process(payload)?;
        if outputs.is_empty() {
            return Ok(Vec::new());
        }
        self.annotate(&mut metadata);

        let declared = self.output_regime();
        let last = outputs.len() - 1;
        let mut produced = Vec::with_capacity(outputs.len());
        for (i, payload) in outputs.into_iter().enumerate() {
            if !declared.admits(payload.regime()) {
                return Err(StreamError::RegimeMismatch {
                    middleware: self.name(),
                    expected: declared,
                    actual: payload.regime(),
                });
            }
            let metadata = if i == last {
                std::mem::take(&mut metadata)
            } else {
                metadata.clone()
            };
            produced.push(Envelope::derived(payload, metadata, completeness));
        }
        Ok(produced)
    }
}

impl<M: Middleware + ?Sized> Middleware for Box<M> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn input_regime(&self) -> Regime {
        (**self).input_regime()
    }

    fn output_regime(&self) -> Regime {
        (**self).output_regime()
    }

    fn kind(&self) -> MiddlewareKind {
        (**self).kind()
    }

    fn metadata_hook(&mut self, metadata: &mut Metadata) -> Result<()> {
        (**self).metadata_hook(metadata)
    }

    fn process(&mut self, payload: Payload) -> Result<Vec<Payload>> {
        (**self).process(payload)
    }

    fn annotate(&self, metadata: &mut Metadata) {
        (**self).annotate(metadata);
    }

    fn apply(&mut self, envelope: Envelope) -> Result<Vec<Envelope>> {
        (**self).apply(envelope)
    }
}

pub(crate) fn expect_bytes(name: &'static str, payload: Payload) -> Result<bytes::Bytes> {
    match payload {
        Payload::Bytes(bytes) => Ok(bytes),
        Payload::Object(_) => Err(StreamError::RegimeMismatch {
            middleware: name,
            expected: Regime::Bytes,
            actual: Regime::Object,
        }),
    }
}

pub(crate) fn expect_object(name: &'static str, payload: Payload) -> Result<serde_json::Value> {
    match payload {
        Payload::Object(value) => Ok(value),
        Payload::Bytes(_) => Err(StreamError::RegimeMismatch {
            middleware: name,
            expected: Regime::Object,
            actual: Regime::Bytes,
        }),
    }
}
