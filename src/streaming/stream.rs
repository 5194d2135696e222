//! The adapter contract every stream implements.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::warn;

use crate::contract::{self, StreamContract};
use crate::envelope::Envelope;
use crate::error::{Result, StreamError};
use crate::policy::StreamPolicy;
use crate::settings::Settings;

/// Lazy, finite sequence of envelopes produced by [`DataStream::read`].
pub type EnvelopeStream<'a> = Box<dyn Iterator<Item = Result<Envelope>> + 'a>;

/// Direction a stream was constructed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Read envelopes out of the resource.
    Source,
    /// Append envelopes to the resource.
    Sink,
}

/// A single physical resource exposed as a chunked envelope stream.
///
/// Streams start closed. `open()` binds the underlying handle, `close()`
/// releases it and is a no-op when already closed. `exists()` may be called
/// in any state and never changes it.
///
/// One instance owns one handle and is not meant to be shared across threads;
/// open independent instances for concurrent work.
pub trait DataStream {
    /// Identifier the caller asked for.
    fn logical(&self) -> &str;

    /// Physical identifier after policy resolution (path or URL).
    fn resource(&self) -> &str;

    /// Source or sink.
    fn mode(&self) -> StreamMode;

    /// Bytes per block read.
    fn chunk_size(&self) -> usize;

    /// Whether a handle is currently bound.
    fn is_open(&self) -> bool;

    /// Binds the underlying handle.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ResourceUnavailable`] if the resource cannot be
    /// reached. Nothing stays bound when this fails.
    fn open(&mut self) -> Result<()>;

    /// Pulls envelopes from an open source.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotOpen`] when the stream is closed.
    fn read(&mut self) -> Result<EnvelopeStream<'_>>;

    /// Appends the envelope's payload to an open sink.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::NotWritable`] unless the adapter supports writing.
    fn write(&mut self, envelope: &Envelope) -> Result<()> {
        let _ = envelope;
        Err(StreamError::NotWritable {
            resource: self.resource().to_string(),
        })
    }

    /// Releases the handle. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered data could not be flushed. The handle is
    /// released regardless.
    fn close(&mut self) -> Result<()>;

    /// Side-effect-free availability probe.
    ///
    /// # Errors
    ///
    /// Returns an error only if the probe itself cannot be attempted.
    fn exists(&self) -> Result<bool>;
}

/// Everything an adapter needs to construct itself.
#[derive(Clone)]
pub struct StreamSpec {
    pub(crate) uri: String,
    pub(crate) resource: Option<String>,
    pub(crate) mode: StreamMode,
    pub(crate) policy: Option<Arc<dyn StreamPolicy>>,
    pub(crate) settings: Settings,
}

impl StreamSpec {
    /// A source spec for `uri` with no policy and empty settings.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            resource: None,
            mode: StreamMode::Source,
            policy: None,
            settings: Settings::new(),
        }
    }

    /// Sets the direction.
    #[must_use]
    pub fn mode(mut self, mode: StreamMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for `mode(StreamMode::Sink)`.
    #[must_use]
    pub fn sink(self) -> Self {
        self.mode(StreamMode::Sink)
    }

    /// Attaches a policy; the URI will be resolved through it.
    #[must_use]
    pub fn policy(mut self, policy: Option<Arc<dyn StreamPolicy>>) -> Self {
        self.policy = policy;
        self
    }

    /// Raw settings map; unknown keys are dropped during hydration.
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Supplies an already-resolved physical identifier.
    #[must_use]
    pub(crate) fn resolved(mut self, resource: String) -> Self {
        self.resource = Some(resource);
        self
    }
}

impl fmt::Debug for StreamSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSpec")
            .field("uri", &self.uri)
            .field("resource", &self.resource)
            .field("mode", &self.mode)
            .field("policy", &self.policy)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Attributes shared by every adapter: identifiers, mode, policy, contract.
#[derive(Debug, Clone)]
pub struct StreamCore<C> {
    logical: String,
    resource: String,
    mode: StreamMode,
    policy: Option<Arc<dyn StreamPolicy>>,
    contract: C,
}

impl<C: StreamContract> StreamCore<C> {
    /// Resolves the resource through the policy (if any) and hydrates `C`.
    ///
    /// # Errors
    ///
    /// Propagates policy errors and [`StreamError::Configuration`] from hydration.
    pub fn from_spec(spec: StreamSpec) -> Result<Self> {
        let resource = match (spec.resource, &spec.policy) {
            (Some(resolved), _) => resolved,
            (None, Some(policy)) => policy.resolve(&spec.uri)?,
            (None, None) => spec.uri.clone(),
        };
        if let Some(policy) = &spec.policy {
            policy.validate_access(&resource)?;
        }
        let contract = contract::hydrate::<C>(&spec.settings)?;
        Ok(Self {
            logical: spec.uri,
            resource,
            mode: spec.mode,
            policy: spec.policy,
            contract,
        })
    }

    /// Identifier the caller asked for.
    #[must_use]
    pub fn logical(&self) -> &str {
        &self.logical
    }

    /// Physical identifier.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Source or sink.
    #[must_use]
    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Policy the stream was resolved through.
    #[must_use]
    pub fn policy(&self) -> Option<&Arc<dyn StreamPolicy>> {
        self.policy.as_ref()
    }

    /// Hydrated settings.
    #[must_use]
    pub fn contract(&self) -> &C {
        &self.contract
    }

    /// Contract flattened back into a settings map.
    #[must_use]
    pub fn contract_settings(&self) -> Settings {
        match serde_json::to_value(&self.contract) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => Settings::new(),
        }
    }

    pub(crate) fn not_open(&self) -> StreamError {
        StreamError::NotOpen {
            resource: self.resource.clone(),
        }
    }
}

/// An adapter the registry can construct from a [`StreamSpec`].
pub trait StreamAdapter: DataStream + Sized + 'static {
    /// Settings record this adapter hydrates.
    type Contract: StreamContract;

    /// Builds a closed stream.
    ///
    /// # Errors
    ///
    /// Returns policy or configuration errors.
    fn from_spec(spec: StreamSpec) -> Result<Self>;
}

/// Scoped acquisition: the stream is open for the lifetime of the session and
/// closed when it ends, including on early return or unwinding.
pub struct Session<'a, S: DataStream + ?Sized> {
    stream: &'a mut S,
    finished: bool,
}

impl<'a, S: DataStream + ?Sized> Session<'a, S> {
    /// Opens `stream`.
    ///
    /// # Errors
    ///
    /// Propagates the adapter's `open()` error.
    pub fn open(stream: &'a mut S) -> Result<Self> {
        stream.open()?;
        Ok(Self {
            stream,
            finished: false,
        })
    }

    /// Closes the stream and reports any close error.
    ///
    /// # Errors
    ///
    /// Propagates the adapter's `close()` error.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.stream.close()
    }
}

impl<S: DataStream + ?Sized> Deref for Session<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.stream
    }
}

impl<S: DataStream + ?Sized> DerefMut for Session<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.stream
    }
}

impl<S: DataStream + ?Sized> Drop for Session<'_, S> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.stream.close() {
            warn!(
                resource = self.stream.resource(),
                error = %e,
                "close failed while leaving session"
            );
        }
    }
}
