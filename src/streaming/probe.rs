//! Pre-flight header probe for remote streams.

use std::time::Duration;

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::warn;

use crate::envelope::{Envelope, Metadata};
use crate::error::Result;

use super::stream::{DataStream, EnvelopeStream, StreamMode};

/// Decorator that HEAD-probes the inner stream's resource on `open()` and
/// stamps the returned headers onto every envelope it reads.
///
/// Header names are lowercased. A failed probe is logged and the stream
/// still opens; envelopes then carry no probe headers.
pub struct HeaderProbe<S> {
    inner: S,
    headers: Metadata,
    timeout: Duration,
}

impl<S: DataStream> HeaderProbe<S> {
    /// Wraps `inner`, taking exclusive ownership of it.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            headers: Metadata::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Overrides the probe timeout (default: 10s).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Headers captured by the last probe.
    #[must_use]
    pub fn headers(&self) -> &Metadata {
        &self.headers
    }

    /// The wrapped stream.
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Unwraps the decorator.
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn probe(&self) -> std::result::Result<Metadata, reqwest::Error> {
        let client = Client::builder().timeout(self.timeout).build()?;
        let response = client.head(self.inner.resource()).send()?;
        Ok(response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                let value = value.to_str().ok()?;
                Some((name.as_str().to_ascii_lowercase(), Value::from(value)))
            })
            .collect())
    }
}

impl<S: DataStream> DataStream for HeaderProbe<S> {
    fn logical(&self) -> &str {
        self.inner.logical()
    }

    fn resource(&self) -> &str {
        self.inner.resource()
    }

    fn mode(&self) -> StreamMode {
        self.inner.mode()
    }

    fn chunk_size(&self) -> usize {
        self.inner.chunk_size()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn open(&mut self) -> Result<()> {
        match self.probe() {
            Ok(headers) => self.headers = headers,
            Err(e) => {
                warn!(resource = self.inner.resource(), error = %e, "header probe failed");
                self.headers.clear();
            }
        }
        self.inner.open()
    }

    fn read(&mut self) -> Result<EnvelopeStream<'_>> {
        let headers = &self.headers;
        let envelopes = self.inner.read()?;
        Ok(Box::new(envelopes.map(move |item| {
            item.map(|mut envelope| {
                for (name, value) in headers {
                    envelope.metadata.insert(name.clone(), value.clone());
                }
                envelope
            })
        })))
    }

    fn write(&mut self, envelope: &Envelope) -> Result<()> {
        self.inner.write(envelope)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn exists(&self) -> Result<bool> {
        self.inner.exists()
    }
}
