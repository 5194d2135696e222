//! Protocol scheme → adapter catalog.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{Result, StreamError};
use crate::policy::StreamPolicy;
use crate::settings::Settings;
use crate::streaming::{DataStream, LocalFileStream, StreamAdapter, StreamMode, StreamSpec};

/// Scheme assumed for URIs without `://`.
pub const DEFAULT_SCHEME: &str = "file";

type Factory = fn(StreamSpec) -> Result<Box<dyn DataStream>>;

fn construct<A: StreamAdapter>(spec: StreamSpec) -> Result<Box<dyn DataStream>> {
    Ok(Box::new(A::from_spec(spec)?))
}

/// Adapter and optional policy bound to one scheme.
#[derive(Clone)]
pub struct ProtocolRegistration {
    adapter: &'static str,
    factory: Factory,
    policy: Option<Arc<dyn StreamPolicy>>,
}

impl ProtocolRegistration {
    /// Type name of the adapter.
    #[must_use]
    pub fn adapter(&self) -> &'static str {
        self.adapter
    }

    /// Policy URIs are resolved through, if any.
    #[must_use]
    pub fn policy(&self) -> Option<&Arc<dyn StreamPolicy>> {
        self.policy.as_ref()
    }
}

impl fmt::Debug for ProtocolRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolRegistration")
            .field("adapter", &self.adapter)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Builds streams by URI scheme.
#[derive(Debug, Clone, Default)]
pub struct StreamRegistry {
    protocols: IndexMap<String, ProtocolRegistration>,
}

impl StreamRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the native adapters: `file` (through `file_policy`),
    /// plus `http` and `https` when the `http` feature is enabled.
    #[must_use]
    pub fn with_defaults(file_policy: Option<Arc<dyn StreamPolicy>>) -> Self {
        let mut registry = Self::new();
        registry.register::<LocalFileStream>(DEFAULT_SCHEME, file_policy);
        #[cfg(feature = "http")]
        {
            use crate::streaming::HttpStream;
            registry.register::<HttpStream>("http", None);
            registry.register::<HttpStream>("https", None);
        }
        registry
    }

    /// Binds `scheme` to adapter `A`, replacing any previous binding.
    pub fn register<A: StreamAdapter>(
        &mut self,
        scheme: &str,
        policy: Option<Arc<dyn StreamPolicy>>,
    ) {
        let registration = ProtocolRegistration {
            adapter: type_name::<A>(),
            factory: construct::<A>,
            policy,
        };
        if let Some(previous) = self
            .protocols
            .insert(scheme.to_ascii_lowercase(), registration)
        {
            debug!(scheme, replaced = previous.adapter, "protocol re-registered");
        }
    }

    /// Registration for `scheme`.
    #[must_use]
    pub fn get(&self, scheme: &str) -> Option<&ProtocolRegistration> {
        self.protocols.get(&scheme.to_ascii_lowercase())
    }

    /// Registered schemes in registration order.
    #[must_use]
    pub fn schemes(&self) -> Vec<String> {
        self.protocols.keys().cloned().collect()
    }

    /// Builds a closed stream for `uri`.
    ///
    /// When the scheme has a policy, the URI is resolved through it first and
    /// the adapter only ever sees the resolved identifier.
    ///
    /// # Errors
    ///
    /// - [`StreamError::UnknownProtocol`] if no adapter is registered for the scheme.
    /// - Policy errors from resolution.
    /// - Construction errors from the adapter.
    pub fn get_stream(
        &self,
        uri: &str,
        as_sink: bool,
        settings: Settings,
    ) -> Result<Box<dyn DataStream>> {
        let scheme = scheme_of(uri);
        let registration = self.get(scheme).ok_or_else(|| StreamError::UnknownProtocol {
            scheme: scheme.to_string(),
            registered: self.schemes(),
        })?;

        let mode = if as_sink {
            StreamMode::Sink
        } else {
            StreamMode::Source
        };
        let mut spec = StreamSpec::new(uri)
            .mode(mode)
            .policy(registration.policy.clone())
            .settings(settings);
        if let Some(policy) = &registration.policy {
            spec = spec.resolved(policy.resolve(uri)?);
        }

        debug!(uri, scheme, adapter = registration.adapter, ?mode, "dispatching stream");
        (registration.factory)(spec)
    }
}

/// Scheme of `uri`: the text before `://`, or [`DEFAULT_SCHEME`].
#[must_use]
pub fn scheme_of(uri: &str) -> &str {
    uri.split_once("://")
        .map_or(DEFAULT_SCHEME, |(scheme, _)| scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_parsing() {
        assert_eq!(scheme_of("https://example.com/a"), "https");
        assert_eq!(scheme_of("file://data/x.log"), "file");
        assert_eq!(scheme_of("data/x.log"), "file");
    }

    #[test]
    fn defaults_are_registered() {
        let registry = StreamRegistry::with_defaults(None);
        assert!(registry.get("file").is_some());
        #[cfg(feature = "http")]
        assert_eq!(registry.schemes(), vec!["file", "http", "https"]);
    }

    #[test]
    fn unknown_scheme_lists_registered() {
        let registry = StreamRegistry::with_defaults(None);
        let err = registry
            .get_stream("s3://bucket/key", false, Settings::new())
            .err()
            .unwrap();
        match err {
            StreamError::UnknownProtocol { scheme, registered } => {
                assert_eq!(scheme, "s3");
                assert!(registered.contains(&"file".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
