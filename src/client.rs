//! Facade wiring configuration, policy, and registry together.

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::policy::{AnchorPolicy, StreamPolicy};
use crate::registry::{StreamRegistry, scheme_of};
use crate::settings::{AppConfig, Settings, SettingsResolver};
use crate::streaming::DataStream;

/// Entry point for opening streams by URI.
///
/// ```no_run
/// use streamflow_core::{settings, AppConfig, StreamClient};
///
/// let config = AppConfig::load("streamflow.toml")?;
/// let client = StreamClient::new(config)?;
/// let source = client.get_stream("data/journal.log", false, settings! { "use_lines" => true })?;
/// let sink = client.get_stream("file://data/copy.log", true, settings! {})?;
/// # Ok::<(), streamflow_core::StreamError>(())
/// ```
#[derive(Debug)]
pub struct StreamClient {
    resolver: SettingsResolver,
    registry: StreamRegistry,
    policy: Option<Arc<AnchorPolicy>>,
}

impl StreamClient {
    /// Builds the client from Tier 1 configuration.
    ///
    /// The `file` scheme is sandboxed by an [`AnchorPolicy`] built from
    /// `config.anchors` when any are configured.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StreamError::AnchorMissing`] if an anchor directory
    /// does not exist.
    pub fn new(config: AppConfig) -> Result<Self> {
        let policy = if config.anchors.is_empty() {
            None
        } else {
            Some(Arc::new(AnchorPolicy::new(config.anchors.clone())?))
        };
        let file_policy = policy.clone().map(|p| p as Arc<dyn StreamPolicy>);
        let registry = StreamRegistry::with_defaults(file_policy);

        info!(
            env = ?config.env,
            anchors = config.anchors.len(),
            schemes = ?registry.schemes(),
            "stream client ready"
        );
        Ok(Self {
            resolver: SettingsResolver::new(config),
            registry,
            policy,
        })
    }

    /// Builds a closed stream for `uri` with waterfall-resolved settings.
    ///
    /// # Errors
    ///
    /// Propagates registry, policy, and adapter construction errors.
    pub fn get_stream(
        &self,
        uri: &str,
        as_sink: bool,
        overrides: Settings,
    ) -> Result<Box<dyn DataStream>> {
        let settings = self.resolver.resolve(scheme_of(uri), &overrides);
        self.registry.get_stream(uri, as_sink, settings)
    }

    /// Tier 1 configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        self.resolver.global()
    }

    /// Settings resolver, for installing Tier 2 tables at runtime.
    pub fn resolver_mut(&mut self) -> &mut SettingsResolver {
        &mut self.resolver
    }

    /// Registered adapters.
    #[must_use]
    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Registry, for adding adapters.
    pub fn registry_mut(&mut self) -> &mut StreamRegistry {
        &mut self.registry
    }

    /// Filesystem sandbox, if anchors were configured.
    #[must_use]
    pub fn policy(&self) -> Option<&AnchorPolicy> {
        self.policy.as_deref()
    }
}
