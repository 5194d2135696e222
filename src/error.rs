//! Error types shared by every stream, policy, and middleware.

use std::borrow::Cow;
use std::path::PathBuf;

use thiserror::Error;

use crate::envelope::Regime;

/// Result type for streaming operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors that can occur while resolving, opening, or pumping a stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A settings field is missing, mistyped, or out of range.
    #[error("Configuration error in {contract}: {reason}")]
    Configuration {
        /// Contract (or component) being hydrated
        contract: &'static str,
        /// What went wrong
        reason: Cow<'static, str>,
    },

    /// An anchor directory did not exist when the policy was built.
    #[error("Anchor '{key}' points to non-existent directory {}", path.display())]
    AnchorMissing {
        /// Logical anchor key
        key: String,
        /// Directory that could not be found
        path: PathBuf,
    },

    /// The logical key is not a registered anchor.
    #[error(
        "Unauthorized: '{key}' is not a registered anchor (available: {})",
        available.join(", ")
    )]
    Unauthorized {
        /// Key taken from the first path segment
        key: String,
        /// Registered anchor keys
        available: Vec<String>,
    },

    /// A resolved path escaped its anchor directory.
    #[error("Path traversal blocked: {} escapes {}", path.display(), anchor.display())]
    PathTraversal {
        /// Canonical path that was produced
        path: PathBuf,
        /// Anchor directory it had to stay under
        anchor: PathBuf,
    },

    /// The physical resource cannot be reached or created.
    #[error("Resource unavailable: {resource} ({reason})")]
    ResourceUnavailable {
        /// Physical resource identifier (resolved path or URL)
        resource: String,
        /// Reason the resource is unavailable
        reason: Cow<'static, str>,
    },

    /// A middleware received an envelope of the wrong shape.
    #[error("{middleware} expects {expected} but received {actual}")]
    RegimeMismatch {
        /// Name of the middleware
        middleware: &'static str,
        /// Regime the middleware declared
        expected: Regime,
        /// Regime the envelope carried
        actual: Regime,
    },

    /// Network error during an HTTP exchange.
    #[cfg(feature = "http")]
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A payload could not be encoded or decoded.
    #[error("{stage} failed to decode record: {reason}")]
    Decoding {
        /// Middleware or adapter that hit the malformed payload
        stage: &'static str,
        /// Underlying codec message
        reason: String,
    },

    /// A guard middleware refused the record.
    #[error("{middleware} rejected the stream: {reason}")]
    Rejected {
        /// Name of the middleware
        middleware: &'static str,
        /// Why the record was refused
        reason: String,
    },

    /// No adapter is registered for the URI scheme.
    #[error("Unsupported protocol '{scheme}' (registered: {})", registered.join(", "))]
    UnknownProtocol {
        /// Scheme parsed from the URI
        scheme: String,
        /// Currently registered schemes
        registered: Vec<String>,
    },

    /// The stream was used before `open()` or after `close()`.
    #[error("Stream for {resource} is not open")]
    NotOpen {
        /// Physical resource identifier
        resource: String,
    },

    /// `write()` was called on a source stream.
    #[error("Stream for {resource} was not opened as a sink")]
    NotWritable {
        /// Physical resource identifier
        resource: String,
    },

    /// The adapter does not implement the requested capability.
    #[error("{adapter} does not support {capability}")]
    Unsupported {
        /// Adapter name
        adapter: &'static str,
        /// Capability that was requested
        capability: &'static str,
    },

    /// I/O error on a local resource.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    pub(crate) fn config(contract: &'static str, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::Configuration {
            contract,
            reason: reason.into(),
        }
    }

    pub(crate) fn unavailable(
        resource: impl Into<String>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResourceUnavailable {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors that signal a sandbox or guard violation.
    ///
    /// These must never be logged and skipped.
    #[must_use]
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized { .. } | Self::PathTraversal { .. } | Self::Rejected { .. }
        )
    }
}
