//! Protocol-agnostic streaming I/O.
//!
//! A logical resource (a sandboxed local file, an HTTP endpoint, or any
//! registered backend) is opened as a chunked stream of [`Envelope`]s, run
//! through a chain of regime-typed [`middleware`], and written to a sink.
//!
//! The moving parts:
//!
//! - [`AnchorPolicy`] maps `<anchor>/<path>` onto pre-registered directories
//!   and blocks traversal out of them.
//! - [`SettingsResolver`] merges global, per-protocol, and call-site settings.
//! - [`StreamRegistry`] picks the adapter for a URI scheme and resolves the
//!   URI through the scheme's policy.
//! - [`Pipeline`] pumps a source through the chain into a sink.
//! - [`StreamClient`] wires all of the above from an [`AppConfig`].
//!
//! # Example
//!
//! ```no_run
//! use streamflow_core::middleware::{BytesToJson, FnMiddleware, JsonToBytes, RowCounter};
//! use streamflow_core::{AppConfig, Pipeline, Regime, StreamClient, settings};
//!
//! let mut config = AppConfig::default();
//! config.anchors.insert("data".into(), "./data".into());
//! let client = StreamClient::new(config)?;
//!
//! let lines = settings! { "use_lines" => true };
//! let mut source = client.get_stream("data/journal.log", false, lines)?;
//! let mut sink = client.get_stream("data/journal.clean.log", true, settings! {})?;
//!
//! let mut decode = BytesToJson::new();
//! let mut count = RowCounter::new();
//! let mut encode = JsonToBytes::new();
//! let mut newline = FnMiddleware::new("Newline", Regime::Bytes, Regime::Bytes, |payload| {
//!     let mut line = payload.as_bytes().map(|b| b.to_vec()).unwrap_or_default();
//!     line.push(b'\n');
//!     Ok(vec![line.into()])
//! });
//! let report = Pipeline::new()
//!     .with(&mut decode)
//!     .with(&mut count)
//!     .with(&mut encode)
//!     .with(&mut newline)
//!     .run(source.as_mut(), sink.as_mut())?;
//! println!("{} records written", report.records_written);
//! # Ok::<(), streamflow_core::StreamError>(())
//! ```

mod client;
pub mod contract;
mod envelope;
mod error;
pub mod middleware;
mod pipeline;
pub mod policy;
mod registry;
mod settings;
pub mod streaming;

pub use client::StreamClient;
pub use contract::{FieldKind, FieldSpec, ReadMode, StreamContract};
pub use envelope::{Completeness, Envelope, EnvelopeId, Metadata, Payload, Regime};
pub use error::{Result, StreamError};
pub use pipeline::{Pipeline, RunReport};
pub use policy::{AnchorPolicy, StreamPolicy};
pub use registry::{DEFAULT_SCHEME, ProtocolRegistration, StreamRegistry, scheme_of};
pub use settings::{AppConfig, Environment, LogLevel, Settings, SettingsResolver, resolve};

#[doc(hidden)]
pub use serde_json as __serde_json;
