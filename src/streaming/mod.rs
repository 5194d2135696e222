//! Stream adapters: one physical resource exposed as a chunked envelope stream.
//!
//! Every adapter implements [`DataStream`] and is built from a [`StreamSpec`]
//! through [`StreamAdapter::from_spec`], which resolves the URI through the
//! adapter's policy and hydrates its settings contract.
//!
//! # Adapters
//!
//! - [`LocalFileStream`]: files under an anchored sandbox, source or sink.
//! - [`HttpStream`]: read-only HTTP/HTTPS exchanges (feature `http`).
//! - [`HeaderProbe`]: decorator stamping HEAD headers onto envelopes (feature `http`).
//!
//! # Example
//!
//! ```no_run
//! use streamflow_core::streaming::{DataStream, LocalFileStream, Session, StreamMode};
//! use streamflow_core::{settings, AnchorPolicy};
//! use std::sync::Arc;
//!
//! let policy = Arc::new(AnchorPolicy::new([("data", "./data")])?);
//! let mut source = LocalFileStream::new(
//!     "data/journal.log",
//!     StreamMode::Source,
//!     Some(policy),
//!     settings! { "use_lines" => true },
//! )?;
//!
//! let mut session = Session::open(&mut source)?;
//! for envelope in session.read()? {
//!     println!("{:?}", envelope?.payload());
//! }
//! # Ok::<(), streamflow_core::StreamError>(())
//! ```

mod chunker;
#[cfg(feature = "http")]
mod http;
mod local;
#[cfg(feature = "http")]
mod probe;
mod stream;

#[cfg(feature = "http")]
pub use http::{HttpContract, HttpStream};
pub use local::{LocalFileContract, LocalFileStream};
#[cfg(feature = "http")]
pub use probe::HeaderProbe;
pub use stream::{
    DataStream, EnvelopeStream, Session, StreamAdapter, StreamCore, StreamMode, StreamSpec,
};
