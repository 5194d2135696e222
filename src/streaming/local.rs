//! Local filesystem stream.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contract::{BASE_FIELDS, FieldKind, FieldSpec, ReadMode, StreamContract};
use crate::envelope::{Envelope, Payload};
use crate::error::{Result, StreamError};
use crate::policy::StreamPolicy;
use crate::settings::Settings;

use super::chunker::Chunker;
use super::stream::{DataStream, EnvelopeStream, StreamAdapter, StreamCore, StreamMode, StreamSpec};

/// Settings for [`LocalFileStream`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalFileContract {
    /// Bytes per block read (default: 1024).
    pub chunk_size: usize,
    /// Read line by line regardless of `read_mode`.
    pub use_lines: bool,
    /// Read strategy (default: bytes).
    pub read_mode: ReadMode,
    /// Text encoding; only UTF-8 is supported.
    pub encoding: String,
    /// Append to an existing sink instead of truncating it.
    pub append: bool,
}

impl Default for LocalFileContract {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            use_lines: false,
            read_mode: ReadMode::Bytes,
            encoding: "utf-8".into(),
            append: false,
        }
    }
}

impl StreamContract for LocalFileContract {
    const NAME: &'static str = "LocalFileContract";

    fn fields() -> &'static [FieldSpec] {
        const FIELDS: [FieldSpec; 5] = [
            BASE_FIELDS[0],
            BASE_FIELDS[1],
            FieldSpec::new("read_mode", FieldKind::Str),
            FieldSpec::new("encoding", FieldKind::Str),
            FieldSpec::new("append", FieldKind::Bool),
        ];
        &FIELDS
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn use_lines(&self) -> bool {
        self.use_lines
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(StreamError::config(Self::NAME, "chunk_size must be > 0"));
        }
        if !matches!(self.encoding.to_ascii_lowercase().as_str(), "utf-8" | "utf8") {
            return Err(StreamError::config(
                Self::NAME,
                format!("unsupported encoding '{}'", self.encoding),
            ));
        }
        Ok(())
    }
}

enum Handle {
    Reader(BufReader<File>),
    Writer(BufWriter<File>),
}

/// A file opened for block, line, or text reads, or for appending envelopes.
///
/// Byte payloads are written verbatim; object payloads are written as one
/// compact JSON document per line.
pub struct LocalFileStream {
    core: StreamCore<LocalFileContract>,
    path: PathBuf,
    handle: Option<Handle>,
}

impl LocalFileStream {
    /// Builds a closed stream for `uri`, resolving it through `policy` if given.
    ///
    /// # Errors
    ///
    /// Returns policy errors (unknown anchor, traversal) or configuration errors.
    pub fn new(
        uri: impl Into<String>,
        mode: StreamMode,
        policy: Option<Arc<dyn StreamPolicy>>,
        settings: Settings,
    ) -> Result<Self> {
        Self::from_spec(
            StreamSpec::new(uri)
                .mode(mode)
                .policy(policy)
                .settings(settings),
        )
    }

    /// Physical path being streamed.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hydrated settings.
    #[must_use]
    pub fn contract(&self) -> &LocalFileContract {
        self.core.contract()
    }

    /// A closed source over the same physical file, with the same policy and settings.
    ///
    /// # Errors
    ///
    /// Returns policy errors if the resolved path is no longer permitted.
    pub fn as_source(&self) -> Result<Self> {
        Self::from_spec(
            StreamSpec::new(self.core.resource())
                .policy(self.core.policy().cloned())
                .settings(self.core.contract_settings()),
        )
    }

    fn open_source(&self) -> Result<Handle> {
        match File::open(&self.path) {
            Ok(file) => Ok(Handle::Reader(BufReader::new(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StreamError::unavailable(
                self.path.display().to_string(),
                "file not found",
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn open_sink(&self) -> Result<Handle> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            return Err(StreamError::unavailable(
                parent.display().to_string(),
                "directory does not exist",
            ));
        }
        let append = self.core.contract().append;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&self.path)?;
        Ok(Handle::Writer(BufWriter::new(file)))
    }
}

impl StreamAdapter for LocalFileStream {
    type Contract = LocalFileContract;

    fn from_spec(spec: StreamSpec) -> Result<Self> {
        let core = StreamCore::<LocalFileContract>::from_spec(spec)?;
        let raw = core.resource();
        let path = PathBuf::from(raw.strip_prefix("file://").unwrap_or(raw));
        Ok(Self {
            core,
            path,
            handle: None,
        })
    }
}

impl DataStream for LocalFileStream {
    fn logical(&self) -> &str {
        self.core.logical()
    }

    fn resource(&self) -> &str {
        self.core.resource()
    }

    fn mode(&self) -> StreamMode {
        self.core.mode()
    }

    fn chunk_size(&self) -> usize {
        self.core.contract().chunk_size
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let handle = match self.core.mode() {
            StreamMode::Source => self.open_source()?,
            StreamMode::Sink => self.open_sink()?,
        };
        debug!(path = %self.path.display(), mode = ?self.core.mode(), "opened local stream");
        self.handle = Some(handle);
        Ok(())
    }

    fn read(&mut self) -> Result<EnvelopeStream<'_>> {
        let contract = self.core.contract();
        let mode = contract.read_mode.effective(contract.use_lines);
        let chunk_size = contract.chunk_size;
        match &mut self.handle {
            Some(Handle::Reader(reader)) => {
                Ok(Chunker::new(reader, mode, chunk_size, "LocalFileStream")
                    .stamp("uri", self.core.logical())
                    .boxed())
            }
            Some(Handle::Writer(_)) => Err(StreamError::Unsupported {
                adapter: "LocalFileStream",
                capability: "reading from a sink",
            }),
            None => Err(self.core.not_open()),
        }
    }

    fn write(&mut self, envelope: &Envelope) -> Result<()> {
        let writer = match &mut self.handle {
            Some(Handle::Writer(writer)) => writer,
            Some(Handle::Reader(_)) => {
                return Err(StreamError::NotWritable {
                    resource: self.core.resource().to_string(),
                });
            }
            None if self.core.mode() == StreamMode::Source => {
                return Err(StreamError::NotWritable {
                    resource: self.core.resource().to_string(),
                });
            }
            None => return Err(self.core.not_open()),
        };
        match envelope.payload() {
            Payload::Bytes(bytes) => writer.write_all(bytes)?,
            Payload::Object(value) => {
                serde_json::to_writer(&mut *writer, value).map_err(std::io::Error::from)?;
                writer.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(Handle::Writer(mut writer)) => {
                debug!(path = %self.path.display(), "closing local sink");
                writer.flush()?;
                Ok(())
            }
            Some(Handle::Reader(_)) | None => Ok(()),
        }
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.path.try_exists()?)
    }
}
