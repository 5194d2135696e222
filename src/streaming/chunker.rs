//! Read strategies shared by the adapters.
//!
//! Each strategy turns a `BufRead` into envelopes and stamps `mode`,
//! `chunk_index`, and `bytes_read` (cumulative) metadata. A zero-length read
//! ends the sequence.

use std::io::{BufRead, ErrorKind, Read};

use bytes::Bytes;
use serde_json::Value;

use crate::contract::ReadMode;
use crate::envelope::{Completeness, Envelope, Metadata};
use crate::error::{Result, StreamError};

use super::stream::EnvelopeStream;

/// How line mode treats terminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineStyle {
    /// Keep `\n` on each line and yield blank lines (files).
    Verbatim,
    /// Strip `\r\n`/`\n` and skip blank lines (HTTP bodies).
    Trimmed,
}

/// Upper bound on the up-front buffer reservation for one block.
const MAX_PREALLOC: usize = 64 * 1024;

pub(crate) struct Chunker<R> {
    reader: R,
    mode: ReadMode,
    chunk_size: usize,
    lines: LineStyle,
    stage: &'static str,
    base: Metadata,
    index: u64,
    bytes_read: u64,
    carry: Vec<u8>,
    done: bool,
}

impl<R: BufRead> Chunker<R> {
    pub(crate) fn new(reader: R, mode: ReadMode, chunk_size: usize, stage: &'static str) -> Self {
        let mut base = Metadata::new();
        base.insert("mode".into(), Value::from(mode.as_str()));
        Self {
            reader,
            mode,
            chunk_size,
            lines: LineStyle::Verbatim,
            stage,
            base,
            index: 0,
            bytes_read: 0,
            carry: Vec::new(),
            done: false,
        }
    }

    pub(crate) fn line_style(mut self, style: LineStyle) -> Self {
        self.lines = style;
        self
    }

    /// Extra metadata copied onto every envelope.
    pub(crate) fn stamp(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.base.insert(key.to_string(), value.into());
        self
    }

    pub(crate) fn boxed<'a>(self) -> EnvelopeStream<'a>
    where
        R: 'a,
    {
        Box::new(self)
    }

    fn emit(&mut self, data: Vec<u8>, completeness: Completeness) -> Envelope {
        self.bytes_read += data.len() as u64;
        let mut envelope = Envelope::new(Bytes::from(data)).with_completeness(completeness);
        envelope.metadata = self.base.clone();
        envelope
            .metadata
            .insert("chunk_index".into(), Value::from(self.index));
        envelope
            .metadata
            .insert("bytes_read".into(), Value::from(self.bytes_read));
        self.index += 1;
        envelope
    }

    /// Fills up to `chunk_size` bytes, looping over short reads.
    fn read_block(&mut self) -> Result<Vec<u8>> {
        let mut block = Vec::with_capacity(self.chunk_size.min(MAX_PREALLOC));
        (&mut self.reader)
            .take(self.chunk_size as u64)
            .read_to_end(&mut block)?;
        Ok(block)
    }

    fn read_raw(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.reader.fill_buf() {
                Ok(available) => {
                    let data = available.to_vec();
                    self.reader.consume(data.len());
                    return Ok(data);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let mut line = Vec::new();
            if self.reader.read_until(b'\n', &mut line)? == 0 {
                return Ok(None);
            }
            if self.lines == LineStyle::Verbatim {
                return Ok(Some(line));
            }
            let keep = trim_eol(&line).len();
            self.bytes_read += (line.len() - keep) as u64;
            line.truncate(keep);
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
    }

    /// Splits on UTF-8 character boundaries, carrying incomplete tails forward.
    fn read_text(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let block = self.read_block()?;
            let at_end = block.is_empty();
            self.carry.extend_from_slice(&block);
            if self.carry.is_empty() {
                return Ok(None);
            }

            let valid = match std::str::from_utf8(&self.carry) {
                Ok(_) => self.carry.len(),
                Err(e) if e.error_len().is_none() && !at_end => e.valid_up_to(),
                Err(e) => {
                    return Err(StreamError::Decoding {
                        stage: self.stage,
                        reason: format!(
                            "invalid UTF-8 at byte {}",
                            self.bytes_read + e.valid_up_to() as u64
                        ),
                    });
                }
            };
            if valid == 0 {
                continue;
            }
            let rest = self.carry.split_off(valid);
            return Ok(Some(std::mem::replace(&mut self.carry, rest)));
        }
    }

    fn pull(&mut self) -> Result<Option<Envelope>> {
        let next = match self.mode {
            ReadMode::Bytes => Some(self.read_block()?)
                .filter(|b| !b.is_empty())
                .map(|b| (b, Completeness::Partial)),
            ReadMode::Raw => Some(self.read_raw()?)
                .filter(|b| !b.is_empty())
                .map(|b| (b, Completeness::Partial)),
            ReadMode::Lines => self.read_line()?.map(|l| (l, Completeness::Complete)),
            ReadMode::Text => self.read_text()?.map(|t| (t, Completeness::Partial)),
        };
        Ok(next.map(|(data, completeness)| self.emit(data, completeness)))
    }
}

impl<R: BufRead> Iterator for Chunker<R> {
    type Item = Result<Envelope>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.pull() {
            Ok(Some(envelope)) => Some(Ok(envelope)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
