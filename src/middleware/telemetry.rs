use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::envelope::{Metadata, Payload, Regime};
use crate::error::Result;

use super::Middleware;

/// Counts records and stamps each one with `pipeline_count_id` (1-based).
#[derive(Debug, Clone, Default)]
pub struct RowCounter {
    count: u64,
}

impl RowCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that reached the transform.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Middleware for RowCounter {
    fn name(&self) -> &'static str {
        "RowCounter"
    }

    fn input_regime(&self) -> Regime {
        Regime::Any
    }

    fn output_regime(&self) -> Regime {
        Regime::Any
    }

    fn metadata_hook(&mut self, metadata: &mut Metadata) -> Result<()> {
        metadata.insert("pipeline_count_id".into(), Value::from(self.count + 1));
        Ok(())
    }

    fn process(&mut self, payload: Payload) -> Result<Vec<Payload>> {
        self.count += 1;
        Ok(vec![payload])
    }
}

/// Measures the span between the first and the latest record, and stamps
/// `arrival_timestamp` on each.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTimer {
    first: Option<Instant>,
    last: Option<Instant>,
}

impl ExecutionTimer {
    /// Creates an idle timer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time from the first record to the latest one.
    #[must_use]
    pub fn duration(&self) -> Duration {
        match (self.first, self.last) {
            (Some(first), Some(last)) => last.duration_since(first),
            _ => Duration::ZERO,
        }
    }

    /// [`ExecutionTimer::duration`] as `HH:MM:SS.mmm`.
    #[must_use]
    pub fn readable_time(&self) -> String {
        let elapsed = self.duration();
        let secs = elapsed.as_secs();
        format!(
            "{:02}:{:02}:{:02}.{:03}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            elapsed.subsec_millis()
        )
    }
}

impl Middleware for ExecutionTimer {
    fn name(&self) -> &'static str {
        "ExecutionTimer"
    }

    fn input_regime(&self) -> Regime {
        Regime::Any
    }

    fn output_regime(&self) -> Regime {
        Regime::Any
    }

    fn metadata_hook(&mut self, metadata: &mut Metadata) -> Result<()> {
        metadata.insert(
            "arrival_timestamp".into(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        Ok(())
    }

    fn process(&mut self, payload: Payload) -> Result<Vec<Payload>> {
        let now = Instant::now();
        self.first.get_or_insert(now);
        self.last = Some(now);
        Ok(vec![payload])
    }
}

/// Logs a fixed set of header entries from the first record's metadata.
#[derive(Debug, Clone)]
pub struct HeaderInspector {
    watch: Vec<String>,
    logged: bool,
}

impl HeaderInspector {
    /// Watches `content-type`, `content-length`, `server`, and `last-modified`.
    #[must_use]
    pub fn new() -> Self {
        Self::watching(["content-type", "content-length", "server", "last-modified"])
    }

    /// Watches the given header names (matched case-insensitively).
    #[must_use]
    pub fn watching<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            watch: headers
                .into_iter()
                .map(|h| h.into().to_ascii_lowercase())
                .collect(),
            logged: false,
        }
    }
}

impl Default for HeaderInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for HeaderInspector {
    fn name(&self) -> &'static str {
        "HeaderInspector"
    }

    fn input_regime(&self) -> Regime {
        Regime::Any
    }

    fn output_regime(&self) -> Regime {
        Regime::Any
    }

    fn metadata_hook(&mut self, metadata: &mut Metadata) -> Result<()> {
        if self.logged {
            return Ok(());
        }
        self.logged = true;

        let mut found = false;
        for name in &self.watch {
            let value = metadata
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value);
            if let Some(value) = value {
                info!(header = %name, %value, "inbound resource header");
                found = true;
            }
        }
        if !found {
            warn!(watched = ?self.watch, "no watched headers in metadata");
        }
        Ok(())
    }

    fn process(&mut self, payload: Payload) -> Result<Vec<Payload>> {
        Ok(vec![payload])
    }
}
