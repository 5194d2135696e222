//! Typed per-adapter settings and their hydration from a settings map.
//!
//! Every adapter declares a contract struct plus a [`FieldSpec`] list. Hydration
//! keeps only the declared keys, checks each value against its [`FieldKind`],
//! deserializes the struct, and finally runs [`StreamContract::validate`].
//! Unknown keys are dropped silently so one global settings map can feed any
//! adapter.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StreamError};
use crate::settings::Settings;

/// Expected kind of a contract field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Integer (signed or unsigned).
    Int,
    /// Floating point; integers are widened.
    Float,
    /// Boolean.
    Bool,
    /// String.
    Str,
    /// Container (map or list); not kind-checked.
    Container,
    /// Wildcard; not kind-checked.
    Any,
}

impl FieldKind {
    /// Whether `value` is acceptable for this kind.
    #[must_use]
    pub fn admits(self, value: &Value) -> bool {
        match self {
            FieldKind::Int => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Str => value.is_string(),
            FieldKind::Container | FieldKind::Any => true,
        }
    }
}

/// Declared name and kind of one contract field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Settings key.
    pub name: &'static str,
    /// Expected kind.
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Shorthand constructor for field tables.
    #[must_use]
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Fields every contract carries.
pub const BASE_FIELDS: [FieldSpec; 2] = [
    FieldSpec::new("chunk_size", FieldKind::Int),
    FieldSpec::new("use_lines", FieldKind::Bool),
];

/// Immutable, validated settings record for one adapter.
pub trait StreamContract: Debug + Clone + Serialize + DeserializeOwned {
    /// Contract name used in error messages.
    const NAME: &'static str;

    /// Declared fields, base fields included.
    fn fields() -> &'static [FieldSpec];

    /// Bytes per block read.
    fn chunk_size(&self) -> usize;

    /// Whether the adapter should read line by line.
    fn use_lines(&self) -> bool;

    /// Cross-field checks run after deserialization.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Configuration`] when a value is out of range.
    fn validate(&self) -> Result<()> {
        if self.chunk_size() == 0 {
            return Err(StreamError::config(Self::NAME, "chunk_size must be > 0"));
        }
        Ok(())
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// Hydrates contract `C` from a raw settings map.
///
/// Null values are treated as absent so the contract default applies.
///
/// # Errors
///
/// Returns [`StreamError::Configuration`] on a kind mismatch, a deserialization
/// failure, or a failed [`StreamContract::validate`].
pub fn hydrate<C: StreamContract>(raw: &Settings) -> Result<C> {
    let mut accepted = Map::new();

    for spec in C::fields() {
        let Some(value) = raw.get(spec.name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if !spec.kind.admits(value) {
            return Err(StreamError::config(
                C::NAME,
                format!(
                    "'{}' expects {:?}, but got {} ({value})",
                    spec.name,
                    spec.kind,
                    describe(value)
                ),
            ));
        }
        accepted.insert(spec.name.to_string(), value.clone());
    }

    let contract: C = serde_json::from_value(Value::Object(accepted))
        .map_err(|e| StreamError::config(C::NAME, e.to_string()))?;
    contract.validate()?;
    Ok(contract)
}

/// How an adapter slices its resource into envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// Fixed-size byte blocks.
    #[default]
    Bytes,
    /// One envelope per line.
    Lines,
    /// UTF-8 text blocks split on character boundaries.
    Text,
    /// Whatever the underlying handle returns per read.
    Raw,
}

impl ReadMode {
    /// Effective mode once the legacy `use_lines` flag is applied.
    #[must_use]
    pub fn effective(self, use_lines: bool) -> Self {
        if use_lines { ReadMode::Lines } else { self }
    }

    /// Lowercase name stamped into envelope metadata.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReadMode::Bytes => "bytes",
            ReadMode::Lines => "lines",
            ReadMode::Text => "text",
            ReadMode::Raw => "raw",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    struct Probe {
        chunk_size: usize,
        use_lines: bool,
        timeout: f64,
        headers: std::collections::BTreeMap<String, String>,
        extra: Value,
    }

    impl Default for Probe {
        fn default() -> Self {
            Self {
                chunk_size: 1024,
                use_lines: false,
                timeout: 30.0,
                headers: Default::default(),
                extra: Value::Null,
            }
        }
    }

    impl StreamContract for Probe {
        const NAME: &'static str = "Probe";

        fn fields() -> &'static [FieldSpec] {
            const FIELDS: [FieldSpec; 5] = [
                BASE_FIELDS[0],
                BASE_FIELDS[1],
                FieldSpec::new("timeout", FieldKind::Float),
                FieldSpec::new("headers", FieldKind::Container),
                FieldSpec::new("extra", FieldKind::Any),
            ];
            &FIELDS
        }

        fn chunk_size(&self) -> usize {
            self.chunk_size
        }

        fn use_lines(&self) -> bool {
            self.use_lines
        }
    }

    #[test]
    fn unknown_keys_are_dropped() {
        let raw = settings! { "chunk_size" => 64, "env" => "dev", "enable_telemetry" => true };
        let probe: Probe = hydrate(&raw).unwrap();
        assert_eq!(probe.chunk_size, 64);
    }

    #[test]
    fn int_widens_to_float() {
        let raw = settings! { "timeout" => 5 };
        let probe: Probe = hydrate(&raw).unwrap();
        assert!((probe.timeout - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn float_is_not_narrowed_to_int() {
        let raw = settings! { "chunk_size" => 1.5 };
        let err = hydrate::<Probe>(&raw).unwrap_err();
        assert!(matches!(err, StreamError::Configuration { .. }));
        assert!(err.to_string().contains("chunk_size"));
    }

    #[test]
    fn container_and_wildcard_skip_kind_check() {
        let raw = settings! {
            "headers" => serde_json::json!({"X-Token": "abc"}),
            "extra" => serde_json::json!([1, "two", null]),
        };
        let probe: Probe = hydrate(&raw).unwrap();
        assert_eq!(probe.headers["X-Token"], "abc");
        assert!(probe.extra.is_array());
    }

    #[test]
    fn wrong_kind_fails_fast() {
        let raw = settings! { "use_lines" => "yes" };
        let err = hydrate::<Probe>(&raw).unwrap_err();
        assert!(err.to_string().contains("use_lines"));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let raw = settings! { "chunk_size" => 0 };
        assert!(hydrate::<Probe>(&raw).is_err());
    }

    #[test]
    fn null_defers_to_default() {
        let raw = settings! { "chunk_size" => Value::Null };
        let probe: Probe = hydrate(&raw).unwrap();
        assert_eq!(probe.chunk_size, 1024);
    }

    #[test]
    fn use_lines_forces_line_mode() {
        assert_eq!(ReadMode::Bytes.effective(true), ReadMode::Lines);
        assert_eq!(ReadMode::Text.effective(false), ReadMode::Text);
    }
}
