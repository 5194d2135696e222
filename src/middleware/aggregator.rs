use bytes::{Bytes, BytesMut};

use crate::envelope::{Payload, Regime};
use crate::error::Result;

use super::{Middleware, MiddlewareKind, expect_bytes};

/// Reassembles JSON objects from arbitrary byte fragments.
///
/// Fragments are appended to a buffer that persists across calls. A unit
/// ends at the earliest `}\n` or `},` in the buffer. Array brackets,
/// separators, and surrounding whitespace are stripped, and the unit is
/// emitted only if its braces balance. Whatever follows the last terminator
/// stays buffered.
#[derive(Debug, Default)]
pub struct JsonRecordAggregator {
    buffer: BytesMut,
}

impl JsonRecordAggregator {
    /// Creates an aggregator with an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back waiting for a terminator.
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    fn next_split(&self) -> Option<usize> {
        self.buffer
            .windows(2)
            .position(|w| w == b"}\n" || w == b"},")
            .map(|at| at + 1)
    }
}

impl Middleware for JsonRecordAggregator {
    fn name(&self) -> &'static str {
        "JsonRecordAggregator"
    }

    fn input_regime(&self) -> Regime {
        Regime::Bytes
    }

    fn output_regime(&self) -> Regime {
        Regime::Bytes
    }

    fn kind(&self) -> MiddlewareKind {
        MiddlewareKind::Stateful
    }

    fn process(&mut self, payload: Payload) -> Result<Vec<Payload>> {
        let fragment = expect_bytes(self.name(), payload)?;
        self.buffer.extend_from_slice(&fragment);

        let mut units = Vec::new();
        while let Some(split_at) = self.next_split() {
            let unit = self.buffer.split_to(split_at).freeze();
            let cleaned = clean(&unit);
            if cleaned.first() == Some(&b'{')
                && cleaned.last() == Some(&b'}')
                && is_balanced(cleaned)
            {
                units.push(Payload::Bytes(unit.slice_ref(cleaned)));
            }
        }
        Ok(units)
    }
}

/// Strips whitespace, array brackets, and separators from both ends.
fn clean(unit: &Bytes) -> &[u8] {
    let mut s: &[u8] = unit;
    while let [first, rest @ ..] = s {
        if first.is_ascii_whitespace() || matches!(first, b'[' | b',') {
            s = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = s {
        if last.is_ascii_whitespace() || matches!(last, b']' | b',') {
            s = rest;
        } else {
            break;
        }
    }
    s
}

/// Brace balance ignoring braces inside string literals.
fn is_balanced(unit: &[u8]) -> bool {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;
    for &byte in unit {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0 && !in_string
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(agg: &mut JsonRecordAggregator, chunk: &'static [u8]) -> Vec<Vec<u8>> {
        agg.process(Payload::from(chunk))
            .unwrap()
            .into_iter()
            .map(|p| p.as_bytes().unwrap().to_vec())
            .collect()
    }

    #[test]
    fn reassembles_across_fragments() {
        let mut agg = JsonRecordAggregator::new();
        assert!(feed(&mut agg, b"[{\"a\": 1").is_empty());
        assert_eq!(feed(&mut agg, b"},\n{\"b\": 2}\n"), vec![
            b"{\"a\": 1}".to_vec(),
            b"{\"b\": 2}".to_vec(),
        ]);
        assert!(agg.buffered().iter().all(u8::is_ascii_whitespace));
    }

    #[test]
    fn terminator_split_between_chunks() {
        let mut agg = JsonRecordAggregator::new();
        assert!(feed(&mut agg, b"{\"a\": 1}").is_empty());
        assert_eq!(feed(&mut agg, b"\n"), vec![b"{\"a\": 1}".to_vec()]);
    }

    #[test]
    fn earliest_terminator_wins() {
        let mut agg = JsonRecordAggregator::new();
        let out = feed(&mut agg, b"{\"x\": 1},{\"y\": 2}\n");
        assert_eq!(out, vec![b"{\"x\": 1}".to_vec(), b"{\"y\": 2}".to_vec()]);
    }

    #[test]
    fn unbalanced_units_are_dropped() {
        let mut agg = JsonRecordAggregator::new();
        // The inner `},` ends the first unit early, leaving an unbalanced head.
        let out = feed(&mut agg, b"{\"outer\": {\"inner\": 1},\"k\": 2}\n");
        assert!(out.is_empty());
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        assert!(is_balanced(br#"{"text": "a } b"}"#));
        assert!(!is_balanced(br#"{"text": "a"#));
    }
}
