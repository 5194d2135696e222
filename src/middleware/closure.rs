use std::fmt;

use crate::envelope::{Payload, Regime};
use crate::error::Result;

use super::Middleware;

/// Middleware backed by a closure.
///
/// ```
/// use streamflow_core::middleware::{FnMiddleware, Middleware};
/// use streamflow_core::{Envelope, Payload, Regime};
///
/// // Drop empty chunks.
/// let mut non_empty = FnMiddleware::new("NonEmpty", Regime::Bytes, Regime::Bytes, |p: Payload| {
///     let keep = p.as_bytes().is_some_and(|b| !b.is_empty());
///     Ok(if keep { vec![p] } else { Vec::new() })
/// });
/// assert!(non_empty.apply(Envelope::new(Vec::<u8>::new())).unwrap().is_empty());
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    input: Regime,
    output: Regime,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: FnMut(Payload) -> Result<Vec<Payload>>,
{
    /// Wraps `func` with declared regimes.
    pub fn new(name: &'static str, input: Regime, output: Regime, func: F) -> Self {
        Self {
            name,
            input,
            output,
            func,
        }
    }
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware")
            .field("name", &self.name)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: FnMut(Payload) -> Result<Vec<Payload>>,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn input_regime(&self) -> Regime {
        self.input
    }

    fn output_regime(&self) -> Regime {
        self.output
    }

    fn process(&mut self, payload: Payload) -> Result<Vec<Payload>> {
        (self.func)(payload)
    }
}
