//! Incremental simple moving average.

use std::collections::VecDeque;

/// Mean of the last `len` pushed values.
///
/// The sum is recomputed over the window on every read rather than kept as a
/// running total, so the result is bit-identical to
/// [`kbot_core::ledger::rolling_average`] over the same prices and never
/// drifts over a long session.
#[derive(Debug, Clone)]
pub struct SmaWindow {
    len: usize,
    values: VecDeque<f64>,
}

impl SmaWindow {
    pub fn new(len: usize) -> Self {
        Self { len, values: VecDeque::with_capacity(len + 1) }
    }

    pub fn push(&mut self, value: f64) {
        self.values.push_back(value);
        if self.values.len() > self.len {
            self.values.pop_front();
        }
    }

    /// Current average, or `None` until `len` values have been pushed.
    pub fn value(&self) -> Option<f64> {
        if self.len == 0 || self.values.len() < self.len {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.len as f64)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}
