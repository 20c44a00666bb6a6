//! Compensated (Kahan) summation.
//!
//! The incremental smoother adds and removes pixel contributions along the
//! whole scan path of an image, easily more than 10⁶ operations on the same
//! accumulator. A plain f64 running total drifts; the compensated form keeps
//! the error bounded independent of the accumulation length.

use std::ops::AddAssign;

/// Running sum with a compensation term.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KahanSum {
    sum: f64,
    comp: f64,
}

impl KahanSum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero both the sum and the compensation.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Add `val` (which may be negative) with compensation.
    pub fn add(&mut self, val: f64) {
        let y = val - self.comp;
        let t = self.sum + y;
        self.comp = (t - self.sum) - y;
        self.sum = t;
    }

    /// Current total.
    pub fn sum(&self) -> f64 {
        self.sum
    }
}

impl AddAssign<f64> for KahanSum {
    fn add_assign(&mut self, val: f64) {
        self.add(val);
    }
}
