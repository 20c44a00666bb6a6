//! Poisson noise model and signal-to-noise evaluation over running sums.
//!
//! Smoothing and binning both aggregate pixels until a target signal-to-noise
//! is met, and both evaluate S/N the same way: from running sums of
//! foreground counts, optional background counts weighted by the exposure
//! ratio, and (when supplied) an explicit per-pixel noise map. The Poisson
//! error uses the Gehrels (1986, ApJ 303, 336, eqn 7) upper limit, which
//! stays well-behaved at low counts.

/// Squared error estimate on `counts` Poisson counts: `(1 + sqrt(c + 0.75))²`.
#[inline]
pub fn gehrels_err2(counts: f64) -> f64 {
    let err = 1.0 + (counts + 0.75).sqrt();
    err * err
}

/// Floor applied to the squared noise before dividing; aggregations with
/// essentially zero noise report `S/N² = 1e-7` instead of blowing up.
pub const MIN_NOISE_2: f64 = 1e-7;

/// Running sums over an aggregation of pixels.
///
/// One instance backs a growing bin or a smoothing disk. The interpretation
/// of the fields:
///
/// - `fg_sum`: foreground counts
/// - `bg_sum`: raw background counts
/// - `bg_sum_weight`: background counts × exposure ratio (fg/bg exposure map)
/// - `expratio_sum_2`: sum of squared exposure ratios
/// - `noisemap_sum_2`: sum of squared noise-map values
/// - `count`: number of contributing pixels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SnTerms {
    pub fg_sum: f64,
    pub bg_sum: f64,
    pub bg_sum_weight: f64,
    pub expratio_sum_2: f64,
    pub noisemap_sum_2: f64,
    pub count: usize,
}

impl SnTerms {
    /// Background-subtracted signal.
    pub fn signal(&self) -> f64 {
        self.fg_sum - self.bg_sum_weight
    }

    /// Squared noise of the aggregation.
    ///
    /// An explicit noise map overrides the Poisson formula entirely.
    /// Otherwise the Gehrels error on the foreground applies, plus the
    /// exposure-ratio-weighted Gehrels error on the background when one is
    /// being subtracted.
    pub fn noise_2(&self, use_noisemap: bool, use_background: bool) -> f64 {
        if use_noisemap {
            return self.noisemap_sum_2;
        }

        let mut noise_2 = gehrels_err2(self.fg_sum);
        if use_background && self.count > 0 {
            noise_2 += (self.expratio_sum_2 / self.count as f64) * gehrels_err2(self.bg_sum);
        }
        noise_2
    }

    /// Squared signal-to-noise, clamped to [`MIN_NOISE_2`] when the noise
    /// itself is below that floor.
    pub fn sn_2(&self, use_noisemap: bool, use_background: bool) -> f64 {
        let noise_2 = self.noise_2(use_noisemap, use_background);
        if noise_2 < MIN_NOISE_2 {
            MIN_NOISE_2
        } else {
            let signal = self.signal();
            signal * signal / noise_2
        }
    }
}
