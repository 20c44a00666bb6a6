//! Incremental accumulative smoother.
//!
//! Walks the image in boustrophedon order (row 0 left-to-right, row 1
//! right-to-left, …) so consecutive pixels are always 4-adjacent, and
//! carries the previous pixel's aggregation disk instead of rebuilding it:
//! a one-pixel move removes the offsets peeled off the trailing edge and
//! adds those folded in at the leading edge, both read from the precomputed
//! shift tables. After the shift the disk may under- or over-satisfy the
//! target, so the radius either grows ring by ring or walks back down in a
//! reverse step that stops just before S/N would drop below target.
//!
//! Cost is O(pixels × shift-band size) instead of O(pixels × disk area).
//! The traversal-and-shift coupling means this pass must stay
//! single-threaded; parallel callers want [`super::accumulate`].

use ndarray::Array2;

use crate::algo::KahanSum;
use crate::geometry::RadiusGeometry;
use crate::inputs::SmoothInputs;
use crate::noise::SnTerms;

/// Running state of one aggregation disk.
///
/// Implementations accumulate pixel contributions with a ±1 sign, report the
/// current squared S/N, and produce the output pixel value. `Clone` must be
/// cheap: the reverse step snapshots the state before each tentative ring
/// removal.
pub trait ShiftAccumulator: Clone {
    /// Zero all running sums.
    fn reset(&mut self);

    /// Fold the pixel at (x, y) in (`sign` = 1) or out (`sign` = -1).
    fn accumulate(&mut self, x: usize, y: usize, sign: i32);

    /// Squared signal-to-noise of the current aggregation.
    fn sn_2(&self) -> f64;

    /// Output value for the current aggregation (NaN when undefined).
    fn value(&self) -> f64;
}

/// Counts-as-S/N² accumulator over an exposure-corrected image.
///
/// The criterion of the standalone exposure-corrected smoothing tool: the
/// raw count total itself serves as S/N², and the output is the mean of the
/// exposure-corrected image over the disk. The float total is compensated.
#[derive(Debug, Clone)]
pub struct CountsSnAccumulator<'a> {
    counts: &'a Array2<f64>,
    expcorr: &'a Array2<f64>,
    total_counts: f64,
    total_expcorr: KahanSum,
    total_pix: i64,
}

impl<'a> CountsSnAccumulator<'a> {
    pub fn new(counts: &'a Array2<f64>, expcorr: &'a Array2<f64>) -> Self {
        Self {
            counts,
            expcorr,
            total_counts: 0.0,
            total_expcorr: KahanSum::new(),
            total_pix: 0,
        }
    }
}

impl ShiftAccumulator for CountsSnAccumulator<'_> {
    fn reset(&mut self) {
        self.total_counts = 0.0;
        self.total_expcorr.reset();
        self.total_pix = 0;
    }

    fn accumulate(&mut self, x: usize, y: usize, sign: i32) {
        let sign = sign as f64;
        self.total_counts += sign * self.counts[[y, x]];
        self.total_expcorr += sign * self.expcorr[[y, x]];
        self.total_pix += sign as i64;
    }

    fn sn_2(&self) -> f64 {
        self.total_counts
    }

    fn value(&self) -> f64 {
        if self.total_pix <= 0 {
            f64::NAN
        } else {
            self.total_expcorr.sum() / self.total_pix as f64
        }
    }
}

/// How the full-model accumulator turns its sums into an output pixel.
#[derive(Debug, Clone, Copy)]
pub enum SmoothOutput {
    /// Mean background-subtracted signal over the disk pixels.
    MeanCounts,
    /// Exposure-weighted surface brightness
    /// `(F − B·T_fg/T_bg) / Σ exposure`; `exposure_scale` is the scalar
    /// exposure-time ratio `T_fg/T_bg`.
    ExposureWeighted { exposure_scale: f64 },
}

/// Full noise-model accumulator over the shared input bundle.
///
/// Honors background subtraction, exposure ratios, and an explicit noise
/// map exactly as the independent smoother does, with every float total
/// kept in compensated form.
#[derive(Debug, Clone)]
pub struct FluxAccumulator<'a> {
    inputs: &'a SmoothInputs<'a>,
    output: SmoothOutput,
    fg_sum: KahanSum,
    bg_sum: KahanSum,
    bg_sum_weight: KahanSum,
    expratio_sum_2: KahanSum,
    noisemap_sum_2: KahanSum,
    exposure_sum: KahanSum,
    count: i64,
}

impl<'a> FluxAccumulator<'a> {
    pub fn new(inputs: &'a SmoothInputs<'a>, output: SmoothOutput) -> Self {
        Self {
            inputs,
            output,
            fg_sum: KahanSum::new(),
            bg_sum: KahanSum::new(),
            bg_sum_weight: KahanSum::new(),
            expratio_sum_2: KahanSum::new(),
            noisemap_sum_2: KahanSum::new(),
            exposure_sum: KahanSum::new(),
            count: 0,
        }
    }

    fn terms(&self) -> SnTerms {
        SnTerms {
            fg_sum: self.fg_sum.sum(),
            bg_sum: self.bg_sum.sum(),
            bg_sum_weight: self.bg_sum_weight.sum(),
            expratio_sum_2: self.expratio_sum_2.sum(),
            noisemap_sum_2: self.noisemap_sum_2.sum(),
            count: self.count.max(0) as usize,
        }
    }
}

impl ShiftAccumulator for FluxAccumulator<'_> {
    fn reset(&mut self) {
        self.fg_sum.reset();
        self.bg_sum.reset();
        self.bg_sum_weight.reset();
        self.expratio_sum_2.reset();
        self.noisemap_sum_2.reset();
        self.exposure_sum.reset();
        self.count = 0;
    }

    fn accumulate(&mut self, x: usize, y: usize, sign: i32) {
        let sign = sign as f64;
        self.fg_sum += sign * self.inputs.counts[[y, x]];
        self.count += sign as i64;

        if let Some(bg_image) = self.inputs.background {
            let ratio = self.inputs.expratio(x, y);
            let bg = bg_image[[y, x]];
            self.bg_sum += sign * bg;
            self.bg_sum_weight += sign * bg * ratio;
            self.expratio_sum_2 += sign * ratio * ratio;
        }

        if let Some(noisemap) = self.inputs.noisemap {
            let n = noisemap[[y, x]];
            self.noisemap_sum_2 += sign * n * n;
        }

        if let Some(expmap) = self.inputs.expmap {
            self.exposure_sum += sign * expmap[[y, x]];
        }
    }

    fn sn_2(&self) -> f64 {
        self.terms()
            .sn_2(self.inputs.has_noisemap(), self.inputs.has_background())
    }

    fn value(&self) -> f64 {
        match self.output {
            SmoothOutput::MeanCounts => {
                if self.count <= 0 {
                    f64::NAN
                } else {
                    self.terms().signal() / self.count as f64
                }
            }
            SmoothOutput::ExposureWeighted { exposure_scale } => {
                let exposure = self.exposure_sum.sum();
                if exposure == 0.0 {
                    f64::NAN
                } else {
                    (self.fg_sum.sum() - self.bg_sum.sum() * exposure_scale) / exposure
                }
            }
        }
    }
}

/// The incremental smoother itself, generic over the accumulation model.
pub struct IncrementalSmoother<'a, A: ShiftAccumulator> {
    mask: &'a Array2<i32>,
    geometry: &'a RadiusGeometry,
    target_sn_2: f64,
    acc: A,
    radius: usize,
    last: Option<(usize, usize)>,
}

impl<'a, A: ShiftAccumulator> IncrementalSmoother<'a, A> {
    pub fn new(
        mask: &'a Array2<i32>,
        geometry: &'a RadiusGeometry,
        target_sn: f64,
        acc: A,
    ) -> Self {
        Self {
            mask,
            geometry,
            target_sn_2: target_sn * target_sn,
            acc,
            radius: 0,
            last: None,
        }
    }

    #[inline]
    fn accumulate_checked(&mut self, nx: i32, ny: i32, sign: i32) {
        let (height, width) = self.mask.dim();
        if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
            return;
        }
        let (nx, ny) = (nx as usize, ny as usize);
        if self.mask[[ny, nx]] < 1 {
            return;
        }
        self.acc.accumulate(nx, ny, sign);
    }

    /// Add or remove the whole ring at `radius` centred on (x, y).
    fn apply_circle(&mut self, x: usize, y: usize, radius: usize, sign: i32) {
        let geometry = self.geometry;
        for &(dx, dy) in geometry.circle(radius) {
            self.accumulate_checked(x as i32 + dx, y as i32 + dy, sign);
        }
    }

    /// Apply the shift band at `radius` for a one-pixel move.
    ///
    /// `along_y` swaps the table's dx↔dy (move along y instead of x);
    /// `mirror` negates dx (move in the negative direction).
    fn apply_shift(
        &mut self,
        x: usize,
        y: usize,
        radius: usize,
        sign: i32,
        along_y: bool,
        mirror: bool,
    ) {
        let geometry = self.geometry;
        for &(dx, dy) in geometry.shift(radius) {
            let mut dx = if mirror { -dx } else { dx };
            let mut dy = dy;
            if along_y {
                std::mem::swap(&mut dx, &mut dy);
            }
            self.accumulate_checked(x as i32 + dx, y as i32 + dy, sign);
        }
    }

    fn reset_state(&mut self) {
        self.acc.reset();
        self.radius = 0;
    }

    /// Advance the disk to (x, y) and settle its radius; returns the output
    /// pixel value.
    fn smooth_pixel(&mut self, x: usize, y: usize) -> f64 {
        let adjacent = matches!(
            self.last,
            Some((lx, ly)) if (lx.abs_diff(x) == 1 && ly == y) || (lx == x && ly.abs_diff(y) == 1)
        );

        let reverse = if adjacent {
            let (lx, ly) = self.last.unwrap();
            let along_y = ly != y;
            let mirror = lx > x || ly > y;

            // peel the trailing edge off the old centre, fold in the
            // leading edge at the new one
            self.apply_shift(lx, ly, self.radius, -1, along_y, !mirror);
            self.apply_shift(x, y, self.radius, 1, along_y, mirror);

            self.acc.sn_2() >= self.target_sn_2
        } else {
            self.reset_state();
            self.apply_circle(x, y, 0, 1);
            false
        };

        if !reverse {
            while self.acc.sn_2() < self.target_sn_2
                && self.radius + 1 < self.geometry.max_radius()
            {
                self.radius += 1;
                self.apply_circle(x, y, self.radius, 1);
            }
        } else {
            // walk the radius back down; stop (restoring) at the removal
            // that would cross from ≥ target to < target
            loop {
                let saved = self.acc.clone();
                let old_sn_2 = self.acc.sn_2();
                self.apply_circle(x, y, self.radius, -1);
                let new_sn_2 = self.acc.sn_2();

                if old_sn_2 >= self.target_sn_2 && new_sn_2 < self.target_sn_2 {
                    self.acc = saved;
                    break;
                }
                if self.radius == 0 {
                    break;
                }
                self.radius -= 1;
            }
        }

        self.last = Some((x, y));
        self.acc.value()
    }

    /// Smooth the whole image, returning NaN at masked pixels.
    pub fn smooth_all(&mut self) -> Array2<f64> {
        let (height, width) = self.mask.dim();
        let mut out = Array2::from_elem((height, width), f64::NAN);

        let mut x: i64 = 0;
        let mut y: i64 = 0;
        let mut xdir: i64 = 1;

        while y < height as i64 {
            let (xu, yu) = (x as usize, y as usize);
            if self.mask[[yu, xu]] >= 1 {
                out[[yu, xu]] = self.smooth_pixel(xu, yu);
            }

            x += xdir;
            if x == -1 {
                xdir = 1;
                x += 1;
                y += 1;
            } else if x == width as i64 {
                xdir = -1;
                x -= 1;
                y += 1;
            }
        }

        out
    }
}
