//! Independent-variant accumulative smoother (flux estimator).
//!
//! For every active pixel, grow a disk of increasing integer radius centred
//! on it, accumulating counts (and background / noise-map terms), until the
//! signal-to-noise of the aggregation reaches the target or the disk covers
//! the whole image. The output pixel is the mean background-subtracted
//! signal over the contributing pixels.
//!
//! Each pixel restarts from radius zero, so rows are independent and the
//! pass runs row-parallel. The incremental variant in
//! [`super::incremental`] is the faster single-threaded alternative.

use ndarray::{Array2, Axis};
use rayon::prelude::*;

use crate::geometry::RadiusGeometry;
use crate::inputs::SmoothInputs;
use crate::noise::SnTerms;

/// Result of a flux estimation pass.
pub struct FluxEstimate {
    /// Smoothed surface brightness; NaN where masked.
    pub flux: Array2<f64>,
    /// Per-pixel noise estimate `sqrt(noise²)` of the final aggregation.
    pub errors: Array2<f64>,
}

/// Per-pixel independent adaptive smoother.
pub struct FluxEstimator<'a> {
    inputs: &'a SmoothInputs<'a>,
    geometry: &'a RadiusGeometry,
    target_sn_2: f64,
}

impl<'a> FluxEstimator<'a> {
    pub fn new(inputs: &'a SmoothInputs<'a>, geometry: &'a RadiusGeometry, target_sn: f64) -> Self {
        Self {
            inputs,
            geometry,
            target_sn_2: target_sn * target_sn,
        }
    }

    /// Run the smoothing pass over the whole image.
    pub fn estimate(&self) -> FluxEstimate {
        let height = self.inputs.height();
        let width = self.inputs.width();

        let mut flux = Array2::from_elem((height, width), f64::NAN);
        let mut errors = Array2::from_elem((height, width), f64::NAN);

        log::info!("smoothing {width}x{height} image to S/N {}", self.target_sn_2.sqrt());

        flux.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(errors.axis_iter_mut(Axis(0)).into_par_iter())
            .enumerate()
            .for_each(|(y, (mut flux_row, mut error_row))| {
                for x in 0..width {
                    if !self.inputs.is_active(x, y) {
                        continue;
                    }
                    let (value, error) = self.estimate_pixel(x, y);
                    flux_row[x] = value;
                    error_row[x] = error;
                }
            });

        FluxEstimate { flux, errors }
    }

    /// Grow the disk at one pixel until the target S/N is met.
    fn estimate_pixel(&self, x: usize, y: usize) -> (f64, f64) {
        let width = self.inputs.width() as i32;
        let height = self.inputs.height() as i32;
        let use_noisemap = self.inputs.has_noisemap();
        let use_background = self.inputs.has_background();

        let mut terms = SnTerms::default();
        let mut sn_2 = 0.0;
        let mut radius = 0;

        while radius < self.geometry.max_radius() && sn_2 < self.target_sn_2 {
            for &(dx, dy) in self.geometry.circle(radius) {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || ny < 0 || nx >= width || ny >= height {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                if !self.inputs.is_active(nx, ny) {
                    continue;
                }
                self.inputs.add_to(&mut terms, nx, ny);
            }

            sn_2 = terms.sn_2(use_noisemap, use_background);
            radius += 1;
        }

        let flux = terms.signal() / terms.count as f64;
        let error = terms.noise_2(use_noisemap, use_background).sqrt();
        (flux, error)
    }
}
