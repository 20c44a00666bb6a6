//! Two-step smoothing: measure a per-pixel smoothing scale from count data,
//! then apply it to the same or another image.
//!
//! The scale pass grows a disk (bucketed by exact r² here, not integer
//! radius, since the scales stay small) until the enclosed counts reach the
//! squared target signal-to-noise, and records the final r² index. The
//! apply passes average any image over the stored scale, either flat or
//! Gaussian-weighted.
//!
//! Mask convention of this variant only: a *centre* pixel is processed when
//! its mask value is ≥ 1 or exactly −2; *contributing* pixels always need a
//! positive mask value.

use ndarray::Array2;

use crate::algo::QuickExp;

/// Largest radius considered when measuring scales.
const MAX_SCALE_RADIUS: i32 = 100;

/// Offsets bucketed by exact squared radius, up to [`MAX_SCALE_RADIUS`].
fn offsets_by_r2() -> Vec<Vec<(i32, i32)>> {
    let mut buckets: Vec<Vec<(i32, i32)>> = Vec::new();
    for dy in -MAX_SCALE_RADIUS..=MAX_SCALE_RADIUS {
        for dx in -MAX_SCALE_RADIUS..=MAX_SCALE_RADIUS {
            let r2 = (dx * dx + dy * dy) as usize;
            if r2 <= (MAX_SCALE_RADIUS * MAX_SCALE_RADIUS) as usize {
                while buckets.len() <= r2 {
                    buckets.push(Vec::new());
                }
                buckets[r2].push((dx, dy));
            }
        }
    }
    buckets
}

/// Is (x, y) a centre pixel under this variant's mask rule?
#[inline]
fn center_active(mask: &Array2<i32>, x: usize, y: usize) -> bool {
    let m = mask[[y, x]];
    m >= 1 || m == -2
}

/// Measure the smoothing scale (an r² index) at every centre pixel.
/// Pixels never processed hold −1.
pub fn construct_scale(counts: &Array2<f64>, mask: &Array2<i32>, target_sn: f64) -> Array2<i32> {
    let buckets = offsets_by_r2();
    let target_counts = target_sn * target_sn;
    let (height, width) = counts.dim();
    let mut scale = Array2::from_elem((height, width), -1);

    log::info!("measuring smoothing scales to S/N {target_sn}");

    for y in 0..height {
        for x in 0..width {
            if !center_active(mask, x, y) {
                continue;
            }

            let mut sum = 0.0;
            let mut r2 = 0usize;
            while r2 < buckets.len() {
                for &(dx, dy) in &buckets[r2] {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                        continue;
                    }
                    if mask[[ny as usize, nx as usize]] > 0 {
                        sum += counts[[ny as usize, nx as usize]];
                    }
                }
                if sum >= target_counts {
                    break;
                }
                r2 += 1;
            }

            scale[[y, x]] = r2 as i32;
        }
    }

    scale
}

/// Flat mean of `image` over each pixel's stored scale.
pub fn apply_scale(image: &Array2<f64>, mask: &Array2<i32>, scale: &Array2<i32>) -> Array2<f64> {
    let buckets = offsets_by_r2();
    let (height, width) = image.dim();
    let mut out = Array2::from_elem((height, width), f64::NAN);

    for y in 0..height {
        for x in 0..width {
            if !center_active(mask, x, y) {
                continue;
            }

            let mut sum = 0.0;
            let mut n_pix = 0usize;
            let top = scale[[y, x]];
            let mut r2 = 0;
            while r2 <= top && (r2 as usize) < buckets.len() {
                for &(dx, dy) in &buckets[r2 as usize] {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                        continue;
                    }
                    if mask[[ny as usize, nx as usize]] > 0 {
                        sum += image[[ny as usize, nx as usize]];
                        n_pix += 1;
                    }
                }
                r2 += 1;
            }

            out[[y, x]] = sum / n_pix as f64;
        }
    }

    out
}

/// Gaussian-weighted mean of `image` with σ = max(1, sqrt(scale)) at each
/// pixel, weights read from the quick-exp table.
pub fn apply_scale_gaussian(
    image: &Array2<f64>,
    mask: &Array2<i32>,
    scale: &Array2<i32>,
) -> Array2<f64> {
    let quick_exp = QuickExp::new();
    let (height, width) = image.dim();
    let mut out = Array2::from_elem((height, width), f64::NAN);

    for y in 0..height {
        for x in 0..width {
            if !center_active(mask, x, y) || scale[[y, x]] < 0 {
                continue;
            }

            let sigma = (scale[[y, x]] as f32).sqrt().max(1.0);
            let neg_half_inv_sigma_2 = -0.5 / (sigma * sigma);
            let range = (sigma * 4.0) as i32;

            let mut sum = 0.0f32;
            let mut sum_weights = 0.0f32;
            for dy in -range..=range {
                for dx in -range..=range {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                        continue;
                    }
                    if mask[[ny as usize, nx as usize]] <= 0 {
                        continue;
                    }
                    let rad_2 = (dx * dx + dy * dy) as f32;
                    let weight = quick_exp.eval(neg_half_inv_sigma_2 * rad_2);
                    sum_weights += weight;
                    sum += weight * image[[ny as usize, nx as usize]] as f32;
                }
            }

            out[[y, x]] = (sum / sum_weights) as f64;
        }
    }

    out
}
