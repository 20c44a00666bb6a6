//! Adaptive Gaussian smoothing.
//!
//! For each pixel the kernel width grows in steps of σ = 0.25·k until the
//! estimated photon counts enclosed by the kernel exceed the squared target
//! signal-to-noise; the smoothed value is the mask-weighted Gaussian mean of
//! the exposure-corrected image at that width. Kernels are synthesized once
//! per width and cached.

use ndarray::Array2;

/// Hard cap on the kernel index; pixels still short of the target here
/// come out NaN.
const MAX_KERNEL_INDEX: usize = 2000;

/// Cache of centred Gaussian kernels, one per width index.
struct Kernels {
    kernels: Vec<Option<Array2<f64>>>,
}

impl Kernels {
    fn new() -> Self {
        Self {
            kernels: Vec::new(),
        }
    }

    /// Kernel for index `idx` with the given σ; full width `2·ceil(3σ)+1`.
    fn get(&mut self, idx: usize, sigma: f64) -> &Array2<f64> {
        while idx >= self.kernels.len() {
            self.kernels.push(None);
        }

        if self.kernels[idx].is_none() {
            let half = (sigma * 3.0).ceil() as usize;
            let width = half * 2 + 1;
            let inv_sigma_2 = -0.5 / (sigma * sigma);

            let mut kernel = Array2::zeros((width, width));
            for y in 0..width {
                let dy2 = (y as i64 - half as i64).pow(2);
                for x in 0..width {
                    let dx2 = (x as i64 - half as i64).pow(2);
                    kernel[[y, x]] = ((dx2 + dy2) as f64 * inv_sigma_2).exp();
                }
            }
            self.kernels[idx] = Some(kernel);
        }

        self.kernels[idx].as_ref().unwrap()
    }
}

/// Mask-weighted means of the exposure-corrected image and exposure map
/// under a kernel centred at (x, y), with the kernel clipped to the image.
fn apply_kernel(
    x: usize,
    y: usize,
    kernel: &Array2<f64>,
    expcorr: &Array2<f64>,
    expmap: &Array2<f64>,
    mask: &Array2<f64>,
) -> (f64, f64) {
    let (height, width) = expcorr.dim();
    let kernel_size = kernel.ncols();
    let half = kernel_size / 2;

    // clip the kernel window to the image bounds up front
    let kx0 = if x > half { 0 } else { half - x };
    let kx1 = if x + half < width {
        kernel_size
    } else {
        half + width - x
    };
    let ky0 = if y > half { 0 } else { half - y };
    let ky1 = if y + half < height {
        kernel_size
    } else {
        half + height - y
    };

    let mut sum = 0.0;
    let mut sum_weight = 0.0;
    let mut sum_expmap = 0.0;

    for ky in ky0..ky1 {
        let cy = y + ky - half;
        for kx in kx0..kx1 {
            let cx = x + kx - half;
            let weight = kernel[[ky, kx]] * mask[[cy, cx]];
            sum += expcorr[[cy, cx]] * weight;
            sum_expmap += expmap[[cy, cx]] * weight;
            sum_weight += weight;
        }
    }

    (sum / sum_weight, sum_expmap / sum_weight)
}

/// Convert the integer mask to a 0/1 float mask, additionally masking NaN
/// input pixels, and zero the input under the mask so convolution windows
/// never read garbage.
fn make_float_mask(mask: &Array2<i32>, expcorr: &mut Array2<f64>) -> Array2<f64> {
    let mut float_mask = Array2::zeros(mask.dim());
    for ((y, x), &m) in mask.indexed_iter() {
        let active = m >= 1 && !expcorr[[y, x]].is_nan();
        float_mask[[y, x]] = f64::from(active as u8);
        if !active {
            expcorr[[y, x]] = 0.0;
        }
    }
    float_mask
}

/// Smooth an exposure-corrected image with adaptively sized Gaussians.
///
/// `expmap` converts surface brightness back to counts for the stopping
/// criterion: counts ≈ mean brightness × mean exposure × π(2σ)².
pub fn adaptive_gaussian_smooth(
    expcorr: &Array2<f64>,
    expmap: &Array2<f64>,
    mask: &Array2<i32>,
    target_sn: f64,
) -> Array2<f64> {
    let mut expcorr = expcorr.clone();
    let float_mask = make_float_mask(mask, &mut expcorr);

    let (height, width) = expcorr.dim();
    let target_sn_2 = target_sn * target_sn;
    let mut kernels = Kernels::new();
    let mut out = Array2::from_elem((height, width), f64::NAN);

    log::info!("adaptive Gaussian smoothing {width}x{height} image to S/N {target_sn}");

    for y in 0..height {
        for x in 0..width {
            if float_mask[[y, x]] <= 0.0 {
                continue;
            }

            for idx in 1..MAX_KERNEL_INDEX {
                let sigma = idx as f64 * 0.25;
                let kernel = kernels.get(idx, sigma);
                let (avg_expcorr, avg_expmap) =
                    apply_kernel(x, y, kernel, &expcorr, expmap, &float_mask);

                let counts =
                    avg_expcorr * avg_expmap * std::f64::consts::PI * (2.0 * sigma).powi(2);
                if counts >= target_sn_2 {
                    out[[y, x]] = avg_expcorr;
                    break;
                }
            }
        }
    }

    out
}
