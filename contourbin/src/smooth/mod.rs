//! Adaptive smoothing passes.
//!
//! Three families, all driven by a target signal-to-noise:
//!
//! - **accumulate**: per-pixel independent disk growth (the flux estimator
//!   used ahead of binning)
//! - **incremental**: boustrophedon traversal carrying the previous pixel's
//!   disk by shifting it, with a reverse step to shrink over-satisfied disks
//! - **gaussian**: adaptive-width Gaussian kernels sized by enclosed counts
//! - **scale**: two-step variant that measures a smoothing scale from count
//!   data and applies it to other images

pub mod accumulate;
pub mod gaussian;
pub mod incremental;
pub mod scale;

pub use accumulate::{FluxEstimate, FluxEstimator};
pub use gaussian::adaptive_gaussian_smooth;
pub use incremental::{
    CountsSnAccumulator, FluxAccumulator, IncrementalSmoother, ShiftAccumulator, SmoothOutput,
};
pub use scale::{apply_scale, apply_scale_gaussian, construct_scale};
