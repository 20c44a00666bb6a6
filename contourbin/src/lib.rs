//! Adaptive smoothing and contour binning for X-ray count images.
//!
//! The library turns a noisy photon-count image into a denoised
//! surface-brightness map, and partitions the image into irregular bins,
//! each holding enough signal to meet a target signal-to-noise, whose
//! shapes follow the contours of the smoothed map (Sanders 2006).
//!
//! Pipeline: counts (+ optional background, exposure maps, mask, noise map)
//! → adaptive smoother → smoothed map → contour binner → scrubber →
//! per-bin output images.

pub mod algo;
pub mod args;
pub mod automask;
pub mod binning;
pub mod geometry;
pub mod inputs;
pub mod io;
pub mod noise;
pub mod smooth;
pub mod terminal;

pub use automask::auto_mask;
pub use binning::{Bin, BinInputs, BinSettings, Binner, BinnerOutputs};
pub use geometry::RadiusGeometry;
pub use inputs::{ConfigError, SmoothInputs};
pub use noise::{gehrels_err2, SnTerms};
pub use smooth::{adaptive_gaussian_smooth, FluxEstimate, FluxEstimator, IncrementalSmoother};
