//! Adaptive Gaussian smoothing tool.
//!
//! Smooths an exposure-corrected image with Gaussian kernels whose widths
//! grow until the counts enclosed under the kernel reach the squared target
//! signal-to-noise.

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::Array2;

use contourbin::adaptive_gaussian_smooth;
use contourbin::args::expanded_args;
use contourbin::io::fits;

#[derive(Parser, Debug)]
#[command(
    name = "adaptive_gaussian_smooth",
    about = "Adaptive Gaussian smoothing of exposure-corrected images",
    version
)]
struct Args {
    /// Exposure-corrected image (FITS)
    expcorr: String,

    /// Exposure map
    expmap: String,

    /// Mask image (pixels >= 1 are active)
    #[arg(long)]
    mask: Option<String>,

    /// Output file
    #[arg(long, default_value = "ags.fits")]
    out: String,

    /// Target signal-to-noise
    #[arg(long, default_value_t = 15.0)]
    sn: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse_from(expanded_args()?);

    let expcorr = fits::load_f64(&args.expcorr)
        .with_context(|| format!("loading {}", args.expcorr))?
        .data;
    let expmap = fits::load_f64(&args.expmap)
        .with_context(|| format!("loading {}", args.expmap))?
        .data;
    anyhow::ensure!(
        expcorr.dim() == expmap.dim(),
        "exposure map dimensions do not match the exposure-corrected image"
    );

    let mask: Array2<i32> = match &args.mask {
        Some(path) => {
            let loaded = fits::load_i32(path)
                .with_context(|| format!("loading {path}"))?
                .data;
            anyhow::ensure!(
                loaded.dim() == expcorr.dim(),
                "mask dimensions do not match the exposure-corrected image"
            );
            loaded
        }
        None => Array2::ones(expcorr.dim()),
    };

    let out = adaptive_gaussian_smooth(&expcorr, &expmap, &mask, args.sn);
    fits::write_f64(&args.out, &out).with_context(|| format!("writing {}", args.out))?;
    Ok(())
}
