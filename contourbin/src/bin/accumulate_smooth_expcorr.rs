//! Incremental accumulative smoothing of an exposure-corrected image.
//!
//! Takes a counts image (driving the signal-to-noise criterion) and an
//! exposure-corrected image (averaged for output), and smooths with the
//! incremental boustrophedon smoother: each pixel reuses the previous
//! pixel's aggregation disk by shifting it, rather than rebuilding it.

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::Array2;

use contourbin::args::expanded_args;
use contourbin::io::fits;
use contourbin::smooth::{CountsSnAccumulator, IncrementalSmoother};
use contourbin::RadiusGeometry;

#[derive(Parser, Debug)]
#[command(
    name = "accumulate_smooth_expcorr",
    about = "Incremental accumulative smoothing using an exposure-corrected image",
    version
)]
struct Args {
    /// Input counts image (FITS)
    counts: String,

    /// Exposure-corrected image to average
    expcorr: String,

    /// Mask image (pixels >= 1 are active)
    #[arg(long)]
    mask: Option<String>,

    /// Output file
    #[arg(long, default_value = "acsmooth.fits")]
    out: String,

    /// Target signal-to-noise
    #[arg(long, default_value_t = 15.0)]
    sn: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse_from(expanded_args()?);

    let counts = fits::load_f64(&args.counts)
        .with_context(|| format!("loading {}", args.counts))?
        .data;
    let expcorr = fits::load_f64(&args.expcorr)
        .with_context(|| format!("loading {}", args.expcorr))?
        .data;
    anyhow::ensure!(
        counts.dim() == expcorr.dim(),
        "exposure-corrected image dimensions do not match the counts image"
    );

    let (height, width) = counts.dim();
    let mask: Array2<i32> = match &args.mask {
        Some(path) => {
            let loaded = fits::load_i32(path)
                .with_context(|| format!("loading {path}"))?
                .data;
            anyhow::ensure!(
                loaded.dim() == counts.dim(),
                "mask dimensions do not match the counts image"
            );
            loaded
        }
        None => Array2::ones((height, width)),
    };

    let geometry = RadiusGeometry::new(width, height);
    let accumulator = CountsSnAccumulator::new(&counts, &expcorr);
    let out = IncrementalSmoother::new(&mask, &geometry, args.sn, accumulator).smooth_all();

    fits::write_f64(&args.out, &out).with_context(|| format!("writing {}", args.out))?;
    Ok(())
}
