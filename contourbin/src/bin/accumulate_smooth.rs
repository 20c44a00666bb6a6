//! Accumulative smoothing tool (independent variant).
//!
//! Grows a circular aggregation around every pixel until the target
//! signal-to-noise is met and writes the mean background-subtracted signal
//! as the smoothed image.

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::Array2;

use contourbin::args::expanded_args;
use contourbin::io::fits;
use contourbin::smooth::FluxEstimator;
use contourbin::{RadiusGeometry, SmoothInputs};

#[derive(Parser, Debug)]
#[command(
    name = "accumulate_smooth",
    about = "Adaptive accumulative smoothing of count images",
    version
)]
struct Args {
    /// Input counts image (FITS)
    input: String,

    /// Background counts image
    #[arg(long)]
    bg: Option<String>,

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

    let input = fits::load_f64(&args.input).with_context(|| format!("loading {}", args.input))?;
    let counts = input.data;
    let (height, width) = counts.dim();

    let mask: Array2<i32> = match &args.mask {
        Some(path) => {
            fits::load_i32(path)
                .with_context(|| format!("loading {path}"))?
                .data
        }
        None => Array2::ones((height, width)),
    };

    let background = match &args.bg {
        Some(path) => Some(fits::load_f64(path).with_context(|| format!("loading {path}"))?),
        None => None,
    };

    // scalar exposure times become flat exposure maps for the ratio
    let fg_exp = Array2::from_elem((height, width), input.exposure);
    let bg_exp = Array2::from_elem(
        (height, width),
        background.as_ref().map_or(1.0, |b| b.exposure),
    );

    let mut inputs = SmoothInputs::new(&counts, &mask);
    if let Some(bg) = &background {
        inputs = inputs.with_background(&bg.data, &fg_exp, &bg_exp);
    }
    inputs.validate()?;

    let geometry = RadiusGeometry::new(width, height);
    let result = FluxEstimator::new(&inputs, &geometry, args.sn).estimate();

    fits::write_f64(&args.out, &result.flux).with_context(|| format!("writing {}", args.out))?;
    Ok(())
}
