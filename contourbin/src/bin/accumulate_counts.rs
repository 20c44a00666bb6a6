//! Smoothing-scale measurement and application tool.
//!
//! Without `--apply`, measures the per-pixel smoothing scale needed to
//! enclose the squared target signal-to-noise in counts and writes a scale
//! image. With `--apply`, averages the input over a previously measured
//! scale image, flat or Gaussian-weighted (`--gaussian`).

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::Array2;

use contourbin::args::expanded_args;
use contourbin::io::fits;
use contourbin::smooth::{apply_scale, apply_scale_gaussian, construct_scale};

#[derive(Parser, Debug)]
#[command(
    name = "accumulate_counts",
    about = "Measure smoothing scales from count data and apply them to other images",
    version
)]
struct Args {
    /// Input image (FITS)
    input: String,

    /// Apply a scale image instead of measuring one
    #[arg(long)]
    apply: bool,

    /// Apply scales in Gaussian mode
    #[arg(long)]
    gaussian: bool,

    /// Mask image (pixels >= 1 active; -2 processed but not contributing)
    #[arg(long)]
    mask: Option<String>,

    /// Scale image path (output when measuring, input when applying)
    #[arg(long, default_value = "acscale.fits")]
    scale: String,

    /// Output file for the applied smoothing
    #[arg(long, default_value = "applied.fits")]
    applied: String,

    /// Target signal-to-noise
    #[arg(long, default_value_t = 15.0)]
    sn: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse_from(expanded_args()?);

    let input = fits::load_f64(&args.input)
        .with_context(|| format!("loading {}", args.input))?
        .data;

    let mask: Array2<i32> = match &args.mask {
        Some(path) => {
            let loaded = fits::load_i32(path)
                .with_context(|| format!("loading {path}"))?
                .data;
            anyhow::ensure!(
                loaded.dim() == input.dim(),
                "mask dimensions do not match the input image"
            );
            loaded
        }
        None => Array2::ones(input.dim()),
    };

    if !args.apply {
        let scale = construct_scale(&input, &mask, args.sn);
        fits::write_i32(&args.scale, &scale)
            .with_context(|| format!("writing {}", args.scale))?;
    } else {
        let scale = fits::load_i32(&args.scale)
            .with_context(|| format!("loading {}", args.scale))?
            .data;
        anyhow::ensure!(
            scale.dim() == input.dim(),
            "scale image dimensions do not match the input image"
        );

        let out = if args.gaussian {
            apply_scale_gaussian(&input, &mask, &scale)
        } else {
            apply_scale(&input, &mask, &scale)
        };
        fits::write_f64(&args.applied, &out)
            .with_context(|| format!("writing {}", args.applied))?;
    }

    Ok(())
}
