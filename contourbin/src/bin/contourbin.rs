//! Contour binning tool.
//!
//! Smooths a counts image to a target per-pixel signal-to-noise (unless a
//! precomputed smoothed map is supplied), grows contour-following bins to a
//! target per-bin signal-to-noise, scrubs undersized bins, and writes the
//! binned, signal-to-noise, and bin-map images plus histogram side files.
//!
//! ```text
//! contourbin --sn 30 --smoothsn 15 --automask counts.fits
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::Array2;

use contourbin::args::expanded_args;
use contourbin::binning::{BinInputs, BinSettings, Binner};
use contourbin::io::fits;
use contourbin::smooth::FluxEstimator;
use contourbin::{auto_mask, RadiusGeometry, SmoothInputs};

#[derive(Parser, Debug)]
#[command(
    name = "contourbin",
    about = "Contour binning of X-ray count images (Sanders 2006)",
    version
)]
struct Args {
    /// Input counts image (FITS)
    input: String,

    /// Output binned image
    #[arg(long, default_value = "contourbin_out.fits")]
    out: String,

    /// Output signal-to-noise image
    #[arg(long, default_value = "contourbin_sn.fits")]
    outsn: String,

    /// Output bin-map image
    #[arg(long, default_value = "contourbin_binmap.fits")]
    outbinmap: String,

    /// Mask image (pixels >= 1 are active)
    #[arg(long)]
    mask: Option<String>,

    /// Background counts image
    #[arg(long)]
    bg: Option<String>,

    /// Foreground exposure map
    #[arg(long)]
    expmap: Option<String>,

    /// Background exposure map
    #[arg(long)]
    bgexpmap: Option<String>,

    /// Explicit per-pixel noise image (overrides the Poisson model)
    #[arg(long)]
    noisemap: Option<String>,

    /// Precomputed smoothed image (skips the smoothing step)
    #[arg(long)]
    smoothed: Option<String>,

    /// Target per-bin signal-to-noise
    #[arg(long, default_value_t = 15.0)]
    sn: f64,

    /// Target per-pixel smoothing signal-to-noise
    #[arg(long, default_value_t = 15.0)]
    smoothsn: f64,

    /// Mask out empty 8x8 blocks automatically
    #[arg(long)]
    automask: bool,

    /// Constrain the bin filling factor
    #[arg(long)]
    constrainfill: bool,

    /// Fill-constraint ratio
    #[arg(long, default_value_t = 3.0)]
    constrainval: f64,

    /// Skip the scrubbing phase
    #[arg(long)]
    noscrub: bool,

    /// Seed bins from the lowest smoothed values upward
    #[arg(long)]
    binup: bool,

    /// Drop bins covering at least this fraction of the binned area
    #[arg(long)]
    scrublarge: Option<f64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse_from(expanded_args()?);

    log::info!("loading image {}", args.input);
    let input = fits::load_f64(&args.input).with_context(|| format!("loading {}", args.input))?;
    let counts = input.data;
    let in_exposure = input.exposure;
    let (height, width) = counts.dim();

    // automask first; an explicit mask file replaces it entirely
    let mut mask: Array2<i32> = if args.automask {
        log::info!("automasking");
        auto_mask(&counts)
    } else {
        Array2::ones((height, width))
    };
    if let Some(path) = &args.mask {
        log::info!("loading mask image {path}");
        mask = fits::load_i32(path)
            .with_context(|| format!("loading {path}"))?
            .data;
    }

    let expmap: Array2<f64> = match &args.expmap {
        Some(path) => {
            log::info!("loading foreground exposure map {path}");
            let loaded = fits::load_f64(path)
                .with_context(|| format!("loading {path}"))?
                .data;
            // pixels with essentially no exposure are unusable
            for ((y, x), &e) in loaded.indexed_iter() {
                if e < 1.0 {
                    mask[[y, x]] = 0;
                }
            }
            loaded
        }
        None => {
            log::info!("using blank foreground exposure (exp={in_exposure})");
            Array2::from_elem((height, width), in_exposure)
        }
    };

    let background = match &args.bg {
        Some(path) => {
            log::info!("loading background image {path}");
            Some(fits::load_f64(path).with_context(|| format!("loading {path}"))?)
        }
        None => None,
    };
    let bg_exposure = background.as_ref().map_or(1.0, |b| b.exposure);

    let bg_expmap: Array2<f64> = match &args.bgexpmap {
        Some(path) => {
            log::info!("loading background exposure map {path}");
            fits::load_f64(path)
                .with_context(|| format!("loading {path}"))?
                .data
        }
        None => {
            log::info!("using blank background exposure (exp={bg_exposure})");
            Array2::from_elem((height, width), bg_exposure)
        }
    };

    // clamp exposures away from zero to keep the ratio finite
    let expmap = expmap.mapv(|e| e.max(1e-7));
    let bg_expmap = bg_expmap.mapv(|e| e.max(1e-7));

    let noisemap = match &args.noisemap {
        Some(path) => {
            log::info!("loading noise map {path}");
            Some(
                fits::load_f64(path)
                    .with_context(|| format!("loading {path}"))?
                    .data,
            )
        }
        None => None,
    };

    let mut inputs = SmoothInputs::new(&counts, &mask);
    if let Some(bg) = &background {
        inputs = inputs.with_background(&bg.data, &expmap, &bg_expmap);
    }
    if let Some(nm) = &noisemap {
        inputs = inputs.with_noisemap(nm);
    }
    inputs.validate()?;

    let geometry = RadiusGeometry::new(width, height);

    let smoothed = match &args.smoothed {
        Some(path) => {
            log::info!("loading smoothed image {path}");
            fits::load_f64(path)
                .with_context(|| format!("loading {path}"))?
                .data
        }
        None => {
            log::info!("smoothing data (S/N = {})", args.smoothsn);
            FluxEstimator::new(&inputs, &geometry, args.smoothsn)
                .estimate()
                .flux
        }
    };

    let settings = BinSettings {
        target_sn: args.sn,
        constrain_val: args.constrainfill.then_some(args.constrainval),
        scrub_large_fraction: args.scrublarge,
        bin_down: !args.binup,
    };
    let bin_inputs = BinInputs::new(inputs, &smoothed, &geometry, settings)?;

    let mut binner = Binner::new(bin_inputs);
    binner.run();
    if !args.noscrub {
        binner.scrub();
    }
    let outputs = binner.project_outputs();

    fits::write_f64(&args.out, &outputs.binned_image)
        .with_context(|| format!("writing {}", args.out))?;
    fits::write_f64(&args.outsn, &outputs.sn_image)
        .with_context(|| format!("writing {}", args.outsn))?;
    fits::write_i64(&args.outbinmap, &outputs.binmap)
        .with_context(|| format!("writing {}", args.outbinmap))?;
    fits::write_i32("contourbin_mask.fits", &mask).context("writing contourbin_mask.fits")?;

    outputs
        .sn_histogram
        .write("bin_sn_stats.txt")
        .context("writing bin_sn_stats.txt")?;
    outputs
        .signal_histogram
        .write("bin_signal_stats.txt")
        .context("writing bin_signal_stats.txt")?;

    Ok(())
}
