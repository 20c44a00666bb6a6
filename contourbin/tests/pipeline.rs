//! End-to-end scenarios: smoothing feeding the binner, scrubbing, and the
//! invariants the final bin map must satisfy.

use approx::assert_relative_eq;
use contourbin::binning::{BinInputs, BinSettings, Binner};
use contourbin::smooth::FluxEstimator;
use contourbin::{RadiusGeometry, SmoothInputs};
use ndarray::Array2;

/// Run the binner over prepared counts/smoothed images and return the
/// final bin map plus the number of surviving bins.
fn bin_image(
    counts: &Array2<f64>,
    mask: &Array2<i32>,
    smoothed: &Array2<f64>,
    settings: BinSettings,
    scrub: bool,
) -> (Array2<i64>, usize) {
    let geometry = RadiusGeometry::new(counts.ncols(), counts.nrows());
    let inputs = BinInputs::new(
        SmoothInputs::new(counts, mask),
        smoothed,
        &geometry,
        settings,
    )
    .unwrap();
    let mut binner = Binner::new(inputs);
    binner.run();
    if scrub {
        binner.scrub();
    }
    let n_bins = binner.bins().len();
    (binner.bins_image().clone(), n_bins)
}

/// Collect the member pixels of `bin` and verify 4-connectivity.
fn assert_4_connected(binmap: &Array2<i64>, bin: i64) {
    let (height, width) = binmap.dim();
    let members: Vec<(usize, usize)> = binmap
        .indexed_iter()
        .filter(|&(_, &v)| v == bin)
        .map(|((y, x), _)| (x, y))
        .collect();
    assert!(!members.is_empty(), "bin {bin} has no pixels");

    let mut seen = vec![members[0]];
    let mut stack = vec![members[0]];
    while let Some((x, y)) = stack.pop() {
        for (dx, dy) in [(0i64, -1i64), (-1, 0), (1, 0), (0, 1)] {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                continue;
            }
            let p = (nx as usize, ny as usize);
            if binmap[[p.1, p.0]] == bin && !seen.contains(&p) {
                seen.push(p);
                stack.push(p);
            }
        }
    }
    assert_eq!(seen.len(), members.len(), "bin {bin} is not 4-connected");
}

#[test]
fn uniform_image_smooths_to_its_own_value() {
    // unit counts, target S/N 2: each disk needs F = 4 and the mean is 1
    let counts = Array2::from_elem((4, 4), 1.0);
    let mask = Array2::<i32>::ones((4, 4));
    let inputs = SmoothInputs::new(&counts, &mask);
    let geometry = RadiusGeometry::new(4, 4);
    let smoothed = FluxEstimator::new(&inputs, &geometry, 2.0).estimate().flux;
    for &v in smoothed.iter() {
        assert_relative_eq!(v, 1.0, epsilon = 1e-12);
    }
}

#[test]
fn checkerboard_bins_tile_the_image() {
    // alternating 10/0 counts; the 10-pixels bin alone, the 0-pixels
    // cannot grow and are dissolved into their neighbours by the scrubber
    let mut counts = Array2::<f64>::zeros((4, 4));
    for y in 0..4 {
        for x in 0..4 {
            if (x + y) % 2 == 0 {
                counts[[y, x]] = 10.0;
            }
        }
    }
    let mask = Array2::<i32>::ones((4, 4));
    let smoothed = counts.clone();
    let (binmap, n_bins) = bin_image(
        &counts,
        &mask,
        &smoothed,
        BinSettings {
            target_sn: 1.5,
            ..Default::default()
        },
        true,
    );

    assert!(
        binmap.iter().all(|&v| v >= 0),
        "all active pixels must end up binned"
    );
    assert_eq!(n_bins, 8, "one surviving bin per 10-count pixel");
    for bin in 0..n_bins as i64 {
        assert_4_connected(&binmap, bin);
    }
}

#[test]
fn rebinning_the_binned_output_is_a_fixed_point() {
    // every bin of the first run meets the target; running the binner on
    // the painted per-bin means reproduces the same partition and the
    // scrubber has nothing to dissolve
    let counts = Array2::from_elem((3, 3), 100.0);
    let mask = Array2::<i32>::ones((3, 3));
    let settings = BinSettings {
        target_sn: 5.0,
        ..Default::default()
    };

    let geometry = RadiusGeometry::new(3, 3);
    let inputs = BinInputs::new(
        SmoothInputs::new(&counts, &mask),
        &counts,
        &geometry,
        settings,
    )
    .unwrap();
    let mut binner = Binner::new(inputs);
    binner.run();
    let bins_before_scrub = binner.bins().len();
    binner.scrub();
    assert_eq!(
        binner.bins().len(),
        bins_before_scrub,
        "scrubbing a fully-satisfied partition must drop nothing"
    );
    let first = binner.project_outputs();

    // second pass over the painted output
    let second_counts = first.binned_image.clone();
    let (second_binmap, second_bins) = bin_image(
        &second_counts,
        &mask,
        &second_counts.clone(),
        settings,
        true,
    );
    assert_eq!(second_bins, bins_before_scrub);
    assert_eq!(second_binmap, first.binmap);
}

#[test]
fn shape_constraint_limits_elongation() {
    // a one-pixel-wide bright ridge: unconstrained growth follows it end
    // to end, constrained growth must stay compact
    let (height, width) = (5usize, 12usize);
    let mut counts = Array2::<f64>::zeros((height, width));
    for x in 0..width {
        counts[[2, x]] = 10.0;
    }
    let mask = Array2::<i32>::ones((height, width));
    let smoothed = counts.clone();

    // target S/N 10 needs the full 120 ridge counts
    let unconstrained = BinSettings {
        target_sn: 10.0,
        ..Default::default()
    };
    let constrained = BinSettings {
        target_sn: 10.0,
        constrain_val: Some(1.5),
        ..Default::default()
    };

    let bbox_of_bin0 = |binmap: &Array2<i64>| {
        let mut min_x = usize::MAX;
        let mut max_x = 0usize;
        let mut min_y = usize::MAX;
        let mut max_y = 0usize;
        for ((y, x), &v) in binmap.indexed_iter() {
            if v == 0 {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
            }
        }
        (max_x - min_x + 1, max_y - min_y + 1)
    };

    let (free_map, _) = bin_image(&counts, &mask, &smoothed, unconstrained, false);
    let (tied_map, _) = bin_image(&counts, &mask, &smoothed, constrained, false);

    let (free_w, free_h) = bbox_of_bin0(&free_map);
    let (tied_w, tied_h) = bbox_of_bin0(&tied_map);

    assert_eq!((free_w, free_h), (12, 1), "unconstrained bin follows the ridge");
    let free_aspect = free_w as f64 / free_h as f64;
    let tied_aspect = tied_w.max(tied_h) as f64 / tied_w.min(tied_h) as f64;
    assert!(
        tied_aspect < free_aspect,
        "constrained bin must be less elongated ({tied_w}x{tied_h} vs {free_w}x{free_h})"
    );
}

#[test]
fn gradient_image_satisfies_binmap_invariants() {
    // smooth a deterministic blob-on-gradient image, bin it, and check the
    // public invariants of the result
    let (height, width) = (20usize, 20usize);
    let mut counts = Array2::<f64>::zeros((height, width));
    for y in 0..height {
        for x in 0..width {
            let dx = x as f64 - 10.0;
            let dy = y as f64 - 10.0;
            let blob = 40.0 * (-(dx * dx + dy * dy) / 18.0).exp();
            counts[[y, x]] = (blob + 0.05 * x as f64).round();
        }
    }
    let mask = Array2::<i32>::ones((height, width));
    let inputs = SmoothInputs::new(&counts, &mask);
    let geometry = RadiusGeometry::new(width, height);
    let smoothed = FluxEstimator::new(&inputs, &geometry, 4.0).estimate().flux;

    let (binmap, n_bins) = bin_image(
        &counts,
        &mask,
        &smoothed,
        BinSettings {
            target_sn: 6.0,
            ..Default::default()
        },
        true,
    );

    let k = n_bins as i64;
    assert!(k > 1, "a structured image should produce several bins");
    for &label in binmap.iter() {
        assert!((-1..k).contains(&label), "label {label} out of range");
    }
    let used: std::collections::HashSet<i64> =
        binmap.iter().copied().filter(|&v| v >= 0).collect();
    assert_eq!(used.len() as i64, k, "labels must be contiguous and all used");
    for bin in 0..k {
        assert_4_connected(&binmap, bin);
    }
}

#[test]
fn fully_masked_image_yields_no_bins_and_nan_smoothing() {
    let counts = Array2::from_elem((6, 6), 3.0);
    let mask = Array2::<i32>::zeros((6, 6));
    let inputs = SmoothInputs::new(&counts, &mask);
    let geometry = RadiusGeometry::new(6, 6);
    let smoothed = FluxEstimator::new(&inputs, &geometry, 3.0).estimate().flux;
    assert!(smoothed.iter().all(|v| v.is_nan()));

    let (binmap, n_bins) = bin_image(
        &counts,
        &mask,
        &smoothed,
        BinSettings::default(),
        true,
    );
    assert_eq!(n_bins, 0);
    assert!(binmap.iter().all(|&v| v == -1));
}

#[test]
fn binup_seeds_from_the_faintest_pixels() {
    // with bin-up, the first bin's seed is the minimum smoothed pixel
    let mut counts = Array2::from_elem((4, 4), 50.0);
    counts[[1, 2]] = 1.0;
    let mask = Array2::<i32>::ones((4, 4));
    let smoothed = counts.clone();
    let (binmap, _) = bin_image(
        &counts,
        &mask,
        &smoothed,
        BinSettings {
            target_sn: 5.0,
            bin_down: false,
            ..Default::default()
        },
        false,
    );
    assert_eq!(binmap[[1, 2]], 0, "faintest pixel must seed bin 0");
}
