//! Scrubbing: dissolve undersized bins, drop oversized ones, renumber.
//!
//! After construction, bins seeded late in the flux order often end up
//! below the target signal-to-noise (the good pixels around them were
//! already taken). The scrubber repeatedly picks the worst such bin and
//! reassigns its pixels one at a time to whichever neighbouring bin matches
//! best in smoothed value, preferring moves that respect the receiving
//! bin's shape constraint and falling back to unconstrained moves when
//! nothing passes. A bin whose remaining pixels have no neighbouring bin at
//! all cannot be dissolved and is left in place.

use ndarray::Array2;

use crate::binning::{Bin, BinInputs, NEIGHBORS};

/// Best pixel to peel off a dissolving bin: the edge pixel and the
/// neighbouring bin whose smoothed values are closest.
fn find_best_neighbour(
    inputs: &BinInputs,
    bins: &mut [Bin],
    bins_image: &Array2<i64>,
    donor: usize,
    allow_unconstrained: bool,
) -> Option<(usize, usize, usize)> {
    let width = inputs.width() as i32;
    let height = inputs.height() as i32;
    let donor_id = bins[donor].id();
    let constrain = inputs.settings.constrain_val.is_some();

    let mut best_delta = f64::INFINITY;
    let mut best: Option<(usize, usize, usize)> = None;

    // take the edge list out so the receiving bins can be inspected while
    // we prune it
    let mut edge_points = std::mem::take(bins[donor].edge_points_mut());

    let mut pt = 0;
    while pt < edge_points.len() {
        let (x, y) = edge_points[pt];
        let value = inputs.smoothed[[y, x]];
        let mut any_neighbours = false;

        for &(dx, dy) in &NEIGHBORS {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            if nx < 0 || ny < 0 || nx >= width || ny >= height {
                continue;
            }
            let (nx, ny) = (nx as usize, ny as usize);

            let neighbour_bin = bins_image[[ny, nx]];
            if neighbour_bin == -1 || neighbour_bin == donor_id {
                continue;
            }
            any_neighbours = true;

            let neighbour_index = neighbour_bin as usize;
            if constrain
                && !allow_unconstrained
                && !bins[neighbour_index].check_constraint(inputs, x, y)
            {
                continue;
            }

            let delta = (value - inputs.smoothed[[ny, nx]]).abs();
            if delta < best_delta {
                best_delta = delta;
                best = Some((x, y, neighbour_index));
            }
        }

        // edge pixels with no foreign neighbours can never be reassigned
        if any_neighbours {
            pt += 1;
        } else {
            edge_points.remove(pt);
        }
    }

    *bins[donor].edge_points_mut() = edge_points;
    best
}

/// Reassign every pixel of `bins[donor]` to neighbouring bins. Returns
/// false when some pixels could not be moved (no neighbouring bin).
fn dissolve_bin(
    inputs: &BinInputs,
    bins: &mut Vec<Bin>,
    bins_image: &mut Array2<i64>,
    donor: usize,
) -> bool {
    while bins[donor].count() != 0 {
        let mut best = find_best_neighbour(inputs, bins, bins_image, donor, false);

        if best.is_none() && inputs.settings.constrain_val.is_some() {
            best = find_best_neighbour(inputs, bins, bins_image, donor, true);
        }

        let Some((x, y, receiver)) = best else {
            log::warn!(
                "could not dissolve bin {} into surroundings",
                bins[donor].id()
            );
            return false;
        };

        debug_assert_ne!(donor, receiver);
        let (donor_bin, receiver_bin) = if donor < receiver {
            let (left, right) = bins.split_at_mut(receiver);
            (&mut left[donor], &mut right[0])
        } else {
            let (left, right) = bins.split_at_mut(donor);
            (&mut right[0], &mut left[receiver])
        };

        donor_bin.remove_point(inputs, bins_image, x, y);
        receiver_bin.add_point(inputs, bins_image, x, y);
    }
    true
}

/// Dissolve every bin below the target S/N, worst first.
///
/// The pool is fixed when scrubbing starts; bins that climb past the
/// target while receiving pixels simply drop out of it.
pub fn scrub(inputs: &BinInputs, bins: &mut Vec<Bin>, bins_image: &mut Array2<i64>) {
    let threshold_2 = inputs.threshold_sn_2();

    // bin ids equal their indices until renumbering runs
    debug_assert!(bins.iter().enumerate().all(|(i, b)| b.id() == i as i64));

    let mut pool: Vec<usize> = (0..bins.len())
        .filter(|&i| bins[i].sn_2(inputs) < threshold_2)
        .collect();

    log::info!("scrubbing {} undersized bins", pool.len());

    loop {
        pool.retain(|&i| bins[i].sn_2(inputs) < threshold_2);

        let Some(position) = (0..pool.len()).min_by(|&a, &b| {
            bins[pool[a]]
                .sn_2(inputs)
                .total_cmp(&bins[pool[b]].sn_2(inputs))
        }) else {
            break;
        };

        let donor = pool[position];
        dissolve_bin(inputs, bins, bins_image, donor);
        pool.remove(position);
    }
}

/// Drop every bin holding at least `fraction` of all binned pixels.
///
/// Cleared bins keep their painted pixels until [`renumber`] repaints the
/// map, at which point those pixels become −1.
pub fn scrub_large(bins: &mut [Bin], fraction: f64) {
    let total: usize = bins.iter().map(Bin::count).sum();
    if total == 0 {
        return;
    }

    log::info!("scrubbing bins with area fraction >= {fraction}");
    for bin in bins.iter_mut() {
        let this_fraction = bin.count() as f64 / total as f64;
        if this_fraction >= fraction {
            log::info!("scrubbing bin {} ({:.3} of area)", bin.id(), this_fraction);
            bin.clear();
        }
    }
}

/// Discard empty bins, assign contiguous ids `0..k`, and repaint the map.
pub fn renumber(bins: &mut Vec<Bin>, bins_image: &mut Array2<i64>) {
    bins.retain(|bin| bin.count() > 0);

    bins_image.fill(-1);
    for (number, bin) in bins.iter_mut().enumerate() {
        bin.set_id(number as i64);
        bin.paint(bins_image);
    }

    log::info!("{} bins after renumbering", bins.len());
}
