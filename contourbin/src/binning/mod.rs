//! Contour-following bin construction.
//!
//! Bins grow from seed pixels chosen in smoothed-flux order. Each growth
//! step adds the edge neighbour whose smoothed value lies closest to the
//! value at the bin's seed, so bins trace the contours of the smoothed map,
//! and stops once the bin's signal-to-noise reaches the target.
//!
//! All shared state (the input images, the smoothed map, the geometry
//! tables, and the settings) lives in one [`BinInputs`] context passed by
//! reference into every bin operation; the mutable bin-map image is passed
//! alongside it. Nothing here holds back-pointers.

pub mod binner;
pub mod scrub;

pub use binner::{Binner, BinnerOutputs, Histogram};

use ndarray::Array2;

use crate::geometry::RadiusGeometry;
use crate::inputs::{ConfigError, SmoothInputs};
use crate::noise::SnTerms;

/// 4-neighbourhood scan order. This order breaks ties in every
/// closest-value search, so it is part of the algorithm's contract.
pub const NEIGHBORS: [(i32, i32); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

/// Knobs of a binning run.
#[derive(Debug, Clone, Copy)]
pub struct BinSettings {
    /// Per-bin target signal-to-noise.
    pub target_sn: f64,
    /// Fill-constraint ratio; `Some` enables the shape constraint.
    pub constrain_val: Option<f64>,
    /// Drop bins holding at least this fraction of all binned pixels.
    pub scrub_large_fraction: Option<f64>,
    /// Seed from the brightest smoothed pixel downward (false: upward).
    pub bin_down: bool,
}

impl Default for BinSettings {
    fn default() -> Self {
        Self {
            target_sn: 15.0,
            constrain_val: None,
            scrub_large_fraction: None,
            bin_down: true,
        }
    }
}

/// Shared read-only context of one binning run.
pub struct BinInputs<'a> {
    pub data: SmoothInputs<'a>,
    pub smoothed: &'a Array2<f64>,
    pub geometry: &'a RadiusGeometry,
    pub settings: BinSettings,
}

impl<'a> BinInputs<'a> {
    pub fn new(
        data: SmoothInputs<'a>,
        smoothed: &'a Array2<f64>,
        geometry: &'a RadiusGeometry,
        settings: BinSettings,
    ) -> Result<Self, ConfigError> {
        data.validate()?;
        if smoothed.dim() != data.counts.dim() {
            return Err(ConfigError::DimensionMismatch {
                name: "smoothed",
                got_w: smoothed.ncols(),
                got_h: smoothed.nrows(),
                want_w: data.counts.ncols(),
                want_h: data.counts.nrows(),
            });
        }
        Ok(Self {
            data,
            smoothed,
            geometry,
            settings,
        })
    }

    pub fn width(&self) -> usize {
        self.data.width()
    }

    pub fn height(&self) -> usize {
        self.data.height()
    }

    /// Squared target signal-to-noise.
    pub fn threshold_sn_2(&self) -> f64 {
        self.settings.target_sn * self.settings.target_sn
    }
}

/// One growing (or dissolving) bin.
#[derive(Debug, Clone)]
pub struct Bin {
    id: i64,
    aim: f64,
    all_points: Vec<(usize, usize)>,
    edge_points: Vec<(usize, usize)>,
    terms: SnTerms,
    centroid_sum: (f64, f64),
    centroid_weight: f64,
}

impl Bin {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            aim: -1.0,
            all_points: Vec::new(),
            edge_points: Vec::new(),
            terms: SnTerms::default(),
            centroid_sum: (0.0, 0.0),
            centroid_weight: 0.0,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    /// Number of member pixels.
    pub fn count(&self) -> usize {
        self.terms.count
    }

    pub fn all_points(&self) -> &[(usize, usize)] {
        &self.all_points
    }

    pub fn edge_points(&self) -> &[(usize, usize)] {
        &self.edge_points
    }

    pub(crate) fn edge_points_mut(&mut self) -> &mut Vec<(usize, usize)> {
        &mut self.edge_points
    }

    /// Background-subtracted signal of the bin.
    pub fn signal(&self) -> f64 {
        self.terms.signal()
    }

    pub fn noise_2(&self, inputs: &BinInputs) -> f64 {
        self.terms
            .noise_2(inputs.data.has_noisemap(), inputs.data.has_background())
    }

    pub fn sn_2(&self, inputs: &BinInputs) -> f64 {
        self.terms
            .sn_2(inputs.data.has_noisemap(), inputs.data.has_background())
    }

    /// Add the pixel at (x, y) to the bin and paint it in the bin map.
    pub fn add_point(
        &mut self,
        inputs: &BinInputs,
        bins_image: &mut Array2<i64>,
        x: usize,
        y: usize,
    ) {
        self.all_points.push((x, y));
        inputs.data.add_to(&mut self.terms, x, y);
        bins_image[[y, x]] = self.id;

        // centroid weight is the pixel's own signal, floored so that
        // zero-count pixels still move the centroid a little
        let signal = inputs.data.pixel_signal(x, y).max(1e-7);
        self.centroid_sum.0 += x as f64 * signal;
        self.centroid_sum.1 += y as f64 * signal;
        self.centroid_weight += signal;

        if !self.edge_points.contains(&(x, y)) {
            self.edge_points.push((x, y));
        }
    }

    /// Remove the pixel at (x, y), repaint it unbinned, and restore any of
    /// its in-bin neighbours to the edge list.
    pub fn remove_point(
        &mut self,
        inputs: &BinInputs,
        bins_image: &mut Array2<i64>,
        x: usize,
        y: usize,
    ) {
        let position = self
            .all_points
            .iter()
            .position(|&p| p == (x, y))
            .expect("removed pixel must be a member of the bin");
        self.all_points.remove(position);
        if let Some(edge_position) = self.edge_points.iter().position(|&p| p == (x, y)) {
            self.edge_points.remove(edge_position);
        }

        inputs.data.remove_from(&mut self.terms, x, y);
        bins_image[[y, x]] = -1;

        let width = inputs.width() as i32;
        let height = inputs.height() as i32;
        for &(dx, dy) in &NEIGHBORS {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            if nx < 0 || ny < 0 || nx >= width || ny >= height {
                continue;
            }
            let (nx, ny) = (nx as usize, ny as usize);
            if bins_image[[ny, nx]] == self.id && !self.edge_points.contains(&(nx, ny)) {
                self.edge_points.push((nx, ny));
            }
        }
    }

    /// Clear the bin's state entirely (used when dropping oversized bins).
    /// The bin map is not repainted here; renumbering repaints survivors.
    pub fn clear(&mut self) {
        self.terms = SnTerms::default();
        self.centroid_sum = (0.0, 0.0);
        self.centroid_weight = 0.0;
        self.all_points.clear();
        self.edge_points.clear();
    }

    /// Paint every member pixel with the bin's id.
    pub fn paint(&self, bins_image: &mut Array2<i64>) {
        for &(x, y) in &self.all_points {
            bins_image[[y, x]] = self.id;
        }
    }

    /// Would adding (x, y) keep the bin within its fill constraint?
    ///
    /// The squared distance from the flux-weighted centroid to the
    /// candidate, normalised by the squared radius of the equal-area disk,
    /// must stay below the squared constraint ratio.
    pub fn check_constraint(&self, inputs: &BinInputs, x: usize, y: usize) -> bool {
        let Some(constrain_val) = inputs.settings.constrain_val else {
            return true;
        };

        let cx = self.centroid_sum.0 / self.centroid_weight;
        let cy = self.centroid_sum.1 / self.centroid_weight;
        let dx = cx - x as f64;
        let dy = cy - y as f64;
        let dist_2 = dx * dx + dy * dy;

        let circradius = (inputs.geometry.radius_for_area(self.count()) + 1) as f64;

        dist_2 / (circradius * circradius) < constrain_val * constrain_val
    }

    /// Grow the bin from a seed until the target S/N is reached or no
    /// neighbour remains.
    pub fn grow(
        &mut self,
        inputs: &BinInputs,
        bins_image: &mut Array2<i64>,
        seed_x: usize,
        seed_y: usize,
    ) {
        self.aim = inputs.smoothed[[seed_y, seed_x]];
        self.add_point(inputs, bins_image, seed_x, seed_y);

        let threshold_2 = inputs.threshold_sn_2();
        while self.sn_2(inputs) < threshold_2 {
            if !self.add_next_pixel(inputs, bins_image) {
                break;
            }
        }
    }

    /// Add the unbinned edge neighbour closest in smoothed value to the
    /// bin's aim. Flushes interior pixels out of the edge list on the way.
    fn add_next_pixel(&mut self, inputs: &BinInputs, bins_image: &mut Array2<i64>) -> bool {
        let width = inputs.width() as i32;
        let height = inputs.height() as i32;
        let constrain = inputs.settings.constrain_val.is_some();

        let mut best_delta = f64::INFINITY;
        let mut best: Option<(usize, usize)> = None;

        let mut edge_points = std::mem::take(&mut self.edge_points);
        let mut pt = 0;
        while pt < edge_points.len() {
            let (x, y) = edge_points[pt];
            let mut is_edge = false;

            for &(dx, dy) in &NEIGHBORS {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || ny < 0 || nx >= width || ny >= height {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);

                let neighbour_bin = bins_image[[ny, nx]];
                if neighbour_bin != self.id {
                    is_edge = true;
                }

                if neighbour_bin < 0 && inputs.data.is_active(nx, ny) {
                    if constrain && !self.check_constraint(inputs, nx, ny) {
                        continue;
                    }
                    let delta = (inputs.smoothed[[ny, nx]] - self.aim).abs();
                    if delta < best_delta {
                        best_delta = delta;
                        best = Some((nx, ny));
                    }
                }
            }

            if is_edge {
                pt += 1;
            } else {
                edge_points.remove(pt);
            }
        }
        self.edge_points = edge_points;

        match best {
            Some((x, y)) => {
                self.add_point(inputs, bins_image, x, y);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn simple_inputs<'a>(
        counts: &'a Array2<f64>,
        mask: &'a Array2<i32>,
        smoothed: &'a Array2<f64>,
        geometry: &'a RadiusGeometry,
        settings: BinSettings,
    ) -> BinInputs<'a> {
        BinInputs::new(SmoothInputs::new(counts, mask), smoothed, geometry, settings).unwrap()
    }

    #[test]
    fn test_add_point_updates_sums_and_map() {
        let counts = Array2::from_elem((3, 3), 2.0);
        let mask = Array2::<i32>::ones((3, 3));
        let smoothed = counts.clone();
        let geometry = RadiusGeometry::new(3, 3);
        let inputs = simple_inputs(&counts, &mask, &smoothed, &geometry, BinSettings::default());
        let mut bins_image = Array2::from_elem((3, 3), -1i64);

        let mut bin = Bin::new(0);
        bin.add_point(&inputs, &mut bins_image, 1, 1);
        assert_eq!(bin.count(), 1);
        assert_relative_eq!(bin.signal(), 2.0);
        assert_eq!(bins_image[[1, 1]], 0);
        assert_eq!(bin.edge_points(), &[(1, 1)]);
    }

    #[test]
    fn test_remove_point_restores_unbinned_state() {
        let counts = Array2::from_elem((3, 3), 2.0);
        let mask = Array2::<i32>::ones((3, 3));
        let smoothed = counts.clone();
        let geometry = RadiusGeometry::new(3, 3);
        let inputs = simple_inputs(&counts, &mask, &smoothed, &geometry, BinSettings::default());
        let mut bins_image = Array2::from_elem((3, 3), -1i64);

        let mut bin = Bin::new(0);
        bin.add_point(&inputs, &mut bins_image, 1, 1);
        bin.add_point(&inputs, &mut bins_image, 2, 1);
        bin.remove_point(&inputs, &mut bins_image, 2, 1);

        assert_eq!(bin.count(), 1);
        assert_eq!(bins_image[[1, 2]], -1);
        assert_relative_eq!(bin.signal(), 2.0);
        // the surviving member is back on the edge list
        assert!(bin.edge_points().contains(&(1, 1)));
    }

    #[test]
    fn test_grow_tracks_contour() {
        // a bright ridge down column 1; the bin seeded there should prefer
        // ridge pixels (value 10, delta 0) over flank pixels (value 1)
        let mut counts = Array2::from_elem((5, 3), 1.0);
        for y in 0..5 {
            counts[[y, 1]] = 10.0;
        }
        let mask = Array2::<i32>::ones((5, 3));
        let smoothed = counts.clone();
        let geometry = RadiusGeometry::new(3, 5);
        let settings = BinSettings {
            target_sn: 4.0, // needs F ≈ 29 counts: three ridge pixels
            ..Default::default()
        };
        let inputs = simple_inputs(&counts, &mask, &smoothed, &geometry, settings);
        let mut bins_image = Array2::from_elem((5, 3), -1i64);

        let mut bin = Bin::new(0);
        bin.grow(&inputs, &mut bins_image, 1, 2);

        assert!(bin.sn_2(&inputs) >= inputs.threshold_sn_2());
        for &(x, _) in bin.all_points() {
            assert_eq!(x, 1, "growth left the ridge: {:?}", bin.all_points());
        }
    }

    #[test]
    fn test_grow_stops_when_surrounded() {
        let counts = Array2::from_elem((2, 2), 1.0);
        let mut mask = Array2::<i32>::zeros((2, 2));
        mask[[0, 0]] = 1;
        let smoothed = counts.clone();
        let geometry = RadiusGeometry::new(2, 2);
        let settings = BinSettings {
            target_sn: 100.0,
            ..Default::default()
        };
        let inputs = simple_inputs(&counts, &mask, &smoothed, &geometry, settings);
        let mut bins_image = Array2::from_elem((2, 2), -1i64);

        let mut bin = Bin::new(0);
        bin.grow(&inputs, &mut bins_image, 0, 0);
        assert_eq!(bin.count(), 1);
        assert!(bin.sn_2(&inputs) < inputs.threshold_sn_2());
    }

    #[test]
    fn test_constraint_rejects_distant_pixel() {
        let counts = Array2::from_elem((1, 12), 1.0);
        let mask = Array2::<i32>::ones((1, 12));
        let smoothed = counts.clone();
        let geometry = RadiusGeometry::new(12, 1);
        let settings = BinSettings {
            constrain_val: Some(1.5),
            ..Default::default()
        };
        let inputs = simple_inputs(&counts, &mask, &smoothed, &geometry, settings);
        let mut bins_image = Array2::from_elem((1, 12), -1i64);

        let mut bin = Bin::new(0);
        for x in 0..4 {
            bin.add_point(&inputs, &mut bins_image, x, 0);
        }
        // centroid is at x = 1.5; a 4-pixel bin has equal-area radius 2, so
        // the normalised distance to x = 11 is far beyond 1.5
        assert!(!bin.check_constraint(&inputs, 11, 0));
        assert!(bin.check_constraint(&inputs, 4, 0));
    }

    #[test]
    fn test_tie_broken_by_neighbor_scan_order() {
        // seed in the middle of three equal pixels: both horizontal
        // neighbours tie on delta, and the (-1, 0) neighbour is scanned
        // before (1, 0)
        let counts = Array2::from_elem((1, 3), 1.0);
        let mask = Array2::<i32>::ones((1, 3));
        let smoothed = counts.clone();
        let geometry = RadiusGeometry::new(3, 1);
        let settings = BinSettings {
            target_sn: 0.9, // one pixel is not enough, two are
            ..Default::default()
        };
        let inputs = simple_inputs(&counts, &mask, &smoothed, &geometry, settings);
        let mut bins_image = Array2::from_elem((1, 3), -1i64);

        let mut bin = Bin::new(0);
        bin.aim = 1.0;
        bin.add_point(&inputs, &mut bins_image, 1, 0);
        assert!(bin.add_next_pixel(&inputs, &mut bins_image));
        assert_eq!(bins_image[[0, 0]], 0, "left neighbour wins the tie");
        assert_eq!(bins_image[[0, 2]], -1);
    }
}
