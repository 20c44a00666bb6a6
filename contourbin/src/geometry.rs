//! Radius-bucketed pixel offsets for circular aggregation.
//!
//! Adaptive smoothing and the bin shape constraint both work with disks of
//! integer radius. This module precomputes, once per image size, the set of
//! integer offsets falling at each radius, the offsets newly included when a
//! disk translates one pixel to the right, and the cumulative pixel area of
//! each disk. The tables are built once and shared read-only across a whole
//! pass.

/// Integerised radius of an offset: `floor(sqrt(dx² + dy²))`.
///
/// Floor semantics, never rounding: the bucket boundaries of every table in
/// this module depend on this exact truncation.
#[inline]
pub fn int_radius(dx: i32, dy: i32) -> u32 {
    ((dx as f64 * dx as f64 + dy as f64 * dy as f64).sqrt()) as u32
}

/// Precomputed offset tables for one image size.
///
/// `circles[r]` holds every offset at integer radius `r`; `shifts[r]` holds
/// the offsets that move from radius `r` into a strictly larger radius when
/// the disk centre moves one pixel in +x. Shifts along other axes and
/// directions reuse the same table with dx↔dy swapped and/or dx negated.
#[derive(Debug, Clone)]
pub struct RadiusGeometry {
    circles: Vec<Vec<(i32, i32)>>,
    shifts: Vec<Vec<(i32, i32)>>,
    areas: Vec<usize>,
}

impl RadiusGeometry {
    /// Build the tables for a `width` × `height` image.
    ///
    /// Enumerates every offset reachable between two pixels of the image
    /// (`-(H-1) ≤ dy < H`, `-(W-1) ≤ dx < W`) and buckets it by integer
    /// radius. The bucket count is `floor(sqrt(W² + H²)) + 1`, so growth to
    /// the largest radius always stays in range.
    pub fn new(width: usize, height: usize) -> Self {
        let w = width as i32;
        let h = height as i32;
        let max_radius = int_radius(w, h) as usize + 1;

        let mut circles = vec![Vec::new(); max_radius];
        let mut shifts = vec![Vec::new(); max_radius];

        for dy in -(h - 1)..h {
            for dx in -(w - 1)..w {
                let r1 = int_radius(dx, dy) as usize;
                circles[r1].push((dx, dy));

                let r2 = int_radius(dx + 1, dy) as usize;
                if r1 < r2 {
                    shifts[r1].push((dx, dy));
                }
            }
        }

        let mut areas = Vec::with_capacity(max_radius);
        let mut total = 0;
        for circle in &circles {
            total += circle.len();
            areas.push(total);
        }

        Self {
            circles,
            shifts,
            areas,
        }
    }

    /// Number of radius buckets (`R_max`).
    pub fn max_radius(&self) -> usize {
        self.circles.len()
    }

    /// Offsets at integer radius `r`.
    pub fn circle(&self, r: usize) -> &[(i32, i32)] {
        &self.circles[r]
    }

    /// Offsets peeled from radius `r` by a one-pixel shift in +x.
    pub fn shift(&self, r: usize) -> &[(i32, i32)] {
        &self.shifts[r]
    }

    /// Radius of the smallest disk whose pixel area exceeds `area`.
    ///
    /// This is the equal-area disk lookup used by the bin fill constraint.
    /// It is an upper-bound search over the cumulative table rather than a
    /// closed form, so constraint decisions stay consistent with the exact
    /// discrete disk areas.
    pub fn radius_for_area(&self, area: usize) -> usize {
        self.areas.partition_point(|&a| a <= area)
    }
}
