//! Block-level automatic masking.
//!
//! Detector images often carry large empty borders. The auto-mask tiles the
//! image in 8×8 blocks and masks out every block whose summed counts are
//! essentially zero; everything else stays active.

use ndarray::Array2;

const BLOCK_SIZE: usize = 8;

/// Build a 0/1 mask from the counts image: 0 over empty 8×8 blocks.
pub fn auto_mask(counts: &Array2<f64>) -> Array2<i32> {
    let (height, width) = counts.dim();
    let mut mask = Array2::ones((height, width));

    let blocks_x = width / BLOCK_SIZE + 1;
    let blocks_y = height / BLOCK_SIZE + 1;

    for block_y in 0..blocks_y {
        for block_x in 0..blocks_x {
            let x0 = block_x * BLOCK_SIZE;
            let y0 = block_y * BLOCK_SIZE;

            let mut sum = 0.0;
            for dy in 0..BLOCK_SIZE {
                for dx in 0..BLOCK_SIZE {
                    let (x, y) = (x0 + dx, y0 + dy);
                    if x >= width || y >= height {
                        continue;
                    }
                    sum += counts[[y, x]];
                }
            }

            if sum.abs() < 1e-5 {
                for dy in 0..BLOCK_SIZE {
                    for dx in 0..BLOCK_SIZE {
                        let (x, y) = (x0 + dx, y0 + dy);
                        if x >= width || y >= height {
                            continue;
                        }
                        mask[[y, x]] = 0;
                    }
                }
            }
        }
    }

    mask
}
