//! Shared read-only input bundle for smoothing and binning.
//!
//! Every pass over the data sees the same collection of images: the raw
//! counts, a mask, and optionally a background count field with its pair of
//! exposure maps and an explicit noise map. Bundling the references in one
//! struct keeps dimension validation in one place and lets bins and
//! smoothers accumulate pixels through a single code path.

use ndarray::Array2;
use thiserror::Error;

use crate::noise::SnTerms;

/// Configuration errors: inputs that cannot be combined.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Two images that must share dimensions do not.
    #[error("{name} image is {got_w}x{got_h} but the input image is {want_w}x{want_h}")]
    DimensionMismatch {
        name: &'static str,
        got_w: usize,
        got_h: usize,
        want_w: usize,
        want_h: usize,
    },

    /// A background image was supplied without both exposure maps.
    #[error("background image requires both foreground and background exposure maps")]
    MissingExposureMaps,
}

/// Read-only references to the input images of one pass.
///
/// Mask semantics: a pixel is active iff its mask value is ≥ 1.
#[derive(Debug, Clone, Copy)]
pub struct SmoothInputs<'a> {
    pub counts: &'a Array2<f64>,
    pub mask: &'a Array2<i32>,
    pub background: Option<&'a Array2<f64>>,
    pub expmap: Option<&'a Array2<f64>>,
    pub bg_expmap: Option<&'a Array2<f64>>,
    pub noisemap: Option<&'a Array2<f64>>,
}

impl<'a> SmoothInputs<'a> {
    pub fn new(counts: &'a Array2<f64>, mask: &'a Array2<i32>) -> Self {
        Self {
            counts,
            mask,
            background: None,
            expmap: None,
            bg_expmap: None,
            noisemap: None,
        }
    }

    pub fn with_background(
        mut self,
        background: &'a Array2<f64>,
        expmap: &'a Array2<f64>,
        bg_expmap: &'a Array2<f64>,
    ) -> Self {
        self.background = Some(background);
        self.expmap = Some(expmap);
        self.bg_expmap = Some(bg_expmap);
        self
    }

    pub fn with_noisemap(mut self, noisemap: &'a Array2<f64>) -> Self {
        self.noisemap = Some(noisemap);
        self
    }

    /// Check that every supplied image matches the counts image dimensions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (want_h, want_w) = self.counts.dim();
        let check = |name: &'static str, dim: (usize, usize)| -> Result<(), ConfigError> {
            if dim != (want_h, want_w) {
                Err(ConfigError::DimensionMismatch {
                    name,
                    got_w: dim.1,
                    got_h: dim.0,
                    want_w,
                    want_h,
                })
            } else {
                Ok(())
            }
        };

        check("mask", self.mask.dim())?;
        if let Some(bg) = self.background {
            check("background", bg.dim())?;
            if self.expmap.is_none() || self.bg_expmap.is_none() {
                return Err(ConfigError::MissingExposureMaps);
            }
        }
        if let Some(im) = self.expmap {
            check("exposure map", im.dim())?;
        }
        if let Some(im) = self.bg_expmap {
            check("background exposure map", im.dim())?;
        }
        if let Some(im) = self.noisemap {
            check("noise map", im.dim())?;
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.counts.ncols()
    }

    pub fn height(&self) -> usize {
        self.counts.nrows()
    }

    pub fn has_background(&self) -> bool {
        self.background.is_some()
    }

    pub fn has_noisemap(&self) -> bool {
        self.noisemap.is_some()
    }

    /// Is the pixel active under the mask?
    #[inline]
    pub fn is_active(&self, x: usize, y: usize) -> bool {
        self.mask[[y, x]] >= 1
    }

    /// Foreground/background exposure ratio at a pixel (1 when no maps).
    #[inline]
    pub fn expratio(&self, x: usize, y: usize) -> f64 {
        match (self.expmap, self.bg_expmap) {
            (Some(fg), Some(bg)) => fg[[y, x]] / bg[[y, x]],
            _ => 1.0,
        }
    }

    /// Fold the pixel at (x, y) into a set of running sums.
    pub fn add_to(&self, terms: &mut SnTerms, x: usize, y: usize) {
        terms.fg_sum += self.counts[[y, x]];
        terms.count += 1;

        if let Some(bg_image) = self.background {
            let ratio = self.expratio(x, y);
            let bg = bg_image[[y, x]];
            terms.bg_sum += bg;
            terms.bg_sum_weight += bg * ratio;
            terms.expratio_sum_2 += ratio * ratio;
        }

        if let Some(noisemap) = self.noisemap {
            let n = noisemap[[y, x]];
            terms.noisemap_sum_2 += n * n;
        }
    }

    /// Reverse of [`add_to`]: remove the pixel's contribution.
    pub fn remove_from(&self, terms: &mut SnTerms, x: usize, y: usize) {
        terms.fg_sum -= self.counts[[y, x]];
        terms.count -= 1;

        if let Some(bg_image) = self.background {
            let ratio = self.expratio(x, y);
            let bg = bg_image[[y, x]];
            terms.bg_sum -= bg;
            terms.bg_sum_weight -= bg * ratio;
            terms.expratio_sum_2 -= ratio * ratio;
        }

        if let Some(noisemap) = self.noisemap {
            let n = noisemap[[y, x]];
            terms.noisemap_sum_2 -= n * n;
        }
    }

    /// Signal contribution of a single pixel: counts minus scaled background.
    /// This is the weight driving bin centroids.
    #[inline]
    pub fn pixel_signal(&self, x: usize, y: usize) -> f64 {
        let mut signal = self.counts[[y, x]];
        if let Some(bg_image) = self.background {
            signal -= bg_image[[y, x]] * self.expratio(x, y);
        }
        signal
    }
}
