//! FITS image reading and writing.
//!
//! The tools exchange every image through single-HDU FITS files. Images are
//! read from and written to the primary HDU; the scalar `EXPOSURE` header
//! key is picked up on load (defaulting to 1.0) because background
//! subtraction needs the exposure-time ratio. Data is flipped vertically in
//! both directions so the FITS bottom-left origin maps consistently onto
//! row-major arrays.

use std::path::Path;

use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use ndarray::Array2;
use thiserror::Error;

/// Errors from FITS file operations.
#[derive(Error, Debug)]
pub enum FitsError {
    #[error("FITS I/O error: {0}")]
    FitsIo(#[from] fitsio::errors::Error),

    #[error("{path}: expected a 2-dimensional image, found NAXIS={naxis}")]
    NotTwoDimensional { path: String, naxis: i64 },

    #[error("{path}: image data does not match {width}x{height} header dimensions")]
    ShapeMismatch {
        path: String,
        width: usize,
        height: usize,
    },
}

/// An image together with the exposure time read from its header.
#[derive(Debug, Clone)]
pub struct FitsImage<T> {
    pub data: Array2<T>,
    /// `EXPOSURE` header value; 1.0 when the key is absent.
    pub exposure: f64,
}

fn flip_rows<T: Copy>(data: Array2<T>) -> Array2<T> {
    let dims = data.dim();
    let flipped: Vec<T> = data.slice(ndarray::s![..;-1, ..]).iter().copied().collect();
    Array2::from_shape_vec(dims, flipped).expect("flipped image keeps its shape")
}

macro_rules! impl_fits_image_io {
    ($t:ty, $image_type:expr, $load_fn:ident, $write_fn:ident) => {
        /// Load the primary HDU of `path` together with its exposure time.
        pub fn $load_fn<P: AsRef<Path>>(path: P) -> Result<FitsImage<$t>, FitsError> {
            let path_text = path.as_ref().display().to_string();
            let mut fptr = FitsFile::open(&path)?;
            let hdu = fptr.hdu(0)?;

            let naxis = hdu.read_key::<i64>(&mut fptr, "NAXIS").unwrap_or(0);
            if naxis != 2 {
                return Err(FitsError::NotTwoDimensional {
                    path: path_text,
                    naxis,
                });
            }
            let width = hdu.read_key::<i64>(&mut fptr, "NAXIS1").unwrap_or(0) as usize;
            let height = hdu.read_key::<i64>(&mut fptr, "NAXIS2").unwrap_or(0) as usize;

            let raw: Vec<$t> = hdu.read_image(&mut fptr)?;
            let data =
                Array2::from_shape_vec((height, width), raw).map_err(|_| {
                    FitsError::ShapeMismatch {
                        path: path_text,
                        width,
                        height,
                    }
                })?;

            let exposure = hdu.read_key::<f64>(&mut fptr, "EXPOSURE").unwrap_or(1.0);

            Ok(FitsImage {
                data: flip_rows(data),
                exposure,
            })
        }

        /// Write `image` as the primary HDU of a new file at `path`.
        pub fn $write_fn<P: AsRef<Path>>(path: P, image: &Array2<$t>) -> Result<(), FitsError> {
            let (height, width) = image.dim();
            let description = ImageDescription {
                data_type: $image_type,
                dimensions: &[height, width],
            };

            let mut fptr = FitsFile::create(&path)
                .overwrite()
                .with_custom_primary(&description)
                .open()?;
            let hdu = fptr.hdu(0)?;

            let flat: Vec<$t> = image.slice(ndarray::s![..;-1, ..]).iter().copied().collect();
            hdu.write_image(&mut fptr, &flat)?;
            Ok(())
        }
    };
}

impl_fits_image_io!(f64, ImageType::Double, load_f64, write_f64);
impl_fits_image_io!(i64, ImageType::LongLong, load_i64, write_i64);
impl_fits_image_io!(i32, ImageType::Long, load_i32, write_i32);
