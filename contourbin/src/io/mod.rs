//! Disk I/O for the toolkit: FITS images.

pub mod fits;

pub use fits::{
    load_f64, load_i32, load_i64, write_f64, write_i32, write_i64, FitsError, FitsImage,
};
