//! Dense matrix and tensor helpers shared across the workspace
//!
//! - `traits`: normalization, clamping, and random sampling interfaces
//! - `ndarray_util`: implementations for `ndarray` arrays
//! - `utils`: ranking and summary helpers on plain slices

pub mod ndarray_util;
pub mod traits;
pub mod utils;
