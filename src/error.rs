//! Crate-wide error type.
//!
//! Most of the error kinds discussed in the specification (`OutOfImage`,
//! `DegenerateGeometry`, `NumericInfeasibility`, `NoImprovement`) are expected,
//! frequent outcomes of per-pixel/per-point computations and are represented
//! as `Option`/`bool` returns at the call site rather than as variants here,
//! following the policy that nothing in the core retries automatically and
//! that degraded results are surfaced as state, not exceptions. This enum
//! covers what is actually exceptional: I/O and configuration.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PNG decoding error: {0}")]
    Png(#[from] png::DecodingError),

    #[error("dataset parsing error: {0}")]
    Parse(String),
}
