//! Error types for the raster crate.

use std::path::PathBuf;
use thiserror::Error;

use crate::DataType;

/// Errors that can occur when reading, writing or merging rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF encoding or decoding error.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Invalid GeoTIFF - missing or malformed georeferencing tags.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// Pixel data type not handled by this crate.
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    /// Raster dimensions or contents are unusable.
    #[error("Invalid raster: {0}")]
    InvalidRaster(String),

    /// Sample buffer does not match the profile.
    #[error("Raster data has {actual} samples, profile expects {expected}")]
    DataLength {
        /// Samples implied by width * height * bands.
        expected: usize,
        /// Samples actually supplied.
        actual: usize,
    },

    /// Operation needs a different pixel type.
    #[error("Expected {expected} raster, found {found}")]
    WrongDataType {
        /// Required type.
        expected: &'static str,
        /// Type of the raster passed in.
        found: DataType,
    },

    /// Input directory for a merge does not exist.
    #[error("Input directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    /// Nothing to merge.
    #[error("No files to merge")]
    NoFilesToMerge,

    /// A merge candidate failed validation.
    #[error("Invalid merge input {}: {reason}", .path.display())]
    InvalidInput {
        /// Offending path.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// Rasters cannot be combined.
    #[error("Incompatible rasters: {0}")]
    Incompatible(String),
}

impl RasterError {
    /// Whether this error was raised by input validation, before any raster I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RasterError::MissingDirectory(_)
                | RasterError::NoFilesToMerge
                | RasterError::InvalidInput { .. }
        )
    }
}
