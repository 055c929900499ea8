//! Error types for catalog queries and exports.

use thiserror::Error;

/// Errors raised by catalog queries and download orchestration.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A request parameter failed validation (raised before any remote call).
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Unknown output data type tag.
    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    /// The catalog holds no images for the requested dates and area.
    #[error("No images found for {start}..{end} in the requested area")]
    NoImages {
        /// First day of the range.
        start: chrono::NaiveDate,
        /// Day after the range.
        end: chrono::NaiveDate,
    },

    /// The remote service reported a failure.
    #[error("Remote service error: {0}")]
    Remote(String),

    /// Missing or inconsistent configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O error on the output directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error.
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error merging downloaded tiles.
    #[error("Raster error: {0}")]
    Raster(#[from] alphaearth_raster::RasterError),
}

impl CatalogError {
    /// Whether this is a pre-condition failure rather than a runtime one.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CatalogError::Validation(_) | CatalogError::InvalidDataType(_)
        )
    }
}

/// Failure exporting a single tile.
///
/// These are collected into the download report instead of aborting the batch.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The remote side rejected or failed the export.
    #[error("{0}")]
    Remote(String),

    /// Download of the prepared file failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Response status code.
        status: u16,
        /// Start of the response body.
        body: String,
    },

    /// Writing the tile file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
