//! # alphaearth-catalog
//!
//! Request building, tiling and download orchestration for the AlphaEarth
//! annual satellite embedding collection.
//!
//! The remote catalog and export services sit behind the [`Catalog`] and
//! [`Exporter`] traits, so the orchestration here runs the same against a
//! live service or an in-process fake.
//!
//! ## Features
//!
//! - **Requests**: lon/lat rectangles, UTM boxes and named regions
//! - **Tiling**: square tiles sized to the export byte budget
//! - **Naming**: `[<prefix>_]<dtype>_[<min_lat>|<max_lat>|<min_lon>|<max_lon>].tif`
//! - **Merging**: optional mosaic of a complete download
//!
//! ## Example
//!
//! ```no_run
//! use alphaearth_catalog::{Catalog, DateRange, DownloadRequest, Downloader, Exporter};
//! use alphaearth_raster::DataType;
//!
//! fn run<C: Catalog, E: Exporter>(catalog: C, exporter: E) -> alphaearth_catalog::Result<()> {
//!     let request = DownloadRequest::latlon(
//!         DateRange::year(2024)?,
//!         36.7, 39.3, 31.2, 37.35,
//!         "outputs/ankara/2024",
//!     )?
//!     .with_dtype(DataType::Uint8);
//!
//!     let report = Downloader::new(catalog, exporter).download(&request)?;
//!     println!("{} tiles, {} failed", report.tiles.len(), report.failed().count());
//!     Ok(())
//! }
//! ```

mod config;
mod dataset;
mod downloader;
mod error;
mod geometry;
mod request;
mod service;
mod tiling;

pub use config::{DownloaderConfig, EarthEngineConfig, CREDENTIALS_ENV, PROJECT_ENV};
pub use dataset::{
    band_name, band_names, validate_bands, DatasetInfo, DATASET_ID, FIRST_YEAR, LAST_YEAR,
    NATIVE_SCALE_METERS, NUM_BANDS,
};
pub use downloader::{DownloadReport, Downloader, TileOutcome, TileStatus};
pub use error::{CatalogError, ExportError};
pub use geometry::{validate_extent, validate_lat_lon, Crs, Geometry, Hemisphere, EPSG_WGS84};
pub use request::{pixel_expression, CatalogQuery, DateRange, DownloadRequest, ImageRequest};
pub use service::{Catalog, Connect, DownloadUrlProvider, Exporter, UrlExporter};
pub use tiling::{tile_size_for, TileGrid, TileName, DEFAULT_MAX_TILE_BYTES, METERS_PER_DEGREE};

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
