//! # alphaearth-raster
//!
//! Multi-band GeoTIFF I/O and tile merging for AlphaEarth embedding rasters.
//!
//! Exported embedding tiles are georeferenced GeoTIFFs with up to 64 bands of
//! `uint8` (quantized), `float32` or `float64` samples. This crate reads and
//! writes them without GDAL and stitches adjacent tiles into one mosaic.
//!
//! ## Examples
//!
//! ```no_run
//! use alphaearth_raster::{merge_directory, Raster};
//!
//! // Merge every tile in a download directory into outputs/Turkey/2024.tif
//! let summary = merge_directory("outputs/Turkey/2024", None, false)?;
//! println!("{}x{} pixels, {} bands", summary.width, summary.height, summary.bands);
//!
//! // Quantize a float tile to one byte per band
//! let tile = Raster::open("outputs/Turkey/2024.tif")?;
//! tile.quantized()?.write_atomic("outputs/Turkey/2024_uint8.tif")?;
//! # Ok::<(), alphaearth_raster::RasterError>(())
//! ```

mod chunks;
mod error;
mod merge;
mod profile;
mod raster;

pub use error::RasterError;
pub use merge::{
    default_output_path, discover_tiles, merge_directory, merge_files, mosaic, validate_inputs,
    MergeSummary, TILE_EXTENSION,
};
pub use profile::{Bounds, DataType, GeoTransform, RasterProfile};
pub use raster::{Raster, RasterData, QUANTIZED_NODATA};

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
