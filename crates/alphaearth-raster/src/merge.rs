//! Merging of adjacent or overlapping GeoTIFF tiles into one mosaic.
//!
//! Inputs are composited with the "first" rule: each output sample comes
//! from the first input, in the order given, that covers it with valid
//! (non-nodata) data. The output is written atomically and sources are only
//! deleted once that write has succeeded.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    DataType, GeoTransform, Raster, RasterData, RasterError, RasterProfile, Result,
};

/// File extension of raster tiles.
pub const TILE_EXTENSION: &str = "tif";

/// Outcome of a successful merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeSummary {
    /// Path of the written mosaic.
    pub output: PathBuf,
    /// Number of input files.
    pub inputs: usize,
    /// Mosaic width in pixels.
    pub width: usize,
    /// Mosaic height in pixels.
    pub height: usize,
    /// Band count.
    pub bands: usize,
    /// Pixel data type.
    pub dtype: DataType,
    /// Whether the inputs were removed afterwards.
    pub deleted_inputs: bool,
}

/// Whether `path` ends in `.tif`, in any letter case.
fn has_tile_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case(TILE_EXTENSION))
}

/// Check every merge candidate before any raster is opened.
pub fn validate_inputs<P: AsRef<Path>>(inputs: &[P]) -> Result<()> {
    if inputs.is_empty() {
        return Err(RasterError::NoFilesToMerge);
    }
    for path in inputs {
        let path = path.as_ref();
        let reason = if !path.exists() {
            Some("file does not exist")
        } else if !path.is_file() {
            Some("not a regular file")
        } else if !has_tile_extension(path) {
            Some("expected a .tif file")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(RasterError::InvalidInput {
                path: path.to_path_buf(),
                reason: reason.to_string(),
            });
        }
    }
    Ok(())
}

/// List the `.tif` files directly inside a directory, sorted by name.
pub fn discover_tiles<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(RasterError::MissingDirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_tile_extension(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Default output for a directory merge: `<parent>/<dir_name>.tif`.
pub fn default_output_path<P: AsRef<Path>>(dir: P) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let dir = match dir.file_name() {
        Some(_) => dir.to_path_buf(),
        // "." or ".." have no usable name until resolved
        None => dir.canonicalize()?,
    };
    let name = dir.file_name().ok_or_else(|| RasterError::InvalidInput {
        path: dir.clone(),
        reason: "directory has no name to derive an output file from".to_string(),
    })?;
    let mut file_name = name.to_os_string();
    file_name.push(".");
    file_name.push(TILE_EXTENSION);
    Ok(dir.with_file_name(file_name))
}

/// Merge tile files into one GeoTIFF at `output`.
///
/// All inputs are validated first; nothing is read or written if any fails.
/// With `delete_after`, inputs are removed only after the output is in place.
pub fn merge_files<P: AsRef<Path>, Q: AsRef<Path>>(
    inputs: &[P],
    output: Q,
    delete_after: bool,
) -> Result<MergeSummary> {
    let output = output.as_ref();
    validate_inputs(inputs)?;

    info!(inputs = inputs.len(), output = %output.display(), "Merging tiles");

    let merged = {
        let mut rasters = Vec::with_capacity(inputs.len());
        for path in inputs {
            rasters.push(Raster::open(path)?);
        }
        mosaic(&rasters)?
    };

    merged.write_atomic(output)?;

    let profile = merged.profile();
    debug!(
        width = profile.width,
        height = profile.height,
        bands = profile.bands,
        "Wrote mosaic"
    );

    if delete_after {
        let written = output.canonicalize()?;
        for path in inputs {
            let path = path.as_ref();
            // Never remove the mosaic itself if it was also listed as an input
            if path.canonicalize().is_ok_and(|p| p == written) {
                continue;
            }
            fs::remove_file(path)?;
        }
        info!(removed = inputs.len(), "Deleted merged inputs");
    }

    Ok(MergeSummary {
        output: output.to_path_buf(),
        inputs: inputs.len(),
        width: profile.width,
        height: profile.height,
        bands: profile.bands,
        dtype: profile.dtype,
        deleted_inputs: delete_after,
    })
}

/// Merge every tile in a directory.
///
/// Without an explicit `output` the mosaic is written next to the directory
/// as `<dir_name>.tif`. An output inside `dir` is rejected before anything is
/// read. With `delete_after`, the emptied directory is removed too.
pub fn merge_directory<P: AsRef<Path>>(
    dir: P,
    output: Option<&Path>,
    delete_after: bool,
) -> Result<MergeSummary> {
    let dir = dir.as_ref();
    let files = discover_tiles(dir)?;
    if files.is_empty() {
        return Err(RasterError::NoFilesToMerge);
    }
    let output = match output {
        Some(path) => path.to_path_buf(),
        None => default_output_path(dir)?,
    };
    if is_inside(&output, dir)? {
        return Err(RasterError::InvalidInput {
            path: output,
            reason: format!("output must not be inside the merged directory {}", dir.display()),
        });
    }

    let summary = merge_files(&files, &output, delete_after)?;

    if delete_after {
        fs::remove_dir(dir)?;
        info!(dir = %dir.display(), "Removed merged directory");
    }
    Ok(summary)
}

/// Whether `path` would be created somewhere under the existing directory `dir`.
fn is_inside(path: &Path, dir: &Path) -> Result<bool> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    // A missing parent cannot be inside an existing directory, the write reports it later
    let Ok(parent) = parent.canonicalize() else {
        return Ok(false);
    };
    Ok(parent.starts_with(dir.canonicalize()?))
}

/// Composite rasters into one covering their union footprint.
///
/// The output grid uses the first raster's pixel size and takes the rest of
/// its profile (CRS, nodata, band layout) from the first raster.
pub fn mosaic(rasters: &[Raster]) -> Result<Raster> {
    let first = rasters.first().ok_or(RasterError::NoFilesToMerge)?;
    let base = first.profile();

    let mut footprint = base.bounds();
    for (index, raster) in rasters.iter().enumerate().skip(1) {
        let profile = raster.profile();
        if profile.bands != base.bands || profile.dtype != base.dtype {
            return Err(RasterError::Incompatible(format!(
                "input {} has {} {} bands, first input has {} {} bands",
                index, profile.bands, profile.dtype, base.bands, base.dtype
            )));
        }
        if profile.crs != base.crs {
            warn!(
                index,
                crs = ?profile.crs,
                expected = ?base.crs,
                "Input CRS differs from the first input; merging without reprojection"
            );
        }
        footprint = footprint.union(&profile.bounds());
    }

    let pixel_width = base.transform.pixel_width;
    let pixel_height = base.transform.pixel_height;
    let width = ((footprint.width() / pixel_width).round() as usize).max(1);
    let height = ((footprint.height() / pixel_height).round() as usize).max(1);
    let transform = GeoTransform::new(footprint.min_x, footprint.max_y, pixel_width, pixel_height);

    let profile = RasterProfile {
        width,
        height,
        transform,
        ..base.clone()
    };

    let data = match first.data() {
        RasterData::U8(_) => RasterData::U8(composite::<u8>(rasters, &profile)),
        RasterData::F32(_) => RasterData::F32(composite::<f32>(rasters, &profile)),
        RasterData::F64(_) => RasterData::F64(composite::<f64>(rasters, &profile)),
    };
    Raster::new(profile, data)
}

/// Sample types the compositor can work on.
trait Sample: Copy {
    fn samples(data: &RasterData) -> Option<&[Self]>;
    fn from_f64(value: f64) -> Self;
    fn is_nodata(self, nodata: Option<f64>) -> bool;
}

impl Sample for u8 {
    fn samples(data: &RasterData) -> Option<&[Self]> {
        match data {
            RasterData::U8(v) => Some(v),
            _ => None,
        }
    }

    fn from_f64(value: f64) -> Self {
        value as u8
    }

    fn is_nodata(self, nodata: Option<f64>) -> bool {
        nodata.is_some_and(|n| f64::from(self) == n)
    }
}

impl Sample for f32 {
    fn samples(data: &RasterData) -> Option<&[Self]> {
        match data {
            RasterData::F32(v) => Some(v),
            _ => None,
        }
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn is_nodata(self, nodata: Option<f64>) -> bool {
        f64::from(self).is_nodata(nodata)
    }
}

impl Sample for f64 {
    fn samples(data: &RasterData) -> Option<&[Self]> {
        match data {
            RasterData::F64(v) => Some(v),
            _ => None,
        }
    }

    fn from_f64(value: f64) -> Self {
        value
    }

    fn is_nodata(self, nodata: Option<f64>) -> bool {
        match nodata {
            Some(n) if n.is_nan() => self.is_nan(),
            Some(n) => self == n,
            None => false,
        }
    }
}

/// Fill the output grid, first valid input wins, nearest-neighbour sampling.
fn composite<T: Sample>(rasters: &[Raster], out: &RasterProfile) -> Vec<T> {
    let bands = out.bands;
    let fill = T::from_f64(out.nodata.unwrap_or(0.0));
    let mut data = vec![fill; out.sample_count()];
    let mut filled = vec![false; out.sample_count()];
    let out_bounds = out.bounds();

    for raster in rasters {
        let src = raster.profile();
        let Some(samples) = T::samples(raster.data()) else {
            continue;
        };
        let src_bounds = src.bounds();

        // Output window covered by this source
        let t = &out.transform;
        let col_start = ((src_bounds.min_x - out_bounds.min_x) / t.pixel_width)
            .floor()
            .max(0.0) as usize;
        let col_end = (((src_bounds.max_x - out_bounds.min_x) / t.pixel_width).ceil() as usize)
            .min(out.width);
        let row_start = ((out_bounds.max_y - src_bounds.max_y) / t.pixel_height)
            .floor()
            .max(0.0) as usize;
        let row_end = (((out_bounds.max_y - src_bounds.min_y) / t.pixel_height).ceil() as usize)
            .min(out.height);

        for row in row_start..row_end {
            for col in col_start..col_end {
                let (x, y) = t.pixel_center(col, row);
                let (src_col, src_row) = src.transform.world_to_pixel(x, y);
                if src_col < 0.0 || src_row < 0.0 {
                    continue;
                }
                let (src_col, src_row) = (src_col.floor() as usize, src_row.floor() as usize);
                if src_col >= src.width || src_row >= src.height {
                    continue;
                }

                let dst = (row * out.width + col) * bands;
                let from = (src_row * src.width + src_col) * bands;
                for band in 0..bands {
                    if filled[dst + band] {
                        continue;
                    }
                    let value = samples[from + band];
                    if value.is_nodata(src.nodata) {
                        continue;
                    }
                    data[dst + band] = value;
                    filled[dst + band] = true;
                }
            }
        }
    }
    data
}
