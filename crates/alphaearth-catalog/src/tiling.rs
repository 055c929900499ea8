//! Splitting a request extent into export tiles, and naming the tile files.
//!
//! The export service caps the size of a single request, so large areas are
//! exported as a grid of square tiles that are merged afterwards.

use std::fmt;

use alphaearth_raster::{Bounds, DataType, TILE_EXTENSION};

use crate::geometry::{validate_extent, Crs};
use crate::{CatalogError, Result};

/// Default per-request byte budget of the export service.
pub const DEFAULT_MAX_TILE_BYTES: u64 = 48 * 1024 * 1024;

/// Approximate metres per degree at the equator.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Side of the largest square tile fitting the byte budget, in CRS units.
pub fn tile_size_for(
    scale: f64,
    bands: usize,
    dtype: DataType,
    crs: Crs,
    max_tile_bytes: u64,
) -> Result<f64> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(CatalogError::Validation(format!(
            "scale must be positive, got {}",
            scale
        )));
    }
    if bands == 0 {
        return Err(CatalogError::Validation(
            "at least one band is required".to_string(),
        ));
    }
    let bytes_per_pixel = (bands * dtype.size_bytes()) as f64;
    let side_pixels = (max_tile_bytes as f64 / bytes_per_pixel).sqrt().floor();
    if side_pixels < 1.0 {
        return Err(CatalogError::Validation(format!(
            "tile budget of {} bytes cannot hold one {}-band {} pixel",
            max_tile_bytes, bands, dtype
        )));
    }

    let side_meters = side_pixels * scale;
    Ok(if crs.is_geographic() {
        side_meters / METERS_PER_DEGREE
    } else {
        side_meters
    })
}

/// Regular grid of square tiles over an extent.
#[derive(Debug, Clone, PartialEq)]
pub struct TileGrid {
    extent: Bounds,
    tile_size: f64,
    cols: usize,
    rows: usize,
}

impl TileGrid {
    /// Grid covering `extent` with tiles of `tile_size` CRS units.
    pub fn new(extent: Bounds, tile_size: f64) -> Result<Self> {
        validate_extent(&extent)?;
        if !(tile_size.is_finite() && tile_size > 0.0) {
            return Err(CatalogError::Validation(format!(
                "tile size must be positive, got {}",
                tile_size
            )));
        }
        let cols = (extent.width() / tile_size).ceil().max(1.0) as usize;
        let rows = (extent.height() / tile_size).ceil().max(1.0) as usize;
        Ok(Self {
            extent,
            tile_size,
            cols,
            rows,
        })
    }

    /// Tiles covering `extent`, row-major from south-west.
    pub fn split(extent: Bounds, tile_size: f64) -> Result<Vec<Bounds>> {
        Ok(Self::new(extent, tile_size)?.tiles().collect())
    }

    /// Number of tile columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of tile rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Total tile count.
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    /// Whether the grid has no tiles. Never true for a validated grid.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tile at grid position; edge tiles are clipped to the extent.
    pub fn tile(&self, col: usize, row: usize) -> Option<Bounds> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        let min_x = self.extent.min_x + col as f64 * self.tile_size;
        let min_y = self.extent.min_y + row as f64 * self.tile_size;
        let max_x = if col + 1 == self.cols {
            self.extent.max_x
        } else {
            min_x + self.tile_size
        };
        let max_y = if row + 1 == self.rows {
            self.extent.max_y
        } else {
            min_y + self.tile_size
        };
        Some(Bounds::new(min_x, min_y, max_x, max_y))
    }

    /// Iterate tiles south to north, west to east within a row.
    pub fn tiles(&self) -> impl Iterator<Item = Bounds> + '_ {
        (0..self.rows)
            .flat_map(move |row| (0..self.cols).filter_map(move |col| self.tile(col, row)))
    }
}

/// File name of one exported tile.
///
/// Formats as `[<prefix>_]<dtype>_[<min_y>|<max_y>|<min_x>|<max_x>].tif`,
/// which for lon/lat tiles reads as `[min_lat|max_lat|min_lon|max_lon]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileName {
    /// Optional user prefix.
    pub prefix: Option<String>,
    /// Sample type of the tile.
    pub dtype: DataType,
    /// Tile extent in CRS units.
    pub extent: Bounds,
}

impl TileName {
    /// Name for a tile.
    pub fn new(prefix: Option<&str>, dtype: DataType, extent: Bounds) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
            dtype,
            extent,
        }
    }

    /// Parse a tile file name back into its parts.
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            CatalogError::Validation(format!("invalid tile name '{}': {}", name, reason))
        };

        let stem = name
            .strip_suffix(TILE_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(|| invalid("missing .tif extension"))?;
        let open = stem.rfind("_[").ok_or_else(|| invalid("missing coordinates"))?;
        let (head, coords) = stem.split_at(open);
        let coords = coords
            .strip_prefix("_[")
            .and_then(|c| c.strip_suffix(']'))
            .ok_or_else(|| invalid("unbalanced brackets"))?;

        let values = coords
            .split('|')
            .map(|v| v.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| invalid("coordinates are not numbers"))?;
        let &[min_y, max_y, min_x, max_x] = values.as_slice() else {
            return Err(invalid("expected four coordinates"));
        };

        let (prefix, dtype) = match head.rsplit_once('_') {
            Some((prefix, dtype)) if !prefix.is_empty() => (Some(prefix), dtype),
            Some(_) => return Err(invalid("empty prefix")),
            None => (None, head),
        };
        let dtype = dtype
            .parse::<DataType>()
            .map_err(|_| CatalogError::InvalidDataType(dtype.to_string()))?;

        Ok(Self::new(
            prefix,
            dtype,
            Bounds::new(min_x, min_y, max_x, max_y),
        ))
    }
}

impl fmt::Display for TileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, "{}_", prefix)?;
        }
        write!(
            f,
            "{}_[{:.3}|{:.3}|{:.3}|{:.3}].{}",
            self.dtype,
            self.extent.min_y,
            self.extent.max_y,
            self.extent.min_x,
            self.extent.max_x,
            TILE_EXTENSION
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tile_size_projected() {
        // 48 MiB / (64 * 4) bytes = 196608 px -> 443 px side at 10 m
        let size = tile_size_for(
            10.0,
            64,
            DataType::Float32,
            Crs::epsg(32635),
            DEFAULT_MAX_TILE_BYTES,
        )
        .unwrap();
        assert_relative_eq!(size, 4430.0);
    }

    #[test]
    fn test_tile_size_geographic_in_degrees() {
        let size = tile_size_for(10.0, 64, DataType::Uint8, Crs::WGS84, DEFAULT_MAX_TILE_BYTES)
            .unwrap();
        // 886 px side at 10 m
        assert_relative_eq!(size, 8860.0 / METERS_PER_DEGREE);
    }

    #[test]
    fn test_tile_size_rejects_bad_input() {
        assert!(tile_size_for(0.0, 64, DataType::Uint8, Crs::WGS84, 1024).is_err());
        assert!(tile_size_for(10.0, 0, DataType::Uint8, Crs::WGS84, 1024).is_err());
        assert!(tile_size_for(10.0, 64, DataType::Float64, Crs::WGS84, 100).is_err());
    }

    #[test]
    fn test_split_covers_extent_with_clipped_edges() {
        let extent = Bounds::new(0.0, 0.0, 2.5, 1.5);
        let tiles = TileGrid::split(extent, 1.0).unwrap();
        assert_eq!(tiles.len(), 6);

        // First row runs west to east along the southern edge
        assert_eq!(tiles[0], Bounds::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(tiles[2], Bounds::new(2.0, 0.0, 2.5, 1.0));
        assert_eq!(tiles[5], Bounds::new(2.0, 1.0, 2.5, 1.5));

        let area: f64 = tiles.iter().map(|t| t.width() * t.height()).sum();
        assert_relative_eq!(area, extent.width() * extent.height());
        let union = tiles[1..].iter().fold(tiles[0], |acc, t| acc.union(t));
        assert_eq!(union, extent);
    }

    #[test]
    fn test_split_small_extent_is_single_tile() {
        let extent = Bounds::new(10.0, 20.0, 10.5, 20.25);
        assert_eq!(TileGrid::split(extent, 5.0).unwrap(), vec![extent]);
    }

    #[test]
    fn test_split_validation() {
        assert!(TileGrid::split(Bounds::new(1.0, 0.0, 0.0, 1.0), 1.0).is_err());
        assert!(TileGrid::split(Bounds::new(0.0, 0.0, 1.0, 1.0), 0.0).is_err());
        assert!(TileGrid::split(Bounds::new(0.0, 0.0, 1.0, 1.0), f64::NAN).is_err());
    }

    #[test]
    fn test_tile_name_format() {
        let extent = Bounds::new(31.2, 36.7, 37.35, 39.3);
        let name = TileName::new(Some("turkey"), DataType::Uint8, extent);
        assert_eq!(
            name.to_string(),
            "turkey_uint8_[36.700|39.300|31.200|37.350].tif"
        );
        let name = TileName::new(None, DataType::Float32, extent);
        assert_eq!(name.to_string(), "float32_[36.700|39.300|31.200|37.350].tif");
    }

    #[test]
    fn test_tile_name_parse() {
        let parsed = TileName::parse("my_area_float64_[-1.500|2.000|-75.250|-70.000].tif").unwrap();
        assert_eq!(parsed.prefix.as_deref(), Some("my_area"));
        assert_eq!(parsed.dtype, DataType::Float64);
        assert_eq!(parsed.extent, Bounds::new(-75.25, -1.5, -70.0, 2.0));

        let parsed = TileName::parse("uint8_[0.000|1.000|2.000|3.000].tif").unwrap();
        assert_eq!(parsed.prefix, None);
        assert_eq!(parsed.to_string(), "uint8_[0.000|1.000|2.000|3.000].tif");
    }

    #[test]
    fn test_tile_name_parse_rejects_malformed() {
        assert!(TileName::parse("uint8_[0|1|2|3].png").is_err());
        assert!(TileName::parse("uint8_[0|1|2].tif").is_err());
        assert!(TileName::parse("uint8_0|1|2|3.tif").is_err());
        assert!(TileName::parse("_uint8_[0|1|2|3].tif").is_err());
        assert!(matches!(
            TileName::parse("uint16_[0|1|2|3].tif"),
            Err(CatalogError::InvalidDataType(_))
        ));
    }
}
