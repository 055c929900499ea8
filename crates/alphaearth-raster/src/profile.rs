//! Raster metadata: data types, bounds, affine transforms and profiles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::RasterError;

/// Pixel data type of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Unsigned 8-bit integer (quantized embeddings).
    Uint8,
    /// 32-bit IEEE float.
    Float32,
    /// 64-bit IEEE float.
    Float64,
}

impl DataType {
    /// All supported types.
    pub const ALL: [DataType; 3] = [DataType::Uint8, DataType::Float32, DataType::Float64];

    /// Tag used in file names and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Uint8 => "uint8",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    /// Bytes per sample.
    pub fn size_bytes(&self) -> usize {
        match self {
            DataType::Uint8 => 1,
            DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }

    /// TIFF BitsPerSample value.
    pub fn bits_per_sample(&self) -> u16 {
        (self.size_bytes() * 8) as u16
    }

    /// TIFF SampleFormat value (1 = unsigned integer, 3 = IEEE float).
    pub fn sample_format(&self) -> u16 {
        match self {
            DataType::Uint8 => 1,
            DataType::Float32 | DataType::Float64 => 3,
        }
    }

    /// Whether this is a floating-point type.
    pub fn is_float(&self) -> bool {
        !matches!(self, DataType::Uint8)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = RasterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uint8" => Ok(DataType::Uint8),
            "float32" => Ok(DataType::Float32),
            "float64" => Ok(DataType::Float64),
            other => Err(RasterError::UnsupportedDataType(format!(
                "'{}' (expected uint8, float32 or float64)",
                other
            ))),
        }
    }
}

/// Axis-aligned extent in CRS units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// West edge.
    pub min_x: f64,
    /// South edge.
    pub min_y: f64,
    /// East edge.
    pub max_x: f64,
    /// North edge.
    pub max_y: f64,
}

impl Bounds {
    /// Create bounds from its edges.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// East-west size.
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// North-south size.
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Smallest bounds containing both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Check if a point is within the bounds (edges included).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Whether the interiors overlap.
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }
}

/// North-up affine transform from pixel to world coordinates.
///
/// Pixel `(col, row)` has its top-left corner at
/// `(origin_x + col * pixel_width, origin_y - row * pixel_height)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// World x of the top-left corner.
    pub origin_x: f64,
    /// World y of the top-left corner.
    pub origin_y: f64,
    /// Pixel size along x (positive).
    pub pixel_width: f64,
    /// Pixel size along y (positive, rows go south).
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a transform from the top-left corner and pixel size.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Extent of a `width x height` pixel grid.
    pub fn bounds(&self, width: usize, height: usize) -> Bounds {
        Bounds {
            min_x: self.origin_x,
            min_y: self.origin_y - height as f64 * self.pixel_height,
            max_x: self.origin_x + width as f64 * self.pixel_width,
            max_y: self.origin_y,
        }
    }

    /// World coordinate of a pixel's center.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional pixel position of a world coordinate.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (self.origin_y - y) / self.pixel_height,
        )
    }
}

/// Raster metadata, the equivalent of a rasterio profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterProfile {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Number of bands.
    pub bands: usize,
    /// Pixel data type.
    pub dtype: DataType,
    /// Pixel-to-world transform.
    pub transform: GeoTransform,
    /// EPSG code of the CRS, if known.
    pub crs: Option<u16>,
    /// Value marking missing samples.
    pub nodata: Option<f64>,
}

impl RasterProfile {
    /// Total samples (`width * height * bands`).
    pub fn sample_count(&self) -> usize {
        self.width * self.height * self.bands
    }

    /// Geographic extent.
    pub fn bounds(&self) -> Bounds {
        self.transform.bounds(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_parse() {
        assert_eq!("uint8".parse::<DataType>().unwrap(), DataType::Uint8);
        assert_eq!("Float32".parse::<DataType>().unwrap(), DataType::Float32);
        assert!("uint16".parse::<DataType>().is_err());
        assert_eq!(DataType::Float64.to_string(), "float64");
        assert_eq!(DataType::Float32.bits_per_sample(), 32);
    }

    #[test]
    fn test_bounds_union() {
        let a = Bounds::new(0.0, 0.0, 1.0, 1.0);
        let b = Bounds::new(1.0, -1.0, 3.0, 0.5);
        let u = a.union(&b);
        assert_eq!(u, Bounds::new(0.0, -1.0, 3.0, 1.0));
        assert!(!a.intersects(&b));
        assert!(a.intersects(&Bounds::new(0.5, 0.5, 2.0, 2.0)));
    }

    #[test]
    fn test_transform_bounds_and_centers() {
        let t = GeoTransform::new(500_000.0, 4_100_000.0, 10.0, 10.0);
        let b = t.bounds(4, 2);
        assert_eq!(b, Bounds::new(500_000.0, 4_099_980.0, 500_040.0, 4_100_000.0));
        assert_eq!(t.pixel_center(0, 0), (500_005.0, 4_099_995.0));
        let (col, row) = t.world_to_pixel(500_015.0, 4_099_985.0);
        assert_eq!((col, row), (1.5, 1.5));
    }

    #[test]
    fn test_profile_json() {
        let profile = RasterProfile {
            width: 3,
            height: 2,
            bands: 64,
            dtype: DataType::Uint8,
            transform: GeoTransform::new(500_000.0, 4_100_000.0, 10.0, 10.0),
            crs: Some(32635),
            nodata: Some(0.0),
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["dtype"], "uint8");
        assert_eq!(json["crs"], 32635);
        let back: RasterProfile = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile);
    }
}
