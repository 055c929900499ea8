//! Coordinate reference systems and request geometries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use alphaearth_raster::Bounds;

use crate::{CatalogError, Result};

/// EPSG code of WGS84 longitude/latitude.
pub const EPSG_WGS84: u32 = 4326;

/// A coordinate reference system identified by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    epsg: u32,
}

impl Crs {
    /// WGS84 longitude/latitude.
    pub const WGS84: Crs = Crs { epsg: EPSG_WGS84 };

    /// CRS from an EPSG code.
    pub fn epsg(code: u32) -> Self {
        Crs { epsg: code }
    }

    /// UTM zone CRS: EPSG 32600 + zone (north) or 32700 + zone (south).
    pub fn utm(zone: u8, hemisphere: Hemisphere) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(CatalogError::Validation(format!(
                "UTM zone {} out of range (must be 1-60)",
                zone
            )));
        }
        let base = match hemisphere {
            Hemisphere::North => 32600,
            Hemisphere::South => 32700,
        };
        Ok(Crs::epsg(base + u32::from(zone)))
    }

    /// EPSG code.
    pub fn code(&self) -> u32 {
        self.epsg
    }

    /// Whether coordinates are lon/lat degrees rather than projected metres.
    pub fn is_geographic(&self) -> bool {
        (4000..5000).contains(&self.epsg)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl FromStr for Crs {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s
            .trim()
            .strip_prefix("EPSG:")
            .or_else(|| s.trim().strip_prefix("epsg:"))
            .and_then(|c| c.parse::<u32>().ok())
            .ok_or_else(|| CatalogError::Validation(format!("invalid CRS '{}'", s)))?;
        Ok(Crs::epsg(code))
    }
}

impl TryFrom<String> for Crs {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

/// Hemisphere of a UTM zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hemisphere {
    /// Northern hemisphere.
    #[serde(rename = "N")]
    North,
    /// Southern hemisphere.
    #[serde(rename = "S")]
    South,
}

impl FromStr for Hemisphere {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" => Ok(Hemisphere::North),
            "S" => Ok(Hemisphere::South),
            other => Err(CatalogError::Validation(format!(
                "invalid hemisphere '{}' (expected N or S)",
                other
            ))),
        }
    }
}

/// Area of interest for a catalog query or export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    /// Geodesic lon/lat rectangle in WGS84.
    Rectangle {
        /// Rectangle edges in degrees.
        extent: Bounds,
    },
    /// Planar polygon in a projected CRS.
    Polygon {
        /// Closed ring of `[x, y]` vertices.
        ring: Vec<[f64; 2]>,
        /// CRS of the vertices.
        crs: Crs,
        /// Whether edges follow geodesics.
        geodesic: bool,
    },
    /// Features selected from a remote vector collection.
    Region {
        /// Collection identifier, e.g. `FAO/GAUL/2015/level0`.
        collection: String,
        /// Property to filter on, e.g. `ADM0_NAME`.
        property: String,
        /// Required property value.
        value: String,
    },
}

impl Geometry {
    /// Lon/lat rectangle, validated against WGS84 ranges.
    pub fn lat_lon(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<Self> {
        validate_lat_lon(min_lat, max_lat, min_lon, max_lon)?;
        Ok(Geometry::Rectangle {
            extent: Bounds::new(min_lon, min_lat, max_lon, max_lat),
        })
    }

    /// Planar box in a projected CRS as a closed 5-vertex ring.
    pub fn projected_box(extent: Bounds, crs: Crs) -> Result<Self> {
        validate_extent(&extent)?;
        let Bounds {
            min_x,
            min_y,
            max_x,
            max_y,
        } = extent;
        Ok(Geometry::Polygon {
            ring: vec![
                [min_x, min_y],
                [max_x, min_y],
                [max_x, max_y],
                [min_x, max_y],
                [min_x, min_y],
            ],
            crs,
            geodesic: false,
        })
    }

    /// Remote feature filter, e.g. a country from FAO GAUL.
    pub fn region(collection: &str, property: &str, value: &str) -> Self {
        Geometry::Region {
            collection: collection.to_string(),
            property: property.to_string(),
            value: value.to_string(),
        }
    }

    /// Tile geometry for an extent in the given CRS.
    pub fn for_extent(extent: Bounds, crs: Crs) -> Result<Self> {
        if crs.is_geographic() {
            validate_extent(&extent)?;
            Ok(Geometry::Rectangle { extent })
        } else {
            Geometry::projected_box(extent, crs)
        }
    }

    /// Extent computable without the remote service, if any.
    pub fn local_extent(&self) -> Option<Bounds> {
        match self {
            Geometry::Rectangle { extent } => Some(*extent),
            Geometry::Polygon { ring, .. } => {
                let (first, rest) = ring.split_first()?;
                let start = Bounds::new(first[0], first[1], first[0], first[1]);
                Some(rest.iter().fold(start, |b, p| {
                    b.union(&Bounds::new(p[0], p[1], p[0], p[1]))
                }))
            }
            Geometry::Region { .. } => None,
        }
    }
}

/// Validate a WGS84 bounding box.
pub fn validate_lat_lon(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&min_lat) || !(-90.0..=90.0).contains(&max_lat) {
        return Err(CatalogError::Validation(format!(
            "latitude range {}..{} outside -90..90",
            min_lat, max_lat
        )));
    }
    if !(-180.0..=180.0).contains(&min_lon) || !(-180.0..=180.0).contains(&max_lon) {
        return Err(CatalogError::Validation(format!(
            "longitude range {}..{} outside -180..180",
            min_lon, max_lon
        )));
    }
    validate_extent(&Bounds::new(min_lon, min_lat, max_lon, max_lat))
}

/// Require a non-empty, finite extent.
pub fn validate_extent(extent: &Bounds) -> Result<()> {
    let finite = [extent.min_x, extent.min_y, extent.max_x, extent.max_y]
        .iter()
        .all(|v| v.is_finite());
    if !finite || extent.min_x >= extent.max_x || extent.min_y >= extent.max_y {
        return Err(CatalogError::Validation(format!(
            "empty or invalid extent x {}..{}, y {}..{}",
            extent.min_x, extent.max_x, extent.min_y, extent.max_y
        )));
    }
    Ok(())
}
