//! Download requests and the per-tile image requests derived from them.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use alphaearth_codec::Expr;
use alphaearth_raster::{Bounds, DataType};

use crate::dataset::{
    band_names, validate_bands, DATASET_ID, FIRST_YEAR, LAST_YEAR, NATIVE_SCALE_METERS,
};
use crate::geometry::{Crs, Geometry, Hemisphere};
use crate::{CatalogError, Result};

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day included.
    pub start: NaiveDate,
    /// First day excluded.
    pub end: NaiveDate,
}

impl DateRange {
    /// Range from two dates; `start` must precede `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start >= end {
            return Err(CatalogError::Validation(format!(
                "start date {} must be before end date {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Range from `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
                CatalogError::Validation(format!("invalid date '{}': {}", s, e))
            })
        };
        Self::new(parse(start)?, parse(end)?)
    }

    /// One full year of annual embeddings.
    pub fn year(year: i32) -> Result<Self> {
        if !(FIRST_YEAR..=LAST_YEAR).contains(&year) {
            return Err(CatalogError::Validation(format!(
                "year must be between {} and {}, got {}",
                FIRST_YEAR, LAST_YEAR, year
            )));
        }
        let start = NaiveDate::from_ymd_opt(year, 1, 1);
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1);
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end),
            _ => Err(CatalogError::Validation(format!("invalid year {}", year))),
        }
    }

    /// Years touched by the range.
    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        let last = self.end.pred_opt().unwrap_or(self.end);
        self.start.year()..=last.year()
    }
}

/// Everything needed to download embeddings for one area and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Acquisition period.
    pub dates: DateRange,
    /// Area of interest.
    pub geometry: Geometry,
    /// Output CRS.
    pub crs: Crs,
    /// Output resolution in metres.
    pub scale: f64,
    /// Band subset; all bands when `None`.
    pub bands: Option<Vec<String>>,
    /// Output sample type.
    pub dtype: DataType,
    /// Directory receiving the tiles.
    pub output_dir: PathBuf,
    /// Optional file name prefix.
    pub prefix: Option<String>,
    /// Tile side in CRS units; derived from the byte budget when `None`.
    pub tile_size: Option<f64>,
}

impl DownloadRequest {
    fn with_geometry(dates: DateRange, geometry: Geometry, crs: Crs, output_dir: PathBuf) -> Self {
        Self {
            dates,
            geometry,
            crs,
            scale: f64::from(NATIVE_SCALE_METERS),
            bands: None,
            dtype: DataType::Float32,
            output_dir,
            prefix: None,
            tile_size: None,
        }
    }

    /// Lon/lat rectangle exported in WGS84.
    pub fn latlon<P: AsRef<Path>>(
        dates: DateRange,
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
        output_dir: P,
    ) -> Result<Self> {
        let geometry = Geometry::lat_lon(min_lat, max_lat, min_lon, max_lon)?;
        Ok(Self::with_geometry(
            dates,
            geometry,
            Crs::WGS84,
            output_dir.as_ref().to_path_buf(),
        ))
    }

    /// Projected box exported in its UTM zone.
    pub fn utm<P: AsRef<Path>>(
        dates: DateRange,
        extent: Bounds,
        zone: u8,
        hemisphere: Hemisphere,
        output_dir: P,
    ) -> Result<Self> {
        let crs = Crs::utm(zone, hemisphere)?;
        let geometry = Geometry::projected_box(extent, crs)?;
        Ok(Self::with_geometry(
            dates,
            geometry,
            crs,
            output_dir.as_ref().to_path_buf(),
        ))
    }

    /// Named region from a remote feature collection, exported in WGS84.
    pub fn region<P: AsRef<Path>>(
        dates: DateRange,
        collection: &str,
        property: &str,
        value: &str,
        output_dir: P,
    ) -> Self {
        Self::with_geometry(
            dates,
            Geometry::region(collection, property, value),
            Crs::WGS84,
            output_dir.as_ref().to_path_buf(),
        )
    }

    /// Set the resolution in metres.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Restrict to a band subset.
    pub fn with_bands<I, S>(mut self, bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bands = Some(bands.into_iter().map(Into::into).collect());
        self
    }

    /// Set the output sample type.
    pub fn with_dtype(mut self, dtype: DataType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Set the tile file prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Override the derived tile size.
    pub fn with_tile_size(mut self, size: f64) -> Self {
        self.tile_size = Some(size);
        self
    }

    /// Override the output CRS.
    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = crs;
        self
    }

    /// Check every parameter. Called before any remote call.
    pub fn validate(&self) -> Result<()> {
        if !(self.scale >= f64::from(NATIVE_SCALE_METERS)) {
            return Err(CatalogError::Validation(format!(
                "scale must be at least {} meters, got {}",
                NATIVE_SCALE_METERS, self.scale
            )));
        }
        if let Some(bands) = &self.bands {
            validate_bands(bands)?;
        }
        if let Some(size) = self.tile_size {
            if !(size.is_finite() && size > 0.0) {
                return Err(CatalogError::Validation(format!(
                    "tile size must be positive, got {}",
                    size
                )));
            }
        }
        if let Some(prefix) = &self.prefix {
            if prefix.is_empty() || prefix.contains(['/', '\\', '[', ']', '|']) {
                return Err(CatalogError::Validation(format!(
                    "prefix '{}' is empty or contains reserved characters",
                    prefix
                )));
            }
        }
        Ok(())
    }

    /// Requested bands, defaulting to all of them.
    pub fn selected_bands(&self) -> Vec<String> {
        self.bands.clone().unwrap_or_else(band_names)
    }

    /// Catalog query for this request.
    pub fn query(&self) -> CatalogQuery {
        CatalogQuery {
            dataset: DATASET_ID.to_string(),
            dates: self.dates,
            geometry: Some(self.geometry.clone()),
        }
    }

    /// Image request exporting one tile of this request.
    ///
    /// The mosaic is clipped to the request geometry and exported over the
    /// tile, so region tiles stop at the region outline.
    pub fn image_request(&self, tile: Bounds) -> Result<ImageRequest> {
        Ok(ImageRequest {
            query: self.query(),
            mosaic: true,
            bands: self.selected_bands(),
            clip: self.geometry.clone(),
            region: Geometry::for_extent(tile, self.crs)?,
            pixel: pixel_expression(self.dtype),
            dtype: self.dtype,
            scale: self.scale,
            crs: self.crs,
        })
    }
}

/// Filter over the embedding collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogQuery {
    /// Collection identifier.
    pub dataset: String,
    /// Acquisition period.
    pub dates: DateRange,
    /// Spatial filter; the whole collection when `None`.
    pub geometry: Option<Geometry>,
}

impl CatalogQuery {
    /// Query over the whole collection, optionally filtered by area.
    pub fn all(geometry: Option<Geometry>) -> Self {
        let start = NaiveDate::from_ymd_opt(FIRST_YEAR, 1, 1).unwrap_or(NaiveDate::MIN);
        let end = NaiveDate::from_ymd_opt(LAST_YEAR + 1, 1, 1).unwrap_or(NaiveDate::MAX);
        Self {
            dataset: DATASET_ID.to_string(),
            dates: DateRange { start, end },
            geometry,
        }
    }
}

/// Server-side computation producing one exported tile.
///
/// The filtered collection is mosaicked, the bands selected and the result
/// clipped to `clip` before `pixel` is applied to every sample. Only the
/// `region` footprint is exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Source images.
    pub query: CatalogQuery,
    /// Whether overlapping images are mosaicked.
    pub mosaic: bool,
    /// Selected bands in output order.
    pub bands: Vec<String>,
    /// Area of interest the mosaic is masked to.
    pub clip: Geometry,
    /// Tile footprint that is exported.
    pub region: Geometry,
    /// Per-sample conversion to the output type.
    pub pixel: Expr,
    /// Output sample type.
    pub dtype: DataType,
    /// Output resolution in metres.
    pub scale: f64,
    /// Output CRS.
    pub crs: Crs,
}

/// Per-sample conversion for an output type.
pub fn pixel_expression(dtype: DataType) -> Expr {
    match dtype {
        DataType::Uint8 => Expr::quantize(Expr::input()),
        DataType::Float32 => Expr::input().to_float(),
        DataType::Float64 => Expr::input().to_double(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alphaearth_codec::quantize;

    fn dates() -> DateRange {
        DateRange::year(2024).unwrap()
    }

    #[test]
    fn test_year_range() {
        let range = DateRange::year(2024).unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(range.years(), 2024..=2024);
        assert!(DateRange::year(2016).is_err());
        assert!(DateRange::year(2025).is_err());
    }

    #[test]
    fn test_date_range_order_and_parse() {
        assert!(DateRange::parse("2020-01-01", "2022-01-01").is_ok());
        assert!(DateRange::parse("2022-01-01", "2020-01-01").is_err());
        assert!(DateRange::parse("2022-01-01", "2022-01-01").is_err());
        assert!(DateRange::parse("2022/01/01", "2023-01-01").is_err());
        let range = DateRange::parse("2020-06-01", "2022-01-01").unwrap();
        assert_eq!(range.years(), 2020..=2021);
    }

    #[test]
    fn test_latlon_request_defaults() {
        let request = DownloadRequest::latlon(dates(), 36.7, 39.3, 31.2, 37.35, "out").unwrap();
        assert_eq!(request.crs, Crs::WGS84);
        assert_eq!(request.scale, 10.0);
        assert_eq!(request.dtype, DataType::Float32);
        assert_eq!(request.selected_bands().len(), 64);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_utm_request_uses_zone_crs() {
        let extent = Bounds::new(517_700.0, 4_084_500.0, 562_250.0, 4_117_000.0);
        let request =
            DownloadRequest::utm(dates(), extent, 35, Hemisphere::North, "out").unwrap();
        assert_eq!(request.crs.to_string(), "EPSG:32635");
        assert!(matches!(request.geometry, Geometry::Polygon { .. }));
        assert!(DownloadRequest::utm(dates(), extent, 0, Hemisphere::North, "out").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let base =
            DownloadRequest::region(dates(), "FAO/GAUL/2015/level0", "ADM0_NAME", "Turkey", "out");
        assert!(base.validate().is_ok());
        assert!(base.clone().with_scale(5.0).validate().is_err());
        assert!(base.clone().with_scale(f64::NAN).validate().is_err());
        assert!(base.clone().with_bands(["A00", "A99"]).validate().is_err());
        assert!(base.clone().with_tile_size(-1.0).validate().is_err());
        assert!(base.clone().with_prefix("a/b").validate().is_err());
        assert!(base.with_bands(["A00", "A01"]).with_prefix("turkey").validate().is_ok());
    }

    #[test]
    fn test_pixel_expression_per_dtype() {
        let quantize_expr = pixel_expression(DataType::Uint8);
        assert_eq!(quantize_expr, Expr::quantize(Expr::input()));
        for x in [-1.0, -0.3, 0.0, 0.25, 1.0] {
            assert_eq!(quantize_expr.eval(x), f64::from(quantize(x as f32)));
        }
        assert_eq!(pixel_expression(DataType::Float32), Expr::input().to_float());
        assert_eq!(pixel_expression(DataType::Float64), Expr::input().to_double());
    }

    #[test]
    fn test_image_request_exports_tile_of_request_area() {
        let request = DownloadRequest::latlon(dates(), 0.0, 1.0, 0.0, 1.0, "out")
            .unwrap()
            .with_dtype(DataType::Uint8)
            .with_bands(["A00", "A01"]);
        let tile = Bounds::new(0.0, 0.0, 0.5, 0.5);
        let image = request.image_request(tile).unwrap();
        assert!(image.mosaic);
        assert_eq!(image.bands, vec!["A00", "A01"]);
        assert_eq!(image.region, Geometry::Rectangle { extent: tile });
        assert_eq!(image.clip, request.geometry);
        assert_eq!(image.query.dataset, DATASET_ID);
        assert_eq!(image.pixel, Expr::quantize(Expr::input()));

        let json = serde_json::to_string(&image).unwrap();
        let back: ImageRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn test_region_tiles_are_clipped_to_region() {
        let request = DownloadRequest::region(
            dates(),
            "FAO/GAUL/2015/level0",
            "ADM0_NAME",
            "Turkey",
            "out",
        );
        let tile = Bounds::new(26.0, 36.0, 27.0, 37.0);
        let image = request.image_request(tile).unwrap();
        assert_eq!(
            image.clip,
            Geometry::region("FAO/GAUL/2015/level0", "ADM0_NAME", "Turkey")
        );
        assert_eq!(image.region, Geometry::Rectangle { extent: tile });
        assert_eq!(image.query.geometry.as_ref(), Some(&image.clip));
    }
}
