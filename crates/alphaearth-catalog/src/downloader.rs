//! Download orchestration: query, tile, export and optionally merge.

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use alphaearth_raster::{default_output_path, merge_files, Bounds, DataType, MergeSummary};

use crate::config::DownloaderConfig;
use crate::dataset::DatasetInfo;
use crate::geometry::{Crs, Geometry};
use crate::request::{CatalogQuery, DateRange, DownloadRequest};
use crate::service::{Catalog, Connect, DownloadUrlProvider, Exporter, UrlExporter};
use crate::tiling::{tile_size_for, TileGrid, TileName};
use crate::{CatalogError, Result};

// ============================================================================
// Report
// ============================================================================

/// What happened to one tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TileStatus {
    /// Exported in this run.
    Exported,
    /// Already on disk and left alone.
    Skipped,
    /// Export failed; the batch carried on.
    Failed {
        /// Error message from the exporter.
        error: String,
    },
}

/// Outcome of exporting one tile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileOutcome {
    /// Target file.
    pub path: PathBuf,
    /// Tile extent in the request CRS.
    pub extent: Bounds,
    /// Result of the export.
    pub status: TileStatus,
}

/// Summary of a download run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadReport {
    /// Requested period.
    pub dates: DateRange,
    /// Full extent in the request CRS.
    pub bounds: Bounds,
    /// Exported bands.
    pub bands: Vec<String>,
    /// Resolution in metres.
    pub scale: f64,
    /// Output CRS.
    pub crs: Crs,
    /// Output sample type.
    pub dtype: DataType,
    /// Number of catalog images matching the request.
    pub num_images: usize,
    /// Per-tile outcomes in grid order.
    pub tiles: Vec<TileOutcome>,
    /// Merged output, if merging ran.
    pub merged: Option<MergeSummary>,
}

impl DownloadReport {
    /// Tiles present on disk after the run.
    pub fn succeeded(&self) -> impl Iterator<Item = &TileOutcome> {
        self.tiles
            .iter()
            .filter(|t| !matches!(t.status, TileStatus::Failed { .. }))
    }

    /// Tiles whose export failed.
    pub fn failed(&self) -> impl Iterator<Item = &TileOutcome> {
        self.tiles
            .iter()
            .filter(|t| matches!(t.status, TileStatus::Failed { .. }))
    }

    /// Whether every tile is on disk.
    pub fn is_complete(&self) -> bool {
        self.failed().next().is_none()
    }
}

// ============================================================================
// Downloader
// ============================================================================

/// Downloads embedding tiles through injected catalog and export services.
pub struct Downloader<C, E> {
    catalog: C,
    exporter: E,
    config: DownloaderConfig,
}

impl<C: Catalog, E: Exporter> Downloader<C, E> {
    /// Downloader with default configuration.
    pub fn new(catalog: C, exporter: E) -> Self {
        Self::with_config(catalog, exporter, DownloaderConfig::default())
    }

    /// Downloader with explicit configuration.
    pub fn with_config(catalog: C, exporter: E, config: DownloaderConfig) -> Self {
        Self {
            catalog,
            exporter,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// The catalog service.
    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// The export service.
    pub fn exporter(&self) -> &E {
        &self.exporter
    }

    /// Dataset description.
    pub fn info(&self) -> DatasetInfo {
        DatasetInfo::annual()
    }

    /// Acquisition dates available, optionally within an area.
    pub fn available_dates(&self, geometry: Option<&Geometry>) -> Result<Vec<NaiveDate>> {
        let query = CatalogQuery::all(geometry.cloned());
        self.catalog
            .start_times(&query)?
            .into_iter()
            .map(|millis| {
                DateTime::from_timestamp_millis(millis)
                    .map(|t| t.date_naive())
                    .ok_or_else(|| {
                        CatalogError::Remote(format!("invalid image timestamp {}", millis))
                    })
            })
            .collect()
    }

    /// Export every tile of a request.
    ///
    /// Tile failures are recorded in the report and do not stop the batch.
    /// With `merge_tiles` configured, a complete run is merged into
    /// `<output_dir>.tif`.
    pub fn download(&self, request: &DownloadRequest) -> Result<DownloadReport> {
        request.validate()?;

        let query = request.query();
        let num_images = self.catalog.count(&query)?;
        if num_images == 0 {
            return Err(CatalogError::NoImages {
                start: request.dates.start,
                end: request.dates.end,
            });
        }
        debug!("{} images match {}..{}", num_images, request.dates.start, request.dates.end);

        let bands = request.selected_bands();
        let extent = self.resolve_extent(request)?;
        let tile_size = match request.tile_size {
            Some(size) => size,
            None => tile_size_for(
                request.scale,
                bands.len(),
                request.dtype,
                request.crs,
                self.config.max_tile_bytes,
            )?,
        };
        let grid = TileGrid::new(extent, tile_size)?;

        fs::create_dir_all(&request.output_dir)?;
        info!(
            "Exporting {} tile(s) ({}x{}) to {}",
            grid.len(),
            grid.cols(),
            grid.rows(),
            request.output_dir.display()
        );

        let mut tiles = Vec::with_capacity(grid.len());
        for (index, tile) in grid.tiles().enumerate() {
            let name = TileName::new(request.prefix.as_deref(), request.dtype, tile);
            let path = request.output_dir.join(name.to_string());

            let status = if path.exists() && !self.config.overwrite {
                debug!("Skipping existing tile {}", path.display());
                TileStatus::Skipped
            } else {
                let image = request.image_request(tile)?;
                match self.exporter.export(&image, &path) {
                    Ok(()) => {
                        info!("Tile {}/{} exported: {}", index + 1, grid.len(), name);
                        TileStatus::Exported
                    }
                    Err(e) => {
                        warn!("Tile {}/{} failed: {}: {}", index + 1, grid.len(), name, e);
                        TileStatus::Failed {
                            error: e.to_string(),
                        }
                    }
                }
            };
            tiles.push(TileOutcome {
                path,
                extent: tile,
                status,
            });
        }

        let mut report = DownloadReport {
            dates: request.dates,
            bounds: extent,
            bands,
            scale: request.scale,
            crs: request.crs,
            dtype: request.dtype,
            num_images,
            tiles,
            merged: None,
        };

        if self.config.merge_tiles {
            if report.is_complete() {
                report.merged = Some(self.merge(request, &report)?);
            } else {
                warn!(
                    "Skipping merge: {} tile(s) failed",
                    report.failed().count()
                );
            }
        }

        Ok(report)
    }

    fn resolve_extent(&self, request: &DownloadRequest) -> Result<Bounds> {
        let local = match &request.geometry {
            Geometry::Rectangle { extent } if request.crs == Crs::WGS84 => Some(*extent),
            Geometry::Polygon { crs, .. } if *crs == request.crs => request.geometry.local_extent(),
            _ => None,
        };
        match local {
            Some(extent) => Ok(extent),
            None => self.catalog.bounds(&request.geometry, request.crs),
        }
    }

    fn merge(&self, request: &DownloadRequest, report: &DownloadReport) -> Result<MergeSummary> {
        let inputs: Vec<&PathBuf> = report.succeeded().map(|t| &t.path).collect();
        let output = default_output_path(&request.output_dir)?;
        let summary = merge_files(&inputs, &output, self.config.delete_tiles)?;

        if self.config.delete_tiles {
            // Other files in the directory are left in place
            if let Err(e) = fs::remove_dir(&request.output_dir) {
                warn!(
                    "Keeping tile directory {}: {}",
                    request.output_dir.display(),
                    e
                );
            }
        }
        info!("Merged {} tile(s) into {}", summary.inputs, summary.output.display());
        Ok(summary)
    }
}

impl<C, P> Downloader<C, UrlExporter<P>>
where
    C: Catalog + Connect,
    P: DownloadUrlProvider + Connect,
{
    /// Open both services with the configured project and credentials.
    ///
    /// Fails with [`CatalogError::Config`] before connecting when no project
    /// id is configured or set in the environment.
    pub fn connect(config: DownloaderConfig) -> Result<Self> {
        let service = config.earth_engine_config()?;
        info!(project = %service.project, "Connecting to catalog service");
        let catalog = C::connect(&service)?;
        let exporter = UrlExporter::from_config(P::connect(&service)?, &config)?;
        Ok(Self::with_config(catalog, exporter, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(statuses: Vec<TileStatus>) -> DownloadReport {
        DownloadReport {
            dates: DateRange::year(2020).unwrap(),
            bounds: Bounds::new(0.0, 0.0, 1.0, 1.0),
            bands: vec!["A00".to_string()],
            scale: 10.0,
            crs: Crs::WGS84,
            dtype: DataType::Float32,
            num_images: 1,
            tiles: statuses
                .into_iter()
                .map(|status| TileOutcome {
                    path: PathBuf::from("t.tif"),
                    extent: Bounds::new(0.0, 0.0, 1.0, 1.0),
                    status,
                })
                .collect(),
            merged: None,
        }
    }

    #[test]
    fn test_report_helpers() {
        let r = report(vec![
            TileStatus::Exported,
            TileStatus::Skipped,
            TileStatus::Failed {
                error: "boom".to_string(),
            },
        ]);
        assert_eq!(r.succeeded().count(), 2);
        assert_eq!(r.failed().count(), 1);
        assert!(!r.is_complete());
        assert!(report(vec![TileStatus::Skipped]).is_complete());
    }

    #[test]
    fn test_report_serializes_status_tag() {
        let r = report(vec![TileStatus::Failed {
            error: "quota".to_string(),
        }]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["crs"], "EPSG:4326");
        assert_eq!(json["dtype"], "float32");
        assert_eq!(json["tiles"][0]["status"]["state"], "failed");
        assert_eq!(json["tiles"][0]["status"]["error"], "quota");
    }
}
