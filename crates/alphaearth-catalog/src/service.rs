//! Seams to the remote catalog and export services.
//!
//! The downloader never talks to the network directly. It is handed a
//! [`Catalog`] for metadata queries and an [`Exporter`] that materializes one
//! [`ImageRequest`] as a GeoTIFF on disk. [`UrlExporter`] covers the common
//! case where the service prepares a download URL for each request.
//! Backends implementing [`Connect`] are built from an [`EarthEngineConfig`].

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use alphaearth_raster::Bounds;

use crate::config::{DownloaderConfig, EarthEngineConfig};
use crate::geometry::{Crs, Geometry};
use crate::request::{CatalogQuery, ImageRequest};
use crate::{ExportError, Result};

/// Metadata queries against the embedding collection.
pub trait Catalog {
    /// Number of images matching the query.
    fn count(&self, query: &CatalogQuery) -> Result<usize>;

    /// Acquisition start times of matching images, in epoch milliseconds.
    fn start_times(&self, query: &CatalogQuery) -> Result<Vec<i64>>;

    /// Bounding box of a geometry expressed in `crs`.
    fn bounds(&self, geometry: &Geometry, crs: Crs) -> Result<Bounds>;
}

/// Exports one image request to a local file.
pub trait Exporter {
    /// Write the computed image to `path` as a GeoTIFF.
    fn export(&self, request: &ImageRequest, path: &Path) -> std::result::Result<(), ExportError>;
}

/// Prepares a download URL for an image request.
pub trait DownloadUrlProvider {
    /// URL serving the finished GeoTIFF.
    fn download_url(&self, request: &ImageRequest) -> std::result::Result<String, ExportError>;
}

/// A service backend opened with explicit connection settings.
pub trait Connect: Sized {
    /// Open a session for `config.project`, authenticating with its credentials.
    fn connect(config: &EarthEngineConfig) -> Result<Self>;
}

/// Longest response body kept in a status error.
const MAX_ERROR_BODY: usize = 512;

/// [`Exporter`] that fetches a prepared URL over HTTP.
pub struct UrlExporter<P> {
    provider: P,
    client: reqwest::blocking::Client,
}

impl<P: DownloadUrlProvider> UrlExporter<P> {
    /// Create an exporter with the given HTTP timeout.
    pub fn new(provider: P, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { provider, client })
    }

    /// Create an exporter using the configured HTTP timeout.
    pub fn from_config(provider: P, config: &DownloaderConfig) -> Result<Self> {
        Self::new(provider, config.http_timeout())
    }

    /// The wrapped URL provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P: DownloadUrlProvider> Exporter for UrlExporter<P> {
    fn export(&self, request: &ImageRequest, path: &Path) -> std::result::Result<(), ExportError> {
        let url = self.provider.download_url(request)?;
        debug!("Fetching {} -> {}", url, path.display());

        let response = self.client.get(&url).send()?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(ExportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes()?;

        // Stage next to the target so a failed transfer never leaves a partial tile
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;
        let mut staged = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".tif.part")
            .tempfile_in(parent)?;
        staged.write_all(&bytes)?;
        staged.as_file().sync_all()?;
        staged.persist(path).map_err(|e| e.error)?;

        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{DateRange, DownloadRequest};

    struct FailingProvider;

    impl DownloadUrlProvider for FailingProvider {
        fn download_url(
            &self,
            _request: &ImageRequest,
        ) -> std::result::Result<String, ExportError> {
            Err(ExportError::Remote("quota exceeded".to_string()))
        }
    }

    #[test]
    fn test_provider_error_is_reported_without_writing() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = DownloaderConfig {
            http_timeout_secs: 5,
            ..Default::default()
        };
        let exporter = UrlExporter::from_config(FailingProvider, &config).unwrap();

        let dates = DateRange::year(2024).unwrap();
        let request = DownloadRequest::latlon(dates, 0.0, 1.0, 0.0, 1.0, temp.path()).unwrap();
        let image = request.image_request(Bounds::new(0.0, 0.0, 1.0, 1.0)).unwrap();
        let path = temp.path().join("tile.tif");

        let err = exporter.export(&image, &path).unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
        assert!(!path.exists());
    }
}
