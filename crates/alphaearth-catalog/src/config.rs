//! Service and downloader configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use alphaearth_raster::DataType;

use crate::dataset::NATIVE_SCALE_METERS;
use crate::tiling::DEFAULT_MAX_TILE_BYTES;
use crate::{CatalogError, Result};

/// Environment variable holding the cloud project id.
pub const PROJECT_ENV: &str = "EE_PROJECT";

/// Environment variable holding the service-account credentials path.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

// ============================================================================
// Remote service
// ============================================================================

/// Connection settings for the remote catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarthEngineConfig {
    /// Cloud project id used for all requests.
    pub project: String,
    /// Service-account key file, if not using ambient credentials.
    #[serde(default)]
    pub credentials: Option<PathBuf>,
}

impl EarthEngineConfig {
    /// Explicit configuration.
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            credentials: None,
        }
    }

    /// Set the credentials file.
    pub fn with_credentials(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials = Some(path.into());
        self
    }

    /// Resolve from explicit values, falling back to the environment.
    pub fn resolve(project: Option<String>, credentials: Option<PathBuf>) -> Result<Self> {
        Self::resolve_with(project, credentials, |key| std::env::var(key).ok())
    }

    /// Resolve with a custom variable lookup.
    pub fn resolve_with<F>(
        project: Option<String>,
        credentials: Option<PathBuf>,
        lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project = project
            .or_else(|| lookup(PROJECT_ENV))
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                CatalogError::Config(format!(
                    "a cloud project id is required; pass one explicitly or set {}",
                    PROJECT_ENV
                ))
            })?;
        let credentials = credentials.or_else(|| lookup(CREDENTIALS_ENV).map(PathBuf::from));
        Ok(Self {
            project,
            credentials,
        })
    }
}

// ============================================================================
// Downloader
// ============================================================================

fn default_scale() -> f64 {
    f64::from(NATIVE_SCALE_METERS)
}

fn default_dtype() -> DataType {
    DataType::Float32
}

fn default_max_tile_bytes() -> u64 {
    DEFAULT_MAX_TILE_BYTES
}

fn default_http_timeout_secs() -> u64 {
    300
}

/// Downloader defaults, loadable from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Remote service settings.
    #[serde(default)]
    pub earth_engine: Option<EarthEngineConfig>,
    /// Default output resolution in metres.
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Default output sample type.
    #[serde(default = "default_dtype")]
    pub dtype: DataType,
    /// Byte budget for a single tile export.
    #[serde(default = "default_max_tile_bytes")]
    pub max_tile_bytes: u64,
    /// Re-export tiles that already exist on disk.
    #[serde(default)]
    pub overwrite: bool,
    /// Merge tiles into one file after a fully successful download.
    #[serde(default)]
    pub merge_tiles: bool,
    /// Remove the tile directory after merging.
    #[serde(default)]
    pub delete_tiles: bool,
    /// Timeout for each HTTP download.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            earth_engine: None,
            scale: default_scale(),
            dtype: default_dtype(),
            max_tile_bytes: default_max_tile_bytes(),
            overwrite: false,
            merge_tiles: false,
            delete_tiles: false,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl DownloaderConfig {
    /// Parse from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&text)
    }

    /// Service settings: the configured values, with the environment filling
    /// in whatever is missing.
    pub fn earth_engine_config(&self) -> Result<EarthEngineConfig> {
        self.earth_engine_config_with(|key| std::env::var(key).ok())
    }

    /// [`DownloaderConfig::earth_engine_config`] with a custom variable lookup.
    pub fn earth_engine_config_with<F>(&self, lookup: F) -> Result<EarthEngineConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (project, credentials) = match &self.earth_engine {
            Some(config) => (Some(config.project.clone()), config.credentials.clone()),
            None => (None, None),
        };
        EarthEngineConfig::resolve_with(project, credentials, lookup)
    }

    /// HTTP timeout as a duration.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.scale < f64::from(NATIVE_SCALE_METERS) {
            return Err(CatalogError::Config(format!(
                "scale must be at least {} m, got {}",
                NATIVE_SCALE_METERS, self.scale
            )));
        }
        if self.max_tile_bytes == 0 {
            return Err(CatalogError::Config(
                "max_tile_bytes must be positive".to_string(),
            ));
        }
        if self.delete_tiles && !self.merge_tiles {
            return Err(CatalogError::Config(
                "delete_tiles requires merge_tiles".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_resolve_prefers_explicit_project() {
        let env: HashMap<&str, &str> = [(PROJECT_ENV, "from-env")].into_iter().collect();
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());
        let config =
            EarthEngineConfig::resolve_with(Some("explicit".to_string()), None, lookup).unwrap();
        assert_eq!(config.project, "explicit");
    }

    #[test]
    fn test_resolve_falls_back_to_env() {
        let env: HashMap<&str, &str> =
            [(PROJECT_ENV, "from-env"), (CREDENTIALS_ENV, "/keys/sa.json")]
                .into_iter()
                .collect();
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());
        let config = EarthEngineConfig::resolve_with(None, None, lookup).unwrap();
        assert_eq!(config.project, "from-env");
        assert_eq!(config.credentials, Some(PathBuf::from("/keys/sa.json")));
    }

    #[test]
    fn test_missing_project_names_env_var() {
        let err = EarthEngineConfig::resolve_with(None, None, |_| None).unwrap_err();
        assert!(matches!(err, CatalogError::Config(_)));
        assert!(err.to_string().contains(PROJECT_ENV));

        let err = EarthEngineConfig::resolve_with(Some("  ".to_string()), None, |_| None);
        assert!(err.is_err());
    }

    #[test]
    fn test_downloader_config_defaults() {
        let config = DownloaderConfig::from_yaml("{}").unwrap();
        assert_eq!(config, DownloaderConfig::default());
        assert_eq!(config.scale, 10.0);
        assert_eq!(config.dtype, DataType::Float32);
        assert_eq!(config.http_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_downloader_config_yaml() {
        let yaml = r#"
earth_engine:
  project: my-project
scale: 30
dtype: uint8
merge_tiles: true
delete_tiles: true
"#;
        let config = DownloaderConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            config.earth_engine,
            Some(EarthEngineConfig::new("my-project"))
        );
        assert_eq!(config.scale, 30.0);
        assert_eq!(config.dtype, DataType::Uint8);
        assert!(config.merge_tiles && config.delete_tiles);
        assert!(!config.overwrite);
    }

    #[test]
    fn test_service_settings_from_file_and_env() {
        let env: HashMap<&str, &str> =
            [(PROJECT_ENV, "from-env"), (CREDENTIALS_ENV, "/keys/sa.json")]
                .into_iter()
                .collect();
        let lookup = |k: &str| env.get(k).map(|v| v.to_string());

        // The file names the project, the environment supplies credentials
        let config = DownloaderConfig::from_yaml("earth_engine:\n  project: from-file\n").unwrap();
        let service = config.earth_engine_config_with(lookup).unwrap();
        assert_eq!(service.project, "from-file");
        assert_eq!(service.credentials, Some(PathBuf::from("/keys/sa.json")));

        let service = DownloaderConfig::default()
            .earth_engine_config_with(lookup)
            .unwrap();
        assert_eq!(service.project, "from-env");

        let err = DownloaderConfig::default()
            .earth_engine_config_with(|_| None)
            .unwrap_err();
        assert!(err.to_string().contains(PROJECT_ENV));
    }

    #[test]
    fn test_downloader_config_rejects_invalid() {
        assert!(DownloaderConfig::from_yaml("scale: 5").is_err());
        assert!(DownloaderConfig::from_yaml("dtype: uint16").is_err());
        assert!(DownloaderConfig::from_yaml("delete_tiles: true").is_err());
        assert!(matches!(
            DownloaderConfig::from_yaml("scale: [1, 2]"),
            Err(CatalogError::Yaml(_))
        ));
    }
}
