//! Constants describing the AlphaEarth annual embedding dataset.

use serde::Serialize;

use crate::{CatalogError, Result};

/// Catalog identifier of the annual embedding collection.
pub const DATASET_ID: &str = "GOOGLE/SATELLITE_EMBEDDING/V1/ANNUAL";

/// Number of embedding bands.
pub const NUM_BANDS: usize = 64;

/// First year with embeddings.
pub const FIRST_YEAR: i32 = 2017;

/// Last year with embeddings.
pub const LAST_YEAR: i32 = 2024;

/// Native resolution in metres.
pub const NATIVE_SCALE_METERS: u32 = 10;

/// Band name for an index, `A00`..`A63`.
pub fn band_name(index: usize) -> String {
    format!("A{:02}", index)
}

/// All band names in order.
pub fn band_names() -> Vec<String> {
    (0..NUM_BANDS).map(band_name).collect()
}

/// Check a requested band subset against the dataset.
pub fn validate_bands(bands: &[String]) -> Result<()> {
    if bands.is_empty() {
        return Err(CatalogError::Validation(
            "band list must not be empty".to_string(),
        ));
    }
    for band in bands {
        let known = band
            .strip_prefix('A')
            .filter(|digits| digits.len() == 2)
            .and_then(|digits| digits.parse::<usize>().ok())
            .is_some_and(|index| index < NUM_BANDS);
        if !known {
            return Err(CatalogError::Validation(format!(
                "unknown band '{}' (expected A00..A{:02})",
                band,
                NUM_BANDS - 1
            )));
        }
    }
    Ok(())
}

/// Summary of the dataset, as reported by [`crate::Downloader::info`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    /// Catalog identifier.
    pub dataset_id: &'static str,
    /// Number of bands.
    pub num_bands: usize,
    /// Band names.
    pub band_names: Vec<String>,
    /// Native resolution.
    pub resolution: &'static str,
    /// Years covered.
    pub temporal_coverage: String,
    /// Native and supported coordinate systems.
    pub coordinate_system: &'static str,
    /// Value range of each band.
    pub band_range: &'static str,
    /// Data licence.
    pub license: &'static str,
}

impl DatasetInfo {
    /// Info for the annual embedding collection.
    pub fn annual() -> Self {
        Self {
            dataset_id: DATASET_ID,
            num_bands: NUM_BANDS,
            band_names: band_names(),
            resolution: "10m",
            temporal_coverage: format!("{}-{} (annual)", FIRST_YEAR, LAST_YEAR),
            coordinate_system: "UTM (native), WGS84 supported",
            band_range: "-1 to 1 (unit vectors)",
            license: "CC-BY 4.0",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_names() {
        let names = band_names();
        assert_eq!(names.len(), 64);
        assert_eq!(names[0], "A00");
        assert_eq!(names[9], "A09");
        assert_eq!(names[63], "A63");
    }

    #[test]
    fn test_validate_bands() {
        assert!(validate_bands(&["A00".to_string(), "A63".to_string()]).is_ok());
        assert!(validate_bands(&["A64".to_string()]).is_err());
        assert!(validate_bands(&["B01".to_string()]).is_err());
        assert!(validate_bands(&["A1".to_string()]).is_err());
        assert!(validate_bands(&[]).is_err());
    }

    #[test]
    fn test_info() {
        let info = DatasetInfo::annual();
        assert_eq!(info.dataset_id, DATASET_ID);
        assert_eq!(info.temporal_coverage, "2017-2024 (annual)");
    }
}
