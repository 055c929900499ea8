//! In-memory multi-band raster with GeoTIFF I/O.

use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Seek, Write};
use std::path::Path;

use alphaearth_codec::{dequantize_slice, quantize_slice};
use tiff::decoder::{Decoder, Limits};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

use crate::chunks::decode_samples;
use crate::{DataType, GeoTransform, RasterError, RasterProfile, Result};

// GeoTIFF tag IDs
const MODEL_PIXEL_SCALE_TAG: u16 = 33550;
const MODEL_TIEPOINT_TAG: u16 = 33922;
const MODEL_TRANSFORMATION_TAG: u16 = 34264;
const GEO_KEY_DIRECTORY_TAG: u16 = 34735;
const GDAL_NODATA_TAG: u16 = 42113;

// GeoKey IDs and values
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Byte value used as nodata in quantized rasters. Valid codes are 1..=255.
pub const QUANTIZED_NODATA: u8 = 0;

/// Resolve a numeric tag to the variant the decoder indexes it under.
fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// EPSG 4000-4999 are geographic (lat/lon) CRSs, everything else is written as projected.
fn is_geographic(epsg: u16) -> bool {
    (4000..5000).contains(&epsg)
}

/// Pixel-interleaved, row-major samples (north row first).
#[derive(Debug, Clone, PartialEq)]
pub enum RasterData {
    /// 8-bit unsigned samples.
    U8(Vec<u8>),
    /// 32-bit float samples.
    F32(Vec<f32>),
    /// 64-bit float samples.
    F64(Vec<f64>),
}

impl RasterData {
    /// Data type of the samples.
    pub fn dtype(&self) -> DataType {
        match self {
            RasterData::U8(_) => DataType::Uint8,
            RasterData::F32(_) => DataType::Float32,
            RasterData::F64(_) => DataType::Float64,
        }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            RasterData::U8(v) => v.len(),
            RasterData::F32(v) => v.len(),
            RasterData::F64(v) => v.len(),
        }
    }

    /// Whether there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at a flat index, widened to f64.
    pub fn sample(&self, index: usize) -> Option<f64> {
        match self {
            RasterData::U8(v) => v.get(index).map(|&s| f64::from(s)),
            RasterData::F32(v) => v.get(index).map(|&s| f64::from(s)),
            RasterData::F64(v) => v.get(index).copied(),
        }
    }
}

/// A georeferenced multi-band raster held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    profile: RasterProfile,
    data: RasterData,
}

impl Raster {
    /// Build a raster, checking that the data matches the profile.
    pub fn new(mut profile: RasterProfile, data: RasterData) -> Result<Self> {
        if profile.width == 0 || profile.height == 0 || profile.bands == 0 {
            return Err(RasterError::InvalidRaster(format!(
                "zero-sized raster {}x{}x{}",
                profile.width, profile.height, profile.bands
            )));
        }
        if !(profile.transform.pixel_width > 0.0 && profile.transform.pixel_height > 0.0) {
            return Err(RasterError::InvalidRaster(
                "pixel size must be positive".to_string(),
            ));
        }
        if data.len() != profile.sample_count() {
            return Err(RasterError::DataLength {
                expected: profile.sample_count(),
                actual: data.len(),
            });
        }
        profile.dtype = data.dtype();
        Ok(Self { profile, data })
    }

    /// Load a raster from a GeoTIFF file.
    ///
    /// The whole file is read into memory and the handle released before
    /// decoding starts.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let mut decoder = Decoder::new(Cursor::new(bytes.as_slice()))?;

        // Per-band tag lists of 64-band tiles exceed the default IFD limits
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 1024 * 1024 * 1024; // 1 GB
        limits.intermediate_buffer_size = 1024 * 1024 * 1024; // 1 GB
        limits.ifd_value_size = 1024 * 1024 * 1024;
        decoder = decoder.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);
        let transform = Self::read_geotransform(&mut decoder)?;
        let crs = Self::read_epsg(&mut decoder);
        let nodata = Self::read_nodata_value(&mut decoder);
        let data = decode_samples(&mut decoder, &bytes, width, height)?;

        let pixels = width * height;
        if pixels == 0 || data.len() % pixels != 0 {
            return Err(RasterError::InvalidGeoTiff(format!(
                "{} samples do not fill a {}x{} grid",
                data.len(),
                width,
                height
            )));
        }
        let bands = data.len() / pixels;

        debug!(
            path = %path.display(),
            width,
            height,
            bands,
            dtype = %data.dtype(),
            "Opened raster"
        );

        let profile = RasterProfile {
            width,
            height,
            bands,
            dtype: data.dtype(),
            transform,
            crs,
            nodata,
        };
        Self::new(profile, data)
    }

    /// Read the affine transform from GeoTIFF tags.
    fn read_geotransform<R: std::io::Read + std::io::Seek>(
        decoder: &mut Decoder<R>,
    ) -> Result<GeoTransform> {
        let tiepoint = decoder.get_tag_f64_vec(geo_tag(MODEL_TIEPOINT_TAG));
        let pixel_scale = decoder.get_tag_f64_vec(geo_tag(MODEL_PIXEL_SCALE_TAG));

        if let (Ok(tiepoint), Ok(scale)) = (tiepoint, pixel_scale) {
            if tiepoint.len() >= 6 && scale.len() >= 2 {
                // Tiepoint format: [i, j, k, x, y, z], raster point (i, j) sits at world (x, y)
                let (i, j) = (tiepoint[0], tiepoint[1]);
                let (x, y) = (tiepoint[3], tiepoint[4]);
                let (scale_x, scale_y) = (scale[0], scale[1]);
                return Ok(GeoTransform::new(
                    x - i * scale_x,
                    y + j * scale_y,
                    scale_x,
                    scale_y,
                ));
            }
        }

        // Fallback: 4x4 row-major model transformation matrix
        if let Ok(matrix) = decoder.get_tag_f64_vec(geo_tag(MODEL_TRANSFORMATION_TAG)) {
            if matrix.len() >= 8 {
                if matrix[1] != 0.0 || matrix[4] != 0.0 {
                    return Err(RasterError::InvalidGeoTiff(
                        "rotated transforms are not supported".to_string(),
                    ));
                }
                return Ok(GeoTransform::new(matrix[3], matrix[7], matrix[0], -matrix[5]));
            }
        }

        Err(RasterError::InvalidGeoTiff(
            "missing ModelTiepoint/ModelPixelScale or ModelTransformation tags".to_string(),
        ))
    }

    /// Read the EPSG code from the GeoKey directory, if present.
    fn read_epsg<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<u16> {
        let keys = decoder
            .get_tag_u16_vec(geo_tag(GEO_KEY_DIRECTORY_TAG))
            .ok()?;
        // Header: [version, revision, minor, count], then [id, location, count, value] per key
        let count = *keys.get(3)? as usize;
        let mut geographic = None;
        for entry in keys.get(4..)?.chunks_exact(4).take(count) {
            let (id, location, value) = (entry[0], entry[1], entry[3]);
            if location != 0 {
                continue;
            }
            match id {
                PROJECTED_CS_TYPE_GEO_KEY => return Some(value),
                GEOGRAPHIC_TYPE_GEO_KEY => geographic = Some(value),
                _ => {}
            }
        }
        geographic
    }

    /// Try to read the no-data value from GDAL_NODATA tag.
    fn read_nodata_value<R: std::io::Read + std::io::Seek>(
        decoder: &mut Decoder<R>,
    ) -> Option<f64> {
        // GDAL_NODATA is stored as an ASCII string
        let nodata_str = decoder
            .get_tag_ascii_string(geo_tag(GDAL_NODATA_TAG))
            .ok()?;
        nodata_str.trim_matches('\0').trim().parse().ok()
    }

    /// Raster metadata.
    pub fn profile(&self) -> &RasterProfile {
        &self.profile
    }

    /// Raster samples.
    pub fn data(&self) -> &RasterData {
        &self.data
    }

    /// Split into profile and samples.
    pub fn into_parts(self) -> (RasterProfile, RasterData) {
        (self.profile, self.data)
    }

    /// All band values of one pixel, or `None` outside the grid.
    pub fn pixel(&self, col: usize, row: usize) -> Option<Vec<f64>> {
        if col >= self.profile.width || row >= self.profile.height {
            return None;
        }
        let bands = self.profile.bands;
        let start = (row * self.profile.width + col) * bands;
        (start..start + bands).map(|i| self.data.sample(i)).collect()
    }

    /// Write to a GeoTIFF file, replacing it if it exists.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Write to a temporary file beside `path`, then rename it into place.
    ///
    /// A failed or interrupted write never leaves a truncated file at `path`.
    /// The parent directory must already exist.
    pub fn write_atomic<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(".alphaearth-")
            .suffix(".tif.partial")
            .tempfile_in(parent)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            self.write_to(&mut writer)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| RasterError::Io(e.error))?;
        Ok(())
    }

    /// Encode as an uncompressed, pixel-interleaved GeoTIFF with a single strip.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let profile = &self.profile;
        let bands = profile.bands;
        let dtype = self.data.dtype();

        let width = u32::try_from(profile.width)
            .map_err(|_| RasterError::InvalidRaster("width exceeds u32".to_string()))?;
        let height = u32::try_from(profile.height)
            .map_err(|_| RasterError::InvalidRaster("height exceeds u32".to_string()))?;
        let samples_per_pixel = u16::try_from(bands)
            .map_err(|_| RasterError::InvalidRaster("too many bands".to_string()))?;
        let strip_bytes = u32::try_from(self.data.len() * dtype.size_bytes()).map_err(|_| {
            RasterError::InvalidRaster("raster exceeds the 4 GB single-strip limit".to_string())
        })?;

        let mut encoder = TiffEncoder::new(writer)?;
        let mut dir = encoder.new_directory()?;

        dir.write_tag(Tag::ImageWidth, width)?;
        dir.write_tag(Tag::ImageLength, height)?;
        let bits_per_sample = vec![dtype.bits_per_sample(); bands];
        dir.write_tag(Tag::BitsPerSample, bits_per_sample.as_slice())?;
        dir.write_tag(Tag::Compression, 1u16)?;
        // BlackIsZero; multi-band data has no colour meaning
        dir.write_tag(Tag::PhotometricInterpretation, 1u16)?;
        dir.write_tag(Tag::SamplesPerPixel, samples_per_pixel)?;
        dir.write_tag(Tag::RowsPerStrip, height)?;
        dir.write_tag(Tag::PlanarConfiguration, 1u16)?;
        let sample_format = vec![dtype.sample_format(); bands];
        dir.write_tag(Tag::SampleFormat, sample_format.as_slice())?;
        if bands > 1 {
            // Unspecified extra samples
            let extra_samples = vec![0u16; bands - 1];
            dir.write_tag(Tag::ExtraSamples, extra_samples.as_slice())?;
        }

        let t = &profile.transform;
        let pixel_scale = [t.pixel_width, t.pixel_height, 0.0];
        dir.write_tag(geo_tag(MODEL_PIXEL_SCALE_TAG), pixel_scale.as_slice())?;
        let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
        dir.write_tag(geo_tag(MODEL_TIEPOINT_TAG), tiepoint.as_slice())?;

        if let Some(epsg) = profile.crs {
            let (model_type, crs_key) = if is_geographic(epsg) {
                (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_GEO_KEY)
            } else {
                (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_GEO_KEY)
            };
            let geokeys: [u16; 16] = [
                1, 1, 0, 3, // version, revision, minor, key count
                GT_MODEL_TYPE_GEO_KEY, 0, 1, model_type,
                GT_RASTER_TYPE_GEO_KEY, 0, 1, RASTER_PIXEL_IS_AREA,
                crs_key, 0, 1, epsg,
            ];
            dir.write_tag(geo_tag(GEO_KEY_DIRECTORY_TAG), geokeys.as_slice())?;
        }

        if let Some(nodata) = profile.nodata {
            let text = nodata.to_string();
            dir.write_tag(geo_tag(GDAL_NODATA_TAG), text.as_str())?;
        }

        let strip_offset = match &self.data {
            RasterData::U8(v) => dir.write_data(v.as_slice())?,
            RasterData::F32(v) => dir.write_data(v.as_slice())?,
            RasterData::F64(v) => dir.write_data(v.as_slice())?,
        };
        let strip_offset = u32::try_from(strip_offset).map_err(|_| {
            RasterError::InvalidRaster("strip offset exceeds classic TIFF range".to_string())
        })?;
        dir.write_tag(Tag::StripOffsets, strip_offset)?;
        dir.write_tag(Tag::StripByteCounts, strip_bytes)?;

        dir.finish()?;
        Ok(())
    }

    /// Quantize a float embedding raster to bytes.
    ///
    /// Samples equal to the source nodata value (and NaN samples) become
    /// [`QUANTIZED_NODATA`], which is then recorded as the nodata value.
    pub fn quantized(&self) -> Result<Raster> {
        let nodata = self.profile.nodata;
        let mut bytes = match &self.data {
            RasterData::F32(v) => quantize_slice(v),
            RasterData::F64(v) => quantize_slice(v),
            RasterData::U8(_) => {
                return Err(RasterError::WrongDataType {
                    expected: "floating-point",
                    found: DataType::Uint8,
                })
            }
        };
        if let Some(nodata) = nodata {
            for (i, byte) in bytes.iter_mut().enumerate() {
                if self.data.sample(i).is_some_and(|s| s == nodata) {
                    *byte = QUANTIZED_NODATA;
                }
            }
        }

        let profile = RasterProfile {
            dtype: DataType::Uint8,
            nodata: nodata.map(|_| f64::from(QUANTIZED_NODATA)),
            ..self.profile.clone()
        };
        Raster::new(profile, RasterData::U8(bytes))
    }

    /// Dequantize a byte raster back to 32-bit float embeddings.
    ///
    /// Samples equal to the source nodata value become NaN.
    pub fn dequantized(&self) -> Result<Raster> {
        let RasterData::U8(bytes) = &self.data else {
            return Err(RasterError::WrongDataType {
                expected: "uint8",
                found: self.data.dtype(),
            });
        };
        let nodata = self.profile.nodata;
        let mut floats = dequantize_slice(bytes);
        if let Some(nodata) = nodata {
            for (value, &byte) in floats.iter_mut().zip(bytes) {
                if f64::from(byte) == nodata {
                    *value = f32::NAN;
                }
            }
        }

        let profile = RasterProfile {
            dtype: DataType::Float32,
            nodata: nodata.map(|_| f64::NAN),
            ..self.profile.clone()
        };
        Raster::new(profile, RasterData::F32(floats))
    }
}
