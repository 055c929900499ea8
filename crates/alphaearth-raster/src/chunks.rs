//! Sample decoding for strip and tile layouts.
//!
//! The `tiff` decoder only expands images it can assign a colour type to,
//! which excludes BlackIsZero data with more than one sample per pixel. Band
//! stacks are therefore decoded here from the layout tags, with the decoder
//! used only to parse the IFD.

use std::io::{Read, Seek};

use flate2::read::ZlibDecoder;
use tiff::decoder::ifd::Value;
use tiff::decoder::Decoder;
use tiff::tags::Tag;
use weezl::{decode::Decoder as LzwDecoder, BitOrder};

use crate::{DataType, RasterData, RasterError, Result};

const COMPRESSION_NONE: u16 = 1;
const COMPRESSION_LZW: u16 = 5;
const COMPRESSION_DEFLATE: u16 = 8;
const COMPRESSION_OLD_DEFLATE: u16 = 32946;

const PREDICTOR_NONE: u16 = 1;
const PREDICTOR_HORIZONTAL: u16 = 2;

const PLANAR_CHUNKY: u16 = 1;
const PLANAR_SEPARATE: u16 = 2;

const SAMPLE_FORMAT_UINT: u16 = 1;
const SAMPLE_FORMAT_IEEEFP: u16 = 3;

/// Byte order of the sample data, taken from the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn from_header(bytes: &[u8]) -> Result<Self> {
        match bytes.get(..2) {
            Some(b"II") => Ok(Endian::Little),
            Some(b"MM") => Ok(Endian::Big),
            _ => Err(RasterError::InvalidGeoTiff(
                "missing TIFF byte order mark".to_string(),
            )),
        }
    }
}

/// How the image is cut into independently stored chunks.
#[derive(Debug, Clone, PartialEq)]
struct ChunkLayout {
    chunk_width: usize,
    chunk_height: usize,
    /// Tiles are padded to full size, strips are not.
    tiled: bool,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
}

/// Read every tag value as an unsigned integer, accepting scalars as one-element lists.
fn find_unsigned_vec<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> Result<Option<Vec<u64>>> {
    match decoder.find_tag(tag)? {
        None => Ok(None),
        Some(Value::List(values)) => Ok(Some(
            values
                .into_iter()
                .map(Value::into_u64)
                .collect::<tiff::TiffResult<Vec<u64>>>()?,
        )),
        Some(value) => Ok(Some(vec![value.into_u64()?])),
    }
}

fn find_u16<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag, default: u16) -> Result<u16> {
    Ok(decoder.find_tag_unsigned::<u16>(tag)?.unwrap_or(default))
}

/// A tag repeated per sample must carry a single value for all of them.
fn uniform<R: Read + Seek>(decoder: &mut Decoder<R>, tag: Tag, default: u64) -> Result<u64> {
    let values = find_unsigned_vec(decoder, tag)?.unwrap_or_else(|| vec![default]);
    match values.split_first() {
        Some((&first, rest)) if rest.iter().all(|&v| v == first) => Ok(first),
        Some(_) => Err(RasterError::UnsupportedDataType(format!(
            "mixed {:?} values across bands",
            tag
        ))),
        None => Ok(default),
    }
}

fn sample_dtype(format: u64, bits: u64) -> Result<DataType> {
    let name = match (format as u16, bits) {
        (SAMPLE_FORMAT_UINT, 8) => return Ok(DataType::Uint8),
        (SAMPLE_FORMAT_IEEEFP, 32) => return Ok(DataType::Float32),
        (SAMPLE_FORMAT_IEEEFP, 64) => return Ok(DataType::Float64),
        (SAMPLE_FORMAT_UINT, n) => format!("uint{}", n),
        (2, n) => format!("int{}", n),
        (SAMPLE_FORMAT_IEEEFP, n) => format!("float{}", n),
        (f, n) => format!("sample format {} with {} bits", f, n),
    };
    Err(RasterError::UnsupportedDataType(name))
}

fn read_layout<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    width: usize,
    height: usize,
) -> Result<ChunkLayout> {
    if let Some(offsets) = find_unsigned_vec(decoder, Tag::TileOffsets)? {
        let byte_counts = find_unsigned_vec(decoder, Tag::TileByteCounts)?
            .ok_or_else(|| RasterError::InvalidGeoTiff("missing TileByteCounts".to_string()))?;
        let chunk_width = decoder.get_tag_unsigned::<usize>(Tag::TileWidth)?;
        let chunk_height = decoder.get_tag_unsigned::<usize>(Tag::TileLength)?;
        return Ok(ChunkLayout {
            chunk_width,
            chunk_height,
            tiled: true,
            offsets,
            byte_counts,
        });
    }

    let offsets = find_unsigned_vec(decoder, Tag::StripOffsets)?
        .ok_or_else(|| RasterError::InvalidGeoTiff("missing StripOffsets".to_string()))?;
    let byte_counts = find_unsigned_vec(decoder, Tag::StripByteCounts)?
        .ok_or_else(|| RasterError::InvalidGeoTiff("missing StripByteCounts".to_string()))?;
    let rows_per_strip = decoder
        .find_tag_unsigned::<u64>(Tag::RowsPerStrip)?
        .map_or(height, |rows| (rows as usize).min(height));
    Ok(ChunkLayout {
        chunk_width: width,
        chunk_height: rows_per_strip,
        tiled: false,
        offsets,
        byte_counts,
    })
}

fn decompress(compression: u16, data: &[u8], index: usize) -> Result<Vec<u8>> {
    let corrupt =
        |e: String| RasterError::InvalidGeoTiff(format!("corrupt chunk {}: {}", index, e));
    match compression {
        COMPRESSION_NONE => Ok(data.to_vec()),
        COMPRESSION_DEFLATE | COMPRESSION_OLD_DEFLATE => {
            let mut out = Vec::new();
            ZlibDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| corrupt(e.to_string()))?;
            Ok(out)
        }
        COMPRESSION_LZW => LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8)
            .decode(data)
            .map_err(|e| corrupt(e.to_string())),
        other => Err(RasterError::UnsupportedDataType(format!(
            "TIFF compression {}",
            other
        ))),
    }
}

/// Undo horizontal differencing of 8-bit samples, row by row.
fn undo_horizontal_predictor(chunk: &mut [u8], row_len: usize, stride: usize) {
    for row in chunk.chunks_mut(row_len) {
        for i in stride..row.len() {
            row[i] = row[i].wrapping_add(row[i - stride]);
        }
    }
}

fn typed(dtype: DataType, raw: Vec<u8>, endian: Endian) -> RasterData {
    match dtype {
        DataType::Uint8 => RasterData::U8(raw),
        DataType::Float32 => RasterData::F32(
            raw.chunks_exact(4)
                .map(|b| {
                    let b = [b[0], b[1], b[2], b[3]];
                    match endian {
                        Endian::Little => f32::from_le_bytes(b),
                        Endian::Big => f32::from_be_bytes(b),
                    }
                })
                .collect(),
        ),
        DataType::Float64 => RasterData::F64(
            raw.chunks_exact(8)
                .map(|b| {
                    let b = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
                    match endian {
                        Endian::Little => f64::from_le_bytes(b),
                        Endian::Big => f64::from_be_bytes(b),
                    }
                })
                .collect(),
        ),
    }
}

/// Decode all samples of the current image into pixel-interleaved order.
///
/// `file` holds the complete TIFF the decoder was opened on.
pub(crate) fn decode_samples<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    file: &[u8],
    width: usize,
    height: usize,
) -> Result<RasterData> {
    let endian = Endian::from_header(file)?;
    let samples = find_u16(decoder, Tag::SamplesPerPixel, 1)? as usize;
    let bits = uniform(decoder, Tag::BitsPerSample, 1)?;
    let format = uniform(decoder, Tag::SampleFormat, u64::from(SAMPLE_FORMAT_UINT))?;
    let dtype = sample_dtype(format, bits)?;
    let compression = find_u16(decoder, Tag::Compression, COMPRESSION_NONE)?;
    let predictor = find_u16(decoder, Tag::Predictor, PREDICTOR_NONE)?;
    let planar = find_u16(decoder, Tag::PlanarConfiguration, PLANAR_CHUNKY)?;
    let layout = read_layout(decoder, width, height)?;

    match predictor {
        PREDICTOR_NONE => {}
        PREDICTOR_HORIZONTAL if dtype == DataType::Uint8 => {}
        other => {
            return Err(RasterError::UnsupportedDataType(format!(
                "TIFF predictor {} for {}",
                other, dtype
            )))
        }
    }
    if samples == 0 || layout.chunk_width == 0 || layout.chunk_height == 0 {
        return Err(RasterError::InvalidGeoTiff(
            "zero samples or chunk size".to_string(),
        ));
    }

    // Samples stored together in one chunk
    let (planes, chunk_samples) = match planar {
        PLANAR_CHUNKY => (1, samples),
        PLANAR_SEPARATE => (samples, 1),
        other => {
            return Err(RasterError::InvalidGeoTiff(format!(
                "unknown planar configuration {}",
                other
            )))
        }
    };

    let sample_bytes = dtype.size_bytes();
    let pixel_bytes = samples * sample_bytes;
    let chunk_pixel_bytes = chunk_samples * sample_bytes;
    let across = width.div_ceil(layout.chunk_width);
    let down = height.div_ceil(layout.chunk_height);
    let expected = across * down * planes;
    if layout.offsets.len() < expected || layout.byte_counts.len() < expected {
        return Err(RasterError::InvalidGeoTiff(format!(
            "expected {} chunks, found {} offsets and {} byte counts",
            expected,
            layout.offsets.len(),
            layout.byte_counts.len()
        )));
    }

    let total = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(pixel_bytes))
        .ok_or_else(|| RasterError::InvalidRaster("image size overflows".to_string()))?;
    let mut raw = vec![0u8; total];

    for plane in 0..planes {
        for cy in 0..down {
            for cx in 0..across {
                let index = plane * across * down + cy * across + cx;
                let start = layout.offsets[index] as usize;
                let end = start.saturating_add(layout.byte_counts[index] as usize);
                let stored = file.get(start..end).ok_or_else(|| {
                    RasterError::InvalidGeoTiff(format!("chunk {} lies outside the file", index))
                })?;
                let mut chunk = decompress(compression, stored, index)?;

                let x0 = cx * layout.chunk_width;
                let y0 = cy * layout.chunk_height;
                let cols = layout.chunk_width.min(width - x0);
                let rows = layout.chunk_height.min(height - y0);
                let row_bytes = layout.chunk_width * chunk_pixel_bytes;
                let stored_rows = if layout.tiled { layout.chunk_height } else { rows };
                if chunk.len() < stored_rows * row_bytes {
                    return Err(RasterError::InvalidGeoTiff(format!(
                        "chunk {} holds {} bytes, expected {}",
                        index,
                        chunk.len(),
                        stored_rows * row_bytes
                    )));
                }
                if predictor == PREDICTOR_HORIZONTAL {
                    undo_horizontal_predictor(
                        &mut chunk[..stored_rows * row_bytes],
                        row_bytes,
                        chunk_samples,
                    );
                }

                for r in 0..rows {
                    let src_row = &chunk[r * row_bytes..r * row_bytes + cols * chunk_pixel_bytes];
                    let dst_pixel = (y0 + r) * width + x0;
                    if planes == 1 {
                        let dst = dst_pixel * pixel_bytes;
                        raw[dst..dst + src_row.len()].copy_from_slice(src_row);
                    } else {
                        for (c, sample) in src_row.chunks_exact(sample_bytes).enumerate() {
                            let dst = (dst_pixel + c) * pixel_bytes + plane * sample_bytes;
                            raw[dst..dst + sample_bytes].copy_from_slice(sample);
                        }
                    }
                }
            }
        }
    }

    Ok(typed(dtype, raw, endian))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tiff::encoder::TiffEncoder;

    /// Encode a chunky or planar image split into strips of `rows_per_strip`.
    #[allow(clippy::too_many_arguments)]
    fn strip_tiff(
        width: u32,
        height: u32,
        samples: u16,
        rows_per_strip: u32,
        planar: u16,
        strips: &[Vec<u8>],
        compression: u16,
        predictor: u16,
    ) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
            let mut dir = encoder.new_directory().unwrap();
            dir.write_tag(Tag::ImageWidth, width).unwrap();
            dir.write_tag(Tag::ImageLength, height).unwrap();
            let bits = vec![8u16; samples as usize];
            dir.write_tag(Tag::BitsPerSample, bits.as_slice()).unwrap();
            dir.write_tag(Tag::Compression, compression).unwrap();
            dir.write_tag(Tag::PhotometricInterpretation, 1u16).unwrap();
            dir.write_tag(Tag::SamplesPerPixel, samples).unwrap();
            dir.write_tag(Tag::RowsPerStrip, rows_per_strip).unwrap();
            dir.write_tag(Tag::PlanarConfiguration, planar).unwrap();
            dir.write_tag(Tag::Predictor, predictor).unwrap();

            let mut offsets = Vec::new();
            let mut counts = Vec::new();
            for strip in strips {
                offsets.push(dir.write_data(strip.as_slice()).unwrap() as u32);
                counts.push(strip.len() as u32);
            }
            dir.write_tag(Tag::StripOffsets, offsets.as_slice()).unwrap();
            dir.write_tag(Tag::StripByteCounts, counts.as_slice()).unwrap();
            dir.finish().unwrap();
        }
        buffer.into_inner()
    }

    fn decode(file: &[u8]) -> Result<RasterData> {
        let mut decoder = Decoder::new(Cursor::new(file))?;
        let (width, height) = decoder.dimensions()?;
        decode_samples(&mut decoder, file, width as usize, height as usize)
    }

    #[test]
    fn test_decodes_chunky_strips() {
        // 2x3 pixels, 3 bands, strips of two rows
        let pixels: Vec<u8> = (0..18).collect();
        let strips = vec![pixels[..12].to_vec(), pixels[12..].to_vec()];
        let file = strip_tiff(2, 3, 3, 2, PLANAR_CHUNKY, &strips, COMPRESSION_NONE, 1);
        assert_eq!(decode(&file).unwrap(), RasterData::U8(pixels));
    }

    #[test]
    fn test_decodes_separate_planes() {
        // 2x1 pixels, 2 bands stored one plane per strip
        let strips = vec![vec![1, 2], vec![10, 20]];
        let file = strip_tiff(2, 1, 2, 1, PLANAR_SEPARATE, &strips, COMPRESSION_NONE, 1);
        assert_eq!(decode(&file).unwrap(), RasterData::U8(vec![1, 10, 2, 20]));
    }

    #[test]
    fn test_decodes_deflate_with_horizontal_predictor() {
        // Two pixels of two bands: [5, 7], [6, 10] differenced along the row
        let differenced = vec![5u8, 7, 1, 3];
        let mut zlib = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        zlib.write_all(&differenced).unwrap();
        let compressed = zlib.finish().unwrap();

        let file = strip_tiff(
            2,
            1,
            2,
            1,
            PLANAR_CHUNKY,
            &[compressed],
            COMPRESSION_DEFLATE,
            PREDICTOR_HORIZONTAL,
        );
        assert_eq!(decode(&file).unwrap(), RasterData::U8(vec![5, 7, 6, 10]));
    }

    #[test]
    fn test_truncated_chunk_is_rejected() {
        let file = strip_tiff(2, 2, 2, 2, PLANAR_CHUNKY, &[vec![0; 5]], COMPRESSION_NONE, 1);
        assert!(matches!(decode(&file), Err(RasterError::InvalidGeoTiff(_))));
    }

    #[test]
    fn test_unknown_compression_is_unsupported() {
        let file = strip_tiff(1, 1, 2, 1, PLANAR_CHUNKY, &[vec![0; 2]], 32773, 1);
        assert!(matches!(
            decode(&file),
            Err(RasterError::UnsupportedDataType(_))
        ));
    }

    #[test]
    fn test_sample_dtype_names_unsupported_types() {
        assert_eq!(sample_dtype(1, 8).unwrap(), DataType::Uint8);
        assert_eq!(sample_dtype(3, 64).unwrap(), DataType::Float64);
        match sample_dtype(1, 16) {
            Err(RasterError::UnsupportedDataType(name)) => assert_eq!(name, "uint16"),
            other => panic!("expected unsupported type, got {:?}", other),
        }
    }
}
