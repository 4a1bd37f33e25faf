//! Windows bitmaps

use arcbrowse_core::archive::Resource;
use arcbrowse_core::entry::kind;
use arcbrowse_core::fs::FileSystem;
use arcbrowse_core::image::{ImageData, ImageFormat, ImageMetaData, ImageStream};
use arcbrowse_core::{Error, Result};
use std::io::BufReader;

const TAG: &str = "BMP";
const FILE_HEADER_SIZE: u32 = 14;
const INFO_HEADER_SIZE: u32 = 40;
const CORE_HEADER_SIZE: u32 = 12;

/// Bytes per stored row, padded to four bytes.
pub(crate) const fn row_stride(width: u32, bpp: u16) -> usize {
    ((width as usize * bpp as usize + 31) / 32) * 4
}

/// Pixel bytes of a top-down bitmap with `palette_len` bytes of palette.
///
/// `None` when either dimension does not fit an `i32` or the whole file
/// would not fit the signed 32-bit size fields of the headers.
pub(crate) fn pixel_data_size(
    width: u32,
    height: u32,
    bpp: u16,
    palette_len: usize,
) -> Option<u32> {
    let limit = u64::from(i32::MAX.unsigned_abs());
    if u64::from(width) > limit || u64::from(height) > limit {
        return None;
    }
    let stride = (u64::from(width) * u64::from(bpp)).div_ceil(32) * 4;
    let image_size = stride.checked_mul(u64::from(height))?;
    let data_offset = u64::from(FILE_HEADER_SIZE + INFO_HEADER_SIZE)
        .checked_add(u64::try_from(palette_len).ok()?)?;
    let total = image_size.checked_add(data_offset)?;
    if total > limit {
        return None;
    }
    u32::try_from(image_size).ok()
}

/// `BITMAPFILEHEADER` + `BITMAPINFOHEADER` for top-down pixel rows.
///
/// `palette_len` bytes of palette are expected right after the header.
///
/// # Errors
///
/// Returns `Error::InvalidFormat` when the dimensions do not fit a bitmap.
pub(crate) fn synthesize_header(
    width: u32,
    height: u32,
    bpp: u16,
    palette_len: usize,
) -> Result<Vec<u8>> {
    let too_large = || Error::invalid(TAG, format!("{width}x{height} at {bpp} bpp is too large"));
    let image_size = pixel_data_size(width, height, bpp, palette_len).ok_or_else(too_large)?;
    // Both fit once pixel_data_size has bounded the total below i32::MAX.
    let data_offset = FILE_HEADER_SIZE + INFO_HEADER_SIZE + palette_len as u32;
    let colors = (palette_len / 4) as u32;
    let width = i32::try_from(width).map_err(|_| too_large())?;
    let height = i32::try_from(height).map_err(|_| too_large())?;

    let mut header = Vec::with_capacity(data_offset as usize);
    header.extend_from_slice(b"BM");
    header.extend_from_slice(&(data_offset + image_size).to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&data_offset.to_le_bytes());
    header.extend_from_slice(&INFO_HEADER_SIZE.to_le_bytes());
    header.extend_from_slice(&width.to_le_bytes());
    header.extend_from_slice(&(-height).to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&bpp.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&image_size.to_le_bytes());
    header.extend_from_slice(&2835i32.to_le_bytes());
    header.extend_from_slice(&2835i32.to_le_bytes());
    header.extend_from_slice(&colors.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    Ok(header)
}

/// Windows and OS/2 bitmap images
#[derive(Debug, Default)]
pub struct BmpFormat;

impl BmpFormat {
    /// New format instance.
    pub const fn new() -> Self {
        Self
    }
}

impl Resource for BmpFormat {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn description(&self) -> &'static str {
        "Windows bitmap"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["bmp"]
    }

    fn kind(&self) -> &'static str {
        kind::IMAGE
    }
}

impl ImageFormat for BmpFormat {
    fn read_metadata(&self, stream: &mut ImageStream<'_>) -> Result<Option<ImageMetaData>> {
        if stream.len() < u64::from(FILE_HEADER_SIZE + CORE_HEADER_SIZE) {
            return Ok(None);
        }
        let header = stream.read_header(FILE_HEADER_SIZE as usize + 4)?;
        if &header[..2] != b"BM" {
            return Ok(None);
        }
        let info_size = u32::from_le_bytes([header[14], header[15], header[16], header[17]]);

        let (width, height, bpp) = match info_size {
            CORE_HEADER_SIZE => {
                let width = u32::from(stream.read_u16()?);
                let height = u32::from(stream.read_u16()?);
                stream.read_u16()?;
                (width, height, stream.read_u16()?)
            }
            INFO_HEADER_SIZE..=124 => {
                let width = stream.read_i32()?;
                let height = stream.read_i32()?;
                stream.read_u16()?;
                let bpp = stream.read_u16()?;
                if width <= 0 {
                    return Ok(None);
                }
                (width as u32, height.unsigned_abs(), bpp)
            }
            _ => return Ok(None),
        };
        if width == 0 || height == 0 || !matches!(bpp, 1 | 4 | 8 | 16 | 24 | 32) {
            return Ok(None);
        }

        Ok(Some(ImageMetaData {
            width,
            height,
            bpp: u32::from(bpp),
            ..ImageMetaData::default()
        }))
    }

    fn read(
        &self,
        stream: &mut ImageStream<'_>,
        meta: &ImageMetaData,
        _source: &dyn FileSystem,
    ) -> Result<ImageData> {
        stream.set_position(0)?;
        let image = image::load(BufReader::new(stream), image::ImageFormat::Bmp)?;
        Ok(ImageData::with_metadata(image, meta))
    }
}
