//! Portable Network Graphics
//!
//! Engines store the canvas position of sprites in the `oFFs` chunk, so
//! metadata scanning walks the ancillary chunks up to the first `IDAT`.

use arcbrowse_core::archive::Resource;
use arcbrowse_core::entry::kind;
use arcbrowse_core::fs::FileSystem;
use arcbrowse_core::image::{ImageData, ImageFormat, ImageMetaData, ImageStream};
use arcbrowse_core::Result;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::BufReader;
use tracing::trace;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Magic, IHDR length and type, width, height, depth, color type
const HEADER_SIZE: usize = 26;

/// Chunks scanned before giving up on `oFFs`
const MAX_CHUNKS: usize = 64;

/// PNG images
#[derive(Debug, Default)]
pub struct PngFormat;

impl PngFormat {
    /// New format instance.
    pub const fn new() -> Self {
        Self
    }
}

fn channels(color_type: u8) -> Option<u32> {
    match color_type {
        0 | 3 => Some(1),
        2 => Some(3),
        4 => Some(2),
        6 => Some(4),
        _ => None,
    }
}

/// Position from an `oFFs` chunk, if present before the image data.
fn read_offsets(stream: &mut ImageStream<'_>) -> Result<Option<(i32, i32)>> {
    // Past IHDR data and its CRC
    stream.set_position(8 + 8 + 13 + 4)?;
    for _ in 0..MAX_CHUNKS {
        if stream.remaining() < 8 {
            break;
        }
        let length = ReadBytesExt::read_u32::<BigEndian>(&mut *stream)?;
        let chunk_type = stream.read_exact_bytes(4)?;
        trace!("PNG chunk {} ({} bytes)", String::from_utf8_lossy(&chunk_type), length);
        match chunk_type.as_slice() {
            b"oFFs" if length >= 8 => {
                let x = ReadBytesExt::read_i32::<BigEndian>(&mut *stream)?;
                let y = ReadBytesExt::read_i32::<BigEndian>(&mut *stream)?;
                return Ok(Some((x, y)));
            }
            b"IDAT" | b"IEND" => break,
            _ => stream.skip(u64::from(length) + 4)?,
        }
    }
    Ok(None)
}

impl Resource for PngFormat {
    fn tag(&self) -> &'static str {
        "PNG"
    }

    fn description(&self) -> &'static str {
        "Portable Network Graphics"
    }

    fn signature(&self) -> u32 {
        0x474E_5089
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["png"]
    }

    fn kind(&self) -> &'static str {
        kind::IMAGE
    }
}

impl ImageFormat for PngFormat {
    fn read_metadata(&self, stream: &mut ImageStream<'_>) -> Result<Option<ImageMetaData>> {
        if stream.len() < HEADER_SIZE as u64 {
            return Ok(None);
        }
        let header = stream.read_header(HEADER_SIZE)?;
        if header[..8] != PNG_MAGIC || &header[12..16] != b"IHDR" {
            return Ok(None);
        }
        let width = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);
        let height = u32::from_be_bytes([header[20], header[21], header[22], header[23]]);
        let depth = u32::from(header[24]);
        let Some(channels) = channels(header[25]) else {
            return Ok(None);
        };
        if width == 0 || height == 0 {
            return Ok(None);
        }

        // A damaged chunk after IHDR only costs the canvas position.
        let (offset_x, offset_y) = read_offsets(stream)
            .unwrap_or_else(|e| {
                trace!("PNG chunk scan stopped: {}", e);
                None
            })
            .unwrap_or_default();
        Ok(Some(ImageMetaData {
            width,
            height,
            offset_x,
            offset_y,
            bpp: depth * channels,
            file_name: None,
        }))
    }

    fn read(
        &self,
        stream: &mut ImageStream<'_>,
        meta: &ImageMetaData,
        _source: &dyn FileSystem,
    ) -> Result<ImageData> {
        stream.set_position(0)?;
        let image = image::load(BufReader::new(stream), image::ImageFormat::Png)?;
        Ok(ImageData::with_metadata(image, meta))
    }
}
