//! Split bitmaps
//!
//! Large backgrounds are cut in two files. `<base>.grp` holds the header
//! and the first rows, `<base>.gr2` holds the remaining rows.
//!
//! ```text
//! .grp  0x00 "GRP1"
//!       0x04 u32 width
//!       0x08 u32 height
//!       0x0C u16 bits per pixel
//!       0x0E u16 rows stored in this file
//!       0x10 palette (8 bpp: 256 BGRX entries)
//!            rows, top-down, padded to four bytes
//! .gr2  0x00 "GRP2", padded to 16 bytes
//!       0x10 remaining rows
//! ```

use crate::bmp::{pixel_data_size, row_stride, synthesize_header};
use arcbrowse_core::archive::Resource;
use arcbrowse_core::entry::kind;
use arcbrowse_core::fs::FileSystem;
use arcbrowse_core::image::{ImageData, ImageFormat, ImageMetaData, ImageStream};
use arcbrowse_core::stream::{ConcatStream, Segment};
use arcbrowse_core::{Error, Result};
use binrw::BinRead;
use std::io::BufReader;
use tracing::debug;

const TAG: &str = "GRP";
const HEADER_SIZE: u64 = 16;
const SIBLING_HEADER_SIZE: u64 = 16;
const PALETTE_SIZE: usize = 256 * 4;

#[derive(Debug, Clone, BinRead)]
#[brw(little, magic = b"GRP1")]
struct GrpHeader {
    width: u32,
    height: u32,
    bpp: u16,
    rows_here: u16,
}

impl GrpHeader {
    fn palette_len(&self) -> usize {
        if self.bpp == 8 { PALETTE_SIZE } else { 0 }
    }
}

/// Name of the file holding the rows missing from `name`.
pub fn sibling_name(name: &str) -> String {
    let stem_end = name
        .rfind('.')
        .filter(|&dot| !name[dot..].contains(['/', '\\']))
        .unwrap_or(name.len());
    format!("{}.gr2", &name[..stem_end])
}

/// Bitmaps split over a `.grp` and a `.gr2` file
#[derive(Debug, Default)]
pub struct GrpFormat;

impl GrpFormat {
    /// New format instance.
    pub const fn new() -> Self {
        Self
    }
}

impl Resource for GrpFormat {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn description(&self) -> &'static str {
        "Split bitmap"
    }

    fn signature(&self) -> u32 {
        u32::from_le_bytes(*b"GRP1")
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["grp"]
    }

    fn kind(&self) -> &'static str {
        kind::IMAGE
    }
}

impl ImageFormat for GrpFormat {
    fn read_metadata(&self, stream: &mut ImageStream<'_>) -> Result<Option<ImageMetaData>> {
        if stream.len() < HEADER_SIZE {
            return Ok(None);
        }
        stream.set_position(0)?;
        let Ok(header) = GrpHeader::read(stream) else {
            return Ok(None);
        };
        if header.width == 0
            || header.height == 0
            || u32::from(header.rows_here) > header.height
            || !matches!(header.bpp, 8 | 24 | 32)
            || pixel_data_size(header.width, header.height, header.bpp, header.palette_len())
                .is_none()
        {
            return Ok(None);
        }
        Ok(Some(ImageMetaData {
            width: header.width,
            height: header.height,
            bpp: u32::from(header.bpp),
            ..ImageMetaData::default()
        }))
    }

    fn read(
        &self,
        stream: &mut ImageStream<'_>,
        meta: &ImageMetaData,
        source: &dyn FileSystem,
    ) -> Result<ImageData> {
        stream.set_position(0)?;
        let header = GrpHeader::read(stream)?;
        if u32::from(header.rows_here) > header.height {
            return Err(Error::invalid(TAG, "more rows stored than the image holds"));
        }
        let bmp_header =
            synthesize_header(header.width, header.height, header.bpp, header.palette_len())?;
        let stride = row_stride(header.width, header.bpp);
        let palette = stream.read_exact_bytes(header.palette_len())?;
        let here = stream.read_exact_bytes(stride * usize::from(header.rows_here))?;

        let expected = (bmp_header.len() + palette.len()) as u64
            + stride as u64 * u64::from(header.height);
        let mut segments = vec![
            Segment::Bytes(bmp_header),
            Segment::Bytes(palette),
            Segment::Bytes(here),
        ];

        let missing = header.height - u32::from(header.rows_here);
        if missing > 0 {
            let Some(name) = meta.file_name.as_deref() else {
                return Err(Error::invalid(TAG, "rows are missing and the file has no name"));
            };
            let sibling = source.find_file(&sibling_name(name))?;
            let view = source.open_view(&sibling)?;
            if !view.ascii_equal_at(0, "GRP2") {
                return Err(Error::invalid(TAG, format!("{} is not a GRP2 file", sibling.name())));
            }
            debug!("{} continues in {}", name, sibling.name());
            let tail = stride as u64 * u64::from(missing);
            segments.push(Segment::view_range(view, SIBLING_HEADER_SIZE, tail));
        }

        let bitmap = ConcatStream::new(segments);
        if bitmap.len() != expected {
            return Err(Error::invalid(TAG, "pixel rows are truncated"));
        }

        let image = image::load(BufReader::new(bitmap), image::ImageFormat::Bmp)?;
        Ok(ImageData::with_metadata(image, meta))
    }
}
