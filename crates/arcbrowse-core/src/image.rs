//! Image format contract

use crate::archive::Resource;
use crate::error::Result;
use crate::fs::FileSystem;
use crate::stream::{BinaryStream, ReadSeek};
use image::DynamicImage;

/// Stream type handed to image decoders
pub type ImageStream<'a> = BinaryStream<Box<dyn ReadSeek + 'a>>;

/// Header facts gathered while identifying an image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetaData {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Horizontal placement on the engine's canvas
    pub offset_x: i32,
    /// Vertical placement on the engine's canvas
    pub offset_y: i32,
    /// Bits per pixel as stored
    pub bpp: u32,
    /// Name of the file the image came from, used to find companion files
    pub file_name: Option<String>,
}

/// A decoded picture plus its canvas placement
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Pixels
    pub image: DynamicImage,
    /// Horizontal placement
    pub offset_x: i32,
    /// Vertical placement
    pub offset_y: i32,
}

impl ImageData {
    /// Image placed at the origin.
    pub const fn new(image: DynamicImage) -> Self {
        Self {
            image,
            offset_x: 0,
            offset_y: 0,
        }
    }

    /// Image placed as `meta` describes.
    pub const fn with_metadata(image: DynamicImage, meta: &ImageMetaData) -> Self {
        Self {
            image,
            offset_x: meta.offset_x,
            offset_y: meta.offset_y,
        }
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Image format plugin
pub trait ImageFormat: Resource {
    /// Read header facts, or `Ok(None)` if the stream is not this format.
    ///
    /// # Errors
    ///
    /// Reserved for I/O failures on a recognized header.
    fn read_metadata(&self, stream: &mut ImageStream<'_>) -> Result<Option<ImageMetaData>>;

    /// Decode pixels. `source` gives access to companion files.
    ///
    /// # Errors
    ///
    /// Returns an error if the pixel data is corrupt or a companion file is
    /// missing.
    fn read(
        &self,
        stream: &mut ImageStream<'_>,
        meta: &ImageMetaData,
        source: &dyn FileSystem,
    ) -> Result<ImageData>;
}
