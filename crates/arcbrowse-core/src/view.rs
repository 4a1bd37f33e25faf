//! Windowed, memory-mapped access to archive files
//!
//! An [`ArcView`] describes a byte range of some backing source: a file on
//! disk, an anonymous mapping filled from a non-seekable reader, or an owned
//! buffer. Views are cheap to clone and to narrow with
//! [`ArcView::sub_view`]; all clones share the backing source.
//!
//! Reads go through a [`ViewFrame`], a window over the view that is remapped
//! on demand. A file-backed frame only maps the pages it currently needs, so
//! archives larger than the address space budget can still be browsed.
//!
//! ```no_run
//! use arcbrowse_core::view::ArcView;
//!
//! # fn main() -> arcbrowse_core::Result<()> {
//! let view = ArcView::open("data.lib")?;
//! let mut frame = view.create_frame();
//! if frame.ascii_equal(4, "PACKDATA0000") {
//!     let count = frame.read_i32(0x14)?;
//!     println!("{count} entries");
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::stream::{BinaryStream, decode_cstring, seek_target};
use encoding_rs::Encoding;
use memmap2::{Mmap, MmapMut, MmapOptions};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

/// Smallest window a frame maps
pub const PAGE_SIZE: u64 = 4096;

/// Default window size used by [`ViewStream`] reads
pub const DEFAULT_STREAM_CHUNK: u64 = 64 * 1024;

#[derive(Debug)]
enum ViewSource {
    /// Regular file, mapped window by window
    File(File),
    /// Anonymous mapping holding a buffered non-seekable source
    Anonymous(Mmap),
    /// Owned bytes (decompressed payloads, tests)
    Bytes(Vec<u8>),
}

/// Shared, bounded view over a file or buffer
#[derive(Debug, Clone)]
pub struct ArcView {
    source: Arc<ViewSource>,
    base: u64,
    max_offset: u64,
    name: String,
    page_size: u64,
}

impl ArcView {
    /// Open a file on disk.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the path cannot be opened or queried.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_file(file, path.display().to_string())
    }

    /// Wrap an already opened file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file size cannot be determined.
    pub fn from_file(file: File, name: impl Into<String>) -> Result<Self> {
        let max_offset = file.metadata()?.len();
        let name = name.into();
        debug!("Opened view {} ({} bytes)", name, max_offset);
        Ok(Self {
            source: Arc::new(ViewSource::File(file)),
            base: 0,
            max_offset,
            name,
            page_size: PAGE_SIZE,
        })
    }

    /// Buffer `size` bytes of a non-seekable source into an anonymous mapping.
    ///
    /// A source that ends early yields a shorter view; that is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileTooLarge` if `size` does not fit in memory and
    /// `Error::Io` if reading or mapping fails.
    pub fn from_reader<R: Read>(mut reader: R, size: u64, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let len = usize::try_from(size).map_err(|_| Error::FileTooLarge(size))?;
        if len == 0 {
            return Ok(Self::from_bytes(Vec::new(), name));
        }

        let mut map = MmapMut::map_anon(len)?;
        let mut filled = 0usize;
        while filled < len {
            match reader.read(&mut map[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        if filled < len {
            debug!(
                "Source {} ended after {} of {} bytes, truncating view",
                name, filled, len
            );
        }

        Ok(Self {
            source: Arc::new(ViewSource::Anonymous(map.make_read_only()?)),
            base: 0,
            max_offset: filled as u64,
            name,
            page_size: PAGE_SIZE,
        })
    }

    /// View over an owned buffer.
    pub fn from_bytes(bytes: Vec<u8>, name: impl Into<String>) -> Self {
        let max_offset = bytes.len() as u64;
        Self {
            source: Arc::new(ViewSource::Bytes(bytes)),
            base: 0,
            max_offset,
            name: name.into(),
            page_size: PAGE_SIZE,
        }
    }

    /// Override the minimum window size used by new frames.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Narrow the view to `size` bytes starting at `offset`.
    ///
    /// The range is clamped to the end of this view.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `offset` lies past the end of the view.
    pub fn sub_view(&self, offset: u64, size: u64) -> Result<Self> {
        if offset > self.max_offset {
            return Err(Error::OutOfRange {
                offset,
                size: self.max_offset,
            });
        }
        Ok(Self {
            source: Arc::clone(&self.source),
            base: self.base + offset,
            max_offset: size.min(self.max_offset - offset),
            name: self.name.clone(),
            page_size: self.page_size,
        })
    }

    /// Rename the view (used when a sub-view stands for a nested file).
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Total number of bytes addressable through this view
    pub const fn max_offset(&self) -> u64 {
        self.max_offset
    }

    /// Alias for [`ArcView::max_offset`]
    pub const fn len(&self) -> u64 {
        self.max_offset
    }

    /// Whether the view holds no bytes
    pub const fn is_empty(&self) -> bool {
        self.max_offset == 0
    }

    /// Name of the file or entry this view represents
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether reads map pages of a file on demand
    pub fn is_file_backed(&self) -> bool {
        matches!(*self.source, ViewSource::File(_))
    }

    /// New frame positioned at offset 0 with the minimal window.
    pub fn create_frame(&self) -> ViewFrame<'_> {
        ViewFrame {
            view: self,
            offset: 0,
            reserved: 0,
            map: None,
        }
    }

    /// `Read + Seek` cursor over `size` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `offset` lies past the end of the view.
    pub fn stream(&self, offset: u64, size: u64) -> Result<ViewStream<'_>> {
        if offset > self.max_offset {
            return Err(Error::OutOfRange {
                offset,
                size: self.max_offset,
            });
        }
        Ok(ViewStream {
            frame: self.create_frame(),
            start: offset,
            len: size.min(self.max_offset - offset),
            pos: 0,
            chunk: DEFAULT_STREAM_CHUNK,
        })
    }

    /// Binary stream over `size` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `offset` lies past the end of the view.
    pub fn binary_stream(&self, offset: u64, size: u64) -> Result<BinaryStream<ViewStream<'_>>> {
        let stream = self.stream(offset, size)?;
        BinaryStream::new(stream, self.name.clone())
    }

    /// Copy up to `size` bytes at `offset` through a one-shot frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `offset` lies past the end of the view.
    pub fn read_bytes_at(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        self.create_frame().read_bytes(offset, size)
    }

    /// Little-endian `u32` at `offset` through a one-shot frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than four bytes remain.
    pub fn read_u32_at(&self, offset: u64) -> Result<u32> {
        self.create_frame().read_u32(offset)
    }

    /// Compare bytes at `offset` against an ASCII literal.
    pub fn ascii_equal_at(&self, offset: u64, literal: &str) -> bool {
        self.create_frame().ascii_equal(offset, literal)
    }

    /// First four bytes as a little-endian value, zero when shorter.
    pub fn signature(&self) -> u32 {
        let mut frame = self.create_frame();
        match frame.read(0, 4) {
            Ok(b) if b.len() == 4 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            _ => 0,
        }
    }
}

/// Remappable window over an [`ArcView`]
pub struct ViewFrame<'v> {
    view: &'v ArcView,
    offset: u64,
    reserved: u64,
    map: Option<Mmap>,
}

impl<'v> ViewFrame<'v> {
    /// View this frame reads from
    pub const fn view(&self) -> &'v ArcView {
        self.view
    }

    /// Start of the current window, relative to the view
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Length of the current window
    pub const fn reserved(&self) -> u64 {
        self.reserved
    }

    /// Make sure the window covers `size` bytes at `offset`.
    ///
    /// Returns the number of bytes actually available, which is short near
    /// the end of the view and zero at `offset == max_offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `offset` lies past the end of the view,
    /// or `Error::Io` if the window cannot be mapped.
    pub fn reserve(&mut self, offset: u64, size: u64) -> Result<u64> {
        let max = self.view.max_offset;
        if offset > max {
            return Err(Error::OutOfRange { offset, size: max });
        }
        let available = size.min(max - offset);
        if offset >= self.offset && offset + available <= self.offset + self.reserved {
            return Ok(available);
        }
        self.remap(offset, available)?;
        Ok(available)
    }

    fn remap(&mut self, offset: u64, size: u64) -> Result<()> {
        let len = size
            .max(self.view.page_size)
            .min(self.view.max_offset - offset);

        if let ViewSource::File(file) = &*self.view.source {
            self.map = None;
            if len > 0 {
                let map_len = usize::try_from(len).map_err(|_| Error::FileTooLarge(len))?;
                // SAFETY: the archive file is opened read-only and the map is
                // never handed out past the lifetime of this frame.
                #[allow(unsafe_code)]
                let map = unsafe {
                    MmapOptions::new()
                        .offset(self.view.base + offset)
                        .len(map_len)
                        .map(file)?
                };
                self.map = Some(map);
            }
            trace!(
                "Remapped frame of {} to {:#x}+{:#x}",
                self.view.name, offset, len
            );
        }

        self.offset = offset;
        self.reserved = len;
        Ok(())
    }

    fn window(&self) -> &[u8] {
        let start = (self.view.base + self.offset) as usize;
        let end = start + self.reserved as usize;
        match &*self.view.source {
            ViewSource::File(_) => self.map.as_deref().unwrap_or(&[]),
            ViewSource::Anonymous(map) => &map[start..end],
            ViewSource::Bytes(bytes) => &bytes[start..end],
        }
    }

    /// Borrow up to `size` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `offset` lies past the end of the view.
    pub fn read(&mut self, offset: u64, size: u64) -> Result<&[u8]> {
        let available = self.reserve(offset, size)?;
        let start = (offset - self.offset) as usize;
        Ok(&self.window()[start..start + available as usize])
    }

    /// Copy up to `size` bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `offset` lies past the end of the view.
    pub fn read_bytes(&mut self, offset: u64, size: u64) -> Result<Vec<u8>> {
        Ok(self.read(offset, size)?.to_vec())
    }

    fn read_array<const N: usize>(&mut self, offset: u64) -> Result<[u8; N]> {
        let bytes = self.read(offset, N as u64)?;
        bytes.try_into().map_err(|_| Error::EndOfStream)
    }

    /// Byte at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` at the end of the view.
    pub fn read_u8(&mut self, offset: u64) -> Result<u8> {
        Ok(self.read_array::<1>(offset)?[0])
    }

    /// Signed byte at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` at the end of the view.
    pub fn read_i8(&mut self, offset: u64) -> Result<i8> {
        Ok(self.read_array::<1>(offset)?[0] as i8)
    }

    /// Little-endian `u16` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than two bytes remain.
    pub fn read_u16(&mut self, offset: u64) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array(offset)?))
    }

    /// Little-endian `i16` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than two bytes remain.
    pub fn read_i16(&mut self, offset: u64) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array(offset)?))
    }

    /// Little-endian `u32` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than four bytes remain.
    pub fn read_u32(&mut self, offset: u64) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array(offset)?))
    }

    /// Little-endian `i32` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than four bytes remain.
    pub fn read_i32(&mut self, offset: u64) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array(offset)?))
    }

    /// Little-endian `u64` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than eight bytes remain.
    pub fn read_u64(&mut self, offset: u64) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array(offset)?))
    }

    /// Little-endian `i64` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than eight bytes remain.
    pub fn read_i64(&mut self, offset: u64) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array(offset)?))
    }

    /// Text of at most `size` bytes at `offset`, cut at the first NUL.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` if `offset` lies past the end of the view.
    pub fn read_string(
        &mut self,
        offset: u64,
        size: u64,
        encoding: &'static Encoding,
    ) -> Result<String> {
        let bytes = self.read(offset, size)?;
        Ok(decode_cstring(bytes, encoding))
    }

    /// Whether the bytes at `offset` spell `literal` exactly.
    pub fn ascii_equal(&mut self, offset: u64, literal: &str) -> bool {
        let expected = literal.as_bytes();
        match self.read(offset, expected.len() as u64) {
            Ok(bytes) => bytes == expected,
            Err(_) => false,
        }
    }
}

/// `Read + Seek` cursor over a range of an [`ArcView`]
pub struct ViewStream<'v> {
    frame: ViewFrame<'v>,
    start: u64,
    len: u64,
    pos: u64,
    chunk: u64,
}

impl ViewStream<'_> {
    /// Number of bytes in the stream
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Whether the stream holds no bytes
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Range of the underlying view covered by this stream
    pub const fn range(&self) -> (u64, u64) {
        (self.start, self.len)
    }

    /// View this stream reads from
    pub const fn view(&self) -> &ArcView {
        self.frame.view
    }

    /// Set how many bytes each remap covers at least.
    #[must_use]
    pub fn with_chunk_size(mut self, chunk: u64) -> Self {
        self.chunk = chunk.max(1);
        self
    }
}

impl Read for ViewStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let remaining = self.len - self.pos;
        let want = (buf.len() as u64).min(remaining);
        let window = want.max(self.chunk).min(remaining);
        let bytes = self
            .frame
            .read(self.start + self.pos, window)
            .map_err(io::Error::other)?;
        let n = (want as usize).min(bytes.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ViewStream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = seek_target(pos, self.pos, self.len)?;
        self.pos = target;
        Ok(target)
    }
}
