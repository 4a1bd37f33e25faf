//! Little-endian binary stream reader
//!
//! [`BinaryStream`] is the reader every format probe starts from. It knows
//! its total length, caches the four-byte signature and the first header
//! bytes once they have been read, and decodes NUL-terminated strings in the
//! archive's legacy encoding (Shift-JIS unless told otherwise).
//!
//! [`ConcatStream`] stitches owned buffers and view ranges into a single
//! seekable stream, which is how split or headerless images are presented to
//! ordinary decoders.

use crate::error::{Error, Result};
use crate::view::ArcView;
use byteorder::{LittleEndian, ReadBytesExt};
use encoding_rs::{Encoding, SHIFT_JIS, UTF_16BE, UTF_16LE};
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};

/// Shorthand for a boxed readable, seekable source
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Shorthand for a writable, seekable sink
pub trait WriteSeek: io::Write + Seek {}

impl<T: io::Write + Seek + ?Sized> WriteSeek for T {}

/// Default text encoding for archive names
pub const DEFAULT_ENCODING: &Encoding = SHIFT_JIS;

const DEFAULT_BUFFER_SIZE: usize = 8192;

fn is_utf16(encoding: &'static Encoding) -> bool {
    encoding == UTF_16LE || encoding == UTF_16BE
}

/// Decode `bytes` up to the first NUL terminator.
///
/// For UTF-16 encodings the terminator is a zero code unit at an even
/// offset, so ASCII names stored as UTF-16 are not cut after one character.
pub fn decode_cstring(bytes: &[u8], encoding: &'static Encoding) -> String {
    let end = if is_utf16(encoding) {
        bytes
            .chunks_exact(2)
            .position(|unit| unit == [0, 0])
            .map_or(bytes.len() & !1, |i| i * 2)
    } else {
        bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len())
    };
    let (text, _) = encoding.decode_without_bom_handling(&bytes[..end]);
    text.into_owned()
}

/// Buffered little-endian reader with cached signature and header
pub struct BinaryStream<R: Read + Seek> {
    inner: BufReader<R>,
    name: String,
    len: u64,
    pos: u64,
    signature: Option<u32>,
    header: Vec<u8>,
}

impl<R: Read + Seek> BinaryStream<R> {
    /// Wrap a reader positioned anywhere; the stream starts at offset 0.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the reader cannot report its length.
    pub fn new(reader: R, name: impl Into<String>) -> Result<Self> {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, reader, name)
    }

    /// Like [`BinaryStream::new`] with an explicit buffer size.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the reader cannot report its length.
    pub fn with_capacity(capacity: usize, mut reader: R, name: impl Into<String>) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner: BufReader::with_capacity(capacity.max(16), reader),
            name: name.into(),
            len,
            pos: 0,
            signature: None,
            header: Vec::new(),
        })
    }

    /// Name of the file this stream reads
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total length in bytes
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Whether the stream holds no bytes
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current read position
    pub const fn position(&self) -> u64 {
        self.pos
    }

    /// Bytes left between the position and the end
    pub const fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    /// Move to an absolute position.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutOfRange` past the end of the stream and `Error::Io`
    /// if the underlying reader cannot seek.
    pub fn set_position(&mut self, pos: u64) -> Result<()> {
        if pos > self.len {
            return Err(Error::OutOfRange {
                offset: pos,
                size: self.len,
            });
        }
        self.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Skip `count` bytes forward.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if that would leave the stream.
    pub fn skip(&mut self, count: u64) -> Result<()> {
        if count > self.remaining() {
            return Err(Error::EndOfStream);
        }
        self.seek(SeekFrom::Current(count as i64))?;
        Ok(())
    }

    /// First four bytes as a little-endian `u32`, zero-padded when shorter.
    ///
    /// The value is read once and cached; the position is preserved.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the underlying reader fails.
    pub fn signature(&mut self) -> Result<u32> {
        if let Some(signature) = self.signature {
            return Ok(signature);
        }
        let signature = if self.header.len() >= 4 {
            u32::from_le_bytes([self.header[0], self.header[1], self.header[2], self.header[3]])
        } else {
            let saved = self.pos;
            self.seek(SeekFrom::Start(0))?;
            let mut buf = [0u8; 4];
            let mut filled = 0;
            while filled < 4 {
                let n = self.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            self.seek(SeekFrom::Start(saved))?;
            u32::from_le_bytes(buf)
        };
        self.signature = Some(signature);
        Ok(signature)
    }

    /// Read and cache the first `size` bytes, leaving the position at `size`.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if the stream is shorter than `size`.
    pub fn read_header(&mut self, size: usize) -> Result<&[u8]> {
        if self.header.len() < size {
            if (size as u64) > self.len {
                return Err(Error::EndOfStream);
            }
            self.seek(SeekFrom::Start(0))?;
            let mut header = vec![0u8; size];
            self.read_exact(&mut header)?;
            self.header = header;
        } else {
            self.seek(SeekFrom::Start(size as u64))?;
        }
        Ok(&self.header[..size])
    }

    /// Next byte without consuming it, `None` at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the underlying reader fails.
    pub fn peek_byte(&mut self) -> Result<Option<u8>> {
        Ok(self.inner.fill_buf()?.first().copied())
    }

    /// Read up to `count` bytes; the result is short at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the underlying reader fails.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(count.min(self.remaining() as usize));
        self.by_ref().take(count as u64).read_to_end(&mut out)?;
        Ok(out)
    }

    /// Read exactly `count` bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer bytes remain.
    pub fn read_exact_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        if count as u64 > self.remaining() {
            return Err(Error::EndOfStream);
        }
        let mut out = vec![0u8; count];
        self.read_exact(&mut out)?;
        Ok(out)
    }

    /// # Errors
    ///
    /// Returns `Error::EndOfStream` at the end of the stream.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(ReadBytesExt::read_u8(self)?)
    }

    /// # Errors
    ///
    /// Returns `Error::EndOfStream` at the end of the stream.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(ReadBytesExt::read_i8(self)?)
    }

    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than two bytes remain.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(ReadBytesExt::read_u16::<LittleEndian>(self)?)
    }

    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than two bytes remain.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(ReadBytesExt::read_i16::<LittleEndian>(self)?)
    }

    /// Sign-extended 24-bit value.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than three bytes remain.
    pub fn read_i24(&mut self) -> Result<i32> {
        Ok(ReadBytesExt::read_i24::<LittleEndian>(self)?)
    }

    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than four bytes remain.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(ReadBytesExt::read_u32::<LittleEndian>(self)?)
    }

    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than four bytes remain.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(ReadBytesExt::read_i32::<LittleEndian>(self)?)
    }

    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than eight bytes remain.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(ReadBytesExt::read_u64::<LittleEndian>(self)?)
    }

    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than eight bytes remain.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(ReadBytesExt::read_i64::<LittleEndian>(self)?)
    }

    /// Consume exactly `length` bytes and decode them up to the first NUL.
    ///
    /// # Errors
    ///
    /// Returns `Error::EndOfStream` if fewer than `length` bytes remain.
    pub fn read_cstring_fixed(&mut self, length: usize, encoding: &'static Encoding) -> Result<String> {
        let bytes = self.read_exact_bytes(length)?;
        Ok(decode_cstring(&bytes, encoding))
    }

    /// Consume bytes up to and including a NUL terminator, or to the end.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the underlying reader fails.
    pub fn read_cstring(&mut self, encoding: &'static Encoding) -> Result<String> {
        let unit = if is_utf16(encoding) { 2 } else { 1 };
        let mut bytes = Vec::new();
        let mut buf = [0u8; 2];
        loop {
            let n = self.read_bytes_into(&mut buf[..unit])?;
            if n < unit {
                bytes.extend_from_slice(&buf[..n]);
                break;
            }
            if buf[..unit].iter().all(|&b| b == 0) {
                break;
            }
            bytes.extend_from_slice(&buf[..unit]);
        }
        Ok(decode_cstring(&bytes, encoding))
    }

    fn read_bytes_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Give back the wrapped reader.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl BinaryStream<Cursor<Vec<u8>>> {
    /// Stream over an in-memory buffer.
    pub fn from_bytes(bytes: Vec<u8>, name: impl Into<String>) -> Self {
        let len = bytes.len() as u64;
        Self {
            inner: BufReader::new(Cursor::new(bytes)),
            name: name.into(),
            len,
            pos: 0,
            signature: None,
            header: Vec::new(),
        }
    }
}

impl<R: Read + Seek> Read for BinaryStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for BinaryStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = seek_target(pos, self.pos, self.len)?;
        let delta = target as i64 - self.pos as i64;
        self.inner.seek_relative(delta)?;
        self.pos = target;
        Ok(target)
    }
}

/// Resolve a seek against a stream of `len` bytes positioned at `current`.
///
/// Positions before the start or past the end are refused.
pub(crate) fn seek_target(pos: SeekFrom, current: u64, len: u64) -> io::Result<u64> {
    let target = match pos {
        SeekFrom::Start(n) => Some(n),
        SeekFrom::End(d) => len.checked_add_signed(d),
        SeekFrom::Current(d) => current.checked_add_signed(d),
    };
    match target {
        None => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "seek to a negative position",
        )),
        Some(target) if target > len => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("seek to {target:#x} past the end ({len:#x})"),
        )),
        Some(target) => Ok(target),
    }
}

/// Piece of a [`ConcatStream`]
#[derive(Debug, Clone)]
pub enum Segment {
    /// Owned bytes, typically a synthesized header
    Bytes(Vec<u8>),
    /// Byte range of a view
    View {
        /// Source view
        view: ArcView,
        /// Start of the range within the view
        offset: u64,
        /// Length of the range
        size: u64,
    },
}

impl Segment {
    /// Range of `view`, clamped to the end of the view.
    pub fn view_range(view: ArcView, offset: u64, size: u64) -> Self {
        let size = size.min(view.max_offset().saturating_sub(offset));
        Self::View { view, offset, size }
    }

    fn len(&self) -> u64 {
        match self {
            Self::Bytes(bytes) => bytes.len() as u64,
            Self::View { size, .. } => *size,
        }
    }
}

/// Seekable concatenation of segments
#[derive(Debug)]
pub struct ConcatStream {
    segments: Vec<(u64, Segment)>,
    len: u64,
    pos: u64,
}

impl ConcatStream {
    /// Join `segments` in order.
    pub fn new(segments: impl IntoIterator<Item = Segment>) -> Self {
        let mut len = 0;
        let segments = segments
            .into_iter()
            .filter(|s| s.len() > 0)
            .map(|s| {
                let start = len;
                len += s.len();
                (start, s)
            })
            .collect();
        Self {
            segments,
            len,
            pos: 0,
        }
    }

    /// Total length of all segments
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Whether no segment holds any bytes
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Read for ConcatStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let index = self
            .segments
            .partition_point(|(start, _)| *start <= self.pos)
            .saturating_sub(1);
        let (start, segment) = &self.segments[index];
        let within = self.pos - start;
        let want = (buf.len() as u64).min(segment.len() - within);

        let n = match segment {
            Segment::Bytes(bytes) => {
                let from = within as usize;
                let n = want as usize;
                buf[..n].copy_from_slice(&bytes[from..from + n]);
                n
            }
            Segment::View { view, offset, .. } => {
                let bytes = view
                    .read_bytes_at(offset + within, want)
                    .map_err(io::Error::other)?;
                buf[..bytes.len()].copy_from_slice(&bytes);
                bytes.len()
            }
        };
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ConcatStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = seek_target(pos, self.pos, self.len)?;
        self.pos = target;
        Ok(target)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_cached_and_position_preserved() {
        let mut stream = BinaryStream::from_bytes(b"HPAK\x02\0\0\0".to_vec(), "a.hpk");
        stream.skip(2).unwrap();
        assert_eq!(stream.signature().unwrap(), u32::from_le_bytes(*b"HPAK"));
        assert_eq!(stream.position(), 2);
        assert_eq!(stream.read_u16().unwrap(), u16::from_le_bytes(*b"AK"));
    }

    #[test]
    fn short_signature_is_zero_padded() {
        let mut stream = BinaryStream::from_bytes(vec![0x42, 0x4D], "tiny.bmp");
        assert_eq!(stream.signature().unwrap(), 0x4D42);
        let mut empty = BinaryStream::from_bytes(Vec::new(), "empty");
        assert_eq!(empty.signature().unwrap(), 0);
    }

    #[test]
    fn header_is_cached_and_position_set() {
        let mut stream = BinaryStream::from_bytes((0u8..32).collect(), "h");
        assert_eq!(stream.read_header(8).unwrap(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(stream.position(), 8);
        stream.set_position(20).unwrap();
        assert_eq!(stream.read_header(4).unwrap(), &[0, 1, 2, 3]);
        assert_eq!(stream.position(), 4);
        assert!(stream.read_header(64).unwrap_err().is_end_of_stream());
    }

    #[test]
    fn scalar_reads_are_little_endian() {
        let mut stream = BinaryStream::from_bytes(
            vec![0xFF, 0xFF, 0xFF, 0x78, 0x56, 0x34, 0x12, 0xFE],
            "s",
        );
        assert_eq!(stream.read_i24().unwrap(), -1);
        assert_eq!(stream.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(stream.read_i8().unwrap(), -2);
        assert!(stream.read_u16().unwrap_err().is_end_of_stream());
    }

    #[test]
    fn fixed_cstring_consumes_full_width() {
        let mut data = b"abc\0zzzz".to_vec();
        data.push(7);
        let mut stream = BinaryStream::from_bytes(data, "c");
        assert_eq!(stream.read_cstring_fixed(8, SHIFT_JIS).unwrap(), "abc");
        assert_eq!(stream.read_u8().unwrap(), 7);
    }

    #[test]
    fn shift_jis_names_decode() {
        let name = [0x83, 0x65, 0x83, 0x58, 0x83, 0x67, 0x00];
        assert_eq!(decode_cstring(&name, SHIFT_JIS), "テスト");
    }

    #[test]
    fn utf16_terminator_is_a_full_unit() {
        let mut bytes: Vec<u8> = "a.bmp".encode_utf16().flat_map(u16::to_le_bytes).collect();
        bytes.extend_from_slice(&[0, 0, b'x', 0]);
        assert_eq!(decode_cstring(&bytes, UTF_16LE), "a.bmp");
    }

    #[test]
    fn open_cstring_stops_at_terminator_or_end() {
        let mut stream = BinaryStream::from_bytes(b"one\0two".to_vec(), "c");
        assert_eq!(stream.read_cstring(SHIFT_JIS).unwrap(), "one");
        assert_eq!(stream.position(), 4);
        assert_eq!(stream.read_cstring(SHIFT_JIS).unwrap(), "two");
        assert_eq!(stream.peek_byte().unwrap(), None);
    }

    #[test]
    fn seeks_stay_within_the_stream() {
        let mut stream = BinaryStream::from_bytes(vec![1, 2, 3, 4], "s");
        assert!(matches!(
            stream.set_position(5),
            Err(Error::OutOfRange { offset: 5, size: 4 })
        ));
        assert!(stream.seek(SeekFrom::End(1)).is_err());
        assert!(stream.seek(SeekFrom::Current(9)).is_err());
        assert_eq!(stream.position(), 0);
        stream.set_position(4).unwrap();
        assert!(stream.read_u8().unwrap_err().is_end_of_stream());

        let mut concat = ConcatStream::new([Segment::Bytes(b"abc".to_vec())]);
        assert!(concat.seek(SeekFrom::Start(4)).is_err());
        assert_eq!(concat.seek(SeekFrom::End(0)).unwrap(), 3);
        concat.seek(SeekFrom::Start(1)).unwrap();
        let mut rest = String::new();
        concat.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "bc");
    }

    #[test]
    fn peek_does_not_advance() {
        let mut stream = BinaryStream::from_bytes(vec![9, 8], "p");
        assert_eq!(stream.peek_byte().unwrap(), Some(9));
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.read_bytes(10).unwrap(), [9, 8]);
    }

    #[test]
    fn concat_joins_bytes_and_view_ranges() {
        let view = ArcView::from_bytes((0u8..100).collect(), "tail");
        let mut stream = ConcatStream::new([
            Segment::Bytes(b"HDR".to_vec()),
            Segment::view_range(view.clone(), 10, 4),
            Segment::Bytes(Vec::new()),
            Segment::view_range(view, 98, 50),
        ]);
        assert_eq!(stream.len(), 9);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, [b'H', b'D', b'R', 10, 11, 12, 13, 98, 99]);

        stream.seek(SeekFrom::Start(4)).unwrap();
        let mut two = [0u8; 2];
        stream.read_exact(&mut two).unwrap();
        assert_eq!(two, [11, 12]);
    }
}
