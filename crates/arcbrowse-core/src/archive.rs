//! Format plugin contract and opened archives
//!
//! A format is a stateless (or scheme-only) value implementing
//! [`ArchiveFormat`]. Probing a view with [`ArchiveFormat::try_open`]
//! returns `Ok(None)` when the bytes do not belong to the format, which lets
//! the catalog fall through to the next candidate. A successful probe
//! produces an [`ArcIndex`] that [`ArcFile`] binds to the view.
//!
//! Streams returned by [`ArcFile::open_entry`] borrow the archive, so an
//! archive cannot be dropped while one of its entries is being read.

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::extract::{CancelFlag, ExtractAction, ExtractSummary, Extractor};
use crate::fs::{FileSystem, FlatArchiveFileSystem, TreeArchiveFileSystem};
use crate::stream::{ReadSeek, WriteSeek};
use crate::view::{ArcView, ViewStream};
use std::any::Any;
use std::fmt;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Metadata every catalog resource carries
pub trait Resource: Send + Sync {
    /// Short unique identifier, e.g. `"LIB"`
    fn tag(&self) -> &'static str;

    /// Human-readable name
    fn description(&self) -> &'static str;

    /// First four bytes as a little-endian value; 0 when variable
    fn signature(&self) -> u32 {
        0
    }

    /// All signatures this resource answers to
    fn signatures(&self) -> Vec<u32> {
        vec![self.signature()]
    }

    /// Lowercase file extensions without the dot
    fn extensions(&self) -> &'static [&'static str];

    /// Entry type tag for files carrying one of [`Resource::extensions`]
    fn kind(&self) -> &'static str;

    /// Merge late-loaded scheme data.
    ///
    /// # Errors
    ///
    /// Returns `Error::Scheme` if the value has the wrong shape.
    fn update_scheme(&self, _scheme: &serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Result of a successful index decode
pub struct ArcIndex {
    /// Entries in index order
    pub entries: Vec<Entry>,
    /// Per-archive state owned by the format, e.g. a resolved key
    pub state: Option<Box<dyn Any + Send + Sync>>,
}

impl ArcIndex {
    /// Index without format state.
    pub const fn new(entries: Vec<Entry>) -> Self {
        Self {
            entries,
            state: None,
        }
    }

    /// Attach format state.
    #[must_use]
    pub fn with_state<T: Any + Send + Sync>(mut self, state: T) -> Self {
        self.state = Some(Box::new(state));
        self
    }
}

/// Input file for [`ArchiveFormat::create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackSource {
    /// Name stored in the archive
    pub name: String,
    /// File on disk supplying the data
    pub path: PathBuf,
}

impl PackSource {
    /// Pair a stored name with a file on disk.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Archive format plugin
pub trait ArchiveFormat: Resource {
    /// Decode the index of `view`, or `Ok(None)` if it is not this format.
    ///
    /// # Errors
    ///
    /// Reserved for recognized-but-corrupt input and I/O failures.
    fn try_open(&self, view: &ArcView) -> Result<Option<ArcIndex>>;

    /// Stream the decoded contents of `entry`.
    ///
    /// The default returns the stored bytes unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry lies outside the view or cannot be
    /// decoded.
    fn open_entry<'a>(&self, arc: &'a ArcFile, entry: &Entry) -> Result<EntryStream<'a>> {
        arc.open_raw(entry)
    }

    /// Whether entry names form a directory tree
    fn is_hierarchic(&self) -> bool {
        false
    }

    /// Tags of formats commonly found inside this archive
    fn contained_formats(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether [`ArchiveFormat::create`] is implemented
    fn can_create(&self) -> bool {
        false
    }

    /// Write a new archive holding `files`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotSupported` unless the format can write archives.
    fn create(
        &self,
        _output: &mut dyn WriteSeek,
        _files: &[PackSource],
        _cancel: &CancelFlag,
    ) -> Result<()> {
        Err(Error::NotSupported("archive creation"))
    }
}

/// Readable contents of one entry
pub enum EntryStream<'a> {
    /// Stored bytes read straight from the archive view
    View(ViewStream<'a>),
    /// Decoded bytes held in memory
    Memory(Cursor<Vec<u8>>),
    /// Forward-only decoder
    Reader(Box<dyn Read + 'a>),
}

impl<'a> EntryStream<'a> {
    /// Stream with no bytes.
    pub const fn empty() -> Self {
        Self::Memory(Cursor::new(Vec::new()))
    }

    /// Stream over decoded bytes.
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::Memory(Cursor::new(bytes))
    }

    /// Whether the stream can seek without buffering
    pub const fn is_seekable(&self) -> bool {
        !matches!(self, Self::Reader(_))
    }

    /// Seekable form of the stream, buffering forward-only decoders.
    ///
    /// # Errors
    ///
    /// Returns an error if a forward-only decoder fails while buffering.
    pub fn into_seekable(self) -> Result<Box<dyn ReadSeek + 'a>> {
        Ok(match self {
            Self::View(stream) => Box::new(stream),
            Self::Memory(cursor) => Box::new(cursor),
            Self::Reader(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Box::new(Cursor::new(bytes))
            }
        })
    }
}

impl Read for EntryStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::View(stream) => stream.read(buf),
            Self::Memory(cursor) => cursor.read(buf),
            Self::Reader(reader) => reader.read(buf),
        }
    }
}

impl fmt::Debug for EntryStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::View(stream) => f.debug_tuple("View").field(&stream.range()).finish(),
            Self::Memory(cursor) => f.debug_tuple("Memory").field(&cursor.get_ref().len()).finish(),
            Self::Reader(_) => f.write_str("Reader"),
        }
    }
}

/// An opened container: its view, its entries and the format that read it
pub struct ArcFile {
    view: ArcView,
    format: Arc<dyn ArchiveFormat>,
    entries: Vec<Entry>,
    state: Option<Box<dyn Any + Send + Sync>>,
}

impl ArcFile {
    /// Probe `view` with `format`.
    ///
    /// # Errors
    ///
    /// Propagates the format's error for recognized-but-corrupt input.
    pub fn try_open(format: Arc<dyn ArchiveFormat>, view: ArcView) -> Result<Option<Self>> {
        let Some(index) = format.try_open(&view)? else {
            debug!("{} did not recognize {}", format.tag(), view.name());
            return Ok(None);
        };
        info!(
            "Opened {} as {} with {} entries",
            view.name(),
            format.tag(),
            index.entries.len()
        );
        Ok(Some(Self::from_index(view, format, index)))
    }

    /// Bind an already decoded index to its view.
    pub fn from_index(view: ArcView, format: Arc<dyn ArchiveFormat>, index: ArcIndex) -> Self {
        Self {
            view,
            format,
            entries: index.entries,
            state: index.state,
        }
    }

    /// Entries in index order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Mutable entries, for type tag overrides
    pub fn entries_mut(&mut self) -> &mut [Entry] {
        &mut self.entries
    }

    /// View of the whole container
    pub const fn view(&self) -> &ArcView {
        &self.view
    }

    /// Format that decoded the index
    pub fn format(&self) -> &Arc<dyn ArchiveFormat> {
        &self.format
    }

    /// Name of the container file
    pub fn name(&self) -> &str {
        self.view.name()
    }

    /// Format state of type `T`, if the format stored one.
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state.as_ref()?.downcast_ref()
    }

    /// Stored bytes of `entry`, without any decoding.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotSupported` for virtual entries and
    /// `Error::OutOfRange` if the entry starts past the end of the view.
    pub fn open_raw(&self, entry: &Entry) -> Result<EntryStream<'_>> {
        if entry.is_virtual() {
            return Err(Error::NotSupported("reading a virtual entry"));
        }
        if entry.size() == 0 {
            return Ok(EntryStream::empty());
        }
        let stream = self
            .view
            .stream(entry.offset() as u64, u64::from(entry.size()))?;
        Ok(EntryStream::View(stream))
    }

    /// Decoded contents of `entry`.
    ///
    /// # Errors
    ///
    /// Propagates format decoding failures.
    pub fn open_entry(&self, entry: &Entry) -> Result<EntryStream<'_>> {
        if entry.size() == 0 && !entry.is_virtual() {
            return Ok(EntryStream::empty());
        }
        self.format.open_entry(self, entry)
    }

    /// Decoded contents of `entry` as a seekable stream.
    ///
    /// # Errors
    ///
    /// Propagates format decoding failures.
    pub fn open_seekable_entry(&self, entry: &Entry) -> Result<Box<dyn ReadSeek + '_>> {
        self.open_entry(entry)?.into_seekable()
    }

    /// Owned view over the decoded contents of `entry`.
    ///
    /// Stored entries become a sub-view of this archive; anything the
    /// format has to decode is materialized in memory first.
    ///
    /// # Errors
    ///
    /// Propagates format decoding failures.
    pub fn open_view(&self, entry: &Entry) -> Result<ArcView> {
        match self.open_entry(entry)? {
            EntryStream::View(stream) => {
                let (start, len) = stream.range();
                Ok(self.view.sub_view(start, len)?.with_name(entry.name()))
            }
            EntryStream::Memory(cursor) => {
                Ok(ArcView::from_bytes(cursor.into_inner(), entry.name()))
            }
            EntryStream::Reader(mut reader) => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Ok(ArcView::from_bytes(bytes, entry.name()))
            }
        }
    }

    /// Filesystem view of this archive.
    pub fn create_file_system(self) -> Box<dyn FileSystem> {
        if self.format.is_hierarchic() {
            Box::new(TreeArchiveFileSystem::new(self))
        } else {
            Box::new(FlatArchiveFileSystem::new(self))
        }
    }

    /// Extract one entry below `destination`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidFileName` for unsafe names and propagates I/O
    /// and decoding failures.
    pub fn extract(&self, entry: &Entry, destination: impl AsRef<Path>) -> Result<Option<PathBuf>> {
        Extractor::new(self, destination.as_ref()).extract_entry(entry)
    }

    /// Extract every entry below `destination` in ascending offset order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Canceled` when `cancel` is raised or `callback`
    /// aborts, and propagates extraction failures.
    pub fn extract_files<F>(
        &self,
        destination: impl AsRef<Path>,
        callback: F,
        cancel: &CancelFlag,
    ) -> Result<ExtractSummary>
    where
        F: FnMut(&Entry) -> ExtractAction,
    {
        Extractor::new(self, destination.as_ref())
            .with_cancel_flag(cancel.clone())
            .run(callback)
    }

    /// Release the archive and its view.
    pub fn close(self) {
        debug!("Closing {}", self.view.name());
    }
}

impl fmt::Debug for ArcFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArcFile")
            .field("name", &self.view.name())
            .field("format", &self.format.tag())
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}
