//! Core of a game resource archive browser
//!
//! This crate holds everything that is independent of any particular
//! archive format:
//!
//! - [`view`]: windowed, memory-mapped access to large files
//! - [`stream`]: a little-endian binary reader with cached signature and
//!   header, plus segment concatenation
//! - [`entry`] and [`archive`]: the directory record, the format plugin
//!   contract and opened archives
//! - [`image`]: the image format contract
//! - [`catalog`]: the registry that matches files to formats
//! - [`scheme`]: the versioned database of per-format configuration
//! - [`fs`]: the virtual filesystem stack for browsing archives inside
//!   archives
//! - [`extract`]: writing entries to disk with cooperative cancellation
//!
//! Concrete formats live in the `arcbrowse-formats` crate.
//!
//! # Example
//!
//! ```no_run
//! use arcbrowse_core::{ArcView, FormatCatalog};
//! # use arcbrowse_core::archive::{ArchiveFormat, ArcIndex, Resource};
//! # struct Lib;
//! # impl Resource for Lib {
//! #     fn tag(&self) -> &'static str { "LIB" }
//! #     fn description(&self) -> &'static str { "" }
//! #     fn extensions(&self) -> &'static [&'static str] { &["lib"] }
//! #     fn kind(&self) -> &'static str { "archive" }
//! # }
//! # impl ArchiveFormat for Lib {
//! #     fn try_open(&self, _: &ArcView) -> arcbrowse_core::Result<Option<ArcIndex>> { Ok(None) }
//! # }
//!
//! # fn main() -> arcbrowse_core::Result<()> {
//! let catalog = FormatCatalog::builder().archive(Lib).build();
//! let view = ArcView::open("data.lib")?;
//! let arc = catalog.open_archive(view, "data.lib", &[])?;
//! for entry in arc.entries() {
//!     println!("{} {} bytes", entry.name(), entry.size());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod archive;
pub mod catalog;
pub mod config;
pub mod entry;
pub mod error;
pub mod extract;
pub mod fs;
pub mod image;
pub mod scheme;
pub mod stream;
pub mod view;

pub use archive::{ArcFile, ArcIndex, ArchiveFormat, EntryStream, PackSource, Resource};
pub use catalog::{CatalogBuilder, FormatCatalog};
pub use config::{BrowseConfig, OverwritePolicy};
pub use entry::{Entry, PackedInfo, is_sane_count};
pub use error::{Error, Result};
pub use extract::{CancelFlag, ExtractAction, ExtractSummary, Extractor};
pub use fs::{
    FileSystem, FileSystemStack, FlatArchiveFileSystem, PhysicalFileSystem,
    TreeArchiveFileSystem,
};
pub use image::{ImageData, ImageFormat, ImageMetaData, ImageStream};
pub use scheme::SchemeDatabase;
pub use stream::{BinaryStream, ConcatStream, ReadSeek, Segment, WriteSeek};
pub use view::{ArcView, ViewFrame, ViewStream};
