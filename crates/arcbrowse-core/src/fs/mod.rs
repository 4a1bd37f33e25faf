//! Virtual filesystem over directories and archives
//!
//! Every navigable level implements [`FileSystem`]: the OS directory tree
//! ([`PhysicalFileSystem`]), a flat archive ([`FlatArchiveFileSystem`]) or
//! an archive whose names form a tree ([`TreeArchiveFileSystem`]).
//! [`FileSystemStack`] nests them as the user descends into archives.

mod flat;
mod physical;
mod stack;
mod tree;

pub use flat::FlatArchiveFileSystem;
pub use physical::PhysicalFileSystem;
pub use stack::FileSystemStack;
pub use tree::TreeArchiveFileSystem;

use crate::archive::ArcFile;
use crate::entry::Entry;
use crate::error::Result;
use crate::stream::ReadSeek;
use crate::view::ArcView;
use std::io::Read;

/// Name of the parent directory pseudo-entry
pub const PARENT_DIR: &str = "..";

/// One navigable level of the virtual filesystem
pub trait FileSystem {
    /// Current directory, `""` at the root of an archive
    fn current_directory(&self) -> &str;

    /// Change the current directory.
    ///
    /// # Errors
    ///
    /// Returns `Error::DirectoryNotFound` if `path` does not name a
    /// directory.
    fn set_current_directory(&mut self, path: &str) -> Result<()>;

    /// Entries directly inside the current directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be listed.
    fn get_files(&self) -> Result<Vec<Entry>>;

    /// Data entries anywhere below the current directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a directory cannot be listed.
    fn get_files_recursive(&self) -> Result<Vec<Entry>>;

    /// Resolve a single name relative to the current directory.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound` if nothing matches.
    fn find_file(&self, name: &str) -> Result<Entry>;

    /// Whether [`FileSystem::find_file`] would succeed
    fn file_exists(&self, name: &str) -> bool {
        self.find_file(name).is_ok()
    }

    /// Decoded contents of `entry`.
    ///
    /// # Errors
    ///
    /// Propagates I/O and decoding failures.
    fn open_file(&self, entry: &Entry) -> Result<Box<dyn Read + '_>>;

    /// Decoded contents of `entry` as a seekable stream.
    ///
    /// # Errors
    ///
    /// Propagates I/O and decoding failures.
    fn open_seekable_file(&self, entry: &Entry) -> Result<Box<dyn ReadSeek + '_>>;

    /// Owned view over the decoded contents of `entry`.
    ///
    /// # Errors
    ///
    /// Propagates I/O and decoding failures.
    fn open_view(&self, entry: &Entry) -> Result<ArcView>;

    /// Join a directory and a name with this filesystem's separator.
    fn combine_path(&self, directory: &str, name: &str) -> String;

    /// Archive behind this level, `None` for the physical filesystem
    fn archive(&self) -> Option<&ArcFile> {
        None
    }

    /// Format tags commonly found at this level, used as a probe hint
    fn contained_formats(&self) -> &'static [&'static str] {
        self.archive()
            .map_or(&[], |arc| arc.format().contained_formats())
    }
}

/// Case-insensitive key used by archive name lookups.
pub(crate) fn lookup_key(name: &str) -> String {
    name.to_lowercase()
}
