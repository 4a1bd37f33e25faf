//! Archives with a single namespace

use super::{FileSystem, PARENT_DIR, lookup_key};
use crate::archive::ArcFile;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::stream::ReadSeek;
use crate::view::ArcView;
use std::collections::HashMap;
use std::io::Read;

/// Every entry is a leaf of one root directory; names match
/// case-insensitively.
pub struct FlatArchiveFileSystem {
    arc: ArcFile,
    by_name: HashMap<String, usize>,
}

impl FlatArchiveFileSystem {
    /// Wrap an opened archive.
    pub fn new(arc: ArcFile) -> Self {
        let mut by_name = HashMap::with_capacity(arc.entries().len());
        for (index, entry) in arc.entries().iter().enumerate() {
            by_name.entry(lookup_key(entry.name())).or_insert(index);
        }
        Self { arc, by_name }
    }

    /// Give back the archive.
    pub fn into_archive(self) -> ArcFile {
        self.arc
    }
}

impl FileSystem for FlatArchiveFileSystem {
    fn current_directory(&self) -> &str {
        ""
    }

    fn set_current_directory(&mut self, path: &str) -> Result<()> {
        match path {
            "" | "/" | "\\" | "." | PARENT_DIR => Ok(()),
            other => Err(Error::DirectoryNotFound(other.to_string())),
        }
    }

    fn get_files(&self) -> Result<Vec<Entry>> {
        Ok(self.arc.entries().to_vec())
    }

    fn get_files_recursive(&self) -> Result<Vec<Entry>> {
        self.get_files()
    }

    fn find_file(&self, name: &str) -> Result<Entry> {
        self.by_name
            .get(&lookup_key(name))
            .map(|&index| self.arc.entries()[index].clone())
            .ok_or_else(|| Error::FileNotFound(name.to_string()))
    }

    fn open_file(&self, entry: &Entry) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.arc.open_entry(entry)?))
    }

    fn open_seekable_file(&self, entry: &Entry) -> Result<Box<dyn ReadSeek + '_>> {
        self.arc.open_seekable_entry(entry)
    }

    fn open_view(&self, entry: &Entry) -> Result<ArcView> {
        self.arc.open_view(entry)
    }

    fn combine_path(&self, _directory: &str, name: &str) -> String {
        name.to_string()
    }

    fn archive(&self) -> Option<&ArcFile> {
        Some(&self.arc)
    }
}
