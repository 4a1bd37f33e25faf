//! The operating system's directory tree

use super::FileSystem;
use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::stream::ReadSeek;
use crate::view::ArcView;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Bottom frame of every filesystem stack
///
/// Entry names are full paths, so an entry can be opened without knowing
/// the directory it was listed from.
#[derive(Debug)]
pub struct PhysicalFileSystem {
    current: PathBuf,
    current_text: String,
}

impl PhysicalFileSystem {
    /// Start in `directory`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DirectoryNotFound` if `directory` is not a directory.
    pub fn new(directory: impl AsRef<Path>) -> Result<Self> {
        let current = resolve_directory(directory.as_ref())?;
        Ok(Self {
            current_text: current.display().to_string(),
            current,
        })
    }

    /// Current directory as a path
    pub fn current_path(&self) -> &Path {
        &self.current
    }

    fn entry_for(path: &Path, metadata: &fs::Metadata) -> Entry {
        let name = path.display().to_string();
        if metadata.is_dir() {
            Entry::directory(name)
        } else {
            let size = u32::try_from(metadata.len()).unwrap_or(u32::MAX);
            Entry::new(name, 0, size)
        }
    }

    fn collect_recursive(directory: &Path, out: &mut Vec<Entry>) -> Result<()> {
        for item in fs::read_dir(directory)? {
            let item = item?;
            let metadata = item.metadata()?;
            let path = item.path();
            if metadata.is_dir() {
                Self::collect_recursive(&path, out)?;
            } else {
                out.push(Self::entry_for(&path, &metadata));
            }
        }
        Ok(())
    }
}

fn resolve_directory(path: &Path) -> Result<PathBuf> {
    let not_found = || Error::DirectoryNotFound(path.display().to_string());
    let resolved = fs::canonicalize(path).map_err(|_| not_found())?;
    if resolved.is_dir() {
        Ok(resolved)
    } else {
        Err(not_found())
    }
}

impl FileSystem for PhysicalFileSystem {
    fn current_directory(&self) -> &str {
        &self.current_text
    }

    fn set_current_directory(&mut self, path: &str) -> Result<()> {
        let target = resolve_directory(&self.current.join(path))?;
        debug!("Physical directory is now {}", target.display());
        self.current_text = target.display().to_string();
        self.current = target;
        Ok(())
    }

    fn get_files(&self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for item in fs::read_dir(&self.current)? {
            let item = item?;
            let metadata = item.metadata()?;
            entries.push(Self::entry_for(&item.path(), &metadata));
        }
        entries.sort_by(|a, b| {
            b.is_directory()
                .cmp(&a.is_directory())
                .then_with(|| a.name().cmp(b.name()))
        });
        trace!("Listed {} entries in {}", entries.len(), self.current_text);
        Ok(entries)
    }

    fn get_files_recursive(&self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        Self::collect_recursive(&self.current, &mut entries)?;
        Ok(entries)
    }

    fn find_file(&self, name: &str) -> Result<Entry> {
        let path = self.current.join(name);
        let metadata =
            fs::metadata(&path).map_err(|_| Error::FileNotFound(name.to_string()))?;
        Ok(Self::entry_for(&path, &metadata))
    }

    fn open_file(&self, entry: &Entry) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(BufReader::new(File::open(entry.name())?)))
    }

    fn open_seekable_file(&self, entry: &Entry) -> Result<Box<dyn ReadSeek + '_>> {
        Ok(Box::new(BufReader::new(File::open(entry.name())?)))
    }

    fn open_view(&self, entry: &Entry) -> Result<ArcView> {
        ArcView::open(entry.name())
    }

    fn combine_path(&self, directory: &str, name: &str) -> String {
        Path::new(directory).join(name).display().to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn lists_directories_first_with_virtual_offsets() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.lib"), b"1234").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("b.bmp"), b"BM").unwrap();

        let physical = PhysicalFileSystem::new(dir.path()).unwrap();
        let files = physical.get_files().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].is_directory());
        assert_eq!(files[0].offset(), -1);
        assert_eq!(files[1].size(), 4);
        assert_eq!(physical.get_files_recursive().unwrap().len(), 2);
    }

    #[test]
    fn navigation_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("x.txt"), b"xyz").unwrap();

        let mut physical = PhysicalFileSystem::new(dir.path()).unwrap();
        physical.set_current_directory("sub").unwrap();
        let entry = physical.find_file("x.txt").unwrap();
        let mut text = String::new();
        physical.open_file(&entry).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "xyz");
        assert_eq!(physical.open_view(&entry).unwrap().max_offset(), 3);

        assert!(matches!(physical.find_file("nope"), Err(Error::FileNotFound(_))));
        assert!(matches!(
            physical.set_current_directory("x.txt"),
            Err(Error::DirectoryNotFound(_))
        ));
        physical.set_current_directory("..").unwrap();
        assert!(physical.file_exists("sub"));
    }
}
