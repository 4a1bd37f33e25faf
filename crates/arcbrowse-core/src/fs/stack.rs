//! Nested navigation through directories and archives

use super::{FileSystem, PARENT_DIR, PhysicalFileSystem};
use crate::archive::ArcFile;
use crate::catalog::FormatCatalog;
use crate::entry::Entry;
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

struct Frame {
    fs: Box<dyn FileSystem>,
    path: String,
}

/// Stack of filesystems, physical at the bottom and one frame per opened
/// archive above it
///
/// Leaving an archive parks it instead of closing it, so stepping straight
/// back in does not re-read the index. The parked archive is released when
/// a different archive is entered or on [`FileSystemStack::flush`].
pub struct FileSystemStack {
    catalog: Arc<FormatCatalog>,
    frames: Vec<Frame>,
    parked: Option<Frame>,
    last_visited: Option<String>,
}

impl FileSystemStack {
    /// Stack rooted at a physical directory.
    ///
    /// # Errors
    ///
    /// Returns `Error::DirectoryNotFound` if `root` is not a directory.
    pub fn new(catalog: Arc<FormatCatalog>, root: impl AsRef<Path>) -> Result<Self> {
        let physical = PhysicalFileSystem::new(root)?;
        let path = physical.current_directory().to_string();
        Ok(Self {
            catalog,
            frames: vec![Frame {
                fs: Box::new(physical),
                path,
            }],
            parked: None,
            last_visited: None,
        })
    }

    /// Number of frames, never below one
    pub fn count(&self) -> usize {
        self.frames.len()
    }

    fn top_frame(&self) -> &Frame {
        // `frames` is never empty: `pop` refuses to remove the last frame.
        &self.frames[self.frames.len() - 1]
    }

    /// Filesystem of the innermost frame
    pub fn top(&self) -> &dyn FileSystem {
        self.top_frame().fs.as_ref()
    }

    /// Mutable filesystem of the innermost frame
    pub fn top_mut(&mut self) -> &mut dyn FileSystem {
        let last = self.frames.len() - 1;
        self.frames[last].fs.as_mut()
    }

    /// Catalog used to open archives
    pub fn catalog(&self) -> &Arc<FormatCatalog> {
        &self.catalog
    }

    /// Path of each frame, bottom first
    pub fn paths(&self) -> Vec<&str> {
        self.frames.iter().map(|f| f.path.as_str()).collect()
    }

    /// Archive path of the frame most recently left
    pub fn last_visited(&self) -> Option<&str> {
        self.last_visited.as_deref()
    }

    /// Whether an archive is parked
    pub const fn has_parked(&self) -> bool {
        self.parked.is_some()
    }

    /// Entries of the current directory, with type tags filled in.
    ///
    /// # Errors
    ///
    /// Propagates listing failures of the top frame.
    pub fn get_files(&self) -> Result<Vec<Entry>> {
        let mut entries = self.top().get_files()?;
        self.catalog.assign_kinds(&mut entries);
        Ok(entries)
    }

    /// Navigate to `entry`: a directory, `..`, or an archive file.
    ///
    /// # Errors
    ///
    /// Returns `Error::DirectoryNotFound` for bad directories and
    /// `Error::UnknownFormat` for files no archive format accepts.
    pub fn ch_dir(&mut self, entry: &Entry) -> Result<()> {
        if entry.name() == PARENT_DIR
            && self.frames.len() > 1
            && self.top().current_directory().is_empty()
        {
            self.pop();
            return Ok(());
        }
        if entry.name() == PARENT_DIR || entry.is_directory() {
            return self.top_mut().set_current_directory(entry.name());
        }

        let path = self.frame_path(entry);
        if self.parked.as_ref().is_some_and(|f| f.path == path) {
            if let Some(frame) = self.parked.take() {
                debug!("Re-entering parked archive {}", frame.path);
                self.frames.push(frame);
            }
            return Ok(());
        }

        self.flush();
        let view = self.top().open_view(entry)?;
        let hint = self.top().contained_formats();
        let arc = self.catalog.open_archive(view, entry.name(), hint)?;
        self.push_archive(arc, path);
        Ok(())
    }

    fn frame_path(&self, entry: &Entry) -> String {
        if self.frames.len() == 1 {
            entry.name().to_string()
        } else {
            format!("{}/{}", self.top_frame().path, entry.name())
        }
    }

    /// Push an already opened archive.
    pub fn push_archive(&mut self, arc: ArcFile, path: impl Into<String>) {
        let path = path.into();
        info!("Entering {} ({})", path, arc.format().tag());
        self.frames.push(Frame {
            fs: arc.create_file_system(),
            path,
        });
    }

    /// Leave the innermost archive, parking it; no-op at the physical frame.
    ///
    /// Returns the path of the frame that was left.
    pub fn pop(&mut self) -> Option<String> {
        if self.frames.len() <= 1 {
            return None;
        }
        let frame = self.frames.pop()?;
        debug!("Leaving {}", frame.path);
        let path = frame.path.clone();
        if let Some(old) = self.parked.replace(frame) {
            debug!("Releasing parked archive {}", old.path);
        }
        self.last_visited = Some(path.clone());
        Some(path)
    }

    /// Release the parked archive, if any.
    pub fn flush(&mut self) {
        if let Some(frame) = self.parked.take() {
            debug!("Releasing parked archive {}", frame.path);
        }
    }
}

impl Drop for FileSystemStack {
    fn drop(&mut self) {
        self.parked.take();
        while self.frames.pop().is_some() {}
    }
}
